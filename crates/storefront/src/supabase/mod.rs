//! Supabase backend access.
//!
//! # Architecture
//!
//! - PostgREST (`/rest/v1`) for orders, carts, cart lines and product prices
//! - Edge Functions (`/functions/v1`) for payment initiation and cart validation
//! - Supabase is the source of truth - the client never caches order state
//! - Effective price lookups are cached in memory via `moka` (5 minute TTL)
//!
//! The flows depend on the [`Backend`] trait rather than on
//! [`SupabaseClient`] so they can run against an in-memory fake.
//!
//! # Example
//!
//! ```rust,ignore
//! use venthub_storefront::supabase::{Backend, SupabaseClient};
//!
//! let client = SupabaseClient::new(&config.supabase)?;
//!
//! // Poll an order
//! let status = client.order_status(order_id).await?;
//!
//! // Mirror a cart line
//! let cart_id = client.get_or_create_cart(user_id).await?;
//! client.upsert_cart_item(&CartLineUpsert { cart_id, .. }).await?;
//! ```

mod cache;
mod client;
pub mod types;

pub use client::SupabaseClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;
use venthub_core::{CartId, CartItem, OrderId, OrderStatus, ProductId, ProductSnapshot, UserId};

/// Errors that can occur when talking to Supabase.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// PostgREST returned a non-success status.
    #[error("API error {status}{}: {message}", format_code(.code.as_deref()))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// An Edge Function returned an error payload.
    #[error("Function {name} failed{}: {message}", format_code(.code.as_deref()))]
    Function {
        name: String,
        code: Option<String>,
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the API gateway.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// A response was well-formed but missing data the client needs.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

fn format_code(code: Option<&str>) -> String {
    code.map_or_else(String::new, |c| format!(" [{c}]"))
}

/// Backend operations the storefront flows need.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Current status of an order, `None` when no row is visible.
    async fn order_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>, SupabaseError>;

    /// The user's server-side cart, created on first use.
    async fn get_or_create_cart(&self, user_id: UserId) -> Result<CartId, SupabaseError>;

    /// Lines of a server cart, joined with their products.
    async fn list_cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, SupabaseError>;

    /// Insert or replace a single cart line (keyed by cart and product).
    async fn upsert_cart_item(&self, line: &CartLineUpsert) -> Result<(), SupabaseError>;

    /// Delete a single cart line.
    async fn remove_cart_item(&self, cart_id: CartId, product_id: ProductId)
    -> Result<(), SupabaseError>;

    /// Delete every line of a cart.
    async fn clear_cart_items(&self, cart_id: CartId) -> Result<(), SupabaseError>;

    /// Effective unit price for a product.
    async fn price_info(&self, product: &ProductSnapshot) -> Result<PriceInfo, SupabaseError>;

    /// Re-price and stock-check a server cart (`order-validate`).
    async fn validate_cart(
        &self,
        request: &CartValidationRequest,
    ) -> Result<CartValidation, SupabaseError>;

    /// Create a pending order and obtain the hosted payment form (`iyzico-payment`).
    async fn initiate_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation, SupabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = SupabaseError::Api {
            status: 404,
            code: Some("PGRST116".to_string()),
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "API error 404 [PGRST116]: not found");

        let err = SupabaseError::Api {
            status: 500,
            code: None,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "API error 500: boom");
    }

    #[test]
    fn test_function_error_carries_code() {
        let err = SupabaseError::Function {
            name: "iyzico-payment".to_string(),
            code: Some("VALIDATION_ERROR".to_string()),
            message: "Sepet boş".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("VALIDATION_ERROR"));
        assert!(text.starts_with("Function iyzico-payment failed"));
    }

    #[test]
    fn test_rate_limited_error() {
        let err = SupabaseError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }
}
