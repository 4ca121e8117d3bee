//! Supabase REST and Edge Function client.
//!
//! Talks to PostgREST with the anon key, or with a user access token once
//! one is attached via [`SupabaseClient::with_access_token`]. Price lookups
//! are cached for 5 minutes.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, instrument};
use venthub_core::{
    CartId, CartItem, OrderId, OrderStatus, ProductId, ProductSnapshot, UserId, round_money,
};

use super::cache::{self, CacheKey, CacheValue};
use super::types::{
    CartItemRow, CartLineUpsert, CartRow, CartValidation, CartValidationRequest,
    FunctionEnvelope, OrderStatusRow, PaymentInitiation, PaymentRequest, PostgrestErrorBody,
    PriceInfo, ProductPriceRow,
};
use super::{Backend, SupabaseError};
use crate::config::SupabaseConfig;

const PAYMENT_FUNCTION: &str = "iyzico-payment";
const VALIDATE_FUNCTION: &str = "order-validate";

const CART_ITEM_SELECT: &str =
    "product_id,quantity,unit_price,price_list_id,product:products(id,name,price,image_url)";

// =============================================================================
// Client
// =============================================================================

/// Client for the Supabase project backing the storefront.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    rest_url: String,
    functions_url: String,
    bearer: SecretString,
    cache: Cache<CacheKey, CacheValue>,
}

impl SupabaseClient {
    /// Create a new client authenticated with the anon key.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key()).map_err(|e| {
                SupabaseError::UnexpectedResponse(format!("Invalid anon key format: {e}"))
            })?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .build()?;

        let base = config.url.as_str().trim_end_matches('/');

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                rest_url: format!("{base}/rest/v1"),
                functions_url: format!("{base}/functions/v1"),
                bearer: SecretString::from(config.anon_key().to_string()),
                cache: cache::build(),
            }),
        })
    }

    /// A client that sends `token` as the bearer instead of the anon key.
    ///
    /// Shares the connection pool and the price cache with `self`.
    #[must_use]
    pub fn with_access_token(&self, token: SecretString) -> Self {
        Self {
            inner: Arc::new(SupabaseClientInner {
                client: self.inner.client.clone(),
                rest_url: self.inner.rest_url.clone(),
                functions_url: self.inner.functions_url.clone(),
                bearer: token,
                cache: self.inner.cache.clone(),
            }),
        }
    }

    fn table_url(&self, table: &str, query: &[(&str, &str)]) -> String {
        let query = query
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            format!("{}/{table}", self.inner.rest_url)
        } else {
            format!("{}/{table}?{query}", self.inner.rest_url)
        }
    }

    /// Attach auth, send, and map rate limiting.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), SupabaseError> {
        let response = request
            .header(
                "Authorization",
                format!("Bearer {}", self.inner.bearer.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(SupabaseError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        Ok((status, body))
    }

    /// Run a PostgREST request and return the raw body.
    async fn rest(&self, request: reqwest::RequestBuilder) -> Result<String, SupabaseError> {
        let (status, body) = self.execute(request).await?;

        if !status.is_success() {
            let error: PostgrestErrorBody = serde_json::from_str(&body).unwrap_or_default();
            tracing::error!(
                status = %status,
                code = ?error.code,
                details = ?error.details,
                hint = ?error.hint,
                "PostgREST returned non-success status"
            );
            return Err(SupabaseError::Api {
                status: status.as_u16(),
                code: error.code,
                message: error
                    .message
                    .unwrap_or_else(|| body.chars().take(200).collect()),
            });
        }

        Ok(body)
    }

    async fn rest_rows<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, SupabaseError> {
        let body = self.rest(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Invoke an Edge Function and return the raw success body.
    async fn invoke<B: Serialize + Sync>(
        &self,
        name: &str,
        payload: &B,
    ) -> Result<String, SupabaseError> {
        let url = format!("{}/{name}", self.inner.functions_url);
        let (status, body) = self
            .execute(self.inner.client.post(url).json(payload))
            .await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                function = name,
                body = %body.chars().take(500).collect::<String>(),
                "Edge Function returned non-success status"
            );
            let envelope = serde_json::from_str::<FunctionEnvelope<IgnoredAny>>(&body).ok();
            return Err(match envelope.and_then(|e| e.error) {
                Some(error) => {
                    let (code, message) = error.into_parts();
                    SupabaseError::Function {
                        name: name.to_string(),
                        code,
                        message,
                    }
                }
                None => SupabaseError::Api {
                    status: status.as_u16(),
                    code: None,
                    message: body.chars().take(200).collect(),
                },
            });
        }

        Ok(body)
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Drop a cached price so the next lookup hits the backend.
    pub async fn invalidate_price(&self, product_id: ProductId) {
        self.inner
            .cache
            .invalidate(&CacheKey::Price(product_id))
            .await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

// =============================================================================
// Backend
// =============================================================================

#[async_trait]
impl Backend for SupabaseClient {
    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn order_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>, SupabaseError> {
        let id_filter = format!("eq.{order_id}");
        let url = self.table_url(
            "venthub_orders",
            &[("select", "status"), ("id", &id_filter), ("limit", "1")],
        );

        let rows: Vec<OrderStatusRow> = self.rest_rows(self.inner.client.get(url)).await?;
        let status = rows.into_iter().next().map(|row| row.status);
        debug!(?status, "Fetched order status");
        Ok(status)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_or_create_cart(&self, user_id: UserId) -> Result<CartId, SupabaseError> {
        let user_filter = format!("eq.{user_id}");
        let url = self.table_url(
            "shopping_carts",
            &[("select", "id"), ("user_id", &user_filter), ("limit", "1")],
        );

        let existing: Vec<CartRow> = self.rest_rows(self.inner.client.get(url)).await?;
        if let Some(row) = existing.into_iter().next() {
            return Ok(row.id);
        }

        debug!("No server cart yet, creating one");
        let url = self.table_url("shopping_carts", &[("select", "id")]);
        let created: Vec<CartRow> = self
            .rest_rows(
                self.inner
                    .client
                    .post(url)
                    .header("Prefer", "return=representation")
                    .json(&serde_json::json!({ "user_id": user_id })),
            )
            .await?;

        created
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| SupabaseError::UnexpectedResponse("cart insert returned no row".into()))
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn list_cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, SupabaseError> {
        let cart_filter = format!("eq.{cart_id}");
        let url = self.table_url(
            "cart_items",
            &[("select", CART_ITEM_SELECT), ("cart_id", &cart_filter)],
        );

        let rows: Vec<CartItemRow> = self.rest_rows(self.inner.client.get(url)).await?;
        let total = rows.len();
        let items: Vec<CartItem> = rows
            .into_iter()
            .filter_map(CartItemRow::into_cart_item)
            .collect();

        if items.len() < total {
            debug!(dropped = total - items.len(), "Skipped unusable cart rows");
        }
        Ok(items)
    }

    #[instrument(skip(self, line), fields(cart_id = %line.cart_id, product_id = %line.product_id))]
    async fn upsert_cart_item(&self, line: &CartLineUpsert) -> Result<(), SupabaseError> {
        let url = self.table_url("cart_items", &[("on_conflict", "cart_id,product_id")]);
        self.rest(
            self.inner
                .client
                .post(url)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(line),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, product_id = %product_id))]
    async fn remove_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<(), SupabaseError> {
        let cart_filter = format!("eq.{cart_id}");
        let product_filter = format!("eq.{product_id}");
        let url = self.table_url(
            "cart_items",
            &[("cart_id", &cart_filter), ("product_id", &product_filter)],
        );
        self.rest(self.inner.client.delete(url)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn clear_cart_items(&self, cart_id: CartId) -> Result<(), SupabaseError> {
        let cart_filter = format!("eq.{cart_id}");
        let url = self.table_url("cart_items", &[("cart_id", &cart_filter)]);
        self.rest(self.inner.client.delete(url)).await?;
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn price_info(&self, product: &ProductSnapshot) -> Result<PriceInfo, SupabaseError> {
        let key = CacheKey::Price(product.id);
        if let Some(CacheValue::Price(info)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for price");
            return Ok(info);
        }

        let id_filter = format!("eq.{}", product.id);
        let url = self.table_url(
            "products",
            &[("select", "price"), ("id", &id_filter), ("limit", "1")],
        );
        let rows: Vec<ProductPriceRow> = self.rest_rows(self.inner.client.get(url)).await?;

        // Fall back to the price the shopper saw when the row is gone.
        let unit_price = rows
            .into_iter()
            .next()
            .and_then(|row| row.price)
            .unwrap_or(product.price);

        let info = PriceInfo {
            unit_price: round_money(unit_price),
            price_list_id: None,
        };
        self.inner.cache.insert(key, CacheValue::Price(info)).await;
        Ok(info)
    }

    #[instrument(skip(self, request))]
    async fn validate_cart(
        &self,
        request: &CartValidationRequest,
    ) -> Result<CartValidation, SupabaseError> {
        let body = self.invoke(VALIDATE_FUNCTION, request).await?;
        let validation: CartValidation = serde_json::from_str(&body)?;
        debug!(
            ok = validation.ok,
            stock_issues = validation.stock_issues.len(),
            mismatches = validation.mismatches.len(),
            "Cart validated"
        );
        Ok(validation)
    }

    #[instrument(
        skip(self, request),
        fields(amount = %request.amount, lines = request.cart_items.len())
    )]
    async fn initiate_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation, SupabaseError> {
        let body = self.invoke(PAYMENT_FUNCTION, request).await?;
        let envelope: FunctionEnvelope<PaymentInitiation> = serde_json::from_str(&body)?;

        if let Some(error) = envelope.error {
            let (code, message) = error.into_parts();
            return Err(SupabaseError::Function {
                name: PAYMENT_FUNCTION.to_string(),
                code,
                message,
            });
        }

        let data = envelope.data.ok_or_else(|| {
            SupabaseError::UnexpectedResponse("payment response has no data".into())
        })?;
        debug!(
            order_id = ?data.order_id,
            has_token = data.token.is_some(),
            has_form = data.checkout_form_content.is_some(),
            has_page = data.payment_page_url.is_some(),
            "Payment initiated"
        );
        Ok(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn client() -> SupabaseClient {
        let config = SupabaseConfig {
            url: Url::parse("https://abc.supabase.co/").unwrap(),
            anon_key: SecretString::from("eyJhbGciOiJIUzI1NiJ9.k3y-Xq8v".to_string()),
            http_timeout: Duration::from_secs(5),
        };
        SupabaseClient::new(&config).unwrap()
    }

    #[test]
    fn test_table_url_encodes_filters() {
        let client = client();
        let url = client.table_url(
            "cart_items",
            &[("on_conflict", "cart_id,product_id"), ("cart_id", "eq.42")],
        );
        assert_eq!(
            url,
            "https://abc.supabase.co/rest/v1/cart_items?on_conflict=cart_id%2Cproduct_id&cart_id=eq.42"
        );
    }

    #[test]
    fn test_table_url_without_query() {
        assert_eq!(
            client().table_url("shopping_carts", &[]),
            "https://abc.supabase.co/rest/v1/shopping_carts"
        );
    }

    #[tokio::test]
    async fn test_access_token_client_shares_cache() {
        let anon = client();
        let authed = anon.with_access_token(SecretString::from("user-jwt".to_string()));
        let product_id = ProductId::random();
        let info = PriceInfo {
            unit_price: rust_decimal::Decimal::ONE,
            price_list_id: None,
        };
        anon.inner
            .cache
            .insert(CacheKey::Price(product_id), CacheValue::Price(info))
            .await;

        let cached = authed.inner.cache.get(&CacheKey::Price(product_id)).await;
        assert!(matches!(cached, Some(CacheValue::Price(p)) if p == info));
        assert_eq!(authed.inner.bearer.expose_secret(), "user-jwt");
    }
}
