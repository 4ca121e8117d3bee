//! Wire types for Supabase tables and Edge Functions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use venthub_core::{
    CartId, CartItem, ConversationId, OrderId, OrderStatus, PriceListId, ProductId,
    ProductSnapshot, UserId,
};

use crate::services::checkout::{Address, CustomerInfo, InvoiceInfo, InvoiceType};

// =============================================================================
// PostgREST rows
// =============================================================================

/// `venthub_orders?select=status`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OrderStatusRow {
    pub status: OrderStatus,
}

/// `shopping_carts?select=id`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CartRow {
    pub id: CartId,
}

/// `products?select=price`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProductPriceRow {
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Embedded product on a cart line.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// `cart_items?select=...,product:products(...)`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CartItemRow {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub price_list_id: Option<PriceListId>,
    #[serde(default)]
    pub product: Option<ProductRow>,
}

impl CartItemRow {
    /// Convert to a cart line, dropping rows the client cannot use.
    pub(crate) fn into_cart_item(self) -> Option<CartItem> {
        let Some(product) = self.product else {
            warn!(product_id = %self.product_id, "Cart line has no product, skipping");
            return None;
        };
        if product.id != self.product_id {
            warn!(
                product_id = %self.product_id,
                joined_id = %product.id,
                "Cart line joined the wrong product, skipping"
            );
            return None;
        }
        let quantity = u32::try_from(self.quantity).ok().filter(|q| *q > 0)?;
        Some(CartItem {
            product: ProductSnapshot {
                id: product.id,
                name: product.name,
                price: product.price,
                image_url: product.image_url,
            },
            quantity,
            unit_price: self.unit_price,
            price_list_id: self.price_list_id,
        })
    }
}

/// Body for `cart_items` upserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineUpsert {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Option<Decimal>,
    pub price_list_id: Option<PriceListId>,
}

/// Effective unit price for a product, possibly from a price list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceInfo {
    pub unit_price: Decimal,
    pub price_list_id: Option<PriceListId>,
}

// =============================================================================
// order-validate
// =============================================================================

/// Request body for `order-validate`. One of the two ids must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartValidationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<CartId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Response of `order-validate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CartValidation {
    pub ok: bool,
    pub items: Vec<ValidatedItem>,
    pub mismatches: Vec<PriceMismatch>,
    pub stock_issues: Vec<StockIssue>,
    pub totals: ValidationTotals,
    pub cart_id: Option<CartId>,
}

/// A cart line re-priced by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidatedItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub price_list_id: Option<PriceListId>,
}

/// A line whose stored unit price no longer matches the price list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PriceMismatch {
    pub product_id: ProductId,
    #[serde(default)]
    pub had: Option<Decimal>,
    pub expected: Decimal,
    #[serde(default)]
    pub price_list_id: Option<PriceListId>,
}

/// A line requesting more units than are in stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StockIssue {
    pub product_id: ProductId,
    #[serde(default)]
    pub requested: i64,
    pub available: i64,
}

/// Totals computed by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationTotals {
    #[serde(default)]
    pub subtotal: Option<Decimal>,
}

// =============================================================================
// iyzico-payment
// =============================================================================

/// Request body for `iyzico-payment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub cart_items: Vec<PaymentCartLine>,
    pub customer_info: CustomerInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    #[serde(rename = "user_id")]
    pub user_id: Option<UserId>,
    pub invoice_type: InvoiceType,
    pub invoice_info: InvoicePayload,
    pub legal_consents: LegalConsentsPayload,
    pub preferred_carrier: Option<String>,
}

/// A cart line as the payment function expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentCartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub product_name: String,
    pub product_image_url: Option<String>,
}

/// Invoice details tagged with their type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoicePayload {
    #[serde(flatten)]
    pub info: InvoiceInfo,
    #[serde(rename = "type")]
    pub invoice_type: InvoiceType,
}

/// Timestamped acceptance of a single legal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsentRecord {
    pub accepted: bool,
    pub ts: Option<DateTime<Utc>>,
}

/// Every consent the payment function records with the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalConsentsPayload {
    pub kvkk: ConsentRecord,
    pub distance_sales: ConsentRecord,
    pub pre_info: ConsentRecord,
    pub order_confirm: ConsentRecord,
    pub marketing: ConsentRecord,
}

/// The `data` object returned by `iyzico-payment`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentInitiation {
    pub status: Option<String>,
    pub order_id: Option<OrderId>,
    pub conversation_id: Option<ConversationId>,
    /// Checkout form token for the embeddable widget.
    pub token: Option<String>,
    /// Raw embeddable checkout form HTML.
    pub checkout_form_content: Option<String>,
    /// Hosted payment page for a full-page redirect.
    pub payment_page_url: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub mode: Option<String>,
}

/// Envelope around Edge Function responses: `{ "data": ... }` or `{ "error": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FunctionEnvelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<FunctionErrorBody>,
}

/// Error payload from an Edge Function. Some functions send a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum FunctionErrorBody {
    Detailed {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Message(String),
}

impl FunctionErrorBody {
    pub(crate) fn into_parts(self) -> (Option<String>, String) {
        match self {
            Self::Detailed { code, message } => (
                code,
                message.unwrap_or_else(|| "function returned an error".to_string()),
            ),
            Self::Message(message) => (None, message),
        }
    }
}

/// PostgREST error body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PostgrestErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cart_item_row_conversion() {
        let product_id = ProductId::random();
        let json = format!(
            r#"{{"product_id":"{product_id}","quantity":2,"unit_price":"99.90","price_list_id":null,
                "product":{{"id":"{product_id}","name":"Hava Perdesi","price":"120.00","image_url":null}}}}"#
        );
        let row: CartItemRow = serde_json::from_str(&json).unwrap();
        let item = row.into_cart_item().unwrap();
        assert_eq!(item.product_id(), product_id);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.unit_price, Some(Decimal::from_str("99.90").unwrap()));
    }

    #[test]
    fn test_cart_item_row_without_product_is_dropped() {
        let json = format!(
            r#"{{"product_id":"{}","quantity":1,"product":null}}"#,
            ProductId::random()
        );
        let row: CartItemRow = serde_json::from_str(&json).unwrap();
        assert!(row.into_cart_item().is_none());
    }

    #[test]
    fn test_cart_item_row_with_mismatched_product_is_dropped() {
        let json = format!(
            r#"{{"product_id":"{}","quantity":1,
                "product":{{"id":"{}","name":"Hava Perdesi","price":"120.00"}}}}"#,
            ProductId::random(),
            ProductId::random()
        );
        let row: CartItemRow = serde_json::from_str(&json).unwrap();
        assert!(row.into_cart_item().is_none());
    }

    #[test]
    fn test_cart_item_row_with_zero_quantity_is_dropped() {
        let id = ProductId::random();
        let json = format!(
            r#"{{"product_id":"{id}","quantity":0,"product":{{"id":"{id}","name":"x","price":1}}}}"#
        );
        let row: CartItemRow = serde_json::from_str(&json).unwrap();
        assert!(row.into_cart_item().is_none());
    }

    #[test]
    fn test_validation_response_tolerates_missing_fields() {
        let v: CartValidation = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(v.ok);
        assert!(v.items.is_empty());
        assert!(v.stock_issues.is_empty());
        assert_eq!(v.totals.subtotal, None);
    }

    #[test]
    fn test_payment_initiation_parses_camel_case() {
        let order_id = OrderId::random();
        let json = format!(
            r#"{{"data":{{"status":"success","orderId":"{order_id}","conversationId":"conv-9",
                "token":"tok_123","paymentPageUrl":"https://pay.example/x","amount":1250.5}}}}"#
        );
        let envelope: FunctionEnvelope<PaymentInitiation> = serde_json::from_str(&json).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.order_id, Some(order_id));
        assert_eq!(data.token.as_deref(), Some("tok_123"));
        assert_eq!(data.conversation_id, Some(ConversationId::new("conv-9")));
        assert!(data.checkout_form_content.is_none());
    }

    #[test]
    fn test_function_error_body_variants() {
        let detailed: FunctionEnvelope<PaymentInitiation> = serde_json::from_str(
            r#"{"error":{"code":"VALIDATION_ERROR","message":"Eksik alan"}}"#,
        )
        .unwrap();
        let (code, message) = detailed.error.unwrap().into_parts();
        assert_eq!(code.as_deref(), Some("VALIDATION_ERROR"));
        assert_eq!(message, "Eksik alan");

        let bare: FunctionEnvelope<CartValidation> =
            serde_json::from_str(r#"{"error":"missing_cart"}"#).unwrap();
        let (code, message) = bare.error.unwrap().into_parts();
        assert_eq!(code, None);
        assert_eq!(message, "missing_cart");
    }
}
