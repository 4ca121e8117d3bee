//! Cart line types.
//!
//! A cart line is keyed by product: the storefront never holds two lines for
//! the same product, and a line with zero quantity is removed rather than
//! kept around.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{PriceListId, ProductId};
use super::price::round_money;

/// The product fields a cart line needs for display and for the payment
/// request. Captured when the product is added so the cart renders offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    /// List price at the time the line was added.
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A single line in the shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product: ProductSnapshot,
    pub quantity: u32,
    /// Role/tier based unit price resolved by the backend, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_list_id: Option<PriceListId>,
}

impl CartItem {
    /// Create a line priced at the product's list price.
    #[must_use]
    pub const fn new(product: ProductSnapshot, quantity: u32) -> Self {
        Self {
            product,
            quantity,
            unit_price: None,
            price_list_id: None,
        }
    }

    /// The product this line is for.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product.id
    }

    /// Unit price snapshot, falling back to the list price.
    #[must_use]
    pub fn effective_unit_price(&self) -> Decimal {
        self.unit_price.unwrap_or(self.product.price)
    }

    /// Unit price times quantity, rounded to two places.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_money(self.effective_unit_price() * Decimal::from(self.quantity))
    }
}
