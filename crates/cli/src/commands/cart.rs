//! Cart commands.

use rust_decimal::Decimal;
use tracing::info;
use venthub_core::{ProductId, ProductSnapshot};

use super::Context;

/// Log every cart line and the total.
pub fn show(ctx: &Context) {
    let cart = ctx.state.cart();
    for item in cart.items() {
        info!(
            product_id = %item.product_id(),
            name = %item.product.name,
            quantity = item.quantity,
            unit_price = %item.effective_unit_price(),
            line_total = %item.line_total(),
            "Cart line"
        );
    }
    info!(items = cart.count(), total = %cart.total(), "Cart");
}

/// Add a product, mirroring it to the server cart when signed in.
///
/// # Errors
///
/// Returns an error if signing in or local storage fails.
pub async fn add(
    ctx: &Context,
    product_id: ProductId,
    name: String,
    price: Decimal,
    quantity: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if quantity == 0 {
        return Err("quantity must be at least 1".into());
    }
    ctx.sign_in().await?;

    let product = ProductSnapshot {
        id: product_id,
        name,
        price,
        image_url: None,
    };
    ctx.state.cart().add(product, quantity).await?;
    show(ctx);
    Ok(())
}

/// Remove a product.
///
/// # Errors
///
/// Returns an error if signing in or local storage fails.
pub async fn remove(
    ctx: &Context,
    product_id: ProductId,
) -> Result<(), Box<dyn std::error::Error>> {
    ctx.sign_in().await?;
    ctx.state.cart().remove(product_id).await?;
    show(ctx);
    Ok(())
}

/// Merge the local cart into the signed-in user's server cart.
///
/// # Errors
///
/// Returns an error if no user is given or the merge fails.
pub async fn sync(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    if ctx.user_id().is_none() {
        return Err("cart sync needs a signed-in user (--user-id or VENTHUB_USER_ID)".into());
    }
    let outcome = ctx.sign_in().await?;
    info!(?outcome, "Cart sync finished");
    show(ctx);
    Ok(())
}
