//! Order lookups.

use tracing::{info, warn};
use venthub_core::OrderId;

use super::Context;

/// Show an order's current status.
///
/// # Errors
///
/// Returns an error if the backend call fails.
pub async fn status(ctx: &Context, order_id: OrderId) -> Result<(), Box<dyn std::error::Error>> {
    match ctx.state.backend().order_status(order_id).await? {
        Some(status) => info!(
            order_id = %order_id,
            %status,
            settled = status.is_terminal(),
            "Order status"
        ),
        None => warn!(order_id = %order_id, "Order not found or not visible to this user"),
    }
    Ok(())
}
