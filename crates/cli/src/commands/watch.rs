//! Watch the pending order until its payment settles.

use tracing::info;
use venthub_storefront::host::Route;
use venthub_storefront::services::payment_result::PaymentReturn;
use venthub_storefront::services::watcher::WatchTrigger;

use super::Context;

/// Run the watcher until it navigates to the result page or Ctrl-C.
///
/// # Errors
///
/// Returns an error if local storage cannot be read or updated.
pub async fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let Some(marker) = ctx.state.storage().pending_marker()? else {
        info!("No pending order");
        return Ok(());
    };
    info!(order_id = ?marker.order_id, "Watching pending order");

    let mut routes = ctx.host.subscribe();
    let handle = ctx.state.watcher().spawn();
    // A fresh page load checks right away.
    handle.trigger(WatchTrigger::Visible);

    let settled = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break None;
            }
            changed = routes.changed() => {
                if changed.is_err() {
                    break None;
                }
                let route = routes.borrow_and_update().clone();
                if let Some(Route::PaymentResult { order_id, result }) = route {
                    break Some((order_id, result));
                }
            }
        }
    };
    handle.shutdown().await;

    if let Some((order_id, result)) = settled {
        let params = PaymentReturn {
            order_id: Some(order_id),
            status: Some(result.as_str().to_string()),
            ..PaymentReturn::default()
        };
        let outcome = ctx.state.payment_result_page().handle(&params).await?;
        info!(?outcome, "Payment settled");
    }
    Ok(())
}
