//! Checkout and payment return commands.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};
use venthub_storefront::host::Route;
use venthub_storefront::services::checkout::{CheckoutForm, PaymentAttempt, PaymentMode};
use venthub_storefront::services::payment_result::PaymentReturn;

use super::Context;

/// Extra time allowed for the embed fallback to fire.
const FALLBACK_GRACE: Duration = Duration::from_secs(1);

/// Pay for the cart using a checkout form read from `form_path`.
///
/// # Errors
///
/// Returns an error if the form cannot be read, fails validation, or the
/// payment cannot be initiated.
pub async fn run(ctx: &Context, form_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(form_path)?;
    let form: CheckoutForm = serde_json::from_str(&raw)?;
    ctx.sign_in().await?;

    let mut routes = ctx.host.subscribe();
    let mut session = ctx.state.checkout();
    *session.form_mut() = form;

    match session.pay().await? {
        PaymentAttempt::Started { mode, order_id } => {
            info!(order_id = ?order_id, "Payment started");
            match mode {
                PaymentMode::EmbeddedToken {
                    fallback: Some(_), ..
                } => {
                    // No iframe can appear here; wait for the hosted page fallback.
                    let wait = ctx.state.config().checkout.embed_timeout + FALLBACK_GRACE;
                    let redirected = tokio::time::timeout(wait, async {
                        while routes.changed().await.is_ok() {
                            if matches!(*routes.borrow_and_update(), Some(Route::External(_))) {
                                return true;
                            }
                        }
                        false
                    })
                    .await
                    .unwrap_or(false);
                    if !redirected {
                        warn!("Hosted payment page fallback did not fire");
                    }
                }
                PaymentMode::EmbeddedToken { fallback: None, .. } | PaymentMode::EmbeddedHtml => {
                    warn!("The payment form needs a browser; no hosted page was offered");
                }
                PaymentMode::Redirect(_) => {}
            }
            info!("Run `vh-cli watch` to follow the payment");
        }
        PaymentAttempt::Completed { order_id } => {
            info!(order_id = ?order_id, "Payment completed");
        }
        PaymentAttempt::NeedsReview(reason) => {
            info!(?reason, "Cart changed on the server; review it and pay again");
            super::cart::show(ctx);
        }
    }
    Ok(())
}

/// Apply a payment return query string.
///
/// # Errors
///
/// Returns an error if local storage cannot be updated.
pub async fn result(ctx: &Context, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let params = PaymentReturn::from_query(query);
    let outcome = ctx.state.payment_result_page().handle(&params).await?;
    info!(?outcome, "Payment result applied");
    Ok(())
}
