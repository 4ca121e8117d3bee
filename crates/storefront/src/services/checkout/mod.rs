//! Multi-step checkout and hand-off to the hosted payment form.
//!
//! # Flow
//!
//! 1. Customer: name, email, phone
//! 2. Delivery: addresses, invoice details, legal consents
//! 3. Review: the shopper confirms the cart
//! 4. Payment: the server re-prices the cart (`order-validate`), then
//!    `iyzico-payment` creates a pending order and returns the payment form
//!
//! The payment form comes back as a token for the embeddable widget, raw
//! form HTML, or a hosted page URL, preferred in that order. Whatever is
//! used, a [`PendingOrderMarker`] is written first so the payment watcher can
//! pick the order up after the shopper pays off-app.
//!
//! When a token form has not rendered an iframe within the embed timeout,
//! the session redirects to the hosted page instead, at most once.

mod form;
mod request;
mod validation;

pub use form::{Address, CheckoutForm, CustomerInfo, InvoiceInfo, InvoiceType, LegalConsents};
pub use request::build_payment_request;
pub use validation::{
    ValidationError, validate_address, validate_consents, validate_customer, validate_delivery,
    validate_invoice,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;
use venthub_core::{OrderId, PendingOrderMarker, round_money};

use crate::config::CheckoutConfig;
use crate::error::add_breadcrumb;
use crate::host::{Navigator, Notifier, PaymentFormMount, Route};
use crate::services::cart::CartService;
use crate::storage::{ClientStorage, StorageError};
use crate::supabase::{Backend, CartValidationRequest, PaymentInitiation, SupabaseError};

/// Server and local totals closer than this are considered equal.
const TOTAL_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const MSG_EMPTY_CART: &str = "Your cart is empty";
const MSG_PAYMENT_INIT: &str = "Payment could not be started. Please try again.";
const MSG_PAYMENT_VALIDATION: &str = "Some order details were rejected. Please review them.";
const MSG_PAYMENT_DATABASE: &str = "The order could not be saved. Please try again shortly.";
const MSG_PAYMENT_SUCCESS: &str = "Payment received, thank you!";
const MSG_PAYMENT_ERROR: &str = "Payment failed. Please try again.";
const MSG_STOCK_UPDATED: &str = "Some quantities were updated to match stock. Please review.";
const MSG_PRICES_UPDATED: &str = "Prices were updated. Please review and confirm.";

/// Errors ending a payment attempt.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("payment initiation failed: {0}")]
    Backend(#[from] SupabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unusable payment response: {0}")]
    InvalidResponse(String),
}

/// Checkout steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckoutStep {
    Customer = 1,
    Delivery = 2,
    Review = 3,
    Payment = 4,
}

impl CheckoutStep {
    const fn previous(self) -> Self {
        match self {
            Self::Customer | Self::Delivery => Self::Customer,
            Self::Review => Self::Delivery,
            Self::Payment => Self::Review,
        }
    }
}

/// How the payment form was handed to the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMode {
    /// Embeddable widget loaded with a token; `fallback` is the hosted page.
    EmbeddedToken { token: String, fallback: Option<Url> },
    /// Raw form HTML inserted into the mount point.
    EmbeddedHtml,
    /// Full-page navigation to the hosted payment page.
    Redirect(Url),
}

/// Why the shopper was sent back to review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewReason {
    StockAdjusted,
    PricesUpdated,
}

/// Result of [`CheckoutSession::pay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentAttempt {
    /// A pending order exists and the payment form is with the shopper.
    Started {
        mode: PaymentMode,
        order_id: Option<OrderId>,
    },
    /// The backend completed the payment immediately.
    Completed { order_id: Option<OrderId> },
    /// The cart changed on the server; the shopper must confirm it again.
    NeedsReview(ReviewReason),
}

/// A message posted by the payment frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FrameMessage {
    PaymentSuccess,
    PaymentError {
        #[serde(default)]
        error: Option<String>,
    },
}

/// The user-facing message for a failed payment initiation.
#[must_use]
pub fn payment_error_message(error: &SupabaseError) -> String {
    let text = error.to_string();
    if text.contains("VALIDATION_ERROR") {
        return MSG_PAYMENT_VALIDATION.to_string();
    }
    if text.contains("DATABASE_ERROR") {
        return MSG_PAYMENT_DATABASE.to_string();
    }
    match error {
        SupabaseError::Function { message, .. } | SupabaseError::Api { message, .. }
            if !message.trim().is_empty() =>
        {
            message.clone()
        }
        _ => MSG_PAYMENT_INIT.to_string(),
    }
}

/// Cancels the embed fallback when dropped.
struct EmbedFallback {
    cancel: CancellationToken,
}

impl Drop for EmbedFallback {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Host seams a checkout session talks to.
#[derive(Clone)]
pub struct CheckoutHost {
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    pub mount: Arc<dyn PaymentFormMount>,
}

/// One shopper's way through checkout.
pub struct CheckoutSession {
    backend: Arc<dyn Backend>,
    cart: Arc<CartService>,
    storage: ClientStorage,
    host: CheckoutHost,
    config: CheckoutConfig,
    step: CheckoutStep,
    form: CheckoutForm,
    completed: bool,
    redirected: Arc<AtomicBool>,
    fallback: Option<EmbedFallback>,
}

impl CheckoutSession {
    pub fn new(
        backend: Arc<dyn Backend>,
        cart: Arc<CartService>,
        storage: ClientStorage,
        host: CheckoutHost,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            backend,
            cart,
            storage,
            host,
            config,
            step: CheckoutStep::Customer,
            form: CheckoutForm::default(),
            completed: false,
            redirected: Arc::new(AtomicBool::new(false)),
            fallback: None,
        }
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    #[must_use]
    pub const fn form(&self) -> &CheckoutForm {
        &self.form
    }

    pub const fn form_mut(&mut self) -> &mut CheckoutForm {
        &mut self.form
    }

    /// Whether the order is known to be paid.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Validate the current step and move to the next.
    ///
    /// Review is left through [`pay`](Self::pay), not here.
    pub fn next_step(&mut self) -> Result<CheckoutStep, ValidationError> {
        let result = match self.step {
            CheckoutStep::Customer => {
                validate_customer(&self.form.customer).map(|()| CheckoutStep::Delivery)
            }
            CheckoutStep::Delivery => validate_delivery(&self.form).map(|()| CheckoutStep::Review),
            step @ (CheckoutStep::Review | CheckoutStep::Payment) => Ok(step),
        };

        match result {
            Ok(step) => {
                self.step = step;
                Ok(step)
            }
            Err(e) => {
                self.host.notifier.error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Go back one step. The first step stays put.
    pub const fn prev_step(&mut self) -> CheckoutStep {
        self.step = self.step.previous();
        self.step
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Validate the cart with the server and start the payment.
    ///
    /// On failure the shopper is notified and sent back to the delivery step.
    #[instrument(skip(self))]
    pub async fn pay(&mut self) -> Result<PaymentAttempt, CheckoutError> {
        if self.cart.is_empty() {
            self.host.notifier.error(MSG_EMPTY_CART);
            self.host.navigator.navigate(Route::Cart);
            return Err(ValidationError::EmptyCart.into());
        }

        if let Err(e) = validate_customer(&self.form.customer) {
            self.host.notifier.error(&e.to_string());
            self.step = CheckoutStep::Customer;
            return Err(e.into());
        }
        if let Err(e) = validate_delivery(&self.form) {
            self.host.notifier.error(&e.to_string());
            self.step = CheckoutStep::Delivery;
            return Err(e.into());
        }

        self.step = CheckoutStep::Payment;

        let amount = match self.validate_with_server().await? {
            Ok(amount) => amount,
            Err(reason) => {
                self.step = CheckoutStep::Review;
                return Ok(PaymentAttempt::NeedsReview(reason));
            }
        };

        let request = build_payment_request(
            amount,
            &self.cart.items(),
            &self.form,
            self.cart.user(),
            Utc::now(),
        );
        add_breadcrumb("checkout", "Payment initiated", None);

        let initiation = match self.backend.initiate_payment(&request).await {
            Ok(initiation) => initiation,
            Err(e) => return Err(self.fail(CheckoutError::Backend(e))),
        };

        match self.hand_off(initiation).await {
            Ok(attempt) => Ok(attempt),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Run `order-validate`. The outer result carries storage failures; the
    /// inner one is the amount to charge, or why review is needed.
    async fn validate_with_server(
        &self,
    ) -> Result<Result<Decimal, ReviewReason>, StorageError> {
        let local_total = self.cart.total();

        let Some(user_id) = self.cart.user() else {
            debug!("Guest checkout, skipping server cart validation");
            return Ok(Ok(local_total));
        };

        let validation = match self
            .backend
            .validate_cart(&CartValidationRequest {
                cart_id: None,
                user_id: Some(user_id),
            })
            .await
        {
            Ok(validation) => validation,
            Err(e) => {
                warn!(error = %e, "Server cart validation failed, continuing");
                return Ok(Ok(local_total));
            }
        };

        if !validation.stock_issues.is_empty() {
            self.cart.adjust_for_stock(&validation.stock_issues).await?;
            self.host.notifier.info(MSG_STOCK_UPDATED);
            return Ok(Err(ReviewReason::StockAdjusted));
        }

        let server_total = validation.totals.subtotal.unwrap_or(local_total);
        if (server_total - local_total).abs() > TOTAL_TOLERANCE {
            info!(%server_total, %local_total, "Server total differs, asking for review");
            self.cart.apply_server_pricing(&validation.items).await?;
            self.host.notifier.info(MSG_PRICES_UPDATED);
            return Ok(Err(ReviewReason::PricesUpdated));
        }

        Ok(Ok(round_money(server_total)))
    }

    /// Render whichever payment form the backend returned.
    async fn hand_off(
        &mut self,
        initiation: PaymentInitiation,
    ) -> Result<PaymentAttempt, CheckoutError> {
        let order_id = initiation.order_id;
        let marker = PendingOrderMarker {
            order_id,
            conversation_id: initiation.conversation_id.clone().unwrap_or_default(),
        };
        let page_url = initiation
            .payment_page_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .and_then(|url| match Url::parse(url) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed payment page URL");
                    None
                }
            });

        if let Some(token) = initiation.token.filter(|t| !t.is_empty()) {
            self.write_marker(&marker)?;
            self.host.mount.embed_token(&token);
            if let Some(url) = page_url.clone() {
                self.arm_fallback(url, marker);
            }
            debug!("Embedded payment form with token");
            return Ok(PaymentAttempt::Started {
                mode: PaymentMode::EmbeddedToken {
                    token,
                    fallback: page_url,
                },
                order_id,
            });
        }

        if let Some(html) = initiation
            .checkout_form_content
            .filter(|html| !html.trim().is_empty())
        {
            self.write_marker(&marker)?;
            self.host.mount.embed_html(&html);
            debug!("Embedded payment form HTML");
            return Ok(PaymentAttempt::Started {
                mode: PaymentMode::EmbeddedHtml,
                order_id,
            });
        }

        if let Some(url) = page_url {
            self.write_marker(&marker)?;
            info!(%url, "Redirecting to hosted payment page");
            self.host.navigator.navigate(Route::External(url.clone()));
            return Ok(PaymentAttempt::Started {
                mode: PaymentMode::Redirect(url),
                order_id,
            });
        }

        if initiation.status.as_deref() == Some("success") {
            info!(order_id = ?order_id, "Payment completed immediately");
            self.complete().await?;
            return Ok(PaymentAttempt::Completed { order_id });
        }

        Err(CheckoutError::InvalidResponse(
            "no token, form or payment page in response".to_string(),
        ))
    }

    fn write_marker(&self, marker: &PendingOrderMarker) -> Result<(), StorageError> {
        self.storage.set_pending_marker(marker)?;
        if let Some(order_id) = marker.order_id {
            self.storage.set_last_order_id(order_id)?;
        }
        Ok(())
    }

    /// Notify, report and step back to delivery.
    fn fail(&mut self, error: CheckoutError) -> CheckoutError {
        let message = match &error {
            CheckoutError::Backend(e) => payment_error_message(e),
            _ => MSG_PAYMENT_INIT.to_string(),
        };
        self.host.notifier.error(&message);
        self.step = CheckoutStep::Delivery;

        let event_id = sentry::capture_error(&error);
        tracing::error!(error = %error, sentry_event_id = %event_id, "Payment initiation failed");
        error
    }

    async fn complete(&mut self) -> Result<(), StorageError> {
        self.completed = true;
        self.fallback = None;
        self.cart.clear(true).await?;
        self.host.notifier.success(MSG_PAYMENT_SUCCESS);
        Ok(())
    }

    // =========================================================================
    // Payment form events
    // =========================================================================

    /// React to a message from the payment frame.
    pub async fn handle_frame_message(
        &mut self,
        message: FrameMessage,
    ) -> Result<(), StorageError> {
        match message {
            FrameMessage::PaymentSuccess => self.complete().await,
            FrameMessage::PaymentError { error } => {
                let message = error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| MSG_PAYMENT_ERROR.to_string());
                self.host.notifier.error(&message);
                self.step = CheckoutStep::Delivery;
                Ok(())
            }
        }
    }

    /// The payment form rendered; the fallback redirect is no longer needed.
    pub fn form_ready(&mut self) {
        if self.fallback.take().is_some() {
            debug!("Payment form ready, fallback cancelled");
        }
    }

    /// Redirect to `url` unless the embedded form shows up in time.
    fn arm_fallback(&mut self, url: Url, marker: PendingOrderMarker) {
        let cancel = CancellationToken::new();
        // Replacing a previous fallback cancels it.
        self.fallback = Some(EmbedFallback {
            cancel: cancel.clone(),
        });

        let timeout = self.config.embed_timeout;
        let mount = Arc::clone(&self.host.mount);
        let navigator = Arc::clone(&self.host.navigator);
        let storage = self.storage.clone();
        let redirected = Arc::clone(&self.redirected);

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    if mount.has_iframe() {
                        debug!("Payment iframe present, no fallback needed");
                        return;
                    }
                    if redirected.swap(true, Ordering::AcqRel) {
                        return;
                    }
                    if let Err(e) = storage.set_pending_marker(&marker) {
                        warn!(error = %e, "Failed to persist pending marker before fallback");
                    }
                    if let Some(order_id) = marker.order_id
                        && let Err(e) = storage.set_last_order_id(order_id)
                    {
                        warn!(error = %e, "Failed to persist last order id before fallback");
                    }
                    warn!(%url, "Payment form did not load, redirecting to hosted page");
                    navigator.navigate(Route::External(url));
                }
            }
        });
    }
}
