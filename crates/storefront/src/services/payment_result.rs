//! The payment return page.
//!
//! Both the watcher and the payment provider's callback land the shopper on
//! `/payment-success` with a query string describing the outcome. This
//! module reads that query and applies the outcome to local state.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use venthub_core::{ConversationId, OrderId, PaymentResult};

use crate::error::add_breadcrumb;
use crate::host::Notifier;
use crate::services::cart::CartService;
use crate::storage::{ClientStorage, StorageError};

const MSG_SUCCESS: &str = "Payment completed successfully";
const MSG_FAILURE: &str = "Payment failed";

/// Parameters carried on the return URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentReturn {
    pub order_id: Option<OrderId>,
    pub status: Option<String>,
    pub conversation_id: Option<ConversationId>,
    pub token: Option<String>,
    pub error_message: Option<String>,
}

/// What the return parameters say about the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success {
        order_id: Option<OrderId>,
        conversation_id: Option<ConversationId>,
    },
    Failure {
        order_id: Option<OrderId>,
        message: Option<String>,
    },
    /// Nothing conclusive; the watcher keeps polling.
    Pending { order_id: Option<OrderId> },
}

impl PaymentOutcome {
    #[must_use]
    pub const fn result(&self) -> Option<PaymentResult> {
        match self {
            Self::Success { .. } => Some(PaymentResult::Success),
            Self::Failure { .. } => Some(PaymentResult::Failure),
            Self::Pending { .. } => None,
        }
    }
}

impl PaymentReturn {
    /// Parse a query string, with or without the leading `?`.
    ///
    /// Blank values count as absent. An unparsable `orderId` is dropped.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut parsed = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "orderId" => match value.parse() {
                    Ok(id) => parsed.order_id = Some(id),
                    Err(e) => warn!(error = %e, value, "Ignoring malformed orderId"),
                },
                "status" => parsed.status = Some(value.to_ascii_lowercase()),
                "conversationId" => parsed.conversation_id = Some(ConversationId::new(value)),
                "token" => parsed.token = Some(value.to_string()),
                "errorMessage" => parsed.error_message = Some(value.to_string()),
                _ => {}
            }
        }
        parsed
    }

    /// Classify the return. An explicit failure wins over success hints.
    #[must_use]
    pub fn outcome(&self) -> PaymentOutcome {
        let status = self.status.as_deref();

        if status == Some("failure") || self.error_message.is_some() {
            return PaymentOutcome::Failure {
                order_id: self.order_id,
                message: self.error_message.clone(),
            };
        }
        if status == Some("success") || self.conversation_id.is_some() || self.token.is_some() {
            return PaymentOutcome::Success {
                order_id: self.order_id,
                conversation_id: self.conversation_id.clone(),
            };
        }
        PaymentOutcome::Pending {
            order_id: self.order_id,
        }
    }
}

/// Applies payment outcomes to the cart and local storage.
pub struct PaymentResultPage {
    cart: Arc<CartService>,
    storage: ClientStorage,
    notifier: Arc<dyn Notifier>,
}

impl PaymentResultPage {
    pub fn new(
        cart: Arc<CartService>,
        storage: ClientStorage,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cart,
            storage,
            notifier,
        }
    }

    /// Handle a return and report its outcome.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if local state cannot be updated.
    #[instrument(skip(self))]
    pub async fn handle(&self, params: &PaymentReturn) -> Result<PaymentOutcome, StorageError> {
        let outcome = params.outcome();

        match &outcome {
            PaymentOutcome::Success { order_id, .. } => {
                self.settle(*order_id, PaymentResult::Success)?;
                if self.cart.user().is_none() {
                    // A later login must not resurrect the paid lines.
                    self.storage.set_clear_server_cart_once()?;
                }
                self.cart.clear(true).await?;
                self.notifier.success(MSG_SUCCESS);
                info!(order_id = ?order_id, "Payment succeeded");
            }
            PaymentOutcome::Failure { order_id, message } => {
                self.settle(*order_id, PaymentResult::Failure)?;
                let text = message
                    .as_deref()
                    .map_or_else(|| MSG_FAILURE.to_string(), |m| format!("{MSG_FAILURE}: {m}"));
                self.notifier.error(&text);
                info!(order_id = ?order_id, message = ?message, "Payment failed");
            }
            PaymentOutcome::Pending { order_id } => {
                info!(order_id = ?order_id, "Payment result not known yet");
            }
        }

        Ok(outcome)
    }

    fn settle(&self, order_id: Option<OrderId>, result: PaymentResult) -> Result<(), StorageError> {
        if let Some(order_id) = order_id {
            self.storage.set_last_order_id(order_id)?;
        }
        self.storage.set_last_order_status(result)?;

        // Only drop the marker that belongs to this order.
        if let Some(marker) = self.storage.pending_marker()?
            && (order_id.is_none() || marker.order_id == order_id)
        {
            self.storage.clear_pending_marker()?;
        }

        add_breadcrumb("payment", "Payment result received", Some(&[("result", result.as_str())]));
        Ok(())
    }
}
