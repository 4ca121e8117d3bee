//! Seams to the environment hosting the storefront flows.
//!
//! The flows never render anything themselves. They tell the host where to
//! go ([`Navigator`]), what to show ([`Notifier`]) and where the hosted
//! payment form lives ([`PaymentFormMount`]).

use url::Url;
use venthub_core::{OrderId, PaymentResult};

/// A navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The payment result page for an order.
    PaymentResult {
        order_id: OrderId,
        result: PaymentResult,
    },
    /// The cart page.
    Cart,
    /// The checkout page.
    Checkout,
    /// A full-page navigation away from the app (hosted payment page).
    External(Url),
}

impl Route {
    /// Path (or absolute URL for external routes) the host should load.
    #[must_use]
    pub fn to_path(&self) -> String {
        match self {
            Self::PaymentResult { order_id, result } => format!(
                "/payment-success?orderId={}&status={}",
                urlencoding::encode(&order_id.to_string()),
                result.as_str()
            ),
            Self::Cart => "/cart".to_string(),
            Self::Checkout => "/checkout".to_string(),
            Self::External(url) => url.to_string(),
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_path())
    }
}

/// Performs navigation on behalf of the flows.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Shows short user-facing notices (toasts).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(NoticeLevel::Success, message);
    }

    fn info(&self, message: &str) {
        self.notify(NoticeLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// The container the payment provider renders its form into.
pub trait PaymentFormMount: Send + Sync {
    /// Load the provider script with a checkout form token.
    fn embed_token(&self, token: &str);

    /// Insert raw checkout form HTML returned by the backend.
    fn embed_html(&self, html: &str);

    /// Whether the provider's iframe has appeared in the container.
    fn has_iframe(&self) -> bool;
}
