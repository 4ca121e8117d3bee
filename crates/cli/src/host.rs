//! Terminal implementations of the storefront host seams.
//!
//! Navigation and notices become log lines. There is nowhere to render the
//! payment provider's form, so no iframe ever appears and checkout falls
//! back to the hosted payment page.

use tokio::sync::watch;
use tracing::{Level, error, info};
use venthub_storefront::host::{Navigator, NoticeLevel, Notifier, PaymentFormMount, Route};

pub struct TerminalHost {
    routes: watch::Sender<Option<Route>>,
}

impl TerminalHost {
    pub fn new() -> Self {
        let (routes, _) = watch::channel(None);
        Self { routes }
    }

    /// Follow the most recent navigation.
    pub fn subscribe(&self) -> watch::Receiver<Option<Route>> {
        self.routes.subscribe()
    }
}

impl Navigator for TerminalHost {
    fn navigate(&self, route: Route) {
        match &route {
            Route::External(url) => info!(url = %url, "Open this page to continue"),
            other => info!(route = %other, "Navigate"),
        }
        self.routes.send_replace(Some(route));
    }
}

impl Notifier for TerminalHost {
    fn notify(&self, level: NoticeLevel, message: &str) {
        if severity(level) == Level::ERROR {
            error!(notice = "error", "{message}");
        } else {
            info!(notice = notice_name(level), "{message}");
        }
    }
}

impl PaymentFormMount for TerminalHost {
    fn embed_token(&self, _token: &str) {
        info!("Payment form token received; it cannot be embedded in a terminal");
    }

    fn embed_html(&self, html: &str) {
        info!(
            bytes = html.len(),
            "Payment form markup received; it cannot be rendered in a terminal"
        );
    }

    fn has_iframe(&self) -> bool {
        false
    }
}

/// Log level a notice is written at.
const fn severity(level: NoticeLevel) -> Level {
    match level {
        NoticeLevel::Success | NoticeLevel::Info => Level::INFO,
        NoticeLevel::Error => Level::ERROR,
    }
}

const fn notice_name(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Success => "success",
        NoticeLevel::Info => "info",
        NoticeLevel::Error => "error",
    }
}

impl Default for TerminalHost {
    fn default() -> Self {
        Self::new()
    }
}
