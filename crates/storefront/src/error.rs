//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type. Backend, storage and internal errors
//! are captured to Sentry before they are reported; validation errors are
//! user mistakes and only ever reach the notifier.

use thiserror::Error;

use crate::config::ConfigError;
use crate::services::checkout::{CheckoutError, ValidationError};
use crate::storage::StorageError;
use crate::supabase::SupabaseError;

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Supabase REST or Edge Function call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] SupabaseError),

    /// Local storage read or write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Checkout form input was rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A checkout attempt failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

}

impl AppError {
    /// Whether this error should be reported to Sentry.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        match self {
            Self::Backend(_) | Self::Storage(_) => true,
            Self::Checkout(e) => !matches!(e, CheckoutError::Validation(_)),
            Self::Config(_) | Self::Validation(_) => false,
        }
    }

    /// Capture the error to Sentry (when reportable) and log it.
    ///
    /// Returns `self` so call sites can `return Err(err.report())`.
    #[must_use]
    pub fn report(self) -> Self {
        if self.is_reportable() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::debug!(error = %self, "Storefront error (not reported)");
        }
        self
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after the user signs in to associate errors with them.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Payment initiated", Some(&[("order_id", "…")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
