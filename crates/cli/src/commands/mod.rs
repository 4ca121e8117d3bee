//! CLI command implementations.

pub mod cart;
pub mod checkout;
pub mod order;
pub mod watch;

use std::sync::Arc;

use secrecy::SecretString;
use tracing::warn;
use venthub_core::UserId;
use venthub_storefront::config::StorefrontConfig;
use venthub_storefront::error::AppError;
use venthub_storefront::services::cart::MergeOutcome;
use venthub_storefront::services::checkout::CheckoutHost;
use venthub_storefront::state::AppState;

use crate::host::TerminalHost;

/// Who the commands act as.
pub struct Session {
    pub user_id: Option<UserId>,
    pub access_token: Option<SecretString>,
}

/// Shared state for a single command run.
pub struct Context {
    pub state: AppState,
    pub host: Arc<TerminalHost>,
    user_id: Option<UserId>,
}

impl Context {
    /// # Errors
    ///
    /// Returns an error if the HTTP client or local storage cannot be set up.
    pub fn new(config: StorefrontConfig, session: Session) -> Result<Self, AppError> {
        if session.user_id.is_some() && session.access_token.is_none() {
            warn!("User ID given without an access token; server cart calls will use the anon key");
        }

        let host = Arc::new(TerminalHost::new());
        let state = AppState::new(
            config,
            CheckoutHost {
                navigator: host.clone(),
                notifier: host.clone(),
                mount: host.clone(),
            },
            session.access_token,
        )
        .map_err(AppError::report)?;

        Ok(Self {
            state,
            host,
            user_id: session.user_id,
        })
    }

    pub const fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Sign in when a user was given, merging the carts.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails.
    pub async fn sign_in(&self) -> Result<Option<MergeOutcome>, AppError> {
        match self.user_id {
            Some(user_id) => self
                .state
                .sign_in(user_id)
                .await
                .map(Some)
                .map_err(AppError::report),
            None => Ok(None),
        }
    }
}
