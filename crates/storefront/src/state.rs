//! Application state shared across the storefront flows.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;
use venthub_core::UserId;

use crate::config::StorefrontConfig;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::host::{Navigator, Notifier, PaymentFormMount};
use crate::services::cart::{CartService, MergeOutcome};
use crate::services::checkout::{CheckoutHost, CheckoutSession};
use crate::services::payment_result::PaymentResultPage;
use crate::services::watcher::PaymentWatcher;
use crate::storage::{ClientStorage, FileStore};
use crate::supabase::{Backend, SupabaseClient};

/// Everything the flows share.
///
/// This struct is cheaply cloneable via `Arc`. The cart, watcher and
/// checkout sessions it hands out all see the same backend and the same
/// local storage.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: Arc<dyn Backend>,
    storage: ClientStorage,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    mount: Arc<dyn PaymentFormMount>,
    cart: Arc<CartService>,
    watcher: PaymentWatcher,
}

impl AppState {
    /// Wire the flows against Supabase and the file-backed local store.
    ///
    /// With an access token the backend is called as that user.
    /// Call [`AppState::sign_in`] afterwards to merge the carts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the storage
    /// file cannot be opened.
    pub fn new(
        config: StorefrontConfig,
        host: CheckoutHost,
        access_token: Option<SecretString>,
    ) -> Result<Self> {
        let client = SupabaseClient::new(&config.supabase)?;
        let client = match access_token {
            Some(token) => client.with_access_token(token),
            None => client,
        };
        let storage = ClientStorage::new(Arc::new(FileStore::open(&config.storage_path)?));

        Self::from_parts(config, Arc::new(client), storage, host)
    }

    /// Wire the flows against an arbitrary backend and store.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored cart cannot be loaded.
    pub fn from_parts(
        config: StorefrontConfig,
        backend: Arc<dyn Backend>,
        storage: ClientStorage,
        host: CheckoutHost,
    ) -> Result<Self> {
        let cart = Arc::new(CartService::new(
            backend.clone(),
            storage.clone(),
            host.notifier.clone(),
            config.cart_server_sync,
        ));
        cart.load()?;

        let watcher = PaymentWatcher::new(
            backend.clone(),
            storage.clone(),
            host.navigator.clone(),
            config.watcher,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                storage,
                navigator: host.navigator,
                notifier: host.notifier,
                mount: host.mount,
                cart,
                watcher,
            }),
        })
    }

    /// Associate the flows with a signed-in user and merge the carts.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cart cannot be read or written.
    pub async fn sign_in(&self, user_id: UserId) -> Result<MergeOutcome> {
        set_sentry_user(&user_id);
        let outcome = self.inner.cart.on_login(user_id).await?;
        info!(user_id = %user_id, ?outcome, "Signed in");
        Ok(outcome)
    }

    /// Forget the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be updated.
    pub fn sign_out(&self) -> Result<()> {
        clear_sentry_user();
        self.inner.cart.on_logout()?;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    #[must_use]
    pub fn storage(&self) -> &ClientStorage {
        &self.inner.storage
    }

    #[must_use]
    pub fn cart(&self) -> &Arc<CartService> {
        &self.inner.cart
    }

    #[must_use]
    pub fn watcher(&self) -> &PaymentWatcher {
        &self.inner.watcher
    }

    /// Start a fresh checkout.
    #[must_use]
    pub fn checkout(&self) -> CheckoutSession {
        CheckoutSession::new(
            self.inner.backend.clone(),
            self.inner.cart.clone(),
            self.inner.storage.clone(),
            self.host(),
            self.inner.config.checkout,
        )
    }

    #[must_use]
    pub fn payment_result_page(&self) -> PaymentResultPage {
        PaymentResultPage::new(
            self.inner.cart.clone(),
            self.inner.storage.clone(),
            self.inner.notifier.clone(),
        )
    }

    fn host(&self) -> CheckoutHost {
        CheckoutHost {
            navigator: self.inner.navigator.clone(),
            notifier: self.inner.notifier.clone(),
            mount: self.inner.mount.clone(),
        }
    }
}
