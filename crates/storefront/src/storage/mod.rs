//! Client-local key-value storage.
//!
//! The storefront keeps a handful of string values across sessions: the
//! guest cart, the pending order marker, post-payment breadcrumbs and the
//! language preference. [`LocalStore`] is the raw string store (memory or
//! JSON file); [`ClientStorage`] layers typed accessors, the schema version
//! and marker change notifications on top.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;
use venthub_core::{CartItem, OrderId, PaymentResult, PendingOrderMarker, UserId};

/// Storage keys shared with the web storefront.
pub mod keys {
    pub const CART: &str = "venthub-cart";
    pub const CART_VERSION: &str = "venthub-cart-version";
    pub const CART_OWNER: &str = "venthub-cart-owner";
    pub const CART_SCHEMA: &str = "venthub-cart-schema";
    pub const PENDING_ORDER: &str = "vh_pending_order";
    pub const LAST_ORDER_ID: &str = "vh_last_order_id";
    pub const LAST_ORDER_STATUS: &str = "vh_last_order_status";
    pub const CLEAR_SERVER_CART_ONCE: &str = "vh_clear_server_cart_once";
    pub const LANGUAGE: &str = "lang";
}

/// Current cart schema. Older carts are dropped on load.
pub const CART_SCHEMA_VERSION: &str = "2";

/// Errors from the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// A string key-value store.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Storefront language preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Tr,
    En,
}

impl Language {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Tr => "tr",
            Self::En => "en",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "tr" => Some(Self::Tr),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

// =============================================================================
// ClientStorage
// =============================================================================

/// Typed access to the storefront's local keys.
#[derive(Clone)]
pub struct ClientStorage {
    store: Arc<dyn LocalStore>,
    marker_changes: Arc<watch::Sender<u64>>,
}

impl ClientStorage {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            store,
            marker_changes: Arc::new(tx),
        }
    }

    /// Storage backed by a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Receiver bumped every time the pending marker is written or removed.
    #[must_use]
    pub fn subscribe_marker(&self) -> watch::Receiver<u64> {
        self.marker_changes.subscribe()
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring malformed stored value");
                Ok(None)
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw)
    }

    fn notify_marker(&self) {
        self.marker_changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Drop cart keys and the marker when the stored schema is outdated.
    ///
    /// Returns `true` when a migration happened.
    pub fn ensure_schema(&self) -> Result<bool, StorageError> {
        if self.store.get(keys::CART_SCHEMA)?.as_deref() == Some(CART_SCHEMA_VERSION) {
            return Ok(false);
        }

        self.store.remove(keys::CART)?;
        self.store.remove(keys::CART_VERSION)?;
        self.store.remove(keys::CART_OWNER)?;
        self.store.remove(keys::PENDING_ORDER)?;
        self.store.set(keys::CART_SCHEMA, CART_SCHEMA_VERSION)?;
        self.notify_marker();
        Ok(true)
    }

    // =========================================================================
    // Pending order
    // =========================================================================

    /// The pending marker, `None` when absent or unparsable.
    pub fn pending_marker(&self) -> Result<Option<PendingOrderMarker>, StorageError> {
        self.read_json(keys::PENDING_ORDER)
    }

    /// Write the marker, replacing any previous one.
    pub fn set_pending_marker(&self, marker: &PendingOrderMarker) -> Result<(), StorageError> {
        self.write_json(keys::PENDING_ORDER, marker)?;
        self.notify_marker();
        Ok(())
    }

    pub fn clear_pending_marker(&self) -> Result<(), StorageError> {
        self.store.remove(keys::PENDING_ORDER)?;
        self.notify_marker();
        Ok(())
    }

    pub fn last_order_id(&self) -> Result<Option<OrderId>, StorageError> {
        Ok(self
            .store
            .get(keys::LAST_ORDER_ID)?
            .and_then(|raw| raw.parse().ok()))
    }

    pub fn set_last_order_id(&self, order_id: OrderId) -> Result<(), StorageError> {
        self.store.set(keys::LAST_ORDER_ID, &order_id.to_string())
    }

    pub fn last_order_status(&self) -> Result<Option<PaymentResult>, StorageError> {
        Ok(self
            .store
            .get(keys::LAST_ORDER_STATUS)?
            .and_then(|raw| match raw.as_str() {
                "success" => Some(PaymentResult::Success),
                "failure" => Some(PaymentResult::Failure),
                _ => None,
            }))
    }

    pub fn set_last_order_status(&self, result: PaymentResult) -> Result<(), StorageError> {
        self.store.set(keys::LAST_ORDER_STATUS, result.as_str())
    }

    /// Remove the post-payment breadcrumbs (last order id and status).
    pub fn clear_order_breadcrumbs(&self) -> Result<(), StorageError> {
        self.store.remove(keys::LAST_ORDER_ID)?;
        self.store.remove(keys::LAST_ORDER_STATUS)
    }

    /// Whether the next login should wipe the server cart.
    pub fn clear_server_cart_once(&self) -> Result<bool, StorageError> {
        Ok(self.store.get(keys::CLEAR_SERVER_CART_ONCE)?.as_deref() == Some("1"))
    }

    pub fn set_clear_server_cart_once(&self) -> Result<(), StorageError> {
        self.store.set(keys::CLEAR_SERVER_CART_ONCE, "1")
    }

    pub fn remove_clear_server_cart_once(&self) -> Result<(), StorageError> {
        self.store.remove(keys::CLEAR_SERVER_CART_ONCE)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub fn cart_items(&self) -> Result<Vec<CartItem>, StorageError> {
        Ok(self.read_json(keys::CART)?.unwrap_or_default())
    }

    /// Persist the cart and bump its version (millisecond timestamp).
    pub fn save_cart_items(&self, items: &[CartItem]) -> Result<(), StorageError> {
        self.write_json(keys::CART, items)?;
        self.store.set(
            keys::CART_VERSION,
            &Utc::now().timestamp_millis().to_string(),
        )
    }

    pub fn cart_version(&self) -> Result<Option<i64>, StorageError> {
        Ok(self
            .store
            .get(keys::CART_VERSION)?
            .and_then(|raw| raw.parse().ok()))
    }

    /// Remove the cart, its version and owner tag.
    pub fn clear_cart(&self) -> Result<(), StorageError> {
        self.store.remove(keys::CART)?;
        self.store.remove(keys::CART_VERSION)?;
        self.store.remove(keys::CART_OWNER)
    }

    pub fn cart_owner(&self) -> Result<Option<UserId>, StorageError> {
        Ok(self
            .store
            .get(keys::CART_OWNER)?
            .and_then(|raw| raw.parse().ok()))
    }

    pub fn set_cart_owner(&self, user_id: UserId) -> Result<(), StorageError> {
        self.store.set(keys::CART_OWNER, &user_id.to_string())
    }

    pub fn clear_cart_owner(&self) -> Result<(), StorageError> {
        self.store.remove(keys::CART_OWNER)
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// Language preference, Turkish unless set.
    pub fn language(&self) -> Result<Language, StorageError> {
        Ok(self
            .store
            .get(keys::LANGUAGE)?
            .and_then(|raw| Language::from_code(&raw))
            .unwrap_or_default())
    }

    pub fn set_language(&self, language: Language) -> Result<(), StorageError> {
        self.store.set(keys::LANGUAGE, language.code())
    }
}
