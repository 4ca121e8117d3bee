//! Local cart state and guest/server reconciliation.
//!
//! The cart lives on the device (see [`ClientStorage`]) and, for signed-in
//! shoppers with server sync enabled, is mirrored line by line into the
//! `cart_items` table. Mirroring is optimistic: local state changes first,
//! backend failures are logged and never roll the local cart back.
//!
//! On sign-in [`CartService::on_login`] merges the guest cart into the
//! server cart. Server quantities win for products present on both sides;
//! guest-only lines are appended.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use venthub_core::{
    CartId, CartItem, OrderStatus, PaymentResult, ProductId, ProductSnapshot, UserId, round_money,
};

use crate::host::Notifier;
use crate::storage::{ClientStorage, StorageError};
use crate::supabase::{Backend, CartLineUpsert, StockIssue, SupabaseError, ValidatedItem};

/// Prices closer than this are considered equal.
const PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Merge a guest cart into a server cart.
///
/// Server lines come first, in server order, with server quantities. Local
/// lines whose product is not on the server are appended in local order.
/// Quantities are never summed.
#[must_use]
pub fn merge_items(local: &[CartItem], server: &[CartItem]) -> Vec<CartItem> {
    let on_server: HashSet<ProductId> = server.iter().map(CartItem::product_id).collect();

    let mut merged = server.to_vec();
    merged.extend(
        local
            .iter()
            .filter(|item| !on_server.contains(&item.product_id()))
            .cloned(),
    );
    merged
}

/// What a sign-in merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Sync is off, or another merge was already running.
    Skipped,
    /// The carts were merged; `failed_upserts` lines could not be mirrored.
    Merged { lines: usize, failed_upserts: usize },
}

#[derive(Debug, Default)]
struct CartState {
    items: Vec<CartItem>,
    user: Option<UserId>,
    cart_id: Option<CartId>,
}

/// Resets the merge flag when the merge ends, however it ends.
struct MergeGuard<'a>(&'a AtomicBool);

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The shopper's cart.
pub struct CartService {
    backend: Arc<dyn Backend>,
    storage: ClientStorage,
    notifier: Arc<dyn Notifier>,
    server_sync: bool,
    state: Mutex<CartState>,
    merging: AtomicBool,
}

impl CartService {
    pub fn new(
        backend: Arc<dyn Backend>,
        storage: ClientStorage,
        notifier: Arc<dyn Notifier>,
        server_sync: bool,
    ) -> Self {
        Self {
            backend,
            storage,
            notifier,
            server_sync,
            state: Mutex::new(CartState::default()),
            merging: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the in-memory lines and persist them.
    fn store_items(&self, items: Vec<CartItem>) -> Result<(), StorageError> {
        self.storage.save_cart_items(&items)?;
        self.state().items = items;
        Ok(())
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Load the persisted cart.
    ///
    /// Outdated carts are dropped. After a successful payment the cart comes
    /// back empty and the post-payment breadcrumbs are removed.
    pub fn load(&self) -> Result<(), StorageError> {
        if self.storage.ensure_schema()? {
            info!("Cart schema changed, starting with an empty cart");
        }

        if self.storage.last_order_status()? == Some(PaymentResult::Success) {
            debug!("Previous order paid, discarding stored cart");
            self.storage.clear_cart()?;
            self.storage.clear_pending_marker()?;
            self.storage.clear_order_breadcrumbs()?;
            self.state().items.clear();
            return Ok(());
        }

        self.state().items = self.storage.cart_items()?;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.state().items.clone()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        round_money(self.state().items.iter().map(CartItem::line_total).sum())
    }

    /// Number of units across all lines.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.state()
            .items
            .iter()
            .map(|item| u64::from(item.quantity))
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.state().user
    }

    // =========================================================================
    // Local operations
    // =========================================================================

    /// Add units of a product, summing with an existing line.
    pub async fn add(
        &self,
        product: ProductSnapshot,
        quantity: u32,
    ) -> Result<(), StorageError> {
        if quantity == 0 {
            return Ok(());
        }

        let line = {
            let mut items = self.items();
            let line = if let Some(existing) =
                items.iter_mut().find(|item| item.product_id() == product.id)
            {
                existing.quantity = existing.quantity.saturating_add(quantity);
                existing.clone()
            } else {
                let line = CartItem::new(product, quantity);
                items.push(line.clone());
                line
            };
            self.store_items(items)?;
            line
        };

        self.mirror_line(&line, None).await;
        Ok(())
    }

    pub async fn remove(&self, product_id: ProductId) -> Result<(), StorageError> {
        let mut items = self.items();
        let before = items.len();
        items.retain(|item| item.product_id() != product_id);
        if items.len() == before {
            return Ok(());
        }
        self.store_items(items)?;

        if let Some(cart_id) = self.server_cart().await
            && let Err(e) = self.backend.remove_cart_item(cart_id, product_id).await
        {
            warn!(error = %e, product_id = %product_id, "Failed to mirror cart removal");
        }
        Ok(())
    }

    /// Set a line's quantity. Zero or less removes the line.
    pub async fn update_quantity(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), StorageError> {
        if quantity <= 0 {
            return self.remove(product_id).await;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);

        let mut items = self.items();
        let Some(line) = items.iter_mut().find(|item| item.product_id() == product_id) else {
            return Ok(());
        };
        line.quantity = quantity;
        let line = line.clone();
        self.store_items(items)?;

        self.mirror_line(&line, None).await;
        Ok(())
    }

    /// Empty the cart, locally and on the server.
    ///
    /// Also drops the pending marker. `silent` suppresses the notice.
    pub async fn clear(&self, silent: bool) -> Result<(), StorageError> {
        self.state().items.clear();
        self.storage.clear_cart()?;
        self.storage.clear_pending_marker()?;

        if !silent {
            self.notifier.success("Cart cleared");
        }

        if let Some(cart_id) = self.server_cart().await
            && let Err(e) = self.backend.clear_cart_items(cart_id).await
        {
            warn!(error = %e, cart_id = %cart_id, "Failed to clear server cart");
        }
        Ok(())
    }

    /// Apply unit prices computed by the server.
    ///
    /// Only lines whose price moves by more than 0.01 change, and only those
    /// are written back. Returns the number of changed lines.
    pub async fn apply_server_pricing(
        &self,
        priced: &[ValidatedItem],
    ) -> Result<usize, StorageError> {
        let prices: HashMap<ProductId, &ValidatedItem> =
            priced.iter().map(|item| (item.product_id, item)).collect();

        let mut items = self.items();
        let mut changed = Vec::new();
        for line in &mut items {
            let Some(server) = prices.get(&line.product_id()) else {
                continue;
            };
            let next = round_money(server.unit_price);
            let current = round_money(line.effective_unit_price());
            if (current - next).abs() <= PRICE_TOLERANCE {
                continue;
            }
            line.unit_price = Some(next);
            line.price_list_id = server.price_list_id;
            changed.push(line.clone());
        }

        if changed.is_empty() {
            return Ok(0);
        }
        self.store_items(items)?;

        for line in &changed {
            self.mirror_line(line, line.unit_price).await;
        }
        debug!(changed = changed.len(), "Applied server pricing");
        Ok(changed.len())
    }

    /// Lower quantities to what is in stock, removing sold-out lines.
    pub async fn adjust_for_stock(
        &self,
        issues: &[StockIssue],
    ) -> Result<usize, StorageError> {
        for issue in issues {
            if issue.available <= 0 {
                self.remove(issue.product_id).await?;
            } else {
                self.update_quantity(issue.product_id, issue.available)
                    .await?;
            }
        }
        Ok(issues.len())
    }

    // =========================================================================
    // Server mirroring
    // =========================================================================

    /// The signed-in shopper's server cart, when sync applies.
    async fn server_cart(&self) -> Option<CartId> {
        if !self.server_sync {
            return None;
        }
        let (user, cached) = {
            let state = self.state();
            (state.user?, state.cart_id)
        };
        if cached.is_some() {
            return cached;
        }

        match self.backend.get_or_create_cart(user).await {
            Ok(cart_id) => {
                self.state().cart_id = Some(cart_id);
                Some(cart_id)
            }
            Err(e) => {
                warn!(error = %e, user_id = %user, "Failed to resolve server cart");
                None
            }
        }
    }

    /// Upsert one line, looking up its unit price unless one is given.
    async fn mirror_line(&self, line: &CartItem, unit_price: Option<Decimal>) {
        let Some(cart_id) = self.server_cart().await else {
            return;
        };
        if let Err(e) = self.upsert_line(cart_id, line, unit_price).await {
            warn!(error = %e, product_id = %line.product_id(), "Failed to mirror cart line");
        }
    }

    async fn upsert_line(
        &self,
        cart_id: CartId,
        line: &CartItem,
        unit_price: Option<Decimal>,
    ) -> Result<CartItem, SupabaseError> {
        let (unit_price, price_list_id) = match unit_price {
            Some(price) => (price, line.price_list_id),
            None => {
                let info = self.backend.price_info(&line.product).await?;
                (info.unit_price, info.price_list_id)
            }
        };

        self.backend
            .upsert_cart_item(&CartLineUpsert {
                cart_id,
                product_id: line.product_id(),
                quantity: line.quantity,
                unit_price: Some(unit_price),
                price_list_id,
            })
            .await?;

        Ok(CartItem {
            unit_price: Some(unit_price),
            price_list_id,
            ..line.clone()
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Merge the guest cart with the user's server cart.
    ///
    /// A second call while a merge is running is dropped, not queued.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn on_login(&self, user_id: UserId) -> crate::error::Result<MergeOutcome> {
        {
            let mut state = self.state();
            if state.user != Some(user_id) {
                state.cart_id = None;
            }
            state.user = Some(user_id);
        }

        if !self.server_sync {
            return Ok(MergeOutcome::Skipped);
        }
        if self
            .merging
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Cart merge already running, skipping");
            return Ok(MergeOutcome::Skipped);
        }
        let _guard = MergeGuard(&self.merging);

        self.merge_with_server(user_id).await
    }

    async fn merge_with_server(&self, user_id: UserId) -> crate::error::Result<MergeOutcome> {
        let cart_id = self.backend.get_or_create_cart(user_id).await?;
        self.state().cart_id = Some(cart_id);

        // Lines left on this device by another account never reach this one.
        if let Some(owner) = self.storage.cart_owner()?
            && owner != user_id
        {
            info!(previous_owner = %owner, "Stored cart belongs to another user, discarding");
            self.state().items.clear();
            self.storage.clear_cart()?;
        }

        let mut local = self.items();
        let mut clear_server = self.storage.clear_server_cart_once()?;

        if let Some(marker) = self.storage.pending_marker()?
            && let Some(order_id) = marker.order_id
        {
            match self.backend.order_status(order_id).await {
                Ok(Some(OrderStatus::Paid)) => {
                    info!(
                        order_id = %order_id,
                        "Pending order already paid, discarding guest cart"
                    );
                    clear_server = true;
                    self.storage.set_last_order_status(PaymentResult::Success)?;
                    self.storage.clear_pending_marker()?;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, order_id = %order_id, "Could not check pending order"),
            }
        }

        if clear_server {
            local.clear();
            self.state().items.clear();
            self.storage.clear_cart()?;
            self.backend.clear_cart_items(cart_id).await?;
            self.storage.remove_clear_server_cart_once()?;
        }

        let server = self.backend.list_cart_items(cart_id).await?;
        let merged = merge_items(&local, &server);

        let mut persisted = Vec::with_capacity(merged.len());
        let mut failed_upserts = 0;
        for line in merged {
            match self.upsert_line(cart_id, &line, None).await {
                Ok(priced) => persisted.push(priced),
                Err(e) => {
                    failed_upserts += 1;
                    warn!(error = %e, product_id = %line.product_id(), "Cart line upsert failed");
                    persisted.push(line);
                }
            }
        }

        let lines = persisted.len();
        self.store_items(persisted)?;
        self.storage.set_cart_owner(user_id)?;

        info!(lines, failed_upserts, "Cart merged with server");
        Ok(MergeOutcome::Merged {
            lines,
            failed_upserts,
        })
    }

    /// Forget the signed-in user; the local cart becomes a guest cart again.
    pub fn on_logout(&self) -> Result<(), StorageError> {
        {
            let mut state = self.state();
            state.user = None;
            state.cart_id = None;
        }
        self.storage.clear_cart_owner()
    }
}
