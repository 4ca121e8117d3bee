//! In-memory fakes for the host seams and the backend.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use venthub_core::{CartId, CartItem, OrderId, OrderStatus, ProductId, ProductSnapshot, UserId};

use crate::host::{Navigator, NoticeLevel, Notifier, PaymentFormMount, Route};
use crate::supabase::{
    Backend, CartLineUpsert, CartValidation, CartValidationRequest, PaymentInitiation,
    PaymentRequest, PriceInfo, SupabaseError,
};

#[allow(clippy::unwrap_used)]
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn product(name: &str, price: &str) -> ProductSnapshot {
    ProductSnapshot {
        id: ProductId::random(),
        name: name.to_string(),
        price: dec(price),
        image_url: None,
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct FakeState {
    carts: HashMap<UserId, CartId>,
    lines: HashMap<CartId, Vec<CartItem>>,
    catalog: HashMap<ProductId, ProductSnapshot>,
    prices: HashMap<ProductId, Decimal>,
    failing_upserts: HashSet<ProductId>,
    orders: HashMap<OrderId, OrderStatus>,
    fail_status: bool,
    status_delay: Option<Duration>,
    status_calls: usize,
    status_in_flight: usize,
    max_status_in_flight: usize,
    cart_lookups: usize,
    upserts: usize,
    validation: Option<Result<CartValidation, SupabaseError>>,
    payment: Option<Result<PaymentInitiation, SupabaseError>>,
    payment_requests: Vec<PaymentRequest>,
}

/// Backend double holding carts, prices and orders in memory.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        locked(&self.state)
    }

    /// Create a server cart for `user` holding `items`.
    pub fn seed_cart(&self, user: UserId, items: Vec<CartItem>) -> CartId {
        let cart_id = CartId::random();
        let mut state = self.state();
        for item in &items {
            state.catalog.insert(item.product_id(), item.product.clone());
        }
        state.carts.insert(user, cart_id);
        state.lines.insert(cart_id, items);
        cart_id
    }

    pub fn set_price(&self, product_id: ProductId, price: Decimal) {
        self.state().prices.insert(product_id, price);
    }

    pub fn server_lines(&self, cart_id: CartId) -> Vec<CartItem> {
        self.state().lines.get(&cart_id).cloned().unwrap_or_default()
    }

    pub fn fail_upserts_for(&self, product_id: ProductId) {
        self.state().failing_upserts.insert(product_id);
    }

    pub fn cart_lookups(&self) -> usize {
        self.state().cart_lookups
    }

    pub fn upsert_count(&self) -> usize {
        self.state().upserts
    }

    pub fn set_order_status(&self, order_id: OrderId, status: OrderStatus) {
        self.state().orders.insert(order_id, status);
    }

    pub fn forget_order(&self, order_id: OrderId) {
        self.state().orders.remove(&order_id);
    }

    pub fn fail_status_checks(&self, fail: bool) {
        self.state().fail_status = fail;
    }

    pub fn set_status_delay(&self, delay: Duration) {
        self.state().status_delay = Some(delay);
    }

    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }

    pub fn max_status_in_flight(&self) -> usize {
        self.state().max_status_in_flight
    }

    /// Answer the next `order-validate` call with `result`.
    pub fn set_validation(&self, result: Result<CartValidation, SupabaseError>) {
        self.state().validation = Some(result);
    }

    /// Answer the next `iyzico-payment` call with `result`.
    pub fn set_payment_response(&self, result: Result<PaymentInitiation, SupabaseError>) {
        self.state().payment = Some(result);
    }

    pub fn payment_requests(&self) -> Vec<PaymentRequest> {
        self.state().payment_requests.clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn order_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>, SupabaseError> {
        let delay = {
            let mut state = self.state();
            state.status_calls += 1;
            state.status_in_flight += 1;
            state.max_status_in_flight = state.max_status_in_flight.max(state.status_in_flight);
            state.status_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.status_in_flight -= 1;
        if state.fail_status {
            return Err(SupabaseError::Api {
                status: 503,
                code: None,
                message: "unavailable".to_string(),
            });
        }
        Ok(state.orders.get(&order_id).copied())
    }

    async fn get_or_create_cart(&self, user_id: UserId) -> Result<CartId, SupabaseError> {
        let mut state = self.state();
        state.cart_lookups += 1;
        let cart_id = *state.carts.entry(user_id).or_insert_with(CartId::random);
        state.lines.entry(cart_id).or_default();
        Ok(cart_id)
    }

    async fn list_cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, SupabaseError> {
        Ok(self.server_lines(cart_id))
    }

    async fn upsert_cart_item(&self, line: &CartLineUpsert) -> Result<(), SupabaseError> {
        let mut state = self.state();
        state.upserts += 1;
        if state.failing_upserts.contains(&line.product_id) {
            return Err(SupabaseError::Api {
                status: 409,
                code: Some("23503".to_string()),
                message: "foreign key violation".to_string(),
            });
        }

        let product = state
            .catalog
            .get(&line.product_id)
            .cloned()
            .unwrap_or_else(|| ProductSnapshot {
                id: line.product_id,
                name: line.product_id.to_string(),
                price: line.unit_price.unwrap_or_default(),
                image_url: None,
            });
        let item = CartItem {
            product,
            quantity: line.quantity,
            unit_price: line.unit_price,
            price_list_id: line.price_list_id,
        };

        let lines = state.lines.entry(line.cart_id).or_default();
        match lines.iter_mut().find(|l| l.product_id() == line.product_id) {
            Some(existing) => *existing = item,
            None => lines.push(item),
        }
        Ok(())
    }

    async fn remove_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<(), SupabaseError> {
        if let Some(lines) = self.state().lines.get_mut(&cart_id) {
            lines.retain(|l| l.product_id() != product_id);
        }
        Ok(())
    }

    async fn clear_cart_items(&self, cart_id: CartId) -> Result<(), SupabaseError> {
        if let Some(lines) = self.state().lines.get_mut(&cart_id) {
            lines.clear();
        }
        Ok(())
    }

    async fn price_info(&self, product: &ProductSnapshot) -> Result<PriceInfo, SupabaseError> {
        let mut state = self.state();
        state.catalog.insert(product.id, product.clone());
        Ok(PriceInfo {
            unit_price: state.prices.get(&product.id).copied().unwrap_or(product.price),
            price_list_id: None,
        })
    }

    async fn validate_cart(
        &self,
        _request: &CartValidationRequest,
    ) -> Result<CartValidation, SupabaseError> {
        self.state().validation.take().unwrap_or_else(|| {
            Ok(CartValidation {
                ok: true,
                ..CartValidation::default()
            })
        })
    }

    async fn initiate_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation, SupabaseError> {
        let mut state = self.state();
        state.payment_requests.push(request.clone());
        state.payment.take().unwrap_or_else(|| {
            Err(SupabaseError::UnexpectedResponse(
                "no payment response scripted".to_string(),
            ))
        })
    }
}

/// Records every navigation.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        locked(&self.routes).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        locked(&self.routes).push(route);
    }
}

/// Records every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotifier {
    pub fn last(&self) -> Option<(NoticeLevel, String)> {
        locked(&self.notices).last().cloned()
    }

    pub fn last_level(&self) -> Option<NoticeLevel> {
        self.last().map(|(level, _)| level)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        locked(&self.notices).push((level, message.to_string()));
    }
}

/// Payment form container whose iframe appears on demand.
#[derive(Default)]
pub struct FakeMount {
    tokens: Mutex<Vec<String>>,
    html: Mutex<Vec<String>>,
    iframe: AtomicBool,
}

impl FakeMount {
    pub fn tokens(&self) -> Vec<String> {
        locked(&self.tokens).clone()
    }

    pub fn html(&self) -> Vec<String> {
        locked(&self.html).clone()
    }

    pub fn set_iframe(&self, present: bool) {
        self.iframe.store(present, Ordering::Release);
    }
}

impl PaymentFormMount for FakeMount {
    fn embed_token(&self, token: &str) {
        locked(&self.tokens).push(token.to_string());
    }

    fn embed_html(&self, html: &str) {
        locked(&self.html).push(html.to_string());
    }

    fn has_iframe(&self) -> bool {
        self.iframe.load(Ordering::Acquire)
    }
}
