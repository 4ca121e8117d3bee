//! End-to-end storefront flows against the fake Supabase.
//!
//! Run with: cargo test -p venthub-integration-tests

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::watch;
use venthub_core::{OrderId, OrderStatus, PaymentResult, ProductId, ProductSnapshot, UserId};
use venthub_integration_tests::FakeSupabase;
use venthub_storefront::config::{CheckoutConfig, StorefrontConfig, WatcherConfig};
use venthub_storefront::host::{Navigator, NoticeLevel, Notifier, PaymentFormMount, Route};
use venthub_storefront::services::cart::MergeOutcome;
use venthub_storefront::services::checkout::{
    Address, CheckoutForm, CheckoutHost, CustomerInfo, InvoiceInfo, LegalConsents, PaymentAttempt,
    PaymentMode,
};
use venthub_storefront::services::payment_result::{PaymentOutcome, PaymentReturn};
use venthub_storefront::services::watcher::WatcherState;
use venthub_storefront::state::AppState;
use venthub_storefront::storage::{ClientStorage, FileStore};
use venthub_storefront::supabase::{Backend, CartLineUpsert, SupabaseClient};

// ============================================================================
// Test host
// ============================================================================

/// Records what the flows asked the host to do.
struct TestHost {
    routes: watch::Sender<Option<Route>>,
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl TestHost {
    fn new() -> Arc<Self> {
        let (routes, _) = watch::channel(None);
        Arc::new(Self {
            routes,
            notices: Mutex::new(Vec::new()),
        })
    }

    fn checkout_host(self: &Arc<Self>) -> CheckoutHost {
        CheckoutHost {
            navigator: self.clone(),
            notifier: self.clone(),
            mount: self.clone(),
        }
    }

    fn last_notice(&self) -> Option<(NoticeLevel, String)> {
        self.notices.lock().unwrap().last().cloned()
    }
}

impl Navigator for TestHost {
    fn navigate(&self, route: Route) {
        self.routes.send_replace(Some(route));
    }
}

impl Notifier for TestHost {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().unwrap().push((level, message.to_string()));
    }
}

impl PaymentFormMount for TestHost {
    fn embed_token(&self, _token: &str) {}

    fn embed_html(&self, _html: &str) {}

    fn has_iframe(&self) -> bool {
        false
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn config(fake: &FakeSupabase, dir: &Path) -> StorefrontConfig {
    StorefrontConfig {
        supabase: fake.config(),
        storage_path: dir.join("storage.json"),
        cart_server_sync: true,
        watcher: WatcherConfig {
            interval: Duration::from_millis(50),
            max_polls: None,
        },
        checkout: CheckoutConfig::default(),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

fn app(fake: &FakeSupabase, dir: &Path, host: &Arc<TestHost>) -> AppState {
    let config = config(fake, dir);
    let storage = ClientStorage::new(Arc::new(FileStore::open(&config.storage_path).unwrap()));
    let backend = Arc::new(SupabaseClient::new(&config.supabase).unwrap());
    AppState::from_parts(config, backend, storage, host.checkout_host()).unwrap()
}

fn filled_form() -> CheckoutForm {
    CheckoutForm {
        customer: CustomerInfo {
            name: "Mehmet Kaya".to_string(),
            email: "mehmet@example.com".to_string(),
            phone: "05321234567".to_string(),
        },
        shipping: Address {
            full_address: "Organize Sanayi Bölgesi 4. Cadde No:7".to_string(),
            city: "Bursa".to_string(),
            district: "Nilüfer".to_string(),
            postal_code: "16140".to_string(),
        },
        invoice_info: InvoiceInfo {
            tckn: Some("10000000146".to_string()),
            ..InvoiceInfo::default()
        },
        legal_consents: LegalConsents {
            kvkk: true,
            distance_sales: true,
            pre_info: true,
            order_confirm: true,
            marketing: false,
        },
        ..CheckoutForm::default()
    }
}

fn fan(id: ProductId) -> ProductSnapshot {
    ProductSnapshot {
        id,
        name: "Kanal Fanı 200".to_string(),
        price: dec("1500"),
        image_url: None,
    }
}

// ============================================================================
// Flows
// ============================================================================

#[tokio::test]
async fn test_signed_in_redirect_checkout_resolves_by_polling() {
    let fake = FakeSupabase::start().await;
    let dir = tempfile::tempdir().unwrap();
    let host = TestHost::new();
    let user = UserId::random();
    let cart_id = fake.add_cart(user);
    let product_id = ProductId::random();
    fake.add_product(product_id, "Kanal Fanı 200", 1500.0);

    let state = app(&fake, dir.path(), &host);

    // Guest picks a fan, then logs in.
    state.cart().add(fan(product_id), 2).await.unwrap();
    assert!(fake.cart_lines(cart_id).is_empty());

    let outcome = state.sign_in(user).await.unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            lines: 1,
            failed_upserts: 0
        }
    );
    let lines = fake.cart_lines(cart_id);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["quantity"], 2);

    // Checkout hands off to the hosted page.
    let order_id = OrderId::random();
    fake.respond(
        "order-validate",
        StatusCode::OK,
        json!({ "ok": true, "items": [], "totals": { "subtotal": 3000 } }),
    );
    fake.respond(
        "iyzico-payment",
        StatusCode::OK,
        json!({
            "data": {
                "status": "success",
                "orderId": order_id,
                "conversationId": "conv-e2e",
                "paymentPageUrl": "https://sandbox-cpp.iyzipay.com/?token=tok-e2e",
            }
        }),
    );

    let mut checkout = state.checkout();
    *checkout.form_mut() = filled_form();
    let attempt = checkout.pay().await.unwrap();
    match attempt {
        PaymentAttempt::Started {
            mode: PaymentMode::Redirect(url),
            order_id: started,
        } => {
            assert_eq!(url.as_str(), "https://sandbox-cpp.iyzipay.com/?token=tok-e2e");
            assert_eq!(started, Some(order_id));
        }
        other => panic!("expected redirect, got {other:?}"),
    }
    assert!(matches!(
        host.routes.borrow().as_ref(),
        Some(Route::External(_))
    ));

    let marker = state.storage().pending_marker().unwrap().unwrap();
    assert_eq!(marker.order_id, Some(order_id));

    let payment_body = fake.requests_to("/functions/v1/iyzico-payment")[0]
        .body
        .clone()
        .unwrap();
    assert_eq!(payment_body["amount"], json!(3000.0));
    assert_eq!(payment_body["user_id"], json!(user));

    // The shopper pays elsewhere; the watcher notices.
    let mut routes = host.routes.subscribe();
    let watcher = state.watcher().spawn();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(state.watcher().state(), WatcherState::Watching);

    fake.set_order_status(order_id, OrderStatus::Paid);
    let route = tokio::time::timeout(
        Duration::from_secs(5),
        routes.wait_for(|route| matches!(route, Some(Route::PaymentResult { .. }))),
    )
    .await
    .unwrap()
    .unwrap()
    .clone()
    .unwrap();
    watcher.shutdown().await;

    assert_eq!(
        route,
        Route::PaymentResult {
            order_id,
            result: PaymentResult::Success
        }
    );
    assert!(state.storage().pending_marker().unwrap().is_none());

    // The result page finishes the order.
    let path = route.to_path();
    let (_, query) = path.split_once('?').unwrap();
    let outcome = state
        .payment_result_page()
        .handle(&PaymentReturn::from_query(query))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        PaymentOutcome::Success { order_id: Some(id), .. } if id == order_id
    ));
    assert!(state.cart().is_empty());
    assert!(fake.cart_lines(cart_id).is_empty());
    assert_eq!(state.storage().last_order_id().unwrap(), Some(order_id));
    assert_eq!(
        state.storage().last_order_status().unwrap(),
        Some(PaymentResult::Success)
    );
    assert!(!state.storage().clear_server_cart_once().unwrap());
    assert_eq!(
        host.last_notice(),
        Some((NoticeLevel::Success, "Payment completed successfully".to_string()))
    );
}

#[tokio::test]
async fn test_guest_payment_discards_stale_server_cart_on_next_login() {
    let fake = FakeSupabase::start().await;
    let dir = tempfile::tempdir().unwrap();
    let host = TestHost::new();
    let user = UserId::random();
    let cart_id = fake.add_cart(user);
    let stale = ProductId::random();
    let bought = ProductId::random();
    fake.add_product(stale, "Hava Perdesi", 4200.0);
    fake.add_product(bought, "Kanal Fanı 200", 1500.0);

    // A line left over from an earlier session on another device.
    SupabaseClient::new(&fake.config())
        .unwrap()
        .upsert_cart_item(&CartLineUpsert {
            cart_id,
            product_id: stale,
            quantity: 1,
            unit_price: None,
            price_list_id: None,
        })
        .await
        .unwrap();

    let state = app(&fake, dir.path(), &host);
    state.cart().add(fan(bought), 1).await.unwrap();

    let order_id = OrderId::random();
    let query = format!("?orderId={order_id}&status=success&conversationId=conv-guest");
    state
        .payment_result_page()
        .handle(&PaymentReturn::from_query(&query))
        .await
        .unwrap();
    assert!(state.cart().is_empty());
    assert!(state.storage().clear_server_cart_once().unwrap());

    let outcome = state.sign_in(user).await.unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            lines: 0,
            failed_upserts: 0
        }
    );
    assert!(fake.cart_lines(cart_id).is_empty());
    assert!(!state.storage().clear_server_cart_once().unwrap());
}

#[tokio::test]
async fn test_local_state_survives_restart() {
    let fake = FakeSupabase::start().await;
    let dir = tempfile::tempdir().unwrap();
    let host = TestHost::new();
    let product_id = ProductId::random();
    let order_id = OrderId::random();
    fake.add_product(product_id, "Kanal Fanı 200", 1500.0);
    fake.set_order_status(order_id, OrderStatus::Pending);

    {
        let state = app(&fake, dir.path(), &host);
        state.cart().add(fan(product_id), 3).await.unwrap();
        state
            .storage()
            .set_pending_marker(&venthub_core::PendingOrderMarker::new(
                order_id,
                venthub_core::ConversationId::new("conv-restart"),
            ))
            .unwrap();
    }

    let state = app(&fake, dir.path(), &host);
    assert_eq!(state.cart().count(), 3);
    assert_eq!(state.cart().total(), dec("4500"));

    // Still pending: nothing is cleared.
    let outcome = state.watcher().check_once().await;
    assert_eq!(
        outcome,
        venthub_storefront::services::watcher::CheckOutcome::Pending
    );
    assert!(state.storage().pending_marker().unwrap().is_some());
}

#[tokio::test]
async fn test_backend_rejection_keeps_cart_and_marker_untouched() {
    let fake = FakeSupabase::start().await;
    let dir = tempfile::tempdir().unwrap();
    let host = TestHost::new();
    let product_id = ProductId::random();
    fake.add_product(product_id, "Kanal Fanı 200", 1500.0);
    fake.respond(
        "iyzico-payment",
        StatusCode::BAD_REQUEST,
        json!({ "error": { "code": "VALIDATION_ERROR", "message": "phone rejected" } }),
    );

    let state = app(&fake, dir.path(), &host);
    state.cart().add(fan(product_id), 1).await.unwrap();

    let mut checkout = state.checkout();
    *checkout.form_mut() = filled_form();
    assert!(checkout.pay().await.is_err());

    assert_eq!(
        checkout.step(),
        venthub_storefront::services::checkout::CheckoutStep::Delivery
    );
    assert_eq!(state.cart().count(), 1);
    assert!(state.storage().pending_marker().unwrap().is_none());
    assert!(matches!(host.last_notice(), Some((NoticeLevel::Error, _))));
    // Guests are not validated server-side.
    assert!(fake.requests_to("/functions/v1/order-validate").is_empty());
}
