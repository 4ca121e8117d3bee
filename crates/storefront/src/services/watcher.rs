//! Pending order watcher.
//!
//! After the shopper leaves for the hosted payment page (or pays inside the
//! embedded form) the only link back to the order is the pending marker in
//! local storage. The watcher polls the order's status while a marker
//! exists and, once the order is `paid` or `failed`, removes the marker and
//! navigates to the payment result page.
//!
//! # Triggers
//!
//! - a fixed-interval timer, running only while a marker is present
//! - focus and visibility changes, which check immediately
//! - marker writes and route changes, which re-evaluate the timer
//!
//! Checks never overlap: a check requested while another is in flight is
//! skipped.

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use venthub_core::{PaymentResult, PendingOrderMarker};

use crate::config::WatcherConfig;
use crate::error::add_breadcrumb;
use crate::host::{Navigator, Route};
use crate::storage::ClientStorage;
use crate::supabase::Backend;

/// Queue depth for host triggers.
const TRIGGER_BUFFER: usize = 16;

/// Host events that prompt the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTrigger {
    /// The window regained focus.
    Focus,
    /// The document became visible.
    Visible,
    /// The pending marker was written elsewhere (another tab, checkout).
    MarkerChanged,
    /// The host navigated.
    RouteChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatcherState {
    /// No pending marker.
    #[default]
    Idle,
    /// A marker is present and the order is being polled.
    Watching,
    /// The order reached a terminal status; the marker is gone.
    Resolved,
}

/// Result of a single status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Another check was in flight.
    Skipped,
    /// No usable marker; the backend was not called.
    NoMarker,
    /// The order is not settled yet, or its status could not be read.
    Pending,
    /// The order settled and the shopper was sent to the result page.
    Resolved(PaymentResult),
}

struct WatcherInner {
    backend: Arc<dyn Backend>,
    storage: ClientStorage,
    navigator: Arc<dyn Navigator>,
    config: WatcherConfig,
    checking: AtomicBool,
    state: Mutex<WatcherState>,
}

/// Clears the in-flight flag when a check ends.
struct CheckGuard<'a>(&'a AtomicBool);

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls the pending order until its payment settles.
#[derive(Clone)]
pub struct PaymentWatcher {
    inner: Arc<WatcherInner>,
}

impl PaymentWatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        storage: ClientStorage,
        navigator: Arc<dyn Navigator>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                backend,
                storage,
                navigator,
                config,
                checking: AtomicBool::new(false),
                state: Mutex::new(WatcherState::Idle),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> WatcherState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WatcherState) {
        let mut current = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            debug!(from = ?*current, to = ?state, "Watcher state changed");
            *current = state;
        }
    }

    fn current_marker(&self) -> Option<PendingOrderMarker> {
        match self.inner.storage.pending_marker() {
            Ok(marker) => marker,
            Err(e) => {
                warn!(error = %e, "Could not read pending marker");
                None
            }
        }
    }

    /// Check the pending order once.
    #[instrument(skip(self))]
    pub async fn check_once(&self) -> CheckOutcome {
        if self
            .inner
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Check already in flight, skipping");
            return CheckOutcome::Skipped;
        }
        let _guard = CheckGuard(&self.inner.checking);

        let Some(marker) = self.current_marker() else {
            if self.state() == WatcherState::Watching {
                self.set_state(WatcherState::Idle);
            }
            return CheckOutcome::NoMarker;
        };
        let Some(order_id) = marker.order_id else {
            debug!("Pending marker has no order id");
            return CheckOutcome::NoMarker;
        };

        self.set_state(WatcherState::Watching);

        let status = match self.inner.backend.order_status(order_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!(order_id = %order_id, "Order not visible yet");
                return CheckOutcome::Pending;
            }
            Err(e) => {
                warn!(error = %e, order_id = %order_id, "Order status check failed");
                return CheckOutcome::Pending;
            }
        };

        let Some(result) = status.payment_result() else {
            debug!(order_id = %order_id, %status, "Order still pending");
            return CheckOutcome::Pending;
        };

        if let Err(e) = self.inner.storage.clear_pending_marker() {
            warn!(error = %e, "Failed to clear pending marker");
        }
        self.set_state(WatcherState::Resolved);

        info!(order_id = %order_id, %result, "Payment settled");
        add_breadcrumb(
            "payment",
            "Pending order settled",
            Some(&[("order_id", &order_id.to_string()), ("result", result.as_str())]),
        );
        self.inner
            .navigator
            .navigate(Route::PaymentResult { order_id, result });

        CheckOutcome::Resolved(result)
    }

    /// Start the background loop.
    ///
    /// The loop runs until the handle is shut down or dropped.
    #[must_use]
    pub fn spawn(&self) -> WatcherHandle {
        let (tx, rx) = mpsc::channel(TRIGGER_BUFFER);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.clone().run(rx, shutdown.clone()));

        WatcherHandle {
            triggers: tx,
            shutdown,
            task: Some(task),
        }
    }

    fn new_ticker(&self) -> Interval {
        let period = self.inner.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn run(self, mut triggers: mpsc::Receiver<WatchTrigger>, shutdown: CancellationToken) {
        let mut marker_changes: watch::Receiver<u64> = self.inner.storage.subscribe_marker();
        let mut marker_feed_open = true;
        let mut triggers_open = true;
        let mut timer = TimerState::default();

        self.reevaluate(&mut timer);
        debug!(state = ?self.state(), "Payment watcher started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                trigger = triggers.recv(), if triggers_open => {
                    match trigger {
                        Some(WatchTrigger::Focus | WatchTrigger::Visible) => {
                            self.check_once().await;
                        }
                        Some(WatchTrigger::MarkerChanged | WatchTrigger::RouteChanged) => {}
                        None => triggers_open = false,
                    }
                    self.reevaluate(&mut timer);
                }
                changed = marker_changes.changed(), if marker_feed_open => {
                    if changed.is_err() {
                        marker_feed_open = false;
                    }
                    self.reevaluate(&mut timer);
                }
                () = next_tick(&mut timer.ticker) => {
                    timer.polls = timer.polls.saturating_add(1);
                    self.check_once().await;
                    self.reevaluate(&mut timer);
                }
            }
        }

        debug!("Payment watcher stopped");
    }

    /// Start or stop the timer to match the current marker.
    fn reevaluate(&self, timer: &mut TimerState) {
        let marker = self.current_marker();

        if marker != timer.watched {
            // A different marker gets a fresh poll budget.
            timer.polls = 0;
            timer.ticker = None;
            timer.watched.clone_from(&marker);
        }

        if marker.is_none() {
            timer.ticker = None;
            if self.state() != WatcherState::Idle {
                self.set_state(WatcherState::Idle);
            }
            return;
        }

        if let Some(max) = self.inner.config.max_polls
            && timer.polls >= max
        {
            if timer.ticker.take().is_some() {
                info!(polls = timer.polls, "Poll limit reached, waiting for a trigger");
            }
            return;
        }

        if timer.ticker.is_none() {
            timer.ticker = Some(self.new_ticker());
        }
        if self.state() == WatcherState::Idle {
            self.set_state(WatcherState::Watching);
        }
    }
}

#[derive(Default)]
struct TimerState {
    ticker: Option<Interval>,
    polls: u32,
    watched: Option<PendingOrderMarker>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

/// Handle to a running watcher loop.
pub struct WatcherHandle {
    triggers: mpsc::Sender<WatchTrigger>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Forward a host event to the loop. Dropped when the queue is full.
    pub fn trigger(&self, trigger: WatchTrigger) {
        if let Err(e) = self.triggers.try_send(trigger) {
            debug!(error = %e, ?trigger, "Dropping watcher trigger");
        }
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Payment watcher task failed");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
