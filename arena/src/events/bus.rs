//! Async pub/sub event bus.
//!
//! Decouples the scheduler's state changes from any number of observers.
//! `emit` never blocks (unbounded queue); one background task dispatches each
//! event to its type-specific handlers and then to wildcard handlers, each in
//! subscription order. A panicking handler is logged and never stops dispatch
//! to the remaining handlers.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::types::ArenaEvent;

/// Subscription type that receives every event.
pub const WILDCARD: &str = "*";

/// A registered event handler: an async closure over the event.
pub type EventHandler = Arc<dyn Fn(ArenaEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    handler: EventHandler,
}

type HandlerMap = HashMap<String, Vec<Registration>>;

/// Shared reference to an [`EventBus`].
pub type SharedEventBus = Arc<EventBus>;

/// Multi-producer, single-dispatcher event bus with wildcard subscriptions.
pub struct EventBus {
    handlers: Arc<Mutex<HandlerMap>>,
    tx: mpsc::UnboundedSender<ArenaEvent>,
    /// Receiver parked here while the dispatch task is not running.
    inbox: Mutex<Option<mpsc::UnboundedReceiver<ArenaEvent>>>,
    dispatch: Mutex<Option<(CancellationToken, JoinHandle<mpsc::UnboundedReceiver<ArenaEvent>>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handlers: Arc::new(Mutex::new(HashMap::new())),
            tx,
            inbox: Mutex::new(Some(rx)),
            dispatch: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Register a handler for `event_type` (or [`WILDCARD`] for everything).
    ///
    /// Handlers for one type run in subscription order.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(ArenaEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .expect("handler map lock")
            .entry(event_type.to_string())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        id
    }

    /// Remove one registration. Returns false if it was not found.
    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut map = self.handlers.lock().expect("handler map lock");
        if let Some(regs) = map.get_mut(event_type) {
            let before = regs.len();
            regs.retain(|r| r.id != id);
            return regs.len() != before;
        }
        false
    }

    /// Enqueue an event. Non-blocking; producers never wait on dispatch.
    pub fn emit(&self, event: ArenaEvent) {
        debug!(event_type = event.event_type(), "emit");
        if self.tx.send(event).is_err() {
            warn!("event bus inbox closed; dropping event");
        }
    }

    /// Whether the dispatch task is running.
    pub fn is_running(&self) -> bool {
        self.dispatch.lock().expect("dispatch lock").is_some()
    }

    /// Start the dispatch task. No-op while already running.
    pub fn start(&self) {
        let Some(rx) = self.inbox.lock().expect("inbox lock").take() else {
            return;
        };
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::dispatch_loop(
            Arc::clone(&self.handlers),
            rx,
            cancel.clone(),
        ));
        *self.dispatch.lock().expect("dispatch lock") = Some((cancel, handle));
    }

    /// Stop the dispatch task and await its completion. Events already
    /// queued are flushed before the task exits; once `stop` returns, no
    /// handler is running or will run. No-op while already stopped.
    pub async fn stop(&self) {
        let entry = self.dispatch.lock().expect("dispatch lock").take();
        let Some((cancel, handle)) = entry else {
            return;
        };
        cancel.cancel();
        match handle.await {
            Ok(rx) => *self.inbox.lock().expect("inbox lock") = Some(rx),
            Err(e) => error!(error = %e, "event bus dispatch task failed"),
        }
    }

    async fn dispatch_loop(
        handlers: Arc<Mutex<HandlerMap>>,
        mut rx: mpsc::UnboundedReceiver<ArenaEvent>,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<ArenaEvent> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => Self::dispatch(&handlers, event).await,
                    None => break,
                },
            }
        }

        // Flush whatever was queued before the stop.
        while let Ok(event) = rx.try_recv() {
            Self::dispatch(&handlers, event).await;
        }
        rx
    }

    async fn dispatch(handlers: &Arc<Mutex<HandlerMap>>, event: ArenaEvent) {
        // Snapshot under the lock so subscribe/unsubscribe during dispatch
        // cannot invalidate the iteration.
        let snapshot: Vec<EventHandler> = {
            let map = handlers.lock().expect("handler map lock");
            let typed = map.get(event.event_type()).into_iter().flatten();
            let wildcard = map.get(WILDCARD).into_iter().flatten();
            typed
                .chain(wildcard)
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };

        for handler in snapshot {
            let fut = AssertUnwindSafe(handler(event.clone())).catch_unwind();
            if fut.await.is_err() {
                error!(event_type = event.event_type(), "event handler panicked");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn round_started(round: u64) -> ArenaEvent {
        ArenaEvent::RoundStarted {
            round,
            timestamp: Utc::now(),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> impl Fn(ArenaEvent) -> BoxFuture<'static, ()> {
        let log = Arc::clone(log);
        let label = label.to_string();
        move |_ev| {
            let log = Arc::clone(&log);
            let label = label.clone();
            Box::pin(async move {
                log.lock().unwrap().push(label);
            })
        }
    }

    #[tokio::test]
    async fn test_dispatch_order_typed_then_wildcard() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(WILDCARD, recorder(&log, "w1"));
        bus.subscribe("round_started", recorder(&log, "t1"));
        bus.subscribe("round_started", recorder(&log, "t2"));
        bus.subscribe(WILDCARD, recorder(&log, "w2"));

        bus.start();
        bus.emit(round_started(1));
        bus.stop().await;

        assert_eq!(*log.lock().unwrap(), vec!["t1", "t2", "w1", "w2"]);
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("round_started", |_ev| {
            Box::pin(async { panic!("handler exploded") })
        });
        bus.subscribe("round_started", recorder(&log, "survivor"));

        bus.start();
        bus.emit(round_started(1));
        bus.emit(round_started(2));
        bus.stop().await;

        assert_eq!(*log.lock().unwrap(), vec!["survivor", "survivor"]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = bus.subscribe("round_started", recorder(&log, "gone"));
        bus.subscribe("round_started", recorder(&log, "kept"));
        assert!(bus.unsubscribe("round_started", id));
        assert!(!bus.unsubscribe("round_started", id));

        bus.start();
        bus.emit(round_started(1));
        bus.stop().await;

        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_no_dispatch_after_stop() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(WILDCARD, recorder(&log, "ev"));

        bus.start();
        bus.emit(round_started(1));
        bus.stop().await;
        assert_eq!(log.lock().unwrap().len(), 1);

        // Emitted while stopped: queued, not dispatched.
        bus.emit(round_started(2));
        assert_eq!(log.lock().unwrap().len(), 1);

        // A restart flushes the queue.
        bus.start();
        bus.stop().await;
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let bus = EventBus::new();
        bus.start();
        bus.start();
        assert!(bus.is_running());
        bus.stop().await;
        bus.stop().await;
        assert!(!bus.is_running());
    }

    #[tokio::test]
    async fn test_emit_while_stopped_does_not_block() {
        let bus = EventBus::new();
        for n in 0..100 {
            bus.emit(round_started(n));
        }
        // Nothing to assert beyond "we got here without suspending".
        assert!(!bus.is_running());
    }
}
