use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::events::{BridgeEvent, LocalEvent};
use super::handler::{ClosureHandler, EventHandler};

struct BusInner {
    handlers: RwLock<Vec<(u64, Arc<dyn EventHandler>)>>,
    next_id: AtomicU64,
    events: broadcast::Sender<BridgeEvent>,
    local_events: broadcast::Sender<LocalEvent>,
}

/// Event bus fanning dispatched events out to in-process subscribers
///
/// Registered handlers are called synchronously in registration order;
/// async consumers can additionally subscribe to a broadcast stream.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a new event bus; `capacity` bounds the broadcast streams
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (local_events, _) = broadcast::channel(capacity.max(1));

        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                events,
                local_events,
            }),
        }
    }

    /// Register a handler; it receives every event emitted from now on
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        info!(handler_name = handler.name(), id = id, "Registering event handler");

        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Register a closure as a handler
    pub fn on_event<F>(&self, f: F) -> Subscription
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.add_handler(Arc::new(ClosureHandler::new(f)))
    }

    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Emits an event to every handler, then to stream subscribers
    ///
    /// A panicking handler is logged and does not prevent delivery to the
    /// remaining handlers.
    pub fn emit(&self, event: &BridgeEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        debug!(
            event_name = %event.event_name,
            sender_uid = event.sender_uid,
            "Dispatching event to {} handlers",
            handlers.len()
        );

        for handler in handlers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            if result.is_err() {
                error!(
                    handler = handler.name(),
                    event_name = %event.event_name,
                    "Event handler panicked"
                );
            }
        }

        if self.inner.events.send(event.clone()).is_err() {
            debug!(event_name = %event.event_name, "No stream subscribers for event");
        }
    }

    /// Subscribe to a stream of dispatched events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    pub fn emit_local(&self, event: LocalEvent) {
        match self.inner.local_events.send(event) {
            Ok(receivers) => debug!(receivers = receivers, "Local event emitted"),
            Err(_) => debug!("Local event emitted with no receivers"),
        }
    }

    pub fn subscribe_local(&self) -> broadcast::Receiver<LocalEvent> {
        self.inner.local_events.subscribe()
    }

    /// Drop every registered handler
    pub fn clear(&self) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Handle returned when registering a handler
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the handler, returns false if it was already gone
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut handlers = bus.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != self.id);
        handlers.len() != before
    }
}
