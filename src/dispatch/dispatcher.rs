//! Ordered fan-out to observers
//!
//! ```text
//!   engine calls ──► Dispatcher::publish ──► mpsc ──► DeliveryLoop
//!                                                        │
//!                          snapshot of observers ◄───────┤
//!                                                        ▼
//!                                           A.on_event, B.on_event, ...
//! ```
//!
//! A single delivery task drains the queue, so events reach every observer
//! in the order they were published. The observer list is only locked to
//! take a snapshot or to check that an observer is still registered; no lock
//! is held while a callback runs, so callbacks may add or remove observers
//! (themselves included).

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::event::Event;
use super::handler::EventHandler;

/// Identity of a registered observer, stable for the lifetime of its `Arc`
type ObserverKey = *const ();

struct Observer {
    id: u64,
    handler: Weak<dyn EventHandler>,
}

impl Observer {
    fn key(&self) -> ObserverKey {
        self.handler.as_ptr() as *const ()
    }
}

#[derive(Default)]
struct ObserverList {
    next_id: u64,
    entries: Vec<Observer>,
}

impl ObserverList {
    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|o| o.id == id)
    }

    fn prune(&mut self) {
        self.entries.retain(|o| o.handler.strong_count() > 0);
    }
}

enum Delivery {
    Event(Event),
    /// Drop every observer once the events queued before it are delivered
    Clear,
}

/// Registers observers and queues events for delivery
pub(crate) struct Dispatcher {
    observers: Arc<RwLock<ObserverList>>,
    tx: mpsc::UnboundedSender<Delivery>,
    max_observers: usize,
}

impl Dispatcher {
    /// Create a dispatcher and the loop that delivers its events
    pub(crate) fn new(max_observers: usize) -> (Self, DeliveryLoop) {
        let observers = Arc::new(RwLock::new(ObserverList::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            observers: Arc::clone(&observers),
            tx,
            max_observers,
        };

        (dispatcher, DeliveryLoop { observers, rx })
    }

    /// Register an observer
    ///
    /// Adding an observer that is already registered is a no-op. Observers
    /// are held weakly; dropping the last `Arc` unregisters it.
    pub(crate) fn add<H: EventHandler + 'static>(&self, handler: &Arc<H>) -> Result<()> {
        let key = Arc::as_ptr(handler) as ObserverKey;
        let mut list = self.observers.write();
        list.prune();

        if list.entries.iter().any(|o| o.key() == key) {
            tracing::debug!("Event handler already registered");
            return Ok(());
        }
        if list.entries.len() >= self.max_observers {
            return Err(Error::TooManyHandlers(self.max_observers));
        }

        let handler: Arc<dyn EventHandler> = handler.clone();
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push(Observer {
            id,
            handler: Arc::downgrade(&handler),
        });

        tracing::debug!(observers = list.entries.len(), "Event handler registered");
        Ok(())
    }

    /// Unregister an observer; returns whether it was registered
    ///
    /// Takes effect immediately, including for events already queued.
    pub(crate) fn remove<H: EventHandler + 'static>(&self, handler: &Arc<H>) -> bool {
        let key = Arc::as_ptr(handler) as ObserverKey;
        let mut list = self.observers.write();
        let before = list.entries.len();
        list.entries.retain(|o| o.key() != key);
        before != list.entries.len()
    }

    /// Number of live observers
    pub(crate) fn len(&self) -> usize {
        let mut list = self.observers.write();
        list.prune();
        list.entries.len()
    }

    /// Queue an event
    pub(crate) fn publish(&self, event: Event) {
        if self.tx.send(Delivery::Event(event)).is_err() {
            tracing::debug!("Delivery loop stopped, event dropped");
        }
    }

    /// Remove every observer after the events already queued are delivered
    pub(crate) fn clear_after_pending(&self) {
        let _ = self.tx.send(Delivery::Clear);
    }
}

/// Delivers queued events to observers
pub(crate) struct DeliveryLoop {
    observers: Arc<RwLock<ObserverList>>,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl DeliveryLoop {
    /// Run until the dispatcher is dropped
    pub(crate) async fn run(mut self) {
        while let Some(delivery) = self.rx.recv().await {
            match delivery {
                Delivery::Event(event) => self.deliver(&event),
                Delivery::Clear => {
                    self.observers.write().entries.clear();
                    tracing::debug!("Event handlers cleared");
                }
            }
        }
    }

    fn deliver(&self, event: &Event) {
        let snapshot: Vec<(u64, Weak<dyn EventHandler>)> = self
            .observers
            .read()
            .entries
            .iter()
            .map(|o| (o.id, o.handler.clone()))
            .collect();

        tracing::trace!(
            event = event.kind(),
            observers = snapshot.len(),
            "Delivering event"
        );

        let mut dead = false;
        for (id, weak) in snapshot {
            // Removed by an earlier callback for this same event
            if !self.observers.read().contains(id) {
                continue;
            }
            let Some(handler) = weak.upgrade() else {
                dead = true;
                continue;
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event)));
            if result.is_err() {
                tracing::error!(event = event.kind(), "Event handler panicked");
            }
        }

        if dead {
            self.observers.write().prune();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::ErrorCode;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl EventHandler for Recorder {
        fn on_event(&self, event: &Event) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.kind()));
        }
    }

    fn debug_event() -> Event {
        Event::DebugError {
            error_code: ErrorCode::INVALID_PARAM,
            func_name: "test".into(),
            info: String::new(),
        }
    }

    #[tokio::test]
    async fn test_registration_order() {
        let (dispatcher, delivery) = Dispatcher::new(16);
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(Recorder {
            name: "a",
            log: log.clone(),
        });
        let b = Arc::new(Recorder {
            name: "b",
            log: log.clone(),
        });

        dispatcher.add(&a).unwrap();
        dispatcher.add(&b).unwrap();
        dispatcher.publish(debug_event());
        drop(dispatcher);
        delivery.run().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:debug_error".to_string(), "b:debug_error".to_string()]
        );
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (dispatcher, delivery) = Dispatcher::new(16);
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(Recorder {
            name: "a",
            log: log.clone(),
        });

        dispatcher.add(&a).unwrap();
        dispatcher.add(&a).unwrap();
        assert_eq!(dispatcher.len(), 1);

        dispatcher.publish(debug_event());
        drop(dispatcher);
        delivery.run().await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_observer_limit() {
        let (dispatcher, _delivery) = Dispatcher::new(2);
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<_> = (0..3)
            .map(|_| {
                Arc::new(Recorder {
                    name: "x",
                    log: log.clone(),
                })
            })
            .collect();

        dispatcher.add(&handlers[0]).unwrap();
        dispatcher.add(&handlers[1]).unwrap();
        assert_eq!(
            dispatcher.add(&handlers[2]),
            Err(Error::TooManyHandlers(2))
        );

        assert!(dispatcher.remove(&handlers[0]));
        dispatcher.add(&handlers[2]).unwrap();
    }

    #[tokio::test]
    async fn test_dropped_observer_is_skipped() {
        let (dispatcher, delivery) = Dispatcher::new(16);
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(Recorder {
            name: "a",
            log: log.clone(),
        });

        dispatcher.add(&a).unwrap();
        drop(a);
        dispatcher.publish(debug_event());
        drop(dispatcher);
        delivery.run().await;

        assert!(log.lock().unwrap().is_empty());
    }

    struct SelfRemover {
        me: Weak<SelfRemover>,
        dispatcher: Weak<Dispatcher>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl EventHandler for SelfRemover {
        fn on_event(&self, event: &Event) {
            self.log.lock().unwrap().push(format!("a:{}", event.kind()));
            if let (Some(me), Some(dispatcher)) = (self.me.upgrade(), self.dispatcher.upgrade()) {
                dispatcher.remove(&me);
            }
        }
    }

    #[tokio::test]
    async fn test_remove_self_during_callback() {
        let (dispatcher, delivery) = Dispatcher::new(16);
        let dispatcher = Arc::new(dispatcher);
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new_cyclic(|me| SelfRemover {
            me: me.clone(),
            dispatcher: Arc::downgrade(&dispatcher),
            log: log.clone(),
        });
        let b = Arc::new(Recorder {
            name: "b",
            log: log.clone(),
        });

        dispatcher.add(&a).unwrap();
        dispatcher.add(&b).unwrap();
        dispatcher.publish(debug_event());
        dispatcher.publish(debug_event());

        // The loop idles once the queue is drained
        let _ = tokio::time::timeout(std::time::Duration::from_millis(50), delivery.run()).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:debug_error".to_string(),
                "b:debug_error".to_string(),
                "b:debug_error".to_string(),
            ]
        );
        assert_eq!(dispatcher.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_after_pending() {
        let (dispatcher, delivery) = Dispatcher::new(16);
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(Recorder {
            name: "a",
            log: log.clone(),
        });

        dispatcher.add(&a).unwrap();
        dispatcher.publish(debug_event());
        dispatcher.clear_after_pending();
        dispatcher.publish(debug_event());
        drop(dispatcher);
        delivery.run().await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
