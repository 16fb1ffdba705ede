//! Observer registry for events raised by the relation library.
//!
//! Handlers run synchronously inside [`EventBus::emit`], in subscription
//! order.  The registry lock is released before they run, so a handler may
//! subscribe or emit itself.  An owner that wants to process events later subscribes with
//! [`EventBus::forward_to`] and drains the channel after each notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::types::{EventKind, F1Event};

type Handler = Arc<dyn Fn(&F1Event) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&F1Event) + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Queue every event of `kind` onto `tx`.
    pub fn forward_to(&self, kind: EventKind, tx: mpsc::UnboundedSender<F1Event>) {
        self.subscribe(kind, move |event| {
            if let Err(e) = tx.send(event.clone()) {
                warn!("Event queue closed, dropping {:?}", e.0);
            }
        });
    }

    /// Returns the number of handlers the event was delivered to.
    pub fn emit(&self, event: F1Event) -> usize {
        let list: Vec<Handler> = {
            let handlers = match self.handlers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            handlers.get(&event.kind()).cloned().unwrap_or_default()
        };
        if list.is_empty() {
            debug!("No subscriber for {:?}", event);
            return 0;
        }
        for handler in &list {
            handler(&event);
        }
        list.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.lock().map(|h| h.len()).unwrap_or_default();
        f.debug_struct("EventBus").field("kinds", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn available() -> F1Event {
        F1Event::PeerEndpointAvailable {
            relation_id: 1,
            role: Role::Cu,
            address: "5.6.7.8".into(),
            port: "1234".into(),
        }
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(available()), 0);
    }

    #[test]
    fn handlers_run_once_per_emit() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.subscribe(EventKind::PeerEndpointAvailable, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(available());
        bus.emit(available());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forwarded_events_land_on_the_queue() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.forward_to(EventKind::PeerEndpointAvailable, tx);

        bus.emit(available());
        assert_eq!(rx.try_recv().unwrap(), available());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handler_can_use_the_bus_it_is_called_from() {
        let bus = EventBus::new();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let inner_bus = bus.clone();
        let counter = Arc::clone(&late_calls);
        bus.subscribe(EventKind::PeerEndpointAvailable, move |_| {
            let counter = Arc::clone(&counter);
            inner_bus.subscribe(EventKind::PeerEndpointAvailable, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        // The handler added during this emit only sees later events.
        assert_eq!(bus.emit(available()), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.emit(available()), 2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_can_emit_a_follow_up_event() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.forward_to(EventKind::PeerEndpointAvailable, tx);
        let inner_bus = bus.clone();
        let relayed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&relayed);
        bus.subscribe(EventKind::PeerEndpointAvailable, move |event| {
            if let F1Event::PeerEndpointAvailable { relation_id: 1, .. } = event {
                counter.fetch_add(1, Ordering::SeqCst);
                inner_bus.emit(F1Event::PeerEndpointAvailable {
                    relation_id: 2,
                    role: Role::Cu,
                    address: "5.6.7.8".into(),
                    port: "1234".into(),
                });
            }
        });

        bus.emit(available());

        assert_eq!(relayed.load(Ordering::SeqCst), 1);
        let ids: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                F1Event::PeerEndpointAvailable { relation_id, .. } => relation_id,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
