//! Subscription side of the event protocol.
//!
//! Observers register with an [`ObserverRegistry`] under a unique id and
//! declare which [`EventKind`]s they want. The registry fans each drained
//! event out to the observers subscribed to its kind, in registration order.

use std::collections::HashMap;
use std::sync::mpsc;

use anyhow::{bail, Result};

use crate::event::{EventKind, NavigationEvent};

/// A consumer of navigation events.
pub trait Observer {
    /// Unique identifier within a registry (e.g. `"voice"`, `"logger"`).
    fn id(&self) -> &str;

    /// Event kinds this observer receives. Defaults to all of them.
    fn subscriptions(&self) -> &[EventKind] {
        &EventKind::ALL
    }

    fn handle_event(&mut self, event: &NavigationEvent);
}

pub struct ObserverRegistry {
    observers: Vec<Box<dyn Observer>>,
    index: HashMap<String, usize>,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, observer: Box<dyn Observer>) -> Result<()> {
        let id = observer.id().to_string();
        if self.index.contains_key(&id) {
            bail!("duplicate observer id: {}", id);
        }
        self.index.insert(id, self.observers.len());
        self.observers.push(observer);
        Ok(())
    }

    /// Remove and return the observer registered under `id`.
    pub fn unregister(&mut self, id: &str) -> Result<Box<dyn Observer>> {
        let Some(idx) = self.index.remove(id) else {
            bail!("unknown observer id: {}", id);
        };
        let observer = self.observers.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Ok(observer)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.observers.iter().map(|o| o.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer subscribed to its kind.
    pub fn broadcast(&mut self, event: &NavigationEvent) {
        let kind = event.kind();
        for observer in &mut self.observers {
            if observer.subscriptions().contains(&kind) {
                observer.handle_event(event);
            }
        }
    }
}

/// Adapts a closure into an [`Observer`].
pub struct FnObserver<F> {
    id: String,
    kinds: Vec<EventKind>,
    handler: F,
}

impl<F> FnObserver<F>
where
    F: FnMut(&NavigationEvent),
{
    /// An observer subscribed to every event kind.
    pub fn new(id: impl Into<String>, handler: F) -> Self {
        Self {
            id: id.into(),
            kinds: EventKind::ALL.to_vec(),
            handler,
        }
    }

    /// Restrict the subscription to `kinds`.
    pub fn subscribed_to(mut self, kinds: &[EventKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }
}

impl<F> Observer for FnObserver<F>
where
    F: FnMut(&NavigationEvent),
{
    fn id(&self) -> &str {
        &self.id
    }

    fn subscriptions(&self) -> &[EventKind] {
        &self.kinds
    }

    fn handle_event(&mut self, event: &NavigationEvent) {
        (self.handler)(event);
    }
}

/// Forwards events into an mpsc channel, for consumers on another thread.
pub struct ChannelObserver {
    id: String,
    kinds: Vec<EventKind>,
    tx: mpsc::Sender<NavigationEvent>,
}

impl ChannelObserver {
    /// Create the observer together with the receiving end of its channel.
    pub fn new(id: impl Into<String>) -> (Self, mpsc::Receiver<NavigationEvent>) {
        let (tx, rx) = mpsc::channel();
        let observer = Self {
            id: id.into(),
            kinds: EventKind::ALL.to_vec(),
            tx,
        };
        (observer, rx)
    }

    pub fn subscribed_to(mut self, kinds: &[EventKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }
}

impl Observer for ChannelObserver {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscriptions(&self) -> &[EventKind] {
        &self.kinds
    }

    fn handle_event(&mut self, event: &NavigationEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(observer = %self.id, kind = %event.kind(), "event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;
    use crate::geo::Coordinate;
    use crate::location::Location;
    use std::sync::{Arc, Mutex};

    struct FakeObserver {
        id: &'static str,
        kinds: Vec<EventKind>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeObserver {
        fn with_log(id: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id,
                kinds: EventKind::ALL.to_vec(),
                log,
            }
        }
    }

    impl Observer for FakeObserver {
        fn id(&self) -> &str {
            self.id
        }

        fn subscriptions(&self) -> &[EventKind] {
            &self.kinds
        }

        fn handle_event(&mut self, event: &NavigationEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.id, event.kind()));
        }
    }

    struct DefaultObserver;

    impl Observer for DefaultObserver {
        fn id(&self) -> &str {
            "default"
        }

        fn handle_event(&mut self, _event: &NavigationEvent) {}
    }

    fn will_reroute() -> NavigationEvent {
        NavigationEvent::WillReroute {
            location: Location::new(Coordinate::new(0.0, 0.0), 0.0),
        }
    }

    fn failed() -> NavigationEvent {
        NavigationEvent::RerouteFailed {
            error: RoutingError::NoRoute,
        }
    }

    #[test]
    fn register_adds_observer() {
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(DefaultObserver)).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.ids(), vec!["default"]);
        assert!(reg.contains("default"));
    }

    #[test]
    fn default_subscriptions_cover_all_kinds() {
        assert_eq!(DefaultObserver.subscriptions(), &EventKind::ALL);
    }

    #[test]
    fn duplicate_id_returns_error() {
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(DefaultObserver)).unwrap();
        let err = reg.register(Box::new(DefaultObserver)).unwrap_err();
        assert!(err.to_string().contains("duplicate observer id"));
    }

    #[test]
    fn unregister_unknown_returns_error() {
        let mut reg = ObserverRegistry::new();
        let err = reg.unregister("nope").err().unwrap();
        assert!(err.to_string().contains("unknown observer id"));
    }

    #[test]
    fn unregister_keeps_remaining_ids_addressable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(FakeObserver::with_log("a", log.clone()))).unwrap();
        reg.register(Box::new(FakeObserver::with_log("b", log.clone()))).unwrap();
        reg.register(Box::new(FakeObserver::with_log("c", log.clone()))).unwrap();

        let removed = reg.unregister("a").unwrap();
        assert_eq!(removed.id(), "a");
        assert_eq!(reg.ids(), vec!["b", "c"]);
        assert!(reg.unregister("c").is_ok());
        assert_eq!(reg.ids(), vec!["b"]);
    }

    #[test]
    fn broadcast_goes_to_all_subscribers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(FakeObserver::with_log("a", log.clone()))).unwrap();
        reg.register(Box::new(FakeObserver::with_log("b", log.clone()))).unwrap();

        reg.broadcast(&will_reroute());
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["a:will_reroute", "b:will_reroute"]
        );
    }

    #[test]
    fn broadcast_skips_unsubscribed_kinds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut only_failures = FakeObserver::with_log("f", log.clone());
        only_failures.kinds = vec![EventKind::RerouteFailed];
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(only_failures)).unwrap();

        reg.broadcast(&will_reroute());
        reg.broadcast(&failed());
        assert_eq!(log.lock().unwrap().as_slice(), &["f:reroute_failed"]);
    }

    #[test]
    fn fn_observer_invokes_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = FnObserver::new("closure", move |event: &NavigationEvent| {
            sink.lock().unwrap().push(event.kind());
        })
        .subscribed_to(&[EventKind::WillReroute]);

        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(observer)).unwrap();
        reg.broadcast(&failed());
        reg.broadcast(&will_reroute());
        assert_eq!(seen.lock().unwrap().as_slice(), &[EventKind::WillReroute]);
    }

    #[test]
    fn channel_observer_forwards_events() {
        let (observer, rx) = ChannelObserver::new("channel");
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(observer)).unwrap();

        reg.broadcast(&will_reroute());
        reg.broadcast(&failed());
        let kinds: Vec<EventKind> = rx.try_iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::WillReroute, EventKind::RerouteFailed]);
    }

    #[test]
    fn channel_observer_tolerates_dropped_receiver() {
        let (observer, rx) = ChannelObserver::new("channel");
        drop(rx);
        let mut reg = ObserverRegistry::new();
        reg.register(Box::new(observer.subscribed_to(&[EventKind::RerouteFailed])))
            .unwrap();
        reg.broadcast(&failed());
    }
}
