//! Effect drivers and the scoped envelopes they exchange with producers.
//!
//! Every value a producer writes to a driver channel is wrapped in an
//! [`Envelope`] tagged with the producer's [`Scope`]. In the other direction
//! an envelope without a scope is broadcast to every producer, while a scoped
//! one only reaches the producer it names.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NavError, Result};
use crate::identity::InstanceId;
use crate::stream::{Stream, Subscription};

use super::screens::is_reserved;

pub mod cli;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Scope {
    Screen(InstanceId),
    Frame,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    pub payload: Value,
}

impl Envelope {
    pub fn broadcast(payload: Value) -> Self {
        Self {
            scope: None,
            payload,
        }
    }

    pub fn scoped(scope: Scope, payload: Value) -> Self {
        Self {
            scope: Some(scope),
            payload,
        }
    }

    pub fn accepts(&self, scope: &Scope) -> bool {
        self.scope.as_ref().is_none_or(|own| own == scope)
    }
}

/// An effect boundary: consumes the aggregated sink for its channel and
/// returns the source stream producers read from.
pub trait Driver {
    fn connect(&self, sink: Stream<Envelope>) -> Stream<Envelope>;
}

/// Drivers keyed by channel name.
#[derive(Default)]
pub struct Drivers {
    entries: BTreeMap<String, Box<dyn Driver>>,
}

impl Drivers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<D>(mut self, name: impl Into<String>, driver: D) -> Self
    where
        D: Driver + 'static,
    {
        self.insert(name, driver);
        self
    }

    pub fn insert<D>(&mut self, name: impl Into<String>, driver: D)
    where
        D: Driver + 'static,
    {
        self.entries.insert(name.into(), Box::new(driver));
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject channel names owned by the runtime.
    pub fn validate(&self) -> Result<()> {
        match self.entries.keys().find(|name| is_reserved(name)) {
            Some(name) => Err(NavError::ReservedChannel(name.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn into_entries(self) -> BTreeMap<String, Box<dyn Driver>> {
        self.entries
    }
}

impl fmt::Debug for Drivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drivers")
            .field("names", &self.names())
            .finish()
    }
}

/// Payload streams for every driver source, filtered to `scope`.
pub fn scoped_sources(
    sources: &BTreeMap<String, Stream<Envelope>>,
    scope: &Scope,
) -> BTreeMap<String, Stream<Value>> {
    sources
        .iter()
        .map(|(name, source)| {
            let scope = scope.clone();
            let scoped = source.filter_map(move |envelope: &Envelope| {
                envelope
                    .accepts(&scope)
                    .then(|| envelope.payload.clone())
            });
            (name.clone(), scoped)
        })
        .collect()
}

/// Loopback driver: records everything written to it and lets the host
/// inject source events through its [`MemoryDriverHandle`].
pub struct MemoryDriver {
    handle: MemoryDriverHandle,
    connection: RefCell<Option<Subscription>>,
}

#[derive(Clone, Default)]
pub struct MemoryDriverHandle {
    input: Stream<Envelope>,
    output: Rc<RefCell<Vec<Envelope>>>,
}

impl MemoryDriver {
    pub fn new() -> (Self, MemoryDriverHandle) {
        let handle = MemoryDriverHandle::default();
        let driver = Self {
            handle: handle.clone(),
            connection: RefCell::new(None),
        };
        (driver, handle)
    }
}

impl Driver for MemoryDriver {
    fn connect(&self, sink: Stream<Envelope>) -> Stream<Envelope> {
        let output = Rc::clone(&self.handle.output);
        let subscription = sink.subscribe(move |envelope| output.borrow_mut().push(envelope.clone()));
        *self.connection.borrow_mut() = Some(subscription);
        self.handle.input.clone()
    }
}

impl MemoryDriverHandle {
    /// Deliver `payload` to every producer.
    pub fn send(&self, payload: Value) {
        self.input.emit(Envelope::broadcast(payload));
    }

    /// Deliver `payload` to one producer only.
    pub fn send_to(&self, scope: Scope, payload: Value) {
        self.input.emit(Envelope::scoped(scope, payload));
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.output.borrow().clone()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.output
            .borrow()
            .iter()
            .map(|envelope| envelope.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.output.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scoped_sources_filter_by_producer() {
        let source = Stream::new();
        let mut sources = BTreeMap::new();
        sources.insert("http".to_string(), source.clone());

        let home = scoped_sources(&sources, &Scope::Screen("Home---1".into()));
        let frame = scoped_sources(&sources, &Scope::Frame);
        let seen_home = Rc::new(RefCell::new(Vec::new()));
        let seen_frame = Rc::new(RefCell::new(Vec::new()));
        let h = Rc::clone(&seen_home);
        let f = Rc::clone(&seen_frame);
        let _a = home["http"].subscribe(move |v| h.borrow_mut().push(v.clone()));
        let _b = frame["http"].subscribe(move |v| f.borrow_mut().push(v.clone()));

        source.emit(Envelope::broadcast(json!(1)));
        source.emit(Envelope::scoped(Scope::Frame, json!(2)));
        source.emit(Envelope::scoped(Scope::Screen("Home---1".into()), json!(3)));

        assert_eq!(*seen_home.borrow(), vec![json!(1), json!(3)]);
        assert_eq!(*seen_frame.borrow(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn reserved_driver_names_are_rejected() {
        let (driver, _) = MemoryDriver::new();
        let drivers = Drivers::new().with("navigation", driver);
        assert!(matches!(
            drivers.validate(),
            Err(NavError::ReservedChannel(name)) if name == "navigation"
        ));
    }

    #[test]
    fn memory_driver_records_sink_values() {
        let (driver, handle) = MemoryDriver::new();
        let sink = Stream::new();
        let source = driver.connect(sink.clone());
        sink.emit(Envelope::scoped(Scope::Global, json!("ping")));
        assert_eq!(handle.payloads(), vec![json!("ping")]);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = source.subscribe(move |e: &Envelope| s.borrow_mut().push(e.clone()));
        handle.send(json!("pong"));
        assert_eq!(*seen.borrow(), vec![Envelope::broadcast(json!("pong"))]);
    }

    #[test]
    fn envelope_wire_format() {
        let envelope = Envelope::scoped(Scope::Screen("Feed---4".into()), json!({"n": 1}));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"scope": {"kind": "screen", "id": "Feed---4"}, "payload": {"n": 1}})
        );
        let broadcast: Envelope = serde_json::from_value(json!({"payload": 5})).unwrap();
        assert_eq!(broadcast.scope, None);
    }
}
