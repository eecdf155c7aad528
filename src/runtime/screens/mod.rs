use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{NavError, Result};
use crate::layout::Stack;
use crate::navigation::{Command, NavBus, NavSource};
use crate::stream::Stream;
use crate::view::ViewRef;

use super::driver::{Envelope, Scope, scoped_sources};

/// Visual output channel.
pub const SCREEN_CHANNEL: &str = "screen";
/// Navigation commands travelling to the reducer.
pub const NAVIGATION_CHANNEL: &str = "navigation";
/// Stack state fed back into every producer.
pub const STACK_CHANNEL: &str = "navigationStack";

/// Channel names owned by the runtime itself; drivers may not use them.
pub const RESERVED_CHANNELS: [&str; 3] = [SCREEN_CHANNEL, NAVIGATION_CHANNEL, STACK_CHANNEL];

pub fn is_reserved(channel: &str) -> bool {
    RESERVED_CHANNELS.contains(&channel)
}

/// A screen implementation: a pure function from its sources to its sinks.
pub type ScreenFn = Rc<dyn Fn(ScreenSources) -> ScreenSinks>;

/// Everything a screen instance (or overlay scope) reads from.
#[derive(Clone)]
pub struct ScreenSources {
    drivers: Rc<BTreeMap<String, Stream<Value>>>,
    /// Event source scoped to this producer.
    pub navigation: NavSource,
    /// Props captured at creation; replayed to every subscriber.
    pub props: Stream<Value>,
    /// Shared stack state.
    pub stack: Stream<Stack>,
    /// Visibility-composed stack view. Only set for the frame scope.
    pub children: Option<Stream<ViewRef>>,
}

impl ScreenSources {
    pub fn new(
        drivers: BTreeMap<String, Stream<Value>>,
        navigation: NavSource,
        props: Stream<Value>,
        stack: Stream<Stack>,
    ) -> Self {
        Self {
            drivers: Rc::new(drivers),
            navigation,
            props,
            stack,
            children: None,
        }
    }

    pub fn with_children(mut self, children: Stream<ViewRef>) -> Self {
        self.children = Some(children);
        self
    }

    /// Driver source for `channel`, already filtered to this producer's
    /// scope. Unknown channels yield a stream that never emits.
    pub fn driver(&self, channel: &str) -> Stream<Value> {
        self.drivers
            .get(channel)
            .cloned()
            .unwrap_or_else(Stream::never)
    }

    pub fn driver_names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}

/// Inputs shared by every producer: the collection's instances and both
/// overlay scopes.
#[derive(Clone)]
pub struct ProducerContext {
    pub drivers: BTreeMap<String, Stream<Envelope>>,
    pub bus: NavBus,
    pub stack: Stream<Stack>,
}

impl ProducerContext {
    pub fn new(drivers: BTreeMap<String, Stream<Envelope>>, bus: NavBus, stack: Stream<Stack>) -> Self {
        Self { drivers, bus, stack }
    }

    /// Sources for the producer identified by `scope`. The stack handed out
    /// is a derived copy, so emitting on it never reaches the runtime.
    pub fn sources(&self, scope: &Scope, navigation: NavSource, props: Value) -> ScreenSources {
        ScreenSources::new(
            scoped_sources(&self.drivers, scope),
            navigation,
            Stream::of(props),
            self.stack.map(|stack: &Stack| stack.clone()),
        )
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}

/// Named output channels produced by one screen instance.
///
/// Only channels matching a configured driver name are aggregated; anything
/// else is ignored.
#[derive(Default)]
pub struct ScreenSinks {
    pub screen: Option<Stream<ViewRef>>,
    pub navigation: Option<Stream<Command>>,
    pub channels: BTreeMap<String, Stream<Value>>,
}

impl ScreenSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(mut self, view: Stream<ViewRef>) -> Self {
        self.screen = Some(view);
        self
    }

    pub fn with_navigation(mut self, commands: Stream<Command>) -> Self {
        self.navigation = Some(commands);
        self
    }

    pub fn with_channel(mut self, name: impl Into<String>, stream: Stream<Value>) -> Self {
        self.channels.insert(name.into(), stream);
        self
    }

    pub fn channel(&self, name: &str) -> Option<&Stream<Value>> {
        self.channels.get(name)
    }
}

impl fmt::Debug for ScreenSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenSinks")
            .field("screen", &self.screen.is_some())
            .field("navigation", &self.navigation.is_some())
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Screen implementations by name plus the optional overlay scopes.
#[derive(Clone, Default)]
pub struct ScreenRegistry {
    screens: HashMap<String, ScreenFn>,
    frame: Option<ScreenFn>,
    global: Option<ScreenFn>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, screen: F) -> &mut Self
    where
        F: Fn(ScreenSources) -> ScreenSinks + 'static,
    {
        self.screens.insert(name.into(), Rc::new(screen));
        self
    }

    /// Persistent scope wrapped around the stack.
    pub fn register_frame<F>(&mut self, screen: F) -> &mut Self
    where
        F: Fn(ScreenSources) -> ScreenSinks + 'static,
    {
        self.frame = Some(Rc::new(screen));
        self
    }

    /// Background scope living for the whole runtime; it never renders.
    pub fn register_global<F>(&mut self, screen: F) -> &mut Self
    where
        F: Fn(ScreenSources) -> ScreenSinks + 'static,
    {
        self.global = Some(Rc::new(screen));
        self
    }

    pub fn resolve(&self, name: &str) -> Result<ScreenFn> {
        self.screens
            .get(name)
            .cloned()
            .ok_or_else(|| NavError::ScreenNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.screens.contains_key(name)
    }

    pub fn frame(&self) -> Option<ScreenFn> {
        self.frame.clone()
    }

    pub fn global(&self) -> Option<ScreenFn> {
        self.global.clone()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.screens.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ScreenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenRegistry")
            .field("screens", &self.names())
            .field("frame", &self.frame.is_some())
            .field("global", &self.global.is_some())
            .finish()
    }
}
