//! Keyed set of live screen instances driven by the stack.
//!
//! Every stack value is reconciled against the current entries: new ids get
//! a freshly constructed instance, ids that left the stack are detached, the
//! new membership is published, and only then are detached instances torn
//! down. Visual output is re-snapshotted in stack order; every other declared
//! channel is merged across whichever instances are currently live.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{Halt, NavError, Result};
use crate::identity::InstanceId;
use crate::layout::{ScreenDescriptor, Stack};
use crate::logging::{LogLevel, json_kv, json_str};
use crate::navigation::{Command, NavSource, NavSourceRegistry};
use crate::runtime::audit::RuntimeAuditStage;
use crate::stream::{Stream, Subscription};
use crate::telemetry::{COLLECTION_TARGET, Telemetry};
use crate::view::ViewRef;

use super::driver::{Envelope, Scope};
use super::screens::{ProducerContext, ScreenRegistry, ScreenSinks, ScreenSources};
use super::sinks::ChannelSet;

struct InstanceEntry {
    descriptor: ScreenDescriptor,
    view: Rc<RefCell<Option<ViewRef>>>,
    subscriptions: Vec<Subscription>,
    _sinks: ScreenSinks,
    _sources: ScreenSources,
}

struct CollectionState {
    context: ProducerContext,
    screens: ScreenRegistry,
    registry: NavSourceRegistry,
    halt: Halt,
    telemetry: Telemetry,
    entries: RefCell<HashMap<InstanceId, InstanceEntry>>,
    order: RefCell<Vec<InstanceId>>,
    reconciling: Cell<bool>,
    pending: RefCell<Option<Stack>>,
    members: Stream<Stack>,
    views: Stream<Vec<ViewRef>>,
    commands: Stream<Command>,
    channels: ChannelSet<Envelope>,
}

impl CollectionState {
    fn reconcile(self: &Rc<Self>, stack: &Stack) {
        if self.reconciling.replace(true) {
            *self.pending.borrow_mut() = Some(stack.clone());
            return;
        }

        let mut current = stack.clone();
        loop {
            if let Err(err) = self.apply(&current) {
                self.fail(err);
                break;
            }
            let pending = self.pending.borrow_mut().take();
            match pending {
                Some(next) => current = next,
                None => break,
            }
        }
        self.reconciling.set(false);

        if !self.halt.is_halted() {
            self.emit_views();
        }
    }

    fn apply(self: &Rc<Self>, stack: &Stack) -> Result<()> {
        let top = stack.last().map(|entry| entry.id.as_str());
        let mut fresh: Vec<InstanceId> = Vec::new();
        for descriptor in stack {
            if self.entries.borrow().contains_key(&descriptor.id) {
                continue;
            }
            let entry = match self.create(descriptor, top == Some(descriptor.id.as_str())) {
                Ok(entry) => entry,
                Err(err) => {
                    self.discard(&fresh);
                    return Err(err);
                }
            };
            self.entries
                .borrow_mut()
                .insert(descriptor.id.clone(), entry);
            fresh.push(descriptor.id.clone());
        }
        let created = fresh.len();

        let live: HashSet<&str> = stack.iter().map(|entry| entry.id.as_str()).collect();
        let retiring: Vec<InstanceEntry> = {
            let order = self.order.borrow();
            let mut entries = self.entries.borrow_mut();
            order
                .iter()
                .filter(|id| !live.contains(id.as_str()))
                .filter_map(|id| entries.remove(id))
                .collect()
        };
        *self.order.borrow_mut() = stack.iter().map(|entry| entry.id.clone()).collect();

        // Detached instances stay wired until their disappear notification
        // has been delivered.
        self.members.emit(stack.clone());

        let destroyed = retiring.len();
        for entry in retiring {
            self.retire(entry);
        }
        self.telemetry
            .record(|metrics| metrics.record_instances(created, destroyed));
        if created > 0 || destroyed > 0 {
            self.telemetry.log(
                LogLevel::Debug,
                COLLECTION_TARGET,
                "collection_reconciled",
                [
                    json_kv("created", created),
                    json_kv("destroyed", destroyed),
                    json_kv("live", stack.len()),
                ],
            );
        }
        Ok(())
    }

    fn create(self: &Rc<Self>, descriptor: &ScreenDescriptor, is_top: bool) -> Result<InstanceEntry> {
        let screen = self.screens.resolve(&descriptor.name)?;

        let source = NavSource::new(&self.context.bus);
        source.set_top(is_top);
        self.registry.insert(descriptor.id.clone(), source.clone());

        let scope = Scope::Screen(descriptor.id.clone());
        let sources = self
            .context
            .sources(&scope, source.clone(), descriptor.pass_props.clone());
        let sinks = screen(sources.clone());

        let view = Rc::new(RefCell::new(None));
        let mut subscriptions = Vec::new();

        if let Some(output) = sinks.screen.as_ref() {
            let slot = Rc::clone(&view);
            let state = Rc::downgrade(self);
            subscriptions.push(output.subscribe(move |next: &ViewRef| {
                *slot.borrow_mut() = Some(Rc::clone(next));
                if let Some(state) = state.upgrade() {
                    if !state.reconciling.get() {
                        state.emit_views();
                    }
                }
            }));
        }

        let commands = self.commands.clone();
        subscriptions.push(
            source
                .commands()
                .subscribe(move |command| commands.emit(command.clone())),
        );
        if let Some(navigation) = sinks.navigation.as_ref() {
            let commands = self.commands.clone();
            subscriptions.push(navigation.subscribe(move |command| commands.emit(command.clone())));
        }

        for (name, merged) in &self.channels {
            let Some(output) = sinks.channel(name) else {
                continue;
            };
            let merged = merged.clone();
            let scope = scope.clone();
            subscriptions.push(output.subscribe(move |payload| {
                merged.emit(Envelope::scoped(scope.clone(), payload.clone()))
            }));
        }

        self.telemetry.log(
            LogLevel::Debug,
            COLLECTION_TARGET,
            "instance_created",
            [
                json_str("id", descriptor.id.clone()),
                json_str("name", descriptor.name.clone()),
            ],
        );
        self.telemetry.audit(
            RuntimeAuditStage::InstanceCreated,
            [json_str("id", descriptor.id.clone())],
        );

        Ok(InstanceEntry {
            descriptor: descriptor.clone(),
            view,
            subscriptions,
            _sinks: sinks,
            _sources: sources,
        })
    }

    /// Drop instances built during a reconciliation that failed part way,
    /// leaving the previous membership intact.
    fn discard(&self, ids: &[InstanceId]) {
        let dropped: Vec<InstanceEntry> = {
            let mut entries = self.entries.borrow_mut();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };
        for id in ids {
            self.registry.remove(id);
        }
        drop(dropped);
    }

    fn retire(&self, mut entry: InstanceEntry) {
        entry.subscriptions.clear();
        self.telemetry.log(
            LogLevel::Debug,
            COLLECTION_TARGET,
            "instance_destroyed",
            [json_str("id", entry.descriptor.id.clone())],
        );
        self.telemetry.audit(
            RuntimeAuditStage::InstanceDestroyed,
            [json_str("id", entry.descriptor.id.clone())],
        );
    }

    fn emit_views(&self) {
        let snapshot: Option<Vec<ViewRef>> = {
            let entries = self.entries.borrow();
            self.order
                .borrow()
                .iter()
                .map(|id| entries.get(id).and_then(|entry| entry.view.borrow().clone()))
                .collect()
        };
        // Wait until every live instance has rendered once.
        if let Some(views) = snapshot {
            self.views.emit(views);
        }
    }

    fn fail(&self, err: NavError) {
        self.telemetry.log(
            LogLevel::Error,
            COLLECTION_TARGET,
            "instance_failed",
            [json_str("error", err.to_string())],
        );
        self.telemetry.audit(
            RuntimeAuditStage::FatalError,
            [json_str("error", err.to_string())],
        );
        self.halt.raise(err);
    }
}

/// One live instance per stack id, reconciled on every stack value.
pub struct StackCollection {
    state: Rc<CollectionState>,
    _subscription: Subscription,
}

impl StackCollection {
    pub fn new(
        context: ProducerContext,
        screens: ScreenRegistry,
        registry: NavSourceRegistry,
        halt: Halt,
        telemetry: Telemetry,
    ) -> Self {
        let channels = context
            .channel_names()
            .map(|name| (name.to_string(), Stream::new()))
            .collect();
        let stack = context.stack.clone();
        let state = Rc::new(CollectionState {
            context,
            screens,
            registry,
            halt,
            telemetry,
            entries: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
            reconciling: Cell::new(false),
            pending: RefCell::new(None),
            members: Stream::new(),
            views: Stream::remembering(),
            commands: Stream::new(),
            channels,
        });

        let observer = Rc::downgrade(&state);
        let subscription = stack.subscribe(move |stack: &Stack| {
            if let Some(state) = observer.upgrade() {
                state.reconcile(stack);
            }
        });

        Self {
            state,
            _subscription: subscription,
        }
    }

    /// Membership after each reconciliation, in stack order.
    pub fn members(&self) -> Stream<Stack> {
        self.state.members.clone()
    }

    /// Latest visual output of every live instance, in stack order.
    pub fn views(&self) -> Stream<Vec<ViewRef>> {
        self.state.views.clone()
    }

    /// Commands from every live instance.
    pub fn commands(&self) -> Stream<Command> {
        self.state.commands.clone()
    }

    /// One merged stream per driver channel.
    pub fn channels(&self) -> &ChannelSet<Envelope> {
        &self.state.channels
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.state.order.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.state.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.entries.borrow().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutComponent;
    use crate::navigation::NavBus;
    use crate::view::View;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    struct Fixture {
        stack: Stream<Stack>,
        http: Stream<Envelope>,
        registry: NavSourceRegistry,
        halt: Halt,
        collection: StackCollection,
    }

    fn fixture(screens: ScreenRegistry) -> Fixture {
        let stack = Stream::remembering();
        let http = Stream::new();
        let mut drivers = BTreeMap::new();
        drivers.insert("http".to_string(), http.clone());
        let context = ProducerContext::new(drivers, NavBus::new(), stack.clone());
        let registry = NavSourceRegistry::new();
        let halt = Halt::new();
        let collection = StackCollection::new(
            context,
            screens,
            registry.clone(),
            halt.clone(),
            Telemetry::default(),
        );
        Fixture {
            stack,
            http,
            registry,
            halt,
            collection,
        }
    }

    fn labelled(screens: &mut ScreenRegistry, name: &'static str) {
        screens.register(name, move |sources: ScreenSources| {
            let view = sources
                .props
                .map(move |props: &Value| View::text(format!("{name}:{props}")));
            let http = sources.driver("http").map(move |v: &Value| json!({"from": name, "echo": v}));
            ScreenSinks::new().with_screen(view).with_channel("http", http)
        });
    }

    fn entry(name: &str) -> ScreenDescriptor {
        LayoutComponent::new(name).instantiate()
    }

    #[test]
    fn instances_follow_membership() {
        let built = Rc::new(Cell::new(0));
        let counter = Rc::clone(&built);
        let mut screens = ScreenRegistry::new();
        screens.register("A", move |_| {
            counter.set(counter.get() + 1);
            ScreenSinks::new()
        });
        let fx = fixture(screens);

        let a = entry("A");
        let b = entry("A");
        fx.stack.emit(vec![a.clone()]);
        fx.stack.emit(vec![a.clone(), b.clone()]);
        fx.stack.emit(vec![a.clone(), b.clone()]);
        assert_eq!(built.get(), 2);
        assert_eq!(fx.collection.ids(), vec![a.id.clone(), b.id.clone()]);

        fx.stack.emit(vec![a.clone()]);
        assert!(!fx.collection.contains(&b.id));
        assert_eq!(fx.collection.len(), 1);
    }

    #[test]
    fn new_top_entry_starts_on_top() {
        let mut screens = ScreenRegistry::new();
        screens.register("A", |_| ScreenSinks::new());
        let fx = fixture(screens);
        let a = entry("A");
        let b = entry("A");
        fx.stack.emit(vec![a.clone(), b.clone()]);
        assert_eq!(fx.registry.is_top(&a.id), Some(false));
        assert_eq!(fx.registry.is_top(&b.id), Some(true));
    }

    #[test]
    fn views_are_snapshotted_in_stack_order() {
        let mut screens = ScreenRegistry::new();
        labelled(&mut screens, "A");
        labelled(&mut screens, "B");
        let fx = fixture(screens);

        let a = LayoutComponent::new("A").with_props(json!(1)).instantiate();
        let b = LayoutComponent::new("B").with_props(json!(2)).instantiate();
        fx.stack.emit(vec![a.clone(), b.clone()]);
        let views = fx.collection.views().latest().unwrap();
        let lines: Vec<_> = views.iter().flat_map(|view| view.lines()).collect();
        assert_eq!(lines, vec!["A:1".to_string(), "B:2".to_string()]);

        fx.stack.emit(vec![]);
        assert!(fx.collection.views().latest().unwrap().is_empty());
    }

    #[test]
    fn snapshot_waits_for_every_instance_to_render() {
        let late = Stream::new();
        let output = late.clone();
        let mut screens = ScreenRegistry::new();
        labelled(&mut screens, "A");
        screens.register("Slow", move |_| ScreenSinks::new().with_screen(output.clone()));
        let fx = fixture(screens);

        let count = Rc::new(Cell::new(0));
        let hits = Rc::clone(&count);
        let _sub = fx.collection.views().subscribe(move |_| hits.set(hits.get() + 1));

        fx.stack.emit(vec![entry("A"), entry("Slow")]);
        assert_eq!(count.get(), 0);
        late.emit(View::text("ready"));
        assert_eq!(count.get(), 1);
        assert_eq!(fx.collection.views().latest().unwrap().len(), 2);
    }

    #[test]
    fn merged_channel_tags_and_stops_with_the_instance() {
        let mut screens = ScreenRegistry::new();
        labelled(&mut screens, "A");
        labelled(&mut screens, "B");
        let fx = fixture(screens);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = fx.collection.channels()["http"]
            .subscribe(move |envelope: &Envelope| sink.borrow_mut().push(envelope.clone()));

        let a = entry("A");
        let b = entry("B");
        fx.stack.emit(vec![a.clone(), b.clone()]);
        fx.http.emit(Envelope::broadcast(json!("ping")));
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[0].scope, Some(Scope::Screen(a.id.clone())));
        assert_eq!(seen.borrow()[1].scope, Some(Scope::Screen(b.id.clone())));

        fx.http
            .emit(Envelope::scoped(Scope::Screen(b.id.clone()), json!("only b")));
        assert_eq!(seen.borrow().len(), 3);

        fx.stack.emit(vec![a.clone()]);
        seen.borrow_mut().clear();
        fx.http.emit(Envelope::broadcast(json!("again")));
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].payload, json!({"from": "A", "echo": "again"}));
    }

    #[test]
    fn teardown_happens_after_membership_is_published() {
        let mut screens = ScreenRegistry::new();
        labelled(&mut screens, "A");
        let fx = fixture(screens);
        let a = entry("A");
        let b = entry("A");
        fx.stack.emit(vec![a.clone(), b.clone()]);

        let http = fx.http.clone();
        let echoes = Rc::new(Cell::new(0));
        let count = Rc::clone(&echoes);
        let _out = fx.collection.channels()["http"].subscribe(move |_| count.set(count.get() + 1));
        let _members = fx.collection.members().subscribe(move |_| {
            http.emit(Envelope::broadcast(json!("during")));
        });

        fx.stack.emit(vec![a.clone()]);
        // Both instances were still wired while membership was published.
        assert_eq!(echoes.get(), 2);
    }

    #[test]
    fn unknown_screen_halts() {
        let fx = fixture(ScreenRegistry::new());
        fx.stack.emit(vec![entry("Ghost")]);
        assert!(matches!(fx.halt.check(), Err(NavError::ScreenNotFound(name)) if name == "Ghost"));
        assert!(fx.collection.is_empty());
    }

    #[test]
    fn failed_reconciliation_keeps_the_previous_instances() {
        let mut screens = ScreenRegistry::new();
        labelled(&mut screens, "A");
        let fx = fixture(screens);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = fx.collection.channels()["http"]
            .subscribe(move |envelope: &Envelope| sink.borrow_mut().push(envelope.clone()));

        let a = entry("A");
        fx.stack.emit(vec![a.clone()]);
        let b = entry("A");
        fx.stack.emit(vec![a.clone(), b.clone(), entry("Ghost")]);

        assert!(fx.halt.is_halted());
        assert_eq!(fx.collection.ids(), vec![a.id.clone()]);
        assert!(!fx.collection.contains(&b.id));
        assert!(!fx.registry.contains(&b.id));

        fx.http.emit(Envelope::broadcast(json!("ping")));
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].scope, Some(Scope::Screen(a.id.clone())));
    }

    #[test]
    fn props_are_replayed_to_every_subscriber() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let held = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let keep = Rc::clone(&held);
        let mut screens = ScreenRegistry::new();
        screens.register("P", move |sources: ScreenSources| {
            for _ in 0..2 {
                let log = Rc::clone(&log);
                let subscription = sources
                    .props
                    .subscribe(move |v: &Value| log.borrow_mut().push(v.clone()));
                keep.borrow_mut().push(subscription);
            }
            ScreenSinks::new()
        });
        let fx = fixture(screens);
        fx.stack
            .emit(vec![LayoutComponent::new("P").with_props(json!({"k": 1})).instantiate()]);
        assert_eq!(*seen.borrow(), vec![json!({"k": 1}), json!({"k": 1})]);
        assert_eq!(held.borrow().len(), 2);
    }
}
