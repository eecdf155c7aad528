use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crate::error::{Halt, NavError, Result};
use crate::identity::InstanceId;
use crate::layout::{Layout, Stack};
use crate::logging::{LogLevel, Logger, json_kv, json_str};
use crate::metrics::{MetricSnapshot, NavigationMetrics};
use crate::navigation::{Command, NavBus, NavSource, NavSourceRegistry, StackReducer};
use crate::stream::{Stream, Subscription, combine};
use crate::telemetry::{RUNTIME_TARGET, Telemetry};
use crate::view::{View, ViewRef};

pub mod audit;
pub mod collection;
pub mod driver;
pub mod lifecycle;
pub mod overlay;
pub mod screens;
pub mod sinks;
pub mod visibility;

use audit::{RuntimeAudit, RuntimeAuditStage};
use collection::StackCollection;
use driver::{Driver, Drivers, Envelope, Scope};
use lifecycle::LifecycleNotifier;
use overlay::{FrameLifecycle, OverlayScope, frame_visibility};
use screens::{ProducerContext, RESERVED_CHANNELS, ScreenRegistry};
use sinks::{ChannelSet, merge_channels};
use visibility::VisibilityComposer;

/// Ambient services for one navigator.
#[derive(Clone, Default)]
pub struct RuntimeConfig {
    /// Optional structured logger used by every stage.
    pub logger: Option<Logger>,
    /// Navigation counters; `None` disables collection.
    pub metrics: Option<Arc<Mutex<NavigationMetrics>>>,
    /// Optional audit hook receiving stage records.
    pub audit: Option<Arc<dyn RuntimeAudit>>,
}

impl RuntimeConfig {
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn RuntimeAudit>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(NavigationMetrics::new())));
        }
    }

    /// Disable metrics collection.
    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<NavigationMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::new(self.logger.clone(), self.metrics_handle(), self.audit.clone())
    }
}

/// A wired navigation runtime.
///
/// Owns every stage; dropping it tears the whole graph down.
pub struct Navigator {
    view: Stream<ViewRef>,
    stack: Stream<Stack>,
    reducer: Rc<StackReducer>,
    sinks: ChannelSet<Envelope>,
    driver_proxies: Vec<Stream<Envelope>>,
    driver_gates: Vec<Stream<Envelope>>,
    bus: NavBus,
    registry: NavSourceRegistry,
    halt: Halt,
    telemetry: Telemetry,
    collection: StackCollection,
    frame: Option<OverlayScope>,
    global: Option<OverlayScope>,
    _notifier: LifecycleNotifier,
    _frame_lifecycle: Option<FrameLifecycle>,
    _commands: Subscription,
    _drivers: BTreeMap<String, Box<dyn Driver>>,
}

/// Wire screens, overlay scopes and drivers around a stack seeded from
/// `layout`, then publish the initial stack.
pub fn run(
    screens: ScreenRegistry,
    drivers: Drivers,
    layout: &Layout,
    config: RuntimeConfig,
) -> Result<Navigator> {
    let telemetry = config.telemetry();
    if let Err(err) = drivers.validate() {
        return Err(startup_failure(&telemetry, err));
    }

    let bus = NavBus::new();
    let registry = NavSourceRegistry::new();
    let halt = Halt::new();
    let reducer = StackReducer::new(layout, registry.clone(), halt.clone(), telemetry.clone())?;

    // Stack state is consumed before the reducer producing it is connected.
    let stack = Stream::remembering();

    let drivers = drivers.into_entries();
    let mut driver_sinks = BTreeMap::new();
    let mut driver_sources = BTreeMap::new();
    let mut driver_gates = Vec::new();
    for (name, driver) in &drivers {
        let proxy = Stream::new();
        // Producers read through a gate that is cut when the runtime halts.
        let gate = Stream::new();
        gate.imitate(&driver.connect(proxy.clone()));
        driver_sources.insert(name.clone(), gate.clone());
        driver_sinks.insert(name.clone(), proxy);
        driver_gates.push(gate);
    }

    let context = ProducerContext::new(driver_sources, bus.clone(), stack.clone());
    let collection = StackCollection::new(
        context.clone(),
        screens.clone(),
        registry.clone(),
        halt.clone(),
        telemetry.clone(),
    );
    let notifier = LifecycleNotifier::attach(
        &collection.members(),
        bus.clone(),
        registry.clone(),
        telemetry.clone(),
    );
    let composer = Rc::new(VisibilityComposer::new());
    let unframed = composer.attach(&collection.views());

    let frame_enabled = frame_visibility(&stack);
    let frame = screens
        .frame()
        .map(|screen| OverlayScope::mount(Scope::Frame, &screen, &context, Some(unframed.clone())));
    let frame_lifecycle = frame.as_ref().map(|frame| {
        FrameLifecycle::attach(&frame_enabled, frame.source().clone(), telemetry.clone())
    });
    let global = screens
        .global()
        .map(|screen| OverlayScope::mount(Scope::Global, &screen, &context, None));

    let view = match frame.as_ref() {
        Some(frame) => select_view(&frame_enabled, frame, &unframed),
        None => unframed,
    };

    let mut command_sources = vec![collection.commands()];
    command_sources.extend(frame.iter().map(OverlayScope::commands));
    command_sources.extend(global.iter().map(OverlayScope::commands));
    let commands = Stream::merge(command_sources);
    let target = Rc::downgrade(&reducer);
    let command_subscription = commands.subscribe(move |command: &Command| {
        if let Some(reducer) = target.upgrade() {
            reducer.dispatch(command.clone());
        }
    });

    let empty = ChannelSet::new();
    let sinks = merge_channels(
        &[
            collection.channels(),
            frame.as_ref().map_or(&empty, OverlayScope::channels),
            global.as_ref().map_or(&empty, OverlayScope::channels),
        ],
        &RESERVED_CHANNELS,
    );
    for (name, proxy) in &driver_sinks {
        if let Some(sink) = sinks.get(name) {
            proxy.imitate(sink);
        }
    }

    let driver_proxies: Vec<Stream<Envelope>> = driver_sinks.into_values().collect();
    {
        let stack = stack.clone();
        let proxies = driver_proxies.clone();
        let gates = driver_gates.clone();
        halt.on_halt(move || {
            stack.release_upstream();
            for stream in &proxies {
                stream.release_upstream();
            }
            for stream in &gates {
                stream.release_upstream();
            }
        });
    }

    stack.imitate(&reducer.stack());
    reducer.start();

    if let Err(err) = halt.check() {
        return Err(startup_failure(&telemetry, err));
    }

    let current = reducer.current();
    telemetry.log(
        LogLevel::Info,
        RUNTIME_TARGET,
        "runtime_started",
        [
            json_str("root", current.first().map_or("", |entry| entry.id.as_str())),
            json_kv("drivers", drivers.keys().cloned().collect::<Vec<_>>()),
            json_kv("frame", frame.is_some()),
            json_kv("global", global.is_some()),
        ],
    );
    telemetry.audit(
        RuntimeAuditStage::RuntimeStarted,
        [json_kv("depth", current.len())],
    );

    Ok(Navigator {
        view,
        stack,
        reducer,
        sinks,
        driver_proxies,
        driver_gates,
        bus,
        registry,
        halt,
        telemetry,
        collection,
        frame,
        global,
        _notifier: notifier,
        _frame_lifecycle: frame_lifecycle,
        _commands: command_subscription,
        _drivers: drivers,
    })
}

/// The frame's own view while it is enabled, the composed stack otherwise.
fn select_view(
    enabled: &Stream<bool>,
    frame: &OverlayScope,
    unframed: &Stream<ViewRef>,
) -> Stream<ViewRef> {
    let framed = frame
        .view()
        .map(|view| view.map(|view: &ViewRef| Some(Rc::clone(view))))
        .unwrap_or_else(Stream::never)
        .start_with(None);
    combine(&combine(enabled, &framed), unframed).map(
        |selection: &((bool, Option<ViewRef>), ViewRef)| {
            let ((enabled, framed), unframed) = selection;
            if *enabled {
                framed.clone().unwrap_or_else(View::empty)
            } else {
                Rc::clone(unframed)
            }
        },
    )
}

fn startup_failure(telemetry: &Telemetry, err: NavError) -> NavError {
    telemetry.log(
        LogLevel::Error,
        RUNTIME_TARGET,
        "runtime_failed",
        [json_str("error", err.to_string())],
    );
    telemetry.audit(
        RuntimeAuditStage::FatalError,
        [json_str("error", err.to_string())],
    );
    err
}

impl Navigator {
    /// Root view: the frame while enabled, otherwise the composed stack.
    pub fn view(&self) -> Stream<ViewRef> {
        self.view.clone()
    }

    pub fn stack(&self) -> Stream<Stack> {
        self.stack.clone()
    }

    pub fn current_stack(&self) -> Stack {
        self.reducer.current()
    }

    /// Aggregated sink for a driver channel.
    pub fn sink(&self, channel: &str) -> Option<Stream<Envelope>> {
        self.sinks.get(channel).cloned()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.sinks.keys().map(String::as_str).collect()
    }

    pub fn bus(&self) -> &NavBus {
        &self.bus
    }

    pub fn frame_source(&self) -> Option<&NavSource> {
        self.frame.as_ref().map(OverlayScope::source)
    }

    pub fn global_source(&self) -> Option<&NavSource> {
        self.global.as_ref().map(OverlayScope::source)
    }

    /// Broadcast a back request to every producer.
    pub fn back(&self) -> Result<()> {
        self.halt.check()?;
        self.bus.emit_back();
        self.halt.check()
    }

    /// Feed a command to the reducer as if a screen had emitted it.
    pub fn dispatch(&self, command: Command) -> Result<()> {
        self.halt.check()?;
        self.reducer.dispatch(command);
        self.halt.check()
    }

    pub fn is_top(&self, id: &str) -> Option<bool> {
        self.registry.is_top(id)
    }

    pub fn live_instances(&self) -> Vec<InstanceId> {
        self.collection.ids()
    }

    /// The fatal error that halted the runtime, if any.
    pub fn check(&self) -> Result<()> {
        self.halt.check()
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_halted()
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        self.telemetry.snapshot()
    }

    pub fn emit_metrics(&self) {
        self.telemetry.emit_metrics();
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        // Cut the feedback loops first so no stage reacts while the rest is
        // being dropped.
        self.halt.clear_hooks();
        self.stack.release_upstream();
        for proxy in &self.driver_proxies {
            proxy.release_upstream();
        }
        for gate in &self.driver_gates {
            gate.release_upstream();
        }
    }
}
