use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Counters describing navigation activity since the runtime started.
#[derive(Debug, Default, Clone)]
pub struct NavigationMetrics {
    commands: u64,
    pushes: u64,
    pops: u64,
    root_resets: u64,
    ignored_commands: u64,
    instances_created: u64,
    instances_destroyed: u64,
    appear_events: u64,
    disappear_events: u64,
}

impl NavigationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&mut self) {
        self.commands = self.commands.saturating_add(1);
    }

    pub fn record_push(&mut self) {
        self.pushes = self.pushes.saturating_add(1);
    }

    pub fn record_pop(&mut self) {
        self.pops = self.pops.saturating_add(1);
    }

    pub fn record_root_reset(&mut self) {
        self.root_resets = self.root_resets.saturating_add(1);
    }

    pub fn record_ignored(&mut self) {
        self.ignored_commands = self.ignored_commands.saturating_add(1);
    }

    pub fn record_instances(&mut self, created: usize, destroyed: usize) {
        self.instances_created = self.instances_created.saturating_add(created as u64);
        self.instances_destroyed = self.instances_destroyed.saturating_add(destroyed as u64);
    }

    pub fn record_lifecycle(&mut self, appeared: usize, disappeared: usize) {
        self.appear_events = self.appear_events.saturating_add(appeared as u64);
        self.disappear_events = self.disappear_events.saturating_add(disappeared as u64);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            commands: self.commands,
            pushes: self.pushes,
            pops: self.pops,
            root_resets: self.root_resets,
            ignored_commands: self.ignored_commands,
            instances_created: self.instances_created,
            instances_destroyed: self.instances_destroyed,
            appear_events: self.appear_events,
            disappear_events: self.disappear_events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub commands: u64,
    pub pushes: u64,
    pub pops: u64,
    pub root_resets: u64,
    pub ignored_commands: u64,
    pub instances_created: u64,
    pub instances_destroyed: u64,
    pub appear_events: u64,
    pub disappear_events: u64,
}

impl MetricSnapshot {
    /// Instances that are currently alive according to the counters.
    pub fn live_instances(&self) -> u64 {
        self.instances_created
            .saturating_sub(self.instances_destroyed)
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "navigation_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("commands".to_string(), json!(self.commands));
        map.insert("pushes".to_string(), json!(self.pushes));
        map.insert("pops".to_string(), json!(self.pops));
        map.insert("root_resets".to_string(), json!(self.root_resets));
        map.insert("ignored_commands".to_string(), json!(self.ignored_commands));
        map.insert("instances_created".to_string(), json!(self.instances_created));
        map.insert(
            "instances_destroyed".to_string(),
            json!(self.instances_destroyed),
        );
        map.insert("appear_events".to_string(), json!(self.appear_events));
        map.insert("disappear_events".to_string(), json!(self.disappear_events));
        map
    }
}
