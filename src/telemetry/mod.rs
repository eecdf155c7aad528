//! Logging, metrics and audit handles bundled for the runtime stages.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;

use crate::logging::{LogLevel, Logger, event_with_fields};
use crate::metrics::{MetricSnapshot, NavigationMetrics};
use crate::runtime::audit::{RuntimeAudit, RuntimeAuditEventBuilder, RuntimeAuditStage};

pub const RUNTIME_TARGET: &str = "room_nav::runtime";
pub const REDUCER_TARGET: &str = "room_nav::reducer";
pub const COLLECTION_TARGET: &str = "room_nav::collection";
pub const LIFECYCLE_TARGET: &str = "room_nav::lifecycle";
pub const METRICS_TARGET: &str = "room_nav::metrics";

#[derive(Clone)]
pub struct Telemetry {
    logger: Option<Logger>,
    metrics: Option<Arc<Mutex<NavigationMetrics>>>,
    audit: Option<Arc<dyn RuntimeAudit>>,
    started_at: Instant,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

impl Telemetry {
    pub fn new(
        logger: Option<Logger>,
        metrics: Option<Arc<Mutex<NavigationMetrics>>>,
        audit: Option<Arc<dyn RuntimeAudit>>,
    ) -> Self {
        Self {
            logger,
            metrics,
            audit,
            started_at: Instant::now(),
        }
    }

    pub fn log<I>(&self, level: LogLevel, target: &str, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.logger.as_ref() {
            if logger.enabled(level) {
                let _ = logger.log_event(event_with_fields(level, target, message, fields));
            }
        }
    }

    pub fn record(&self, update: impl FnOnce(&mut NavigationMetrics)) {
        if let Some(metrics) = self.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }

    pub fn audit<I>(&self, stage: RuntimeAuditStage, details: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(audit) = self.audit.as_ref() {
            let mut builder = RuntimeAuditEventBuilder::new(stage);
            for (key, value) in details {
                builder.detail(key, value);
            }
            audit.record(builder.finish());
        }
    }

    pub fn snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.metrics.as_ref()?;
        let guard = metrics.lock().ok()?;
        Some(guard.snapshot(self.started_at.elapsed()))
    }

    /// Write the current metrics snapshot through the logger.
    pub fn emit_metrics(&self) {
        if let (Some(logger), Some(snapshot)) = (self.logger.as_ref(), self.snapshot()) {
            let _ = logger.log_event(snapshot.to_log_event(METRICS_TARGET));
        }
    }
}
