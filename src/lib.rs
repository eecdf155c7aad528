//! Stack navigation runtime for stream-composed screens.
//!
//! Screens are pure functions from their sources (driver streams, props,
//! navigation events, the shared stack) to their sinks (a view, navigation
//! commands, driver channels). The runtime keeps one live instance per stack
//! entry, composes their views so only the top is shown, fires appear and
//! disappear notifications once per transition, and reduces commands into
//! the next stack.
//!
//! Two optional singleton scopes sit outside the stack: a frame wrapping the
//! composed stack view and a global scope that never renders.

pub mod error;
pub mod identity;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod navigation;
pub mod render;
pub mod runtime;
pub mod stream;
pub mod telemetry;
pub mod view;

pub use error::{Halt, NavError, Result};
pub use identity::{InstanceId, allocate, name_of};
pub use layout::{Layout, LayoutComponent, Options, ScreenDescriptor, Stack};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{MetricSnapshot, NavigationMetrics};
pub use navigation::{Command, DidAppearEvent, DidDisappearEvent, NavBus, NavSource};
pub use render::{RendererSettings, Size, TerminalRenderer, display_width};
pub use runtime::audit::{
    BufferedRuntimeAudit, NullRuntimeAudit, RuntimeAudit, RuntimeAuditEvent,
    RuntimeAuditEventBuilder, RuntimeAuditStage,
};
pub use runtime::driver::cli::{CliDriver, CliDriverError, DriverResult, KeyAction, key_action};
pub use runtime::driver::{Driver, Drivers, Envelope, MemoryDriver, MemoryDriverHandle, Scope};
pub use runtime::screens::{ScreenFn, ScreenRegistry, ScreenSinks, ScreenSources};
pub use runtime::{Navigator, RuntimeConfig, run};
pub use stream::{Stream, Subscription, combine};
pub use view::{Display, View, ViewRef};
