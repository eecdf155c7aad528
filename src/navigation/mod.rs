//! Navigation commands, per-instance event sources and the stack reducer.

pub mod command;
pub mod reducer;
pub mod source;

pub use command::Command;
pub use reducer::{StackReducer, initial_stack, reduce};
pub use source::{DidAppearEvent, DidDisappearEvent, NavBus, NavSource, NavSourceRegistry};
