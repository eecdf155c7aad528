//! Single-threaded push streams used to wire screens, overlays and the stack
//! reducer together.
//!
//! Everything is eager: a derived stream subscribes to its upstream as soon as
//! it is created and values flow synchronously inside `emit`. There is no
//! completion and no error channel.

mod core;

pub use core::{Stream, Subscription, combine};
