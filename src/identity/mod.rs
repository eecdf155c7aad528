//! Process-unique screen instance identities.
//!
//! An id is the screen name followed by [`ID_SEPARATOR`] and a counter that
//! starts at 1 and only ever grows, so ids are never reused while the process
//! lives.

use std::sync::atomic::{AtomicU64, Ordering};

pub type InstanceId = String;

pub const ID_SEPARATOR: &str = "---";

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh id for an instance of `name`.
pub fn allocate(name: &str) -> InstanceId {
    let counter = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
    format!("{name}{ID_SEPARATOR}{counter}")
}

/// Recover the screen name an id was allocated for.
pub fn name_of(id: &str) -> &str {
    id.rsplit_once(ID_SEPARATOR)
        .map(|(name, _)| name)
        .unwrap_or(id)
}
