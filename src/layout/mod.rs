//! Navigation layouts and the screen descriptors instantiated from them.
//!
//! Layouts arrive as camelCase JSON (or are built in code) and must resolve
//! to exactly one root component. Instantiating a component allocates its
//! process-unique id.

mod core;

pub use core::{
    Layout, LayoutComponent, LayoutSideMenu, LayoutStack, Options, ScreenDescriptor,
    SideMenuOptions, SideMenuSideOptions, Stack, frame_enabled,
};
pub(crate) use core::describe;
