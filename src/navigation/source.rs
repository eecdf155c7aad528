use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::identity::InstanceId;
use crate::layout::{Layout, LayoutComponent, ScreenDescriptor};
use crate::stream::Stream;

use super::Command;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DidAppearEvent {
    pub component_id: InstanceId,
    pub component_name: String,
    pub pass_props: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDisappearEvent {
    pub component_id: InstanceId,
    pub component_name: String,
}

/// Process-wide broadcast streams every event source is built from.
#[derive(Clone, Default)]
pub struct NavBus {
    did_appear: Stream<DidAppearEvent>,
    did_disappear: Stream<DidDisappearEvent>,
    back: Stream<()>,
}

impl NavBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did_appear(&self) -> Stream<DidAppearEvent> {
        self.did_appear.clone()
    }

    pub fn did_disappear(&self) -> Stream<DidDisappearEvent> {
        self.did_disappear.clone()
    }

    pub fn back(&self) -> Stream<()> {
        self.back.clone()
    }

    /// Broadcast a back request (hardware back, `Esc`, ...).
    pub fn emit_back(&self) {
        self.back.emit(());
    }

    pub(crate) fn announce_appear(&self, event: DidAppearEvent) {
        self.did_appear.emit(event);
    }

    pub(crate) fn announce_disappear(&self, event: DidDisappearEvent) {
        self.did_disappear.emit(event);
    }
}

struct NavSourceInner {
    bus: NavBus,
    did_appear: Stream<()>,
    did_disappear: Stream<()>,
    is_top: Cell<bool>,
    commands: Stream<Command>,
}

/// Navigation source handed to one screen instance or overlay scope.
///
/// `did_appear`/`did_disappear` only fire for the owner of this source; they
/// are driven directly by the lifecycle notifier (stack instances) or by the
/// frame visibility flag (frame scope). Commands pushed through the helper
/// methods travel upward to the reducer.
#[derive(Clone)]
pub struct NavSource {
    inner: Rc<NavSourceInner>,
}

impl NavSource {
    pub fn new(bus: &NavBus) -> Self {
        Self {
            inner: Rc::new(NavSourceInner {
                bus: bus.clone(),
                did_appear: Stream::new(),
                did_disappear: Stream::new(),
                is_top: Cell::new(false),
                commands: Stream::new(),
            }),
        }
    }

    pub fn did_appear(&self) -> Stream<()> {
        self.inner.did_appear.clone()
    }

    pub fn did_disappear(&self) -> Stream<()> {
        self.inner.did_disappear.clone()
    }

    /// Global back broadcast; screens usually act on it only while on top.
    pub fn back(&self) -> Stream<()> {
        self.inner.bus.back()
    }

    pub fn global_did_appear(&self) -> Stream<DidAppearEvent> {
        self.inner.bus.did_appear()
    }

    pub fn global_did_disappear(&self) -> Stream<DidDisappearEvent> {
        self.inner.bus.did_disappear()
    }

    pub fn is_top(&self) -> bool {
        self.inner.is_top.get()
    }

    pub(crate) fn set_top(&self, is_top: bool) {
        self.inner.is_top.set(is_top);
    }

    pub(crate) fn trigger_appear(&self) {
        self.inner.did_appear.emit(());
    }

    pub(crate) fn trigger_disappear(&self) {
        self.inner.did_disappear.emit(());
    }

    pub fn commands(&self) -> Stream<Command> {
        self.inner.commands.clone()
    }

    pub fn navigate(&self, command: Command) {
        self.inner.commands.emit(command);
    }

    pub fn push(&self, component: LayoutComponent) {
        self.navigate(Command::push(component));
    }

    pub fn set_stack_root(&self, layout: Layout) {
        self.navigate(Command::set_stack_root(layout));
    }

    pub fn pop(&self) {
        self.navigate(Command::Pop);
    }

    pub fn pop_to_root(&self) {
        self.navigate(Command::PopToRoot);
    }

    pub fn ptr_eq(&self, other: &NavSource) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Lookup table from instance id to its event source. Entries are added when
/// an instance is constructed and removed after its disappear notification.
#[derive(Clone, Default)]
pub struct NavSourceRegistry {
    inner: Rc<RefCell<HashMap<InstanceId, NavSource>>>,
}

impl NavSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: InstanceId, source: NavSource) {
        self.inner.borrow_mut().insert(id, source);
    }

    pub fn get(&self, id: &str) -> Option<NavSource> {
        self.inner.borrow().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<NavSource> {
        self.inner.borrow_mut().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn is_top(&self, id: &str) -> Option<bool> {
        self.inner.borrow().get(id).map(NavSource::is_top)
    }

    /// Mark the source of the last stack entry as top and every other known
    /// source as not top.
    pub fn update_is_tops(&self, stack: &[ScreenDescriptor]) {
        let top = stack.last().map(|entry| entry.id.as_str());
        for (id, source) in self.inner.borrow().iter() {
            source.set_top(Some(id.as_str()) == top);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ScreenDescriptor {
        LayoutComponent::new(name).instantiate()
    }

    #[test]
    fn helper_methods_emit_commands_upward() {
        let bus = NavBus::new();
        let source = NavSource::new(&bus);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = source
            .commands()
            .subscribe(move |command: &Command| sink.borrow_mut().push(command.kind()));

        source.push(LayoutComponent::new("Next"));
        source.pop();
        source.pop_to_root();
        assert_eq!(*seen.borrow(), vec!["push", "pop", "popToRoot"]);
    }

    #[test]
    fn direct_triggers_do_not_touch_the_global_bus() {
        let bus = NavBus::new();
        let source = NavSource::new(&bus);
        let global = Rc::new(Cell::new(0));
        let local = Rc::new(Cell::new(0));
        let g = Rc::clone(&global);
        let l = Rc::clone(&local);
        let _a = bus.did_appear().subscribe(move |_| g.set(g.get() + 1));
        let _b = source.did_appear().subscribe(move |_| l.set(l.get() + 1));

        source.trigger_appear();
        assert_eq!(local.get(), 1);
        assert_eq!(global.get(), 0);
    }

    #[test]
    fn back_is_broadcast_to_every_source() {
        let bus = NavBus::new();
        let a = NavSource::new(&bus);
        let b = NavSource::new(&bus);
        let hits = Rc::new(Cell::new(0));
        let ha = Rc::clone(&hits);
        let hb = Rc::clone(&hits);
        let _a = a.back().subscribe(move |_| ha.set(ha.get() + 1));
        let _b = b.back().subscribe(move |_| hb.set(hb.get() + 1));
        bus.emit_back();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn exactly_the_last_entry_is_top() {
        let bus = NavBus::new();
        let registry = NavSourceRegistry::new();
        let stack: Vec<_> = ["A", "B", "C"].into_iter().map(descriptor).collect();
        for entry in &stack {
            registry.insert(entry.id.clone(), NavSource::new(&bus));
        }

        registry.update_is_tops(&stack);
        let tops: Vec<_> = stack
            .iter()
            .map(|entry| registry.is_top(&entry.id).unwrap())
            .collect();
        assert_eq!(tops, vec![false, false, true]);

        registry.update_is_tops(&stack[..1]);
        assert_eq!(registry.is_top(&stack[0].id), Some(true));
        assert_eq!(registry.is_top(&stack[2].id), Some(false));
    }
}
