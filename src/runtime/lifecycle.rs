//! Appear/disappear notifications derived from collection membership.

use std::cell::RefCell;
use std::rc::Rc;

use crate::identity::{InstanceId, name_of};
use crate::layout::{ScreenDescriptor, Stack};
use crate::logging::{LogLevel, json_kv, json_str};
use crate::navigation::{DidAppearEvent, DidDisappearEvent, NavBus, NavSourceRegistry};
use crate::stream::{Stream, Subscription};
use crate::telemetry::{LIFECYCLE_TARGET, Telemetry};

/// Ids that appeared and disappeared between two membership snapshots.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MembershipDiff {
    pub appeared: Vec<ScreenDescriptor>,
    pub disappeared: Vec<InstanceId>,
}

impl MembershipDiff {
    pub fn between(known: &[InstanceId], next: &[ScreenDescriptor]) -> Self {
        let appeared = next
            .iter()
            .filter(|entry| !known.contains(&entry.id))
            .cloned()
            .collect();
        let disappeared = known
            .iter()
            .filter(|id| !next.iter().any(|entry| &entry.id == *id))
            .cloned()
            .collect();
        Self {
            appeared,
            disappeared,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty()
    }
}

struct NotifierState {
    known: RefCell<Vec<InstanceId>>,
    bus: NavBus,
    registry: NavSourceRegistry,
    telemetry: Telemetry,
}

impl NotifierState {
    fn observe(&self, members: &Stack) {
        let diff = {
            let mut known = self.known.borrow_mut();
            let diff = MembershipDiff::between(&known, members);
            *known = members.iter().map(|entry| entry.id.clone()).collect();
            diff
        };
        if diff.is_empty() {
            return;
        }

        for entry in &diff.appeared {
            self.telemetry.log(
                LogLevel::Debug,
                LIFECYCLE_TARGET,
                "did_appear",
                [json_str("id", entry.id.clone()), json_str("name", entry.name.clone())],
            );
            self.bus.announce_appear(DidAppearEvent {
                component_id: entry.id.clone(),
                component_name: name_of(&entry.id).to_string(),
                pass_props: entry.pass_props.clone(),
            });
            if let Some(source) = self.registry.get(&entry.id) {
                source.trigger_appear();
            }
        }

        for id in &diff.disappeared {
            self.telemetry.log(
                LogLevel::Debug,
                LIFECYCLE_TARGET,
                "did_disappear",
                [json_str("id", id.clone())],
            );
            self.bus.announce_disappear(DidDisappearEvent {
                component_id: id.clone(),
                component_name: name_of(id).to_string(),
            });
            if let Some(source) = self.registry.get(id) {
                source.trigger_disappear();
            }
            self.registry.remove(id);
        }

        self.telemetry.record(|metrics| {
            metrics.record_lifecycle(diff.appeared.len(), diff.disappeared.len())
        });
        self.telemetry.log(
            LogLevel::Trace,
            LIFECYCLE_TARGET,
            "membership_changed",
            [
                json_kv("appeared", diff.appeared.len()),
                json_kv("disappeared", diff.disappeared.len()),
                json_kv("live", members.len()),
            ],
        );
    }
}

/// Fires global and per-instance lifecycle events, once per transition.
pub struct LifecycleNotifier {
    state: Rc<NotifierState>,
    _subscription: Subscription,
}

impl LifecycleNotifier {
    pub fn attach(
        members: &Stream<Stack>,
        bus: NavBus,
        registry: NavSourceRegistry,
        telemetry: Telemetry,
    ) -> Self {
        let state = Rc::new(NotifierState {
            known: RefCell::new(Vec::new()),
            bus,
            registry,
            telemetry,
        });
        let observer = Rc::downgrade(&state);
        let subscription = members.subscribe(move |stack| {
            if let Some(state) = observer.upgrade() {
                state.observe(stack);
            }
        });
        Self {
            state,
            _subscription: subscription,
        }
    }

    pub fn known(&self) -> Vec<InstanceId> {
        self.state.known.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutComponent;
    use crate::navigation::NavSource;
    use std::cell::Cell;

    fn entry(name: &str) -> ScreenDescriptor {
        LayoutComponent::new(name).instantiate()
    }

    #[test]
    fn diff_reports_both_directions() {
        let a = entry("A");
        let b = entry("B");
        let c = entry("C");
        let known = vec![a.id.clone(), b.id.clone()];
        let diff = MembershipDiff::between(&known, &[a.clone(), c.clone()]);
        assert_eq!(diff.appeared, vec![c]);
        assert_eq!(diff.disappeared, vec![b.id]);
    }

    #[test]
    fn each_transition_fires_exactly_once() {
        let bus = NavBus::new();
        let registry = NavSourceRegistry::new();
        let members = Stream::new();
        let notifier =
            LifecycleNotifier::attach(&members, bus.clone(), registry.clone(), Telemetry::default());

        let appeared = Rc::new(RefCell::new(Vec::new()));
        let disappeared = Rc::new(RefCell::new(Vec::new()));
        let a_log = Rc::clone(&appeared);
        let d_log = Rc::clone(&disappeared);
        let _a = bus
            .did_appear()
            .subscribe(move |event| a_log.borrow_mut().push(event.component_name.clone()));
        let _d = bus
            .did_disappear()
            .subscribe(move |event| d_log.borrow_mut().push(event.component_id.clone()));

        let a = entry("A");
        let b = entry("B");
        let c = entry("C");
        let c_source = NavSource::new(&bus);
        registry.insert(c.id.clone(), c_source.clone());
        let direct = Rc::new(Cell::new(0));
        let hits = Rc::clone(&direct);
        let _direct = c_source
            .did_disappear()
            .subscribe(move |_| hits.set(hits.get() + 1));

        members.emit(vec![a.clone(), b.clone()]);
        appeared.borrow_mut().clear();

        members.emit(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(*appeared.borrow(), vec!["C".to_string()]);

        members.emit(vec![a.clone(), b.clone()]);
        members.emit(vec![a.clone(), b.clone()]);
        assert_eq!(*disappeared.borrow(), vec![c.id.clone()]);
        assert_eq!(direct.get(), 1);
        assert!(!registry.contains(&c.id));
        assert_eq!(notifier.known(), vec![a.id, b.id]);
    }
}
