use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::stream::Stream;
use crate::view::{Display, View, ViewRef};

/// Child pointer, position and display of a wrapper. A cached wrapper keeps
/// its child alive, so the pointer cannot be reused while the entry exists.
type WrapKey = (usize, usize, Display);

/// Wraps the stack's views so only the last one is shown.
///
/// Wrappers are reused while the child view and its position are unchanged,
/// so unchanged entries keep their identity between emissions.
#[derive(Default)]
pub struct VisibilityComposer {
    cache: RefCell<HashMap<WrapKey, ViewRef>>,
}

impl VisibilityComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose(&self, views: &[ViewRef]) -> ViewRef {
        let mut cache = self.cache.borrow_mut();
        let mut next = HashMap::with_capacity(views.len());
        let last = views.len().saturating_sub(1);
        let children = views
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let display = if index == last {
                    Display::Shown
                } else {
                    Display::Hidden
                };
                let key = (Rc::as_ptr(child) as usize, index, display);
                let wrapped = cache
                    .remove(&key)
                    .unwrap_or_else(|| View::slot(format!("c{index}"), display, Rc::clone(child)));
                next.insert(key, Rc::clone(&wrapped));
                wrapped
            })
            .collect();
        // Wrappers not used by this snapshot are dropped.
        *cache = next;
        View::container(children)
    }

    /// Composed view for every snapshot emitted by `views`.
    pub fn attach(self: &Rc<Self>, views: &Stream<Vec<ViewRef>>) -> Stream<ViewRef> {
        let composer = Rc::clone(self);
        views.map(move |snapshot| composer.compose(snapshot))
    }

    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}
