//! Description trees carried on the visual channel.
//!
//! Values are shared behind [`ViewRef`] so unchanged subtrees can be
//! recognised by pointer identity when the stack is recomposed.

use std::rc::Rc;

pub type ViewRef = Rc<View>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Display {
    Shown,
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Text(String),
    Container(Vec<ViewRef>),
    Slot {
        key: String,
        display: Display,
        child: ViewRef,
    },
}

impl View {
    pub fn text(content: impl Into<String>) -> ViewRef {
        Rc::new(View::Text(content.into()))
    }

    pub fn container(children: Vec<ViewRef>) -> ViewRef {
        Rc::new(View::Container(children))
    }

    pub fn empty() -> ViewRef {
        Self::container(Vec::new())
    }

    pub fn slot(key: impl Into<String>, display: Display, child: ViewRef) -> ViewRef {
        Rc::new(View::Slot {
            key: key.into(),
            display,
            child,
        })
    }

    /// Text lines of everything that is visible; hidden slots contribute nothing.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_lines(&mut out);
        out
    }

    fn collect_lines(&self, out: &mut Vec<String>) {
        match self {
            View::Text(content) => out.extend(content.split('\n').map(str::to_string)),
            View::Container(children) => {
                for child in children {
                    child.collect_lines(out);
                }
            }
            View::Slot {
                display: Display::Shown,
                child,
                ..
            } => child.collect_lines(out),
            View::Slot { .. } => {}
        }
    }

    /// Slots reachable from this node, in document order.
    pub fn slots(&self) -> Vec<(&str, Display)> {
        let mut out = Vec::new();
        self.collect_slots(&mut out);
        out
    }

    fn collect_slots<'a>(&'a self, out: &mut Vec<(&'a str, Display)>) {
        match self {
            View::Text(_) => {}
            View::Container(children) => {
                for child in children {
                    child.collect_slots(out);
                }
            }
            View::Slot {
                key,
                display,
                child,
            } => {
                out.push((key.as_str(), *display));
                child.collect_slots(out);
            }
        }
    }
}
