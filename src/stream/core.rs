use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

type Listener<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    next_id: Cell<u64>,
    memory: Option<RefCell<Option<T>>>,
    upstream: RefCell<Vec<Subscription>>,
}

/// Hot multicast stream.
///
/// Cloning yields another handle to the same stream. A remembering stream
/// stores its latest value and replays it to every new subscriber.
pub struct Stream<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("remembering", &self.inner.memory.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Stream<T> {
    fn with_memory(remember: bool) -> Self {
        Self {
            inner: Rc::new(Inner {
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                memory: remember.then(|| RefCell::new(None)),
                upstream: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Plain subject: values emitted before a listener subscribes are not seen by it.
    pub fn new() -> Self {
        Self::with_memory(false)
    }

    pub fn remembering() -> Self {
        Self::with_memory(true)
    }

    /// Remembering stream that holds `value` for as long as it lives.
    pub fn of(value: T) -> Self {
        let stream = Self::remembering();
        stream.emit(value);
        stream
    }

    pub fn never() -> Self {
        Self::new()
    }

    pub fn is_remembering(&self) -> bool {
        self.inner.memory.is_some()
    }

    pub fn latest(&self) -> Option<T> {
        self.inner
            .memory
            .as_ref()
            .and_then(|memory| memory.borrow().clone())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn ptr_eq(&self, other: &Stream<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn emit(&self, value: T) {
        if let Some(memory) = &self.inner.memory {
            *memory.borrow_mut() = Some(value.clone());
        }
        // Listeners may (un)subscribe while being notified.
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&value);
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let listener: Listener<T> = Rc::new(listener);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::clone(&listener)));

        if let Some(value) = self.latest() {
            listener(&value);
        }

        let source = Rc::clone(&self.inner);
        Subscription::new(move || {
            source
                .listeners
                .borrow_mut()
                .retain(|(listener_id, _)| *listener_id != id);
        })
    }

    /// Feed every value of `self` through `step` into `out`, tying the
    /// subscription to the lifetime of `out`.
    fn attach<U: Clone + 'static>(&self, out: &Stream<U>, step: impl Fn(&Stream<U>, &T) + 'static) {
        let weak = Rc::downgrade(&out.inner);
        let subscription = self.subscribe(move |value| {
            if let Some(inner) = weak.upgrade() {
                step(&Stream { inner }, value);
            }
        });
        out.inner.upstream.borrow_mut().push(subscription);
    }

    fn derive<U: Clone + 'static>(&self, step: impl Fn(&Stream<U>, &T) + 'static) -> Stream<U> {
        let out = Stream::with_memory(self.is_remembering());
        self.attach(&out, step);
        out
    }

    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Stream<U> {
        self.derive(move |out, value| out.emit(f(value)))
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        self.derive(move |out, value| {
            if predicate(value) {
                out.emit(value.clone());
            }
        })
    }

    pub fn filter_map<U: Clone + 'static>(&self, f: impl Fn(&T) -> Option<U> + 'static) -> Stream<U> {
        self.derive(move |out, value| {
            if let Some(mapped) = f(value) {
                out.emit(mapped);
            }
        })
    }

    /// Suppress values equal to the previously forwarded one.
    pub fn drop_repeats(&self) -> Stream<T>
    where
        T: PartialEq,
    {
        let last: RefCell<Option<T>> = RefCell::new(None);
        self.derive(move |out, value| {
            if last.borrow().as_ref() == Some(value) {
                return;
            }
            *last.borrow_mut() = Some(value.clone());
            out.emit(value.clone());
        })
    }

    /// Remembering stream that starts with `initial` and then follows `self`.
    pub fn start_with(&self, initial: T) -> Stream<T> {
        let out = Stream::of(initial);
        self.attach(&out, |out, value| out.emit(value.clone()));
        out
    }

    /// Forward every value from every input, in emission order.
    pub fn merge(streams: impl IntoIterator<Item = Stream<T>>) -> Stream<T> {
        let out = Stream::new();
        for stream in streams {
            stream.attach(&out, |out, value| out.emit(value.clone()));
        }
        out
    }

    /// Close a loop: `self` starts forwarding everything `source` emits.
    pub fn imitate(&self, source: &Stream<T>) {
        source.attach(self, |out, value| out.emit(value.clone()));
    }

    /// Drop every upstream subscription held by this stream.
    pub fn release_upstream(&self) {
        let released = std::mem::take(&mut *self.inner.upstream.borrow_mut());
        drop(released);
    }
}

/// Latest value of both inputs, emitted once each side has produced one.
pub fn combine<A, B>(a: &Stream<A>, b: &Stream<B>) -> Stream<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    let out = Stream::remembering();
    let latest: Rc<RefCell<(Option<A>, Option<B>)>> = Rc::new(RefCell::new((None, None)));

    fn ready<A: Clone, B: Clone>(latest: &RefCell<(Option<A>, Option<B>)>) -> Option<(A, B)> {
        match &*latest.borrow() {
            (Some(a), Some(b)) => Some((a.clone(), b.clone())),
            _ => None,
        }
    }

    let left = Rc::clone(&latest);
    a.attach(&out, move |out, value| {
        left.borrow_mut().0 = Some(value.clone());
        if let Some(pair) = ready(&left) {
            out.emit(pair);
        }
    });
    let right = latest;
    b.attach(&out, move |out, value| {
        right.borrow_mut().1 = Some(value.clone());
        if let Some(pair) = ready(&right) {
            out.emit(pair);
        }
    });
    out
}

/// Handle for a listener. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes its listener"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
