use std::cell::RefCell;
use std::rc::Rc;

use super::{NavError, Result};

type HaltHook = Box<dyn FnOnce()>;

#[derive(Default)]
struct HaltState {
    halted: bool,
    error: Option<NavError>,
    hooks: Vec<HaltHook>,
}

/// Latch shared by the runtime stages. The first fatal error raised inside
/// stream delivery stops all further navigation; the host observes it
/// through [`Halt::check`].
#[derive(Clone, Default)]
pub struct Halt {
    inner: Rc<RefCell<HaltState>>,
}

impl Halt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch `error` and run every registered hook once.
    pub fn raise(&self, error: NavError) {
        let hooks = {
            let mut state = self.inner.borrow_mut();
            if state.halted {
                return;
            }
            state.halted = true;
            state.error = Some(error);
            std::mem::take(&mut state.hooks)
        };
        // Hooks may query the latch.
        for hook in hooks {
            hook();
        }
    }

    /// Run `hook` when the latch trips, or right away if it already has.
    pub fn on_halt(&self, hook: impl FnOnce() + 'static) {
        if self.is_halted() {
            hook();
            return;
        }
        self.inner.borrow_mut().hooks.push(Box::new(hook));
    }

    /// Forget pending hooks without running them.
    pub fn clear_hooks(&self) {
        let hooks = std::mem::take(&mut self.inner.borrow_mut().hooks);
        drop(hooks);
    }

    pub fn is_halted(&self) -> bool {
        self.inner.borrow().halted
    }

    /// The recorded error on the first call after halting, `Halted` afterwards.
    pub fn check(&self) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if !state.halted {
            return Ok(());
        }
        Err(state.error.take().unwrap_or(NavError::Halted))
    }
}
