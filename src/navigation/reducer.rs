use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{Halt, NavError, Result};
use crate::layout::{Layout, ScreenDescriptor, Stack, describe};
use crate::logging::{LogLevel, json_kv, json_str};
use crate::runtime::audit::RuntimeAuditStage;
use crate::stream::Stream;
use crate::telemetry::{REDUCER_TARGET, Telemetry};

use super::{Command, NavSourceRegistry};

/// Stack holding a fresh instance of the layout's root component.
pub fn initial_stack(layout: &Layout) -> Result<Stack> {
    Ok(vec![layout.resolve_root()?.instantiate()])
}

/// Apply one command. `Ok(None)` means the stack is unchanged.
pub fn reduce(stack: &[ScreenDescriptor], command: &Command) -> Result<Option<Stack>> {
    match command {
        Command::Push { layout } => {
            let component = layout
                .component
                .as_ref()
                .ok_or_else(|| NavError::ComponentNotFound(describe(layout)))?;
            let mut next = stack.to_vec();
            next.push(component.instantiate());
            Ok(Some(next))
        }
        Command::SetStackRoot { layout } => initial_stack(layout).map(Some),
        Command::Pop if stack.len() > 1 => Ok(Some(stack[..stack.len() - 1].to_vec())),
        Command::PopToRoot if stack.len() > 1 => Ok(Some(stack[..1].to_vec())),
        Command::Pop | Command::PopToRoot | Command::Unknown(_) => Ok(None),
    }
}

/// Owns the navigation stack and folds commands into it one at a time.
///
/// Commands dispatched while a new stack is being delivered (or before
/// [`StackReducer::start`]) are queued and applied in arrival order once the
/// current delivery returns.
pub struct StackReducer {
    stack: Stream<Stack>,
    current: RefCell<Stack>,
    queue: RefCell<VecDeque<Command>>,
    draining: Cell<bool>,
    started: Cell<bool>,
    registry: NavSourceRegistry,
    halt: Halt,
    telemetry: Telemetry,
}

impl StackReducer {
    pub fn new(
        layout: &Layout,
        registry: NavSourceRegistry,
        halt: Halt,
        telemetry: Telemetry,
    ) -> Result<Rc<Self>> {
        let initial = match initial_stack(layout) {
            Ok(stack) => stack,
            Err(err) => {
                telemetry.log(
                    LogLevel::Error,
                    REDUCER_TARGET,
                    "invalid_initial_layout",
                    [json_str("error", err.to_string())],
                );
                telemetry.audit(
                    RuntimeAuditStage::FatalError,
                    [json_str("error", err.to_string())],
                );
                return Err(err);
            }
        };

        Ok(Rc::new(Self {
            stack: Stream::remembering(),
            current: RefCell::new(initial),
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            started: Cell::new(false),
            registry,
            halt,
            telemetry,
        }))
    }

    /// Remembering stream of every published stack.
    pub fn stack(&self) -> Stream<Stack> {
        self.stack.clone()
    }

    pub fn current(&self) -> Stack {
        self.current.borrow().clone()
    }

    /// Publish the initial stack, then apply anything queued meanwhile.
    pub fn start(&self) {
        if self.started.replace(true) {
            return;
        }
        self.draining.set(true);
        let initial = self.current();
        self.telemetry.log(
            LogLevel::Info,
            REDUCER_TARGET,
            "initial_stack",
            [
                json_str("root", initial.first().map_or("", |entry| entry.id.as_str())),
                json_kv("depth", initial.len()),
            ],
        );
        self.publish(initial);
        self.drain_queue();
        self.draining.set(false);
    }

    pub fn dispatch(&self, command: Command) {
        if self.halt.is_halted() {
            return;
        }
        self.queue.borrow_mut().push_back(command);
        if !self.started.get() || self.draining.get() {
            return;
        }
        self.draining.set(true);
        self.drain_queue();
        self.draining.set(false);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    fn drain_queue(&self) {
        loop {
            if self.halt.is_halted() {
                self.queue.borrow_mut().clear();
                return;
            }
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(command) => self.apply(command),
                None => return,
            }
        }
    }

    fn apply(&self, command: Command) {
        self.telemetry.record(|metrics| metrics.record_command());
        let outcome = {
            let current = self.current.borrow();
            reduce(&current, &command)
        };

        match outcome {
            Ok(Some(next)) => {
                self.telemetry.record(|metrics| match command {
                    Command::Push { .. } => metrics.record_push(),
                    Command::Pop | Command::PopToRoot => metrics.record_pop(),
                    Command::SetStackRoot { .. } => metrics.record_root_reset(),
                    Command::Unknown(_) => {}
                });
                let top = next.last().map(|entry| entry.id.clone()).unwrap_or_default();
                self.telemetry.log(
                    LogLevel::Debug,
                    REDUCER_TARGET,
                    "stack_reduced",
                    [
                        json_str("command", command.kind()),
                        json_kv("depth", next.len()),
                        json_str("top", top.clone()),
                    ],
                );
                self.telemetry.audit(
                    RuntimeAuditStage::StackReduced,
                    [
                        json_str("command", command.kind()),
                        json_kv("depth", next.len()),
                        json_str("top", top),
                    ],
                );
                let previous = std::mem::replace(&mut *self.current.borrow_mut(), next.clone());
                self.publish(next);
                // A stage failed while applying the stack: keep the last one
                // that was fully delivered.
                if self.halt.is_halted() {
                    self.registry.update_is_tops(&previous);
                    *self.current.borrow_mut() = previous;
                }
            }
            Ok(None) => {
                self.telemetry.record(|metrics| metrics.record_ignored());
                match &command {
                    Command::Unknown(request) => self.telemetry.log(
                        LogLevel::Warn,
                        REDUCER_TARGET,
                        "unknown_command",
                        [
                            json_str("command", command.kind()),
                            json_kv("request", request.clone()),
                        ],
                    ),
                    _ => self.telemetry.log(
                        LogLevel::Debug,
                        REDUCER_TARGET,
                        "command_ignored",
                        [json_str("command", command.kind())],
                    ),
                }
                self.telemetry.audit(
                    RuntimeAuditStage::CommandIgnored,
                    [json_str("command", command.kind())],
                );
            }
            Err(err) => {
                self.telemetry.log(
                    LogLevel::Error,
                    REDUCER_TARGET,
                    "invalid_command",
                    [
                        json_str("command", command.kind()),
                        json_str("error", err.to_string()),
                    ],
                );
                self.telemetry.audit(
                    RuntimeAuditStage::FatalError,
                    [json_str("error", err.to_string())],
                );
                self.halt.raise(err);
            }
        }
    }

    fn publish(&self, stack: Stack) {
        self.registry.update_is_tops(&stack);
        self.stack.emit(stack);
    }
}
