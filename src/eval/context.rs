//! Execution context: everything one run mutates.

use super::classes::{ClassDef, ClassInstance};
use super::procedures::Procedure;
use super::EvalError;
use crate::ast::CompareMode;
use crate::extension::ObjectRef;
use crate::objects::response::ResponseState;
use crate::value::Value;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub constant: bool,
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Variable {
            value,
            constant: false,
        }
    }

    pub fn constant(value: Value) -> Self {
        Variable {
            value,
            constant: true,
        }
    }
}

/// Variables of one scope, keyed by lower-cased name.
pub(crate) type Scope = HashMap<String, Variable>;

/// One activation: the global script body or a procedure call.
#[derive(Default)]
pub(crate) struct Frame {
    pub(crate) locals: Scope,
    /// Instance whose method is running (`Me`)
    pub(crate) this: Option<Rc<RefCell<ClassInstance>>>,
    /// `On Error Resume Next` is in effect for this frame
    pub(crate) resume_next: bool,
    /// Lower-cased name of the Function or Property Get whose return
    /// value lives in `locals`
    pub(crate) result_name: Option<String>,
}

/// Where a name resolved to.
#[derive(Clone)]
pub(crate) enum Slot {
    Local,
    Field(Rc<RefCell<ClassInstance>>),
    Global,
}

/// Run deadline. `Server.ScriptTimeout` moves it while the run is going.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Option<Duration>,
}

impl Deadline {
    pub fn new(timeout: Option<Duration>) -> Self {
        Deadline {
            started: Instant::now(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Deadline { timeout, ..self }
    }

    pub fn restarted(self) -> Self {
        Deadline::new(self.timeout)
    }

    pub fn expired(&self) -> bool {
        match self.timeout {
            Some(t) => self.started.elapsed() >= t,
            None => false,
        }
    }
}

/// State behind the `Err` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrState {
    pub number: i64,
    pub source: String,
    pub description: String,
    /// Line of the statement that failed
    pub line: usize,
}

impl ErrState {
    pub fn clear(&mut self) {
        *self = ErrState::default();
    }

    pub fn capture(&mut self, error: &EvalError, line: usize) {
        self.number = error.number();
        self.source = error.source_name();
        self.description = error.description();
        self.line = line;
    }

    pub fn is_set(&self) -> bool {
        self.number != 0
    }
}

pub struct ExecutionContext {
    /// Script-level frame; never popped
    pub(crate) global: Frame,
    /// Active procedure calls, innermost last
    pub(crate) calls: Vec<Frame>,
    pub(crate) procedures: HashMap<String, Rc<Procedure>>,
    pub(crate) classes: HashMap<String, Rc<ClassDef>>,
    /// Targets of the enclosing With blocks, innermost last
    pub(crate) with_stack: Vec<Value>,
    /// Response, Request, Server, Session, Application, Err
    pub(crate) intrinsics: HashMap<String, ObjectRef>,
    pub(crate) response: Rc<RefCell<ResponseState>>,
    pub(crate) err: Rc<RefCell<ErrState>>,
    pub(crate) deadline: Rc<Cell<Deadline>>,
    pub(crate) option_explicit: bool,
    pub(crate) compare_mode: CompareMode,
    pub(crate) current_line: usize,
    pub(crate) rng: StdRng,
    /// Last `Rnd` result, returned again by `Rnd(0)`
    pub(crate) last_rnd: f64,
}

impl ExecutionContext {
    pub fn new(timeout: Option<Duration>) -> Self {
        ExecutionContext {
            global: Frame::default(),
            calls: Vec::new(),
            procedures: HashMap::new(),
            classes: HashMap::new(),
            with_stack: Vec::new(),
            intrinsics: HashMap::new(),
            response: Rc::new(RefCell::new(ResponseState::default())),
            err: Rc::new(RefCell::new(ErrState::default())),
            deadline: Rc::new(Cell::new(Deadline::new(timeout))),
            option_explicit: false,
            compare_mode: CompareMode::Binary,
            current_line: 0,
            rng: StdRng::from_entropy(),
            last_rnd: 0.0,
        }
    }

    pub(crate) fn set_timeout(&self, timeout: Option<Duration>) {
        let deadline = self.deadline.get();
        self.deadline.set(deadline.with_timeout(timeout));
    }

    pub(crate) fn restart_clock(&self) {
        let deadline = self.deadline.get();
        self.deadline.set(deadline.restarted());
    }

    pub(crate) fn frame(&self) -> &Frame {
        self.calls.last().unwrap_or(&self.global)
    }

    pub(crate) fn frame_mut(&mut self) -> &mut Frame {
        match self.calls.last_mut() {
            Some(frame) => frame,
            None => &mut self.global,
        }
    }

    pub(crate) fn this(&self) -> Option<Rc<RefCell<ClassInstance>>> {
        self.frame().this.clone()
    }

    pub(crate) fn resume_next(&self) -> bool {
        self.frame().resume_next
    }

    pub(crate) fn set_resume_next(&mut self, on: bool) {
        self.frame_mut().resume_next = on;
        self.err.borrow_mut().clear();
    }

    pub(crate) fn capture_error(&self, error: &EvalError) {
        tracing::trace!(line = self.current_line, error = %error, "error resumed");
        self.err.borrow_mut().capture(error, self.current_line);
    }

    /// Resolve a lower-cased name: locals, then fields of `Me`, then globals.
    pub(crate) fn resolve(&self, key: &str) -> Option<Slot> {
        self.resolve_local(key).or_else(|| self.resolve_global(key))
    }

    /// A local of the running procedure or a field of its instance.
    pub(crate) fn resolve_local(&self, key: &str) -> Option<Slot> {
        if let Some(frame) = self.calls.last() {
            if frame.locals.contains_key(key) {
                return Some(Slot::Local);
            }
            if let Some(this) = &frame.this {
                let has_field = this
                    .try_borrow()
                    .map(|inst| inst.fields.contains_key(key))
                    .unwrap_or(false);
                if has_field {
                    return Some(Slot::Field(Rc::clone(this)));
                }
            }
        }
        None
    }

    pub(crate) fn resolve_global(&self, key: &str) -> Option<Slot> {
        self.global.locals.contains_key(key).then_some(Slot::Global)
    }

    pub(crate) fn read(&self, slot: &Slot, key: &str) -> Option<Value> {
        match slot {
            Slot::Local => self.frame().locals.get(key).map(|v| v.value.clone()),
            Slot::Global => self.global.locals.get(key).map(|v| v.value.clone()),
            Slot::Field(inst) => inst
                .try_borrow()
                .ok()
                .and_then(|i| i.fields.get(key).map(|v| v.value.clone())),
        }
    }

    /// Run `f` on the variable a slot names.
    pub(crate) fn with_variable<R>(
        &mut self,
        slot: &Slot,
        key: &str,
        f: impl FnOnce(&mut Variable) -> R,
    ) -> Option<R> {
        match slot {
            Slot::Local => self.frame_mut().locals.get_mut(key).map(f),
            Slot::Global => self.global.locals.get_mut(key).map(f),
            Slot::Field(inst) => {
                let mut inst = inst.try_borrow_mut().ok()?;
                inst.fields.get_mut(key).map(f)
            }
        }
    }

    pub(crate) fn global(&self, key: &str) -> Option<Value> {
        self.global.locals.get(key).map(|v| v.value.clone())
    }

    /// Declare in the innermost frame.
    pub(crate) fn declare(&mut self, key: String, variable: Variable) {
        self.frame_mut().locals.insert(key, variable);
    }
}
