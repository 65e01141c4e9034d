//! Execution engine.
//!
//! The engine walks a parsed `Program` against one `ExecutionContext`:
//! - statements run through the `StatementVisitor` impl and report a `Flow`
//!   (normal completion, loop exit, procedure return)
//! - expressions run through the `ExpressionVisitor` impl and produce a `Value`
//! - runtime faults travel as `Err(EvalError)`; `On Error Resume Next`
//!   catches trappable ones at statement granularity and records them in `Err`
//!
//! A run moves `Ready → Running → {Completed | Faulted | TimedOut}`. The
//! deadline and the cancel flag are checked between statements only, so a
//! slow native call can overrun the timeout.
//!
//! The implementation is split across submodules, each adding `impl Engine`
//! blocks:
//! - `context`: scopes, frames, the Err state and the deadline
//! - `statements`: the statement visitor
//! - `expressions`: the expression visitor, member access and calls
//! - `procedures`: hoisting and user procedure invocation
//! - `classes`: class definitions, instances and member dispatch
//! - `builtins`: built-in functions and constants

mod builtins;
pub mod classes;
mod context;
mod expressions;
mod procedures;
mod statements;
#[cfg(test)]
mod tests;

pub use context::{Deadline, ErrState, ExecutionContext};
pub use procedures::Procedure;

use crate::ast::Program;
use crate::extension::ObjectRef;
use crate::objects::err::ErrObject;
use crate::objects::response::{ResponseObject, ResponseState};
use crate::objects::server::ServerObject;
use crate::objects::ObjectRegistry;
use crate::syntax_error::SyntaxError;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Invalid procedure call or argument: {0}")]
    InvalidProcedureCall(String),
    #[error("Overflow: {0}")]
    Overflow(String),
    #[error("Subscript out of range")]
    SubscriptOutOfRange,
    #[error("This array is fixed or temporarily locked")]
    ArrayLocked,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Out of stack space")]
    OutOfStackSpace,
    #[error("Object variable not set")]
    ObjectNotSet,
    #[error("Invalid use of Null")]
    InvalidUseOfNull,
    #[error("Object required: '{0}'")]
    ObjectRequired(String),
    #[error("ActiveX component can't create object: '{0}'")]
    CannotCreateObject(String),
    #[error("Object doesn't support this property or method: '{0}'")]
    NotSupported(String),
    #[error("Wrong number of arguments or invalid property assignment: '{0}'")]
    WrongArgumentCount(String),
    #[error("Variable is undefined: '{0}'")]
    VariableUndefined(String),
    #[error("Illegal assignment: '{0}'")]
    IllegalAssignment(String),
    #[error("Class not defined: '{0}'")]
    ClassNotDefined(String),
    #[error("Name redefined: '{0}'")]
    NameRedefined(String),
    #[error("{description}")]
    Raised {
        number: i64,
        origin: String,
        description: String,
    },
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Script timed out")]
    Timeout,
    #[error("Interrupted")]
    Interrupted,
    /// Internal: signals `Response.End` (not a real error)
    #[error("")]
    ResponseEnd,
}

impl EvalError {
    /// The runtime error number scripts see in `Err.Number`.
    pub fn number(&self) -> i64 {
        match self {
            EvalError::InvalidProcedureCall(_) => 5,
            EvalError::Overflow(_) => 6,
            EvalError::SubscriptOutOfRange => 9,
            EvalError::ArrayLocked => 10,
            EvalError::DivisionByZero => 11,
            EvalError::TypeMismatch(_) => 13,
            EvalError::OutOfMemory => 7,
            EvalError::OutOfStackSpace => 28,
            EvalError::ObjectNotSet => 91,
            EvalError::InvalidUseOfNull => 94,
            EvalError::ObjectRequired(_) => 424,
            EvalError::CannotCreateObject(_) => 429,
            EvalError::NotSupported(_) => 438,
            EvalError::WrongArgumentCount(_) => 450,
            EvalError::VariableUndefined(_) => 500,
            EvalError::IllegalAssignment(_) => 501,
            EvalError::ClassNotDefined(_) => 506,
            EvalError::NameRedefined(_) => 1041,
            EvalError::Raised { number, .. } => *number,
            EvalError::Syntax(e) => e.code.number() as i64,
            EvalError::Io(_) => 75,
            EvalError::Timeout => -2147467259,
            EvalError::Interrupted | EvalError::ResponseEnd => 0,
        }
    }

    /// Whether `On Error Resume Next` may swallow this error.
    pub fn is_trappable(&self) -> bool {
        !matches!(
            self,
            EvalError::Timeout | EvalError::Interrupted | EvalError::ResponseEnd
        )
    }

    /// `Err.Source` for this error.
    pub fn source_name(&self) -> String {
        match self {
            EvalError::Raised { origin, .. } => origin.clone(),
            EvalError::Syntax(_) => "Microsoft VBScript compilation error".to_string(),
            _ => "Microsoft VBScript runtime error".to_string(),
        }
    }

    /// `Err.Description` for this error.
    pub fn description(&self) -> String {
        self.to_string()
    }
}

/// What a top-level run can fail with.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("Runtime error {number} at line {line}: {error}")]
    Runtime {
        number: i64,
        line: usize,
        error: EvalError,
    },
}

/// Run state of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Completed,
    Faulted,
    TimedOut,
}

/// Outcome of a statement: how control leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal,
    ExitDo,
    ExitFor,
    ExitProcedure,
}

/// Stack reserved for threads started by [`with_script_stack`].
pub const SCRIPT_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Native stack a run may use on an ordinary thread before procedure calls
/// fail with "Out of stack space". Fits the 2 MiB default of spawned threads.
pub const DEFAULT_STACK_BUDGET: usize = 1024 * 1024;

/// Kept free below the budget on script threads.
const STACK_HEADROOM: usize = 1024 * 1024;

thread_local! {
    static SCRIPT_THREAD_BUDGET: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Run `f` on a thread with a [`SCRIPT_STACK_SIZE`] stack. Engines created
/// there get a matching stack budget, so scripts can recurse deeply. Runs
/// `f` inline when already on such a thread.
pub fn with_script_stack<T, F>(f: F) -> std::io::Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    if SCRIPT_THREAD_BUDGET.with(Cell::get).is_some() {
        return Ok(f());
    }
    std::thread::scope(|scope| {
        let handle = std::thread::Builder::new()
            .name("aspvbs-script".to_string())
            .stack_size(SCRIPT_STACK_SIZE)
            .spawn_scoped(scope, move || {
                SCRIPT_THREAD_BUDGET.with(|b| b.set(Some(SCRIPT_STACK_SIZE - STACK_HEADROOM)));
                f()
            })?;
        Ok(handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
    })
}

/// Approximate address of the current stack top.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

/// The interpreter: one context, one run state.
pub struct Engine {
    /// Scopes, symbols, intrinsics and error state
    pub(crate) ctx: ExecutionContext,
    /// Current run state
    pub(crate) state: RunState,
    /// Maximum procedure nesting (default 1000, configurable via ASPVBS_MAX_RECURSION)
    pub(crate) max_call_depth: usize,
    /// Set from another thread (Ctrl-C) to stop between statements
    pub(crate) cancel: Option<Arc<AtomicBool>>,
    /// Stack position when the outermost run started
    stack_base: Option<usize>,
    /// Native stack bytes procedure calls may use below `stack_base`
    stack_budget: usize,
    /// Factories behind `CreateObject`
    pub(crate) registry: Rc<ObjectRegistry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_registry(Rc::new(ObjectRegistry::with_defaults()))
    }

    /// Engine whose `CreateObject` uses the given registry.
    pub fn with_registry(registry: Rc<ObjectRegistry>) -> Self {
        let max_call_depth = std::env::var("ASPVBS_MAX_RECURSION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let timeout = std::env::var("ASPVBS_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let ctx = ExecutionContext::new(timeout);
        let mut engine = Engine {
            ctx,
            state: RunState::Ready,
            max_call_depth,
            cancel: None,
            stack_base: None,
            stack_budget: SCRIPT_THREAD_BUDGET.with(Cell::get).unwrap_or(DEFAULT_STACK_BUDGET),
            registry,
        };
        engine.install_default_intrinsics();
        engine
    }

    fn install_default_intrinsics(&mut self) {
        let response = ResponseObject::new(Rc::clone(&self.ctx.response));
        self.register_intrinsic("Response", ObjectRef::native(response));
        let err = ErrObject::new(Rc::clone(&self.ctx.err));
        self.register_intrinsic("Err", ObjectRef::native(err));
        let cwd = std::env::current_dir().unwrap_or_default();
        self.set_web_root(cwd.clone(), cwd);
    }

    /// Install a `Server` object whose `MapPath` resolves `/x` below `root`
    /// and relative paths below `page_dir`.
    pub fn set_web_root(&mut self, root: PathBuf, page_dir: PathBuf) {
        let server = ServerObject::new(
            Rc::clone(&self.registry),
            Rc::clone(&self.ctx.deadline),
            Rc::clone(&self.ctx.err),
            root,
        )
        .with_page_dir(page_dir);
        self.register_intrinsic("Server", ObjectRef::native(server));
    }

    /// Expose an object to scripts under a global name (`Request`, `Session`, ...).
    /// Replaces any earlier object of the same name.
    pub fn register_intrinsic(&mut self, name: &str, object: ObjectRef) {
        self.ctx.intrinsics.insert(name.to_ascii_lowercase(), object);
    }

    pub fn registry(&self) -> Rc<ObjectRegistry> {
        Rc::clone(&self.registry)
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.ctx.set_timeout(timeout);
    }

    /// Restart the deadline clock, e.g. before each REPL line.
    pub fn restart_clock(&mut self) {
        self.ctx.restart_clock();
        if self.state == RunState::TimedOut {
            self.state = RunState::Ready;
        }
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Native stack bytes a run may use for nested procedure calls.
    pub fn set_stack_budget(&mut self, bytes: usize) {
        self.stack_budget = bytes;
    }

    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Response state shared with the `Response` object.
    pub fn response(&self) -> Rc<RefCell<ResponseState>> {
        Rc::clone(&self.ctx.response)
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        self.ctx.response.borrow().body.clone()
    }

    /// Drain the output buffer.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.ctx.response.borrow_mut().body)
    }

    /// Source line of the statement that ran (or failed) last.
    pub fn current_line(&self) -> usize {
        self.ctx.current_line
    }

    /// Read a global variable (names are case-insensitive).
    pub fn global(&self, name: &str) -> Option<crate::value::Value> {
        self.ctx.global(&name.to_ascii_lowercase())
    }

    /// Execute a parsed program.
    ///
    /// Declarations are hoisted first, then the body runs. `Response.End`
    /// completes the run normally. A timeout keeps whatever was written.
    pub fn run(&mut self, program: &Program) -> Result<(), EvalError> {
        if self.state == RunState::TimedOut {
            return Err(EvalError::Timeout);
        }
        self.state = RunState::Running;
        self.ctx.option_explicit |= program.option_explicit;
        self.ctx.compare_mode = program.compare_mode;

        let result = self.with_stack_base(|engine| {
            engine
                .hoist_global(&program.body)
                .and_then(|_| engine.exec_block(&program.body))
        });

        let outcome = match result {
            Ok(_) | Err(EvalError::ResponseEnd) => Ok(()),
            Err(e) => Err(e),
        };
        self.state = match &outcome {
            Ok(()) => RunState::Completed,
            Err(EvalError::Timeout) => RunState::TimedOut,
            Err(_) => RunState::Faulted,
        };
        match &outcome {
            Ok(()) => tracing::debug!(state = ?self.state, "run finished"),
            Err(e) => tracing::debug!(
                state = ?self.state,
                line = self.ctx.current_line,
                error = %e,
                "run stopped"
            ),
        }
        outcome
    }

    /// Parse and run source text.
    pub fn run_source(&mut self, source: &str) -> Result<(), ScriptError> {
        let program = crate::parser::parse(source)?;
        self.run(&program).map_err(|error| ScriptError::Runtime {
            number: error.number(),
            line: self.ctx.current_line,
            error,
        })
    }

    /// Call a global Sub or Function by name, if one is defined. Returns
    /// `Ok(None)` when there is no such procedure.
    pub fn call_hook(&mut self, name: &str) -> Result<Option<crate::value::Value>, EvalError> {
        let key = name.to_ascii_lowercase();
        let Some(procedure) = self.ctx.procedures.get(&key).cloned() else {
            return Ok(None);
        };
        self.state = RunState::Running;
        let result = self.with_stack_base(|engine| engine.invoke_procedure(&procedure, None, Vec::new()));
        self.state = match &result {
            Ok(_) | Err(EvalError::ResponseEnd) => RunState::Completed,
            Err(EvalError::Timeout) => RunState::TimedOut,
            Err(_) => RunState::Faulted,
        };
        match result {
            Ok((value, _)) => Ok(Some(value)),
            Err(EvalError::ResponseEnd) => Ok(Some(crate::value::Value::Empty)),
            Err(e) => Err(e),
        }
    }

    /// Measure stack use from here while `f` runs, unless an outer run
    /// already does.
    fn with_stack_base<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        if self.stack_base.is_some() {
            return f(self);
        }
        self.stack_base = Some(stack_position());
        let result = f(self);
        self.stack_base = None;
        result
    }

    /// True once nested calls have used up the stack budget.
    pub(crate) fn stack_exhausted(&self) -> bool {
        self.stack_base
            .is_some_and(|base| base.abs_diff(stack_position()) > self.stack_budget)
    }

    /// Stop conditions checked before every statement.
    pub(crate) fn check_limits(&self) -> Result<(), EvalError> {
        if self.ctx.deadline.get().expired() {
            return Err(EvalError::Timeout);
        }
        if let Some(flag) = &self.cancel {
            if flag.swap(false, Ordering::SeqCst) {
                return Err(EvalError::Interrupted);
            }
        }
        Ok(())
    }
}
