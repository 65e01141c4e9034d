//! Declarations and user procedure calls.
//!
//! Before a body runs, its `Dim`/`Const` declarations and every Sub,
//! Function and Class it contains are hoisted, so code may use a name
//! declared further down. Block bodies are searched too; procedure and
//! class bodies are not (they hoist when they run).

use super::classes::ClassInstance;
use super::context::{Frame, Variable};
use super::{Engine, EvalError};
use crate::ast::{
    Expression, ExpressionKind, Parameter, PassingMode, ProcedureDeclaration, Statement,
    StatementKind, VariableDeclaration,
};
use crate::value::{Value, VbArray};
use crate::visitor::ExpressionVisitor;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
}

impl ProcedureKind {
    fn returns_value(self) -> bool {
        matches!(self, ProcedureKind::Function | ProcedureKind::PropertyGet)
    }
}

/// A callable body: global Sub/Function or class member.
#[derive(Debug)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
}

impl Procedure {
    pub(crate) fn from_declaration(decl: &ProcedureDeclaration, kind: ProcedureKind) -> Self {
        Procedure {
            name: decl.name.clone(),
            kind,
            parameters: decl.parameters.clone(),
            body: decl.body.clone(),
        }
    }
}

/// Initial value of a declared variable.
pub(crate) fn initial_value(var: &VariableDeclaration) -> Result<Value, EvalError> {
    if var.dynamic_array {
        Ok(Value::Array(VbArray::unallocated()))
    } else if var.dims.is_empty() {
        Ok(Value::Empty)
    } else {
        let mut array = VbArray::new(var.dims.clone())?;
        array.fixed = true;
        Ok(Value::Array(array))
    }
}

impl Engine {
    /// Hoist a script body into the global frame.
    pub(crate) fn hoist_global(&mut self, body: &[Statement]) -> Result<(), EvalError> {
        let mut seen = HashSet::new();
        self.hoist(body, &mut seen)
    }

    /// Hoist into the innermost frame; procedures and classes always go
    /// to the global tables.
    pub(crate) fn hoist(
        &mut self,
        body: &[Statement],
        seen: &mut HashSet<String>,
    ) -> Result<(), EvalError> {
        for stmt in body {
            match &stmt.kind {
                StatementKind::Dim(d) => {
                    for var in &d.variables {
                        self.hoist_variable(var, seen)?;
                    }
                }
                StatementKind::Fields(f) => {
                    for var in &f.fields {
                        self.hoist_variable(var, seen)?;
                    }
                }
                StatementKind::Const(c) => {
                    for constant in &c.constants {
                        let key = constant.name.to_ascii_lowercase();
                        if !seen.insert(key.clone()) {
                            return Err(EvalError::NameRedefined(constant.name.clone()));
                        }
                        let value = self.visit_expression(&constant.value)?;
                        self.ctx.declare(key, Variable::constant(value));
                    }
                }
                StatementKind::Sub(p) => self.hoist_procedure(p, ProcedureKind::Sub, seen)?,
                StatementKind::Function(p) => {
                    self.hoist_procedure(p, ProcedureKind::Function, seen)?
                }
                StatementKind::Class(c) => {
                    let key = c.name.to_ascii_lowercase();
                    if !seen.insert(key.clone()) {
                        return Err(EvalError::NameRedefined(c.name.clone()));
                    }
                    let class = self.define_class(c)?;
                    self.ctx.classes.insert(key, Rc::new(class));
                }
                StatementKind::If(node) => {
                    self.hoist(&node.consequent, seen)?;
                    for clause in &node.else_ifs {
                        self.hoist(&clause.body, seen)?;
                    }
                    if let Some(alternate) = &node.alternate {
                        self.hoist(alternate, seen)?;
                    }
                }
                StatementKind::For(node) => self.hoist(&node.body, seen)?,
                StatementKind::ForEach(node) => self.hoist(&node.body, seen)?,
                StatementKind::Do(node) => self.hoist(&node.body, seen)?,
                StatementKind::While(node) => self.hoist(&node.body, seen)?,
                StatementKind::With(node) => self.hoist(&node.body, seen)?,
                StatementKind::Select(node) => {
                    for case in &node.cases {
                        self.hoist(&case.body, seen)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn hoist_variable(
        &mut self,
        var: &VariableDeclaration,
        seen: &mut HashSet<String>,
    ) -> Result<(), EvalError> {
        let key = var.name.to_ascii_lowercase();
        if !seen.insert(key.clone()) {
            return Err(EvalError::NameRedefined(var.name.clone()));
        }
        // A name kept from an earlier run of the same context stays as is.
        if self.ctx.frame().locals.contains_key(&key) {
            return Ok(());
        }
        self.ctx.declare(key, Variable::new(initial_value(var)?));
        Ok(())
    }

    fn hoist_procedure(
        &mut self,
        decl: &ProcedureDeclaration,
        kind: ProcedureKind,
        seen: &mut HashSet<String>,
    ) -> Result<(), EvalError> {
        let key = decl.name.to_ascii_lowercase();
        if !seen.insert(key.clone()) {
            return Err(EvalError::NameRedefined(decl.name.clone()));
        }
        let procedure = Procedure::from_declaration(decl, kind);
        self.ctx.procedures.insert(key, Rc::new(procedure));
        Ok(())
    }

    /// Run a procedure with already evaluated arguments.
    ///
    /// Returns the result (Empty for Subs and Property Let/Set) and the final
    /// values of the parameters, for ByRef write-back.
    pub(crate) fn invoke_procedure(
        &mut self,
        procedure: &Rc<Procedure>,
        this: Option<Rc<RefCell<ClassInstance>>>,
        args: Vec<Value>,
    ) -> Result<(Value, Vec<Value>), EvalError> {
        if args.len() != procedure.parameters.len() {
            return Err(EvalError::WrongArgumentCount(procedure.name.clone()));
        }
        if self.ctx.calls.len() >= self.max_call_depth || self.stack_exhausted() {
            return Err(EvalError::OutOfStackSpace);
        }

        let mut frame = Frame {
            this,
            ..Frame::default()
        };
        let mut seen = HashSet::new();
        for (param, arg) in procedure.parameters.iter().zip(args) {
            let key = param.name.to_ascii_lowercase();
            seen.insert(key.clone());
            frame.locals.insert(key, Variable::new(arg));
        }
        if procedure.kind.returns_value() {
            let key = procedure.name.to_ascii_lowercase();
            frame.locals.entry(key.clone()).or_insert(Variable::new(Value::Empty));
            frame.result_name = Some(key);
        }

        self.ctx.calls.push(frame);
        let result = self
            .hoist(&procedure.body, &mut seen)
            .and_then(|_| self.exec_block(&procedure.body));
        let mut locals = self.ctx.calls.pop().map(|f| f.locals).unwrap_or_default();
        result?;

        let value = if procedure.kind.returns_value() {
            locals
                .remove(&procedure.name.to_ascii_lowercase())
                .map(|v| v.value)
                .unwrap_or_default()
        } else {
            Value::Empty
        };
        let outs = procedure
            .parameters
            .iter()
            .map(|p| {
                locals
                    .remove(&p.name.to_ascii_lowercase())
                    .map(|v| v.value)
                    .unwrap_or_default()
            })
            .collect();
        for (_, var) in locals.drain() {
            self.release(var.value);
        }
        Ok((value, outs))
    }

    /// Evaluate arguments, run the procedure and write ByRef parameters back
    /// into plain variables passed for them.
    pub(crate) fn call_user(
        &mut self,
        procedure: &Rc<Procedure>,
        this: Option<Rc<RefCell<ClassInstance>>>,
        arg_exprs: &[Expression],
    ) -> Result<Value, EvalError> {
        let args = self.eval_args(arg_exprs)?;
        let (value, outs) = self.invoke_procedure(procedure, this, args)?;
        for ((param, expr), out) in procedure.parameters.iter().zip(arg_exprs).zip(outs) {
            if param.mode != PassingMode::ByRef {
                continue;
            }
            if let ExpressionKind::Identifier(name) = &expr.kind {
                self.write_back(name, out);
            }
        }
        Ok(value)
    }

    fn write_back(&mut self, name: &str, value: Value) {
        let key = name.to_ascii_lowercase();
        if let Some(slot) = self.ctx.resolve(&key) {
            self.ctx.with_variable(&slot, &key, |var| {
                if !var.constant {
                    var.value = value;
                }
            });
        }
    }

    /// Drop a value that left a variable; the last reference to a class
    /// instance runs its `Class_Terminate`.
    pub(crate) fn release(&mut self, value: Value) {
        if let Value::Object(crate::extension::ObjectRef::Instance(inst)) = value {
            if Rc::strong_count(&inst) == 1 {
                self.terminate(&inst);
            }
        }
    }

    /// Empty the global scope, terminating instances nothing else holds.
    pub fn teardown(&mut self) {
        let globals: Vec<Variable> = self.ctx.global.locals.drain().map(|(_, v)| v).collect();
        for var in globals {
            self.release(var.value);
        }
    }
}
