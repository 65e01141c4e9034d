//! Expression evaluation, name lookup and calls.

use super::context::Slot;
use super::{builtins, Engine, EvalError};
use crate::ast::*;
use crate::extension::ObjectRef;
use crate::value::{self, Logical, Value};
use crate::visitor::ExpressionVisitor;
use std::cmp::Ordering;

impl ExpressionVisitor for Engine {
    type Output = Result<Value, EvalError>;

    fn visit_literal(&mut self, lit: &Literal) -> Self::Output {
        Ok(match lit {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Date(d) => Value::Date(*d),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
            Literal::Empty => Value::Empty,
            Literal::Nothing => Value::Nothing,
        })
    }

    fn visit_identifier(&mut self, name: &str) -> Self::Output {
        self.read_identifier(name)
    }

    fn visit_unary(&mut self, node: &UnaryExpression) -> Self::Output {
        let operand = self.eval(&node.operand)?;
        let operand = self.scalar(operand)?;
        match node.op {
            UnaryOperation::Minus => value::negate(&operand),
            UnaryOperation::Plus => value::identity(&operand),
            UnaryOperation::Not => value::not(&operand),
        }
    }

    fn visit_binary(&mut self, node: &BinaryExpression) -> Self::Output {
        let left = self.eval(&node.left)?;
        let right = self.eval(&node.right)?;
        if node.op == BinaryOperation::Is {
            return match (&left, &right) {
                (Value::Object(a), Value::Object(b)) => Ok(Value::Boolean(a.ptr_eq(b))),
                (Value::Nothing, Value::Nothing) => Ok(Value::Boolean(true)),
                (Value::Object(_), Value::Nothing) | (Value::Nothing, Value::Object(_)) => {
                    Ok(Value::Boolean(false))
                }
                _ => Err(EvalError::ObjectRequired("Is".to_string())),
            };
        }
        let left = self.scalar(left)?;
        let right = self.scalar(right)?;
        self.apply_binary(node.op, &left, &right)
    }

    fn visit_index_or_call(&mut self, node: &IndexOrCallExpression) -> Self::Output {
        self.call_expression(&node.callee, &node.arguments)
    }

    fn visit_member(&mut self, node: &MemberExpression) -> Self::Output {
        let target = self.eval(&node.object)?;
        self.member_access(target, &node.member, &[], false)
    }

    fn visit_with_member(&mut self, member: &str) -> Self::Output {
        let target = self.with_target()?;
        self.member_access(target, member, &[], false)
    }

    fn visit_new(&mut self, class_name: &str) -> Self::Output {
        self.instantiate(class_name)
    }

    fn visit_missing(&mut self) -> Self::Output {
        Ok(Value::Empty)
    }
}

impl Engine {
    pub(crate) fn eval(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        expr.accept(self)
    }

    pub(crate) fn eval_args(&mut self, args: &[Expression]) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    /// Evaluate to a non-object value (default members resolved).
    pub(crate) fn eval_scalar(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        let value = self.eval(expr)?;
        self.scalar(value)
    }

    /// Replace an object by the value of its default member.
    pub(crate) fn scalar(&mut self, value: Value) -> Result<Value, EvalError> {
        match value {
            Value::Object(_) => {
                let resolved = self.call_default(value, Vec::new())?;
                match resolved {
                    Value::Object(obj) => Err(EvalError::NotSupported(obj.type_name())),
                    other => Ok(other),
                }
            }
            Value::Nothing => Err(EvalError::ObjectNotSet),
            other => Ok(other),
        }
    }

    /// Condition of If/While/Do: Null reads as False.
    pub(crate) fn eval_condition(&mut self, expr: &Expression) -> Result<bool, EvalError> {
        let value = self.eval_scalar(expr)?;
        value.to_bool()
    }

    pub(crate) fn with_target(&self) -> Result<Value, EvalError> {
        self.ctx
            .with_stack
            .last()
            .cloned()
            .ok_or_else(|| EvalError::ObjectRequired("With".to_string()))
    }

    /// Array subscripts from argument values.
    pub(crate) fn indices(&mut self, args: &[Value]) -> Result<Vec<i64>, EvalError> {
        args.iter()
            .map(|a| {
                let v = self.scalar(a.clone())?;
                if v.is_null() {
                    return Err(EvalError::InvalidUseOfNull);
                }
                v.to_i64()
            })
            .collect()
    }

    pub(crate) fn apply_binary(
        &self,
        op: BinaryOperation,
        left: &Value,
        right: &Value,
    ) -> Result<Value, EvalError> {
        let mode = self.ctx.compare_mode;
        match op {
            BinaryOperation::Exponentiation => value::power(left, right),
            BinaryOperation::Multiplication => value::multiply(left, right),
            BinaryOperation::Division => value::divide(left, right),
            BinaryOperation::IntDivision => value::int_divide(left, right),
            BinaryOperation::Mod => value::modulo(left, right),
            BinaryOperation::Addition => value::add(left, right),
            BinaryOperation::Subtraction => value::subtract(left, right),
            BinaryOperation::Concatenation => value::concat(left, right),
            BinaryOperation::And => value::logical(Logical::And, left, right),
            BinaryOperation::Or => value::logical(Logical::Or, left, right),
            BinaryOperation::Xor => value::logical(Logical::Xor, left, right),
            BinaryOperation::Eqv => value::logical(Logical::Eqv, left, right),
            BinaryOperation::Imp => value::logical(Logical::Imp, left, right),
            BinaryOperation::Equal => value::relational(left, right, mode, |o| o == Ordering::Equal),
            BinaryOperation::NotEqual => {
                value::relational(left, right, mode, |o| o != Ordering::Equal)
            }
            BinaryOperation::Less => value::relational(left, right, mode, |o| o == Ordering::Less),
            BinaryOperation::Greater => {
                value::relational(left, right, mode, |o| o == Ordering::Greater)
            }
            BinaryOperation::LessOrEqual => {
                value::relational(left, right, mode, |o| o != Ordering::Greater)
            }
            BinaryOperation::GreaterOrEqual => {
                value::relational(left, right, mode, |o| o != Ordering::Less)
            }
            BinaryOperation::Is => Err(EvalError::ObjectRequired("Is".to_string())),
        }
    }

    /// Value of a bare name.
    pub(crate) fn read_identifier(&mut self, name: &str) -> Result<Value, EvalError> {
        let key = name.to_ascii_lowercase();
        if key == "me" {
            return self.me();
        }
        if let Some(slot) = self.ctx.resolve_local(&key) {
            return Ok(self.ctx.read(&slot, &key).unwrap_or_default());
        }
        if let Some(this) = self.ctx.this() {
            if let Some(procedure) = self.lookup_method(&this, &key)? {
                return self.call_user(&procedure, Some(this), &[]);
            }
        }
        if let Some(slot) = self.ctx.resolve_global(&key) {
            return Ok(self.ctx.read(&slot, &key).unwrap_or_default());
        }
        if let Some(value) = builtins::constant(&key) {
            return Ok(value);
        }
        if let Some(obj) = self.ctx.intrinsics.get(&key) {
            return Ok(Value::Object(obj.clone()));
        }
        if let Some(procedure) = self.ctx.procedures.get(&key).cloned() {
            return self.call_user(&procedure, None, &[]);
        }
        if let Some(result) = self.call_builtin(&key, &[]) {
            return result;
        }
        if self.ctx.option_explicit {
            return Err(EvalError::VariableUndefined(name.to_string()));
        }
        Ok(Value::Empty)
    }

    fn me(&self) -> Result<Value, EvalError> {
        self.ctx
            .this()
            .map(|inst| Value::Object(ObjectRef::Instance(inst)))
            .ok_or_else(|| EvalError::ObjectRequired("Me".to_string()))
    }

    /// `callee(args)` in expression or statement position.
    pub(crate) fn call_expression(
        &mut self,
        callee: &Expression,
        args: &[Expression],
    ) -> Result<Value, EvalError> {
        match &callee.kind {
            ExpressionKind::Identifier(name) => self.call_named(name, args),
            ExpressionKind::Member(m) => {
                let target = self.eval(&m.object)?;
                self.member_access(target, &m.member, args, true)
            }
            ExpressionKind::WithMember(member) => {
                let target = self.with_target()?;
                self.member_access(target, member, args, true)
            }
            _ => {
                let target = self.eval(callee)?;
                let args = self.eval_args(args)?;
                self.call_default(target, args)
            }
        }
    }

    fn call_named(&mut self, name: &str, arg_exprs: &[Expression]) -> Result<Value, EvalError> {
        let key = name.to_ascii_lowercase();
        if key == "me" {
            let me = self.me()?;
            let args = self.eval_args(arg_exprs)?;
            return self.call_default(me, args);
        }
        // Inside a Function, `f(x)` recurses while a bare `f` reads the result.
        let recursing =
            !arg_exprs.is_empty() && self.ctx.frame().result_name.as_deref() == Some(key.as_str());
        if !recursing {
            if let Some(slot) = self.ctx.resolve_local(&key) {
                return self.index_slot(&slot, &key, name, arg_exprs);
            }
        }
        if let Some(this) = self.ctx.this() {
            if let Some(procedure) = self.lookup_method(&this, &key)? {
                return self.call_user(&procedure, Some(this), arg_exprs);
            }
        }
        if !recursing {
            if let Some(slot) = self.ctx.resolve_global(&key) {
                return self.index_slot(&slot, &key, name, arg_exprs);
            }
        }
        if let Some(procedure) = self.ctx.procedures.get(&key).cloned() {
            return self.call_user(&procedure, None, arg_exprs);
        }
        if let Some(obj) = self.ctx.intrinsics.get(&key).cloned() {
            let args = self.eval_args(arg_exprs)?;
            return obj.get_property("", &args);
        }
        let args = self.eval_args(arg_exprs)?;
        if let Some(result) = self.call_builtin(&key, &args) {
            return result;
        }
        if self.ctx.option_explicit {
            return Err(EvalError::VariableUndefined(name.to_string()));
        }
        Err(EvalError::TypeMismatch(name.to_string()))
    }

    fn index_slot(
        &mut self,
        slot: &Slot,
        key: &str,
        name: &str,
        arg_exprs: &[Expression],
    ) -> Result<Value, EvalError> {
        let value = self.ctx.read(slot, key).unwrap_or_default();
        let args = self.eval_args(arg_exprs)?;
        self.index_or_default(value, args, name)
    }

    /// `target.member`, with or without an argument list.
    pub(crate) fn member_access(
        &mut self,
        target: Value,
        member: &str,
        arg_exprs: &[Expression],
        parens: bool,
    ) -> Result<Value, EvalError> {
        match &target {
            Value::Object(ObjectRef::Instance(inst)) => {
                if let Some(procedure) = self.lookup_method(inst, member)? {
                    return self.call_user(&procedure, Some(inst.clone()), arg_exprs);
                }
                let args = self.eval_args(arg_exprs)?;
                self.instance_get(inst, member, args)
            }
            Value::Object(obj) => {
                let args = self.eval_args(arg_exprs)?;
                if parens || !args.is_empty() {
                    obj.call_method(member, &args)
                } else {
                    obj.get_property(member, &args)
                }
            }
            Value::Nothing => Err(EvalError::ObjectNotSet),
            _ => Err(EvalError::ObjectRequired(member.to_string())),
        }
    }

    /// A variable's value applied to an argument list: array element,
    /// object default member, or the value itself when there are no arguments.
    pub(crate) fn index_or_default(
        &mut self,
        value: Value,
        args: Vec<Value>,
        name: &str,
    ) -> Result<Value, EvalError> {
        match value {
            Value::Array(array) => {
                if args.is_empty() {
                    return Ok(Value::Array(array));
                }
                let indices = self.indices(&args)?;
                array.get(&indices).cloned()
            }
            Value::Object(_) if args.is_empty() => Ok(value),
            Value::Object(_) => self.call_default(value, args),
            Value::Nothing if args.is_empty() => Ok(Value::Nothing),
            Value::Nothing => Err(EvalError::ObjectNotSet),
            other if args.is_empty() => Ok(other),
            _ => Err(EvalError::TypeMismatch(name.to_string())),
        }
    }

    /// Invoke the default member of an object.
    pub(crate) fn call_default(&mut self, target: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match target {
            Value::Object(ObjectRef::Instance(inst)) => match Self::default_member(&inst) {
                Some(member) => self.instance_get(&inst, &member, args),
                None => Err(EvalError::NotSupported(format!(
                    "{} has no default member",
                    inst.try_borrow().map(|i| i.class_name().to_string()).unwrap_or_default()
                ))),
            },
            Value::Object(obj) => obj.get_property("", &args),
            Value::Array(_) => self.index_or_default(target, args, ""),
            Value::Nothing => Err(EvalError::ObjectNotSet),
            other if args.is_empty() => Ok(other),
            other => Err(EvalError::TypeMismatch(other.type_name())),
        }
    }

    /// Assign through an object's default member: `obj(args) = value`.
    pub(crate) fn default_assign(
        &mut self,
        target: Value,
        args: Vec<Value>,
        value: Value,
        is_set: bool,
        name: &str,
    ) -> Result<(), EvalError> {
        match target {
            Value::Object(ObjectRef::Instance(inst)) => match Self::default_member(&inst) {
                Some(member) => self.instance_set(&inst, &member, args, value, is_set),
                None => Err(EvalError::NotSupported(name.to_string())),
            },
            Value::Object(obj) => obj.set_property("", &args, value),
            Value::Nothing => Err(EvalError::ObjectNotSet),
            _ => Err(EvalError::TypeMismatch(name.to_string())),
        }
    }
}
