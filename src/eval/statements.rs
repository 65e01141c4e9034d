//! Statement execution.

use super::context::Variable;
use super::{Engine, EvalError, Flow};
use crate::ast::*;
use crate::extension::ObjectRef;
use crate::value::{self, Value, VbArray};
use crate::visitor::StatementVisitor;
use std::cmp::Ordering;

impl Engine {
    /// Run statements in order. Under `On Error Resume Next` a trappable
    /// fault is recorded in `Err` and execution continues with the next
    /// statement of this block.
    pub(crate) fn exec_block(&mut self, body: &[Statement]) -> Result<Flow, EvalError> {
        for stmt in body {
            self.check_limits()?;
            self.ctx.current_line = stmt.span.line;
            match stmt.accept(self) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(e) if e.is_trappable() && self.ctx.resume_next() => self.ctx.capture_error(&e),
                Err(e) => return Err(e),
            }
        }
        Ok(Flow::Normal)
    }

    /// `x = value` / `Set x = value` for a plain name.
    pub(crate) fn assign_identifier(
        &mut self,
        name: &str,
        value: Value,
        is_set: bool,
    ) -> Result<(), EvalError> {
        let key = name.to_ascii_lowercase();
        if key == "me" {
            return Err(EvalError::IllegalAssignment(name.to_string()));
        }
        if let Some(this) = self.ctx.this() {
            if self.ctx.resolve_local(&key).is_none() && self.has_property_setter(&this, &key) {
                return self.instance_set(&this, name, Vec::new(), value, is_set);
            }
        }
        if let Some(slot) = self.ctx.resolve(&key) {
            let old = self.ctx.with_variable(&slot, &key, |var| {
                if var.constant {
                    Err(EvalError::IllegalAssignment(name.to_string()))
                } else {
                    Ok(std::mem::replace(&mut var.value, value))
                }
            });
            return match old {
                Some(Ok(old)) => {
                    self.release(old);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Err(EvalError::IllegalAssignment(name.to_string())),
            };
        }
        if self.ctx.option_explicit {
            return Err(EvalError::VariableUndefined(name.to_string()));
        }
        self.ctx.declare(key, Variable::new(value));
        Ok(())
    }

    fn assign(&mut self, target: &Expression, value: Value, is_set: bool) -> Result<(), EvalError> {
        match &target.kind {
            ExpressionKind::Identifier(name) => self.assign_identifier(name, value, is_set),
            ExpressionKind::Member(m) => {
                let object = self.eval(&m.object)?;
                self.member_assign(object, &m.member, Vec::new(), value, is_set)
            }
            ExpressionKind::WithMember(member) => {
                let object = self.with_target()?;
                self.member_assign(object, member, Vec::new(), value, is_set)
            }
            ExpressionKind::IndexOrCall(node) => {
                self.assign_indexed(&node.callee, &node.arguments, value, is_set)
            }
            _ => Err(EvalError::IllegalAssignment(String::new())),
        }
    }

    fn member_assign(
        &mut self,
        object: Value,
        member: &str,
        args: Vec<Value>,
        value: Value,
        is_set: bool,
    ) -> Result<(), EvalError> {
        match object {
            Value::Object(ObjectRef::Instance(inst)) => {
                self.instance_set(&inst, member, args, value, is_set)
            }
            Value::Object(obj) => obj.set_property(member, &args, value),
            Value::Nothing => Err(EvalError::ObjectNotSet),
            _ => Err(EvalError::ObjectRequired(member.to_string())),
        }
    }

    /// `callee(args) = value`: array element, indexed property, or default member.
    fn assign_indexed(
        &mut self,
        callee: &Expression,
        arg_exprs: &[Expression],
        value: Value,
        is_set: bool,
    ) -> Result<(), EvalError> {
        let args = self.eval_args(arg_exprs)?;
        match &callee.kind {
            ExpressionKind::Identifier(name) => {
                let key = name.to_ascii_lowercase();
                if let Some(slot) = self.ctx.resolve(&key) {
                    let is_array = self
                        .ctx
                        .with_variable(&slot, &key, |var| matches!(var.value, Value::Array(_)))
                        .unwrap_or(false);
                    if is_array {
                        let indices = self.indices(&args)?;
                        let old = self
                            .ctx
                            .with_variable(&slot, &key, |var| match &mut var.value {
                                Value::Array(array) => array
                                    .get_mut(&indices)
                                    .map(|slot| std::mem::replace(slot, value)),
                                _ => Err(EvalError::TypeMismatch(name.to_string())),
                            })
                            .unwrap_or_else(|| Err(EvalError::TypeMismatch(name.to_string())))?;
                        self.release(old);
                        return Ok(());
                    }
                    let target = self.ctx.read(&slot, &key).unwrap_or_default();
                    return self.default_assign(target, args, value, is_set, name);
                }
                if let Some(this) = self.ctx.this() {
                    if self.has_property_setter(&this, &key) {
                        return self.instance_set(&this, name, args, value, is_set);
                    }
                }
                if let Some(obj) = self.ctx.intrinsics.get(&key).cloned() {
                    return obj.set_property("", &args, value);
                }
                if self.ctx.option_explicit {
                    return Err(EvalError::VariableUndefined(name.to_string()));
                }
                Err(EvalError::TypeMismatch(name.to_string()))
            }
            ExpressionKind::Member(m) => {
                let object = self.eval(&m.object)?;
                self.member_assign(object, &m.member, args, value, is_set)
            }
            ExpressionKind::WithMember(member) => {
                let object = self.with_target()?;
                self.member_assign(object, member, args, value, is_set)
            }
            _ => {
                let target = self.eval(callee)?;
                self.default_assign(target, args, value, is_set, "")
            }
        }
    }

    /// Value assigned without `Set`: objects collapse to their default member.
    fn let_value(&mut self, value: Value) -> Result<Value, EvalError> {
        match value {
            Value::Object(_) | Value::Nothing => self.scalar(value),
            other => Ok(other),
        }
    }

    /// Run a loop body once; `None` means keep looping.
    fn loop_body(&mut self, body: &[Statement], exit: Flow) -> Result<Option<Flow>, EvalError> {
        match self.exec_block(body)? {
            Flow::Normal => Ok(None),
            flow if flow == exit => Ok(Some(Flow::Normal)),
            flow => Ok(Some(flow)),
        }
    }

    fn case_matches(&mut self, subject: &Value, case: &CaseValue) -> Result<bool, EvalError> {
        let mode = self.ctx.compare_mode;
        match case {
            CaseValue::Value(expr) => {
                let v = self.eval_scalar(expr)?;
                value::values_equal(subject, &v, mode)
            }
            CaseValue::Comparison(op, expr) => {
                let v = self.eval_scalar(expr)?;
                let result = self.apply_binary(*op, subject, &v)?;
                Ok(matches!(result, Value::Boolean(true)))
            }
            CaseValue::Range(low, high) => {
                let low = self.eval_scalar(low)?;
                let high = self.eval_scalar(high)?;
                let above = value::compare(subject, &low, mode)?;
                let below = value::compare(subject, &high, mode)?;
                Ok(matches!(above, Some(Ordering::Greater | Ordering::Equal))
                    && matches!(below, Some(Ordering::Less | Ordering::Equal)))
            }
        }
    }
}

impl StatementVisitor for Engine {
    type Output = Result<Flow, EvalError>;

    fn visit_assignment(&mut self, node: &AssignmentStatement) -> Self::Output {
        let value = self.eval(&node.value)?;
        let value = if node.is_set {
            if !value.is_object() {
                return Err(EvalError::ObjectRequired(value.type_name()));
            }
            value
        } else {
            self.let_value(value)?
        };
        self.assign(&node.target, value, node.is_set)?;
        Ok(Flow::Normal)
    }

    fn visit_call(&mut self, node: &CallStatement) -> Self::Output {
        match &node.callee.kind {
            ExpressionKind::IndexOrCall(call) => self.call_expression(&call.callee, &call.arguments)?,
            _ => self.call_expression(&node.callee, &[])?,
        };
        Ok(Flow::Normal)
    }

    fn visit_call_sub(&mut self, node: &CallSubStatement) -> Self::Output {
        match &node.callee.kind {
            ExpressionKind::IndexOrCall(call) if node.arguments.is_empty() => {
                self.call_expression(&call.callee, &call.arguments)?
            }
            _ => self.call_expression(&node.callee, &node.arguments)?,
        };
        Ok(Flow::Normal)
    }

    fn visit_if(&mut self, node: &IfStatement) -> Self::Output {
        if self.eval_condition(&node.condition)? {
            return self.exec_block(&node.consequent);
        }
        for clause in &node.else_ifs {
            if self.eval_condition(&clause.condition)? {
                return self.exec_block(&clause.body);
            }
        }
        match &node.alternate {
            Some(body) => self.exec_block(body),
            None => Ok(Flow::Normal),
        }
    }

    fn visit_for(&mut self, node: &ForStatement) -> Self::Output {
        let from = self.eval_scalar(&node.from)?;
        let to = self.eval_scalar(&node.to)?;
        let step = match &node.step {
            Some(expr) => self.eval_scalar(expr)?,
            None => Value::Integer(1),
        };
        // Numeric loop bounds even when written as strings.
        let from = from.to_number()?.into_value();
        let to = to.to_number()?.into_value();
        let step = step.to_number()?.into_value();
        let ascending = step.to_f64()? >= 0.0;
        let mode = self.ctx.compare_mode;

        self.assign_identifier(&node.variable, from, false)?;
        loop {
            self.check_limits()?;
            let current = self.read_identifier(&node.variable)?;
            let within = match value::compare(&current, &to, mode)? {
                Some(Ordering::Equal) => true,
                Some(Ordering::Less) => ascending,
                Some(Ordering::Greater) => !ascending,
                None => false,
            };
            if !within {
                break;
            }
            if let Some(flow) = self.loop_body(&node.body, Flow::ExitFor)? {
                return Ok(flow);
            }
            let current = self.read_identifier(&node.variable)?;
            let next = value::add(&current, &step)?;
            self.assign_identifier(&node.variable, next, false)?;
        }
        Ok(Flow::Normal)
    }

    fn visit_for_each(&mut self, node: &ForEachStatement) -> Self::Output {
        let collection = self.eval(&node.collection)?;
        let items = match collection {
            Value::Array(array) => array.into_values(),
            Value::Object(obj) => match obj.enumerate() {
                Some(items) => items,
                None => return Err(EvalError::NotSupported(format!("For Each on {}", obj.type_name()))),
            },
            Value::Nothing => return Err(EvalError::ObjectNotSet),
            other => return Err(EvalError::ObjectRequired(other.type_name())),
        };
        for item in items {
            self.check_limits()?;
            let is_object = item.is_object();
            self.assign_identifier(&node.variable, item, is_object)?;
            if let Some(flow) = self.loop_body(&node.body, Flow::ExitFor)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn visit_do(&mut self, node: &DoStatement) -> Self::Output {
        let test = |engine: &mut Engine, which: LoopCondition, cond: &Expression| {
            let value = engine.eval_condition(cond)?;
            Ok::<bool, EvalError>(match which {
                LoopCondition::While => value,
                LoopCondition::Until => !value,
            })
        };
        loop {
            self.check_limits()?;
            if let Some((which, ConditionTest::PreTest, cond)) = &node.condition {
                if !test(self, *which, cond)? {
                    break;
                }
            }
            if let Some(flow) = self.loop_body(&node.body, Flow::ExitDo)? {
                return Ok(flow);
            }
            if let Some((which, ConditionTest::PostTest, cond)) = &node.condition {
                if !test(self, *which, cond)? {
                    break;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn visit_while(&mut self, node: &WhileStatement) -> Self::Output {
        loop {
            self.check_limits()?;
            if !self.eval_condition(&node.condition)? {
                break;
            }
            match self.exec_block(&node.body)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn visit_select(&mut self, node: &SelectStatement) -> Self::Output {
        let subject = self.eval_scalar(&node.subject)?;
        for case in &node.cases {
            if case.is_else {
                return self.exec_block(&case.body);
            }
            for candidate in &case.values {
                if self.case_matches(&subject, candidate)? {
                    return self.exec_block(&case.body);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn visit_with(&mut self, node: &WithStatement) -> Self::Output {
        let target = self.eval(&node.target)?;
        self.ctx.with_stack.push(target);
        let result = self.exec_block(&node.body);
        self.ctx.with_stack.pop();
        result
    }

    fn visit_dim(&mut self, _node: &VariablesDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_fields(&mut self, _node: &FieldsDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_const(&mut self, _node: &ConstsDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_redim(&mut self, node: &ReDimStatement) -> Self::Output {
        for target in &node.targets {
            let dims = self.eval_args(&target.dims)?;
            let bounds = self.indices(&dims)?;
            let key = target.name.to_ascii_lowercase();
            match self.ctx.resolve(&key) {
                Some(slot) => {
                    let preserve = node.preserve;
                    self.ctx
                        .with_variable(&slot, &key, |var| {
                            if var.constant {
                                return Err(EvalError::IllegalAssignment(target.name.clone()));
                            }
                            match &mut var.value {
                                Value::Array(array) => array.redim(bounds, preserve),
                                other => {
                                    *other = Value::Array(VbArray::new(bounds)?);
                                    Ok(())
                                }
                            }
                        })
                        .unwrap_or_else(|| Err(EvalError::IllegalAssignment(target.name.clone())))?;
                }
                None => {
                    let array = VbArray::new(bounds)?;
                    self.ctx.declare(key, Variable::new(Value::Array(array)));
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn visit_erase(&mut self, node: &EraseStatement) -> Self::Output {
        for name in &node.names {
            let key = name.to_ascii_lowercase();
            let slot = self
                .ctx
                .resolve(&key)
                .ok_or_else(|| EvalError::TypeMismatch(name.clone()))?;
            self.ctx
                .with_variable(&slot, &key, |var| match &mut var.value {
                    Value::Array(array) => {
                        array.erase();
                        Ok(())
                    }
                    _ => Err(EvalError::TypeMismatch(name.clone())),
                })
                .unwrap_or_else(|| Err(EvalError::TypeMismatch(name.clone())))?;
        }
        Ok(Flow::Normal)
    }

    fn visit_sub(&mut self, _node: &ProcedureDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_function(&mut self, _node: &ProcedureDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_property(&mut self, _node: &PropertyDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_class(&mut self, _node: &ClassDeclaration) -> Self::Output {
        Ok(Flow::Normal)
    }

    fn visit_on_error_resume_next(&mut self) -> Self::Output {
        self.ctx.set_resume_next(true);
        Ok(Flow::Normal)
    }

    fn visit_on_error_goto0(&mut self) -> Self::Output {
        self.ctx.set_resume_next(false);
        Ok(Flow::Normal)
    }

    fn visit_exit(&mut self, kind: ExitKind) -> Self::Output {
        Ok(match kind {
            ExitKind::Do => Flow::ExitDo,
            ExitKind::For => Flow::ExitFor,
            ExitKind::Sub | ExitKind::Function | ExitKind::Property => Flow::ExitProcedure,
        })
    }
}
