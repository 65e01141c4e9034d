//! User-defined classes.

use super::context::Variable;
use super::procedures::{initial_value, Procedure, ProcedureKind};
use super::{Engine, EvalError};
use crate::ast::{ClassDeclaration, MethodAccess, PropertyKind, StatementKind};
use crate::extension::ObjectRef;
use crate::value::Value;
use crate::visitor::ExpressionVisitor;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) struct Member {
    pub(crate) procedure: Rc<Procedure>,
    pub(crate) public: bool,
}

#[derive(Debug)]
pub(crate) struct FieldDef {
    pub(crate) initial: Value,
    pub(crate) public: bool,
    pub(crate) constant: bool,
}

/// A class as declared; shared by all its instances.
#[derive(Debug, Default)]
pub struct ClassDef {
    pub(crate) name: String,
    pub(crate) fields: HashMap<String, FieldDef>,
    pub(crate) methods: HashMap<String, Member>,
    pub(crate) getters: HashMap<String, Member>,
    pub(crate) letters: HashMap<String, Member>,
    pub(crate) setters: HashMap<String, Member>,
    /// Lower-cased name of the `Public Default` member
    pub(crate) default_member: Option<String>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct ClassInstance {
    pub(crate) class: Rc<ClassDef>,
    pub(crate) fields: HashMap<String, Variable>,
    pub(crate) terminated: bool,
}

impl ClassInstance {
    pub fn class_name(&self) -> &str {
        &self.class.name
    }
}

fn is_public(access: MethodAccess) -> bool {
    access != MethodAccess::Private
}

impl Engine {
    pub(crate) fn define_class(&mut self, decl: &ClassDeclaration) -> Result<ClassDef, EvalError> {
        let mut class = ClassDef {
            name: decl.name.clone(),
            ..ClassDef::default()
        };
        let field = |class: &mut ClassDef, name: &str, def: FieldDef| {
            let key = name.to_ascii_lowercase();
            if class.fields.insert(key, def).is_some() {
                return Err(EvalError::NameRedefined(name.to_string()));
            }
            Ok(())
        };

        for member in &decl.members {
            match &member.kind {
                StatementKind::Dim(d) => {
                    for var in &d.variables {
                        let def = FieldDef {
                            initial: initial_value(var)?,
                            public: true,
                            constant: false,
                        };
                        field(&mut class, &var.name, def)?;
                    }
                }
                StatementKind::Fields(f) => {
                    for var in &f.fields {
                        let def = FieldDef {
                            initial: initial_value(var)?,
                            public: f.access == crate::ast::Access::Public,
                            constant: false,
                        };
                        field(&mut class, &var.name, def)?;
                    }
                }
                StatementKind::Const(c) => {
                    for constant in &c.constants {
                        let def = FieldDef {
                            initial: self.visit_expression(&constant.value)?,
                            public: c.access == Some(crate::ast::Access::Public),
                            constant: true,
                        };
                        field(&mut class, &constant.name, def)?;
                    }
                }
                StatementKind::Sub(p) | StatementKind::Function(p) => {
                    let kind = if matches!(member.kind, StatementKind::Sub(_)) {
                        ProcedureKind::Sub
                    } else {
                        ProcedureKind::Function
                    };
                    let key = p.name.to_ascii_lowercase();
                    if p.access == MethodAccess::PublicDefault {
                        class.default_member = Some(key.clone());
                    }
                    let entry = Member {
                        procedure: Rc::new(Procedure::from_declaration(p, kind)),
                        public: is_public(p.access),
                    };
                    if class.methods.insert(key, entry).is_some() {
                        return Err(EvalError::NameRedefined(p.name.clone()));
                    }
                }
                StatementKind::Property(prop) => {
                    let p = &prop.procedure;
                    let key = p.name.to_ascii_lowercase();
                    let (kind, table) = match prop.kind {
                        PropertyKind::Get => (ProcedureKind::PropertyGet, &mut class.getters),
                        PropertyKind::Let => (ProcedureKind::PropertyLet, &mut class.letters),
                        PropertyKind::Set => (ProcedureKind::PropertySet, &mut class.setters),
                    };
                    let entry = Member {
                        procedure: Rc::new(Procedure::from_declaration(p, kind)),
                        public: is_public(p.access),
                    };
                    if table.insert(key.clone(), entry).is_some() {
                        return Err(EvalError::NameRedefined(p.name.clone()));
                    }
                    if p.access == MethodAccess::PublicDefault {
                        class.default_member = Some(key);
                    }
                }
                _ => {}
            }
        }
        Ok(class)
    }

    /// `New Name`: build the instance and run `Class_Initialize`.
    pub(crate) fn instantiate(&mut self, name: &str) -> Result<Value, EvalError> {
        let key = name.to_ascii_lowercase();
        let class = self
            .ctx
            .classes
            .get(&key)
            .cloned()
            .ok_or_else(|| EvalError::ClassNotDefined(name.to_string()))?;
        let fields = class
            .fields
            .iter()
            .map(|(k, f)| {
                let var = Variable {
                    value: f.initial.clone(),
                    constant: f.constant,
                };
                (k.clone(), var)
            })
            .collect();
        let initializer = class
            .methods
            .get("class_initialize")
            .map(|m| Rc::clone(&m.procedure));
        let instance = Rc::new(RefCell::new(ClassInstance {
            class,
            fields,
            terminated: false,
        }));
        if let Some(init) = initializer {
            self.invoke_procedure(&init, Some(Rc::clone(&instance)), Vec::new())?;
        }
        Ok(Value::Object(ObjectRef::Instance(instance)))
    }

    /// Run `Class_Terminate` once. Errors inside it are ignored.
    pub(crate) fn terminate(&mut self, inst: &Rc<RefCell<ClassInstance>>) {
        let terminator = match inst.try_borrow_mut() {
            Ok(mut i) if !i.terminated => {
                i.terminated = true;
                i.class
                    .methods
                    .get("class_terminate")
                    .map(|m| Rc::clone(&m.procedure))
            }
            _ => None,
        };
        if let Some(procedure) = terminator {
            if let Err(e) = self.invoke_procedure(&procedure, Some(Rc::clone(inst)), Vec::new()) {
                tracing::debug!(class = %procedure.name, error = %e, "Class_Terminate failed");
            }
        }
    }

    fn class_of(inst: &Rc<RefCell<ClassInstance>>) -> Result<Rc<ClassDef>, EvalError> {
        inst.try_borrow()
            .map(|i| Rc::clone(&i.class))
            .map_err(|_| EvalError::NotSupported("(object busy)".to_string()))
    }

    /// Whether code running now may see private members of `inst`.
    fn inside(&self, inst: &Rc<RefCell<ClassInstance>>) -> bool {
        self.ctx.this().is_some_and(|this| Rc::ptr_eq(&this, inst))
    }

    /// A Sub, Function or Property Get callable as `inst.name`.
    pub(crate) fn lookup_method(
        &self,
        inst: &Rc<RefCell<ClassInstance>>,
        name: &str,
    ) -> Result<Option<Rc<Procedure>>, EvalError> {
        let key = name.to_ascii_lowercase();
        let class = Self::class_of(inst)?;
        let member = class.methods.get(&key).or_else(|| class.getters.get(&key));
        match member {
            Some(m) if !m.public && !self.inside(inst) => {
                Err(EvalError::NotSupported(name.to_string()))
            }
            Some(m) => Ok(Some(Rc::clone(&m.procedure))),
            None => Ok(None),
        }
    }

    /// True if assigning to `name` inside the class reaches a Property Let/Set.
    pub(crate) fn has_property_setter(
        &self,
        inst: &Rc<RefCell<ClassInstance>>,
        name: &str,
    ) -> bool {
        let key = name.to_ascii_lowercase();
        Self::class_of(inst)
            .map(|c| c.letters.contains_key(&key) || c.setters.contains_key(&key))
            .unwrap_or(false)
    }

    pub(crate) fn default_member(inst: &Rc<RefCell<ClassInstance>>) -> Option<String> {
        Self::class_of(inst).ok().and_then(|c| c.default_member.clone())
    }

    /// Read `inst.name(args)`.
    pub(crate) fn instance_get(
        &mut self,
        inst: &Rc<RefCell<ClassInstance>>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        if let Some(procedure) = self.lookup_method(inst, name)? {
            return self
                .invoke_procedure(&procedure, Some(Rc::clone(inst)), args)
                .map(|(value, _)| value);
        }
        let key = name.to_ascii_lowercase();
        let class = Self::class_of(inst)?;
        match class.fields.get(&key) {
            Some(f) if !f.public && !self.inside(inst) => {
                Err(EvalError::NotSupported(name.to_string()))
            }
            Some(_) => {
                let value = inst
                    .try_borrow()
                    .ok()
                    .and_then(|i| i.fields.get(&key).map(|v| v.value.clone()))
                    .unwrap_or_default();
                if args.is_empty() {
                    Ok(value)
                } else {
                    self.index_or_default(value, args, name)
                }
            }
            None => Err(EvalError::NotSupported(name.to_string())),
        }
    }

    /// Write `inst.name(args) = value`.
    pub(crate) fn instance_set(
        &mut self,
        inst: &Rc<RefCell<ClassInstance>>,
        name: &str,
        args: Vec<Value>,
        value: Value,
        is_set: bool,
    ) -> Result<(), EvalError> {
        let key = name.to_ascii_lowercase();
        let class = Self::class_of(inst)?;
        let setter = if is_set {
            class.setters.get(&key).or_else(|| class.letters.get(&key))
        } else {
            class.letters.get(&key).or_else(|| class.setters.get(&key))
        };
        let inside = self.inside(inst);
        if let Some(member) = setter {
            if !member.public && !inside {
                return Err(EvalError::NotSupported(name.to_string()));
            }
            let mut all = args;
            all.push(value);
            self.invoke_procedure(&member.procedure, Some(Rc::clone(inst)), all)?;
            return Ok(());
        }
        match class.fields.get(&key) {
            Some(f) if !f.public && !inside => Err(EvalError::NotSupported(name.to_string())),
            Some(f) if f.constant => Err(EvalError::IllegalAssignment(name.to_string())),
            Some(_) if args.is_empty() => {
                let old = {
                    let mut i = inst
                        .try_borrow_mut()
                        .map_err(|_| EvalError::NotSupported(name.to_string()))?;
                    i.fields
                        .get_mut(&key)
                        .map(|var| std::mem::replace(&mut var.value, value))
                };
                if let Some(old) = old {
                    self.release(old);
                }
                Ok(())
            }
            Some(_) => {
                let indices = self.indices(&args)?;
                let current = {
                    let mut i = inst
                        .try_borrow_mut()
                        .map_err(|_| EvalError::NotSupported(name.to_string()))?;
                    let var = i
                        .fields
                        .get_mut(&key)
                        .ok_or_else(|| EvalError::NotSupported(name.to_string()))?;
                    match &mut var.value {
                        Value::Array(array) => {
                            let slot = array.get_mut(&indices)?;
                            let old = std::mem::replace(slot, value);
                            drop(i);
                            self.release(old);
                            return Ok(());
                        }
                        other => other.clone(),
                    }
                };
                self.default_assign(current, args, value, is_set, name)
            }
            None => Err(EvalError::NotSupported(name.to_string())),
        }
    }
}
