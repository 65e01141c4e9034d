//! Extension object protocol.
//!
//! Every native object a script can reach (the web intrinsics, `Err`, and
//! whatever `CreateObject` builds) implements [`ExtensionObject`]. The engine
//! only ever talks to them through these calls; it never inspects a concrete
//! type.
//!
//! Member names arrive exactly as written in the script. Implementations
//! compare them case-insensitively, usually by matching on
//! `name.to_ascii_uppercase()`. The empty name addresses the default member:
//! `d("k")` reads `get_property("", ["k"])` and `d("k") = v` calls
//! `set_property("", ["k"], v)`.

use crate::eval::classes::ClassInstance;
use crate::eval::EvalError;
use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub trait ExtensionObject {
    /// What `TypeName()` reports.
    fn type_name(&self) -> &str;

    /// Read a property. Objects without real properties can leave this to
    /// `call_method`, which is what `obj.Count` without parentheses reaches.
    fn get_property(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.call_method(name, args)
    }

    fn set_property(&mut self, name: &str, _args: &[Value], _value: Value) -> Result<(), EvalError> {
        Err(EvalError::NotSupported(name.to_string()))
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError>;

    /// Items produced by `For Each`, if the object is a collection.
    fn enumerate(&self) -> Option<Vec<Value>> {
        None
    }

    /// Key/value view for objects that behave like dictionaries.
    fn entries(&self) -> Option<Vec<(String, Value)>> {
        None
    }
}

/// Shared handle held by `Value::Object`.
#[derive(Clone)]
pub enum ObjectRef {
    Native(Rc<RefCell<dyn ExtensionObject>>),
    Instance(Rc<RefCell<ClassInstance>>),
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.type_name())
    }
}

impl ObjectRef {
    pub fn native<T: ExtensionObject + 'static>(object: T) -> Self {
        ObjectRef::Native(Rc::new(RefCell::new(object)))
    }

    pub fn type_name(&self) -> String {
        match self {
            ObjectRef::Native(obj) => obj
                .try_borrow()
                .map(|o| o.type_name().to_string())
                .unwrap_or_else(|_| "Object".to_string()),
            ObjectRef::Instance(inst) => inst
                .try_borrow()
                .map(|i| i.class_name().to_string())
                .unwrap_or_else(|_| "Object".to_string()),
        }
    }

    /// `Is`: identity, not equality.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        match (self, other) {
            (ObjectRef::Native(a), ObjectRef::Native(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (ObjectRef::Instance(a), ObjectRef::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn with_native<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn ExtensionObject) -> Result<R, EvalError>,
    ) -> Result<R, EvalError> {
        match self {
            ObjectRef::Native(obj) => {
                let mut guard = obj
                    .try_borrow_mut()
                    .map_err(|_| EvalError::NotSupported(format!("{} (object busy)", name)))?;
                f(&mut *guard)
            }
            ObjectRef::Instance(_) => Err(EvalError::NotSupported(name.to_string())),
        }
    }

    pub fn get_property(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.with_native(name, |o| o.get_property(name, args))
    }

    pub fn set_property(&self, name: &str, args: &[Value], value: Value) -> Result<(), EvalError> {
        self.with_native(name, |o| o.set_property(name, args, value))
    }

    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.with_native(name, |o| o.call_method(name, args))
    }

    pub fn enumerate(&self) -> Option<Vec<Value>> {
        match self {
            ObjectRef::Native(obj) => obj.try_borrow().ok().and_then(|o| o.enumerate()),
            ObjectRef::Instance(_) => None,
        }
    }

    pub fn entries(&self) -> Option<Vec<(String, Value)>> {
        match self {
            ObjectRef::Native(obj) => obj.try_borrow().ok().and_then(|o| o.entries()),
            ObjectRef::Instance(_) => None,
        }
    }
}

/// Check the argument count of a native member.
pub fn check_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::WrongArgumentCount(name.to_string()));
    }
    Ok(())
}

/// Argument `i`, or Empty when omitted.
pub fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Argument `i` as a string; omitted and Null read as "".
pub fn arg_str(args: &[Value], i: usize) -> String {
    match args.get(i) {
        Some(Value::Null) | None => String::new(),
        Some(v) => v.to_string(),
    }
}
