//! `Contents` collection shared by `Session` and `Application`.

use crate::eval::EvalError;
use crate::extension::{arg, check_args, ExtensionObject};
use crate::value::Value;

/// A keyed variant store with case-insensitive keys, iterated in insertion order.
pub trait Contents {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), EvalError>;
    fn remove(&self, key: &str);
    fn clear(&self);
    /// Keys as first written
    fn keys(&self) -> Vec<String>;
}

/// Look up by key, or by 1-based position for numeric arguments.
pub(crate) fn item<C: Contents + ?Sized>(store: &C, key: &Value) -> Result<Value, EvalError> {
    match key {
        Value::Integer(_) | Value::Float(_) => {
            let index = key.to_i64()?;
            let keys = store.keys();
            let found = usize::try_from(index - 1)
                .ok()
                .and_then(|i| keys.get(i))
                .and_then(|k| store.get(k));
            Ok(found.unwrap_or_default())
        }
        v => Ok(store.get(&v.to_vb_string()?).unwrap_or_default()),
    }
}

/// Members common to the owner objects and their `Contents` view.
pub(crate) fn call_common<C: Contents + ?Sized>(
    store: &C,
    name: &str,
    args: &[Value],
) -> Option<Result<Value, EvalError>> {
    let result = match name.to_ascii_uppercase().as_str() {
        "" | "ITEM" => check_args(name, args, 1, 1).and_then(|_| item(store, &args[0])),
        "COUNT" => Ok(Value::Integer(store.keys().len() as i64)),
        "KEY" => check_args(name, args, 1, 1).and_then(|_| {
            let index = arg(args, 0).to_i64()?;
            let keys = store.keys();
            usize::try_from(index - 1)
                .ok()
                .and_then(|i| keys.get(i).cloned())
                .map(Value::String)
                .ok_or(EvalError::SubscriptOutOfRange)
        }),
        "REMOVE" => check_args(name, args, 1, 1).and_then(|_| {
            store.remove(&arg(args, 0).to_vb_string()?);
            Ok(Value::Empty)
        }),
        "REMOVEALL" => {
            store.clear();
            Ok(Value::Empty)
        }
        _ => return None,
    };
    Some(result)
}

pub struct ContentsObject<C: Contents> {
    store: C,
    type_name: &'static str,
}

impl<C: Contents> ContentsObject<C> {
    pub fn new(store: C, type_name: &'static str) -> Self {
        ContentsObject { store, type_name }
    }
}

impl<C: Contents> ExtensionObject for ContentsObject<C> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        call_common(&self.store, name, args)
            .unwrap_or_else(|| Err(EvalError::NotSupported(format!("Contents.{}", name))))
    }

    fn set_property(&mut self, name: &str, args: &[Value], value: Value) -> Result<(), EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                self.store.set(&arg(args, 0).to_vb_string()?, value)
            }
            _ => Err(EvalError::NotSupported(format!("Contents.{}", name))),
        }
    }

    fn enumerate(&self) -> Option<Vec<Value>> {
        Some(self.store.keys().into_iter().map(Value::String).collect())
    }
}
