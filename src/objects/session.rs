//! `Session`: per-visitor variables.
//!
//! The object works on a [`SessionState`] the host loads from the session
//! store before the run and writes back after it.

use super::contents::{call_common, item, Contents, ContentsObject};
use crate::eval::EvalError;
use crate::extension::{arg, check_args, ExtensionObject, ObjectRef};
use crate::session_store::SessionRecord;
use crate::value::{StoredValue, Value};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub record: SessionRecord,
    /// Created by this request
    pub is_new: bool,
    /// `Session.Abandon` was called
    pub abandoned: bool,
}

impl SessionState {
    pub fn new(id: String, record: SessionRecord, is_new: bool) -> Self {
        SessionState {
            id,
            record,
            is_new,
            abandoned: false,
        }
    }
}

/// Numeric `SessionID` derived from the cookie value (FNV-1a, 31 bits).
pub fn numeric_id(id: &str) -> i64 {
    if id.is_empty() {
        return 0;
    }
    let mut hash: u32 = 0x811c_9dc5;
    for byte in id.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    match (hash & 0x7fff_ffff) as i64 {
        0 => 1,
        n => n,
    }
}

/// Shared handle; cloned into `Session.Contents`.
#[derive(Clone)]
pub struct SessionHandle(pub Rc<RefCell<SessionState>>);

impl Contents for SessionHandle {
    fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().record.get(key).map(Value::from)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
        let stored = StoredValue::try_from(&value)?;
        self.0.borrow_mut().record.set(key, stored);
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.0.borrow_mut().record.remove(key);
    }

    fn clear(&self) {
        self.0.borrow_mut().record.values.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.0.borrow().record.values.iter().map(|(k, _)| k.clone()).collect()
    }
}

pub struct SessionObject {
    handle: SessionHandle,
}

impl SessionObject {
    pub fn new(state: Rc<RefCell<SessionState>>) -> Self {
        SessionObject {
            handle: SessionHandle(state),
        }
    }
}

impl ExtensionObject for SessionObject {
    fn type_name(&self) -> &str {
        "Session"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "SESSIONID" => Ok(Value::Integer(numeric_id(&self.handle.0.borrow().id))),
            "TIMEOUT" => Ok(Value::Integer(self.handle.0.borrow().record.timeout_minutes)),
            "ABANDON" => {
                self.handle.0.borrow_mut().abandoned = true;
                Ok(Value::Empty)
            }
            "CONTENTS" if args.is_empty() => Ok(Value::Object(ObjectRef::native(
                ContentsObject::new(self.handle.clone(), "Session.Contents"),
            ))),
            "CONTENTS" => {
                check_args(name, args, 1, 1)?;
                item(&self.handle, &args[0])
            }
            _ => call_common(&self.handle, name, args)
                .unwrap_or_else(|| Err(EvalError::NotSupported(format!("Session.{}", name)))),
        }
    }

    fn set_property(&mut self, name: &str, args: &[Value], value: Value) -> Result<(), EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "" | "CONTENTS" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                self.handle.set(&arg(args, 0).to_vb_string()?, value)
            }
            "TIMEOUT" => {
                let minutes = value.to_i64()?;
                if minutes <= 0 {
                    return Err(EvalError::InvalidProcedureCall("Session.Timeout".to_string()));
                }
                self.handle.0.borrow_mut().record.timeout_minutes = minutes;
                Ok(())
            }
            _ => Err(EvalError::NotSupported(format!("Session.{}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (SessionObject, Rc<RefCell<SessionState>>) {
        let state = Rc::new(RefCell::new(SessionState::new(
            "ABCDEF".to_string(),
            SessionRecord::new(20),
            true,
        )));
        (SessionObject::new(Rc::clone(&state)), state)
    }

    #[test]
    fn test_default_member_is_case_insensitive() {
        let (mut s, _) = session();
        s.set_property("", &[Value::str("User")], Value::str("ann")).unwrap();
        let v = s.get_property("", &[Value::str("USER")]).unwrap();
        assert_eq!(v.to_string(), "ann");
        assert!(matches!(s.call_method("Count", &[]).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn test_objects_are_not_storable() {
        let (mut s, _) = session();
        let dict = Value::Object(ObjectRef::native(super::super::dictionary::DictionaryObject::new()));
        let err = s.set_property("", &[Value::str("d")], dict).unwrap_err();
        assert_eq!(err.number(), 13);
    }

    #[test]
    fn test_abandon_and_timeout() {
        let (mut s, state) = session();
        s.set_property("Timeout", &[], Value::Integer(5)).unwrap();
        s.call_method("Abandon", &[]).unwrap();
        assert_eq!(state.borrow().record.timeout_minutes, 5);
        assert!(state.borrow().abandoned);
    }

    #[test]
    fn test_numeric_id_is_stable_and_positive() {
        assert_eq!(numeric_id("abc"), numeric_id("abc"));
        assert!(numeric_id("abc") > 0);
        assert_eq!(numeric_id(""), 0);
    }
}
