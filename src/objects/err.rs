//! The `Err` object.

use crate::eval::{ErrState, EvalError};
use crate::extension::{arg, check_args, ExtensionObject};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// View over the engine's error state. The default member is `Number`.
pub struct ErrObject {
    state: Rc<RefCell<ErrState>>,
}

impl ErrObject {
    pub fn new(state: Rc<RefCell<ErrState>>) -> Self {
        ErrObject { state }
    }
}

impl ExtensionObject for ErrObject {
    fn type_name(&self) -> &str {
        "ErrObject"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "" | "NUMBER" => Ok(Value::Integer(self.state.borrow().number)),
            "DESCRIPTION" => Ok(Value::str(self.state.borrow().description.clone())),
            "SOURCE" => Ok(Value::str(self.state.borrow().source.clone())),
            "LINE" => Ok(Value::Integer(self.state.borrow().line as i64)),
            "CLEAR" => {
                self.state.borrow_mut().clear();
                Ok(Value::Empty)
            }
            "RAISE" => {
                check_args(name, args, 1, 5)?;
                let number = arg(args, 0).to_i64()?;
                let origin = match arg(args, 1) {
                    Value::Empty => String::new(),
                    v => v.to_vb_string()?,
                };
                let description = match arg(args, 2) {
                    Value::Empty => "Unknown runtime error".to_string(),
                    v => v.to_vb_string()?,
                };
                Err(EvalError::Raised {
                    number,
                    origin,
                    description,
                })
            }
            _ => Err(EvalError::NotSupported(format!("Err.{}", name))),
        }
    }

    fn set_property(&mut self, name: &str, _args: &[Value], value: Value) -> Result<(), EvalError> {
        let mut state = self.state.borrow_mut();
        match name.to_ascii_uppercase().as_str() {
            "" | "NUMBER" => state.number = value.to_i64()?,
            "DESCRIPTION" => state.description = value.to_vb_string()?,
            "SOURCE" => state.source = value.to_vb_string()?,
            _ => return Err(EvalError::NotSupported(format!("Err.{}", name))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_carries_number_and_text() {
        let mut err = ErrObject::new(Rc::new(RefCell::new(ErrState::default())));
        let raised = err
            .call_method("Raise", &[Value::Integer(1234), Value::str("app"), Value::str("boom")])
            .unwrap_err();
        assert_eq!(raised.number(), 1234);
        assert_eq!(raised.source_name(), "app");
        assert_eq!(raised.description(), "boom");
    }

    #[test]
    fn test_number_is_default_member_and_clear_resets() {
        let state = Rc::new(RefCell::new(ErrState::default()));
        let mut err = ErrObject::new(Rc::clone(&state));
        err.set_property("Number", &[], Value::Integer(5)).unwrap();
        assert!(matches!(err.get_property("", &[]).unwrap(), Value::Integer(5)));
        err.call_method("clear", &[]).unwrap();
        assert!(!state.borrow().is_set());
    }
}
