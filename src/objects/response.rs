//! `Response`: output buffer, status line, headers and cookies.

use crate::eval::EvalError;
use crate::extension::{arg, arg_str, check_args, ExtensionObject};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Everything a page run produces besides side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseState {
    pub body: String,
    /// Full status line, e.g. `404 Not Found`
    pub status: String,
    pub content_type: String,
    pub charset: Option<String>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub buffer: bool,
    /// Minutes until the page expires
    pub expires: Option<i64>,
    pub cache_control: Option<String>,
    pub redirect: Option<String>,
}

impl Default for ResponseState {
    fn default() -> Self {
        ResponseState {
            body: String::new(),
            status: "200 OK".to_string(),
            content_type: "text/html".to_string(),
            charset: None,
            headers: Vec::new(),
            cookies: Vec::new(),
            buffer: true,
            expires: None,
            cache_control: None,
            redirect: None,
        }
    }
}

impl ResponseState {
    /// Numeric part of the status line.
    pub fn status_code(&self) -> u16 {
        self.status
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_cookie(&mut self, name: &str, value: String) {
        match self.cookies.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name.to_string(), value)),
        }
    }
}

pub struct ResponseObject {
    state: Rc<RefCell<ResponseState>>,
}

impl ResponseObject {
    pub fn new(state: Rc<RefCell<ResponseState>>) -> Self {
        ResponseObject { state }
    }
}

impl ExtensionObject for ResponseObject {
    fn type_name(&self) -> &str {
        "Response"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let mut state = self.state.borrow_mut();
        match name.to_ascii_uppercase().as_str() {
            "WRITE" | "BINARYWRITE" => {
                check_args(name, args, 1, 1)?;
                let text = match &args[0] {
                    Value::Array(_) => return Err(EvalError::TypeMismatch(name.to_string())),
                    v => v.to_string(),
                };
                state.body.push_str(&text);
                Ok(Value::Empty)
            }
            "END" => Err(EvalError::ResponseEnd),
            "REDIRECT" => {
                check_args(name, args, 1, 1)?;
                let url = arg_str(args, 0);
                state.status = "302 Object moved".to_string();
                state.headers.push(("Location".to_string(), url.clone()));
                state.redirect = Some(url);
                Err(EvalError::ResponseEnd)
            }
            "CLEAR" => {
                state.body.clear();
                Ok(Value::Empty)
            }
            "FLUSH" => Ok(Value::Empty),
            "ADDHEADER" => {
                check_args(name, args, 2, 2)?;
                state.headers.push((arg_str(args, 0), arg_str(args, 1)));
                Ok(Value::Empty)
            }
            "APPENDTOLOG" => {
                check_args(name, args, 1, 1)?;
                tracing::info!(target: "aspvbs::response", "{}", arg_str(args, 0));
                Ok(Value::Empty)
            }
            "CONTENTTYPE" => Ok(Value::str(state.content_type.clone())),
            "STATUS" => Ok(Value::str(state.status.clone())),
            "CHARSET" => Ok(Value::str(state.charset.clone().unwrap_or_default())),
            "BUFFER" => Ok(Value::Boolean(state.buffer)),
            "EXPIRES" => Ok(state.expires.map(Value::Integer).unwrap_or_default()),
            "CACHECONTROL" => Ok(Value::str(state.cache_control.clone().unwrap_or_default())),
            "COOKIES" => {
                check_args(name, args, 1, 1)?;
                let key = arg_str(args, 0);
                Ok(Value::str(state.cookie(&key).unwrap_or_default()))
            }
            _ => Err(EvalError::NotSupported(format!("Response.{}", name))),
        }
    }

    fn set_property(&mut self, name: &str, args: &[Value], value: Value) -> Result<(), EvalError> {
        let mut state = self.state.borrow_mut();
        match name.to_ascii_uppercase().as_str() {
            "CONTENTTYPE" => state.content_type = value.to_vb_string()?,
            "STATUS" => state.status = value.to_vb_string()?,
            "CHARSET" => state.charset = Some(value.to_vb_string()?),
            "BUFFER" => state.buffer = value.to_bool()?,
            "EXPIRES" => state.expires = Some(value.to_i64()?),
            "CACHECONTROL" => state.cache_control = Some(value.to_vb_string()?),
            "COOKIES" => {
                check_args(name, args, 1, 1)?;
                let key = arg(args, 0).to_vb_string()?;
                state.set_cookie(&key, value.to_vb_string()?);
            }
            _ => return Err(EvalError::NotSupported(format!("Response.{}", name))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> (ResponseObject, Rc<RefCell<ResponseState>>) {
        let state = Rc::new(RefCell::new(ResponseState::default()));
        (ResponseObject::new(Rc::clone(&state)), state)
    }

    #[test]
    fn test_write_and_clear() {
        let (mut r, state) = response();
        r.call_method("Write", &[Value::str("a")]).unwrap();
        r.call_method("write", &[Value::Integer(1)]).unwrap();
        assert_eq!(state.borrow().body, "a1");
        r.call_method("Clear", &[]).unwrap();
        assert_eq!(state.borrow().body, "");
    }

    #[test]
    fn test_redirect_sets_location_and_ends() {
        let (mut r, state) = response();
        let err = r.call_method("Redirect", &[Value::str("/login.asp")]).unwrap_err();
        assert!(matches!(err, EvalError::ResponseEnd));
        let state = state.borrow();
        assert_eq!(state.status_code(), 302);
        assert_eq!(state.redirect.as_deref(), Some("/login.asp"));
        assert!(state.headers.contains(&("Location".to_string(), "/login.asp".to_string())));
    }

    #[test]
    fn test_properties_and_cookies() {
        let (mut r, state) = response();
        r.set_property("ContentType", &[], Value::str("application/json")).unwrap();
        r.set_property("Cookies", &[Value::str("user")], Value::str("ann")).unwrap();
        r.set_property("Cookies", &[Value::str("USER")], Value::str("bob")).unwrap();
        assert_eq!(state.borrow().content_type, "application/json");
        assert_eq!(state.borrow().cookies.len(), 1);
        let v = r.get_property("Cookies", &[Value::str("user")]).unwrap();
        assert_eq!(v.to_string(), "bob");
    }
}
