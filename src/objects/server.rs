//! `Server`: object creation, path mapping, encoding and the script timeout.

use super::{html_escape, ObjectRegistry};
use crate::eval::{Deadline, ErrState, EvalError};
use crate::extension::{arg, arg_str, check_args, ExtensionObject, ObjectRef};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub struct ServerObject {
    registry: Rc<ObjectRegistry>,
    deadline: Rc<Cell<Deadline>>,
    err: Rc<RefCell<ErrState>>,
    /// Web root; `/x` maps below it
    root: PathBuf,
    /// Directory of the running page; `x` maps below it
    page_dir: PathBuf,
}

impl ServerObject {
    pub fn new(
        registry: Rc<ObjectRegistry>,
        deadline: Rc<Cell<Deadline>>,
        err: Rc<RefCell<ErrState>>,
        root: PathBuf,
    ) -> Self {
        ServerObject {
            registry,
            deadline,
            err,
            page_dir: root.clone(),
            root,
        }
    }

    pub fn with_page_dir(mut self, dir: PathBuf) -> Self {
        self.page_dir = dir;
        self
    }

    /// `Server.MapPath`. `..` components may not climb above the web root.
    pub fn map_path(&self, virtual_path: &str) -> PathBuf {
        let normalized = virtual_path.replace('\\', "/");
        let (base, rest) = match normalized.strip_prefix('/') {
            Some(rest) => (&self.root, rest.to_string()),
            None => (&self.page_dir, normalized),
        };
        let mut out = base.clone();
        for component in Path::new(&rest).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::ParentDir => {
                    if out.starts_with(&self.root) && out != self.root {
                        out.pop();
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// `Server.URLEncode`: form encoding, spaces as `+`.
pub fn url_encode(text: &str) -> String {
    urlencoding::encode(text).replace("%20", "+")
}

impl ExtensionObject for ServerObject {
    fn type_name(&self) -> &str {
        "Server"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "CREATEOBJECT" => {
                check_args(name, args, 1, 1)?;
                self.registry
                    .create(&arg(args, 0).to_vb_string()?)
                    .map(Value::Object)
            }
            "MAPPATH" => {
                check_args(name, args, 1, 1)?;
                let mapped = self.map_path(&arg_str(args, 0));
                Ok(Value::str(mapped.to_string_lossy()))
            }
            "HTMLENCODE" => {
                check_args(name, args, 1, 1)?;
                Ok(Value::str(html_escape(&arg_str(args, 0))))
            }
            "URLENCODE" => {
                check_args(name, args, 1, 1)?;
                Ok(Value::str(url_encode(&arg_str(args, 0))))
            }
            "SCRIPTTIMEOUT" => {
                let secs = self.deadline.get().timeout().map(|t| t.as_secs() as i64);
                Ok(secs.map(Value::Integer).unwrap_or(Value::Integer(0)))
            }
            "GETLASTERROR" => {
                let snapshot = self.err.borrow().clone();
                Ok(Value::Object(ObjectRef::native(AspError(snapshot))))
            }
            _ => Err(EvalError::NotSupported(format!("Server.{}", name))),
        }
    }

    fn set_property(&mut self, name: &str, _args: &[Value], value: Value) -> Result<(), EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "SCRIPTTIMEOUT" => {
                let secs = value.to_i64()?;
                let timeout = (secs > 0).then(|| Duration::from_secs(secs as u64));
                self.deadline.set(self.deadline.get().with_timeout(timeout));
                tracing::debug!(secs, "script timeout changed");
                Ok(())
            }
            _ => Err(EvalError::NotSupported(format!("Server.{}", name))),
        }
    }
}

/// Snapshot returned by `Server.GetLastError`.
struct AspError(ErrState);

impl ExtensionObject for AspError {
    fn type_name(&self) -> &str {
        "ASPError"
    }

    fn call_method(&mut self, name: &str, _args: &[Value]) -> Result<Value, EvalError> {
        let e = &self.0;
        Ok(match name.to_ascii_uppercase().as_str() {
            "NUMBER" | "ASPCODE" => Value::Integer(e.number),
            "DESCRIPTION" | "ASPDESCRIPTION" => Value::str(e.description.clone()),
            "SOURCE" => Value::str(e.source.clone()),
            "CATEGORY" => Value::str(e.source.clone()),
            "LINE" => Value::Integer(e.line as i64),
            "COLUMN" => Value::Integer(-1),
            "FILE" => Value::str(""),
            _ => return Err(EvalError::NotSupported(format!("ASPError.{}", name))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(root: &str) -> ServerObject {
        ServerObject::new(
            Rc::new(ObjectRegistry::with_defaults()),
            Rc::new(Cell::new(Deadline::new(None))),
            Rc::new(RefCell::new(ErrState::default())),
            PathBuf::from(root),
        )
    }

    #[test]
    fn test_map_path_stays_under_root() {
        let s = server("/srv/www").with_page_dir(PathBuf::from("/srv/www/admin"));
        assert_eq!(s.map_path("/img/a.png"), PathBuf::from("/srv/www/img/a.png"));
        assert_eq!(s.map_path("list.asp"), PathBuf::from("/srv/www/admin/list.asp"));
        assert_eq!(s.map_path("../../../etc/passwd"), PathBuf::from("/srv/www/etc/passwd"));
    }

    #[test]
    fn test_script_timeout_updates_deadline() {
        let mut s = server("/");
        s.set_property("ScriptTimeout", &[], Value::Integer(90)).unwrap();
        let v = s.get_property("scripttimeout", &[]).unwrap();
        assert!(matches!(v, Value::Integer(90)));
    }

    #[test]
    fn test_encoders() {
        let mut s = server("/");
        let v = s.call_method("URLEncode", &[Value::str("a b&c")]).unwrap();
        assert_eq!(v.to_string(), "a+b%26c");
        let v = s.call_method("HTMLEncode", &[Value::str("<b>")]).unwrap();
        assert_eq!(v.to_string(), "&lt;b&gt;");
    }
}
