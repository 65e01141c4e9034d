//! `TEMPLATE`: `{{name}}` substitution from a Dictionary.
//!
//! `{{name}}` is HTML-escaped, `{{{name}}}` is inserted raw. Dotted names
//! walk nested Dictionaries. Unknown names render as nothing.

use super::html_escape;
use crate::eval::EvalError;
use crate::extension::{arg, arg_str, check_args, ExtensionObject};
use crate::value::Value;
use std::path::{Component, Path, PathBuf};

pub struct TemplateObject {
    root: PathBuf,
}

impl TemplateObject {
    pub fn new(root: PathBuf) -> Self {
        TemplateObject { root }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, EvalError> {
        let path = Path::new(relative.trim_start_matches(['/', '\\']));
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(EvalError::Raised {
                number: 70,
                origin: "TEMPLATE".to_string(),
                description: format!("Permission denied: '{}'", relative),
            });
        }
        Ok(self.root.join(path))
    }
}

fn lookup(data: &Value, path: &str) -> Value {
    let mut current = data.clone();
    for part in path.split('.') {
        let next = match &current {
            Value::Object(obj) => obj
                .entries()
                .and_then(|entries| entries.into_iter().find(|(k, _)| k.eq_ignore_ascii_case(part)))
                .map(|(_, v)| v),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Empty,
        }
    }
    current
}

pub fn render(text: &str, data: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let (raw, open, close) = if after.starts_with("{{{") {
            (true, 3, "}}}")
        } else {
            (false, 2, "}}")
        };
        let Some(end) = after[open..].find(close) else {
            out.push_str(after);
            return out;
        };
        let name = after[open..open + end].trim();
        let value = lookup(data, name).to_string();
        if raw {
            out.push_str(&value);
        } else {
            out.push_str(&html_escape(&value));
        }
        rest = &after[open + end + close.len()..];
    }
    out.push_str(rest);
    out
}

impl ExtensionObject for TemplateObject {
    fn type_name(&self) -> &str {
        "TEMPLATE"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "RENDER" => {
                check_args(name, args, 1, 2)?;
                Ok(Value::String(render(&arg_str(args, 0), &arg(args, 1))))
            }
            "RENDERFILE" => {
                check_args(name, args, 1, 2)?;
                let path = self.resolve(&arg_str(args, 0))?;
                let text = std::fs::read_to_string(&path)?;
                Ok(Value::String(render(&text, &arg(args, 1))))
            }
            _ => Err(EvalError::NotSupported(format!("TEMPLATE.{}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ObjectRef;
    use crate::objects::dictionary::DictionaryObject;

    fn data() -> Value {
        let mut inner = DictionaryObject::new();
        inner.insert(Value::str("city"), Value::str("Recife"));
        let mut d = DictionaryObject::new();
        d.insert(Value::str("name"), Value::str("<Ann>"));
        d.insert(Value::str("address"), Value::Object(ObjectRef::native(inner)));
        Value::Object(ObjectRef::native(d))
    }

    #[test]
    fn test_escaped_raw_and_nested() {
        let out = render("Hi {{ name }} / {{{name}}} from {{address.city}}{{missing}}!", &data());
        assert_eq!(out, "Hi &lt;Ann&gt; / <Ann> from Recife!");
    }

    #[test]
    fn test_unclosed_placeholder_is_literal() {
        assert_eq!(render("a {{b", &Value::Empty), "a {{b");
    }

    #[test]
    fn test_render_file_refuses_parent_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.html"), "<p>{{name}}</p>").unwrap();
        let mut t = TemplateObject::new(dir.path().to_path_buf());
        let out = t.call_method("RenderFile", &[Value::str("/t.html"), data()]).unwrap();
        assert_eq!(out.to_string(), "<p>&lt;Ann&gt;</p>");
        let err = t.call_method("RenderFile", &[Value::str("../x")]).unwrap_err();
        assert_eq!(err.number(), 70);
    }
}
