//! `JSON`: parse to Dictionary/array trees and back.

use super::dictionary::DictionaryObject;
use crate::eval::EvalError;
use crate::extension::{arg, arg_str, check_args, ExtensionObject, ObjectRef};
use crate::value::Value;
use serde_json::Value as JsonValue;

pub struct JsonObject;

/// Objects become Dictionaries, arrays become 0-based arrays, `null` is Null.
pub fn json_to_value(json: JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        JsonValue::String(s) => Value::String(s),
        JsonValue::Array(items) => Value::from(items.into_iter().map(json_to_value).collect::<Vec<_>>()),
        JsonValue::Object(map) => {
            let dict = DictionaryObject::from_entries(map.into_iter().map(|(k, v)| (k, json_to_value(v))));
            Value::Object(ObjectRef::native(dict))
        }
    }
}

/// Dictionaries (and other keyed objects) become JSON objects; class
/// instances and opaque objects are not serializable.
pub fn value_to_json(value: &Value) -> Result<JsonValue, EvalError> {
    Ok(match value {
        Value::Empty | Value::Null | Value::Nothing => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Date(_) => JsonValue::String(value.to_string()),
        Value::Array(array) => JsonValue::Array(
            array
                .values()
                .iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(obj) => match obj.entries() {
            Some(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    map.insert(k, value_to_json(&v)?);
                }
                JsonValue::Object(map)
            }
            None => return Err(EvalError::TypeMismatch(format!("{} is not serializable", obj.type_name()))),
        },
    })
}

pub fn parse(text: &str) -> Result<Value, EvalError> {
    serde_json::from_str::<JsonValue>(text)
        .map(json_to_value)
        .map_err(|e| EvalError::InvalidProcedureCall(format!("JSON.Parse: {}", e)))
}

impl ExtensionObject for JsonObject {
    fn type_name(&self) -> &str {
        "JSON"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "PARSE" => {
                check_args(name, args, 1, 1)?;
                parse(&arg_str(args, 0))
            }
            "STRINGIFY" => {
                check_args(name, args, 1, 2)?;
                let json = value_to_json(&args[0])?;
                let pretty = !arg(args, 1).is_empty() && arg(args, 1).to_bool()?;
                let text = if pretty {
                    serde_json::to_string_pretty(&json)
                } else {
                    serde_json::to_string(&json)
                };
                text.map(Value::String)
                    .map_err(|e| EvalError::InvalidProcedureCall(format!("JSON.Stringify: {}", e)))
            }
            "NEWOBJECT" => Ok(Value::Object(ObjectRef::native(DictionaryObject::new()))),
            "NEWARRAY" => Ok(Value::from(Vec::new())),
            "LOADFILE" => {
                check_args(name, args, 1, 1)?;
                let text = std::fs::read_to_string(arg_str(args, 0))?;
                parse(&text)
            }
            _ => Err(EvalError::NotSupported(format!("JSON.{}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_tree() {
        let v = parse(r#"{"name":"ann","tags":["a","b"],"age":30,"x":null}"#).unwrap();
        let Value::Object(obj) = v else { panic!("expected object") };
        assert_eq!(obj.type_name(), "Dictionary");
        assert_eq!(obj.get_property("", &[Value::str("name")]).unwrap().to_string(), "ann");
        let Value::Array(tags) = obj.get_property("", &[Value::str("tags")]).unwrap() else {
            panic!("expected array")
        };
        assert_eq!(tags.len(), 2);
        assert!(obj.get_property("", &[Value::str("x")]).unwrap().is_null());
    }

    #[test]
    fn test_stringify_dictionary() {
        let mut json = JsonObject;
        let mut dict = DictionaryObject::new();
        dict.insert(Value::str("a"), Value::Integer(1));
        dict.insert(Value::str("b"), Value::from(vec![Value::Boolean(true), Value::Null]));
        let v = Value::Object(ObjectRef::native(dict));
        let text = json.call_method("Stringify", &[v]).unwrap().to_string();
        assert_eq!(text, r#"{"a":1,"b":[true,null]}"#);
    }

    #[test]
    fn test_parse_failure_is_runtime_error() {
        assert_eq!(parse("{oops").unwrap_err().number(), 5);
    }
}
