//! `Scripting.Dictionary`.

use crate::ast::CompareMode;
use crate::eval::EvalError;
use crate::extension::{arg, check_args, ExtensionObject};
use crate::value::{compare_strings, values_equal, Value};
use std::cmp::Ordering;

#[derive(Debug, Default)]
pub struct DictionaryObject {
    /// Insertion order is iteration order
    entries: Vec<(Value, Value)>,
    compare_mode: CompareMode,
}

fn raised(number: i64, description: &str) -> EvalError {
    EvalError::Raised {
        number,
        origin: "Scripting.Dictionary".to_string(),
        description: description.to_string(),
    }
}

impl DictionaryObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from string-keyed pairs, e.g. a parsed JSON object.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        DictionaryObject {
            entries: entries.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            compare_mode: CompareMode::Binary,
        }
    }

    fn same_key(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::String(x), Value::String(y)) => {
                compare_strings(x, y, self.compare_mode) == Ordering::Equal
            }
            (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
            (Value::Object(_), _) | (_, Value::Object(_)) => false,
            (Value::String(_), _) | (_, Value::String(_)) => false,
            _ => values_equal(a, b, self.compare_mode).unwrap_or(false),
        }
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| self.same_key(k, key))
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExtensionObject for DictionaryObject {
    fn type_name(&self) -> &str {
        "Dictionary"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "ADD" => {
                check_args(name, args, 2, 2)?;
                if self.position(&args[0]).is_some() {
                    return Err(raised(457, "This key is already associated with an element of this collection"));
                }
                self.entries.push((args[0].clone(), args[1].clone()));
                Ok(Value::Empty)
            }
            "EXISTS" => {
                check_args(name, args, 1, 1)?;
                Ok(Value::Boolean(self.position(&args[0]).is_some()))
            }
            "" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                Ok(self.get(&args[0]).cloned().unwrap_or_default())
            }
            "REMOVE" => {
                check_args(name, args, 1, 1)?;
                match self.position(&args[0]) {
                    Some(i) => {
                        self.entries.remove(i);
                        Ok(Value::Empty)
                    }
                    None => Err(raised(32811, "Element not found")),
                }
            }
            "REMOVEALL" => {
                self.entries.clear();
                Ok(Value::Empty)
            }
            "KEYS" => Ok(Value::from(
                self.entries.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            )),
            "ITEMS" => Ok(Value::from(
                self.entries.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            )),
            "COUNT" => Ok(Value::Integer(self.entries.len() as i64)),
            "COMPAREMODE" => Ok(Value::Integer(match self.compare_mode {
                CompareMode::Binary => 0,
                CompareMode::Text => 1,
            })),
            _ => Err(EvalError::NotSupported(format!("Dictionary.{}", name))),
        }
    }

    fn set_property(&mut self, name: &str, args: &[Value], value: Value) -> Result<(), EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                self.insert(args[0].clone(), value);
                Ok(())
            }
            "KEY" => {
                check_args(name, args, 1, 1)?;
                if self.position(&value).is_some() {
                    return Err(raised(457, "This key is already associated with an element of this collection"));
                }
                let i = self
                    .position(&arg(args, 0))
                    .ok_or_else(|| raised(32811, "Element not found"))?;
                self.entries[i].0 = value;
                Ok(())
            }
            "COMPAREMODE" => {
                if !self.entries.is_empty() {
                    return Err(EvalError::InvalidProcedureCall("CompareMode".to_string()));
                }
                self.compare_mode = match value.to_i64()? {
                    0 => CompareMode::Binary,
                    _ => CompareMode::Text,
                };
                Ok(())
            }
            _ => Err(EvalError::NotSupported(format!("Dictionary.{}", name))),
        }
    }

    fn enumerate(&self) -> Option<Vec<Value>> {
        Some(self.entries.iter().map(|(k, _)| k.clone()).collect())
    }

    fn entries(&self) -> Option<Vec<(String, Value)>> {
        Some(
            self.entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::str(text)
    }

    #[test]
    fn test_add_exists_remove() {
        let mut d = DictionaryObject::new();
        d.call_method("Add", &[s("a"), Value::Integer(1)]).unwrap();
        d.call_method("add", &[s("b"), Value::Integer(2)]).unwrap();
        assert!(matches!(d.call_method("Exists", &[s("a")]).unwrap(), Value::Boolean(true)));
        assert!(matches!(d.call_method("Exists", &[s("A")]).unwrap(), Value::Boolean(false)));
        let dup = d.call_method("Add", &[s("a"), Value::Integer(3)]).unwrap_err();
        assert_eq!(dup.number(), 457);
        d.call_method("Remove", &[s("a")]).unwrap();
        assert_eq!(d.call_method("Remove", &[s("a")]).unwrap_err().number(), 32811);
        assert!(matches!(d.get_property("Count", &[]).unwrap(), Value::Integer(1)));
    }

    #[test]
    fn test_text_compare_mode() {
        let mut d = DictionaryObject::new();
        d.set_property("CompareMode", &[], Value::Integer(1)).unwrap();
        d.set_property("", &[s("Key")], s("v")).unwrap();
        assert_eq!(d.get_property("", &[s("KEY")]).unwrap().to_string(), "v");
        assert!(d.set_property("CompareMode", &[], Value::Integer(0)).is_err());
    }

    #[test]
    fn test_numeric_keys_and_rename() {
        let mut d = DictionaryObject::new();
        d.set_property("Item", &[Value::Integer(1)], s("one")).unwrap();
        assert_eq!(d.get_property("", &[Value::Float(1.0)]).unwrap().to_string(), "one");
        assert!(d.get_property("", &[s("1")]).unwrap().is_empty());
        d.set_property("Key", &[Value::Integer(1)], s("uno")).unwrap();
        let keys = d.enumerate().unwrap();
        assert_eq!(keys[0].to_string(), "uno");
    }
}
