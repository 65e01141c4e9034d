//! `Request`: the incoming request's collections.

use crate::eval::EvalError;
use crate::extension::{arg, check_args, ExtensionObject, ObjectRef};
use crate::value::Value;
use std::rc::Rc;

/// Ordered multi-map with case-insensitive keys. A key given twice keeps
/// both values; reading it joins them with `", "`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestCollection {
    entries: Vec<(String, Vec<String>)>,
}

fn form_decode(text: &str) -> String {
    let spaced = text.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

impl RequestCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut collection = Self::new();
        for (k, v) in pairs {
            collection.append(k.into(), v.into());
        }
        collection
    }

    /// `a=1&b=x+y` style text.
    pub fn parse_urlencoded(raw: &str) -> Self {
        let pairs = raw
            .trim_start_matches('?')
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((k, v)) => (form_decode(k), form_decode(v)),
                None => (form_decode(part), String::new()),
            });
        Self::from_pairs(pairs)
    }

    /// A `Cookie:` header value.
    pub fn parse_cookies(header: &str) -> Self {
        let pairs = header.split(';').filter_map(|part| {
            let (k, v) = part.trim().split_once('=')?;
            Some((k.trim().to_string(), form_decode(v.trim())))
        });
        Self::from_pairs(pairs)
    }

    pub fn append(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, values)| values.join(", "))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Re-encoded `k=v&...` form, as `Request.Form` without arguments returns it.
    pub fn to_urlencoded(&self) -> String {
        let mut parts = Vec::new();
        for (k, values) in &self.entries {
            for v in values {
                parts.push(format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)));
            }
        }
        parts.join("&")
    }
}

/// What the host knows about the request.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub method: String,
    /// Virtual path of the page, e.g. `/shop/cart.asp`
    pub script_name: String,
    pub query_string: String,
    pub form: RequestCollection,
    pub cookies: RequestCollection,
    pub headers: Vec<(String, String)>,
    pub remote_addr: String,
    pub server_name: String,
    pub body: Vec<u8>,
}

impl RequestData {
    fn server_variables(&self) -> RequestCollection {
        let mut vars = RequestCollection::new();
        let mut put = |k: &str, v: String| vars.append(k.to_string(), v);
        put("REQUEST_METHOD", self.method.clone());
        put("QUERY_STRING", self.query_string.clone());
        put("SCRIPT_NAME", self.script_name.clone());
        put("PATH_INFO", self.script_name.clone());
        put("URL", self.script_name.clone());
        put("REMOTE_ADDR", self.remote_addr.clone());
        put("REMOTE_HOST", self.remote_addr.clone());
        put("SERVER_NAME", self.server_name.clone());
        put("CONTENT_LENGTH", self.body.len().to_string());
        let content_type = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        put("CONTENT_TYPE", content_type);
        for (name, value) in &self.headers {
            let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            put(&key, value.clone());
        }
        vars
    }
}

/// One collection exposed to scripts (`Request.QueryString` etc.).
pub struct CollectionObject {
    name: &'static str,
    items: Rc<RequestCollection>,
    /// Raw text returned when the collection is read without a key
    raw: String,
}

impl ExtensionObject for CollectionObject {
    fn type_name(&self) -> &str {
        self.name
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "" | "ITEM" if args.is_empty() => Ok(Value::str(self.raw.clone())),
            "" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                Ok(lookup(&self.items, &args[0])?)
            }
            "COUNT" => Ok(Value::Integer(self.items.len() as i64)),
            "KEY" => {
                check_args(name, args, 1, 1)?;
                let index = arg(args, 0).to_i64()?;
                usize::try_from(index - 1)
                    .ok()
                    .and_then(|i| self.items.keys().nth(i))
                    .map(Value::str)
                    .ok_or(EvalError::SubscriptOutOfRange)
            }
            _ => Err(EvalError::NotSupported(format!("{}.{}", self.name, name))),
        }
    }

    fn enumerate(&self) -> Option<Vec<Value>> {
        Some(self.items.keys().map(Value::str).collect())
    }
}

/// Missing keys read as Empty.
fn lookup(items: &RequestCollection, key: &Value) -> Result<Value, EvalError> {
    if let Value::Integer(i) = key {
        let found = usize::try_from(i - 1)
            .ok()
            .and_then(|i| items.entries.get(i))
            .map(|(_, values)| Value::String(values.join(", ")));
        return Ok(found.unwrap_or_default());
    }
    Ok(items
        .get(&key.to_vb_string()?)
        .map(Value::String)
        .unwrap_or_default())
}

pub struct RequestObject {
    data: RequestData,
    query: Rc<RequestCollection>,
    form: Rc<RequestCollection>,
    cookies: Rc<RequestCollection>,
    server_variables: Rc<RequestCollection>,
    /// Bytes already consumed by `BinaryRead`
    read_offset: usize,
}

impl RequestObject {
    pub fn new(data: RequestData) -> Self {
        RequestObject {
            query: Rc::new(RequestCollection::parse_urlencoded(&data.query_string)),
            form: Rc::new(data.form.clone()),
            cookies: Rc::new(data.cookies.clone()),
            server_variables: Rc::new(data.server_variables()),
            data,
            read_offset: 0,
        }
    }

    fn collection(&self, upper: &str) -> Option<(&'static str, &Rc<RequestCollection>, String)> {
        match upper {
            "QUERYSTRING" => Some(("QueryString", &self.query, self.data.query_string.clone())),
            "FORM" => Some(("Form", &self.form, self.form.to_urlencoded())),
            "COOKIES" => Some(("Cookies", &self.cookies, String::new())),
            "SERVERVARIABLES" => Some(("ServerVariables", &self.server_variables, String::new())),
            _ => None,
        }
    }
}

impl ExtensionObject for RequestObject {
    fn type_name(&self) -> &str {
        "Request"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let upper = name.to_ascii_uppercase();
        if let Some((label, items, raw)) = self.collection(&upper) {
            if args.is_empty() {
                let object = CollectionObject {
                    name: label,
                    items: Rc::clone(items),
                    raw,
                };
                return Ok(Value::Object(ObjectRef::native(object)));
            }
            check_args(name, args, 1, 1)?;
            return lookup(items, &args[0]);
        }
        match upper.as_str() {
            "" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                let key = arg(args, 0).to_vb_string()?;
                let found = [&self.query, &self.form, &self.cookies, &self.server_variables]
                    .into_iter()
                    .find_map(|c| c.get(&key));
                Ok(found.map(Value::String).unwrap_or_default())
            }
            "TOTALBYTES" => Ok(Value::Integer(self.data.body.len() as i64)),
            "BINARYREAD" => {
                check_args(name, args, 1, 1)?;
                let count = usize::try_from(arg(args, 0).to_i64()?).unwrap_or(0);
                let end = (self.read_offset + count).min(self.data.body.len());
                let chunk: String = self.data.body[self.read_offset..end]
                    .iter()
                    .map(|&b| b as char)
                    .collect();
                self.read_offset = end;
                Ok(Value::String(chunk))
            }
            _ => Err(EvalError::NotSupported(format!("Request.{}", name))),
        }
    }
}
