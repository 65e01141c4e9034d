//! Native objects reachable from scripts.
//!
//! The web intrinsics (`Response`, `Request`, `Server`, `Session`,
//! `Application`, `Err`) are installed by the engine or the host. Everything
//! else is built on demand by [`ObjectRegistry`] for `CreateObject`.

pub mod application;
pub mod contents;
pub mod crypto;
pub mod dictionary;
pub mod err;
pub mod http;
pub mod json;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod template;

use crate::eval::EvalError;
use crate::extension::ObjectRef;
use std::collections::HashMap;
use std::path::PathBuf;

type Factory = Box<dyn Fn() -> ObjectRef>;

/// Case-insensitive ProgID → factory table behind `CreateObject`.
pub struct ObjectRegistry {
    factories: HashMap<String, Factory>,
}

impl ObjectRegistry {
    pub fn empty() -> Self {
        ObjectRegistry {
            factories: HashMap::new(),
        }
    }

    /// The stock objects, with file paths resolved against the working directory.
    pub fn with_defaults() -> Self {
        Self::with_root(std::env::current_dir().unwrap_or_default())
    }

    /// The stock objects, with file paths resolved against `root`.
    pub fn with_root(root: PathBuf) -> Self {
        let mut registry = Self::empty();
        registry.register("Scripting.Dictionary", || {
            ObjectRef::native(dictionary::DictionaryObject::new())
        });
        registry.register("JSON", || ObjectRef::native(json::JsonObject));
        registry.register("G3JSON", || ObjectRef::native(json::JsonObject));
        registry.register("CRYPTO", || ObjectRef::native(crypto::CryptoObject));
        registry.register("G3CRYPTO", || ObjectRef::native(crypto::CryptoObject));
        registry.register("HTTP", || ObjectRef::native(http::HttpObject::new()));
        registry.register("G3HTTP", || ObjectRef::native(http::HttpObject::new()));
        let template_root = root.clone();
        registry.register("TEMPLATE", move || {
            ObjectRef::native(template::TemplateObject::new(template_root.clone()))
        });
        registry.register("G3TEMPLATE", move || {
            ObjectRef::native(template::TemplateObject::new(root.clone()))
        });
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, progid: &str, factory: impl Fn() -> ObjectRef + 'static) {
        self.factories
            .insert(progid.to_ascii_lowercase(), Box::new(factory));
    }

    pub fn contains(&self, progid: &str) -> bool {
        self.factories.contains_key(&progid.to_ascii_lowercase())
    }

    pub fn create(&self, progid: &str) -> Result<ObjectRef, EvalError> {
        match self.factories.get(&progid.to_ascii_lowercase()) {
            Some(factory) => {
                tracing::debug!(progid, "CreateObject");
                Ok(factory())
            }
            None => Err(EvalError::CannotCreateObject(progid.to_string())),
        }
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// HTML-escape the five special characters.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
