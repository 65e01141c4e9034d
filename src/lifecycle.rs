//! global.asa: application and session event handlers.
//!
//! Only the bodies of `<script runat="server">` elements are used; anything
//! else in the file is ignored. Handlers run in whatever engine the host
//! passes to [`GlobalAsa::invoke`], so they see that engine's `Session`,
//! `Application` and `Server` objects.

use crate::ast::{Program, StatementKind};
use crate::eval::{Engine, EvalError};
use crate::page::PageError;
use std::path::Path;

pub const APPLICATION_ON_START: &str = "Application_OnStart";
pub const APPLICATION_ON_END: &str = "Application_OnEnd";
pub const SESSION_ON_START: &str = "Session_OnStart";
pub const SESSION_ON_END: &str = "Session_OnEnd";

#[derive(Debug, Default)]
pub struct GlobalAsa {
    program: Option<Program>,
    hooks: Vec<String>,
}

/// Bodies of `<script ... runat="server">` elements, in order.
pub fn server_scripts(text: &str) -> Vec<String> {
    let lower = text.to_ascii_lowercase();
    let mut bodies = Vec::new();
    let mut pos = 0;
    while let Some(rel) = lower[pos..].find("<script") {
        let tag_start = pos + rel;
        let Some(tag_len) = lower[tag_start..].find('>') else {
            break;
        };
        let tag = &lower[tag_start..tag_start + tag_len];
        let body_start = tag_start + tag_len + 1;
        let Some(body_len) = lower[body_start..].find("</script") else {
            break;
        };
        let compact: String = tag.chars().filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'').collect();
        if compact.contains("runat=server") {
            bodies.push(text[body_start..body_start + body_len].to_string());
        }
        pos = body_start + body_len;
    }
    bodies
}

impl GlobalAsa {
    /// No handlers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_source(text: &str) -> Result<Self, PageError> {
        let script = server_scripts(text).join("\n");
        let program = crate::parser::parse(&script)?;
        let hooks = program
            .body
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StatementKind::Sub(decl) | StatementKind::Function(decl) => Some(decl.name.clone()),
                _ => None,
            })
            .collect();
        Ok(GlobalAsa {
            program: Some(program),
            hooks,
        })
    }

    /// Load `path`; a missing file means no handlers.
    pub fn load(path: &Path) -> Result<Self, PageError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let asa = Self::from_source(&crate::page::decode_text(&bytes))?;
                tracing::info!(path = %path.display(), hooks = ?asa.hooks, "loaded global.asa");
                Ok(asa)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(source) => Err(PageError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.iter().any(|h| h.eq_ignore_ascii_case(name))
    }

    /// Define the global.asa procedures in `engine` and call `hook`.
    /// Returns false when there is no such handler.
    pub fn invoke(&self, hook: &str, engine: &mut Engine) -> Result<bool, EvalError> {
        let Some(program) = self.program.as_ref().filter(|_| self.has_hook(hook)) else {
            return Ok(false);
        };
        tracing::debug!(hook, "running lifecycle handler");
        engine.run(program)?;
        engine.call_hook(hook).map_err(|e| {
            tracing::error!(hook, error = %e, "lifecycle handler failed");
            e
        })?;
        Ok(true)
    }
}
