//! aspvbs - Classic ASP / VBScript runtime
//!
//! # Overview
//!
//! aspvbs runs VBScript programs and classic ASP pages. Source text goes
//! through a case-insensitive lexer and a recursive-descent parser into an
//! AST; the [`Engine`] walks that AST with late-bound, Variant-style
//! values.
//!
//! # Layers
//!
//! ```text
//! lexer  ->  parser  ->  ast  ->  eval::Engine
//!                                   |  Response / Request / Server / Session / Application / Err
//!                                   |  CreateObject: Scripting.Dictionary, JSON, CRYPTO, HTTP, TEMPLATE
//! page (includes, <% %> blocks)  ->  cache  ->  host (sessions, global.asa)
//! ```
//!
//! ## Scripts
//!
//! ```text
//! Dim total
//! For i = 1 To 3
//!     total = total + i
//! Next
//! Response.Write "total: " & total
//! ```
//!
//! ## Pages
//!
//! ```text
//! <%@ Language="VBScript" %>
//! <h1>Hello <%= Request.QueryString("name") %></h1>
//! <% If Session("visits") = "" Then Session("visits") = 0 %>
//! ```
//!
//! Pages are served by [`host::Host`], which owns the parse cache, the
//! session store and the Application state.
//!
//! # Example
//!
//! ```rust
//! use aspvbs::Engine;
//!
//! let mut engine = Engine::new();
//! engine.run_source(r#"Response.Write UCase("hi") & 1 + 2"#).unwrap();
//! assert_eq!(engine.output(), "HI3");
//! ```

pub mod ast;
pub mod cache;
pub mod config;
pub mod dates;
pub mod eval;
pub mod extension;
pub mod host;
pub mod lexer;
pub mod lifecycle;
pub mod objects;
pub mod page;
pub mod parser;
pub mod session_store;
pub mod syntax_error;
pub mod token;
pub mod value;
pub mod visitor;

// Re-export commonly used items
pub use ast::Program;
pub use eval::{Engine, EvalError, RunState, ScriptError};
pub use extension::{ExtensionObject, ObjectRef};
pub use parser::parse;
pub use syntax_error::{SyntaxError, SyntaxErrorCode};
pub use value::Value;

/// Convenience function: run a script and return what it wrote.
pub fn run(source: &str) -> Result<String, ScriptError> {
    let mut engine = Engine::new();
    engine.run_source(source)?;
    Ok(engine.take_output())
}
