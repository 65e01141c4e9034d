//! Common test utilities for aspvbs integration tests

#![allow(dead_code)]

pub use aspvbs::host::{Host, PageRequest, PageResponse};
pub use aspvbs::{Engine, RunState};

use aspvbs::config::Config;
use std::path::Path;
use std::time::Duration;

/// Run a script and return its output, or the error text.
pub fn run(source: &str) -> Result<String, String> {
    let mut engine = Engine::new();
    engine.set_timeout(Some(Duration::from_secs(10)));
    engine.run_source(source).map_err(|e| e.to_string())?;
    Ok(engine.take_output())
}

/// Runtime error number a script stops with (0 if it completes).
pub fn error_number(source: &str) -> i64 {
    let mut engine = Engine::new();
    engine.set_timeout(Some(Duration::from_secs(10)));
    match engine.run_source(source) {
        Ok(()) => 0,
        Err(aspvbs::ScriptError::Runtime { number, .. }) => number,
        Err(aspvbs::ScriptError::Syntax(e)) => e.code.number() as i64,
    }
}

/// Write `files` (relative path, contents) under `root`.
pub fn write_site(root: &Path, files: &[(&str, &str)]) {
    for (name, contents) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
}

/// A host serving `root` with in-memory sessions.
pub fn host_for(root: &Path) -> Host {
    let config = Config {
        web_root: root.to_path_buf(),
        script_timeout_secs: 10,
        ..Config::default()
    };
    Host::new(config).unwrap()
}

/// The `ASPSESSIONID` cookie a response issued, as a `Cookie:` header value.
pub fn session_cookie(response: &PageResponse) -> Option<String> {
    response
        .headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("Set-Cookie"))
        .find(|(_, v)| v.starts_with("ASPSESSIONID="))
        .and_then(|(_, v)| v.split(';').next())
        .map(str::to_string)
}
