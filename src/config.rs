//! Runtime configuration (aspvbs.toml)
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration. Environment variables are applied on top of the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "aspvbs.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: '{value}'")]
    Env { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory pages are served from
    pub web_root: PathBuf,

    /// Page used when a request names a directory
    pub default_page: String,

    /// Per-run time limit; 0 disables it
    pub script_timeout_secs: u64,

    /// Maximum procedure nesting before "Out of stack space"
    pub max_call_depth: usize,

    pub session_timeout_minutes: i64,

    /// File-backed sessions when set, in-memory otherwise
    pub session_dir: Option<PathBuf>,

    pub parse_cache: bool,

    /// Fallback `tracing` filter when RUST_LOG is unset
    pub log_filter: String,

    /// Lifecycle script, relative to `web_root`
    pub global_asa: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            web_root: PathBuf::from("."),
            default_page: "default.asp".to_string(),
            script_timeout_secs: 30,
            max_call_depth: 1000,
            session_timeout_minutes: 20,
            session_dir: None,
            parse_cache: true,
            log_filter: "info".to_string(),
            global_asa: "global.asa".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the config path (explicit, then `ASPVBS_CONFIG`, then
    /// `aspvbs.toml`), load it and apply environment overrides.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ASPVBS_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load(&path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `ASPVBS_TIMEOUT`, `ASPVBS_MAX_RECURSION` and `ASPVBS_WEB_ROOT`
    /// as looked up by `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn number<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { name, value })
        }
        if let Some(v) = var("ASPVBS_TIMEOUT") {
            self.script_timeout_secs = number("ASPVBS_TIMEOUT", v)?;
        }
        if let Some(v) = var("ASPVBS_MAX_RECURSION") {
            self.max_call_depth = number("ASPVBS_MAX_RECURSION", v)?;
        }
        if let Some(v) = var("ASPVBS_WEB_ROOT") {
            self.web_root = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        match self.script_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn global_asa_path(&self) -> PathBuf {
        self.web_root.join(&self.global_asa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.script_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml("web_root = \"site\"\nscript_timeout_secs = 0\nsession_dir = \"/tmp/s\"").unwrap();
        assert_eq!(config.web_root, PathBuf::from("site"));
        assert_eq!(config.script_timeout(), None);
        assert_eq!(config.session_dir, Some(PathBuf::from("/tmp/s")));
        assert_eq!(config.default_page, "default.asp");
        assert_eq!(config.max_call_depth, 1000);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aspvbs.toml");
        std::fs::write(&path, "script_timeout_secs = \"soon\"").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(|name| match name {
                "ASPVBS_TIMEOUT" => Some("5".into()),
                "ASPVBS_WEB_ROOT" => Some("/srv/www".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.script_timeout_secs, 5);
        assert_eq!(config.web_root, PathBuf::from("/srv/www"));
        assert_eq!(config.max_call_depth, 1000);

        let err = config
            .apply_env(|name| (name == "ASPVBS_MAX_RECURSION").then(|| "deep".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "ASPVBS_MAX_RECURSION", .. }));
    }
}
