//! Parsed-page cache shared by all request threads.
//!
//! Entries are keyed by page path and validated by a SHA-256 hash of the
//! page text after includes, so editing a page or any of its includes
//! invalidates the entry.

use crate::ast::Program;
use crate::page::{Page, PageError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// A page ready to run: the program plus the line map for error reports.
#[derive(Debug)]
pub struct CompiledPage {
    pub page: Page,
    pub program: Program,
}

struct Entry {
    hash: [u8; 32],
    compiled: Arc<CompiledPage>,
}

pub struct ParseCache {
    enabled: bool,
    entries: RwLock<HashMap<PathBuf, Entry>>,
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(true)
    }
}

pub fn content_hash(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

impl ParseCache {
    pub fn new(enabled: bool) -> Self {
        ParseCache {
            enabled,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Compiled form of `text` (the included page text for `path`),
    /// reusing a cached parse when the content hash matches.
    pub fn get_or_compile(&self, path: &Path, text: &str) -> Result<Arc<CompiledPage>, PageError> {
        if !self.enabled {
            return compile(text).map(Arc::new);
        }
        let hash = content_hash(text);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = entries.get(path).filter(|e| e.hash == hash) {
                tracing::debug!(page = %path.display(), "parse cache hit");
                return Ok(Arc::clone(&entry.compiled));
            }
        }
        tracing::debug!(page = %path.display(), "parse cache miss");
        let compiled = Arc::new(compile(text)?);
        self.entries.write().unwrap_or_else(|e| e.into_inner()).insert(
            path.to_path_buf(),
            Entry {
                hash,
                compiled: Arc::clone(&compiled),
            },
        );
        Ok(compiled)
    }

    /// Read the page at `path`, expand includes and compile it.
    pub fn load(&self, path: &Path, root: &Path) -> Result<Arc<CompiledPage>, PageError> {
        let text = std::fs::read(path).map_err(|source| PageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = crate::page::decode_text(&text);
        let text = crate::page::resolve_includes(&text, path, root, &mut Vec::new())?;
        self.get_or_compile(path, &text)
    }
}

fn compile(text: &str) -> Result<CompiledPage, PageError> {
    let page = crate::page::assemble(&crate::page::scan(text))?;
    let program = page.parse().map_err(|e| {
        tracing::warn!(line = e.line, code = e.code.number(), "page failed to parse");
        e
    })?;
    Ok(CompiledPage { page, program })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_reuses_program() {
        let cache = ParseCache::new(true);
        let path = Path::new("/virtual/a.asp");
        let first = cache.get_or_compile(path, "<% x = 1 %>").unwrap();
        let second = cache.get_or_compile(path, "<% x = 1 %>").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_changed_content_recompiles() {
        let cache = ParseCache::new(true);
        let path = Path::new("/virtual/a.asp");
        let first = cache.get_or_compile(path, "<% x = 1 %>").unwrap();
        let second = cache.get_or_compile(path, "<% x = 2 %>").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ParseCache::new(false);
        cache.get_or_compile(Path::new("a.asp"), "hi").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_syntax_error_not_cached() {
        let cache = ParseCache::new(true);
        let err = cache.get_or_compile(Path::new("bad.asp"), "<% If Then %>").unwrap_err();
        assert!(matches!(err, PageError::Syntax(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(ParseCache::new(true));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.get_or_compile(Path::new("p.asp"), "<%= 1 + 1 %>").unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
