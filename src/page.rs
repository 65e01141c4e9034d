//! Classic ASP pages.
//!
//! A page goes through three steps:
//!
//! 1. [`resolve_includes`] splices `<!--#include file="…"-->` and
//!    `<!--#include virtual="…"-->` directives into the text.
//! 2. [`scan`] splits the text into HTML, `<% code %>`, `<%= expr %>` and
//!    `<%@ directive %>` blocks.
//! 3. [`assemble`] turns the blocks into one VBScript program. HTML becomes
//!    `Response.Write` statements and output blocks become
//!    `Response.Write (expr)`.
//!
//! The assembled script keeps a map from its own lines back to page lines
//! so runtime and syntax errors point at the page.

use crate::ast::Program;
use crate::syntax_error::SyntaxError;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("circular include of '{0}'")]
    IncludeCycle(PathBuf),
    #[error("include path '{0}' leaves the web root")]
    IncludeOutsideRoot(String),
    #[error("unsupported script language '{0}'")]
    UnsupportedLanguage(String),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

/// A piece of page text. `line` is the page line the block starts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Html { text: String, line: usize },
    Code { text: String, line: usize },
    Output { text: String, line: usize },
    Directive { attributes: Vec<(String, String)>, line: usize },
}

impl Block {
    fn is_blank_html(&self) -> bool {
        matches!(self, Block::Html { text, .. } if text.trim().is_empty())
    }
}

/// An assembled page, ready to parse.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub script: String,
    /// `line_map[n]` is the page line of script line `n + 1`
    pub line_map: Vec<usize>,
    pub directives: Vec<(String, String)>,
}

impl Page {
    /// Page line for a script line; unknown lines map to themselves.
    pub fn page_line(&self, script_line: usize) -> usize {
        script_line
            .checked_sub(1)
            .and_then(|i| self.line_map.get(i))
            .copied()
            .unwrap_or(script_line)
    }

    /// Parse the script, reporting errors at page lines.
    pub fn parse(&self) -> Result<Program, SyntaxError> {
        crate::parser::parse(&self.script).map_err(|mut e| {
            e.line = self.page_line(e.line);
            e
        })
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Decode page bytes: UTF-8 (with or without BOM) or BOM-marked UTF-16.
pub fn decode_text(bytes: &[u8]) -> String {
    let utf16 = |body: &[u8], le: bool| {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| if le { u16::from_le_bytes([c[0], c[1]]) } else { u16::from_be_bytes([c[0], c[1]]) })
            .collect();
        String::from_utf16_lossy(&units)
    };
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => utf16(rest, true),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, false),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn read_page(path: &Path) -> Result<String, PageError> {
    std::fs::read(path)
        .map(|bytes| decode_text(&bytes))
        .map_err(|source| PageError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Read, include and assemble the page at `path`.
pub fn load(path: &Path, root: &Path) -> Result<Page, PageError> {
    let text = read_page(path)?;
    let text = resolve_includes(&text, path, root, &mut Vec::new())?;
    assemble(&scan(&text))
}

/// Find the next `<!--#include kind="target"-->` at or after `from`.
/// Returns (start, end, kind, target).
fn next_include(text: &str, from: usize) -> Option<(usize, usize, String, String)> {
    let mut pos = from;
    while let Some(rel) = text[pos..].find("<!--") {
        let start = pos + rel;
        let end = match text[start..].find("-->") {
            Some(e) => start + e + 3,
            None => return None,
        };
        let inner = text[start + 4..end - 3].trim();
        if let Some(rest) = inner.strip_prefix('#') {
            let rest = rest.trim_start();
            if rest.get(..7).is_some_and(|w| w.eq_ignore_ascii_case("include")) {
                let rest = rest[7..].trim_start();
                if let Some((kind, value)) = rest.split_once('=') {
                    let kind = kind.trim().to_ascii_lowercase();
                    let target = value.trim().trim_matches('"').to_string();
                    if kind == "file" || kind == "virtual" {
                        return Some((start, end, kind, target));
                    }
                }
            }
        }
        pos = end;
    }
    None
}

fn strip_metadata(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        let after = rest[start + 4..].trim_start();
        let is_meta = after.get(..8).is_some_and(|w| w.eq_ignore_ascii_case("METADATA"));
        let end = rest[start..].find("-->").map(|e| start + e + 3);
        match (is_meta, end) {
            (true, Some(end)) => {
                out.push_str(&rest[..start]);
                rest = &rest[end..];
            }
            (_, Some(end)) => {
                out.push_str(&rest[..end]);
                rest = &rest[end..];
            }
            (_, None) => break,
        }
    }
    out.push_str(rest);
    out
}

/// Expand server-side includes. `file=` is relative to the including
/// file, `virtual=` to the web root. `stack` holds the files currently
/// being expanded.
pub fn resolve_includes(
    text: &str,
    current: &Path,
    root: &Path,
    stack: &mut Vec<PathBuf>,
) -> Result<String, PageError> {
    let key = current.canonicalize().unwrap_or_else(|_| current.to_path_buf());
    if stack.contains(&key) {
        return Err(PageError::IncludeCycle(current.to_path_buf()));
    }
    let text = strip_metadata(text);
    stack.push(key);

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    while let Some((start, end, kind, target)) = next_include(&text, last) {
        out.push_str(&text[last..start]);
        let relative = Path::new(target.trim_start_matches(['/', '\\']));
        if kind == "virtual" && relative.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PageError::IncludeOutsideRoot(target));
        }
        let path = if kind == "virtual" {
            root.join(relative)
        } else {
            current.parent().unwrap_or(root).join(&target)
        };
        tracing::debug!(include = %path.display(), "including");
        let included = read_page(&path)?;
        let expanded = resolve_includes(&included, &path, root, stack)?;

        if text[..start].ends_with("%>") && !expanded.starts_with(['\r', '\n']) && !expanded.is_empty() {
            out.push('\n');
        }
        out.push_str(&expanded);
        if text[end..].starts_with("<%") && !expanded.ends_with(['\r', '\n']) && !expanded.is_empty() {
            out.push('\n');
        }
        last = end;
    }
    out.push_str(&text[last..]);
    stack.pop();
    Ok(out)
}

/// `Language="VBScript" CodePage=65001` style attribute lists.
fn parse_attributes(text: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            attrs.push((rest.to_string(), String::new()));
            break;
        };
        let name = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(close) => (&quoted[..close], &quoted[close + 1..]),
                None => (quoted, ""),
            },
            None => match after.find(char::is_whitespace) {
                Some(ws) => (&after[..ws], &after[ws..]),
                None => (after, ""),
            },
        };
        attrs.push((name, value.to_string()));
        rest = remaining.trim_start();
    }
    attrs
}

/// Split page text into blocks. An unterminated `<%` is kept as HTML.
pub fn scan(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut rest = text;
    let mut line = 1;
    while !rest.is_empty() {
        let Some(start) = rest.find("<%") else {
            blocks.push(Block::Html { text: rest.to_string(), line });
            break;
        };
        if start > 0 {
            let html = &rest[..start];
            blocks.push(Block::Html { text: html.to_string(), line });
            line += html.matches('\n').count();
        }
        let after = &rest[start + 2..];
        let Some(end) = after.find("%>") else {
            blocks.push(Block::Html { text: rest[start..].to_string(), line });
            break;
        };
        let inner = &after[..end];
        let block = if let Some(directive) = inner.strip_prefix('@') {
            Block::Directive { attributes: parse_attributes(directive), line }
        } else if let Some(expr) = inner.strip_prefix('=') {
            Block::Output { text: expr.trim().to_string(), line }
        } else {
            Block::Code { text: inner.to_string(), line }
        };
        blocks.push(block);
        line += inner.matches('\n').count();
        rest = &after[end + 2..];
    }
    blocks
}

/// `Response.Write "a" & vbCrLf & "b"` for a chunk of HTML.
pub fn html_to_write(html: &str) -> Option<String> {
    let normalized = html.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut parts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.is_empty() {
            parts.push(format!("\"{}\"", line.replace('"', "\"\"")));
        }
        if i + 1 < lines.len() {
            parts.push("vbCrLf".to_string());
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("Response.Write {}", parts.join(" & ")))
}

fn is_option_line(line: &str) -> bool {
    let mut words = line.split_whitespace();
    matches!(words.next(), Some(w) if w.eq_ignore_ascii_case("option"))
        && matches!(words.next(), Some(w) if ["explicit", "compare", "base"].iter().any(|k| w.eq_ignore_ascii_case(k)))
}

/// Whether the nearest block in `step` direction that produces output or
/// runs code is a code block (or there is none).
fn code_neighbour(blocks: &[Block], index: usize, forward: bool) -> bool {
    let mut i = index;
    loop {
        if forward {
            i += 1;
            if i >= blocks.len() {
                return true;
            }
        } else {
            if i == 0 {
                return true;
            }
            i -= 1;
        }
        match &blocks[i] {
            Block::Directive { .. } => continue,
            b if b.is_blank_html() => continue,
            Block::Html { .. } => return false,
            _ => return true,
        }
    }
}

#[derive(Default)]
struct ScriptWriter {
    header: Vec<(String, usize)>,
    body: Vec<(String, usize)>,
}

impl ScriptWriter {
    fn push(&mut self, text: &str, line: usize) {
        for (i, l) in text.split('\n').enumerate() {
            self.body.push((l.trim_end_matches('\r').to_string(), line + i));
        }
    }

    fn finish(self, directives: Vec<(String, String)>) -> Page {
        let mut page = Page {
            directives,
            ..Page::default()
        };
        for (text, line) in self.header.into_iter().chain(self.body) {
            page.script.push_str(&text);
            page.script.push('\n');
            page.line_map.push(line);
        }
        page
    }
}

/// Build the program text for a scanned page.
pub fn assemble(blocks: &[Block]) -> Result<Page, PageError> {
    let mut writer = ScriptWriter::default();
    let mut directives = Vec::new();

    for (index, block) in blocks.iter().enumerate() {
        match block {
            Block::Directive { attributes, .. } => {
                if let Some((_, lang)) = attributes.iter().find(|(k, _)| k.eq_ignore_ascii_case("language")) {
                    if !lang.eq_ignore_ascii_case("vbscript") {
                        return Err(PageError::UnsupportedLanguage(lang.clone()));
                    }
                }
                directives.extend(attributes.iter().cloned());
            }
            Block::Html { text, line } => {
                if block.is_blank_html()
                    && text.contains('\n')
                    && code_neighbour(blocks, index, false)
                    && code_neighbour(blocks, index, true)
                {
                    continue;
                }
                if let Some(write) = html_to_write(text) {
                    writer.body.push((write, *line));
                }
            }
            Block::Output { text, line } => {
                writer.body.push((format!("Response.Write ({})", text), *line));
            }
            Block::Code { text, line } => {
                let mut kept = String::with_capacity(text.len());
                for (i, l) in text.split('\n').enumerate() {
                    if i > 0 {
                        kept.push('\n');
                    }
                    if is_option_line(l) {
                        writer.header.push((l.trim().to_string(), line + i));
                    } else {
                        kept.push_str(l);
                    }
                }
                writer.push(&kept, *line);
            }
        }
    }
    Ok(writer.finish(directives))
}
