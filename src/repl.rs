use aspvbs::syntax_error::SyntaxError;
use aspvbs::Engine;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use rustyline::Result as RlResult;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".aspvbs_history"))
}

fn print_help() {
    println!(
        r#"Enter VBScript statements. Output written with Response.Write is printed
after each entry. Blocks (If, For, Sub, Class, ...) continue on following
lines until they are complete; an empty line submits what is there.

REPL COMMANDS:
    .help, .h               Show this help
    .reset                  Discard all variables, procedures and classes
    exit, quit              Exit the REPL

Ctrl+C interrupts a running script."#
    );
}

/// True when `source` only fails because it ends inside a block.
pub(crate) fn is_incomplete(source: &str) -> bool {
    matches!(aspvbs::parser::parse(source), Err(SyntaxError { ref token, .. }) if token.is_empty())
}

fn new_engine(cancel: &Arc<AtomicBool>) -> Engine {
    let mut engine = Engine::new();
    engine.set_timeout(None);
    engine.set_cancel_flag(Arc::clone(cancel));
    engine
}

fn execute(engine: &mut Engine, source: &str, cancel: &AtomicBool) {
    cancel.store(false, Ordering::SeqCst);
    engine.restart_clock();
    let result = engine.run_source(source);
    let output = engine.take_output();
    if !output.is_empty() {
        print!("{}", output);
        if !output.ends_with('\n') {
            println!();
        }
    }
    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }
}

pub(crate) fn run_repl() -> RlResult<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "cannot install Ctrl-C handler");
        }
    }

    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(ref path) = history {
        let _ = rl.load_history(path);
    }
    if std::env::var("ASPVBS_BANNER").is_ok() {
        println!("aspvbs {} (type .help for help)", VERSION);
    }

    let mut engine = new_engine(&cancel);
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "> " } else { ". " };
        match rl.readline(prompt) {
            Ok(line) => {
                if !buffer.is_empty() {
                    if line.trim().is_empty() {
                        let source = std::mem::take(&mut buffer);
                        let _ = rl.add_history_entry(source.as_str());
                        execute(&mut engine, &source, &cancel);
                        continue;
                    }
                    buffer.push('\n');
                    buffer.push_str(&line);
                    if !is_incomplete(&buffer) {
                        let source = std::mem::take(&mut buffer);
                        let _ = rl.add_history_entry(source.as_str());
                        execute(&mut engine, &source, &cancel);
                    }
                    continue;
                }

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match trimmed.to_ascii_lowercase().as_str() {
                    "exit" | "quit" => break,
                    ".help" | ".h" => {
                        print_help();
                        continue;
                    }
                    ".reset" => {
                        engine = new_engine(&cancel);
                        continue;
                    }
                    _ => {}
                }
                if is_incomplete(&line) {
                    buffer = line;
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);
                execute(&mut engine, &line, &cancel);
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    if let Some(ref path) = history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_blocks_are_incomplete() {
        assert!(is_incomplete("If x Then"));
        assert!(is_incomplete("For i = 1 To 3\nResponse.Write i"));
        assert!(is_incomplete("Sub f()"));
        assert!(!is_incomplete("x = 1"));
        assert!(!is_incomplete("If x Then y = 1"));
        assert!(!is_incomplete("Sub f()\nEnd Sub"));
    }
}
