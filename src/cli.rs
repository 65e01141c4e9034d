use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aspvbs", version)]
#[command(about = "Classic ASP / VBScript runtime", long_about = None)]
pub struct Cli {
    /// Path to config file (default: aspvbs.toml)
    #[arg(long, global = true, env = "ASPVBS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Execute a one-line script and exit
    #[arg(short = 'c', value_name = "CODE")]
    pub code: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a VBScript file
    Run {
        /// Script to run
        file: PathBuf,
    },

    /// Render an ASP page through the page host
    Page {
        /// Page to render
        file: PathBuf,

        /// Query string pair (repeatable)
        #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,

        /// Form field pair, sent as a POST body (repeatable)
        #[arg(short = 'f', long = "form", value_name = "KEY=VALUE")]
        form: Vec<String>,

        /// Request method (default: GET, or POST with --form)
        #[arg(short = 'm', long = "method")]
        method: Option<String>,

        /// Cookie pair (repeatable)
        #[arg(long = "cookie", value_name = "NAME=VALUE")]
        cookie: Vec<String>,

        /// Print response headers before the body
        #[arg(long = "headers")]
        headers: bool,
    },

    /// Parse a script or page and report syntax errors
    Check {
        /// Script or page to check
        file: PathBuf,
    },

    /// Print the parsed program
    Ast {
        /// Script or page to print
        file: PathBuf,
    },
}

/// Split `KEY=VALUE`; a bare key gets an empty value.
pub fn split_pair(pair: &str) -> (String, String) {
    match pair.split_once('=') {
        Some((k, v)) => (k.to_string(), v.to_string()),
        None => (pair.to_string(), String::new()),
    }
}

/// `.asp`, `.asa` and `.inc` files go through the page layer.
pub fn is_page(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ["asp", "asa", "inc"].iter().any(|x| e.eq_ignore_ascii_case(x)))
}
