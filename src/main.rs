//! aspvbs - Classic ASP / VBScript runtime
//!
//! Usage:
//!   aspvbs                  Start interactive REPL
//!   aspvbs -c "code"        Execute a single line
//!   aspvbs run script.vbs   Execute a script file
//!   aspvbs page index.asp   Render a page

mod cli;
mod repl;

use aspvbs::config::Config;
use aspvbs::host::{Host, PageRequest};
use aspvbs::objects::request::RequestCollection;
use aspvbs::objects::ObjectRegistry;
use aspvbs::page::{self, PageError};
use aspvbs::visitor::SourcePrinter;
use aspvbs::{Engine, Program, ScriptError};
use clap::Parser;
use cli::{is_page, split_pair, Cli, Commands};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_RUNTIME: u8 = 1;
const EXIT_SYNTAX: u8 = 2;

fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn script_engine(config: &Config) -> Engine {
    let mut engine = Engine::with_registry(Rc::new(ObjectRegistry::with_root(config.web_root.clone())));
    engine.set_timeout(config.script_timeout());
    engine.set_max_call_depth(config.max_call_depth);
    engine
}

fn read_source(path: &Path) -> Result<String, String> {
    std::fs::read(path)
        .map(|bytes| page::decode_text(&bytes))
        .map_err(|e| format!("{}: {}", path.display(), e))
}

fn run_code(config: &Config, source: &str) -> ExitCode {
    match aspvbs::eval::with_script_stack(|| execute_code(config, source)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

fn execute_code(config: &Config, source: &str) -> ExitCode {
    let mut engine = script_engine(config);
    let result = engine.run_source(source);
    print!("{}", engine.take_output());
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ ScriptError::Syntax(_)) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_SYNTAX)
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

fn run_file(config: &Config, path: &Path) -> ExitCode {
    match read_source(path) {
        Ok(source) => run_code(config, &source),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

/// Parse a script, or assemble and parse a page.
fn parse_file(config: &Config, path: &Path) -> Result<Program, PageError> {
    if is_page(path) {
        let root = if config.web_root.as_os_str() == "." {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            config.web_root.clone()
        };
        let page = page::load(path, &root)?;
        Ok(page.parse()?)
    } else {
        let source = std::fs::read(path).map_err(|source| PageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(aspvbs::parser::parse(&page::decode_text(&source))?)
    }
}

fn check_file(config: &Config, path: &Path, print_ast: bool) -> ExitCode {
    match parse_file(config, path) {
        Ok(program) => {
            if print_ast {
                print!("{}", SourcePrinter::print(&program));
            } else {
                println!("{}: OK", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(PageError::Syntax(e)) => {
            eprintln!("{}: {}", path.display(), e);
            ExitCode::from(EXIT_SYNTAX)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

/// Web root and virtual path for a page given on the command line. Pages
/// outside the configured root are served from their own directory.
fn page_location(config: &Config, file: &Path) -> Result<(PathBuf, String), String> {
    let file = file
        .canonicalize()
        .map_err(|e| format!("{}: {}", file.display(), e))?;
    let root = config.web_root.canonicalize().unwrap_or_else(|_| config.web_root.clone());
    let (root, relative) = match file.strip_prefix(&root) {
        Ok(relative) => (root.clone(), relative.to_path_buf()),
        Err(_) => {
            let parent = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let name = file.file_name().map(PathBuf::from).unwrap_or_default();
            (parent, name)
        }
    };
    let virtual_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Ok((root, format!("/{}", virtual_path)))
}

struct PageArgs {
    file: PathBuf,
    query: Vec<String>,
    form: Vec<String>,
    method: Option<String>,
    cookie: Vec<String>,
    headers: bool,
}

fn render_page(mut config: Config, args: PageArgs) -> ExitCode {
    let (root, virtual_path) = match page_location(&config, &args.file) {
        Ok(location) => location,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_RUNTIME);
        }
    };
    config.web_root = root;
    let host = match Host::new(config) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    let query = RequestCollection::from_pairs(args.query.iter().map(|p| split_pair(p))).to_urlencoded();
    let mut request = PageRequest::get(virtual_path).with_query(query);
    if !args.form.is_empty() {
        request = request.with_form(args.form.iter().map(|p| split_pair(p)));
    }
    if let Some(method) = args.method {
        request = request.with_method(method);
    }
    if !args.cookie.is_empty() {
        request = request.with_header("Cookie", args.cookie.join("; "));
    }

    let response = host.handle(&request);
    host.shutdown();
    if args.headers {
        println!("HTTP/1.1 {}", response.status_line);
        for (name, value) in &response.headers {
            println!("{}: {}", name, value);
        }
        println!();
    }
    print!("{}", response.body);
    if response.status >= 500 {
        ExitCode::from(EXIT_RUNTIME)
    } else {
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_RUNTIME);
        }
    };
    init_tracing(&config.log_filter);

    if let Some(code) = cli.code {
        return run_code(&config, &code);
    }

    match cli.command {
        Some(Commands::Run { file }) => {
            if is_page(&file) {
                render_page(
                    config,
                    PageArgs {
                        file,
                        query: Vec::new(),
                        form: Vec::new(),
                        method: None,
                        cookie: Vec::new(),
                        headers: false,
                    },
                )
            } else {
                run_file(&config, &file)
            }
        }
        Some(Commands::Page {
            file,
            query,
            form,
            method,
            cookie,
            headers,
        }) => render_page(
            config,
            PageArgs {
                file,
                query,
                form,
                method,
                cookie,
                headers,
            },
        ),
        Some(Commands::Check { file }) => check_file(&config, &file, false),
        Some(Commands::Ast { file }) => check_file(&config, &file, true),
        None => match aspvbs::eval::with_script_stack(|| repl::run_repl().map_err(|e| e.to_string())) {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(e)) => {
                eprintln!("Error: {}", e);
                ExitCode::from(EXIT_RUNTIME)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(EXIT_RUNTIME)
            }
        },
    }
}
