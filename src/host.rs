//! The page host.
//!
//! [`Host::handle`] takes one request through the whole pipeline: locate
//! the page, compile it (through the parse cache), restore the session,
//! run the global.asa handlers that are due, run the page and turn the
//! outcome into a [`PageResponse`].
//!
//! A `Host` is shared between request threads. Each request builds its own
//! [`Engine`], so nothing script-visible crosses threads except the
//! Application state and the session store.

use crate::cache::ParseCache;
use crate::config::Config;
use crate::eval::{with_script_stack, Engine, EvalError, RunState};
use crate::extension::ObjectRef;
use crate::lifecycle::{self, GlobalAsa};
use crate::objects::application::{ApplicationObject, ApplicationState};
use crate::objects::html_escape;
use crate::objects::request::{RequestCollection, RequestData, RequestObject};
use crate::objects::response::{ResponseObject, ResponseState};
use crate::objects::session::{SessionObject, SessionState};
use crate::objects::ObjectRegistry;
use crate::page::PageError;
use crate::session_store::{
    spawn_reaper, FileSessionStore, MemorySessionStore, Reaper, SessionError, SessionRecord, SessionStore,
};
use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_COOKIE: &str = "ASPSESSIONID";

/// An incoming request, already split into its parts.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Virtual path, e.g. `/shop/cart.asp`
    pub path: String,
    pub method: String,
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub remote_addr: String,
}

impl PageRequest {
    pub fn get(path: impl Into<String>) -> Self {
        PageRequest {
            path: path.into(),
            method: "GET".to_string(),
            query_string: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
            remote_addr: "127.0.0.1".to_string(),
        }
    }

    /// Split `path?query` into path and query string.
    pub fn from_url(url: &str) -> Self {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        Self::get(path).with_query(query)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// POST the pairs as an urlencoded form.
    pub fn with_form<K: AsRef<str>, V: AsRef<str>>(self, pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let body = RequestCollection::from_pairs(
            pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        )
        .to_urlencoded();
        let mut request = self
            .with_method("POST")
            .with_header("Content-Type", "application/x-www-form-urlencoded");
        request.body = body.into_bytes();
        request
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn cookies(&self) -> RequestCollection {
        self.header("Cookie")
            .map(RequestCollection::parse_cookies)
            .unwrap_or_default()
    }

    fn request_data(&self) -> RequestData {
        let is_form = self
            .header("Content-Type")
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"));
        let form = if is_form {
            RequestCollection::parse_urlencoded(&String::from_utf8_lossy(&self.body))
        } else {
            RequestCollection::new()
        };
        let server_name = self
            .header("Host")
            .map(|h| h.split(':').next().unwrap_or(h).to_string())
            .or_else(|| hostname::get().ok().map(|h| h.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "localhost".to_string());
        RequestData {
            method: self.method.clone(),
            script_name: self.path.clone(),
            query_string: self.query_string.clone(),
            form,
            cookies: self.cookies(),
            headers: self.headers.clone(),
            remote_addr: self.remote_addr.clone(),
            server_name,
            body: self.body.clone(),
        }
    }
}

/// What the host sends back.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    pub status: u16,
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub state: RunState,
}

impl PageResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn plain(status_line: &str, body: String, state: RunState) -> Self {
        let status = status_line
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);
        PageResponse {
            status,
            status_line: status_line.to_string(),
            headers: vec![("Content-Type".to_string(), "text/html".to_string())],
            body,
            state,
        }
    }

    fn not_found(path: &str) -> Self {
        let body = format!(
            "<html><head><title>404 Not Found</title></head><body><h1>Not Found</h1><p>{}</p></body></html>",
            html_escape(path)
        );
        Self::plain("404 Not Found", body, RunState::Ready)
    }
}

/// `800a000d` for runtime errors, the raw HRESULT for user-raised ones.
pub fn error_code(number: i64) -> String {
    if (0..=0xFFFF).contains(&number) {
        format!("800a{:04x}", number)
    } else {
        format!("{:08x}", number as u32)
    }
}

fn error_page(kind: &str, number: i64, description: &str, path: &str, line: usize) -> String {
    format!(
        "<html><head><title>500 Internal Server Error</title></head><body>\n\
         <font face=\"Arial\" size=2><p>{} error '{}'</p>\n\
         <p>{}</p>\n\
         <p>{}, line {}</p></font>\n\
         </body></html>",
        kind,
        error_code(number),
        html_escape(description),
        html_escape(path),
        line
    )
}

/// The file serving `virtual_path`; directories serve `default_page`.
fn resolve_page(root: &Path, default_page: &str, virtual_path: &str) -> Option<PathBuf> {
    let relative = Path::new(virtual_path.trim_start_matches(['/', '\\']));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    let path = root.join(relative);
    let path = if path.is_dir() { path.join(default_page) } else { path };
    path.is_file().then_some(path)
}

pub struct Host {
    config: Config,
    cache: ParseCache,
    sessions: Arc<dyn SessionStore>,
    application: Arc<ApplicationState>,
    global_asa: GlobalAsa,
    app_started: AtomicBool,
}

impl Host {
    /// Build a host from `config`: opens the session store and loads
    /// global.asa from the web root.
    pub fn new(config: Config) -> Result<Self, HostError> {
        let sessions: Arc<dyn SessionStore> = match &config.session_dir {
            Some(dir) => Arc::new(FileSessionStore::new(dir)?),
            None => Arc::new(MemorySessionStore::new()),
        };
        let global_asa = GlobalAsa::load(&config.global_asa_path())?;
        Ok(Host {
            cache: ParseCache::new(config.parse_cache),
            sessions,
            application: Arc::new(ApplicationState::new()),
            global_asa,
            app_started: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub fn application(&self) -> Arc<ApplicationState> {
        Arc::clone(&self.application)
    }

    /// A configured engine with `Request`, `Session`, `Application` and
    /// `Server` installed. `response` lets lifecycle handlers write into a
    /// page's output.
    fn engine(
        &self,
        request: RequestData,
        session: Option<Rc<RefCell<SessionState>>>,
        page_dir: &Path,
        response: Option<Rc<RefCell<ResponseState>>>,
    ) -> Engine {
        let root = self.config.web_root.clone();
        let mut engine = Engine::with_registry(Rc::new(ObjectRegistry::with_root(root.clone())));
        engine.set_timeout(self.config.script_timeout());
        engine.set_max_call_depth(self.config.max_call_depth);
        engine.set_web_root(root, page_dir.to_path_buf());
        engine.register_intrinsic("Request", ObjectRef::native(RequestObject::new(request)));
        engine.register_intrinsic(
            "Application",
            ObjectRef::native(ApplicationObject::new(Arc::clone(&self.application))),
        );
        if let Some(session) = session {
            engine.register_intrinsic("Session", ObjectRef::native(SessionObject::new(session)));
        }
        if let Some(response) = response {
            engine.register_intrinsic("Response", ObjectRef::native(ResponseObject::new(response)));
        }
        engine
    }

    fn open_session(&self, request: &PageRequest) -> Rc<RefCell<SessionState>> {
        let cookie = request.cookies().get(SESSION_COOKIE);
        if let Some(id) = cookie.filter(|id| !id.is_empty()) {
            match self.sessions.get(&id) {
                Ok(Some(mut record)) => {
                    record.touch();
                    return Rc::new(RefCell::new(SessionState::new(id, record, false)));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(session = %id, error = %e, "cannot load session"),
            }
        }
        let id = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        tracing::info!(session = %id, "new session");
        let record = SessionRecord::new(self.config.session_timeout_minutes);
        Rc::new(RefCell::new(SessionState::new(id, record, true)))
    }

    /// Run a lifecycle handler in its own engine.
    fn run_hook(
        &self,
        hook: &str,
        request: RequestData,
        session: Option<Rc<RefCell<SessionState>>>,
        response: Option<Rc<RefCell<ResponseState>>>,
    ) -> Result<(), EvalError> {
        if !self.global_asa.has_hook(hook) {
            return Ok(());
        }
        let root = self.config.web_root.clone();
        let mut engine = self.engine(request, session, &root, response);
        self.global_asa.invoke(hook, &mut engine).map(|_| ())
    }

    /// `Application_OnStart`, once per host.
    fn ensure_started(&self, request: &RequestData) -> Result<(), EvalError> {
        if self
            .app_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.run_hook(lifecycle::APPLICATION_ON_START, request.clone(), None, None)?;
        }
        Ok(())
    }

    /// Serve one request. The page runs on its own large-stack thread.
    pub fn handle(&self, request: &PageRequest) -> PageResponse {
        match with_script_stack(|| self.serve(request)) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(page = %request.path, error = %e, "cannot start script thread");
                let body = error_page("Active Server Pages", 0, &e.to_string(), &request.path, 0);
                PageResponse::plain("500 Internal Server Error", body, RunState::Faulted)
            }
        }
    }

    fn serve(&self, request: &PageRequest) -> PageResponse {
        let root = &self.config.web_root;
        let Some(path) = resolve_page(root, &self.config.default_page, &request.path) else {
            tracing::debug!(path = %request.path, "page not found");
            return PageResponse::not_found(&request.path);
        };
        let compiled = match self.cache.load(&path, root) {
            Ok(compiled) => compiled,
            Err(PageError::Syntax(e)) => {
                let body = error_page(
                    "Microsoft VBScript compilation",
                    e.code.number() as i64,
                    e.code.description(),
                    &request.path,
                    e.line,
                );
                return PageResponse::plain("500 Internal Server Error", body, RunState::Faulted);
            }
            Err(e) => {
                tracing::error!(page = %path.display(), error = %e, "cannot load page");
                let body = error_page("Active Server Pages", 0, &e.to_string(), &request.path, 0);
                return PageResponse::plain("500 Internal Server Error", body, RunState::Faulted);
            }
        };

        let data = request.request_data();
        let session = self.open_session(request);
        let page_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
        let mut engine = self.engine(data.clone(), Some(Rc::clone(&session)), &page_dir, None);

        let is_new = session.borrow().is_new;
        let hooks = self.ensure_started(&data).and_then(|_| {
            if is_new {
                self.run_hook(
                    lifecycle::SESSION_ON_START,
                    data.clone(),
                    Some(Rc::clone(&session)),
                    Some(engine.response()),
                )
            } else {
                Ok(())
            }
        });

        let result = hooks.and_then(|_| engine.run(&compiled.program));
        let line = compiled.page.page_line(engine.current_line());
        self.close_session(&session, &data);

        let response = engine.response();
        let mut state = response.borrow().clone();
        let run_state = engine.state();
        match result {
            Ok(()) => {}
            Err(EvalError::Timeout) => {
                tracing::warn!(page = %request.path, "script timed out");
                state.status = "500 Internal Server Error".to_string();
                state.body.push_str(&format!(
                    "\n<p>Active Server Pages error 'ASP 0113': Script timed out ({}, line {})</p>",
                    html_escape(&request.path),
                    line
                ));
            }
            Err(e) => {
                tracing::error!(page = %request.path, line, number = e.number(), error = %e, "page faulted");
                state.status = "500 Internal Server Error".to_string();
                state.body = error_page(
                    "Microsoft VBScript runtime",
                    e.number(),
                    &e.description(),
                    &request.path,
                    line,
                );
                state.content_type = "text/html".to_string();
            }
        }
        let mut page = build_response(&state, run_state);
        let session = session.borrow();
        if session.is_new && !session.abandoned {
            page.headers
                .push(("Set-Cookie".to_string(), format!("{}={}; path=/", SESSION_COOKIE, session.id)));
        }
        page
    }

    /// Save (or drop, after `Session.Abandon`) the session.
    fn close_session(&self, session: &Rc<RefCell<SessionState>>, request: &RequestData) {
        let (id, abandoned) = {
            let s = session.borrow();
            (s.id.clone(), s.abandoned)
        };
        let outcome = if abandoned {
            tracing::info!(session = %id, "session abandoned");
            if let Err(e) = self.run_hook(lifecycle::SESSION_ON_END, request.clone(), Some(Rc::clone(session)), None) {
                tracing::error!(session = %id, error = %e, "Session_OnEnd failed");
            }
            self.sessions.expire(&id)
        } else {
            let mut s = session.borrow_mut();
            s.record.touch();
            self.sessions.set(&id, &s.record)
        };
        if let Err(e) = outcome {
            tracing::warn!(session = %id, error = %e, "cannot persist session");
        }
    }

    fn session_ended(&self, id: &str, record: SessionRecord) {
        let outcome = with_script_stack(|| {
            let state = Rc::new(RefCell::new(SessionState::new(id.to_string(), record, false)));
            self.run_hook(lifecycle::SESSION_ON_END, RequestData::default(), Some(state), None)
                .map_err(|e| e.to_string())
        });
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(session = %id, error = %e, "Session_OnEnd failed"),
            Err(e) => tracing::error!(session = %id, error = %e, "cannot start script thread"),
        }
    }

    /// Expire idle sessions now, running `Session_OnEnd` for each.
    pub fn reap_sessions(&self) -> Result<usize, SessionError> {
        let expired = self.sessions.purge_expired()?;
        for (id, record) in &expired {
            tracing::info!(session = %id, "session expired");
            self.session_ended(id, record.clone());
        }
        Ok(expired.len())
    }

    /// Background expiry every `interval`.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> Reaper {
        let host = Arc::clone(self);
        spawn_reaper(Arc::clone(&self.sessions), interval, move |id, record| {
            host.session_ended(id, record.clone())
        })
    }

    /// Run `Application_OnEnd` if the application was started.
    pub fn shutdown(&self) {
        if self.app_started.swap(false, Ordering::SeqCst) {
            let outcome = with_script_stack(|| {
                self.run_hook(lifecycle::APPLICATION_ON_END, RequestData::default(), None, None)
                    .map_err(|e| e.to_string())
            });
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Application_OnEnd failed"),
                Err(e) => tracing::error!(error = %e, "cannot start script thread"),
            }
        }
    }
}

fn build_response(state: &ResponseState, run_state: RunState) -> PageResponse {
    let mut headers = Vec::new();
    let content_type = match &state.charset {
        Some(charset) => format!("{}; charset={}", state.content_type, charset),
        None => state.content_type.clone(),
    };
    headers.push(("Content-Type".to_string(), content_type));
    if let Some(location) = &state.redirect {
        headers.push(("Location".to_string(), location.clone()));
    }
    if let Some(cache_control) = &state.cache_control {
        headers.push(("Cache-Control".to_string(), cache_control.clone()));
    }
    if let Some(minutes) = state.expires {
        let at = chrono::Utc::now() + chrono::Duration::minutes(minutes);
        headers.push(("Expires".to_string(), at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()));
    }
    for (name, value) in &state.headers {
        if state.redirect.is_some() && name.eq_ignore_ascii_case("Location") {
            continue;
        }
        headers.push((name.clone(), value.clone()));
    }
    for (name, value) in &state.cookies {
        headers.push((
            "Set-Cookie".to_string(),
            format!("{}={}; path=/", name, crate::objects::server::url_encode(value)),
        ));
    }
    PageResponse {
        status: state.status_code(),
        status_line: state.status.clone(),
        headers,
        body: state.body.clone(),
        state: run_state,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("global.asa: {0}")]
    GlobalAsa(#[from] PageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(error_code(13), "800a000d");
        assert_eq!(error_code(-2147221504 + 1), "80040001");
    }

    #[test]
    fn test_resolve_page_rejects_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.asp"), "x").unwrap();
        assert!(resolve_page(dir.path(), "default.asp", "/").is_some());
        assert!(resolve_page(dir.path(), "default.asp", "/../etc/passwd").is_none());
        assert!(resolve_page(dir.path(), "default.asp", "/missing.asp").is_none());
    }

    #[test]
    fn test_form_request_data() {
        let req = PageRequest::from_url("/a.asp?x=1")
            .with_form([("name", "Ann Lee")])
            .with_header("Cookie", "ASPSESSIONID=ABC; theme=dark");
        let data = req.request_data();
        assert_eq!(data.method, "POST");
        assert_eq!(data.query_string, "x=1");
        assert_eq!(data.form.get("name").as_deref(), Some("Ann Lee"));
        assert_eq!(data.cookies.get("theme").as_deref(), Some("dark"));
    }
}
