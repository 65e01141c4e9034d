//! Integration tests for serving pages through the host

#[path = "common/mod.rs"]
mod common;
use common::{host_for, session_cookie, write_site, PageRequest, RunState};
use tempfile::TempDir;

#[test]
fn test_page_renders_html_and_expressions() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[(
            "hello.asp",
            "<%@ Language=\"VBScript\" %>\n<h1>Hello <%= Request.QueryString(\"name\") %></h1>\n<% For i = 1 To 3 %><%= i %><% Next %>",
        )],
    );
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::from_url("/hello.asp?name=World"));
    assert_eq!(response.status, 200);
    assert_eq!(response.state, RunState::Completed);
    assert!(response.body.contains("<h1>Hello World</h1>"), "{}", response.body);
    assert!(response.body.contains("123"), "{}", response.body);
    assert!(response.header("Content-Type").unwrap().starts_with("text/html"));
}

#[test]
fn test_directory_serves_default_page() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("default.asp", "<% Response.Write \"home\" %>")]);
    let host = host_for(dir.path());
    assert_eq!(host.handle(&PageRequest::get("/")).body, "home");
}

#[test]
fn test_missing_page_is_404() {
    let dir = TempDir::new().unwrap();
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::get("/nope.asp"));
    assert_eq!(response.status, 404);
}

#[test]
fn test_parent_traversal_is_404() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("site/index.asp", "x"), ("secret.asp", "secret")]);
    let host = host_for(&dir.path().join("site"));
    assert_eq!(host.handle(&PageRequest::get("/../secret.asp")).status, 404);
}

#[test]
fn test_include_files() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[
            ("inc/lib.inc", "<% Function Greet(n)\nGreet = \"Hi \" & n\nEnd Function %>"),
            ("inc/footer.inc", "<footer>end</footer>"),
            (
                "index.asp",
                "<!-- #include file=\"inc/lib.inc\" --><p><%= Greet(\"Ann\") %></p><!-- #include virtual=\"/inc/footer.inc\" -->",
            ),
        ],
    );
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::get("/index.asp"));
    assert_eq!(response.status, 200, "{}", response.body);
    assert!(response.body.contains("<p>Hi Ann</p>"), "{}", response.body);
    assert!(response.body.contains("<footer>end</footer>"), "{}", response.body);
}

#[test]
fn test_form_post() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[(
            "form.asp",
            "<%= Request.ServerVariables(\"REQUEST_METHOD\") %>:<%= Request.Form(\"user\") %>:<%= Request(\"user\") %>",
        )],
    );
    let host = host_for(dir.path());
    let request = PageRequest::get("/form.asp").with_form([("user", "bob smith")]);
    let response = host.handle(&request);
    assert_eq!(response.body, "POST:bob smith:bob smith");
}

#[test]
fn test_session_persists_across_requests() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[("count.asp", "<% Session(\"n\") = Session(\"n\") + 1 %><%= Session(\"n\") %>")],
    );
    let host = host_for(dir.path());

    let first = host.handle(&PageRequest::get("/count.asp"));
    assert_eq!(first.body, "1");
    let cookie = session_cookie(&first).expect("session cookie");

    let second = host.handle(&PageRequest::get("/count.asp").with_header("Cookie", cookie.clone()));
    assert_eq!(second.body, "2");
    assert!(session_cookie(&second).is_none());

    let stranger = host.handle(&PageRequest::get("/count.asp"));
    assert_eq!(stranger.body, "1");
}

#[test]
fn test_session_abandon_runs_on_end() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[
            (
                "global.asa",
                "<script language=\"VBScript\" runat=\"server\">\n\
                 Sub Session_OnEnd\n\
                     Application(\"ended\") = Application(\"ended\") + 1\n\
                 End Sub\n\
                 </script>",
            ),
            ("set.asp", "<% Session(\"k\") = \"v\" %>set"),
            ("bye.asp", "<% Session.Abandon %>bye"),
            ("get.asp", "[<%= Session(\"k\") %>]<%= Application(\"ended\") %>"),
        ],
    );
    let host = host_for(dir.path());
    let first = host.handle(&PageRequest::get("/set.asp"));
    let cookie = session_cookie(&first).unwrap();

    let before = host.handle(&PageRequest::get("/get.asp").with_header("Cookie", cookie.clone()));
    assert_eq!(before.body, "[v]");

    host.handle(&PageRequest::get("/bye.asp").with_header("Cookie", cookie.clone()));
    let after = host.handle(&PageRequest::get("/get.asp").with_header("Cookie", cookie));
    assert_eq!(after.body, "[]1");
}

#[test]
fn test_global_asa_start_handlers() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[
            (
                "global.asa",
                "<script language=\"VBScript\" runat=\"server\">\n\
                 Sub Application_OnStart\n\
                     Application(\"started\") = Application(\"started\") + 1\n\
                 End Sub\n\
                 Sub Session_OnStart\n\
                     Session(\"greeting\") = \"welcome\"\n\
                     Application(\"sessions\") = Application(\"sessions\") + 1\n\
                 End Sub\n\
                 </script>",
            ),
            (
                "index.asp",
                "<%= Application(\"started\") %>/<%= Application(\"sessions\") %>/<%= Session(\"greeting\") %>",
            ),
        ],
    );
    let host = host_for(dir.path());
    let first = host.handle(&PageRequest::get("/index.asp"));
    assert_eq!(first.body, "1/1/welcome");
    let cookie = session_cookie(&first).unwrap();

    let again = host.handle(&PageRequest::get("/index.asp").with_header("Cookie", cookie));
    assert_eq!(again.body, "1/1/welcome");

    let other = host.handle(&PageRequest::get("/index.asp"));
    assert_eq!(other.body, "1/2/welcome");
}

#[test]
fn test_runtime_error_page() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("bad.asp", "<p>start</p>\n<%\nx = 1 + \"abc\"\n%>")]);
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::get("/bad.asp"));
    assert_eq!(response.status, 500);
    assert_eq!(response.state, RunState::Faulted);
    assert!(response.body.contains("Microsoft VBScript runtime"), "{}", response.body);
    assert!(response.body.contains("800a000d"), "{}", response.body);
    assert!(response.body.contains("Type mismatch"), "{}", response.body);
    assert!(response.body.contains("line 3"), "{}", response.body);
}

#[test]
fn test_compilation_error_page() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("broken.asp", "<%\nIf x Then\n%>")]);
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::get("/broken.asp"));
    assert_eq!(response.status, 500);
    assert!(response.body.contains("Microsoft VBScript compilation"), "{}", response.body);
    assert!(response.body.contains("800a0"), "{}", response.body);
}

#[test]
fn test_redirect() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[("go.asp", "<% Response.Redirect \"/next.asp\" %>unreached")],
    );
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::get("/go.asp"));
    assert_eq!(response.status, 302);
    assert_eq!(response.header("Location"), Some("/next.asp"));
    assert!(!response.body.contains("unreached"));
    assert_eq!(response.state, RunState::Completed);
}

#[test]
fn test_response_end_stops_page() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("end.asp", "a<% Response.End %>b")]);
    let host = host_for(dir.path());
    let response = host.handle(&PageRequest::get("/end.asp"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "a");
}

#[test]
fn test_timeout_keeps_partial_output() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("spin.asp", "partial<% Do\nLoop %>")]);
    let mut config = aspvbs::config::Config {
        web_root: dir.path().to_path_buf(),
        ..Default::default()
    };
    config.script_timeout_secs = 1;
    let host = common::Host::new(config).unwrap();
    let response = host.handle(&PageRequest::get("/spin.asp"));
    assert_eq!(response.status, 500);
    assert_eq!(response.state, RunState::TimedOut);
    assert!(response.body.starts_with("partial"), "{}", response.body);
    assert!(response.body.contains("ASP 0113"), "{}", response.body);
}

#[test]
fn test_cached_page_sees_edits() {
    let dir = TempDir::new().unwrap();
    write_site(dir.path(), &[("v.asp", "one")]);
    let host = host_for(dir.path());
    assert_eq!(host.handle(&PageRequest::get("/v.asp")).body, "one");
    write_site(dir.path(), &[("v.asp", "<%= \"two\" %>")]);
    assert_eq!(host.handle(&PageRequest::get("/v.asp")).body, "two");
}

#[test]
fn test_page_recursion_depth() {
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        &[
            (
                "deep.asp",
                "<% Function Depth(n)\nIf n = 0 Then\nDepth = 0\nElse\nDepth = 1 + Depth(n - 1)\nEnd If\nEnd Function %><%= Depth(200) %>",
            ),
            ("runaway.asp", "<% Function Down(n)\nDown = Down(n + 1)\nEnd Function\nx = Down(0) %>"),
        ],
    );
    let host = host_for(dir.path());
    let deep = host.handle(&PageRequest::get("/deep.asp"));
    assert_eq!(deep.status, 200, "{}", deep.body);
    assert_eq!(deep.body, "200");

    let runaway = host.handle(&PageRequest::get("/runaway.asp"));
    assert_eq!(runaway.status, 500);
    assert_eq!(runaway.state, RunState::Faulted);
    assert!(runaway.body.contains("800a001c"), "{}", runaway.body);
    assert!(runaway.body.contains("Out of stack space"), "{}", runaway.body);
}
