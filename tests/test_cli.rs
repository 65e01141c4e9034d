//! Tests for the aspvbs command line

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn aspvbs(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("aspvbs").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("ASPVBS_CONFIG")
        .env_remove("ASPVBS_TIMEOUT")
        .env_remove("ASPVBS_WEB_ROOT")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_inline_code() {
    let dir = TempDir::new().unwrap();
    aspvbs(&dir)
        .args(["-c", "Response.Write 6 * 7"])
        .assert()
        .success()
        .stdout("42");
}

#[test]
fn test_runtime_error_exit_code() {
    let dir = TempDir::new().unwrap();
    aspvbs(&dir)
        .args(["-c", "Response.Write \"a\"\nx = 1 / 0"])
        .assert()
        .code(1)
        .stdout("a")
        .stderr(predicate::str::contains("Division by zero"));
}

#[test]
fn test_run_script_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("sum.vbs"),
        "Function Sum(n)\nFor i = 1 To n\nt = t + i\nNext\nSum = t\nEnd Function\nResponse.Write Sum(10)",
    )
    .unwrap();
    aspvbs(&dir).args(["run", "sum.vbs"]).assert().success().stdout("55");
}

#[test]
fn test_check_reports_syntax_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ok.vbs"), "Dim a\na = 1").unwrap();
    fs::write(dir.path().join("bad.vbs"), "Dim a\nIf a Then\n").unwrap();
    aspvbs(&dir)
        .args(["check", "ok.vbs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok.vbs: OK"));
    aspvbs(&dir)
        .args(["check", "bad.vbs"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("bad.vbs"));
}

#[test]
fn test_ast_prints_program() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("p.vbs"), "response.write \"hi\"").unwrap();
    aspvbs(&dir)
        .args(["ast", "p.vbs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hi\""));
}

#[test]
fn test_page_with_query_and_headers() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("hello.asp"),
        "<% Response.ContentType = \"text/plain\" %>Hello <%= Request.QueryString(\"name\") %>",
    )
    .unwrap();
    aspvbs(&dir)
        .args(["page", "hello.asp", "--query", "name=Ann", "--headers"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("HTTP/1.1 200 OK"))
        .stdout(predicate::str::contains("Content-Type: text/plain"))
        .stdout(predicate::str::contains("Set-Cookie: ASPSESSIONID="))
        .stdout(predicate::str::ends_with("Hello Ann"));
}

#[test]
fn test_page_runtime_error_exit_code() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.asp"), "<% x = Nothing + 1 %>").unwrap();
    aspvbs(&dir)
        .args(["run", "bad.asp"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Microsoft VBScript runtime"));
}

#[test]
fn test_config_file_sets_timeout() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("aspvbs.toml"), "script_timeout_secs = 1\n").unwrap();
    aspvbs(&dir)
        .args(["-c", "Response.Write \"x\"\nDo\nLoop"])
        .assert()
        .code(1)
        .stdout("x");
}
