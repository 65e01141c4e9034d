//! Integration tests for the VBScript language surface

#[path = "common/mod.rs"]
mod common;
use common::{error_number, run, Engine, RunState};
use std::time::Duration;

#[test]
fn test_numeric_string_coercion() {
    assert_eq!(run("Dim x\nx = 1 + \"2\"\nResponse.Write x").unwrap(), "3");
}

#[test]
fn test_concatenation_never_errors() {
    assert_eq!(run("Response.Write 1 & \"a\"").unwrap(), "1a");
    assert_eq!(run("Response.Write \"a\" & Null & Empty & 2.5").unwrap(), "a2.5");
}

#[test]
fn test_non_numeric_string_arithmetic_is_type_mismatch() {
    assert_eq!(error_number("x = 1 + \"abc\""), 13);
}

#[test]
fn test_keywords_as_member_names() {
    for keyword in [
        "End", "Class", "Step", "To", "Property", "Set", "Get", "Let", "Next", "Loop", "Error",
        "Select", "Case", "Type", "Sub", "Function", "New", "Nothing", "Each", "In",
    ] {
        let source = format!("x = obj.{}\nobj.{} = 1\nCall obj.{}(2)", keyword, keyword, keyword);
        assert!(aspvbs::parse(&source).is_ok(), "obj.{} should parse", keyword);
    }
}

#[test]
fn test_default_member_on_new_instance_parses() {
    assert!(aspvbs::parse("x = (New Box)(\"\")(1)").is_ok());
}

#[test]
fn test_redim_preserve_keeps_overlap() {
    let out = run(
        "Dim a()\n\
         ReDim a(3)\n\
         For i = 0 To 3: a(i) = i * 10: Next\n\
         ReDim Preserve a(5)\n\
         Response.Write a(0) & \",\" & a(3) & \",\" & IsEmpty(a(5)) & \",\" & UBound(a)\n\
         ReDim Preserve a(1)\n\
         Response.Write \";\" & a(1) & \",\" & UBound(a)\n\
         ReDim a(2)\n\
         Response.Write \";\" & IsEmpty(a(1))",
    )
    .unwrap();
    assert_eq!(out, "0,30,True,5;10,1;True");
}

#[test]
fn test_date_literal_spellings_agree() {
    let out = run(
        "a = #1/19/2026#\n\
         b = #2026-01-19#\n\
         c = # 1/19/2026 #\n\
         Response.Write (a = b) & \",\" & (b = c) & \",\" & Year(c) & \"-\" & Month(c) & \"-\" & Day(c)",
    )
    .unwrap();
    assert_eq!(out, "True,True,2026-1-19");
}

#[test]
fn test_resume_next_continues_after_failure() {
    let out = run(
        "On Error Resume Next\n\
         x = 1 / 0\n\
         Response.Write \"after:\" & Err.Number",
    )
    .unwrap();
    assert_eq!(out, "after:11");
}

#[test]
fn test_without_resume_next_run_stops() {
    let mut engine = Engine::new();
    let result = engine.run_source("Response.Write \"a\"\nx = 1 / 0\nResponse.Write \"b\"");
    assert!(result.is_err());
    assert_eq!(engine.output(), "a");
    assert_eq!(engine.state(), RunState::Faulted);
}

#[test]
fn test_resume_next_is_scoped_to_procedure() {
    let out = run(
        "Sub Risky()\n\
             x = 1 / 0\n\
             Response.Write \"unreached\"\n\
         End Sub\n\
         On Error Resume Next\n\
         Risky\n\
         Response.Write \"caller:\" & Err.Number",
    )
    .unwrap();
    assert_eq!(out, "caller:11");
}

#[test]
fn test_timeout_preserves_output() {
    let mut engine = Engine::new();
    engine.set_timeout(Some(Duration::from_millis(100)));
    let result = engine.run_source("Response.Write \"before\"\nDo While True\nLoop\nResponse.Write \"after\"");
    assert!(result.is_err());
    assert_eq!(engine.state(), RunState::TimedOut);
    assert_eq!(engine.output(), "before");
}

#[test]
fn test_name_redefined() {
    assert_eq!(error_number("Dim a\nDim a"), 1041);
}

#[test]
fn test_with_block_and_classes() {
    let out = run(
        "Class Point\n\
             Public X, Y\n\
             Public Function Sum()\n\
                 Sum = X + Y\n\
             End Function\n\
         End Class\n\
         Set p = New Point\n\
         With p\n\
             .X = 2\n\
             .Y = 5\n\
             Response.Write .Sum()\n\
         End With",
    )
    .unwrap();
    assert_eq!(out, "7");
}

#[test]
fn test_dictionary_and_json_objects() {
    let out = run(
        "Set d = CreateObject(\"Scripting.Dictionary\")\n\
         d.Add \"b\", 2\n\
         d(\"a\") = 1\n\
         For Each k In d\n\
             Response.Write k & \"=\" & d(k) & \";\"\n\
         Next\n\
         Set json = CreateObject(\"JSON\")\n\
         Response.Write json.Stringify(d)",
    )
    .unwrap();
    assert_eq!(out, "b=2;a=1;{\"b\":2,\"a\":1}");
}

#[test]
fn test_unknown_progid() {
    assert_eq!(error_number("Set x = CreateObject(\"No.Such.Thing\")"), 429);
}

#[test]
fn test_err_raise_user_error() {
    let out = run(
        "On Error Resume Next\n\
         Err.Raise vbObjectError + 1, \"app\", \"custom\"\n\
         Response.Write Err.Number - vbObjectError & \":\" & Err.Source & \":\" & Err.Description\n\
         On Error GoTo 0\n\
         Response.Write \":\" & Err.Number",
    )
    .unwrap();
    assert_eq!(out, "1:app:custom:0");
}

#[test]
fn test_convenience_run() {
    assert_eq!(aspvbs::run("Response.Write LCase(\"ABC\")").unwrap(), "abc");
    assert!(aspvbs::run("If Then").is_err());
}

#[test]
fn test_statements_run_through_public_visitor() {
    use aspvbs::eval::Flow;
    use aspvbs::visitor::StatementVisitor;

    let program = aspvbs::parse("Response.Write \"a\"\nx = 1\nResponse.Write x").unwrap();
    let mut engine = Engine::new();
    let flows: Vec<Flow> = program
        .body
        .iter()
        .map(|stmt| engine.visit_statement(stmt).unwrap())
        .collect();
    assert_eq!(flows, vec![Flow::Normal; 3]);
    assert_eq!(engine.output(), "a1");
}

#[test]
fn test_deep_recursion_fails_cleanly() {
    let source = "Function Down(n)\nDown = Down(n + 1)\nEnd Function\nx = Down(0)";
    assert_eq!(error_number(source), 28);
}

#[test]
fn test_member_property_wins_over_global() {
    let out = run(
        "count = 99\n\
         Class Tally\n\
             Public Property Get Count()\n\
                 Count = 7\n\
             End Property\n\
             Public Function Show()\n\
                 Show = Count\n\
             End Function\n\
         End Class\n\
         Set t = New Tally\n\
         Response.Write t.Show()",
    )
    .unwrap();
    assert_eq!(out, "7");
}

#[test]
fn test_oversized_allocations_are_trappable() {
    assert_eq!(error_number("ReDim a(100000000000)"), 7);
    let out = run(
        "On Error Resume Next\n\
         s = Space(100000000000000)\n\
         Response.Write Err.Number & \":\" & IsEmpty(s)",
    )
    .unwrap();
    assert_eq!(out, "7:True");
}
