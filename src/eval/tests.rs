use super::*;
use crate::value::Value;

fn run(source: &str) -> Result<String, EvalError> {
    let program = crate::parser::parse(source).expect("parse failed");
    let mut engine = Engine::new();
    engine.set_timeout(None);
    engine.run(&program)?;
    Ok(engine.output())
}

fn out(source: &str) -> String {
    run(source).unwrap_or_else(|e| panic!("run failed: {}", e))
}

fn error_number(source: &str) -> i64 {
    run(source).expect_err("expected a runtime error").number()
}

#[test]
fn eval_numeric_string_addition() {
    assert_eq!(out("Dim x\nx = 1 + \"2\"\nResponse.Write x"), "3");
}

#[test]
fn eval_concatenation_mixes_types() {
    assert_eq!(out("Response.Write 1 & \"a\""), "1a");
    assert_eq!(out("Response.Write Null & \"x\""), "x");
}

#[test]
fn eval_type_mismatch() {
    assert_eq!(error_number("x = 1 + \"abc\""), 13);
    assert_eq!(error_number("x = 1 / 0"), 11);
}

#[test]
fn eval_if_elseif_else() {
    let src = "x = 5\nIf x > 10 Then\nResponse.Write \"big\"\nElseIf x > 3 Then\nResponse.Write \"mid\"\nElse\nResponse.Write \"small\"\nEnd If";
    assert_eq!(out(src), "mid");
    assert_eq!(out("If 1 = 1 Then Response.Write \"a\" Else Response.Write \"b\""), "a");
}

#[test]
fn eval_for_loop_with_step_and_exit() {
    assert_eq!(out("For i = 10 To 1 Step -3\nResponse.Write i & \",\"\nNext"), "10,7,4,1,");
    assert_eq!(out("For i = 1 To 10\nIf i = 3 Then Exit For\nResponse.Write i\nNext"), "12");
    assert_eq!(out("For i = 1 To 3\nNext\nResponse.Write i"), "4");
}

#[test]
fn eval_do_loops() {
    assert_eq!(out("i = 0\nDo While i < 3\ni = i + 1\nLoop\nResponse.Write i"), "3");
    assert_eq!(out("i = 5\nDo\ni = i + 1\nLoop Until i > 2\nResponse.Write i"), "6");
    assert_eq!(out("i = 0\nDo\ni = i + 1\nIf i = 4 Then Exit Do\nLoop\nResponse.Write i"), "4");
    assert_eq!(out("i = 0\nWhile i < 2\ni = i + 1\nWend\nResponse.Write i"), "2");
}

#[test]
fn eval_for_each_over_array() {
    assert_eq!(out("For Each v In Array(1, \"b\", 3)\nResponse.Write v\nNext"), "1b3");
}

#[test]
fn eval_select_case() {
    let src = "Function k(n)\nSelect Case n\nCase 1, 2\nk = \"low\"\nCase Is > 10\nk = \"high\"\nCase 3 To 5\nk = \"range\"\nCase Else\nk = \"other\"\nEnd Select\nEnd Function\nResponse.Write k(2) & k(11) & k(4) & k(7)";
    assert_eq!(out(src), "lowhighrangeother");
}

#[test]
fn eval_functions_and_recursion() {
    let src = "Function fact(n)\nIf n <= 1 Then\nfact = 1\nElse\nfact = n * fact(n - 1)\nEnd If\nEnd Function\nResponse.Write fact(6)";
    assert_eq!(out(src), "720");
}

#[test]
fn eval_procedures_hoist() {
    assert_eq!(out("Greet \"x\"\nSub Greet(name)\nResponse.Write \"hi \" & name\nEnd Sub"), "hi x");
}

#[test]
fn eval_byref_and_byval() {
    let src = "Sub Bump(ByRef a, ByVal b)\na = a + 1\nb = b + 1\nEnd Sub\nx = 1\ny = 1\nBump x, y\nResponse.Write x & y";
    assert_eq!(out(src), "21");
}

#[test]
fn eval_exit_function() {
    let src = "Function f()\nf = 1\nExit Function\nf = 2\nEnd Function\nResponse.Write f()";
    assert_eq!(out(src), "1");
}

#[test]
fn eval_resume_next_continues() {
    let src = "On Error Resume Next\nx = 1 / 0\nResponse.Write \"after:\" & Err.Number\nErr.Clear\nResponse.Write \":\" & Err.Number";
    assert_eq!(out(src), "after:11:0");
}

#[test]
fn eval_without_resume_next_stops() {
    let program = crate::parser::parse("Response.Write \"a\"\nx = 1 / 0\nResponse.Write \"b\"").unwrap();
    let mut engine = Engine::new();
    let err = engine.run(&program).unwrap_err();
    assert_eq!(err.number(), 11);
    assert_eq!(engine.output(), "a");
    assert_eq!(engine.state(), RunState::Faulted);
    assert_eq!(engine.current_line(), 2);
}

#[test]
fn eval_goto0_restores_default_mode() {
    let src = "On Error Resume Next\nx = 1 / 0\nOn Error GoTo 0\nResponse.Write Err.Number\ny = 1 / 0";
    assert_eq!(error_number(src), 11);
}

#[test]
fn eval_err_raise() {
    let src = "On Error Resume Next\nErr.Raise 1000, \"app\", \"custom\"\nResponse.Write Err.Number & \"|\" & Err.Source & \"|\" & Err.Description";
    assert_eq!(out(src), "1000|app|custom");
    assert_eq!(error_number("Err.Raise vbObjectError + 1"), -2147221503);
}

#[test]
fn eval_option_explicit() {
    assert_eq!(error_number("Option Explicit\nx = 1"), 500);
    assert_eq!(out("Option Explicit\nDim x\nx = 1\nResponse.Write x"), "1");
}

#[test]
fn eval_option_compare_text() {
    assert_eq!(out("Option Compare Text\nResponse.Write (\"ABC\" = \"abc\")"), "True");
    assert_eq!(out("Response.Write (\"ABC\" = \"abc\")"), "False");
}

#[test]
fn eval_name_redefined() {
    assert_eq!(error_number("Dim a\nDim a"), 1041);
}

#[test]
fn eval_constants_are_read_only() {
    assert_eq!(error_number("Const A = 1\nA = 2"), 501);
    assert_eq!(out("Const A = 2 * 3\nResponse.Write A"), "6");
}

#[test]
fn eval_arrays_and_redim_preserve() {
    let src = "Dim a()\nReDim a(2)\na(0) = \"x\"\na(2) = \"z\"\nReDim Preserve a(4)\nResponse.Write a(0) & a(2) & IsEmpty(a(4)) & UBound(a)";
    assert_eq!(out(src), "xzTrue4");
    let src = "Dim a(1)\na(0) = 1\nReDim a(1)\nResponse.Write IsEmpty(a(0))";
    assert_eq!(error_number(src), 10);
}

#[test]
fn eval_multidimensional_array() {
    let src = "Dim m(1, 2)\nm(1, 2) = 7\nResponse.Write m(1, 2) & UBound(m, 2)";
    assert_eq!(out(src), "72");
    assert_eq!(error_number("Dim m(1)\nx = m(5)"), 9);
}

#[test]
fn eval_class_fields_methods_properties() {
    let src = r#"
Class Counter
    Private mCount
    Public Name
    Private Sub Class_Initialize()
        mCount = 10
    End Sub
    Public Sub Add(n)
        mCount = mCount + n
    End Sub
    Public Property Get Count()
        Count = mCount
    End Property
    Public Property Let Count(v)
        mCount = v
    End Property
End Class
Set c = New Counter
c.Add 5
c.Name = "n"
Response.Write c.Count & c.Name
c.Count = 1
Response.Write "," & c.Count
"#;
    assert_eq!(out(src), "15n,1");
}

#[test]
fn eval_private_member_is_hidden() {
    let src = "Class A\nPrivate secret\nEnd Class\nSet a = New A\nx = a.secret";
    assert_eq!(error_number(src), 438);
}

#[test]
fn eval_class_terminate_runs_on_release() {
    let src = "Class T\nPrivate Sub Class_Terminate()\nResponse.Write \"bye\"\nEnd Sub\nEnd Class\nSet t = New T\nSet t = Nothing\nResponse.Write \"!\"";
    assert_eq!(out(src), "bye!");
}

#[test]
fn eval_default_member_call() {
    let src = "Class Box\nPublic Default Function Item(i)\nItem = i * 2\nEnd Function\nEnd Class\nx = (New Box)(21)\nResponse.Write x";
    assert_eq!(out(src), "42");
}

#[test]
fn eval_with_block() {
    let src = "Class P\nPublic A\nPublic B\nEnd Class\nSet p = New P\nWith p\n.A = 1\n.B = .A + 1\nEnd With\nResponse.Write p.A & p.B";
    assert_eq!(out(src), "12");
}

#[test]
fn eval_is_and_nothing() {
    let src = "Class A\nEnd Class\nSet x = New A\nSet y = x\nResponse.Write (x Is y) & (x Is Nothing)";
    assert_eq!(out(src), "TrueFalse");
    assert_eq!(error_number("Set x = 1"), 424);
}

#[test]
fn eval_dictionary_through_create_object() {
    let src = "Set d = CreateObject(\"Scripting.Dictionary\")\nd.Add \"a\", 1\nd(\"b\") = 2\nFor Each k In d\nResponse.Write k & d(k)\nNext\nResponse.Write d.Count";
    assert_eq!(out(src), "a1b22");
    assert_eq!(error_number("Set x = CreateObject(\"Nope.Thing\")"), 429);
}

#[test]
fn eval_builtin_strings() {
    assert_eq!(out("Response.Write Mid(\"abcdef\", 2, 3) & Left(\"abc\", 1) & Right(\"abc\", 2)"), "bcdabc");
    assert_eq!(out("Response.Write InStr(\"hello\", \"l\") & InStr(4, \"hello\", \"l\") & InStrRev(\"hello\", \"l\")"), "344");
    assert_eq!(out("Response.Write Replace(\"a-b-c\", \"-\", \"+\")"), "a+b+c");
    assert_eq!(out("Response.Write Join(Split(\"a,b,c\", \",\"), \"|\")"), "a|b|c");
    assert_eq!(out("Response.Write UCase(\"ab\") & LCase(\"CD\") & Trim(\"  x  \") & Len(\"four\")"), "ABcdx4");
    assert_eq!(out("Response.Write StrComp(\"a\", \"B\", 1) & StrComp(\"b\", \"a\")"), "-11");
    assert_eq!(out("Response.Write Hex(255) & Oct(8) & Hex(-1)"), "FF10FFFFFFFF");
    assert_eq!(out("Response.Write Chr(65) & Asc(\"a\") & String(3, \"z\")"), "A97zzz");
}

#[test]
fn eval_builtin_conversions() {
    assert_eq!(out("Response.Write CInt(2.5) & CInt(3.5) & CLng(\"12\")"), "2412");
    assert_eq!(error_number("x = CInt(40000)"), 6);
    assert_eq!(out("Response.Write CBool(\"true\") & CBool(0)"), "TrueFalse");
    assert_eq!(out("Response.Write TypeName(1) & TypeName(\"s\") & TypeName(Empty) & VarType(Null)"), "IntegerStringEmpty1");
    assert_eq!(out("Response.Write IsNumeric(\"1.5\") & IsNumeric(\"x\") & IsArray(Array())"), "TrueFalseTrue");
}

#[test]
fn eval_builtin_math_and_format() {
    assert_eq!(out("Response.Write Abs(-3) & Int(-2.5) & Fix(-2.5) & Sgn(-9)"), "3-3-2-1");
    assert_eq!(out("Response.Write Round(2.345, 2) & \" \" & Round(2.5)"), "2.34 2");
    assert_eq!(out("Response.Write FormatNumber(1234.5)"), "1,234.50");
    assert_eq!(out("Response.Write FormatCurrency(-5)"), "-$5.00");
    assert_eq!(out("Response.Write FormatPercent(0.256, 1)"), "25.6%");
    assert_eq!(out("Response.Write 7 \\ 2 & \" \" & 7 Mod 3 & \" \" & 2 ^ 10"), "3 1 1024");
}

#[test]
fn eval_builtin_dates() {
    assert_eq!(out("d = #1/19/2026#\nResponse.Write Year(d) & \"-\" & Month(d) & \"-\" & Day(d)"), "2026-1-19");
    assert_eq!(out("Response.Write DateAdd(\"m\", 1, #1/31/2026#)"), "2/28/2026");
    assert_eq!(out("Response.Write DateDiff(\"d\", #1/1/2026#, #3/1/2026#)"), "59");
    assert_eq!(out("Response.Write DateSerial(2026, 14, 1)"), "2/1/2027");
    assert_eq!(out("Response.Write Weekday(#1/18/2026#) & WeekdayName(1, True) & MonthName(2)"), "1SunFebruary");
    assert_eq!(out("Response.Write FormatDateTime(#2026-03-04 13:05:09#, 4)"), "13:05");
}

#[test]
fn eval_date_literal_spellings_agree() {
    let src = "Response.Write (#1/19/2026# = #2026-01-19#) & (# 2026-1-19 # = #01/19/2026#)";
    assert_eq!(out(src), "TrueTrue");
}

#[test]
fn eval_eval_and_execute() {
    assert_eq!(out("x = 4\nResponse.Write Eval(\"x * 2\")"), "8");
    assert_eq!(out("Execute \"y = 3\"\nResponse.Write y"), "3");
    assert_eq!(out("Sub S()\nExecuteGlobal \"g = 9\"\nEnd Sub\nS\nResponse.Write g"), "9");
    let n = error_number("x = Eval(\"1 +\")");
    assert!((1002..=1058).contains(&n));
}

#[test]
fn eval_response_end_completes() {
    let program = crate::parser::parse("Response.Write \"a\"\nResponse.End\nResponse.Write \"b\"").unwrap();
    let mut engine = Engine::new();
    engine.run(&program).unwrap();
    assert_eq!(engine.output(), "a");
    assert_eq!(engine.state(), RunState::Completed);
}

#[test]
fn eval_timeout_keeps_partial_output() {
    let program = crate::parser::parse("Response.Write \"start\"\nDo\nLoop").unwrap();
    let mut engine = Engine::new();
    engine.set_timeout(Some(std::time::Duration::from_millis(50)));
    engine.restart_clock();
    let err = engine.run(&program).unwrap_err();
    assert!(matches!(err, EvalError::Timeout));
    assert!(!err.is_trappable());
    assert_eq!(engine.state(), RunState::TimedOut);
    assert_eq!(engine.output(), "start");
    assert!(matches!(engine.run(&program), Err(EvalError::Timeout)));
}

#[test]
fn eval_timeout_is_not_swallowed_by_resume_next() {
    let program = crate::parser::parse("On Error Resume Next\nDo\nLoop").unwrap();
    let mut engine = Engine::new();
    engine.set_timeout(Some(std::time::Duration::from_millis(20)));
    engine.restart_clock();
    assert!(matches!(engine.run(&program), Err(EvalError::Timeout)));
}

#[test]
fn eval_cancel_flag_interrupts() {
    use std::sync::atomic::AtomicBool;
    let flag = Arc::new(AtomicBool::new(true));
    let program = crate::parser::parse("Do\nLoop").unwrap();
    let mut engine = Engine::new();
    engine.set_cancel_flag(Arc::clone(&flag));
    assert!(matches!(engine.run(&program), Err(EvalError::Interrupted)));
}

#[test]
fn eval_recursion_limit() {
    let program = crate::parser::parse("Function f(n)\nf = f(n + 1)\nEnd Function\nx = f(1)").unwrap();
    let mut engine = Engine::new();
    engine.set_max_call_depth(50);
    assert_eq!(engine.run(&program).unwrap_err().number(), 28);
}

#[test]
fn eval_globals_survive_between_runs() {
    let mut engine = Engine::new();
    engine.run_source("x = 41").unwrap();
    engine.run_source("x = x + 1").unwrap();
    assert!(matches!(engine.global("X"), Some(Value::Integer(42))));
}

#[test]
fn eval_call_hook() {
    let mut engine = Engine::new();
    engine.run_source("Sub OnStart()\nResponse.Write \"started\"\nEnd Sub").unwrap();
    assert!(engine.call_hook("onstart").unwrap().is_some());
    assert!(engine.call_hook("missing").unwrap().is_none());
    assert_eq!(engine.output(), "started");
}

#[test]
fn eval_script_error_reports_line() {
    let mut engine = Engine::new();
    match engine.run_source("x = 1\ny = Foo.Bar") {
        Err(ScriptError::Runtime { line, number, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(number, 424);
        }
        other => panic!("unexpected: {:?}", other.err()),
    }
}

#[test]
fn eval_runaway_recursion_is_out_of_stack_space() {
    let src = "Function f(n)\nf = 1 + f(n + 1)\nEnd Function\nx = f(0)";
    assert_eq!(error_number(src), 28);

    let trapped = "Function f(n)\nf = 1 + f(n + 1)\nEnd Function\nOn Error Resume Next\nx = f(0)\nResponse.Write Err.Number";
    assert_eq!(out(trapped), "28");
}

#[test]
fn eval_stack_budget_stops_recursion_before_depth_limit() {
    let program = crate::parser::parse("Function f(n)\nf = f(n + 1)\nEnd Function\nx = f(1)").unwrap();
    let mut engine = Engine::new();
    engine.set_timeout(None);
    engine.set_max_call_depth(usize::MAX);
    engine.set_stack_budget(64 * 1024);
    assert!(matches!(engine.run(&program), Err(EvalError::OutOfStackSpace)));
}

#[test]
fn eval_script_stack_allows_deep_recursion() {
    let src = "Function Depth(n)\nIf n = 0 Then\nDepth = 0\nElse\nDepth = 1 + Depth(n - 1)\nEnd If\nEnd Function\nResponse.Write Depth(200)";
    let result = with_script_stack(|| run(src).map_err(|e| e.to_string())).unwrap();
    assert_eq!(result.unwrap(), "200");
}

#[test]
fn eval_oversized_arrays_are_out_of_memory() {
    assert_eq!(error_number("ReDim a(100000000000)"), 7);
    assert_eq!(error_number("Dim a(100000, 100000, 100000)"), 7);
    assert_eq!(error_number("Dim a()\nReDim Preserve a(9223372036854775806)"), 7);
    let src = "On Error Resume Next\nReDim a(100000000000)\nResponse.Write Err.Number\nErr.Clear\nReDim a(2)\nResponse.Write \",\" & UBound(a)";
    assert_eq!(out(src), "7,2");
}

#[test]
fn eval_oversized_strings_are_out_of_memory() {
    assert_eq!(error_number("s = Space(100000000000000)"), 7);
    assert_eq!(error_number("s = String(100000000000000, \"x\")"), 7);
    assert_eq!(error_number("s = Space(-1)"), 5);
    assert_eq!(out("On Error Resume Next\ns = String(1E15, 65)\nResponse.Write Err.Number & Len(s)"), "70");
    assert_eq!(out("Response.Write Len(Space(3)) & String(2, \"ab\")"), "3aa");
}

#[test]
fn eval_class_members_shadow_globals() {
    let src = r#"
count = 99
Class Tally
    Public Property Get Count()
        Count = 7
    End Property
    Public Function Show()
        Show = Count
    End Function
End Class
Set t = New Tally
Response.Write t.Show() & "," & count
"#;
    assert_eq!(out(src), "7,99");
}

#[test]
fn eval_member_fields_and_methods_shadow_globals() {
    let src = r#"
total = "global"
Function Label()
    Label = "global label"
End Function
Class Item
    Private total
    Private Sub Class_Initialize()
        total = "field"
    End Sub
    Public Function Label()
        Label = "member label"
    End Function
    Public Function Describe()
        Describe = total & "/" & Label()
    End Function
    Public Sub Update()
        total = "changed"
    End Sub
End Class
Set i = New Item
i.Update
Response.Write i.Describe() & ";" & total & ";" & Label()
"#;
    assert_eq!(out(src), "changed/member label;global;global label");
}

#[test]
fn eval_locals_shadow_members() {
    let src = r#"
Class Box
    Public Size
    Public Function Measure()
        Dim size
        size = 3
        Measure = size & ":" & Me.Size
    End Function
End Class
Set b = New Box
b.Size = 10
Response.Write b.Measure()
"#;
    assert_eq!(out(src), "3:10");
}

#[test]
fn eval_weekday_first_day_is_checked() {
    assert_eq!(out("Response.Write WeekdayName(1, True, 2)"), "Mon");
    assert_eq!(out("Response.Write WeekdayName(1, False, 0)"), "Sunday");
    assert_eq!(error_number("x = WeekdayName(1, False, 8)"), 5);
    assert_eq!(error_number("x = WeekdayName(1, False, -9223372036854775807)"), 5);
    assert_eq!(error_number("x = Weekday(#1/19/2026#, 9)"), 5);
    assert_eq!(out("Response.Write Weekday(#1/19/2026#, 2)"), "1");
}
