use super::*;
use crate::ast::*;

fn body(source: &str) -> Vec<Statement> {
    parse(source).unwrap().body
}

fn single(source: &str) -> StatementKind {
    let mut stmts = body(source);
    assert_eq!(stmts.len(), 1, "expected one statement in {:?}", source);
    stmts.remove(0).kind
}

fn error_code(source: &str) -> u32 {
    parse(source).unwrap_err().code.number()
}

fn ident(expr: &Expression) -> &str {
    match &expr.kind {
        ExpressionKind::Identifier(name) => name,
        other => panic!("expected identifier, got {:?}", other),
    }
}

fn assigned_value(source: &str) -> Expression {
    match single(source) {
        StatementKind::Assignment(a) => a.value,
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_precedence() {
    let value = assigned_value("x = 1 + 2 * 3");
    let ExpressionKind::Binary(add) = value.kind else {
        panic!("expected binary")
    };
    assert_eq!(add.op, BinaryOperation::Addition);
    match &add.right.kind {
        ExpressionKind::Binary(mul) => assert_eq!(mul.op, BinaryOperation::Multiplication),
        other => panic!("expected multiplication, got {:?}", other),
    }
}

#[test]
fn test_power_binds_tighter_than_negation() {
    let value = assigned_value("x = -2 ^ 2");
    let ExpressionKind::Unary(neg) = value.kind else {
        panic!("expected unary")
    };
    assert_eq!(neg.op, UnaryOperation::Minus);
    assert!(matches!(
        &neg.operand.kind,
        ExpressionKind::Binary(b) if b.op == BinaryOperation::Exponentiation
    ));
}

#[test]
fn test_not_is_lower_than_comparison() {
    let value = assigned_value("x = Not a = b");
    let ExpressionKind::Unary(not) = value.kind else {
        panic!("expected unary")
    };
    assert_eq!(not.op, UnaryOperation::Not);
    assert!(matches!(
        &not.operand.kind,
        ExpressionKind::Binary(b) if b.op == BinaryOperation::Equal
    ));
}

#[test]
fn test_call_without_parentheses() {
    match single("Response.Write \"hi\", 2") {
        StatementKind::CallSub(call) => {
            match &call.callee.kind {
                ExpressionKind::Member(m) => {
                    assert_eq!(ident(&m.object), "Response");
                    assert_eq!(m.member, "Write");
                }
                other => panic!("expected member, got {:?}", other),
            }
            assert_eq!(call.arguments.len(), 2);
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_parenthesized_first_argument_continues_expression() {
    match single("Response.Write (a) & b") {
        StatementKind::CallSub(call) => {
            assert_eq!(call.arguments.len(), 1);
            assert!(matches!(
                &call.arguments[0].kind,
                ExpressionKind::Binary(b) if b.op == BinaryOperation::Concatenation
            ));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_parenthesized_first_argument_then_more() {
    match single("f(1), 2") {
        StatementKind::CallSub(call) => {
            assert_eq!(ident(&call.callee), "f");
            assert_eq!(call.arguments.len(), 2);
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_empty_literal_as_argument() {
    match single("editor.replaceAll empty") {
        StatementKind::CallSub(call) => {
            assert_eq!(call.arguments.len(), 1);
            assert!(matches!(
                call.arguments[0].kind,
                ExpressionKind::Literal(Literal::Empty)
            ));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_omitted_arguments() {
    match single("f , 2,") {
        StatementKind::CallSub(call) => {
            assert_eq!(call.arguments.len(), 3);
            assert!(matches!(call.arguments[0].kind, ExpressionKind::Missing));
            assert!(matches!(call.arguments[2].kind, ExpressionKind::Missing));
        }
        other => panic!("expected call, got {:?}", other),
    }
    let value = assigned_value("x = f(1, , 3)");
    let ExpressionKind::IndexOrCall(call) = value.kind else {
        panic!("expected call")
    };
    assert!(matches!(call.arguments[1].kind, ExpressionKind::Missing));
}

#[test]
fn test_new_with_default_call() {
    let value = assigned_value("x = (new Foo)(empty, 1)");
    let ExpressionKind::IndexOrCall(call) = value.kind else {
        panic!("expected call")
    };
    assert!(matches!(&call.callee.kind, ExpressionKind::New(name) if name == "Foo"));
    assert_eq!(call.arguments.len(), 2);
}

#[test]
fn test_keywords_as_member_names() {
    let value = assigned_value("x = obj.End + obj.Class + obj.Empty");
    let mut members = Vec::new();
    let mut stack = vec![&value];
    while let Some(expr) = stack.pop() {
        match &expr.kind {
            ExpressionKind::Binary(b) => {
                stack.push(&b.left);
                stack.push(&b.right);
            }
            ExpressionKind::Member(m) => members.push(m.member.clone()),
            _ => {}
        }
    }
    members.sort();
    assert_eq!(members, vec!["Class", "Empty", "End"]);
    assert!(matches!(single("Response.End"), StatementKind::CallSub(_)));
}

#[test]
fn test_bracketed_identifier() {
    match single("[my var] = 1") {
        StatementKind::Assignment(a) => assert_eq!(ident(&a.target), "my var"),
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_options() {
    let program = parse("Option Explicit\nOption Compare Text\nDim x").unwrap();
    assert!(program.option_explicit);
    assert_eq!(program.compare_mode, CompareMode::Text);
    assert_eq!(program.body.len(), 1);
}

#[test]
fn test_single_line_if_else() {
    match single("If a Then b = 1 : c = 2 Else d = 3") {
        StatementKind::If(stmt) => {
            assert_eq!(stmt.consequent.len(), 2);
            assert_eq!(stmt.alternate.map(|a| a.len()), Some(1));
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_block_if_elseif_else() {
    let src = "If a Then\n  x = 1\nElseIf b Then\n  x = 2\nElseIf c Then x = 3\nElse\n  x = 4\nEnd If";
    match single(src) {
        StatementKind::If(stmt) => {
            assert_eq!(stmt.consequent.len(), 1);
            assert_eq!(stmt.else_ifs.len(), 2);
            assert_eq!(stmt.alternate.map(|a| a.len()), Some(1));
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_for_loops() {
    match single("For i = 10 To 1 Step -1\n  x = x + i\nNext") {
        StatementKind::For(stmt) => {
            assert_eq!(stmt.variable, "i");
            assert!(stmt.step.is_some());
            assert_eq!(stmt.body.len(), 1);
        }
        other => panic!("expected for, got {:?}", other),
    }
    assert!(matches!(
        single("For Each k In d.Keys\nNext"),
        StatementKind::ForEach(_)
    ));
}

#[test]
fn test_do_loop_forms() {
    match single("Do\n  i = i + 1\nLoop Until i > 3") {
        StatementKind::Do(stmt) => {
            let (which, test, _) = stmt.condition.unwrap();
            assert_eq!(which, LoopCondition::Until);
            assert_eq!(test, ConditionTest::PostTest);
        }
        other => panic!("expected do, got {:?}", other),
    }
    match single("Do While i < 3\n  i = i + 1\nLoop") {
        StatementKind::Do(stmt) => {
            assert_eq!(stmt.condition.unwrap().1, ConditionTest::PreTest);
        }
        other => panic!("expected do, got {:?}", other),
    }
    assert!(matches!(
        single("While x\n  x = False\nWend"),
        StatementKind::While(_)
    ));
}

#[test]
fn test_select_case() {
    let src = "Select Case n\nCase 1, 2\n  a = 1\nCase Is > 10: a = 2\nCase 3 To 5\nCase Else\n  a = 4\nEnd Select";
    match single(src) {
        StatementKind::Select(stmt) => {
            assert_eq!(stmt.cases.len(), 4);
            assert_eq!(stmt.cases[0].values.len(), 2);
            assert!(matches!(
                stmt.cases[1].values[0],
                CaseValue::Comparison(BinaryOperation::Greater, _)
            ));
            assert_eq!(stmt.cases[1].body.len(), 1);
            assert!(matches!(stmt.cases[2].values[0], CaseValue::Range(_, _)));
            assert!(stmt.cases[3].is_else);
        }
        other => panic!("expected select, got {:?}", other),
    }
}

#[test]
fn test_nested_with_members() {
    let src = "With a\n  .x = 1\n  With .b\n    .y = 2\n  End With\n  .z = 3\nEnd With";
    match single(src) {
        StatementKind::With(stmt) => {
            assert_eq!(stmt.body.len(), 3);
            match &stmt.body[2].kind {
                StatementKind::Assignment(a) => {
                    assert!(matches!(&a.target.kind, ExpressionKind::WithMember(m) if m == "z"))
                }
                other => panic!("expected assignment, got {:?}", other),
            }
        }
        other => panic!("expected with, got {:?}", other),
    }
}

#[test]
fn test_declarations() {
    match single("Dim a, b(3), c(), d(2, 4)") {
        StatementKind::Dim(decl) => {
            assert_eq!(decl.variables.len(), 4);
            assert_eq!(decl.variables[1].dims, vec![3]);
            assert!(decl.variables[2].dynamic_array);
            assert_eq!(decl.variables[3].dims, vec![2, 4]);
        }
        other => panic!("expected dim, got {:?}", other),
    }
    match single("ReDim Preserve a(n + 1), b(2)") {
        StatementKind::ReDim(stmt) => {
            assert!(stmt.preserve);
            assert_eq!(stmt.targets.len(), 2);
        }
        other => panic!("expected redim, got {:?}", other),
    }
    match single("Const A = 1, B = -2.5, C = \"x\"") {
        StatementKind::Const(decl) => assert_eq!(decl.constants.len(), 3),
        other => panic!("expected const, got {:?}", other),
    }
    match single("Erase a, b") {
        StatementKind::Erase(stmt) => assert_eq!(stmt.names, vec!["a", "b"]),
        other => panic!("expected erase, got {:?}", other),
    }
}

#[test]
fn test_procedures() {
    let src = "Function Add(ByVal a, b)\n  Add = a + b\nEnd Function\nSub Hello() : Response.Write \"x\" : End Sub";
    let stmts = body(src);
    assert_eq!(stmts.len(), 2);
    match &stmts[0].kind {
        StatementKind::Function(f) => {
            assert_eq!(f.parameters.len(), 2);
            assert_eq!(f.parameters[0].mode, PassingMode::ByVal);
            assert_eq!(f.parameters[1].mode, PassingMode::ByRef);
        }
        other => panic!("expected function, got {:?}", other),
    }
    match &stmts[1].kind {
        StatementKind::Sub(s) => assert_eq!(s.body.len(), 1),
        other => panic!("expected sub, got {:?}", other),
    }
}

#[test]
fn test_class_declaration() {
    let src = r#"
Class Person
    Private m_name
    Public Age
    Public Default Property Get Name
        Name = m_name
    End Property
    Public Property Let Name(v)
        m_name = v
    End Property
    Private Sub Class_Initialize()
        m_name = "anon"
    End Sub
End Class
"#;
    match single(src) {
        StatementKind::Class(class) => {
            assert_eq!(class.name, "Person");
            assert_eq!(class.members.len(), 5);
            match &class.members[2].kind {
                StatementKind::Property(p) => {
                    assert_eq!(p.kind, PropertyKind::Get);
                    assert_eq!(p.procedure.access, MethodAccess::PublicDefault);
                }
                other => panic!("expected property, got {:?}", other),
            }
        }
        other => panic!("expected class, got {:?}", other),
    }
}

#[test]
fn test_comments_and_blank_lines() {
    let stmts = body("' leading\n\nx = 1 ' trailing\nREM note\n: y = 2");
    assert_eq!(stmts.len(), 2);
}

#[test]
fn test_syntax_error_codes() {
    assert_eq!(error_code("If a Then\n  x = 1\n"), 1014);
    assert_eq!(error_code("x = 1 +"), 1023);
    assert_eq!(error_code("For i = 1 10\nNext"), 1013);
    assert_eq!(error_code("Exit For"), 1039);
    assert_eq!(error_code("Do\n  Exit For\nLoop"), 1039);
    assert_eq!(error_code("Next"), 1055);
    assert_eq!(error_code("Loop"), 1038);
    assert_eq!(error_code("Const x = y"), 1045);
    assert_eq!(error_code("x = 12abc"), 1025);
    assert_eq!(error_code("Set x 1"), 1011);
    assert_eq!(error_code("While x\n"), 1018);
    assert_eq!(error_code("Sub f\n"), 1014);
    assert_eq!(error_code("Select Case x\nCase Else\nCase 1\nEnd Select"), 1014);
}

#[test]
fn test_class_validation_codes() {
    let two_defaults = "Class A\nPublic Default Function F()\nEnd Function\nPublic Default Sub G()\nEnd Sub\nEnd Class";
    assert_eq!(error_code(two_defaults), 1052);
    let init_args = "Class A\nSub Class_Initialize(x)\nEnd Sub\nEnd Class";
    assert_eq!(error_code(init_args), 1053);
    let let_no_args = "Class A\nProperty Let V\nEnd Property\nEnd Class";
    assert_eq!(error_code(let_no_args), 1054);
    let default_field = "Class A\nPublic Default x\nEnd Class";
    assert_eq!(error_code(default_field), 1056);
    let private_default = "Class A\nPrivate Default Function F()\nEnd Function\nEnd Class";
    assert_eq!(error_code(private_default), 1057);
    let default_let = "Class A\nPublic Default Property Let V(x)\nEnd Property\nEnd Class";
    assert_eq!(error_code(default_let), 1058);
    assert_eq!(error_code("Class A\nProperty Value\nEnd Class"), 1049);
    assert_eq!(error_code("Public Default Function F()\nEnd Function"), 1048);
}

#[test]
fn test_error_position() {
    let err = parse("x = 1\ny = (2 + \n").unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.line_text, "y = (2 + ");
}
