//! Traversal protocol over the AST.
//!
//! `Statement::accept` and `Expression::accept` inspect the node's kind and
//! forward to the matching `visit_*` method. The interpreter is one visitor;
//! [`SourcePrinter`] is another. Traversal below a node is the visitor's
//! choice, which keeps every pass in document order.

use crate::ast::*;

pub trait StatementVisitor {
    type Output;

    /// Category entry point; override to wrap every statement.
    fn visit_statement(&mut self, stmt: &Statement) -> Self::Output
    where
        Self: Sized,
    {
        stmt.accept(self)
    }

    fn visit_assignment(&mut self, node: &AssignmentStatement) -> Self::Output;
    fn visit_call(&mut self, node: &CallStatement) -> Self::Output;
    fn visit_call_sub(&mut self, node: &CallSubStatement) -> Self::Output;
    fn visit_if(&mut self, node: &IfStatement) -> Self::Output;
    fn visit_for(&mut self, node: &ForStatement) -> Self::Output;
    fn visit_for_each(&mut self, node: &ForEachStatement) -> Self::Output;
    fn visit_do(&mut self, node: &DoStatement) -> Self::Output;
    fn visit_while(&mut self, node: &WhileStatement) -> Self::Output;
    fn visit_select(&mut self, node: &SelectStatement) -> Self::Output;
    fn visit_with(&mut self, node: &WithStatement) -> Self::Output;
    fn visit_dim(&mut self, node: &VariablesDeclaration) -> Self::Output;
    fn visit_fields(&mut self, node: &FieldsDeclaration) -> Self::Output;
    fn visit_const(&mut self, node: &ConstsDeclaration) -> Self::Output;
    fn visit_redim(&mut self, node: &ReDimStatement) -> Self::Output;
    fn visit_erase(&mut self, node: &EraseStatement) -> Self::Output;
    fn visit_sub(&mut self, node: &ProcedureDeclaration) -> Self::Output;
    fn visit_function(&mut self, node: &ProcedureDeclaration) -> Self::Output;
    fn visit_property(&mut self, node: &PropertyDeclaration) -> Self::Output;
    fn visit_class(&mut self, node: &ClassDeclaration) -> Self::Output;
    fn visit_on_error_resume_next(&mut self) -> Self::Output;
    fn visit_on_error_goto0(&mut self) -> Self::Output;
    fn visit_exit(&mut self, kind: ExitKind) -> Self::Output;
}

pub trait ExpressionVisitor {
    type Output;

    /// Category entry point; override to wrap every expression.
    fn visit_expression(&mut self, expr: &Expression) -> Self::Output
    where
        Self: Sized,
    {
        expr.accept(self)
    }

    fn visit_literal(&mut self, lit: &Literal) -> Self::Output;
    fn visit_identifier(&mut self, name: &str) -> Self::Output;
    fn visit_unary(&mut self, node: &UnaryExpression) -> Self::Output;
    fn visit_binary(&mut self, node: &BinaryExpression) -> Self::Output;
    fn visit_index_or_call(&mut self, node: &IndexOrCallExpression) -> Self::Output;
    fn visit_member(&mut self, node: &MemberExpression) -> Self::Output;
    fn visit_with_member(&mut self, member: &str) -> Self::Output;
    fn visit_new(&mut self, class_name: &str) -> Self::Output;
    fn visit_missing(&mut self) -> Self::Output;
}

impl Statement {
    pub fn accept<V: StatementVisitor>(&self, visitor: &mut V) -> V::Output {
        match &self.kind {
            StatementKind::Assignment(n) => visitor.visit_assignment(n),
            StatementKind::Call(n) => visitor.visit_call(n),
            StatementKind::CallSub(n) => visitor.visit_call_sub(n),
            StatementKind::If(n) => visitor.visit_if(n),
            StatementKind::For(n) => visitor.visit_for(n),
            StatementKind::ForEach(n) => visitor.visit_for_each(n),
            StatementKind::Do(n) => visitor.visit_do(n),
            StatementKind::While(n) => visitor.visit_while(n),
            StatementKind::Select(n) => visitor.visit_select(n),
            StatementKind::With(n) => visitor.visit_with(n),
            StatementKind::Dim(n) => visitor.visit_dim(n),
            StatementKind::Fields(n) => visitor.visit_fields(n),
            StatementKind::Const(n) => visitor.visit_const(n),
            StatementKind::ReDim(n) => visitor.visit_redim(n),
            StatementKind::Erase(n) => visitor.visit_erase(n),
            StatementKind::Sub(n) => visitor.visit_sub(n),
            StatementKind::Function(n) => visitor.visit_function(n),
            StatementKind::Property(n) => visitor.visit_property(n),
            StatementKind::Class(n) => visitor.visit_class(n),
            StatementKind::OnErrorResumeNext => visitor.visit_on_error_resume_next(),
            StatementKind::OnErrorGoTo0 => visitor.visit_on_error_goto0(),
            StatementKind::Exit(kind) => visitor.visit_exit(*kind),
        }
    }
}

impl Expression {
    pub fn accept<V: ExpressionVisitor>(&self, visitor: &mut V) -> V::Output {
        match &self.kind {
            ExpressionKind::Literal(lit) => visitor.visit_literal(lit),
            ExpressionKind::Identifier(name) => visitor.visit_identifier(name),
            ExpressionKind::Unary(n) => visitor.visit_unary(n),
            ExpressionKind::Binary(n) => visitor.visit_binary(n),
            ExpressionKind::IndexOrCall(n) => visitor.visit_index_or_call(n),
            ExpressionKind::Member(n) => visitor.visit_member(n),
            ExpressionKind::WithMember(name) => visitor.visit_with_member(name),
            ExpressionKind::New(name) => visitor.visit_new(name),
            ExpressionKind::Missing => visitor.visit_missing(),
        }
    }
}

/// Renders a Program back to normalized source, one statement per line.
#[derive(Default)]
pub struct SourcePrinter {
    out: String,
    indent: usize,
}

impl SourcePrinter {
    pub fn print(program: &Program) -> String {
        let mut printer = SourcePrinter::default();
        if program.option_explicit {
            printer.line("Option Explicit");
        }
        if program.compare_mode == CompareMode::Text {
            printer.line("Option Compare Text");
        }
        printer.block(&program.body);
        printer.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, body: &[Statement]) {
        self.indent += 1;
        for stmt in body {
            self.visit_statement(stmt);
        }
        self.indent -= 1;
    }

    fn expr(&mut self, expr: &Expression) -> String {
        self.visit_expression(expr)
    }

    fn args(&mut self, args: &[Expression]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn variables(vars: &[VariableDeclaration]) -> String {
        vars.iter()
            .map(|v| {
                if v.dynamic_array {
                    format!("{}()", v.name)
                } else if v.dims.is_empty() {
                    v.name.clone()
                } else {
                    let dims: Vec<String> = v.dims.iter().map(|d| d.to_string()).collect();
                    format!("{}({})", v.name, dims.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn access(access: MethodAccess) -> &'static str {
        match access {
            MethodAccess::None => "",
            MethodAccess::Public => "Public ",
            MethodAccess::PublicDefault => "Public Default ",
            MethodAccess::Private => "Private ",
        }
    }

    fn procedure(&mut self, keyword: &str, node: &ProcedureDeclaration) {
        let params: Vec<String> = node
            .parameters
            .iter()
            .map(|p| {
                let mode = if p.mode == PassingMode::ByVal { "ByVal " } else { "" };
                let parens = if p.is_array { "()" } else { "" };
                format!("{}{}{}", mode, p.name, parens)
            })
            .collect();
        let head = format!(
            "{}{} {}({})",
            Self::access(node.access),
            keyword,
            node.name,
            params.join(", ")
        );
        self.line(&head);
        self.block(&node.body);
        let end = keyword.split(' ').next().unwrap_or(keyword);
        self.line(&format!("End {}", end));
    }
}

impl StatementVisitor for SourcePrinter {
    type Output = ();

    fn visit_assignment(&mut self, node: &AssignmentStatement) {
        let target = self.expr(&node.target);
        let value = self.expr(&node.value);
        let set = if node.is_set { "Set " } else { "" };
        self.line(&format!("{}{} = {}", set, target, value));
    }

    fn visit_call(&mut self, node: &CallStatement) {
        let callee = self.expr(&node.callee);
        self.line(&format!("Call {}", callee));
    }

    fn visit_call_sub(&mut self, node: &CallSubStatement) {
        let callee = self.expr(&node.callee);
        if node.arguments.is_empty() {
            self.line(&callee);
        } else {
            let args = self.args(&node.arguments);
            self.line(&format!("{} {}", callee, args));
        }
    }

    fn visit_if(&mut self, node: &IfStatement) {
        let cond = self.expr(&node.condition);
        self.line(&format!("If {} Then", cond));
        self.block(&node.consequent);
        for clause in &node.else_ifs {
            let cond = self.expr(&clause.condition);
            self.line(&format!("ElseIf {} Then", cond));
            self.block(&clause.body);
        }
        if let Some(alternate) = &node.alternate {
            self.line("Else");
            self.block(alternate);
        }
        self.line("End If");
    }

    fn visit_for(&mut self, node: &ForStatement) {
        let from = self.expr(&node.from);
        let to = self.expr(&node.to);
        let step = match &node.step {
            Some(step) => format!(" Step {}", self.expr(step)),
            None => String::new(),
        };
        self.line(&format!("For {} = {} To {}{}", node.variable, from, to, step));
        self.block(&node.body);
        self.line("Next");
    }

    fn visit_for_each(&mut self, node: &ForEachStatement) {
        let collection = self.expr(&node.collection);
        self.line(&format!("For Each {} In {}", node.variable, collection));
        self.block(&node.body);
        self.line("Next");
    }

    fn visit_do(&mut self, node: &DoStatement) {
        let clause = |p: &mut Self| -> String {
            match &node.condition {
                Some((which, _, cond)) => {
                    let word = if *which == LoopCondition::While { "While" } else { "Until" };
                    format!(" {} {}", word, p.expr(cond))
                }
                None => String::new(),
            }
        };
        let pre = matches!(node.condition, Some((_, ConditionTest::PreTest, _)));
        if pre {
            let head = clause(self);
            self.line(&format!("Do{}", head));
            self.block(&node.body);
            self.line("Loop");
        } else {
            self.line("Do");
            self.block(&node.body);
            let tail = clause(self);
            self.line(&format!("Loop{}", tail));
        }
    }

    fn visit_while(&mut self, node: &WhileStatement) {
        let cond = self.expr(&node.condition);
        self.line(&format!("While {}", cond));
        self.block(&node.body);
        self.line("Wend");
    }

    fn visit_select(&mut self, node: &SelectStatement) {
        let subject = self.expr(&node.subject);
        self.line(&format!("Select Case {}", subject));
        self.indent += 1;
        for case in &node.cases {
            if case.is_else {
                self.line("Case Else");
            } else {
                let values: Vec<String> = case
                    .values
                    .iter()
                    .map(|v| match v {
                        CaseValue::Value(e) => self.expr(e),
                        CaseValue::Comparison(op, e) => format!("Is {} {}", op.symbol(), self.expr(e)),
                        CaseValue::Range(a, b) => format!("{} To {}", self.expr(a), self.expr(b)),
                    })
                    .collect();
                self.line(&format!("Case {}", values.join(", ")));
            }
            self.block(&case.body);
        }
        self.indent -= 1;
        self.line("End Select");
    }

    fn visit_with(&mut self, node: &WithStatement) {
        let target = self.expr(&node.target);
        self.line(&format!("With {}", target));
        self.block(&node.body);
        self.line("End With");
    }

    fn visit_dim(&mut self, node: &VariablesDeclaration) {
        self.line(&format!("Dim {}", Self::variables(&node.variables)));
    }

    fn visit_fields(&mut self, node: &FieldsDeclaration) {
        let access = if node.access == Access::Public { "Public" } else { "Private" };
        self.line(&format!("{} {}", access, Self::variables(&node.fields)));
    }

    fn visit_const(&mut self, node: &ConstsDeclaration) {
        let access = match node.access {
            Some(Access::Public) => "Public ",
            Some(Access::Private) => "Private ",
            None => "",
        };
        let items: Vec<String> = node
            .constants
            .iter()
            .map(|c| format!("{} = {}", c.name, self.expr(&c.value)))
            .collect();
        self.line(&format!("{}Const {}", access, items.join(", ")));
    }

    fn visit_redim(&mut self, node: &ReDimStatement) {
        let targets: Vec<String> = node
            .targets
            .iter()
            .map(|t| format!("{}({})", t.name, self.args(&t.dims)))
            .collect();
        let preserve = if node.preserve { "Preserve " } else { "" };
        self.line(&format!("ReDim {}{}", preserve, targets.join(", ")));
    }

    fn visit_erase(&mut self, node: &EraseStatement) {
        self.line(&format!("Erase {}", node.names.join(", ")));
    }

    fn visit_sub(&mut self, node: &ProcedureDeclaration) {
        self.procedure("Sub", node);
    }

    fn visit_function(&mut self, node: &ProcedureDeclaration) {
        self.procedure("Function", node);
    }

    fn visit_property(&mut self, node: &PropertyDeclaration) {
        let keyword = match node.kind {
            PropertyKind::Get => "Property Get",
            PropertyKind::Let => "Property Let",
            PropertyKind::Set => "Property Set",
        };
        self.procedure(keyword, &node.procedure);
    }

    fn visit_class(&mut self, node: &ClassDeclaration) {
        self.line(&format!("Class {}", node.name));
        self.block(&node.members);
        self.line("End Class");
    }

    fn visit_on_error_resume_next(&mut self) {
        self.line("On Error Resume Next");
    }

    fn visit_on_error_goto0(&mut self) {
        self.line("On Error GoTo 0");
    }

    fn visit_exit(&mut self, kind: ExitKind) {
        let word = match kind {
            ExitKind::Do => "Do",
            ExitKind::For => "For",
            ExitKind::Sub => "Sub",
            ExitKind::Function => "Function",
            ExitKind::Property => "Property",
        };
        self.line(&format!("Exit {}", word));
    }
}

impl ExpressionVisitor for SourcePrinter {
    type Output = String;

    fn visit_literal(&mut self, lit: &Literal) -> String {
        match lit {
            Literal::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
            Literal::Integer(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Date(d) => format!("#{}#", crate::dates::format_date(d)),
            Literal::Boolean(true) => "True".into(),
            Literal::Boolean(false) => "False".into(),
            Literal::Null => "Null".into(),
            Literal::Empty => "Empty".into(),
            Literal::Nothing => "Nothing".into(),
        }
    }

    fn visit_identifier(&mut self, name: &str) -> String {
        name.to_string()
    }

    fn visit_unary(&mut self, node: &UnaryExpression) -> String {
        let operand = self.expr(&node.operand);
        match node.op {
            UnaryOperation::Plus => format!("+{}", operand),
            UnaryOperation::Minus => format!("-{}", operand),
            UnaryOperation::Not => format!("Not {}", operand),
        }
    }

    fn visit_binary(&mut self, node: &BinaryExpression) -> String {
        let left = self.expr(&node.left);
        let right = self.expr(&node.right);
        format!("({} {} {})", left, node.op.symbol(), right)
    }

    fn visit_index_or_call(&mut self, node: &IndexOrCallExpression) -> String {
        let callee = self.expr(&node.callee);
        let args = self.args(&node.arguments);
        format!("{}({})", callee, args)
    }

    fn visit_member(&mut self, node: &MemberExpression) -> String {
        let object = self.expr(&node.object);
        format!("{}.{}", object, node.member)
    }

    fn visit_with_member(&mut self, member: &str) -> String {
        format!(".{}", member)
    }

    fn visit_new(&mut self, class_name: &str) -> String {
        format!("(New {})", class_name)
    }

    fn visit_missing(&mut self) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_printer_normalizes_layout() {
        let program = parse("if a then b = 1 else c 2, 3").unwrap();
        let printed = SourcePrinter::print(&program);
        assert_eq!(printed, "If a Then\n    b = 1\nElse\n    c 2, 3\nEnd If\n");
    }

    #[test]
    fn test_printed_source_parses_back() {
        let src = "Class A\nPublic Default Function F(ByVal x)\nF = x * 2 + 1\nEnd Function\nEnd Class\n\
                   Select Case n\nCase 1 To 3, Is > 9\nx = (new A)(2)\nEnd Select";
        let program = parse(src).unwrap();
        let printed = SourcePrinter::print(&program);
        let reparsed = parse(&printed).unwrap();
        assert_eq!(SourcePrinter::print(&reparsed), printed);
    }

    /// Counts nodes to check that dispatch reaches every kind it should.
    struct Counter {
        statements: usize,
        identifiers: usize,
    }

    impl Counter {
        fn walk(&mut self, body: &[Statement]) {
            for stmt in body {
                self.visit_statement(stmt);
            }
        }
    }

    impl StatementVisitor for Counter {
        type Output = ();

        fn visit_statement(&mut self, stmt: &Statement) {
            self.statements += 1;
            stmt.accept(self)
        }
        fn visit_assignment(&mut self, node: &AssignmentStatement) {
            self.visit_expression(&node.target);
            self.visit_expression(&node.value);
        }
        fn visit_call(&mut self, _: &CallStatement) {}
        fn visit_call_sub(&mut self, _: &CallSubStatement) {}
        fn visit_if(&mut self, node: &IfStatement) {
            self.walk(&node.consequent);
            if let Some(alt) = &node.alternate {
                self.walk(alt);
            }
        }
        fn visit_for(&mut self, node: &ForStatement) {
            self.walk(&node.body);
        }
        fn visit_for_each(&mut self, _: &ForEachStatement) {}
        fn visit_do(&mut self, _: &DoStatement) {}
        fn visit_while(&mut self, _: &WhileStatement) {}
        fn visit_select(&mut self, _: &SelectStatement) {}
        fn visit_with(&mut self, _: &WithStatement) {}
        fn visit_dim(&mut self, _: &VariablesDeclaration) {}
        fn visit_fields(&mut self, _: &FieldsDeclaration) {}
        fn visit_const(&mut self, _: &ConstsDeclaration) {}
        fn visit_redim(&mut self, _: &ReDimStatement) {}
        fn visit_erase(&mut self, _: &EraseStatement) {}
        fn visit_sub(&mut self, _: &ProcedureDeclaration) {}
        fn visit_function(&mut self, _: &ProcedureDeclaration) {}
        fn visit_property(&mut self, _: &PropertyDeclaration) {}
        fn visit_class(&mut self, _: &ClassDeclaration) {}
        fn visit_on_error_resume_next(&mut self) {}
        fn visit_on_error_goto0(&mut self) {}
        fn visit_exit(&mut self, _: ExitKind) {}
    }

    impl ExpressionVisitor for Counter {
        type Output = ();

        fn visit_literal(&mut self, _: &Literal) {}
        fn visit_identifier(&mut self, _: &str) {
            self.identifiers += 1;
        }
        fn visit_unary(&mut self, node: &UnaryExpression) {
            self.visit_expression(&node.operand);
        }
        fn visit_binary(&mut self, node: &BinaryExpression) {
            self.visit_expression(&node.left);
            self.visit_expression(&node.right);
        }
        fn visit_index_or_call(&mut self, _: &IndexOrCallExpression) {}
        fn visit_member(&mut self, _: &MemberExpression) {}
        fn visit_with_member(&mut self, _: &str) {}
        fn visit_new(&mut self, _: &str) {}
        fn visit_missing(&mut self) {}
    }

    #[test]
    fn test_custom_visitor_dispatch() {
        let program = parse("x = a + b\nIf x Then\ny = -x\nEnd If\nFor i = 1 To 2\nz = i\nNext").unwrap();
        let mut counter = Counter {
            statements: 0,
            identifiers: 0,
        };
        counter.walk(&program.body);
        assert_eq!(counter.statements, 5);
        assert_eq!(counter.identifiers, 7);
    }
}
