use super::expressions::binary_operator;
use super::{PResult, Parser};
use crate::ast::{
    AssignmentStatement, BinaryOperation, CallStatement, CallSubStatement, CaseClause, CaseValue,
    ConditionTest, DoStatement, ElseIfClause, EraseStatement, ExitKind, Expression, ExpressionKind,
    ForEachStatement, ForStatement, IfStatement, LoopCondition, MethodAccess, SelectStatement,
    Statement, StatementKind, WhileStatement, WithStatement,
};
use crate::syntax_error::SyntaxErrorCode;
use crate::token::{Keyword, Punctuation, TokenKind};

impl Parser<'_> {
    pub(crate) fn parse_global_statement(&mut self) -> PResult<Option<Statement>> {
        let stmt = if self.match_keyword(Keyword::Class) {
            Some(self.parse_class()?)
        } else if self.match_keyword(Keyword::Sub) {
            Some(self.parse_procedure(Keyword::Sub, MethodAccess::None)?)
        } else if self.match_keyword(Keyword::Function) {
            Some(self.parse_procedure(Keyword::Function, MethodAccess::None)?)
        } else if self.match_keyword(Keyword::Public) || self.match_keyword(Keyword::Private) {
            Some(self.parse_public_or_private(true)?)
        } else {
            return self.parse_block_statement();
        };
        self.skip_comments();
        self.expect_eof_or_line_termination()?;
        Ok(stmt)
    }

    /// A statement on its own line (block forms allowed), including its terminator.
    pub(crate) fn parse_block_statement(&mut self) -> PResult<Option<Statement>> {
        match self.peek().kind {
            TokenKind::Comment { .. } => {
                self.skip_comments();
                self.expect_eof_or_line_termination()?;
                return Ok(None);
            }
            TokenKind::ColonLineTermination | TokenKind::LineTermination => {
                self.advance();
                return Ok(None);
            }
            _ => {}
        }

        let keyword = match self.peek().kind {
            TokenKind::Keyword { keyword, .. } => Some(keyword),
            _ => None,
        };
        let stmt = match keyword {
            Some(Keyword::If) => Some(self.parse_if()?),
            Some(Keyword::For) => Some(self.parse_for()?),
            Some(Keyword::Do) => Some(self.parse_do()?),
            Some(Keyword::Select) => Some(self.parse_select()?),
            Some(Keyword::While) => Some(self.parse_while()?),
            Some(Keyword::With) => Some(self.parse_with()?),
            Some(Keyword::Class | Keyword::Sub | Keyword::Function) => {
                return Err(self.error(SyntaxErrorCode::SyntaxError));
            }
            _ => self.parse_inline_statement()?,
        };

        self.skip_comments();
        self.expect_eof_or_line_termination()?;
        Ok(stmt)
    }

    /// Statements that may share a line with others (`a = 1 : b = 2`).
    pub(crate) fn parse_inline_statement(&mut self) -> PResult<Option<Statement>> {
        let start = self.mark();
        let kind = match self.peek().kind.clone() {
            TokenKind::Keyword { keyword, .. } => match keyword {
                Keyword::Dim => self.parse_dim()?,
                Keyword::ReDim => self.parse_redim()?,
                Keyword::Const => self.parse_const(None)?,
                Keyword::On => self.parse_on_error()?,
                Keyword::Exit => self.parse_exit()?,
                Keyword::Set => self.parse_set()?,
                Keyword::Call => {
                    self.advance();
                    let callee = self.parse_left_expression()?;
                    StatementKind::Call(CallStatement { callee })
                }
                Keyword::If => return self.parse_if().map(Some),
                Keyword::Option => {
                    self.consume_option_statement();
                    return Ok(None);
                }
                Keyword::Public | Keyword::Private => {
                    return self.parse_public_or_private(false).map(Some)
                }
                Keyword::Next => return Err(self.error(SyntaxErrorCode::UnexpectedNext)),
                Keyword::Loop => return Err(self.error(SyntaxErrorCode::LoopWithoutDo)),
                _ => return Err(self.error(SyntaxErrorCode::ExpectedStatement)),
            },
            TokenKind::KeywordOrIdentifier { keyword: Keyword::Erase, .. }
                if matches!(
                    self.peek_at(1).kind,
                    TokenKind::Identifier(_) | TokenKind::ExtendedIdentifier(_)
                ) =>
            {
                self.parse_erase()?
            }
            TokenKind::KeywordOrIdentifier {
                keyword: Keyword::Property | Keyword::Default,
                ..
            } if [Keyword::Get, Keyword::Let, Keyword::Set, Keyword::Sub, Keyword::Function]
                .iter()
                .any(|kw| self.peek_at(1).is_keyword(*kw)) =>
            {
                return Err(self.error(SyntaxErrorCode::MustBeDefinedInsideClass));
            }
            TokenKind::Punctuation(Punctuation::Dot) if self.with_depth > 0 => {
                self.parse_assignment_or_call()?
            }
            TokenKind::Identifier(_)
            | TokenKind::ExtendedIdentifier(_)
            | TokenKind::KeywordOrIdentifier { .. } => self.parse_assignment_or_call()?,
            TokenKind::Invalid(_) => return Err(self.error(SyntaxErrorCode::InvalidCharacter)),
            _ => return Err(self.error(SyntaxErrorCode::ExpectedStatement)),
        };
        Ok(Some(Statement {
            kind,
            span: self.span_from(start),
        }))
    }

    /// Inline statements separated by colons, ending at the line's end or at
    /// `Else` / `ElseIf` / `End`.
    pub(crate) fn parse_multi_inline(&mut self) -> PResult<Vec<Statement>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_comments();
            if self.match_eof()
                || self.match_keyword(Keyword::End)
                || self.match_keyword(Keyword::Else)
                || self.match_keyword(Keyword::ElseIf)
            {
                break;
            }
            if let Some(stmt) = self.parse_inline_statement()? {
                stmts.push(stmt);
            }
            self.skip_comments();
            if !self.opt_colon() {
                break;
            }
        }
        Ok(stmts)
    }

    /// Block statements until one of `terminators` (or end of input).
    pub(crate) fn parse_block_until(&mut self, terminators: &[Keyword]) -> PResult<Vec<Statement>> {
        let mut body = Vec::new();
        loop {
            self.skip_comments_and_newlines();
            if self.match_eof() || terminators.iter().any(|kw| self.match_keyword(*kw)) {
                return Ok(body);
            }
            if let Some(stmt) = self.parse_block_statement()? {
                body.push(stmt);
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Then, SyntaxErrorCode::ExpectedThen)?;
        self.skip_comments();

        let block = matches!(self.peek().kind, TokenKind::LineTermination);
        let mut stmt = IfStatement {
            condition,
            consequent: Vec::new(),
            else_ifs: Vec::new(),
            alternate: None,
        };

        if block {
            self.advance();
            let stops = [Keyword::End, Keyword::Else, Keyword::ElseIf];
            stmt.consequent = self.parse_block_until(&stops)?;
            while self.opt_keyword(Keyword::ElseIf) {
                let condition = self.parse_expression()?;
                self.expect_keyword(Keyword::Then, SyntaxErrorCode::ExpectedThen)?;
                let body = self.parse_block_until(&stops)?;
                stmt.else_ifs.push(ElseIfClause { condition, body });
            }
            if self.opt_keyword(Keyword::Else) {
                stmt.alternate = Some(self.parse_block_until(&[Keyword::End])?);
            }
            self.expect_keyword(Keyword::End, SyntaxErrorCode::ExpectedEnd)?;
            self.expect_keyword(Keyword::If, SyntaxErrorCode::ExpectedIf)?;
        } else {
            self.opt_colon();
            stmt.consequent = self.parse_multi_inline()?;
            self.skip_comments();
            if self.opt_keyword(Keyword::Else) {
                stmt.alternate = Some(self.parse_multi_inline()?);
                self.skip_comments();
            }
            if self.opt_keyword(Keyword::End) {
                self.expect_keyword(Keyword::If, SyntaxErrorCode::ExpectedIf)?;
            }
        }

        Ok(Statement {
            kind: StatementKind::If(stmt),
            span: self.span_from(start),
        })
    }

    fn parse_for(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let kind = if self.opt_keyword(Keyword::Each) {
            let variable = self.expect_identifier()?;
            self.expect_keyword(Keyword::In, SyntaxErrorCode::ExpectedIn)?;
            let collection = self.parse_expression()?;
            let body = self.parse_loop_body()?;
            StatementKind::ForEach(ForEachStatement {
                variable,
                collection,
                body,
            })
        } else {
            if !self.match_identifier() {
                return Err(self.error(SyntaxErrorCode::InvalidForLoopControlVariable));
            }
            let variable = self.expect_identifier()?;
            self.expect_punctuation(Punctuation::Equal, SyntaxErrorCode::ExpectedEqual)?;
            let from = self.parse_expression()?;
            self.expect_keyword(Keyword::To, SyntaxErrorCode::ExpectedTo)?;
            let to = self.parse_expression()?;
            let step = if self.opt_keyword(Keyword::Step) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let body = self.parse_loop_body()?;
            StatementKind::For(ForStatement {
                variable,
                from,
                to,
                step,
                body,
            })
        };
        self.expect_keyword(Keyword::Next, SyntaxErrorCode::ExpectedNext)?;
        Ok(Statement {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_loop_body(&mut self) -> PResult<Vec<Statement>> {
        self.skip_comments();
        self.expect_line_termination()?;
        self.exits.for_depth += 1;
        let body = self.parse_block_until(&[Keyword::Next]);
        self.exits.for_depth -= 1;
        body
    }

    fn parse_do(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();

        let mut condition = self.parse_loop_condition(ConditionTest::PreTest)?;

        self.skip_comments();
        self.expect_line_termination()?;

        self.exits.do_depth += 1;
        let body = self.parse_block_until(&[Keyword::Loop]);
        self.exits.do_depth -= 1;
        let body = body?;

        self.expect_keyword(Keyword::Loop, SyntaxErrorCode::ExpectedLoop)?;
        if condition.is_none() {
            condition = self.parse_loop_condition(ConditionTest::PostTest)?;
        }

        Ok(Statement {
            kind: StatementKind::Do(DoStatement { condition, body }),
            span: self.span_from(start),
        })
    }

    fn parse_loop_condition(
        &mut self,
        test: ConditionTest,
    ) -> PResult<Option<(LoopCondition, ConditionTest, Expression)>> {
        let which = if self.opt_keyword(Keyword::While) {
            LoopCondition::While
        } else if self.opt_keyword(Keyword::Until) {
            LoopCondition::Until
        } else {
            if !self.match_line_termination() && !self.match_eof() && !matches!(self.peek().kind, TokenKind::Comment { .. }) {
                return Err(self.error(SyntaxErrorCode::ExpectedWhileUntilOrEndOfStatement));
            }
            return Ok(None);
        };
        let expr = self.parse_expression()?;
        Ok(Some((which, test, expr)))
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let condition = self.parse_expression()?;
        self.skip_comments();
        self.expect_line_termination()?;
        let body = self.parse_block_until(&[Keyword::WEnd])?;
        self.expect_keyword(Keyword::WEnd, SyntaxErrorCode::ExpectedWend)?;
        Ok(Statement {
            kind: StatementKind::While(WhileStatement { condition, body }),
            span: self.span_from(start),
        })
    }

    fn parse_with(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let target = self.parse_expression()?;
        self.skip_comments();
        self.expect_line_termination()?;

        self.with_depth += 1;
        let body = self.parse_block_until(&[Keyword::End]);
        self.with_depth -= 1;
        let body = body?;

        self.expect_keyword(Keyword::End, SyntaxErrorCode::ExpectedEnd)?;
        self.expect_keyword(Keyword::With, SyntaxErrorCode::ExpectedWith)?;
        Ok(Statement {
            kind: StatementKind::With(WithStatement { target, body }),
            span: self.span_from(start),
        })
    }

    fn parse_select(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        self.expect_keyword(Keyword::Case, SyntaxErrorCode::ExpectedCase)?;
        let subject = self.parse_expression()?;
        self.skip_comments();
        self.expect_line_termination()?;

        let mut cases: Vec<CaseClause> = Vec::new();
        loop {
            self.skip_comments_and_newlines();
            if !self.opt_keyword(Keyword::Case) {
                break;
            }
            if cases.last().is_some_and(|c| c.is_else) {
                return Err(self.error(SyntaxErrorCode::ExpectedEnd));
            }

            let mut clause = CaseClause {
                values: Vec::new(),
                is_else: false,
                body: Vec::new(),
            };
            if self.opt_keyword(Keyword::Else) {
                clause.is_else = true;
            } else {
                clause.values.push(self.parse_case_value()?);
                while self.opt_punctuation(Punctuation::Comma) {
                    clause.values.push(self.parse_case_value()?);
                }
            }

            self.skip_comments();
            self.opt_line_termination();
            clause.body = self.parse_block_until(&[Keyword::Case, Keyword::End])?;
            cases.push(clause);
        }

        self.skip_comments_and_newlines();
        self.expect_keyword(Keyword::End, SyntaxErrorCode::ExpectedEnd)?;
        self.expect_keyword(Keyword::Select, SyntaxErrorCode::ExpectedSelect)?;
        Ok(Statement {
            kind: StatementKind::Select(SelectStatement { subject, cases }),
            span: self.span_from(start),
        })
    }

    fn parse_case_value(&mut self) -> PResult<CaseValue> {
        let had_is = self.opt_keyword(Keyword::Is);
        let comparison = match &self.peek().kind {
            TokenKind::Punctuation(p) => match p {
                Punctuation::Equal => Some(BinaryOperation::Equal),
                Punctuation::NotEqual => Some(BinaryOperation::NotEqual),
                Punctuation::Less => Some(BinaryOperation::Less),
                Punctuation::Greater => Some(BinaryOperation::Greater),
                Punctuation::LessOrEqual => Some(BinaryOperation::LessOrEqual),
                Punctuation::GreaterOrEqual => Some(BinaryOperation::GreaterOrEqual),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = comparison {
            self.advance();
            return Ok(CaseValue::Comparison(op, self.parse_expression()?));
        }
        if had_is {
            return Err(self.error(SyntaxErrorCode::SyntaxError));
        }
        let value = self.parse_expression()?;
        if self.opt_keyword(Keyword::To) {
            let upper = self.parse_expression()?;
            return Ok(CaseValue::Range(value, upper));
        }
        Ok(CaseValue::Value(value))
    }

    fn parse_on_error(&mut self) -> PResult<StatementKind> {
        self.advance();
        self.expect_keyword(Keyword::Error, SyntaxErrorCode::SyntaxError)?;
        if self.opt_keyword(Keyword::Resume) {
            self.expect_keyword(Keyword::Next, SyntaxErrorCode::SyntaxError)?;
            return Ok(StatementKind::OnErrorResumeNext);
        }
        self.expect_keyword(Keyword::Goto, SyntaxErrorCode::SyntaxError)?;
        if self.expect_integer()? != 0 {
            return Err(self.error(SyntaxErrorCode::SyntaxError));
        }
        Ok(StatementKind::OnErrorGoTo0)
    }

    fn parse_exit(&mut self) -> PResult<StatementKind> {
        self.advance();
        let exits = self.exits;
        let (kind, allowed) = if self.match_keyword(Keyword::Do) {
            (ExitKind::Do, exits.do_depth > 0)
        } else if self.match_keyword(Keyword::For) {
            (ExitKind::For, exits.for_depth > 0)
        } else if self.match_keyword(Keyword::Sub) {
            (ExitKind::Sub, exits.procedure == Some(Keyword::Sub))
        } else if self.match_keyword(Keyword::Function) {
            (ExitKind::Function, exits.procedure == Some(Keyword::Function))
        } else if self.match_keyword(Keyword::Property) {
            (ExitKind::Property, exits.procedure == Some(Keyword::Property))
        } else {
            return Err(self.error(SyntaxErrorCode::InvalidExitStatement));
        };
        if !allowed {
            return Err(self.error(SyntaxErrorCode::InvalidExitStatement));
        }
        self.advance();
        Ok(StatementKind::Exit(kind))
    }

    fn parse_erase(&mut self) -> PResult<StatementKind> {
        self.advance();
        let mut names = vec![self.expect_identifier()?];
        while self.opt_punctuation(Punctuation::Comma) {
            names.push(self.expect_identifier()?);
        }
        Ok(StatementKind::Erase(EraseStatement { names }))
    }

    fn parse_set(&mut self) -> PResult<StatementKind> {
        self.advance();
        let target = self.parse_left_expression()?;
        self.expect_punctuation(Punctuation::Equal, SyntaxErrorCode::ExpectedEqual)?;
        let value = self.parse_expression()?;
        Ok(StatementKind::Assignment(AssignmentStatement {
            target,
            value,
            is_set: true,
        }))
    }

    /// Tokens that end a call statement's bare argument list.
    fn at_statement_end(&self) -> bool {
        self.match_line_termination()
            || self.match_eof()
            || matches!(self.peek().kind, TokenKind::Comment { .. })
            || [
                Keyword::End,
                Keyword::Else,
                Keyword::ElseIf,
                Keyword::Next,
                Keyword::Loop,
                Keyword::WEnd,
            ]
            .iter()
            .any(|kw| matches!(&self.peek().kind, TokenKind::Keyword { keyword, .. } if keyword == kw))
    }

    fn parse_assignment_or_call(&mut self) -> PResult<StatementKind> {
        let left = self.parse_left_expression()?;

        if self.opt_punctuation(Punctuation::Equal) {
            let value = self.parse_expression()?;
            return Ok(StatementKind::Assignment(AssignmentStatement {
                target: left,
                value,
                is_set: false,
            }));
        }

        // `f(x)` / `f(x), y` / `f(x) & y`: a parenthesized first argument
        if let ExpressionKind::IndexOrCall(call) = &left.kind {
            if call.arguments.len() <= 1 {
                let starts_more = self.match_punctuation(Punctuation::Comma)
                    || binary_operator(self.peek()).is_some();
                if self.at_statement_end() || starts_more {
                    let callee = (*call.callee).clone();
                    let mut arguments = call.arguments.clone();
                    if let Some(first) = arguments.pop() {
                        let first_start = self.paren_argument_start(&first);
                        let first = self.parse_binary_from(first, 0, first_start)?;
                        arguments.push(first);
                    } else if starts_more {
                        return Err(self.error(SyntaxErrorCode::ExpectedExpression));
                    }
                    self.parse_more_arguments(&mut arguments)?;
                    return Ok(StatementKind::CallSub(CallSubStatement { callee, arguments }));
                }
            }
        }

        let mut arguments = Vec::new();
        if self.match_punctuation(Punctuation::Comma) {
            // `f , x`: leading omitted argument
            let here = self.mark();
            arguments.push(Expression::new(ExpressionKind::Missing, self.span_from(here)));
            self.parse_more_arguments(&mut arguments)?;
        } else if !self.at_statement_end() {
            arguments.push(self.parse_expression()?);
            self.parse_more_arguments(&mut arguments)?;
        }
        Ok(StatementKind::CallSub(CallSubStatement {
            callee: left,
            arguments,
        }))
    }

    /// Token index where the parenthesized argument of `f (x)` began.
    fn paren_argument_start(&self, first: &Expression) -> usize {
        let mut idx = self.mark();
        while idx > 0 && self.token_start(idx) > first.span.start {
            idx -= 1;
        }
        idx.saturating_sub(1)
    }

    fn token_start(&self, idx: usize) -> usize {
        self.tokens.get(idx).map(|t| t.start).unwrap_or(0)
    }

    fn parse_more_arguments(&mut self, arguments: &mut Vec<Expression>) -> PResult<()> {
        while self.opt_punctuation(Punctuation::Comma) {
            if self.match_punctuation(Punctuation::Comma) || self.at_statement_end() {
                let here = self.mark();
                arguments.push(Expression::new(ExpressionKind::Missing, self.span_from(here)));
            } else {
                arguments.push(self.parse_expression()?);
            }
        }
        Ok(())
    }
}
