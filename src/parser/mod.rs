//! Recursive-descent parser.
//!
//! Converts the token stream into a `Program`. One token of lookahead is
//! enough for almost every decision; the call-without-parentheses form peeks
//! at the token after a parenthesized argument to decide whether it was the
//! start of a larger expression.
//!
//! The grammar is split across submodules, each adding `impl Parser` blocks:
//! - `statements`: block and inline statements
//! - `declarations`: Dim/Const/ReDim, procedures, properties, classes
//! - `expressions`: operator precedence and left expressions

mod declarations;
mod expressions;
mod statements;

use crate::ast::{CompareMode, Program, Span, IDENTIFIER_MAX_LENGTH};
use crate::lexer::lex;
use crate::syntax_error::{SyntaxError, SyntaxErrorCode};
use crate::token::{Keyword, Punctuation, Token, TokenKind};

pub(crate) type PResult<T> = Result<T, SyntaxError>;

/// Which `Exit` forms are legal at the current point.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExitContext {
    pub(crate) do_depth: usize,
    pub(crate) for_depth: usize,
    pub(crate) procedure: Option<Keyword>,
}

/// Parser state
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    /// Nesting depth of With blocks; `.name` is only legal when non-zero
    pub(crate) with_depth: usize,
    pub(crate) exits: ExitContext,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Result<Self, SyntaxError> {
        let tokens = lex(source)?;
        Ok(Parser {
            source,
            tokens,
            pos: 0,
            with_depth: 0,
            exits: ExitContext::default(),
        })
    }

    /// Peek at the current token without consuming it
    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    /// Look `n` tokens past the current one
    pub(crate) fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    /// Consume and return the current token
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn mark(&self) -> usize {
        self.pos
    }

    /// Span from the token at `start` through the last consumed token.
    pub(crate) fn span_from(&self, start: usize) -> Span {
        let first = &self.tokens[start.min(self.tokens.len().saturating_sub(1))];
        let end = if self.pos > 0 {
            self.tokens[self.pos - 1].end.max(first.start)
        } else {
            first.start
        };
        Span {
            start: first.start,
            end,
            line: first.line,
            column: first.column(),
        }
    }

    pub(crate) fn error(&self, code: SyntaxErrorCode) -> SyntaxError {
        let token = self.peek();
        let text = match token.kind {
            TokenKind::Eof | TokenKind::LineTermination | TokenKind::ColonLineTermination => {
                String::new()
            }
            _ => self
                .source
                .get(token.start..token.end)
                .map(str::to_string)
                .unwrap_or_else(|| token.text()),
        };
        SyntaxError {
            code,
            line: token.line,
            column: token.column(),
            token: text,
            line_text: SyntaxError::line_of(self.source, token.line_start),
            detail: None,
        }
    }

    pub(crate) fn match_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn match_line_termination(&self) -> bool {
        self.peek().is_line_termination()
    }

    pub(crate) fn match_colon(&self) -> bool {
        self.peek().kind == TokenKind::ColonLineTermination
    }

    pub(crate) fn match_keyword(&self, kw: Keyword) -> bool {
        self.peek().is_keyword(kw)
    }

    pub(crate) fn opt_keyword(&mut self, kw: Keyword) -> bool {
        if self.match_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: Keyword, code: SyntaxErrorCode) -> PResult<()> {
        if self.opt_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }

    pub(crate) fn match_punctuation(&self, p: Punctuation) -> bool {
        self.peek().is_punctuation(p)
    }

    pub(crate) fn opt_punctuation(&mut self, p: Punctuation) -> bool {
        if self.match_punctuation(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_punctuation(&mut self, p: Punctuation, code: SyntaxErrorCode) -> PResult<()> {
        if self.opt_punctuation(p) {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }

    /// Plain identifiers, bracketed identifiers and keywords usable as names.
    pub(crate) fn match_identifier(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Identifier(_)
                | TokenKind::ExtendedIdentifier(_)
                | TokenKind::KeywordOrIdentifier { .. }
        )
    }

    /// True if the current token is a bare word with the given spelling.
    pub(crate) fn match_word(&self, word: &str) -> bool {
        match &self.peek().kind {
            TokenKind::Identifier(name) => name.eq_ignore_ascii_case(word),
            _ => false,
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> PResult<String> {
        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::KeywordOrIdentifier { name, .. } => name.clone(),
            TokenKind::ExtendedIdentifier(name) => name
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string(),
            TokenKind::Invalid(_) => return Err(self.error(SyntaxErrorCode::InvalidCharacter)),
            _ => return Err(self.error(SyntaxErrorCode::ExpectedIdentifier)),
        };
        if name.len() > IDENTIFIER_MAX_LENGTH {
            return Err(self.error(SyntaxErrorCode::IdentifierTooLong));
        }
        self.advance();
        Ok(name)
    }

    /// A member name after `.`: any identifier, and any keyword at all.
    pub(crate) fn expect_member_name(&mut self) -> PResult<String> {
        let name = match &self.peek().kind {
            TokenKind::Keyword { name, .. } => name.clone(),
            TokenKind::BooleanLiteral(_)
            | TokenKind::NullLiteral
            | TokenKind::EmptyLiteral
            | TokenKind::NothingLiteral => {
                let t = self.peek();
                self.source[t.start..t.end].to_string()
            }
            _ => return self.expect_identifier(),
        };
        self.advance();
        Ok(name)
    }

    pub(crate) fn opt_line_termination(&mut self) -> bool {
        if self.match_line_termination() {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn opt_colon(&mut self) -> bool {
        if self.match_colon() {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_line_termination(&mut self) -> PResult<()> {
        if self.opt_line_termination() {
            return Ok(());
        }
        Err(self.end_of_statement_error())
    }

    pub(crate) fn expect_eof_or_line_termination(&mut self) -> PResult<()> {
        if self.match_eof() || self.opt_line_termination() {
            return Ok(());
        }
        Err(self.end_of_statement_error())
    }

    fn end_of_statement_error(&self) -> SyntaxError {
        match self.peek().kind {
            TokenKind::Invalid(_) => self.error(SyntaxErrorCode::InvalidCharacter),
            _ => self.error(SyntaxErrorCode::ExpectedEndOfStatement),
        }
    }

    pub(crate) fn skip_comments(&mut self) {
        while matches!(self.peek().kind, TokenKind::Comment { .. }) {
            self.advance();
        }
    }

    pub(crate) fn skip_comments_and_newlines(&mut self) {
        while matches!(
            self.peek().kind,
            TokenKind::Comment { .. } | TokenKind::LineTermination | TokenKind::ColonLineTermination
        ) {
            self.advance();
        }
    }

    pub(crate) fn expect_integer(&mut self) -> PResult<i64> {
        match self.peek().kind {
            TokenKind::IntegerLiteral { value, .. } => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.error(SyntaxErrorCode::ExpectedInteger)),
        }
    }

    /// Parse the entire input into a Program
    pub fn parse(&mut self) -> PResult<Program> {
        self.skip_comments_and_newlines();
        let mut program = Program::default();
        self.parse_options(&mut program)?;

        loop {
            self.skip_comments_and_newlines();
            if self.match_eof() {
                break;
            }
            if let Some(stmt) = self.parse_global_statement()? {
                program.body.push(stmt);
            }
        }

        Ok(program)
    }

    /// Leading `Option Explicit | Compare Text/Binary | Base 0/1` lines.
    fn parse_options(&mut self, program: &mut Program) -> PResult<()> {
        loop {
            self.skip_comments_and_newlines();
            if !self.opt_keyword(Keyword::Option) {
                return Ok(());
            }
            if self.opt_keyword(Keyword::Explicit) {
                program.option_explicit = true;
            } else if self.match_word("compare") {
                self.advance();
                if self.match_word("text") {
                    program.compare_mode = CompareMode::Text;
                } else if self.match_word("binary") {
                    program.compare_mode = CompareMode::Binary;
                } else {
                    return Err(self.error(SyntaxErrorCode::SyntaxError));
                }
                self.advance();
            } else if self.match_word("base") {
                self.advance();
                let base = self.expect_integer()?;
                if base != 0 && base != 1 {
                    return Err(self.error(SyntaxErrorCode::SyntaxError));
                }
                program.option_base = base as u8;
            } else {
                return Err(self.error(SyntaxErrorCode::SyntaxError));
            }
            self.skip_comments();
            self.expect_eof_or_line_termination()?;
        }
    }

    /// An `Option` line after the first statement is accepted and ignored.
    pub(crate) fn consume_option_statement(&mut self) {
        self.advance();
        if self.opt_keyword(Keyword::Explicit) {
            return;
        }
        if self.match_word("compare") {
            self.advance();
            if self.match_word("text") || self.match_word("binary") {
                self.advance();
            }
        } else if self.match_word("base") {
            self.advance();
            if matches!(self.peek().kind, TokenKind::IntegerLiteral { .. }) {
                self.advance();
            }
        }
    }
}

/// Parse source text into a Program
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    Parser::new(source)?.parse()
}

/// Parse a lone expression, as `Eval` receives it.
pub fn parse_expression(source: &str) -> Result<crate::ast::Expression, SyntaxError> {
    let mut parser = Parser::new(source)?;
    parser.skip_comments_and_newlines();
    let expr = parser.parse_expression()?;
    parser.skip_comments_and_newlines();
    if !parser.match_eof() {
        return Err(parser.end_of_statement_error());
    }
    Ok(expr)
}

#[cfg(test)]
mod tests;
