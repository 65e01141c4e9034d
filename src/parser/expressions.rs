//! Expressions: precedence climbing for binary operators, then unary, power,
//! values and left expressions with their `.member` / `(args)` postfixes.

use super::{PResult, Parser};
use crate::ast::{
    BinaryExpression, BinaryOperation, Expression, ExpressionKind, IndexOrCallExpression, Literal,
    MemberExpression, UnaryExpression, UnaryOperation,
};
use crate::syntax_error::SyntaxErrorCode;
use crate::token::{Keyword, Punctuation, Token, TokenKind};

/// Precedence of `Not` as a prefix operator.
const NOT_PRECEDENCE: u8 = 15;

pub(crate) fn binary_operator(token: &Token) -> Option<(BinaryOperation, u8)> {
    match &token.kind {
        TokenKind::Punctuation(p) => match p {
            Punctuation::Star => Some((BinaryOperation::Multiplication, 50)),
            Punctuation::Slash => Some((BinaryOperation::Division, 50)),
            Punctuation::Backslash => Some((BinaryOperation::IntDivision, 49)),
            Punctuation::Plus => Some((BinaryOperation::Addition, 47)),
            Punctuation::Minus => Some((BinaryOperation::Subtraction, 47)),
            Punctuation::Amp => Some((BinaryOperation::Concatenation, 46)),
            Punctuation::Equal => Some((BinaryOperation::Equal, 30)),
            Punctuation::NotEqual => Some((BinaryOperation::NotEqual, 29)),
            Punctuation::Greater => Some((BinaryOperation::Greater, 29)),
            Punctuation::Less => Some((BinaryOperation::Less, 28)),
            Punctuation::LessOrEqual => Some((BinaryOperation::LessOrEqual, 27)),
            Punctuation::GreaterOrEqual => Some((BinaryOperation::GreaterOrEqual, 26)),
            _ => None,
        },
        TokenKind::Keyword { keyword, .. } => match keyword {
            Keyword::Mod => Some((BinaryOperation::Mod, 48)),
            Keyword::Is => Some((BinaryOperation::Is, 25)),
            Keyword::And => Some((BinaryOperation::And, 10)),
            Keyword::Or => Some((BinaryOperation::Or, 9)),
            Keyword::Xor => Some((BinaryOperation::Xor, 8)),
            Keyword::Eqv => Some((BinaryOperation::Eqv, 7)),
            Keyword::Imp => Some((BinaryOperation::Imp, 6)),
            _ => None,
        },
        _ => None,
    }
}

fn literal_of(token: &Token) -> Option<Literal> {
    Some(match &token.kind {
        TokenKind::StringLiteral(s) => Literal::String(s.clone()),
        TokenKind::IntegerLiteral { value, .. } => Literal::Integer(*value),
        TokenKind::FloatLiteral(f) => Literal::Float(*f),
        TokenKind::DateLiteral(d) => Literal::Date(*d),
        TokenKind::BooleanLiteral(b) => Literal::Boolean(*b),
        TokenKind::NullLiteral => Literal::Null,
        TokenKind::EmptyLiteral => Literal::Empty,
        TokenKind::NothingLiteral => Literal::Nothing,
        _ => return None,
    })
}

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self) -> PResult<Expression> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expression> {
        let start = self.mark();
        let lhs = if self.opt_keyword(Keyword::Not) {
            let operand = self.parse_binary(NOT_PRECEDENCE + 1)?;
            Expression::new(
                ExpressionKind::Unary(UnaryExpression {
                    op: UnaryOperation::Not,
                    operand: Box::new(operand),
                }),
                self.span_from(start),
            )
        } else {
            self.parse_unary()?
        };
        self.parse_binary_from(lhs, min_prec, start)
    }

    /// Continue a binary expression whose left operand is already parsed.
    pub(crate) fn parse_binary_from(
        &mut self,
        mut lhs: Expression,
        min_prec: u8,
        start: usize,
    ) -> PResult<Expression> {
        while let Some((op, prec)) = binary_operator(self.peek()) {
            if prec <= min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec)?;
            lhs = Expression::new(
                ExpressionKind::Binary(BinaryExpression {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                }),
                self.span_from(start),
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expression> {
        let start = self.mark();
        let op = if self.opt_punctuation(Punctuation::Minus) {
            UnaryOperation::Minus
        } else if self.opt_punctuation(Punctuation::Plus) {
            UnaryOperation::Plus
        } else {
            return self.parse_power();
        };
        let operand = self.parse_unary()?;
        Ok(Expression::new(
            ExpressionKind::Unary(UnaryExpression {
                op,
                operand: Box::new(operand),
            }),
            self.span_from(start),
        ))
    }

    /// `a ^ b`, grouping to the right; the exponent may carry a sign.
    fn parse_power(&mut self) -> PResult<Expression> {
        let start = self.mark();
        let base = self.parse_value()?;
        if !self.opt_punctuation(Punctuation::Exp) {
            return Ok(base);
        }
        let exponent = self.parse_unary()?;
        Ok(Expression::new(
            ExpressionKind::Binary(BinaryExpression {
                op: BinaryOperation::Exponentiation,
                left: Box::new(base),
                right: Box::new(exponent),
            }),
            self.span_from(start),
        ))
    }

    fn parse_value(&mut self) -> PResult<Expression> {
        let start = self.mark();
        if let Some(lit) = literal_of(self.peek()) {
            self.advance();
            return Ok(Expression::new(ExpressionKind::Literal(lit), self.span_from(start)));
        }
        if self.opt_punctuation(Punctuation::LParen) {
            let inner = self.parse_expression()?;
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
            // `(new X)(args)` calls the default member of the new instance
            return self.parse_postfix(inner, start);
        }
        if self.opt_keyword(Keyword::New) {
            let class_name = self.expect_identifier()?;
            let expr = Expression::new(ExpressionKind::New(class_name), self.span_from(start));
            return self.parse_postfix(expr, start);
        }
        match self.peek().kind {
            TokenKind::Eof | TokenKind::LineTermination | TokenKind::ColonLineTermination => {
                return Err(self.error(SyntaxErrorCode::ExpectedExpression))
            }
            TokenKind::Invalid(_) => return Err(self.error(SyntaxErrorCode::InvalidCharacter)),
            _ => {}
        }
        if !self.match_identifier() && !(self.with_depth > 0 && self.match_punctuation(Punctuation::Dot)) {
            return Err(self.error(SyntaxErrorCode::ExpectedExpression));
        }
        self.parse_left_expression()
    }

    /// An identifier (or `.name` inside With) followed by any postfixes.
    pub(crate) fn parse_left_expression(&mut self) -> PResult<Expression> {
        let start = self.mark();
        let head = if self.with_depth > 0 && self.opt_punctuation(Punctuation::Dot) {
            let name = self.expect_member_name()?;
            Expression::new(ExpressionKind::WithMember(name), self.span_from(start))
        } else {
            let name = self.expect_identifier()?;
            Expression::new(ExpressionKind::Identifier(name), self.span_from(start))
        };
        self.parse_postfix(head, start)
    }

    fn parse_postfix(&mut self, mut expr: Expression, start: usize) -> PResult<Expression> {
        loop {
            if self.opt_punctuation(Punctuation::Dot) {
                let member = self.expect_member_name()?;
                expr = Expression::new(
                    ExpressionKind::Member(MemberExpression {
                        object: Box::new(expr),
                        member,
                    }),
                    self.span_from(start),
                );
            } else if self.opt_punctuation(Punctuation::LParen) {
                let arguments = self.parse_argument_list()?;
                expr = Expression::new(
                    ExpressionKind::IndexOrCall(IndexOrCallExpression {
                        callee: Box::new(expr),
                        arguments,
                    }),
                    self.span_from(start),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after `(` through the closing `)`; omitted ones become Missing.
    fn parse_argument_list(&mut self) -> PResult<Vec<Expression>> {
        let mut args = Vec::new();
        if self.opt_punctuation(Punctuation::RParen) {
            return Ok(args);
        }
        loop {
            if self.match_punctuation(Punctuation::Comma) || self.match_punctuation(Punctuation::RParen) {
                let here = self.mark();
                args.push(Expression::new(ExpressionKind::Missing, self.span_from(here)));
            } else {
                args.push(self.parse_expression()?);
            }
            if !self.opt_punctuation(Punctuation::Comma) {
                break;
            }
        }
        self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
        Ok(args)
    }

    /// Const initializers: a literal with optional signs or parentheses.
    pub(crate) fn parse_const_init(&mut self) -> PResult<Expression> {
        let start = self.mark();
        let op = if self.opt_punctuation(Punctuation::Plus) {
            Some(UnaryOperation::Plus)
        } else if self.opt_punctuation(Punctuation::Minus) {
            Some(UnaryOperation::Minus)
        } else {
            None
        };
        if let Some(op) = op {
            let operand = self.parse_const_init()?;
            return Ok(Expression::new(
                ExpressionKind::Unary(UnaryExpression {
                    op,
                    operand: Box::new(operand),
                }),
                self.span_from(start),
            ));
        }
        if self.opt_punctuation(Punctuation::LParen) {
            let inner = self.parse_const_init()?;
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
            return Ok(inner);
        }
        match literal_of(self.peek()) {
            Some(lit) => {
                self.advance();
                Ok(Expression::new(ExpressionKind::Literal(lit), self.span_from(start)))
            }
            None => Err(self.error(SyntaxErrorCode::ExpectedLiteral)),
        }
    }
}
