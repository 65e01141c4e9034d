//! Tokenization.
//!
//! The lexer is context-free and restartable: `next_token` takes a position and
//! returns the token found there together with the position after it, so callers
//! can rewind to any position they were handed earlier.

use crate::dates::parse_date_literal;
use crate::syntax_error::{SyntaxError, SyntaxErrorCode};
use crate::token::{keyword, keyword_as_identifier, IntegerRadix, Punctuation, Token, TokenKind};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_till, take_while},
    character::complete::{anychar, char, digit0, digit1, hex_digit1, oct_digit1, one_of, satisfy},
    combinator::{cut, eof, map, opt, peek, recognize, value},
    multi::fold_many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Where the lexer is: byte offset plus the line bookkeeping for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LexPosition {
    pub offset: usize,
    pub line: usize,
    pub line_start: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, 0x20 | 0x09 | 0x0B | 0x0C)
}

fn is_newline(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

fn is_line_terminator(b: u8) -> bool {
    is_newline(b) || b == b':'
}

fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

/// Where a scanner gave up, as the input it had left.
fn stopped_at<'i>(err: nom::Err<nom::error::Error<&'i str>>, input: &'i str) -> &'i str {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => input,
    }
}

/// Letter followed by letters, digits or underscores
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// `[any text]`, brackets included
fn extended_identifier(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('['),
        take_while(|c: char| c != '\n' && c != '\r' && c != ']' && (c as u32) <= 0xFF),
        char(']'),
    ))(input)
}

/// A quoted string on one line; `""` stands for one quote.
fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\"\r\n"), value("\"", tag("\"\"")))),
            String::new,
            |mut acc: String, chunk: &str| {
                acc.push_str(chunk);
                acc
            },
        ),
        char('"'),
    )(input)
}

/// The text between `#` delimiters
fn date_body(input: &str) -> IResult<&str, &str> {
    delimited(char('#'), is_not("#\r\n"), char('#'))(input)
}

/// Digits with an optional fraction. Either side of the point may be empty.
fn mantissa(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit0, opt(pair(char('.'), digit0))))(input)
}

/// `e`, an optional sign, then digits that must be there once `e` is seen.
fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(preceded(pair(one_of("eE"), opt(one_of("+-"))), cut(digit1)))(input)
}

/// The digits of `&H..`, `&O..` or `&..`; missing digits are a hard failure.
fn radix_digits(input: &str) -> IResult<&str, (IntegerRadix, &str)> {
    alt((
        map(preceded(tag_no_case("&h"), cut(hex_digit1)), |d| (IntegerRadix::Hex, d)),
        map(preceded(tag_no_case("&o"), cut(oct_digit1)), |d| (IntegerRadix::Octal, d)),
        map(preceded(char('&'), oct_digit1), |d| (IntegerRadix::Octal, d)),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Punctuation> {
    alt((
        value(Punctuation::LessOrEqual, alt((tag("<="), tag("=<")))),
        value(Punctuation::GreaterOrEqual, alt((tag(">="), tag("=>")))),
        value(Punctuation::NotEqual, alt((tag("<>"), tag("><")))),
        value(Punctuation::Equal, char('=')),
        value(Punctuation::Less, char('<')),
        value(Punctuation::Greater, char('>')),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, Punctuation> {
    alt((
        comparison,
        value(Punctuation::LParen, char('(')),
        value(Punctuation::RParen, char(')')),
        value(Punctuation::Dot, char('.')),
        value(Punctuation::Comma, char(',')),
        value(Punctuation::Plus, char('+')),
        value(Punctuation::Minus, char('-')),
        value(Punctuation::Slash, char('/')),
        value(Punctuation::Backslash, char('\\')),
        value(Punctuation::Star, char('*')),
        value(Punctuation::Amp, char('&')),
        value(Punctuation::Exp, char('^')),
    ))(input)
}

/// `'` or `Rem` up to the end of the line. `Rem` must stand alone.
fn comment(input: &str) -> IResult<&str, (bool, &str)> {
    let rem = tuple((
        tag_no_case("rem"),
        peek(alt((
            value((), one_of(" \t\x0B\x0C\r\n")),
            value((), eof),
        ))),
    ));
    pair(
        alt((value(false, char('\'')), value(true, rem))),
        take_till(|c: char| c == '\n' || c == '\r'),
    )(input)
}

/// Mutable scan state for one `next_token` call.
struct Cursor<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: LexPosition,
}

impl<'a> Cursor<'a> {
    fn at(&self, offset: usize) -> u8 {
        self.bytes.get(offset).copied().unwrap_or(0)
    }

    fn cur(&self) -> u8 {
        self.at(self.pos.offset)
    }

    fn peek(&self, n: usize) -> u8 {
        self.at(self.pos.offset + n)
    }

    fn is_eof(&self) -> bool {
        self.pos.offset >= self.bytes.len()
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.pos.offset..).unwrap_or("")
    }

    fn error(&self, code: SyntaxErrorCode) -> SyntaxError {
        let token = self
            .rest()
            .chars()
            .next()
            .map(|c| c.to_string())
            .unwrap_or_default();
        SyntaxError {
            code,
            line: self.pos.line,
            column: self.pos.offset.saturating_sub(self.pos.line_start),
            token,
            line_text: SyntaxError::line_of(self.source, self.pos.line_start),
            detail: None,
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            start,
            end: self.pos.offset,
            line: self.pos.line,
            line_start: self.pos.line_start,
        }
    }

    fn skip_ws_only(&mut self) {
        while is_whitespace(self.cur()) {
            self.pos.offset += 1;
        }
    }

    fn skip_newline(&mut self) {
        let c = self.cur();
        self.pos.offset += 1;
        if is_newline(c) {
            if c == b'\r' && self.cur() == b'\n' {
                self.pos.offset += 1;
            }
            self.pos.line += 1;
            self.pos.line_start = self.pos.offset;
        }
    }

    /// Whitespace and `_` line continuations.
    fn skip_whitespace(&mut self) -> Result<(), SyntaxError> {
        self.skip_ws_only();
        while !self.is_eof() && self.cur() == b'_' {
            self.pos.offset += 1;
            self.skip_ws_only();
            if is_newline(self.cur()) {
                self.skip_newline();
                self.skip_ws_only();
            } else {
                return Err(self.error(SyntaxErrorCode::InvalidCharacter));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace()?;

        if self.is_eof() {
            return Ok(self.token(TokenKind::Eof, self.pos.offset));
        }

        let c = self.cur();
        let next = self.peek(1);

        if is_line_terminator(c) {
            return self.line_termination();
        }
        if let Some(comment) = self.comment() {
            return Ok(comment);
        }
        if is_identifier_start(c) {
            return Ok(self.identifier());
        }
        match c {
            b'"' => self.string_literal(),
            b'.' if next.is_ascii_digit() => self.numeric_literal(),
            b'0'..=b'9' => self.numeric_literal(),
            b'&' if next.eq_ignore_ascii_case(&b'h')
                || next.eq_ignore_ascii_case(&b'o')
                || next.is_ascii_digit() =>
            {
                self.numeric_literal()
            }
            b'#' => self.date_literal(),
            b'[' => self.extended_identifier(),
            _ => Ok(self.punctuation()),
        }
    }

    fn line_termination(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos.offset;
        let first_line = self.pos.line;
        let first_line_start = self.pos.line_start;
        let mut saw_colon = false;

        while !self.is_eof() && is_line_terminator(self.cur()) {
            let c = self.cur();
            if c == b':' {
                saw_colon = true;
                self.pos.offset += 1;
            } else {
                self.skip_newline();
            }
            self.skip_whitespace()?;
        }

        let kind = if saw_colon && first_line == self.pos.line {
            TokenKind::ColonLineTermination
        } else {
            TokenKind::LineTermination
        };
        Ok(Token {
            kind,
            start,
            end: self.pos.offset,
            line: first_line,
            line_start: first_line_start,
        })
    }

    /// Move to where a scanner stopped, given the input it left over.
    fn advance_to(&mut self, remaining: &str) {
        self.pos.offset = self.source.len() - remaining.len();
    }

    fn fail_at(&mut self, remaining: &str, code: SyntaxErrorCode) -> SyntaxError {
        self.advance_to(remaining);
        self.error(code)
    }

    fn comment(&mut self) -> Option<Token> {
        let start = self.pos.offset;
        let (remaining, (is_rem, text)) = comment(self.rest()).ok()?;
        self.advance_to(remaining);
        let text = text.to_string();
        Some(self.token(TokenKind::Comment { text, is_rem }, start))
    }

    fn identifier(&mut self) -> Token {
        let start = self.pos.offset;
        let rest = self.rest();
        let (remaining, name) = identifier(rest).unwrap_or((rest, ""));
        self.advance_to(remaining);
        let lower = name.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "true" => TokenKind::BooleanLiteral(true),
            "false" => TokenKind::BooleanLiteral(false),
            "null" => TokenKind::NullLiteral,
            "empty" => TokenKind::EmptyLiteral,
            "nothing" => TokenKind::NothingLiteral,
            _ => {
                if let Some(kw) = keyword(&lower) {
                    TokenKind::Keyword { keyword: kw, name: name.to_string() }
                } else if let Some(kw) = keyword_as_identifier(&lower) {
                    TokenKind::KeywordOrIdentifier { keyword: kw, name: name.to_string() }
                } else {
                    TokenKind::Identifier(name.to_string())
                }
            }
        };
        self.token(kind, start)
    }

    fn extended_identifier(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos.offset;
        let rest = self.rest();
        match extended_identifier(rest) {
            Ok((remaining, name)) => {
                self.advance_to(remaining);
                Ok(self.token(TokenKind::ExtendedIdentifier(name.to_string()), start))
            }
            Err(e) => Err(self.fail_at(stopped_at(e, rest), SyntaxErrorCode::ExpectedRBracket)),
        }
    }

    fn string_literal(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos.offset;
        let rest = self.rest();
        match string_literal(rest) {
            Ok((remaining, text)) => {
                self.advance_to(remaining);
                Ok(self.token(TokenKind::StringLiteral(text), start))
            }
            Err(e) => Err(self.fail_at(
                stopped_at(e, rest),
                SyntaxErrorCode::UnterminatedStringConstant,
            )),
        }
    }

    fn date_literal(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos.offset;
        let rest = self.rest();
        let (remaining, body) = match date_body(rest) {
            Ok(found) => found,
            Err(e) => return Err(self.fail_at(stopped_at(e, rest), SyntaxErrorCode::SyntaxError)),
        };
        match parse_date_literal(body) {
            Ok(date) => {
                self.advance_to(remaining);
                Ok(self.token(TokenKind::DateLiteral(date), start))
            }
            Err(cause) => {
                // Reported at the closing `#`
                let mut err = self.fail_at(&rest[1 + body.len()..], SyntaxErrorCode::SyntaxError);
                err.detail = Some(cause);
                Err(err)
            }
        }
    }

    /// A literal must not run straight into an identifier (`12abc`).
    fn check_literal_end(&self) -> Result<(), SyntaxError> {
        if is_identifier_start(self.cur()) {
            return Err(self.error(SyntaxErrorCode::ExpectedEndOfStatement));
        }
        Ok(())
    }

    fn radix_literal(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos.offset;
        let rest = self.rest();
        let (remaining, (radix, digits)) = match radix_digits(rest) {
            Ok(found) => found,
            Err(e) => {
                let at = stopped_at(e, rest);
                // `&8`: a decimal digit where an octal one belongs
                let code = if at.len() == rest.len() - 1 {
                    SyntaxErrorCode::SyntaxError
                } else {
                    SyntaxErrorCode::InvalidNumber
                };
                return Err(self.fail_at(at, code));
            }
        };
        self.advance_to(remaining);
        if radix == IntegerRadix::Octal && self.cur().is_ascii_digit() {
            return Err(self.error(SyntaxErrorCode::SyntaxError));
        }
        self.check_literal_end()?;
        let base = if radix == IntegerRadix::Hex { 16 } else { 8 };
        let value = i64::from_str_radix(digits, base)
            .map_err(|_| self.error(SyntaxErrorCode::InvalidNumber))?;
        Ok(self.token(TokenKind::IntegerLiteral { value, radix }, start))
    }

    fn numeric_literal(&mut self) -> Result<Token, SyntaxError> {
        if self.cur() == b'&' {
            return self.radix_literal();
        }
        let start = self.pos.offset;
        let rest = self.rest();
        let (after_mantissa, digits) = mantissa(rest).unwrap_or((rest, ""));
        let (remaining, exp) = match opt(exponent)(after_mantissa) {
            Ok(found) => found,
            Err(e) => {
                return Err(self.fail_at(stopped_at(e, after_mantissa), SyntaxErrorCode::InvalidNumber))
            }
        };
        self.advance_to(remaining);
        self.check_literal_end()?;
        let text = &rest[..rest.len() - remaining.len()];

        if exp.is_none() && !digits.contains('.') {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(self.token(
                    TokenKind::IntegerLiteral { value, radix: IntegerRadix::Decimal },
                    start,
                ));
            }
        }
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(SyntaxErrorCode::InvalidNumber))?;
        Ok(self.token(TokenKind::FloatLiteral(value), start))
    }

    fn punctuation(&mut self) -> Token {
        let start = self.pos.offset;
        let rest = self.rest();
        if let Ok((remaining, p)) = operator(rest) {
            self.advance_to(remaining);
            return self.token(TokenKind::Punctuation(p), start);
        }
        match anychar::<_, nom::error::Error<&str>>(rest) {
            Ok((remaining, ch)) => {
                self.advance_to(remaining);
                self.token(TokenKind::Invalid(ch), start)
            }
            Err(_) => self.token(TokenKind::Eof, start),
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { source }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Position of the first token.
    pub fn start(&self) -> LexPosition {
        LexPosition {
            offset: 0,
            line: if self.source.is_empty() { 0 } else { 1 },
            line_start: 0,
        }
    }

    /// Lex one token at `pos`, returning it and the position that follows it.
    pub fn next_token(&self, pos: LexPosition) -> Result<(Token, LexPosition), SyntaxError> {
        let mut cursor = Cursor {
            source: self.source,
            bytes: self.source.as_bytes(),
            pos,
        };
        let token = cursor.next()?;
        Ok((token, cursor.pos))
    }
}

/// Tokenize a whole source, ending with an `Eof` token.
pub fn lex(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let lexer = Lexer::new(source);
    let mut pos = lexer.start();
    let mut tokens = Vec::new();
    loop {
        let (token, next) = lexer.next_token(pos)?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
        pos = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Keyword;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_identifiers_and_keywords() {
        assert_eq!(
            kinds("Dim step"),
            vec![
                TokenKind::Keyword { keyword: Keyword::Dim, name: "Dim".into() },
                TokenKind::KeywordOrIdentifier { keyword: Keyword::Step, name: "step".into() },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds("\"a\"\"b\" 12 1.5 &HFF &O17 &17 True Empty"),
            vec![
                TokenKind::StringLiteral("a\"b".into()),
                TokenKind::IntegerLiteral { value: 12, radix: IntegerRadix::Decimal },
                TokenKind::FloatLiteral(1.5),
                TokenKind::IntegerLiteral { value: 255, radix: IntegerRadix::Hex },
                TokenKind::IntegerLiteral { value: 15, radix: IntegerRadix::Octal },
                TokenKind::IntegerLiteral { value: 15, radix: IntegerRadix::Octal },
                TokenKind::BooleanLiteral(true),
                TokenKind::EmptyLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_exponent_and_leading_dot() {
        assert_eq!(kinds("1e3")[0], TokenKind::FloatLiteral(1000.0));
        assert_eq!(kinds(".25")[0], TokenKind::FloatLiteral(0.25));
        let err = lex("1e+").unwrap_err();
        assert_eq!(err.code, SyntaxErrorCode::InvalidNumber);
    }

    #[test]
    fn test_number_running_into_identifier() {
        let err = lex("x = 12abc").unwrap_err();
        assert_eq!(err.code, SyntaxErrorCode::ExpectedEndOfStatement);
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex("x = \"abc\ny").unwrap_err();
        assert_eq!(err.code, SyntaxErrorCode::UnterminatedStringConstant);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_comments() {
        let toks = kinds("' hello\nREM world\nremark");
        assert!(matches!(&toks[0], TokenKind::Comment { text, is_rem: false } if text == " hello"));
        assert_eq!(toks[1], TokenKind::LineTermination);
        assert!(matches!(&toks[2], TokenKind::Comment { is_rem: true, .. }));
        assert_eq!(toks[4], TokenKind::Identifier("remark".into()));
    }

    #[test]
    fn test_colon_vs_newline_termination() {
        let toks = kinds("a : b\nc");
        assert_eq!(toks[1], TokenKind::ColonLineTermination);
        assert_eq!(toks[3], TokenKind::LineTermination);
    }

    #[test]
    fn test_line_continuation() {
        let toks = lex("a _\n  + b").unwrap();
        assert_eq!(toks[1].kind, TokenKind::Punctuation(Punctuation::Plus));
        assert_eq!(toks[2].line, 2);
    }

    #[test]
    fn test_extended_identifier() {
        assert_eq!(
            kinds("[my var]")[0],
            TokenKind::ExtendedIdentifier("[my var]".into())
        );
        assert_eq!(lex("[abc").unwrap_err().code, SyntaxErrorCode::ExpectedRBracket);
    }

    #[test]
    fn test_date_literal_with_spaces() {
        let toks = kinds("# 1/19/2026 #");
        assert!(matches!(toks[0], TokenKind::DateLiteral(_)));
        assert_eq!(lex("#garbage#").unwrap_err().code, SyntaxErrorCode::SyntaxError);
    }

    #[test]
    fn test_comparison_punctuation() {
        assert_eq!(
            kinds("<> >= =< <")[..4],
            [
                TokenKind::Punctuation(Punctuation::NotEqual),
                TokenKind::Punctuation(Punctuation::GreaterOrEqual),
                TokenKind::Punctuation(Punctuation::LessOrEqual),
                TokenKind::Punctuation(Punctuation::Less),
            ]
        );
    }

    #[test]
    fn test_restartable_positions() {
        let lexer = Lexer::new("a = 1");
        let (first, after_first) = lexer.next_token(lexer.start()).unwrap();
        let (second, _) = lexer.next_token(after_first).unwrap();
        let (again, _) = lexer.next_token(after_first).unwrap();
        assert_eq!(first.kind, TokenKind::Identifier("a".into()));
        assert_eq!(second, again);
        assert!(second.start > first.start);
    }

    #[test]
    fn test_radix_prefix_without_digits() {
        for source in ["x = &H", "x = &h + 1", "x = &O"] {
            let err = lex(source).unwrap_err();
            assert_eq!(err.code, SyntaxErrorCode::InvalidNumber, "{}", source);
        }
        assert_eq!(lex("x = &8").unwrap_err().code, SyntaxErrorCode::SyntaxError);
    }

    #[test]
    fn test_string_with_doubled_quotes_and_unicode() {
        let toks = lex("s = \"\"\"é\"\" \"\"\": t = 1").unwrap();
        assert_eq!(toks[2].kind, TokenKind::StringLiteral("\"é\" \"".into()));
        assert_eq!(toks[3].kind, TokenKind::ColonLineTermination);
        assert_eq!(toks[3].start, toks[2].end);
    }

    #[test]
    fn test_token_offsets_follow_scanned_text() {
        let source = "ab_1 <> 2.5e1 #2026-01-19#";
        let toks = lex(source).unwrap();
        let texts: Vec<&str> = toks[..4].iter().map(|t| &source[t.start..t.end]).collect();
        assert_eq!(texts, ["ab_1", "<>", "2.5e1", "#2026-01-19#"]);
        assert_eq!(toks[2].kind, TokenKind::FloatLiteral(25.0));
    }

    #[test]
    fn test_invalid_character_is_tokenized() {
        assert_eq!(kinds("a ? b")[1], TokenKind::Invalid('?'));
    }
}
