//! Token definitions and the keyword tables consulted by the lexer and parser.
//!
//! Two tables exist because "is a keyword" and "may stand in for an identifier"
//! are independent properties: `Step` or `Property` are keywords that also name
//! variables and members, while `If` or `End` are keywords only.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Reserved words of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Step,
    Property,
    Explicit,
    Error,
    Erase,
    Default,
    And,
    ByRef,
    ByVal,
    Call,
    Case,
    Class,
    Const,
    Dim,
    Do,
    Each,
    Else,
    ElseIf,
    End,
    Eqv,
    Exit,
    For,
    Function,
    Get,
    Goto,
    If,
    Imp,
    In,
    Is,
    Let,
    Loop,
    Mod,
    New,
    Next,
    Not,
    On,
    Option,
    Or,
    Preserve,
    Private,
    Public,
    ReDim,
    Resume,
    Select,
    Set,
    Sub,
    Then,
    To,
    Until,
    WEnd,
    While,
    With,
    Xor,
}

impl Keyword {
    /// Canonical spelling, used in diagnostics and the AST printer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Step => "Step",
            Keyword::Property => "Property",
            Keyword::Explicit => "Explicit",
            Keyword::Error => "Error",
            Keyword::Erase => "Erase",
            Keyword::Default => "Default",
            Keyword::And => "And",
            Keyword::ByRef => "ByRef",
            Keyword::ByVal => "ByVal",
            Keyword::Call => "Call",
            Keyword::Case => "Case",
            Keyword::Class => "Class",
            Keyword::Const => "Const",
            Keyword::Dim => "Dim",
            Keyword::Do => "Do",
            Keyword::Each => "Each",
            Keyword::Else => "Else",
            Keyword::ElseIf => "ElseIf",
            Keyword::End => "End",
            Keyword::Eqv => "Eqv",
            Keyword::Exit => "Exit",
            Keyword::For => "For",
            Keyword::Function => "Function",
            Keyword::Get => "Get",
            Keyword::Goto => "Goto",
            Keyword::If => "If",
            Keyword::Imp => "Imp",
            Keyword::In => "In",
            Keyword::Is => "Is",
            Keyword::Let => "Let",
            Keyword::Loop => "Loop",
            Keyword::Mod => "Mod",
            Keyword::New => "New",
            Keyword::Next => "Next",
            Keyword::Not => "Not",
            Keyword::On => "On",
            Keyword::Option => "Option",
            Keyword::Or => "Or",
            Keyword::Preserve => "Preserve",
            Keyword::Private => "Private",
            Keyword::Public => "Public",
            Keyword::ReDim => "ReDim",
            Keyword::Resume => "Resume",
            Keyword::Select => "Select",
            Keyword::Set => "Set",
            Keyword::Sub => "Sub",
            Keyword::Then => "Then",
            Keyword::To => "To",
            Keyword::Until => "Until",
            Keyword::WEnd => "WEnd",
            Keyword::While => "While",
            Keyword::With => "With",
            Keyword::Xor => "Xor",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    use Keyword::*;
    [
        ("and", And),
        ("byref", ByRef),
        ("byval", ByVal),
        ("call", Call),
        ("case", Case),
        ("class", Class),
        ("const", Const),
        ("dim", Dim),
        ("do", Do),
        ("each", Each),
        ("else", Else),
        ("elseif", ElseIf),
        ("end", End),
        ("eqv", Eqv),
        ("exit", Exit),
        ("for", For),
        ("function", Function),
        ("get", Get),
        ("goto", Goto),
        ("if", If),
        ("imp", Imp),
        ("in", In),
        ("is", Is),
        ("let", Let),
        ("loop", Loop),
        ("mod", Mod),
        ("new", New),
        ("next", Next),
        ("not", Not),
        ("on", On),
        ("option", Option),
        ("or", Or),
        ("preserve", Preserve),
        ("private", Private),
        ("public", Public),
        ("redim", ReDim),
        ("resume", Resume),
        ("select", Select),
        ("set", Set),
        ("sub", Sub),
        ("then", Then),
        ("to", To),
        ("until", Until),
        ("wend", WEnd),
        ("while", While),
        ("with", With),
        ("xor", Xor),
    ]
    .into_iter()
    .collect()
});

static KEYWORDS_AS_IDENTIFIERS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    [
        ("default", Keyword::Default),
        ("erase", Keyword::Erase),
        ("error", Keyword::Error),
        ("explicit", Keyword::Explicit),
        ("property", Keyword::Property),
        ("step", Keyword::Step),
    ]
    .into_iter()
    .collect()
});

/// Look up a reserved word (case-insensitive).
pub fn keyword(name: &str) -> Option<Keyword> {
    KEYWORDS.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Look up a keyword that is also legal as an identifier (case-insensitive).
pub fn keyword_as_identifier(name: &str) -> Option<Keyword> {
    KEYWORDS_AS_IDENTIFIERS
        .get(name.to_ascii_lowercase().as_str())
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuation {
    LParen,
    RParen,
    Dot,
    Comma,
    Plus,
    Minus,
    Slash,
    Backslash,
    Star,
    Amp,
    Exp,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Punctuation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Punctuation::LParen => "(",
            Punctuation::RParen => ")",
            Punctuation::Dot => ".",
            Punctuation::Comma => ",",
            Punctuation::Plus => "+",
            Punctuation::Minus => "-",
            Punctuation::Slash => "/",
            Punctuation::Backslash => "\\",
            Punctuation::Star => "*",
            Punctuation::Amp => "&",
            Punctuation::Exp => "^",
            Punctuation::Equal => "=",
            Punctuation::NotEqual => "<>",
            Punctuation::Less => "<",
            Punctuation::LessOrEqual => "<=",
            Punctuation::Greater => ">",
            Punctuation::GreaterOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerRadix {
    Decimal,
    Hex,
    Octal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    /// `\n`, `\r` or a `:` that ends a line
    LineTermination,
    /// `:` separating statements on one physical line
    ColonLineTermination,
    Comment { text: String, is_rem: bool },
    StringLiteral(String),
    IntegerLiteral { value: i64, radix: IntegerRadix },
    FloatLiteral(f64),
    DateLiteral(NaiveDateTime),
    BooleanLiteral(bool),
    NullLiteral,
    NothingLiteral,
    EmptyLiteral,
    Identifier(String),
    /// `[any text]`, brackets included in the stored name
    ExtendedIdentifier(String),
    Keyword { keyword: Keyword, name: String },
    KeywordOrIdentifier { keyword: Keyword, name: String },
    Punctuation(Punctuation),
    Invalid(char),
}

/// A lexed token with its position in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Offset of the first character
    pub start: usize,
    /// Offset one past the last character
    pub end: usize,
    pub line: usize,
    /// Offset of the first character of `line`
    pub line_start: usize,
}

impl Token {
    pub fn column(&self) -> usize {
        self.start.saturating_sub(self.line_start)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(&self.kind,
            TokenKind::Keyword { keyword, .. } | TokenKind::KeywordOrIdentifier { keyword, .. }
            if *keyword == kw)
    }

    pub fn is_punctuation(&self, p: Punctuation) -> bool {
        matches!(&self.kind, TokenKind::Punctuation(q) if *q == p)
    }

    pub fn is_line_termination(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::LineTermination | TokenKind::ColonLineTermination
        )
    }

    /// Source-like rendering used in syntax error messages.
    pub fn text(&self) -> String {
        match &self.kind {
            TokenKind::Eof => String::new(),
            TokenKind::LineTermination => "\\n".to_string(),
            TokenKind::ColonLineTermination => ":".to_string(),
            TokenKind::Comment { text, .. } => format!("'{}", text),
            TokenKind::StringLiteral(s) => format!("\"{}\"", s.replace('"', "\"\"")),
            TokenKind::IntegerLiteral { value, .. } => value.to_string(),
            TokenKind::FloatLiteral(f) => f.to_string(),
            TokenKind::DateLiteral(d) => format!("#{}#", d),
            TokenKind::BooleanLiteral(b) => if *b { "True" } else { "False" }.to_string(),
            TokenKind::NullLiteral => "Null".to_string(),
            TokenKind::NothingLiteral => "Nothing".to_string(),
            TokenKind::EmptyLiteral => "Empty".to_string(),
            TokenKind::Identifier(name) | TokenKind::ExtendedIdentifier(name) => name.clone(),
            TokenKind::Keyword { name, .. } | TokenKind::KeywordOrIdentifier { name, .. } => {
                name.clone()
            }
            TokenKind::Punctuation(p) => p.as_str().to_string(),
            TokenKind::Invalid(c) => c.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup_is_case_insensitive() {
        assert_eq!(keyword("WEND"), Some(Keyword::WEnd));
        assert_eq!(keyword("ElseIf"), Some(Keyword::ElseIf));
        assert_eq!(keyword("foo"), None);
    }

    #[test]
    fn test_keyword_tables_are_independent() {
        assert!(keyword("step").is_none());
        assert_eq!(keyword_as_identifier("Step"), Some(Keyword::Step));
        assert!(keyword_as_identifier("if").is_none());
        assert!(keyword("if").is_some());
    }
}
