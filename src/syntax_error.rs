//! Compile-time diagnostics.
//!
//! Codes keep the legacy numbering so scripts that branch on `Err.Number`
//! after `Execute`/`Eval` see the values they expect.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyntaxErrorCode {
    SyntaxError = 1002,
    ExpectedColon = 1003,
    ExpectedLParen = 1005,
    ExpectedRParen = 1006,
    ExpectedRBracket = 1007,
    ExpectedIdentifier = 1010,
    ExpectedEqual = 1011,
    ExpectedIf = 1012,
    ExpectedTo = 1013,
    ExpectedEnd = 1014,
    ExpectedFunction = 1015,
    ExpectedSub = 1016,
    ExpectedThen = 1017,
    ExpectedWend = 1018,
    ExpectedLoop = 1019,
    ExpectedNext = 1020,
    ExpectedCase = 1021,
    ExpectedSelect = 1022,
    ExpectedExpression = 1023,
    ExpectedStatement = 1024,
    ExpectedEndOfStatement = 1025,
    ExpectedInteger = 1026,
    ExpectedWhileOrUntil = 1027,
    ExpectedWhileUntilOrEndOfStatement = 1028,
    ExpectedWith = 1029,
    IdentifierTooLong = 1030,
    InvalidNumber = 1031,
    InvalidCharacter = 1032,
    UnterminatedStringConstant = 1033,
    UnterminatedComment = 1034,
    InvalidUseOfMeKeyword = 1037,
    LoopWithoutDo = 1038,
    InvalidExitStatement = 1039,
    InvalidForLoopControlVariable = 1040,
    NameRedefined = 1041,
    MustBeFirstStatementOnTheLine = 1042,
    CannotAssignToNonByValVariable = 1043,
    CannotUseParenthesesWhenCallingSub = 1044,
    ExpectedLiteral = 1045,
    ExpectedIn = 1046,
    ExpectedClass = 1047,
    MustBeDefinedInsideClass = 1048,
    ExpectedLetGetSet = 1049,
    ExpectedProperty = 1050,
    InconsistentNumberOfArguments = 1051,
    CannotHaveMultipleDefault = 1052,
    ClassInitializeOrTerminateDoNotHaveArguments = 1053,
    PropertySetOrLetMustHaveArguments = 1054,
    UnexpectedNext = 1055,
    DefaultCanBeSpecifiedOnlyOnPropertyFunctionOrSub = 1056,
    DefaultMustAlsoSpecifyPublic = 1057,
    DefaultCanOnlyBeOnPropertyGet = 1058,
}

impl SyntaxErrorCode {
    pub fn number(self) -> u32 {
        self as u32
    }

    /// The message the legacy platform shows for this code.
    pub fn description(self) -> &'static str {
        use SyntaxErrorCode::*;
        match self {
            SyntaxError => "Syntax error",
            ExpectedColon => "Expected ':'",
            ExpectedLParen => "Expected '('",
            ExpectedRParen => "Expected ')'",
            ExpectedRBracket => "Expected ']'",
            ExpectedIdentifier => "Expected identifier",
            ExpectedEqual => "Expected '='",
            ExpectedIf => "Expected 'If'",
            ExpectedTo => "Expected 'To'",
            ExpectedEnd => "Expected 'End'",
            ExpectedFunction => "Expected 'Function'",
            ExpectedSub => "Expected 'Sub'",
            ExpectedThen => "Expected 'Then'",
            ExpectedWend => "Expected 'Wend'",
            ExpectedLoop => "Expected 'Loop'",
            ExpectedNext => "Expected 'Next'",
            ExpectedCase => "Expected 'Case'",
            ExpectedSelect => "Expected 'Select'",
            ExpectedExpression => "Expected expression",
            ExpectedStatement => "Expected statement",
            ExpectedEndOfStatement => "Expected end of statement",
            ExpectedInteger => "Expected integer constant",
            ExpectedWhileOrUntil => "Expected 'While' or 'Until'",
            ExpectedWhileUntilOrEndOfStatement => {
                "Expected 'While', 'Until' or end of statement"
            }
            ExpectedWith => "Expected 'With'",
            IdentifierTooLong => "Identifier too long",
            InvalidNumber => "Invalid number",
            InvalidCharacter => "Invalid character",
            UnterminatedStringConstant => "Unterminated string constant",
            UnterminatedComment => "Unterminated comment",
            InvalidUseOfMeKeyword => "Invalid use of 'Me' keyword",
            LoopWithoutDo => "'loop' without 'do'",
            InvalidExitStatement => "Invalid 'exit' statement",
            InvalidForLoopControlVariable => "Invalid 'for' loop control variable",
            NameRedefined => "Name redefined",
            MustBeFirstStatementOnTheLine => "Must be first statement on the line",
            CannotAssignToNonByValVariable => "Cannot assign to non-ByVal argument",
            CannotUseParenthesesWhenCallingSub => "Cannot use parentheses when calling a Sub",
            ExpectedLiteral => "Expected literal constant",
            ExpectedIn => "Expected 'In'",
            ExpectedClass => "Expected 'Class'",
            MustBeDefinedInsideClass => "Must be defined inside a Class",
            ExpectedLetGetSet => "Expected Let or Set or Get in property declaration",
            ExpectedProperty => "Expected 'Property'",
            InconsistentNumberOfArguments => {
                "Number of arguments must be consistent across properties specification"
            }
            CannotHaveMultipleDefault => "Cannot have multiple default property/method in a Class",
            ClassInitializeOrTerminateDoNotHaveArguments => {
                "Class initialize or terminate do not have arguments"
            }
            PropertySetOrLetMustHaveArguments => {
                "Property set or let must have at least one argument"
            }
            UnexpectedNext => "Unexpected 'Next'",
            DefaultCanBeSpecifiedOnlyOnPropertyFunctionOrSub => {
                "'Default' specification can only be on Property Get, Function or Sub"
            }
            DefaultMustAlsoSpecifyPublic => "'Default' specification must also specify 'Public'",
            DefaultCanOnlyBeOnPropertyGet => "'Default' specification can only be on Property Get",
        }
    }
}

impl fmt::Display for SyntaxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A lexical or grammatical failure with its position.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", render(self))]
pub struct SyntaxError {
    pub code: SyntaxErrorCode,
    pub line: usize,
    pub column: usize,
    /// Offending token text, empty at end of input
    pub token: String,
    /// Full text of the offending source line
    pub line_text: String,
    /// Extra cause, e.g. the date parser's complaint
    pub detail: Option<String>,
}

fn render(e: &SyntaxError) -> String {
    let mut msg = String::from("VBScript syntax error");
    if e.line > 0 {
        msg.push_str(&format!(" {} at line {}, column {}", e.code, e.line, e.column));
    }
    if !e.token.is_empty() {
        msg.push_str(&format!(": '{}'", e.token));
    }
    if let Some(detail) = &e.detail {
        msg.push_str(&format!(" ({})", detail));
    }
    if !e.line_text.is_empty() {
        msg.push('\n');
        msg.push_str(&e.line_text);
    }
    msg
}

impl SyntaxError {
    /// Text of the line starting at `line_start` in `source`.
    pub fn line_of(source: &str, line_start: usize) -> String {
        source
            .get(line_start..)
            .unwrap_or("")
            .split(['\n', '\r'])
            .next()
            .unwrap_or("")
            .to_string()
    }
}
