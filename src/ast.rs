//! Abstract syntax tree.
//!
//! A `Program` owns its whole tree. Every node carries the `Span` of the
//! tokens it was built from.

use chrono::NaiveDateTime;

/// Identifiers longer than this are rejected by the parser.
pub const IDENTIFIER_MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    #[default]
    Binary,
    Text,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub option_explicit: bool,
    pub compare_mode: CompareMode,
    pub option_base: u8,
    pub body: Vec<Statement>,
}

impl Program {
    pub fn new(body: Vec<Statement>) -> Self {
        Program {
            body,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `x = e` or `Set x = e`
    Assignment(AssignmentStatement),
    /// `Call f(a, b)`
    Call(CallStatement),
    /// `f a, b`, `obj.m`, `f(a)`
    CallSub(CallSubStatement),
    If(IfStatement),
    For(ForStatement),
    ForEach(ForEachStatement),
    Do(DoStatement),
    While(WhileStatement),
    Select(SelectStatement),
    With(WithStatement),
    Dim(VariablesDeclaration),
    Fields(FieldsDeclaration),
    Const(ConstsDeclaration),
    ReDim(ReDimStatement),
    Erase(EraseStatement),
    Sub(ProcedureDeclaration),
    Function(ProcedureDeclaration),
    Property(PropertyDeclaration),
    Class(ClassDeclaration),
    OnErrorResumeNext,
    OnErrorGoTo0,
    Exit(ExitKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentStatement {
    pub target: Expression,
    pub value: Expression,
    pub is_set: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallStatement {
    pub callee: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSubStatement {
    pub callee: Expression,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIfClause {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expression,
    pub consequent: Vec<Statement>,
    pub else_ifs: Vec<ElseIfClause>,
    pub alternate: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub variable: String,
    pub from: Expression,
    pub to: Expression,
    pub step: Option<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachStatement {
    pub variable: String,
    pub collection: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCondition {
    While,
    Until,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionTest {
    PreTest,
    PostTest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoStatement {
    /// `None` for an unconditional `Do ... Loop`
    pub condition: Option<(LoopCondition, ConditionTest, Expression)>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseValue {
    Value(Expression),
    /// `Case Is > 5` / `Case < 5`
    Comparison(BinaryOperation, Expression),
    /// `Case 1 To 5`
    Range(Expression, Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    /// Empty for `Case Else`
    pub values: Vec<CaseValue>,
    pub is_else: bool,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub subject: Expression,
    pub cases: Vec<CaseClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithStatement {
    pub target: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    /// Upper bounds of a fixed-size array
    pub dims: Vec<i64>,
    /// Declared with `()`
    pub dynamic_array: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariablesDeclaration {
    pub variables: Vec<VariableDeclaration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldsDeclaration {
    pub access: Access,
    pub fields: Vec<VariableDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDeclaration {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstsDeclaration {
    pub access: Option<Access>,
    pub constants: Vec<ConstDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReDimTarget {
    pub name: String,
    pub dims: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReDimStatement {
    pub preserve: bool,
    pub targets: Vec<ReDimTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EraseStatement {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassingMode {
    ByRef,
    ByVal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub mode: PassingMode,
    pub is_array: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodAccess {
    None,
    Public,
    PublicDefault,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDeclaration {
    pub name: String,
    pub access: MethodAccess,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Get,
    Let,
    Set,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDeclaration {
    pub kind: PropertyKind,
    pub procedure: ProcedureDeclaration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    pub name: String,
    pub members: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Do,
    For,
    Sub,
    Function,
    Property,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Expression { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    Identifier(String),
    Unary(UnaryExpression),
    Binary(BinaryExpression),
    /// `f(a, b)`, `arr(i)`, `(new X)(a)`
    IndexOrCall(IndexOrCallExpression),
    /// `obj.name`
    Member(MemberExpression),
    /// `.name` inside a With block
    WithMember(String),
    /// `New ClassName`
    New(String),
    /// Omitted argument: `f(, x)`
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDateTime),
    Boolean(bool),
    Null,
    Empty,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperation {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub op: UnaryOperation,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperation {
    Exponentiation,
    Multiplication,
    Division,
    IntDivision,
    Addition,
    Subtraction,
    Concatenation,
    Mod,
    Is,
    And,
    Or,
    Xor,
    Eqv,
    Imp,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl BinaryOperation {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperation::Exponentiation => "^",
            BinaryOperation::Multiplication => "*",
            BinaryOperation::Division => "/",
            BinaryOperation::IntDivision => "\\",
            BinaryOperation::Addition => "+",
            BinaryOperation::Subtraction => "-",
            BinaryOperation::Concatenation => "&",
            BinaryOperation::Mod => "Mod",
            BinaryOperation::Is => "Is",
            BinaryOperation::And => "And",
            BinaryOperation::Or => "Or",
            BinaryOperation::Xor => "Xor",
            BinaryOperation::Eqv => "Eqv",
            BinaryOperation::Imp => "Imp",
            BinaryOperation::Equal => "=",
            BinaryOperation::NotEqual => "<>",
            BinaryOperation::Less => "<",
            BinaryOperation::Greater => ">",
            BinaryOperation::LessOrEqual => "<=",
            BinaryOperation::GreaterOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub op: BinaryOperation,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexOrCallExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    pub object: Box<Expression>,
    pub member: String,
}
