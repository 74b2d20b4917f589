//! Tagged-variant AST produced by the parser (`spec.md` §3 "AST + Value model").

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Pos,
    Neg,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub annotation: Option<Expr>,
}

#[derive(Debug, Clone, Default)]
pub struct Params {
    pub positional: Vec<Param>,
    pub star_args: Option<String>,
    pub kwonly: Vec<Param>,
    pub star_kwargs: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone)]
pub enum StringPart {
    Literal(String),
    Expr { expr: Box<Expr>, conversion: Option<char>, format_spec: Option<Vec<StringPart>> },
}

#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Bool(bool),
    Int(String),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    FString(Vec<StringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    SetLit(Vec<Expr>),
    Dict(Vec<(Option<Expr>, Expr)>),
    ListComp { element: Box<Expr>, generators: Vec<Comprehension> },
    SetComp { element: Box<Expr>, generators: Vec<Comprehension> },
    DictComp { key: Box<Expr>, value: Box<Expr>, generators: Vec<Comprehension> },
    GeneratorExp { element: Box<Expr>, generators: Vec<Comprehension> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    BinOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    BoolOp { op: BoolOp, values: Vec<Expr> },
    Compare { left: Box<Expr>, ops: Vec<CmpOp>, comparators: Vec<Expr> },
    Call { func: Box<Expr>, args: Vec<Expr>, keywords: Vec<(Option<String>, Expr)> },
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Slice { lower: Option<Box<Expr>>, upper: Option<Box<Expr>>, step: Option<Box<Expr>> },
    IfExp { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr> },
    Lambda { params: Params, body: Box<Expr> },
    Starred(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    Await(Box<Expr>),
    NamedExpr { target: String, value: Box<Expr> },
    Ellipsis,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Wildcard,
    Capture(String),
    Literal(Expr),
    Or(Vec<Pattern>),
    Sequence { prefix: Vec<Pattern>, rest: Option<Option<String>>, suffix: Vec<Pattern> },
    Mapping { keys: Vec<Expr>, patterns: Vec<Pattern>, rest: Option<String> },
    Class { name: Expr, positional: Vec<Pattern>, keyword: Vec<(String, Pattern)> },
    As { pattern: Box<Pattern>, name: String },
}

#[derive(Debug, Clone)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ExceptHandler {
    pub types: Vec<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct WithItem {
    pub context_expr: Expr,
    pub optional_vars: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub keywords: Vec<(Option<String>, Expr)>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Params,
    pub body: Arc<Vec<Stmt>>,
    pub decorators: Vec<Expr>,
    pub is_generator: bool,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign { target: Expr, op: AugOp, value: Expr },
    AnnAssign { target: Expr, annotation: Expr, value: Option<Expr> },
    Return(Option<Expr>),
    Pass,
    Break,
    Continue,
    Delete(Vec<Expr>),
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Assert { test: Expr, msg: Option<Expr> },
    Raise { exc: Option<Expr>, cause: Option<Expr> },
    Import { names: Vec<(String, Option<String>)> },
    ImportFrom { module: String, names: Vec<(String, Option<String>)> },
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    While { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    For { target: Expr, iter: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    Try { body: Vec<Stmt>, handlers: Vec<ExceptHandler>, orelse: Vec<Stmt>, finally: Vec<Stmt> },
    With { items: Vec<WithItem>, body: Vec<Stmt> },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Match { subject: Expr, cases: Vec<MatchCase> },
    Line(u32),
}
