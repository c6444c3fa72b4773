//! Shared AST and type representation (spec §3, §4.1).
//!
//! The tree is built once by the parser and the import resolver and is
//! never mutated afterwards: the semantic analyzer and the code generator
//! each walk it read-only, recomputing whatever instantiation-dependent
//! facts they need (see `crate::semantic::checker`) rather than annotating
//! nodes in place.

use std::fmt;

/// A 1-based line/column pair, as produced by the lexer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A type expression: a name plus an ordered list of type parameters.
///
/// Built-in atoms (`int`, `boolean`, `void`, `*`) are represented the same
/// way as declared structs and type variables — only the name
/// distinguishes them — so substitution and equality need no special case
/// beyond the wildcard rule in `crate::subst`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeExpr {
    pub name: String,
    pub params: Vec<TypeExpr>,
}

impl TypeExpr {
    pub fn simple(name: impl Into<String>) -> Self {
        TypeExpr {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, params: Vec<TypeExpr>) -> Self {
        TypeExpr {
            name: name.into(),
            params,
        }
    }

    pub fn int() -> Self {
        TypeExpr::simple("int")
    }

    pub fn boolean() -> Self {
        TypeExpr::simple("boolean")
    }

    pub fn void() -> Self {
        TypeExpr::simple("void")
    }

    pub fn wildcard() -> Self {
        TypeExpr::simple("*")
    }

    pub fn is_builtin_atom(&self) -> bool {
        self.params.is_empty() && matches!(self.name.as_str(), "int" | "boolean" | "void" | "*")
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            write!(f, "<")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{p}")?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn text(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    pub fn is_ordered_comparison(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64, Position),
    Bool(bool, Position),
    Null(Position),
    /// A `"..."` literal, sugar for a `vec<char>` built from the decoded
    /// character codes (spec §6 host ABI, SPEC_FULL §C).
    StringLit(String, Position),
    Ident(String, Position),
    Unary(UnaryOp, Box<Expr>, Position),
    Binary(BinOp, Box<Expr>, Box<Expr>, Position),
    MemberAccess(Box<MemberAccessExpr>),
    MethodCall(Box<MethodCallExpr>),
    Call(Box<CallExpr>),
    ListLiteral(Vec<Expr>, Position),
}

impl Expr {
    pub fn pos(&self) -> Position {
        match self {
            Expr::Int(_, p)
            | Expr::Bool(_, p)
            | Expr::Null(p)
            | Expr::StringLit(_, p)
            | Expr::Ident(_, p)
            | Expr::Unary(_, _, p)
            | Expr::Binary(_, _, _, p)
            | Expr::ListLiteral(_, p) => *p,
            Expr::MemberAccess(m) => m.pos,
            Expr::MethodCall(m) => m.pos,
            Expr::Call(c) => c.pos,
        }
    }
}

/// `obj.field`. Whether `obj` names a struct template (a static-field
/// access) or an expression of struct type (an instance-field access) is
/// resolved by the typing rules in `crate::semantic::checker`, not stored
/// here.
#[derive(Debug, Clone)]
pub struct MemberAccessExpr {
    pub object: Expr,
    pub field: String,
    pub pos: Position,
}

/// `receiver.method<Ā_m>(args)`, or `Struct.method<Ā_m>(args)` when
/// `receiver` is itself a bare identifier naming a struct template.
#[derive(Debug, Clone)]
pub struct MethodCallExpr {
    pub receiver: Expr,
    pub method: String,
    pub method_type_args: Vec<TypeExpr>,
    pub args: Vec<Expr>,
    pub pos: Position,
}

/// A free-function call `f<Ā>(args)`, or a constructor call
/// `S<Ā>(args)` when `name` names a struct template — disambiguated by
/// the semantic analyzer, not the parser.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub name: String,
    pub type_args: Vec<TypeExpr>,
    pub args: Vec<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    VarDecl {
        type_: TypeExpr,
        name: String,
        expr: Option<Expr>,
        pos: Position,
    },
    VarAssign {
        name: String,
        expr: Expr,
        pos: Position,
    },
    MemberAssign {
        object: Expr,
        field: String,
        expr: Expr,
        pos: Position,
    },
    Return {
        expr: Option<Expr>,
        pos: Position,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        pos: Position,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        pos: Position,
    },
    Until {
        cond: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        pos: Position,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        pos: Position,
    },
    Do {
        count: Option<Expr>,
        cond: Option<Expr>,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        pos: Position,
    },
    Break(Position),
    Continue(Position),
    Expr(Expr, Position),
}

impl Stmt {
    pub fn pos(&self) -> Position {
        match self {
            Stmt::VarDecl { pos, .. }
            | Stmt::VarAssign { pos, .. }
            | Stmt::MemberAssign { pos, .. }
            | Stmt::Return { pos, .. }
            | Stmt::If { pos, .. }
            | Stmt::While { pos, .. }
            | Stmt::Until { pos, .. }
            | Stmt::For { pos, .. }
            | Stmt::Do { pos, .. }
            | Stmt::Expr(_, pos) => *pos,
            Stmt::Break(pos) | Stmt::Continue(pos) => *pos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportDeclaration {
    /// File import when `Some`; host import when `None`.
    pub source: Option<String>,
    pub module: Option<String>,
    pub name: Option<String>,
    pub params: Vec<TypeExpr>,
    pub return_type: TypeExpr,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct FunctionDeclaration {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<(String, TypeExpr)>,
    pub return_type: TypeExpr,
    pub body: Vec<Stmt>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<(String, TypeExpr)>,
    pub return_type: TypeExpr,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub pos: Position,
}

impl MethodDeclaration {
    pub fn is_constructor_of(&self, struct_name: &str) -> bool {
        self.is_static && self.name == struct_name
    }
}

#[derive(Debug, Clone)]
pub struct StaticField {
    pub name: String,
    pub type_: TypeExpr,
    pub value: Literal,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct StructureDeclaration {
    pub name: String,
    pub type_params: Vec<String>,
    pub fields: Vec<(String, TypeExpr)>,
    pub static_fields: Vec<StaticField>,
    pub methods: Vec<MethodDeclaration>,
    pub pos: Position,
}

impl StructureDeclaration {
    pub fn constructor(&self) -> Option<&MethodDeclaration> {
        self.methods.iter().find(|m| m.is_constructor_of(&self.name))
    }

    pub fn method(&self, name: &str) -> Option<&MethodDeclaration> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&TypeExpr> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn static_field(&self, name: &str) -> Option<&StaticField> {
        self.static_fields.iter().find(|f| f.name == name)
    }

    pub fn field_offset(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name).map(|i| i * 4)
    }

    pub fn size_bytes(&self) -> usize {
        self.fields.len() * 4
    }
}

/// A top-level item. Script-mode statements and declarations share one
/// list, in source order, matching the grammar's single top-level
/// production (spec §3 invariant 7 is enforced over this list).
#[derive(Debug, Clone)]
pub enum TopLevel {
    Import(ImportDeclaration),
    Function(FunctionDeclaration),
    Structure(StructureDeclaration),
    Statement(Stmt),
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub items: Vec<TopLevel>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.items.iter().filter_map(|d| match d {
            TopLevel::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn structures(&self) -> impl Iterator<Item = &StructureDeclaration> {
        self.items.iter().filter_map(|d| match d {
            TopLevel::Structure(s) => Some(s),
            _ => None,
        })
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportDeclaration> {
        self.items.iter().filter_map(|d| match d {
            TopLevel::Import(i) => Some(i),
            _ => None,
        })
    }

    pub fn top_level_statements(&self) -> impl Iterator<Item = &Stmt> {
        self.items.iter().filter_map(|d| match d {
            TopLevel::Statement(s) => Some(s),
            _ => None,
        })
    }

    pub fn find_struct(&self, name: &str) -> Option<&StructureDeclaration> {
        self.structures().find(|s| s.name == name)
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.functions().find(|f| f.name == name)
    }
}
