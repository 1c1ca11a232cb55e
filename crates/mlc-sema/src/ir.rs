//! The typed intermediate representation handed to code generation.
//!
//! Mirrors the input tree, with every expression carrying its resolved
//! type and calls carrying the canonical name of what they invoke.

use rowan::TextRange;

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::registry::Effect;
use crate::ty::{Ty, TypeParam};

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub namespace: Option<String>,
    pub items: Vec<Item>,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &Func> {
        self.items.iter().filter_map(|item| match item {
            Item::Func(f) => Some(f),
            Item::Type(_) => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Type(t) => Some(t),
            Item::Func(_) => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&Func> {
        self.functions().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug)]
pub enum Item {
    Func(Func),
    Type(TypeDecl),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

#[derive(Clone, Debug)]
pub struct Func {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret_type: Ty,
    pub body: Option<Expr>,
    pub exported: bool,
    pub external: bool,
    pub effects: Vec<Effect>,
    pub origin: Option<TextRange>,
}

#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub name: String,
    pub ty: Ty,
    pub type_params: Vec<TypeParam>,
    pub exported: bool,
    pub origin: Option<TextRange>,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
    pub origin: Option<TextRange>,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty, origin: Option<TextRange>) -> Self {
        Expr { kind, ty, origin }
    }
}

/// What a call invokes.
#[derive(Clone, Debug)]
pub enum Callee {
    /// A registered function or constructor, by canonical name.
    Function(String),
    /// An I/O or formatting built-in.
    Builtin(String),
    /// A built-in method on a value (`xs.map(f)`).
    Method { receiver: Box<Expr>, method: String },
    /// A function-typed value (local, parameter, lambda).
    Value(Box<Expr>),
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Var(String),
    /// A function referenced as a value, by canonical name.
    FunctionRef(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        member: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Record {
        name: String,
        fields: Vec<(String, Expr)>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Block {
        stmts: Vec<Stmt>,
        result: Option<Box<Expr>>,
    },
    Array(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Wildcard,
    Bind { name: String, ty: Ty },
    Literal(Literal),
    Constructor {
        name: String,
        fields: Vec<Pattern>,
        ty: Ty,
    },
    Or(Vec<Pattern>),
}

impl Pattern {
    /// Matches any value of the scrutinee's type.
    pub fn is_catch_all(&self) -> bool {
        match self {
            Pattern::Wildcard | Pattern::Bind { .. } => true,
            Pattern::Or(alts) => alts.iter().any(Pattern::is_catch_all),
            Pattern::Literal(_) | Pattern::Constructor { .. } => false,
        }
    }

    /// Top-level constructor names this pattern covers.
    pub fn covered_variants(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Constructor { name, .. } => out.push(name.clone()),
            Pattern::Or(alts) => alts.iter().for_each(|alt| alt.covered_variants(out)),
            Pattern::Wildcard | Pattern::Bind { .. } | Pattern::Literal(_) => {}
        }
    }
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub origin: Option<TextRange>,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Let {
        name: String,
        mutable: bool,
        ty: Ty,
        value: Expr,
    },
    Assign {
        target: String,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        var_ty: Ty,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
}
