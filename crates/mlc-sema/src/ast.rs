//! The declaration tree consumed by semantic analysis.
//!
//! Produced by the parser (not part of this crate). Every node that can be
//! blamed in a diagnostic carries an optional source range.

use std::fmt;

use rowan::TextRange;

pub use crate::ty::TypeParam;

pub type Origin = Option<TextRange>;

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub imports: Vec<Import>,
    pub items: Vec<Item>,
}

/// `import Math`, `import Math as M`, `import Math::{add, sub}`.
#[derive(Clone, Debug)]
pub struct Import {
    pub module: String,
    /// Selectively imported names; empty for a whole-module import.
    pub items: Vec<String>,
    pub alias: Option<String>,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub enum Item {
    Func(FuncDecl),
    Type(TypeDecl),
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    /// `None` means `void`.
    pub ret_type: Option<TypeExpr>,
    /// `None` for external declarations.
    pub body: Option<Expr>,
    pub exported: bool,
    pub external: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub body: TypeDeclBody,
    pub exported: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub enum TypeDeclBody {
    Record(Vec<FieldDecl>),
    Sum(Vec<VariantDecl>),
    Opaque,
    Alias(TypeExpr),
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Clone, Debug)]
pub struct VariantDecl {
    pub name: String,
    pub fields: Vec<TypeExpr>,
}

/// A type as written in source.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Named(String),
    Generic(String, Vec<TypeExpr>),
    Array(Box<TypeExpr>),
    Function(Vec<TypeExpr>, Box<TypeExpr>),
    Ref(Box<TypeExpr>),
    MutRef(Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Unit,
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Generic(name.into(), args)
    }

    pub fn array(elem: TypeExpr) -> Self {
        TypeExpr::Array(Box::new(elem))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Var(String),
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
        callee: Box<Expr>,
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
    /// `Point { x: 1, y: 2 }`, or `{ x: 1, y: 2 }` with the type inferred.
    Record {
        name: Option<String>,
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
        params: Vec<LambdaParam>,
        ret_type: Option<TypeExpr>,
        body: Box<Expr>,
    },
    Block {
        stmts: Vec<Stmt>,
        result: Option<Box<Expr>>,
    },
    Array(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub struct LambdaParam {
    pub name: String,
    pub ty: Option<TypeExpr>,
}

#[derive(Clone, Debug)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    Wildcard,
    Bind(String),
    Literal(Literal),
    Constructor { name: String, fields: Vec<Pattern> },
    Or(Vec<Pattern>),
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Let {
        name: String,
        mutable: bool,
        ty: Option<TypeExpr>,
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
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
}

// ── Construction helpers ───────────────────────────────────────────────

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, origin: None }
    }

    pub fn at(mut self, origin: TextRange) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Literal(Literal::Int(value)))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::Literal(Literal::Float(value)))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Literal(Literal::Str(value.into())))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Var(name.into()))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    /// Call a function by name.
    pub fn call_named(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::call(Self::var(name), args)
    }

    pub fn member(object: Expr, member: impl Into<String>) -> Self {
        Self::new(ExprKind::Member {
            object: Box::new(object),
            member: member.into(),
        })
    }

    /// `object.method(args)`
    pub fn method_call(object: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::call(Self::member(object, method), args)
    }

    pub fn match_expr(scrutinee: Expr, arms: Vec<MatchArm>) -> Self {
        Self::new(ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms,
        })
    }

    pub fn lambda(params: Vec<LambdaParam>, body: Expr) -> Self {
        Self::new(ExprKind::Lambda {
            params,
            ret_type: None,
            body: Box::new(body),
        })
    }

    pub fn block(stmts: Vec<Stmt>, result: Option<Expr>) -> Self {
        Self::new(ExprKind::Block {
            stmts,
            result: result.map(Box::new),
        })
    }
}

impl MatchArm {
    pub fn new(pattern: Pattern, body: Expr) -> Self {
        MatchArm {
            pattern,
            body,
            origin: None,
        }
    }
}

impl Pattern {
    pub fn ctor(name: impl Into<String>, fields: Vec<Pattern>) -> Self {
        Pattern::Constructor {
            name: name.into(),
            fields,
        }
    }

    pub fn bind(name: impl Into<String>) -> Self {
        Pattern::Bind(name.into())
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt { kind, origin: None }
    }

    pub fn let_(name: impl Into<String>, ty: Option<TypeExpr>, value: Expr) -> Self {
        Self::new(StmtKind::Let {
            name: name.into(),
            mutable: false,
            ty,
            value,
        })
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }
}

impl FuncDecl {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        ret_type: Option<TypeExpr>,
        body: Expr,
    ) -> Self {
        FuncDecl {
            name: name.into(),
            type_params: Vec::new(),
            params,
            ret_type,
            body: Some(body),
            exported: false,
            external: false,
            origin: None,
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<TypeParam>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Param {
            name: name.into(),
            ty,
        }
    }
}

impl TypeDecl {
    pub fn new(name: impl Into<String>, type_params: Vec<TypeParam>, body: TypeDeclBody) -> Self {
        TypeDecl {
            name: name.into(),
            type_params,
            body,
            exported: false,
            origin: None,
        }
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }
}
