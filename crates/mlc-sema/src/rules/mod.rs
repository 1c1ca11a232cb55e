//! Rule-based dispatch for AST to IR lowering.
//!
//! The engine maps a [`Stage`] to an ordered list of rules. Dispatching a
//! node walks the list in registration order and applies the first rule
//! that accepts it. New node shapes, sugar, or built-ins are supported by
//! registering more rules rather than editing existing ones.

mod decl;
mod expr;
mod stmt;

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::ir;
use crate::lower::Lowering;
use crate::ty::Ty;

pub use decl::{AliasDeclRule, FunctionRule, OpaqueDeclRule, RecordDeclRule, SumDeclRule};
pub use expr::{
    ArrayLiteralRule, BinaryRule, BlockRule, CallRule, IfExprRule, IndexRule, LambdaRule,
    LiteralRule, MatchRule, MemberRule, RecordLiteralRule, UnaryRule, VariableRule,
};
pub use stmt::{
    AssignRule, ExprStmtRule, ForRule, IfStmtRule, LetRule, LoopControlRule, ReturnRule, WhileRule,
};

/// A transformation stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    TypeDecl,
    Function,
    Expression,
    Statement,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::TypeDecl => "type declaration",
            Stage::Function => "function",
            Stage::Expression => "expression",
            Stage::Statement => "statement",
        };
        f.write_str(s)
    }
}

/// A node offered to the rules of a stage.
#[derive(Clone, Copy, Debug)]
pub enum Node<'a> {
    TypeDecl(&'a ast::TypeDecl),
    Function(&'a ast::FuncDecl),
    Expr {
        expr: &'a ast::Expr,
        /// The type the surrounding context expects, if known.
        expected: Option<&'a Ty>,
    },
    Stmt(&'a ast::Stmt),
}

impl Node<'_> {
    pub fn origin(&self) -> ast::Origin {
        match self {
            Node::TypeDecl(d) => d.origin,
            Node::Function(f) => f.origin,
            Node::Expr { expr, .. } => expr.origin,
            Node::Stmt(s) => s.origin,
        }
    }

    pub fn as_expr(&self) -> Option<&ast::ExprKind> {
        match self {
            Node::Expr { expr, .. } => Some(&expr.kind),
            _ => None,
        }
    }

    pub fn as_stmt(&self) -> Option<&ast::StmtKind> {
        match self {
            Node::Stmt(stmt) => Some(&stmt.kind),
            _ => None,
        }
    }

    pub fn as_type_decl(&self) -> Option<&ast::TypeDecl> {
        match self {
            Node::TypeDecl(decl) => Some(*decl),
            _ => None,
        }
    }

    pub fn expected(&self) -> Option<&Ty> {
        match self {
            Node::Expr { expected, .. } => *expected,
            _ => None,
        }
    }
}

/// The result of applying a rule.
#[derive(Clone, Debug)]
pub enum Lowered {
    TypeDecl(ir::TypeDecl),
    Function(ir::Func),
    Expr(ir::Expr),
    Stmt(ir::Stmt),
}

fn wrong_shape(wanted: &str) -> CompileError {
    CompileError::new(
        ErrorKind::NoApplicableRule,
        format!("Rule did not produce a {}", wanted),
    )
}

/// Raised when a rule is handed a node its `applies` would reject.
fn unexpected_node(rule: &'static str) -> CompileError {
    CompileError::new(
        ErrorKind::NoApplicableRule,
        format!("Rule '{}' cannot lower this node", rule),
    )
}

impl Lowered {
    pub fn into_expr(self) -> SemaResult<ir::Expr> {
        match self {
            Lowered::Expr(e) => Ok(e),
            _ => Err(wrong_shape("expression")),
        }
    }

    pub fn into_stmt(self) -> SemaResult<ir::Stmt> {
        match self {
            Lowered::Stmt(s) => Ok(s),
            _ => Err(wrong_shape("statement")),
        }
    }

    pub fn into_type_decl(self) -> SemaResult<ir::TypeDecl> {
        match self {
            Lowered::TypeDecl(t) => Ok(t),
            _ => Err(wrong_shape("type declaration")),
        }
    }

    pub fn into_function(self) -> SemaResult<ir::Func> {
        match self {
            Lowered::Function(f) => Ok(f),
            _ => Err(wrong_shape("function")),
        }
    }
}

/// One lowering rule.
pub trait Rule {
    /// Stable identifier, used to avoid duplicate registration.
    fn name(&self) -> &'static str;

    fn applies(&self, node: &Node<'_>, cx: &Lowering) -> bool;

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered>;
}

#[derive(Default)]
pub struct RuleEngine {
    rules: FxHashMap<Stage, Vec<Box<dyn Rule>>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` to `stage`. Earlier registrations take precedence.
    pub fn register(&mut self, stage: Stage, rule: impl Rule + 'static) {
        self.rules.entry(stage).or_default().push(Box::new(rule));
    }

    /// Register `rule` unless a rule with the same name is already present.
    pub fn ensure_registered(&mut self, stage: Stage, rule: impl Rule + 'static) -> bool {
        if self.has_rule(stage, rule.name()) {
            return false;
        }
        self.register(stage, rule);
        true
    }

    pub fn has_rule(&self, stage: Stage, name: &str) -> bool {
        self.rules(stage).iter().any(|r| r.name() == name)
    }

    pub fn rules(&self, stage: Stage) -> &[Box<dyn Rule>] {
        self.rules.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Apply the first rule at `stage` that accepts `node`.
    ///
    /// `Ok(None)` means no rule applied; what that means is up to the caller.
    pub fn apply(
        &self,
        stage: Stage,
        node: &Node<'_>,
        cx: &mut Lowering,
    ) -> SemaResult<Option<Lowered>> {
        for rule in self.rules(stage) {
            if rule.applies(node, cx) {
                trace!(%stage, rule = rule.name(), "applying rule");
                return rule.apply(node, cx).map(Some);
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for stage in [Stage::TypeDecl, Stage::Function, Stage::Expression, Stage::Statement] {
            let names: Vec<&str> = self.rules(stage).iter().map(|r| r.name()).collect();
            map.entry(&stage, &names);
        }
        map.finish()
    }
}

/// The engine with one rule per declaration, expression and statement shape.
pub fn default_engine() -> RuleEngine {
    let mut engine = RuleEngine::new();
    register_defaults(&mut engine);
    engine
}

/// Append the built-in rules after whatever `engine` already holds, so that
/// earlier custom rules keep precedence.
pub fn register_defaults(engine: &mut RuleEngine) {
    engine.register(Stage::TypeDecl, RecordDeclRule);
    engine.register(Stage::TypeDecl, SumDeclRule);
    engine.register(Stage::TypeDecl, OpaqueDeclRule);
    engine.register(Stage::TypeDecl, AliasDeclRule);

    engine.register(Stage::Function, FunctionRule);

    engine.register(Stage::Expression, LiteralRule);
    engine.register(Stage::Expression, VariableRule);
    engine.register(Stage::Expression, MemberRule);
    engine.register(Stage::Expression, CallRule);
    engine.register(Stage::Expression, UnaryRule);
    engine.register(Stage::Expression, BinaryRule);
    engine.register(Stage::Expression, RecordLiteralRule);
    engine.register(Stage::Expression, IfExprRule);
    engine.register(Stage::Expression, ArrayLiteralRule);
    engine.register(Stage::Expression, IndexRule);
    engine.register(Stage::Expression, BlockRule);
    engine.register(Stage::Expression, MatchRule);
    engine.register(Stage::Expression, LambdaRule);

    engine.register(Stage::Statement, LetRule);
    engine.register(Stage::Statement, AssignRule);
    engine.register(Stage::Statement, ExprStmtRule);
    engine.register(Stage::Statement, ReturnRule);
    engine.register(Stage::Statement, IfStmtRule);
    engine.register(Stage::Statement, WhileRule);
    engine.register(Stage::Statement, ForRule);
    engine.register(Stage::Statement, LoopControlRule);
}
