//! Purity and compile-time evaluability of lowered functions.

use crate::builtins::is_literal_type_name;
use crate::ir::{Callee, Expr, ExprKind, Func, Stmt, StmtKind};
use crate::registry::Effect;
use crate::ty::Ty;

const IMPURE_PREFIXES: &[&str] = &[
    "print", "read", "write", "open", "close", "to_string", "format",
];

fn is_impure_name(name: &str) -> bool {
    IMPURE_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn returns_literal(ty: &Ty) -> bool {
    match ty {
        Ty::Primitive(name) => is_literal_type_name(name),
        Ty::Unit => true,
        _ => false,
    }
}

pub fn is_pure_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Var(_) | ExprKind::FunctionRef(_) => true,
        ExprKind::Binary { lhs, rhs, .. } => is_pure_expr(lhs) && is_pure_expr(rhs),
        ExprKind::Unary { operand, .. } => is_pure_expr(operand),
        ExprKind::Member { object, .. } => is_pure_expr(object),
        ExprKind::Index { object, index } => is_pure_expr(object) && is_pure_expr(index),
        ExprKind::Record { fields, .. } => fields.iter().all(|(_, e)| is_pure_expr(e)),
        ExprKind::Array(elems) => elems.iter().all(is_pure_expr),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            is_pure_expr(cond)
                && is_pure_expr(then_branch)
                && else_branch.as_deref().map_or(true, is_pure_expr)
        }
        ExprKind::Block { stmts, result } => {
            stmts.iter().all(is_pure_stmt) && result.as_deref().map_or(true, is_pure_expr)
        }
        ExprKind::Match { scrutinee, arms } => {
            is_pure_expr(scrutinee) && arms.iter().all(|arm| is_pure_expr(&arm.body))
        }
        // Building a closure has no effect; calling it is judged at the call.
        ExprKind::Lambda { .. } => true,
        ExprKind::Call { callee, args } => is_pure_call(callee, &expr.ty) && args.iter().all(is_pure_expr),
    }
}

fn is_pure_call(callee: &Callee, ret: &Ty) -> bool {
    if !returns_literal(ret) {
        return false;
    }
    match callee {
        Callee::Function(name) => !is_impure_name(name),
        Callee::Method { receiver, method } => !is_impure_name(method) && is_pure_expr(receiver),
        Callee::Builtin(_) | Callee::Value(_) => false,
    }
}

pub fn is_pure_stmt(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Let { value, .. } | StmtKind::Assign { value, .. } => is_pure_expr(value),
        StmtKind::Expr(e) => is_pure_expr(e),
        StmtKind::Return(value) => value.as_ref().map_or(true, is_pure_expr),
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => is_pure_expr(cond) && then_body.iter().all(is_pure_stmt) && else_body.iter().all(is_pure_stmt),
        StmtKind::While { cond, body } => is_pure_expr(cond) && body.iter().all(is_pure_stmt),
        StmtKind::For { iterable, body, .. } => is_pure_expr(iterable) && body.iter().all(is_pure_stmt),
        StmtKind::Break | StmtKind::Continue => true,
    }
}

/// Effect tags for a lowered function. External functions have no body to
/// inspect and get none.
pub fn function_effects(func: &Func) -> Vec<Effect> {
    let Some(body) = &func.body else {
        return Vec::new();
    };
    if !is_pure_expr(body) {
        return Vec::new();
    }
    let mut effects = vec![Effect::Pure];
    if returns_literal(&func.ret_type) {
        effects.push(Effect::Constexpr);
    }
    effects
}
