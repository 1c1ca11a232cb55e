use super::{unexpected_node, Lowered, Node, Rule};
use crate::ast::StmtKind;
use crate::checker::normalized_type_name;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::ir;
use crate::lower::Lowering;
use crate::ty::Ty;

fn stmt_kind<'n>(node: &'n Node<'_>, rule: &'static str) -> SemaResult<&'n StmtKind> {
    node.as_stmt().ok_or_else(|| unexpected_node(rule))
}

fn lowered(kind: ir::StmtKind, node: &Node<'_>) -> Lowered {
    Lowered::Stmt(ir::Stmt {
        kind,
        origin: node.origin(),
    })
}

/// `let x: T = value`. Without an annotation the binding takes the value's
/// type.
pub struct LetRule;

impl Rule for LetRule {
    fn name(&self) -> &'static str {
        "let"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::Let { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::Let {
            name,
            mutable,
            ty,
            value,
        } = stmt_kind(node, self.name())?
        else {
            return Err(unexpected_node(self.name()));
        };
        let declared = match ty {
            Some(te) => Some(cx.resolve_type_expr(te, node.origin())?),
            None => None,
        };
        let value = cx.lower_expr_expecting(value, declared.as_ref())?;
        if let Some(declared) = &declared {
            cx.checker().ensure_compatible_type(
                &value.ty,
                declared,
                &format!("let binding '{}'", name),
                value.origin.or(node.origin()),
            )?;
        }
        let ty = declared.unwrap_or_else(|| value.ty.clone());
        cx.env.insert(name.clone(), ty.clone());
        let kind = ir::StmtKind::Let {
            name: name.clone(),
            mutable: *mutable,
            ty,
            value,
        };
        Ok(lowered(kind, node))
    }
}

pub struct AssignRule;

impl Rule for AssignRule {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::Assign { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::Assign { target, value } = stmt_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let Some(target_ty) = cx.env.lookup(target).cloned() else {
            return Err(CompileError::unknown_identifier(target, &cx.env.visible_names())
                .with_origin(node.origin()));
        };
        let value = cx.lower_expr_expecting(value, Some(&target_ty))?;
        cx.checker().ensure_compatible_type(
            &value.ty,
            &target_ty,
            &format!("assignment to '{}'", target),
            value.origin.or(node.origin()),
        )?;
        let kind = ir::StmtKind::Assign {
            target: target.clone(),
            value,
        };
        Ok(lowered(kind, node))
    }
}

pub struct ExprStmtRule;

impl Rule for ExprStmtRule {
    fn name(&self) -> &'static str {
        "expr_stmt"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::Expr(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::Expr(expr) = stmt_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let expr = cx.lower_expr(expr)?;
        Ok(lowered(ir::StmtKind::Expr(expr), node))
    }
}

/// Checked against the innermost enclosing function or lambda.
pub struct ReturnRule;

impl Rule for ReturnRule {
    fn name(&self) -> &'static str {
        "return"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::Return(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::Return(value) = stmt_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let expected = cx.current_return_type().cloned();
        let value = match value {
            Some(value) => {
                let value = cx.lower_expr_expecting(value, expected.as_ref())?;
                if let Some(expected) = &expected {
                    cx.checker().ensure_compatible_type(
                        &value.ty,
                        expected,
                        "return value",
                        value.origin.or(node.origin()),
                    )?;
                }
                Some(value)
            }
            None => None,
        };
        Ok(lowered(ir::StmtKind::Return(value), node))
    }
}

pub struct IfStmtRule;

impl Rule for IfStmtRule {
    fn name(&self) -> &'static str {
        "if_stmt"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::If { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::If {
            cond,
            then_body,
            else_body,
        } = stmt_kind(node, self.name())?
        else {
            return Err(unexpected_node(self.name()));
        };
        let cond = cx.lower_expr_expecting(cond, Some(&Ty::bool()))?;
        cx.checker()
            .ensure_boolean_type(&cond.ty, "if condition", cond.origin.or(node.origin()))?;
        let then_body = cx.with_scope(|cx| cx.lower_block(then_body))?;
        let else_body = cx.with_scope(|cx| cx.lower_block(else_body))?;
        let kind = ir::StmtKind::If {
            cond,
            then_body,
            else_body,
        };
        Ok(lowered(kind, node))
    }
}

pub struct WhileRule;

impl Rule for WhileRule {
    fn name(&self) -> &'static str {
        "while"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::While { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::While { cond, body } = stmt_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let cond = cx.lower_expr_expecting(cond, Some(&Ty::bool()))?;
        cx.checker()
            .ensure_boolean_type(&cond.ty, "while condition", cond.origin.or(node.origin()))?;
        let body = cx.with_scope(|cx| cx.lower_block(body))?;
        Ok(lowered(ir::StmtKind::While { cond, body }, node))
    }
}

/// Arrays yield their elements, strings their characters (as strings) and
/// maps their keys.
fn element_type(iterable: &Ty) -> Option<Ty> {
    match iterable {
        Ty::Array(elem) => Some((**elem).clone()),
        Ty::Map(key, _) => Some((**key).clone()),
        ty if ty.is_auto() => Some(Ty::auto()),
        ty if normalized_type_name(&ty.name()) == "string" => Some(Ty::string()),
        _ => None,
    }
}

pub struct ForRule;

impl Rule for ForRule {
    fn name(&self) -> &'static str {
        "for"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::For { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let StmtKind::For {
            var,
            iterable,
            body,
        } = stmt_kind(node, self.name())?
        else {
            return Err(unexpected_node(self.name()));
        };
        let iterable = cx.lower_expr(iterable)?;
        let Some(var_ty) = element_type(&iterable.ty) else {
            return Err(CompileError::new(
                ErrorKind::InvalidOperand,
                format!("Cannot iterate over a value of type {}", iterable.ty),
            )
            .with_origin(iterable.origin.or(node.origin())));
        };
        let body = cx.with_scope(|cx| {
            cx.env.insert(var.clone(), var_ty.clone());
            cx.lower_block(body)
        })?;
        let kind = ir::StmtKind::For {
            var: var.clone(),
            var_ty,
            iterable,
            body,
        };
        Ok(lowered(kind, node))
    }
}

/// `break` and `continue`.
pub struct LoopControlRule;

impl Rule for LoopControlRule {
    fn name(&self) -> &'static str {
        "loop_control"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_stmt(), Some(StmtKind::Break | StmtKind::Continue))
    }

    fn apply(&self, node: &Node<'_>, _cx: &mut Lowering) -> SemaResult<Lowered> {
        let kind = match stmt_kind(node, self.name())? {
            StmtKind::Break => ir::StmtKind::Break,
            StmtKind::Continue => ir::StmtKind::Continue,
            _ => return Err(unexpected_node(self.name())),
        };
        Ok(lowered(kind, node))
    }
}
