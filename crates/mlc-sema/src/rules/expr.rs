use super::{unexpected_node, Lowered, Node, Rule};
use crate::ast::{self, ExprKind, Literal};
use crate::builtins::{is_float_name, is_numeric_name};
use crate::error::SemaResult;
use crate::infer::{literal_type, CallTarget, ResolvedCall};
use crate::ir;
use crate::lower::Lowering;
use crate::match_analyzer::MatchAnalyzer;
use crate::ty::Ty;

fn expr_kind<'n>(node: &'n Node<'_>, rule: &'static str) -> SemaResult<&'n ExprKind> {
    node.as_expr().ok_or_else(|| unexpected_node(rule))
}

fn typed(kind: ir::ExprKind, ty: Ty, node: &Node<'_>) -> Lowered {
    Lowered::Expr(ir::Expr::new(kind, ty, node.origin()))
}

fn lower_args(cx: &mut Lowering, args: &[ast::Expr], expected: &[Ty]) -> SemaResult<Vec<ir::Expr>> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| cx.lower_expr_expecting(arg, expected.get(i)))
        .collect()
}

fn arg_types(args: &[ir::Expr]) -> Vec<Ty> {
    args.iter().map(|a| a.ty.clone()).collect()
}

fn callee_for(resolved: &ResolvedCall, name: &str, cx: &Lowering, origin: ast::Origin) -> ir::Callee {
    match &resolved.target {
        CallTarget::Function(canonical) => ir::Callee::Function(canonical.clone()),
        CallTarget::Builtin(builtin) => ir::Callee::Builtin(builtin.clone()),
        CallTarget::Value => {
            let ty = cx.env.lookup(name).cloned().unwrap_or_else(Ty::auto);
            ir::Callee::Value(Box::new(ir::Expr::new(ir::ExprKind::Var(name.to_string()), ty, origin)))
        }
    }
}

// ── Leaves ─────────────────────────────────────────────────────────────

/// Literals. Numeric literals take the expected numeric type when there is
/// one, so `let x: f64 = 1.5` needs no suffix.
pub struct LiteralRule;

impl Rule for LiteralRule {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Literal(_)))
    }

    fn apply(&self, node: &Node<'_>, _cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Literal(lit) = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let mut ty = literal_type(lit);
        if let Some(Ty::Primitive(want)) = node.expected() {
            match lit {
                Literal::Int(_) if is_numeric_name(want) => ty = Ty::prim(want.clone()),
                Literal::Float(_) if is_float_name(want) => ty = Ty::prim(want.clone()),
                _ => {}
            }
        }
        Ok(typed(ir::ExprKind::Literal(lit.clone()), ty, node))
    }
}

/// Identifiers: locals, functions referenced as values, and nullary
/// constructors such as `None`, which are lowered as calls.
pub struct VariableRule;

impl Rule for VariableRule {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Var(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Var(name) = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let origin = node.origin();
        if let Some(ty) = cx.env.lookup(name) {
            return Ok(typed(ir::ExprKind::Var(name.clone()), ty.clone(), node));
        }

        let nullary = cx
            .constructors
            .get(name)
            .is_some_and(|c| c.info.param_types.is_empty());
        if nullary {
            let resolved = cx.inference().call_type(name, &[], node.expected(), origin)?;
            let callee = callee_for(&resolved, name, cx, origin);
            return Ok(typed(
                ir::ExprKind::Call {
                    callee,
                    args: Vec::new(),
                },
                resolved.ret_type,
                node,
            ));
        }

        if let Some(entry) = cx.functions.fetch_entry(name) {
            let kind = ir::ExprKind::FunctionRef(entry.name.clone());
            return Ok(typed(kind, entry.value.fn_type(), node));
        }

        if let Ok(value) = name.parse::<bool>() {
            return Ok(typed(ir::ExprKind::Literal(Literal::Bool(value)), Ty::bool(), node));
        }

        let ty = cx.inference().variable_type(name, origin)?;
        Ok(typed(ir::ExprKind::Var(name.clone()), ty, node))
    }
}

/// A container name that is not a local: `Math` in `Math.add`.
fn module_container<'e>(object: &'e ast::Expr, cx: &Lowering) -> Option<&'e str> {
    match &object.kind {
        ExprKind::Var(name) if !cx.env.contains(name) && !cx.functions.is_registered(name) => Some(name),
        _ => None,
    }
}

/// Non-call member access: record fields, built-in properties, and module
/// functions referenced as values.
pub struct MemberRule;

impl Rule for MemberRule {
    fn name(&self) -> &'static str {
        "member"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Member { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Member { object, member } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        if let Some(container) = module_container(object, cx) {
            if let Some((canonical, ty)) = cx.inference().module_member_type(container, member) {
                return Ok(typed(ir::ExprKind::FunctionRef(canonical), ty, node));
            }
        }
        let object = cx.lower_expr(object)?;
        let ty = cx.inference().member_type(&object.ty, member, node.origin())?;
        let kind = ir::ExprKind::Member {
            object: Box::new(object),
            member: member.clone(),
        };
        Ok(typed(kind, ty, node))
    }
}

// ── Calls ──────────────────────────────────────────────────────────────

/// Every call shape: named functions and constructors, module functions,
/// built-in methods, and calls through function-typed values.
pub struct CallRule;

impl CallRule {
    fn named_call(
        &self,
        name: &str,
        args: &[ast::Expr],
        node: &Node<'_>,
        cx: &mut Lowering,
    ) -> SemaResult<Lowered> {
        let origin = node.origin();
        let expected: Vec<Ty> = cx
            .functions
            .fetch(name)
            .map(|info| info.param_types.clone())
            .unwrap_or_default();
        let args = lower_args(cx, args, &expected)?;
        let resolved = cx
            .inference()
            .call_type(name, &arg_types(&args), node.expected(), origin)?;
        let callee = callee_for(&resolved, name, cx, origin);
        Ok(typed(ir::ExprKind::Call { callee, args }, resolved.ret_type, node))
    }

    fn module_call(
        &self,
        container: &str,
        member: &str,
        args: &[ast::Expr],
        node: &Node<'_>,
        cx: &mut Lowering,
    ) -> SemaResult<Option<Lowered>> {
        let Some(info) = cx.inference().module_member_info(container, member).cloned() else {
            return Ok(None);
        };
        let args = lower_args(cx, args, &info.param_types)?;
        let resolved =
            cx.inference()
                .module_call_type(container, member, &arg_types(&args), node.expected(), node.origin())?;
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        let callee = callee_for(&resolved, member, cx, node.origin());
        Ok(Some(typed(ir::ExprKind::Call { callee, args }, resolved.ret_type, node)))
    }

    fn method_call(
        &self,
        object: &ast::Expr,
        method: &str,
        args: &[ast::Expr],
        node: &Node<'_>,
        cx: &mut Lowering,
    ) -> SemaResult<Lowered> {
        let origin = node.origin();
        let receiver = cx.lower_expr(object)?;

        // A record field holding a function is called like a method.
        let field = cx.inference().member_type(&receiver.ty, method, origin);
        if let Ok(field_ty @ Ty::Function(..)) = field {
            let args = lower_args(cx, args, param_types(&field_ty))?;
            let ret = cx.inference().function_value_call(&field_ty, &arg_types(&args), origin)?;
            let callee = ir::Expr::new(
                ir::ExprKind::Member {
                    object: Box::new(receiver),
                    member: method.to_string(),
                },
                field_ty,
                origin,
            );
            let kind = ir::ExprKind::Call {
                callee: ir::Callee::Value(Box::new(callee)),
                args,
            };
            return Ok(typed(kind, ret, node));
        }

        let mut lowered: Vec<ir::Expr> = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let expected = method_arg_expectation(&receiver.ty, method, i, &lowered);
            lowered.push(cx.lower_expr_expecting(arg, expected.as_ref())?);
        }
        let ret = cx
            .inference()
            .method_call_type(&receiver.ty, method, &arg_types(&lowered), origin)?;
        let kind = ir::ExprKind::Call {
            callee: ir::Callee::Method {
                receiver: Box::new(receiver),
                method: method.to_string(),
            },
            args: lowered,
        };
        Ok(typed(kind, ret, node))
    }

    fn value_call(
        &self,
        callee: &ast::Expr,
        args: &[ast::Expr],
        node: &Node<'_>,
        cx: &mut Lowering,
    ) -> SemaResult<Lowered> {
        let callee = cx.lower_expr(callee)?;
        let args = lower_args(cx, args, param_types(&callee.ty))?;
        let ret = cx
            .inference()
            .function_value_call(&callee.ty, &arg_types(&args), node.origin())?;
        let kind = ir::ExprKind::Call {
            callee: ir::Callee::Value(Box::new(callee)),
            args,
        };
        Ok(typed(kind, ret, node))
    }
}

fn param_types(ty: &Ty) -> &[Ty] {
    match ty {
        Ty::Function(params, _) => params,
        _ => &[],
    }
}

/// Lambdas passed to `map`, `filter` and `fold` learn their parameter
/// types from the receiver's element type.
fn method_arg_expectation(receiver: &Ty, method: &str, index: usize, previous: &[ir::Expr]) -> Option<Ty> {
    let elem = receiver.element()?;
    match (method, index) {
        ("map" | "filter", 0) => Some(Ty::func(vec![elem.clone()], Ty::auto())),
        ("fold", 1) => {
            let init = previous.first()?.ty.clone();
            Some(Ty::func(vec![init.clone(), elem.clone()], init))
        }
        _ => None,
    }
}

impl Rule for CallRule {
    fn name(&self) -> &'static str {
        "call"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Call { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Call { callee, args } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        match &callee.kind {
            ExprKind::Var(name) if !cx.env.contains(name) => self.named_call(name, args, node, cx),
            ExprKind::Member { object, member } => {
                if let Some(container) = module_container(object, cx) {
                    if let Some(lowered) = self.module_call(container, member, args, node, cx)? {
                        return Ok(lowered);
                    }
                }
                self.method_call(object, member, args, node, cx)
            }
            _ => self.value_call(callee, args, node, cx),
        }
    }
}

// ── Operators ──────────────────────────────────────────────────────────

pub struct UnaryRule;

impl Rule for UnaryRule {
    fn name(&self) -> &'static str {
        "unary"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Unary { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Unary { op, operand } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let operand = cx.lower_expr_expecting(operand, node.expected())?;
        let ty = cx.inference().unary_type(*op, &operand.ty, node.origin())?;
        let kind = ir::ExprKind::Unary {
            op: *op,
            operand: Box::new(operand),
        };
        Ok(typed(kind, ty, node))
    }
}

/// The right operand is lowered expecting the left operand's type.
pub struct BinaryRule;

impl Rule for BinaryRule {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Binary { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Binary { op, lhs, rhs } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let lhs = cx.lower_expr(lhs)?;
        let rhs = cx.lower_expr_expecting(rhs, Some(&lhs.ty))?;
        let ty = cx.inference().binary_type(*op, &lhs.ty, &rhs.ty, node.origin())?;
        let kind = ir::ExprKind::Binary {
            op: *op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        Ok(typed(kind, ty, node))
    }
}

// ── Aggregates ─────────────────────────────────────────────────────────

pub struct RecordLiteralRule;

impl Rule for RecordLiteralRule {
    fn name(&self) -> &'static str {
        "record_literal"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Record { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Record { name, fields } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let mut lowered = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            let expected = name
                .as_deref()
                .and_then(|n| cx.types.resolve_member(n, field))
                .cloned();
            lowered.push((field.clone(), cx.lower_expr_expecting(value, expected.as_ref())?));
        }
        let field_types: Vec<(String, Ty)> = lowered.iter().map(|(n, e)| (n.clone(), e.ty.clone())).collect();
        let ty = cx
            .inference()
            .record_literal_type(name.as_deref(), &field_types, node.origin())?;
        let kind = ir::ExprKind::Record {
            name: ty.name(),
            fields: lowered,
        };
        Ok(typed(kind, ty, node))
    }
}

pub struct ArrayLiteralRule;

impl Rule for ArrayLiteralRule {
    fn name(&self) -> &'static str {
        "array_literal"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Array(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Array(elems) = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let expected_elem = node.expected().and_then(Ty::element).cloned();
        if elems.is_empty() {
            let ty = match node.expected() {
                Some(ty @ Ty::Array(_)) => ty.clone(),
                _ => Ty::array(Ty::auto()),
            };
            return Ok(typed(ir::ExprKind::Array(Vec::new()), ty, node));
        }

        let mut lowered: Vec<ir::Expr> = Vec::with_capacity(elems.len());
        for elem in elems {
            let expected = lowered.first().map(|e| e.ty.clone()).or_else(|| expected_elem.clone());
            lowered.push(cx.lower_expr_expecting(elem, expected.as_ref())?);
        }
        let elem_ty = lowered[0].ty.clone();
        let checker = cx.checker();
        for (i, elem) in lowered.iter().enumerate().skip(1) {
            checker.ensure_compatible_type(
                &elem.ty,
                &elem_ty,
                &format!("array element {}", i + 1),
                elem.origin.or(node.origin()),
            )?;
        }
        Ok(typed(ir::ExprKind::Array(lowered), Ty::array(elem_ty), node))
    }
}

pub struct IndexRule;

impl Rule for IndexRule {
    fn name(&self) -> &'static str {
        "index"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Index { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Index { object, index } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let object = cx.lower_expr(object)?;
        let index = cx.lower_expr(index)?;
        let ty = cx.inference().index_type(&object.ty, &index.ty, node.origin())?;
        let kind = ir::ExprKind::Index {
            object: Box::new(object),
            index: Box::new(index),
        };
        Ok(typed(kind, ty, node))
    }
}

// ── Control flow ───────────────────────────────────────────────────────

pub struct IfExprRule;

impl Rule for IfExprRule {
    fn name(&self) -> &'static str {
        "if_expr"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::If { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } = expr_kind(node, self.name())?
        else {
            return Err(unexpected_node(self.name()));
        };
        let origin = node.origin();
        let cond = cx.lower_expr_expecting(cond, Some(&Ty::bool()))?;
        cx.checker().ensure_boolean_type(&cond.ty, "if condition", cond.origin.or(origin))?;

        let then_branch = cx.lower_expr_expecting(then_branch, node.expected())?;
        let (else_branch, ty) = match else_branch {
            Some(else_branch) => {
                let else_branch = cx.lower_expr_expecting(else_branch, Some(&then_branch.ty))?;
                cx.checker().ensure_compatible_type(
                    &else_branch.ty,
                    &then_branch.ty,
                    "else branch",
                    else_branch.origin.or(origin),
                )?;
                let ty = then_branch.ty.clone();
                (Some(Box::new(else_branch)), ty)
            }
            None => (None, Ty::void()),
        };
        let kind = ir::ExprKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
        };
        Ok(typed(kind, ty, node))
    }
}

/// `{ stmts; result }` in its own scope. Without a result the block is
/// `void`.
pub struct BlockRule;

impl Rule for BlockRule {
    fn name(&self) -> &'static str {
        "block"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Block { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Block { stmts, result } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let expected = node.expected();
        cx.with_scope(|cx| {
            let stmts = cx.lower_block(stmts)?;
            let result = match result {
                Some(result) => Some(Box::new(cx.lower_expr_expecting(result, expected)?)),
                None => None,
            };
            let ty = result.as_ref().map_or_else(Ty::void, |r| r.ty.clone());
            Ok(typed(ir::ExprKind::Block { stmts, result }, ty, node))
        })
    }
}

pub struct MatchRule;

impl Rule for MatchRule {
    fn name(&self) -> &'static str {
        "match"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Match { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Match { scrutinee, arms } = expr_kind(node, self.name())? else {
            return Err(unexpected_node(self.name()));
        };
        let scrutinee = cx.lower_expr(scrutinee)?;
        let scrutinee_ty = scrutinee.ty.clone();
        let expected = node.expected();

        let analyzer = MatchAnalyzer::new(cx.config.check_exhaustiveness);
        let analysis = analyzer.analyze(cx, &scrutinee_ty, arms.as_slice(), node.origin(), |cx, arm: &ast::MatchArm| {
            cx.with_scope(|cx| {
                let pattern = cx.lower_pattern(&arm.pattern, &scrutinee_ty, arm.origin)?;
                let body = cx.lower_expr_expecting(&arm.body, expected)?;
                Ok(ir::MatchArm { pattern, body })
            })
        })?;

        let kind = ir::ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms: analysis.arms,
        };
        Ok(typed(kind, analysis.result_type, node))
    }
}

/// Parameter types come from annotations, else from the expected function
/// type, else stay `auto`.
pub struct LambdaRule;

impl Rule for LambdaRule {
    fn name(&self) -> &'static str {
        "lambda"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(ExprKind::Lambda { .. }))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let ExprKind::Lambda {
            params,
            ret_type,
            body,
        } = expr_kind(node, self.name())?
        else {
            return Err(unexpected_node(self.name()));
        };
        let origin = node.origin();
        let (expected_params, expected_ret) = match node.expected() {
            Some(Ty::Function(params, ret)) => (params.as_slice(), Some(ret.as_ref())),
            _ => (&[][..], None),
        };

        let mut lowered_params = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let ty = match &param.ty {
                Some(te) => cx.resolve_type_expr(te, origin)?,
                None => expected_params.get(i).cloned().unwrap_or_else(Ty::auto),
            };
            lowered_params.push(ir::Param {
                name: param.name.clone(),
                ty,
            });
        }
        let declared_ret = match ret_type {
            Some(te) => Some(cx.resolve_type_expr(te, origin)?),
            None => None,
        };
        let body_expectation = declared_ret
            .clone()
            .or_else(|| expected_ret.filter(|t| !t.is_auto()).cloned());

        let body = cx.with_scope(|cx| {
            for param in &lowered_params {
                cx.env.insert(param.name.clone(), param.ty.clone());
            }
            let ret_for_returns = body_expectation.clone().unwrap_or_else(Ty::auto);
            cx.with_return_type(ret_for_returns, |cx| cx.lower_expr_expecting(body, body_expectation.as_ref()))
        })?;
        if let Some(ret) = &declared_ret {
            cx.checker()
                .ensure_compatible_type(&body.ty, ret, "lambda return value", body.origin.or(origin))?;
        }

        let ret = declared_ret.unwrap_or_else(|| body.ty.clone());
        let ty = Ty::func(lowered_params.iter().map(|p| p.ty.clone()).collect(), ret);
        let kind = ir::ExprKind::Lambda {
            params: lowered_params,
            body: Box::new(body),
        };
        Ok(typed(kind, ty, node))
    }
}
