use tracing::debug;

use super::{unexpected_node, Lowered, Node, Rule};
use crate::ast::{self, TypeDeclBody};
use crate::checker::normalize_type_params;
use crate::error::SemaResult;
use crate::ir;
use crate::lower::Lowering;
use crate::purity::function_effects;
use crate::ty::{Field, Ty, TypeInfo, TypeParam, Variant};

fn type_decl<'a>(node: &Node<'a>, rule: &'static str) -> SemaResult<&'a ast::TypeDecl> {
    match node {
        Node::TypeDecl(decl) => Ok(*decl),
        _ => Err(unexpected_node(rule)),
    }
}

fn type_params_of(decl: &ast::TypeDecl) -> SemaResult<Vec<TypeParam>> {
    normalize_type_params(&decl.type_params).map_err(|e| e.with_origin(decl.origin))
}

/// Register the resolved declaration, replacing its placeholder.
fn register_type(cx: &mut Lowering, decl: &ast::TypeDecl, ty: Ty, type_params: Vec<TypeParam>) -> ir::TypeDecl {
    let info = TypeInfo::new(decl.name.clone(), ty.clone()).with_type_params(type_params.clone());
    let reg = cx.registration(decl.exported, false, decl.origin);
    cx.types.register(info, reg);
    ir::TypeDecl {
        name: decl.name.clone(),
        ty,
        type_params,
        exported: decl.exported,
        origin: decl.origin,
    }
}

pub struct RecordDeclRule;

impl Rule for RecordDeclRule {
    fn name(&self) -> &'static str {
        "record_decl"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_type_decl().map(|d| &d.body), Some(TypeDeclBody::Record(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let decl = type_decl(node, self.name())?;
        let TypeDeclBody::Record(fields) = &decl.body else {
            return Err(unexpected_node(self.name()));
        };
        let type_params = type_params_of(decl)?;
        let fields = cx.with_type_params(&type_params, |cx| {
            fields
                .iter()
                .map(|f| Ok(Field::new(f.name.clone(), cx.resolve_type_expr(&f.ty, decl.origin)?)))
                .collect::<SemaResult<Vec<_>>>()
        })?;
        let ty = Ty::Record {
            name: decl.name.clone(),
            fields,
        };
        Ok(Lowered::TypeDecl(register_type(cx, decl, ty, type_params)))
    }
}

/// Sum types also get one constructor function per variant.
pub struct SumDeclRule;

impl Rule for SumDeclRule {
    fn name(&self) -> &'static str {
        "sum_decl"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_type_decl().map(|d| &d.body), Some(TypeDeclBody::Sum(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let decl = type_decl(node, self.name())?;
        let TypeDeclBody::Sum(variants) = &decl.body else {
            return Err(unexpected_node(self.name()));
        };
        let type_params = type_params_of(decl)?;
        let variants = cx.with_type_params(&type_params, |cx| {
            variants
                .iter()
                .map(|v| {
                    let fields = v
                        .fields
                        .iter()
                        .map(|te| cx.resolve_type_expr(te, decl.origin))
                        .collect::<SemaResult<Vec<_>>>()?;
                    Ok(Variant::new(v.name.clone(), fields))
                })
                .collect::<SemaResult<Vec<_>>>()
        })?;
        let ty = Ty::Sum {
            name: decl.name.clone(),
            variants,
        };
        let lowered = register_type(cx, decl, ty.clone(), type_params.clone());

        let info = TypeInfo::new(decl.name.clone(), ty).with_type_params(type_params);
        let reg = cx.registration(decl.exported, false, decl.origin);
        cx.constructors.register_sum_type(&info, &mut cx.functions, &reg);
        Ok(Lowered::TypeDecl(lowered))
    }
}

pub struct OpaqueDeclRule;

impl Rule for OpaqueDeclRule {
    fn name(&self) -> &'static str {
        "opaque_decl"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_type_decl().map(|d| &d.body), Some(TypeDeclBody::Opaque))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let decl = type_decl(node, self.name())?;
        let type_params = type_params_of(decl)?;
        let ty = Ty::Opaque(decl.name.clone());
        Ok(Lowered::TypeDecl(register_type(cx, decl, ty, type_params)))
    }
}

/// `type Id = i32`: the name stands for the target's shape.
pub struct AliasDeclRule;

impl Rule for AliasDeclRule {
    fn name(&self) -> &'static str {
        "alias_decl"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_type_decl().map(|d| &d.body), Some(TypeDeclBody::Alias(_)))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let decl = type_decl(node, self.name())?;
        let TypeDeclBody::Alias(target) = &decl.body else {
            return Err(unexpected_node(self.name()));
        };
        let type_params = type_params_of(decl)?;
        let ty = cx.with_type_params(&type_params, |cx| cx.resolve_type_expr(target, decl.origin))?;
        Ok(Lowered::TypeDecl(register_type(cx, decl, ty, type_params)))
    }
}

fn is_void(ty: &Ty) -> bool {
    matches!(ty, Ty::Unit) || ty.name() == "void"
}

/// Lowers a function: parameters bound in a fresh scope, body checked
/// against the declared return type, effect tags computed.
pub struct FunctionRule;

impl Rule for FunctionRule {
    fn name(&self) -> &'static str {
        "function"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node, Node::Function(_))
    }

    fn apply(&self, node: &Node<'_>, cx: &mut Lowering) -> SemaResult<Lowered> {
        let Node::Function(decl) = node else {
            return Err(unexpected_node(self.name()));
        };
        let info = cx.function_signature(decl)?;
        let params: Vec<ir::Param> = decl
            .params
            .iter()
            .zip(&info.param_types)
            .map(|(p, ty)| ir::Param {
                name: p.name.clone(),
                ty: ty.clone(),
            })
            .collect();

        let body = match &decl.body {
            None => None,
            Some(body) => Some(cx.with_type_params(&info.type_params, |cx| {
                cx.with_scope(|cx| {
                    for param in &params {
                        cx.env.insert(param.name.clone(), param.ty.clone());
                    }
                    cx.with_return_type(info.ret_type.clone(), |cx| {
                        let body = cx.lower_expr_expecting(body, Some(&info.ret_type))?;
                        if !is_void(&info.ret_type) && !is_void(&body.ty) {
                            cx.checker().ensure_compatible_type(
                                &body.ty,
                                &info.ret_type,
                                &format!("return value of '{}'", decl.name),
                                body.origin.or(decl.origin),
                            )?;
                        }
                        Ok(body)
                    })
                })
            })?),
        };

        let mut func = ir::Func {
            name: decl.name.clone(),
            type_params: info.type_params.clone(),
            params,
            ret_type: info.ret_type.clone(),
            body,
            exported: decl.exported,
            external: decl.external || decl.body.is_none(),
            effects: Vec::new(),
            origin: decl.origin,
        };
        if cx.config.analyze_effects {
            func.effects = function_effects(&func);
            cx.functions.replace_effects(&decl.name, &func.effects);
        }
        debug!(function = %func.name, effects = ?func.effects, "lowered function");
        Ok(Lowered::Function(func))
    }
}
