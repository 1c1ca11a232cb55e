//! Structural unification and substitution over `Ty`.
//!
//! There are two entry points with different failure modes:
//!
//! - [`unify_type`] is speculative. It returns `false` when the shapes do
//!   not line up, so callers can try several candidates (record literals,
//!   constructor specialization) without raising.
//! - [`unify_types`] is used while resolving a generic call, where a
//!   conflicting binding is always a genuine type error. It returns a
//!   `CompileError` instead.
//!
//! Bindings live in a [`TypeMap`] owned by one call site or one match
//! expression and are discarded afterwards.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use crate::checker::{is_numeric_type, normalized_type_name};
use crate::error::{CompileError, SemaResult};
use crate::ty::{Field, FunctionInfo, Ty, Variant};

/// Type-variable name to bound type.
pub type TypeMap = FxHashMap<String, Ty>;

/// Speculative unification of `pattern` against `actual`.
///
/// Unbound variables in `pattern` are bound in `map`; bound ones must be
/// equivalent to `actual`. Binding a variable to the type it already has is
/// a no-op.
pub fn unify_type(pattern: &Ty, actual: &Ty, map: &mut TypeMap) -> bool {
    match pattern {
        Ty::Var(var) => match map.get(&var.name) {
            Some(bound) => type_equivalent(bound, actual),
            None => {
                map.insert(var.name.clone(), actual.clone());
                true
            }
        },
        Ty::Generic(base, args) => match actual {
            Ty::Generic(actual_base, actual_args)
                if base.name() == actual_base.name() && args.len() == actual_args.len() =>
            {
                args.iter()
                    .zip(actual_args)
                    .all(|(p, a)| unify_type(p, a, map))
            }
            _ => false,
        },
        Ty::Array(elem) => match actual {
            Ty::Array(actual_elem) => unify_type(elem, actual_elem, map),
            _ => false,
        },
        _ => type_equivalent(pattern, actual),
    }
}

/// Loose structural equivalence used by speculative unification.
pub fn type_equivalent(a: &Ty, b: &Ty) -> bool {
    match (a, b) {
        (Ty::Var(x), Ty::Var(y)) => x.name == y.name,
        (Ty::Generic(base_a, args_a), Ty::Generic(base_b, args_b)) => {
            base_a.name() == base_b.name()
                && args_a.len() == args_b.len()
                && args_a.iter().zip(args_b).all(|(x, y)| type_equivalent(x, y))
        }
        (Ty::Array(x), Ty::Array(y)) => type_equivalent(x, y),
        _ => normalized_type_name(&a.name()) == normalized_type_name(&b.name()),
    }
}

/// Two concrete types that may share one binding: same name, or both numeric.
fn types_compatible(a: &Ty, b: &Ty) -> bool {
    normalized_type_name(&a.name()) == normalized_type_name(&b.name())
        || (is_numeric_type(a) && is_numeric_type(b))
}

/// Strict unification for generic call resolution.
///
/// A variable bound to another variable is rebound to the new type. A
/// concrete binding is kept when the new side is only a variable, refined
/// when the new side has the same name, and rejected when the two are
/// incompatible.
pub fn unify_types(pattern: &Ty, actual: &Ty, map: &mut TypeMap) -> SemaResult<()> {
    match (pattern, actual) {
        (Ty::Var(var), _) => {
            let Some(existing) = map.get(&var.name) else {
                map.insert(var.name.clone(), actual.clone());
                return Ok(());
            };
            if existing.is_type_var() {
                map.insert(var.name.clone(), actual.clone());
            } else if actual.is_type_var() {
                // keep the concrete binding
            } else if existing.name() == actual.name() {
                if actual.concreteness() >= existing.concreteness() {
                    map.insert(var.name.clone(), actual.clone());
                }
            } else if !types_compatible(existing, actual) {
                return Err(CompileError::inconsistent_binding(
                    &var.name,
                    &existing.to_string(),
                    &actual.to_string(),
                ));
            }
            Ok(())
        }
        (Ty::Generic(base, args), Ty::Generic(actual_base, actual_args)) => {
            unify_types(base, actual_base, map)?;
            for (p, a) in args.iter().zip(actual_args) {
                unify_types(p, a, map)?;
            }
            Ok(())
        }
        (Ty::Array(elem), Ty::Array(actual_elem))
        | (Ty::Ref(elem), Ty::Ref(actual_elem))
        | (Ty::MutRef(elem), Ty::MutRef(actual_elem)) => unify_types(elem, actual_elem, map),
        (Ty::Function(params, ret), Ty::Function(actual_params, actual_ret)) => {
            for (p, a) in params.iter().zip(actual_params) {
                unify_types(p, a, map)?;
            }
            unify_types(ret, actual_ret, map)
        }
        (Ty::Map(k, v), Ty::Map(actual_k, actual_v)) => {
            unify_types(k, actual_k, map)?;
            unify_types(v, actual_v, map)
        }
        _ => Ok(()),
    }
}

/// Replace bound type variables throughout `ty`.
///
/// Returns `Cow::Borrowed(ty)` when nothing was replaced.
pub fn substitute<'a>(ty: &'a Ty, map: &TypeMap) -> Cow<'a, Ty> {
    match ty {
        Ty::Var(var) => match map.get(&var.name) {
            Some(bound) if bound != ty => Cow::Owned(bound.clone()),
            _ => Cow::Borrowed(ty),
        },
        Ty::Array(elem) => match substitute(elem, map) {
            Cow::Borrowed(_) => Cow::Borrowed(ty),
            Cow::Owned(elem) => Cow::Owned(Ty::array(elem)),
        },
        Ty::Generic(base, args) => match substitute_all(args, map) {
            Some(args) => Cow::Owned(Ty::Generic(base.clone(), args)),
            None => Cow::Borrowed(ty),
        },
        Ty::Function(params, ret) => {
            let new_params = substitute_all(params, map);
            let new_ret = substitute(ret, map);
            if new_params.is_none() && matches!(new_ret, Cow::Borrowed(_)) {
                return Cow::Borrowed(ty);
            }
            Cow::Owned(Ty::func(
                new_params.unwrap_or_else(|| params.clone()),
                new_ret.into_owned(),
            ))
        }
        Ty::Record { name, fields } => {
            let tys: Vec<Ty> = fields.iter().map(|f| f.ty.clone()).collect();
            match substitute_all(&tys, map) {
                Some(new) => Cow::Owned(Ty::Record {
                    name: name.clone(),
                    fields: fields
                        .iter()
                        .zip(new)
                        .map(|(f, ty)| Field::new(f.name.clone(), ty))
                        .collect(),
                }),
                None => Cow::Borrowed(ty),
            }
        }
        Ty::Sum { name, variants } => {
            let mut changed = false;
            let new_variants: Vec<Variant> = variants
                .iter()
                .map(|v| match substitute_all(&v.fields, map) {
                    Some(fields) => {
                        changed = true;
                        Variant::new(v.name.clone(), fields)
                    }
                    None => v.clone(),
                })
                .collect();
            if changed {
                Cow::Owned(Ty::Sum {
                    name: name.clone(),
                    variants: new_variants,
                })
            } else {
                Cow::Borrowed(ty)
            }
        }
        _ => Cow::Borrowed(ty),
    }
}

/// `None` when no element changed.
fn substitute_all(tys: &[Ty], map: &TypeMap) -> Option<Vec<Ty>> {
    let substituted: Vec<Cow<'_, Ty>> = tys.iter().map(|t| substitute(t, map)).collect();
    if substituted.iter().all(|c| matches!(c, Cow::Borrowed(_))) {
        return None;
    }
    Some(substituted.into_iter().map(Cow::into_owned).collect())
}

/// Owned convenience wrapper around [`substitute`].
pub fn substitute_type(ty: &Ty, map: &TypeMap) -> Ty {
    substitute(ty, map).into_owned()
}

/// Bindings that specialize a constructor's return type to `scrutinee`.
///
/// `Some: (T) -> Option<T>` against `Option<i32>` yields `{T: i32}`. A
/// scrutinee that does not fit yields an empty map.
pub fn generic_substitutions(info: &FunctionInfo, scrutinee: &Ty) -> TypeMap {
    let mut map = TypeMap::default();
    if !unify_type(&info.ret_type, scrutinee, &mut map) {
        map.clear();
    }
    map
}

/// A constructor signature specialized to a scrutinee type.
pub fn specialize_constructor(info: &FunctionInfo, scrutinee: &Ty) -> FunctionInfo {
    let map = generic_substitutions(info, scrutinee);
    if map.is_empty() {
        return info.clone();
    }
    FunctionInfo {
        name: info.name.clone(),
        param_types: info
            .param_types
            .iter()
            .map(|p| substitute_type(p, &map))
            .collect(),
        ret_type: substitute_type(&info.ret_type, &map),
        type_params: info.type_params.clone(),
    }
}
