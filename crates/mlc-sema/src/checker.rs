//! Validation gates shared by every semantic service.
//!
//! The checker holds no state of its own. A rejected compatibility check is
//! reported twice: as a `type_mismatch` event on the diagnostics bus (so
//! tooling can observe every mismatch) and as the returned `CompileError`
//! (which aborts the pass).

use mlc_common::events::EventBus;
use rowan::TextRange;
use serde_json::json;

use crate::builtins;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::ty::{FunctionInfo, Ty, TypeParam};

/// Canonical spelling of a type name (`str` is the legacy `string`).
pub fn normalized_type_name(name: &str) -> String {
    match name {
        "str" => "string".to_string(),
        other => other.to_string(),
    }
}

/// Human-readable form of a possibly unknown type.
pub fn describe_type(ty: Option<&Ty>) -> String {
    match ty {
        Some(ty) => ty.to_string(),
        None => "unknown".to_string(),
    }
}

/// Names treated as still-generic placeholders: empty names and names
/// starting with an uppercase letter.
pub fn is_generic_type_name(name: &str) -> bool {
    name.chars().next().map_or(true, char::is_uppercase)
}

/// Numeric primitives, and type variables (which may be bound to one).
pub fn is_numeric_type(ty: &Ty) -> bool {
    ty.is_type_var() || builtins::is_numeric_name(&normalized_type_name(&ty.name()))
}

pub fn is_float_type(ty: &Ty) -> bool {
    builtins::is_float_name(&ty.name())
}

fn origin_json(origin: Option<TextRange>) -> serde_json::Value {
    match origin {
        Some(r) => json!({ "start": u32::from(r.start()), "end": u32::from(r.end()) }),
        None => serde_json::Value::Null,
    }
}

/// Stateless validation gates bound to a diagnostics bus.
#[derive(Clone, Copy)]
pub struct TypeChecker<'a> {
    events: &'a EventBus,
}

impl<'a> TypeChecker<'a> {
    pub fn new(events: &'a EventBus) -> Self {
        TypeChecker { events }
    }

    /// Require `actual` to be usable where `expected` is wanted.
    pub fn ensure_compatible_type(
        &self,
        actual: &Ty,
        expected: &Ty,
        context: &str,
        origin: Option<TextRange>,
    ) -> SemaResult<()> {
        let expected_name = normalized_type_name(&expected.name());
        if expected_name.is_empty() || expected.is_auto() {
            return Ok(());
        }
        if expected.is_type_var() || is_generic_type_name(&expected_name) {
            return Ok(());
        }
        if actual.is_auto() || normalized_type_name(&actual.name()) == expected_name {
            return Ok(());
        }
        Err(self.mismatch(context, &expected.to_string(), &actual.to_string(), origin))
    }

    pub fn ensure_boolean_type(
        &self,
        actual: &Ty,
        context: &str,
        origin: Option<TextRange>,
    ) -> SemaResult<()> {
        let name = normalized_type_name(&actual.name());
        if actual.is_type_var() || actual.is_auto() || is_generic_type_name(&name) || name == "bool" {
            return Ok(());
        }
        Err(self.mismatch(context, "bool", &actual.to_string(), origin))
    }

    pub fn ensure_numeric_type(
        &self,
        actual: &Ty,
        context: &str,
        origin: Option<TextRange>,
    ) -> SemaResult<()> {
        let name = normalized_type_name(&actual.name());
        if actual.is_auto() || is_generic_type_name(&name) || is_numeric_type(actual) {
            return Ok(());
        }
        Err(self.mismatch(context, "numeric type", &actual.to_string(), origin))
    }

    /// Publish a `type_mismatch` event and build the matching error.
    pub fn mismatch(
        &self,
        context: &str,
        expected: &str,
        actual: &str,
        origin: Option<TextRange>,
    ) -> CompileError {
        self.events.error(
            "type_mismatch",
            json!({
                "context": context,
                "actual": actual,
                "expected": expected,
                "origin": origin_json(origin),
            }),
        );
        CompileError::type_mismatch(context, expected, actual).with_origin(origin)
    }

    /// Arity and per-argument compatibility for a non-generic call.
    pub fn validate_function_call(
        &self,
        info: &FunctionInfo,
        arg_types: &[Ty],
        name: &str,
        origin: Option<TextRange>,
    ) -> SemaResult<()> {
        if info.param_types.len() != arg_types.len() {
            return Err(
                CompileError::function_arity(name, info.param_types.len(), arg_types.len())
                    .with_origin(origin),
            );
        }
        for (i, (arg, param)) in arg_types.iter().zip(&info.param_types).enumerate() {
            let context = format!("argument {} of '{}'", i + 1, name);
            self.ensure_compatible_type(arg, param, &context, origin)?;
        }
        Ok(())
    }

    pub fn ensure_argument_count(
        &self,
        member: &str,
        args: &[Ty],
        expected: usize,
        origin: Option<TextRange>,
    ) -> SemaResult<()> {
        if args.len() != expected {
            return Err(CompileError::method_arity(member, expected, args.len()).with_origin(origin));
        }
        Ok(())
    }
}

// ── Constraints ────────────────────────────────────────────────────────

pub fn validate_constraint_name(constraint: &str) -> SemaResult<()> {
    if builtins::constraint_members(constraint).is_none() {
        return Err(CompileError::new(
            ErrorKind::InvalidConstraint,
            format!("Unknown constraint '{}'", constraint),
        ));
    }
    Ok(())
}

/// Trim constraint names, drop empty ones and reject unknown ones.
pub fn normalize_type_params(params: &[TypeParam]) -> SemaResult<Vec<TypeParam>> {
    params
        .iter()
        .map(|p| {
            let constraint = p
                .constraint
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if let Some(c) = &constraint {
                validate_constraint_name(c)?;
            }
            Ok(TypeParam {
                name: p.name.clone(),
                constraint,
            })
        })
        .collect()
}

/// Whether `ty` satisfies `constraint`. Unresolved types are given the
/// benefit of the doubt.
pub fn satisfies_constraint(ty: &Ty, constraint: &str) -> bool {
    if ty.has_type_vars() || ty.is_auto() {
        return true;
    }
    let name = normalized_type_name(&ty.name());
    builtins::constraint_members(constraint).is_some_and(|members| members.contains(&name.as_str()))
}

/// Check the concrete arguments of `type_name<args>` against the
/// declaration's constrained type parameters.
pub fn validate_type_constraints(
    type_name: &str,
    type_params: &[TypeParam],
    type_args: &[Ty],
) -> SemaResult<()> {
    for (param, arg) in type_params.iter().zip(type_args) {
        let Some(constraint) = &param.constraint else {
            continue;
        };
        validate_constraint_name(constraint)?;
        if !satisfies_constraint(arg, constraint) {
            return Err(CompileError::new(
                ErrorKind::InvalidConstraint,
                format!(
                    "Type '{}' does not satisfy constraint '{}' for '{}' in '{}'",
                    arg, constraint, param.name, type_name
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn compatible_when_names_match_after_normalization() {
        let bus = EventBus::new();
        let checker = TypeChecker::new(&bus);
        assert!(checker
            .ensure_compatible_type(&Ty::prim("str"), &Ty::string(), "x", None)
            .is_ok());
    }

    #[test]
    fn escape_hatches_skip_the_check() {
        let bus = EventBus::new();
        let checker = TypeChecker::new(&bus);
        let i32 = Ty::i32();
        assert!(checker.ensure_compatible_type(&i32, &Ty::auto(), "x", None).is_ok());
        assert!(checker.ensure_compatible_type(&i32, &Ty::var("T"), "x", None).is_ok());
        assert!(checker.ensure_compatible_type(&i32, &Ty::prim("Point"), "x", None).is_ok());
        assert!(checker.ensure_compatible_type(&Ty::auto(), &Ty::string(), "x", None).is_ok());
    }

    #[test]
    fn mismatch_publishes_event_and_errors() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe("type_mismatch", move |e| sink.borrow_mut().push(e.payload.clone()));

        let checker = TypeChecker::new(&bus);
        let err = checker
            .ensure_compatible_type(&Ty::string(), &Ty::i32(), "argument 2 of 'foo'", None)
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "argument 2 of 'foo' expected i32, got string");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["context"], "argument 2 of 'foo'");
        assert_eq!(seen[0]["actual"], "string");
        assert_eq!(seen[0]["expected"], "i32");
    }

    #[test]
    fn numeric_and_boolean_gates() {
        let bus = EventBus::new();
        let checker = TypeChecker::new(&bus);
        assert!(checker.ensure_numeric_type(&Ty::prim("u8"), "lhs", None).is_ok());
        assert!(checker.ensure_numeric_type(&Ty::var("T"), "lhs", None).is_ok());
        assert!(checker.ensure_numeric_type(&Ty::string(), "lhs", None).is_err());
        assert!(checker.ensure_boolean_type(&Ty::bool(), "cond", None).is_ok());
        assert!(checker.ensure_boolean_type(&Ty::i32(), "cond", None).is_err());
    }

    #[test]
    fn function_call_arity() {
        let bus = EventBus::new();
        let checker = TypeChecker::new(&bus);
        let info = FunctionInfo::new("add", vec![Ty::i32(), Ty::i32()], Ty::i32());
        let err = checker
            .validate_function_call(&info, &[Ty::i32()], "add", None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArityMismatch);
        assert_eq!(err.message, "Function 'add' expects 2 argument(s), got 1");
    }

    #[test]
    fn constraints() {
        assert!(validate_constraint_name("Numeric").is_ok());
        assert_eq!(
            validate_constraint_name("Sortable").unwrap_err().message,
            "Unknown constraint 'Sortable'"
        );
        let params = vec![TypeParam::constrained("T", "Numeric")];
        assert!(validate_type_constraints("Vec2", &params, &[Ty::f32()]).is_ok());
        assert!(validate_type_constraints("Vec2", &params, &[Ty::var("U")]).is_ok());
        let err = validate_type_constraints("Vec2", &params, &[Ty::string()]).unwrap_err();
        assert_eq!(
            err.message,
            "Type 'string' does not satisfy constraint 'Numeric' for 'T' in 'Vec2'"
        );

        let normalized = normalize_type_params(&[TypeParam::constrained("T", " ")]).unwrap();
        assert_eq!(normalized[0].constraint, None);
    }
}
