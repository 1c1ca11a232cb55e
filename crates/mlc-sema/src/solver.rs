//! Generic call resolution.
//!
//! Given a generic function's declared signature and the argument types at
//! one call site, derive the type-variable bindings and produce an
//! [`Instantiation`]: the substituted parameter types and return type. The
//! original `FunctionInfo` is never modified.

use rowan::TextRange;
use tracing::debug;

use crate::checker::{satisfies_constraint, TypeChecker};
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::ty::{FunctionInfo, Ty};
use crate::unify::{substitute_type, unify_types, TypeMap};

/// The outcome of solving one call.
#[derive(Clone, Debug, PartialEq)]
pub struct Instantiation {
    pub type_map: TypeMap,
    pub param_types: Vec<Ty>,
    pub ret_type: Ty,
}

#[derive(Clone, Copy)]
pub struct ConstraintSolver<'a> {
    checker: TypeChecker<'a>,
}

impl<'a> ConstraintSolver<'a> {
    pub fn new(checker: TypeChecker<'a>) -> Self {
        ConstraintSolver { checker }
    }

    pub fn solve(
        &self,
        info: &FunctionInfo,
        arg_types: &[Ty],
        name: &str,
        origin: Option<TextRange>,
    ) -> SemaResult<Instantiation> {
        self.solve_expecting(info, arg_types, name, None, origin)
    }

    /// Like [`solve`](Self::solve), additionally using the type the call's
    /// context expects to bind variables the arguments leave open.
    pub fn solve_expecting(
        &self,
        info: &FunctionInfo,
        arg_types: &[Ty],
        name: &str,
        expected_ret: Option<&Ty>,
        origin: Option<TextRange>,
    ) -> SemaResult<Instantiation> {
        if !info.is_generic() {
            self.checker
                .validate_function_call(info, arg_types, name, origin)?;
            return Ok(Instantiation {
                type_map: TypeMap::default(),
                param_types: info.param_types.clone(),
                ret_type: info.ret_type.clone(),
            });
        }

        if arg_types.len() != info.param_types.len() {
            return Err(
                CompileError::function_arity(name, info.param_types.len(), arg_types.len())
                    .with_origin(origin),
            );
        }

        let mut map = TypeMap::default();
        for (i, (param, arg)) in info.param_types.iter().zip(arg_types).enumerate() {
            if let Err(err) = unify_types(param, arg, &mut map) {
                // Report conflicting bindings on the diagnostics bus as well.
                let context = format!("argument {} of '{}'", i + 1, name);
                self.checker.mismatch(
                    &context,
                    &substitute_type(param, &map).to_string(),
                    &arg.to_string(),
                    origin,
                );
                return Err(err.with_origin(origin));
            }
        }

        if let Some(expected) = expected_ret {
            if !is_complete(info, &map) {
                let mut trial = map.clone();
                if unify_types(&info.ret_type, expected, &mut trial).is_ok() {
                    map = trial;
                }
            }
        }

        for param in &info.type_params {
            let (Some(constraint), Some(bound)) = (&param.constraint, map.get(&param.name)) else {
                continue;
            };
            if !satisfies_constraint(bound, constraint) {
                return Err(CompileError::new(
                    ErrorKind::InvalidConstraint,
                    format!(
                        "Type '{}' does not satisfy constraint '{}' for '{}'",
                        bound, constraint, param.name
                    ),
                )
                .with_origin(origin));
            }
        }

        let param_types: Vec<Ty> = info
            .param_types
            .iter()
            .map(|p| substitute_type(p, &map))
            .collect();
        for (i, (arg, param)) in arg_types.iter().zip(&param_types).enumerate() {
            let context = format!("argument {} of '{}'", i + 1, name);
            self.checker
                .ensure_compatible_type(arg, param, &context, origin)?;
        }
        let ret_type = substitute_type(&info.ret_type, &map);

        debug!(function = name, bindings = ?map, ret = %ret_type, "solved generic call");
        Ok(Instantiation {
            type_map: map,
            param_types,
            ret_type,
        })
    }
}

/// Every type parameter is bound to something other than a type variable.
fn is_complete(info: &FunctionInfo, map: &TypeMap) -> bool {
    info.type_params
        .iter()
        .all(|p| map.get(&p.name).is_some_and(|t| !t.is_type_var()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeParam;
    use mlc_common::events::EventBus;

    fn identity() -> FunctionInfo {
        FunctionInfo::new("identity", vec![Ty::var("T")], Ty::var("T"))
            .with_type_params(vec![TypeParam::new("T")])
    }

    #[test]
    fn identity_solves_to_argument_type() {
        let bus = EventBus::new();
        let solver = ConstraintSolver::new(TypeChecker::new(&bus));
        let inst = solver.solve(&identity(), &[Ty::i32()], "identity", None).unwrap();
        assert_eq!(inst.ret_type, Ty::i32());
        assert_eq!(inst.param_types, vec![Ty::i32()]);
        assert_eq!(inst.type_map.get("T"), Some(&Ty::i32()));
    }

    #[test]
    fn shared_variable_with_conflicting_arguments_is_a_type_error() {
        let bus = EventBus::new();
        let solver = ConstraintSolver::new(TypeChecker::new(&bus));
        let f = FunctionInfo::new("f", vec![Ty::var("T"), Ty::var("T")], Ty::void())
            .with_type_params(vec![TypeParam::new("T")]);
        let err = solver
            .solve(&f, &[Ty::i32(), Ty::string()], "f", None)
            .unwrap_err();
        assert!(err.is_type_error());
        assert_eq!(err.message, "Type variable T bound to both i32 and string");
    }

    #[test]
    fn arity_is_checked_before_binding() {
        let bus = EventBus::new();
        let solver = ConstraintSolver::new(TypeChecker::new(&bus));
        let err = solver.solve(&identity(), &[], "identity", None).unwrap_err();
        assert_eq!(err.message, "Function 'identity' expects 1 argument(s), got 0");
    }

    #[test]
    fn expected_return_type_fills_open_bindings() {
        let bus = EventBus::new();
        let solver = ConstraintSolver::new(TypeChecker::new(&bus));
        let empty = FunctionInfo::new("empty", vec![], Ty::array(Ty::var("T")))
            .with_type_params(vec![TypeParam::new("T")]);

        let open = solver.solve(&empty, &[], "empty", None).unwrap();
        assert_eq!(open.ret_type.to_string(), "T[]");

        let expected = Ty::array(Ty::string());
        let bound = solver
            .solve_expecting(&empty, &[], "empty", Some(&expected), None)
            .unwrap();
        assert_eq!(bound.ret_type.to_string(), "string[]");
    }

    #[test]
    fn constrained_parameter_rejects_non_members() {
        let bus = EventBus::new();
        let solver = ConstraintSolver::new(TypeChecker::new(&bus));
        let double = FunctionInfo::new("double", vec![Ty::var("T")], Ty::var("T"))
            .with_type_params(vec![TypeParam::constrained("T", "Numeric")]);

        assert!(solver.solve(&double, &[Ty::f32()], "double", None).is_ok());
        let err = solver
            .solve(&double, &[Ty::string()], "double", None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConstraint);
    }

    #[test]
    fn non_generic_functions_are_validated_literally() {
        let bus = EventBus::new();
        let solver = ConstraintSolver::new(TypeChecker::new(&bus));
        let len = FunctionInfo::new("len", vec![Ty::string()], Ty::i32());
        let inst = solver.solve(&len, &[Ty::string()], "len", None).unwrap();
        assert_eq!(inst.ret_type, Ty::i32());
        assert!(inst.type_map.is_empty());
        assert!(solver.solve(&len, &[Ty::i32()], "len", None).is_err());
    }
}
