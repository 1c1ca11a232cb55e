//! Expression type inference.
//!
//! Computes the type of an expression from the types of its (already
//! lowered) parts, the variable scopes and the registries. The service only
//! borrows that state, so it is cheap to construct and safe to call in any
//! order during a pass.

use mlc_common::events::EventBus;
use mlc_common::module_path::member_key;
use rowan::TextRange;

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::builtins::{self, ARRAY_METHODS, STRING_METHODS};
use crate::checker::{is_float_type, is_numeric_type, normalized_type_name, TypeChecker};
use crate::env::TypeEnv;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::registry::{FunctionRegistry, TypeRegistry};
use crate::solver::ConstraintSolver;
use crate::ty::{Field, FunctionInfo, Ty, TypeInfo};
use crate::unify::{substitute_type, unify_type, TypeMap};

/// What a resolved call invokes.
#[derive(Clone, Debug, PartialEq)]
pub enum CallTarget {
    /// A registered function, by canonical name.
    Function(String),
    /// An I/O or formatting built-in.
    Builtin(String),
    /// A function-typed local.
    Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCall {
    pub target: CallTarget,
    pub ret_type: Ty,
}

pub struct TypeInference<'a> {
    env: &'a TypeEnv,
    types: &'a TypeRegistry,
    functions: &'a FunctionRegistry,
    checker: TypeChecker<'a>,
}

fn is_string(ty: &Ty) -> bool {
    normalized_type_name(&ty.name()) == "string"
}

fn unknown_member(message: String) -> CompileError {
    CompileError::new(ErrorKind::UnknownMember, message)
}

fn invalid_operand(message: String) -> CompileError {
    CompileError::new(ErrorKind::InvalidOperand, message)
}

pub fn literal_type(lit: &Literal) -> Ty {
    match lit {
        Literal::Int(_) => Ty::i32(),
        Literal::Float(_) => Ty::f32(),
        Literal::Str(_) => Ty::string(),
        Literal::Bool(_) => Ty::bool(),
        Literal::Unit => Ty::Unit,
    }
}

impl<'a> TypeInference<'a> {
    pub fn new(
        env: &'a TypeEnv,
        types: &'a TypeRegistry,
        functions: &'a FunctionRegistry,
        events: &'a EventBus,
    ) -> Self {
        TypeInference {
            env,
            types,
            functions,
            checker: TypeChecker::new(events),
        }
    }

    pub fn checker(&self) -> TypeChecker<'a> {
        self.checker
    }

    pub fn solver(&self) -> ConstraintSolver<'a> {
        ConstraintSolver::new(self.checker)
    }

    // ── Identifiers ────────────────────────────────────────────────────

    /// Local scopes, then functions, then I/O built-ins, then `true`/`false`.
    pub fn variable_type(&self, name: &str, origin: Option<TextRange>) -> SemaResult<Ty> {
        if let Some(ty) = self.env.lookup(name) {
            return Ok(ty.clone());
        }
        if let Some(info) = self.functions.fetch(name) {
            return Ok(info.fn_type());
        }
        if let Some(ty) = builtins::io_return_type(name) {
            return Ok(ty);
        }
        if name == "true" || name == "false" {
            return Ok(Ty::bool());
        }
        Err(CompileError::unknown_identifier(name, &self.env.visible_names()).with_origin(origin))
    }

    // ── Calls ──────────────────────────────────────────────────────────

    /// Type of `name(args)`. Generic functions go through the constraint
    /// solver; `expected` is the type the surrounding context wants, if any.
    pub fn call_type(
        &self,
        name: &str,
        arg_types: &[Ty],
        expected: Option<&Ty>,
        origin: Option<TextRange>,
    ) -> SemaResult<ResolvedCall> {
        if let Some(local) = self.env.lookup(name) {
            let ret_type = self.function_value_call(local, arg_types, origin)?;
            return Ok(ResolvedCall {
                target: CallTarget::Value,
                ret_type,
            });
        }
        if let Some(ret_type) = builtins::io_return_type(name) {
            return Ok(ResolvedCall {
                target: CallTarget::Builtin(name.to_string()),
                ret_type,
            });
        }
        let Some(entry) = self.functions.fetch_entry(name) else {
            return Err(
                CompileError::unknown_identifier(name, &self.env.visible_names()).with_origin(origin),
            );
        };
        let inst = self
            .solver()
            .solve_expecting(&entry.value, arg_types, name, expected, origin)?;
        Ok(ResolvedCall {
            target: CallTarget::Function(entry.name.clone()),
            ret_type: inst.ret_type,
        })
    }

    /// Type of `container.member(args)` when `container` names a module.
    /// Returns `None` when no such module member is registered.
    pub fn module_call_type(
        &self,
        container: &str,
        member: &str,
        arg_types: &[Ty],
        expected: Option<&Ty>,
        origin: Option<TextRange>,
    ) -> SemaResult<Option<ResolvedCall>> {
        let Some(entry) = self.functions.fetch_member(container, member) else {
            return Ok(None);
        };
        let display = member_key(container, member);
        let inst = self
            .solver()
            .solve_expecting(&entry.value, arg_types, &display, expected, origin)?;
        Ok(Some(ResolvedCall {
            target: CallTarget::Function(entry.name.clone()),
            ret_type: inst.ret_type,
        }))
    }

    pub fn module_member_info(&self, container: &str, member: &str) -> Option<&'a FunctionInfo> {
        self.functions.fetch_member(container, member).map(|e| &e.value)
    }

    /// The function type of `container.member` referenced as a value.
    pub fn module_member_type(&self, container: &str, member: &str) -> Option<(String, Ty)> {
        self.functions
            .fetch_member(container, member)
            .map(|e| (e.name.clone(), e.value.fn_type()))
    }

    /// Call through a function-typed value such as a lambda.
    pub fn function_value_call(
        &self,
        callee: &Ty,
        arg_types: &[Ty],
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        match callee {
            Ty::Function(params, ret) => {
                if params.len() != arg_types.len() {
                    return Err(CompileError::new(
                        ErrorKind::ArityMismatch,
                        format!(
                            "Lambda expects {} argument(s), got {}",
                            params.len(),
                            arg_types.len()
                        ),
                    )
                    .with_origin(origin));
                }
                for (i, (arg, param)) in arg_types.iter().zip(params).enumerate() {
                    self.checker.ensure_compatible_type(
                        arg,
                        param,
                        &format!("lambda argument {}", i + 1),
                        origin,
                    )?;
                }
                Ok((**ret).clone())
            }
            ty if ty.is_auto() => Ok(Ty::auto()),
            other => {
                Err(invalid_operand(format!("Cannot call a value of type {}", other)).with_origin(origin))
            }
        }
    }

    /// Built-in methods on arrays, strings and numbers.
    pub fn method_call_type(
        &self,
        receiver: &Ty,
        method: &str,
        arg_types: &[Ty],
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        if receiver.is_auto() {
            return Ok(Ty::auto());
        }
        if let Ty::Array(elem) = receiver {
            return self.array_method_type(receiver, elem, method, arg_types, origin);
        }
        if is_string(receiver) {
            return self.string_method_type(method, arg_types, origin);
        }
        if is_numeric_type(receiver) && !receiver.is_type_var() && method == "sqrt" {
            self.checker
                .ensure_argument_count(method, arg_types, 0, origin)?;
            return Ok(Ty::f32());
        }
        Err(unknown_member(format!("Unknown member '{}' for type {}", method, receiver)).with_origin(origin))
    }

    fn array_method_type(
        &self,
        array: &Ty,
        elem: &Ty,
        method: &str,
        args: &[Ty],
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        let checker = self.checker;
        match method {
            "length" | "size" => {
                checker.ensure_argument_count(method, args, 0, origin)?;
                Ok(Ty::i32())
            }
            "is_empty" => {
                checker.ensure_argument_count(method, args, 0, origin)?;
                Ok(Ty::bool())
            }
            "map" => {
                checker.ensure_argument_count(method, args, 1, origin)?;
                let ret = self.function_value_call(&args[0], std::slice::from_ref(elem), origin)?;
                Ok(Ty::array(ret))
            }
            "filter" => {
                checker.ensure_argument_count(method, args, 1, origin)?;
                let ret = self.function_value_call(&args[0], std::slice::from_ref(elem), origin)?;
                checker.ensure_boolean_type(&ret, "filter predicate", origin)?;
                Ok(array.clone())
            }
            "fold" => {
                checker.ensure_argument_count(method, args, 2, origin)?;
                let init = &args[0];
                let ret = self.function_value_call(&args[1], &[init.clone(), elem.clone()], origin)?;
                checker.ensure_compatible_type(&ret, init, "fold accumulator", origin)?;
                Ok(init.clone())
            }
            _ => Err(unknown_member(format!(
                "Unknown array method '{}'. Supported methods: {}",
                method,
                ARRAY_METHODS.join(", ")
            ))
            .with_origin(origin)),
        }
    }

    fn string_method_type(
        &self,
        method: &str,
        args: &[Ty],
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        let checker = self.checker;
        match method {
            "split" => {
                checker.ensure_argument_count(method, args, 1, origin)?;
                checker.ensure_compatible_type(&args[0], &Ty::string(), "argument 1 of 'split'", origin)?;
                Ok(Ty::array(Ty::string()))
            }
            "trim" | "trim_start" | "trim_end" | "upper" | "lower" => {
                checker.ensure_argument_count(method, args, 0, origin)?;
                Ok(Ty::string())
            }
            "is_empty" => {
                checker.ensure_argument_count(method, args, 0, origin)?;
                Ok(Ty::bool())
            }
            "length" => {
                checker.ensure_argument_count(method, args, 0, origin)?;
                Ok(Ty::i32())
            }
            _ => Err(unknown_member(format!(
                "Unknown string method '{}'. Supported methods: {}",
                method,
                STRING_METHODS.join(", ")
            ))
            .with_origin(origin)),
        }
    }

    // ── Operators ──────────────────────────────────────────────────────

    pub fn binary_type(
        &self,
        op: BinaryOp,
        lhs: &Ty,
        rhs: &Ty,
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        let checker = self.checker;
        let left = format!("left operand of '{}'", op);
        let right = format!("right operand of '{}'", op);
        match op {
            BinaryOp::Add => {
                if lhs.is_auto() || rhs.is_auto() {
                    return Ok(if lhs.is_auto() { rhs.clone() } else { lhs.clone() });
                }
                if is_string(lhs) && is_string(rhs) {
                    return Ok(Ty::string());
                }
                if is_numeric_type(lhs) && is_numeric_type(rhs) {
                    return self.combine_numeric(lhs, rhs, origin);
                }
                Err(invalid_operand(format!("Cannot add {} and {}", lhs, rhs)).with_origin(origin))
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod => {
                checker.ensure_numeric_type(lhs, &left, origin)?;
                checker.ensure_numeric_type(rhs, &right, origin)?;
                self.combine_numeric(lhs, rhs, origin)
            }
            BinaryOp::Div => {
                checker.ensure_numeric_type(lhs, &left, origin)?;
                checker.ensure_numeric_type(rhs, &right, origin)?;
                if is_float_type(lhs) {
                    Ok(lhs.clone())
                } else if is_float_type(rhs) {
                    Ok(rhs.clone())
                } else if lhs.name() == rhs.name() && !lhs.is_auto() {
                    Ok(lhs.clone())
                } else {
                    Ok(Ty::i32())
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                checker.ensure_compatible_type(rhs, lhs, &right, origin)?;
                Ok(Ty::bool())
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                checker.ensure_numeric_type(lhs, &left, origin)?;
                checker.ensure_numeric_type(rhs, &right, origin)?;
                Ok(Ty::bool())
            }
            BinaryOp::And | BinaryOp::Or => {
                checker.ensure_boolean_type(lhs, &left, origin)?;
                checker.ensure_boolean_type(rhs, &right, origin)?;
                Ok(Ty::bool())
            }
        }
    }

    /// Result type of arithmetic on two numeric operands.
    pub fn combine_numeric(&self, lhs: &Ty, rhs: &Ty, origin: Option<TextRange>) -> SemaResult<Ty> {
        match (lhs, rhs) {
            (Ty::Var(a), Ty::Var(b)) => Ok(if a.name == b.name { lhs.clone() } else { Ty::i32() }),
            (Ty::Var(_), _) => Ok(rhs.clone()),
            (_, Ty::Var(_)) => Ok(lhs.clone()),
            _ if lhs.is_auto() => Ok(rhs.clone()),
            _ if rhs.is_auto() => Ok(lhs.clone()),
            _ if normalized_type_name(&lhs.name()) == normalized_type_name(&rhs.name()) => Ok(lhs.clone()),
            _ if is_float_type(lhs) || is_float_type(rhs) => {
                if lhs.name() == "f64" || rhs.name() == "f64" {
                    Ok(Ty::prim("f64"))
                } else {
                    Ok(Ty::f32())
                }
            }
            _ => Err(invalid_operand(format!(
                "Numeric operands must have matching types, got {} and {}",
                lhs, rhs
            ))
            .with_origin(origin)),
        }
    }

    pub fn unary_type(&self, op: UnaryOp, operand: &Ty, origin: Option<TextRange>) -> SemaResult<Ty> {
        let context = format!("operand of '{}'", op);
        match op {
            UnaryOp::Not => {
                self.checker.ensure_boolean_type(operand, &context, origin)?;
                Ok(Ty::bool())
            }
            UnaryOp::Neg | UnaryOp::Plus => {
                self.checker.ensure_numeric_type(operand, &context, origin)?;
                Ok(operand.clone())
            }
        }
    }

    // ── Members, indexing, records ─────────────────────────────────────

    /// Type of a non-call member access `object.member`.
    pub fn member_type(&self, object: &Ty, member: &str, origin: Option<TextRange>) -> SemaResult<Ty> {
        if object.is_auto() {
            return Ok(Ty::auto());
        }
        if let Some(ty) = self.generic_member_type(object, member) {
            return Ok(ty);
        }
        if let Some(ty) = self.types.resolve_member(&object.name(), member) {
            return Ok(ty.clone());
        }
        if let Some(fields) = object.record_fields() {
            return fields
                .iter()
                .find(|f| f.name == member)
                .map(|f| f.ty.clone())
                .ok_or_else(|| {
                    unknown_member(format!("Unknown field '{}' for type {}", member, object))
                        .with_origin(origin)
                });
        }
        match (object, member) {
            (Ty::Array(_), "length" | "size") => return Ok(Ty::i32()),
            (Ty::Array(_), "is_empty") => return Ok(Ty::bool()),
            _ => {}
        }
        if is_string(object) && member == "length" {
            return Ok(Ty::i32());
        }
        if is_numeric_type(object) && !object.is_type_var() && member == "sqrt" {
            return Ok(Ty::f32());
        }
        Err(unknown_member(format!("Unknown member '{}' for type {}", member, object)).with_origin(origin))
    }

    /// `Pair<i32, string>.first`: look the field up on the declaration and
    /// substitute the declaration's type parameters with the arguments.
    fn generic_member_type(&self, object: &Ty, member: &str) -> Option<Ty> {
        let Ty::Generic(base, args) = object else {
            return None;
        };
        let info = self.types.lookup_info(&base.name())?;
        let field = info
            .ty
            .record_fields()
            .or_else(|| base.record_fields())?
            .iter()
            .find(|f| f.name == member)?;
        let map: TypeMap = info
            .type_params
            .iter()
            .zip(args)
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect();
        Some(substitute_type(&field.ty, &map))
    }

    pub fn index_type(&self, object: &Ty, index: &Ty, origin: Option<TextRange>) -> SemaResult<Ty> {
        match object {
            Ty::Array(elem) => {
                self.checker.ensure_numeric_type(index, "array index", origin)?;
                Ok((**elem).clone())
            }
            Ty::Map(key, value) => {
                self.checker.ensure_compatible_type(index, key, "map key", origin)?;
                Ok((**value).clone())
            }
            ty if ty.is_auto() => Ok(Ty::auto()),
            ty if is_string(ty) => {
                self.checker.ensure_numeric_type(index, "string index", origin)?;
                Ok(Ty::string())
            }
            other => Err(invalid_operand(format!("Cannot index into a value of type {}", other))
                .with_origin(origin)),
        }
    }

    /// Type of a record literal. A named literal is checked against its
    /// declaration; an unnamed one picks the best-fitting registered record.
    pub fn record_literal_type(
        &self,
        name: Option<&str>,
        fields: &[(String, Ty)],
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        match name {
            Some(name) => self.named_record_type(name, fields, origin),
            None => Ok(self.best_record_candidate(fields).unwrap_or_else(|| Ty::Record {
                name: "record".to_string(),
                fields: fields
                    .iter()
                    .map(|(n, t)| Field::new(n.clone(), t.clone()))
                    .collect(),
            })),
        }
    }

    fn named_record_type(
        &self,
        name: &str,
        fields: &[(String, Ty)],
        origin: Option<TextRange>,
    ) -> SemaResult<Ty> {
        let info = self
            .types
            .lookup_info(name)
            .ok_or_else(|| CompileError::unknown_type(name).with_origin(origin))?;
        let Some(declared) = info.ty.record_fields() else {
            return Err(invalid_operand(format!("Type {} is not a record", name)).with_origin(origin));
        };

        if let Some((extra, _)) = fields.iter().find(|(n, _)| !declared.iter().any(|f| &f.name == n)) {
            return Err(
                unknown_member(format!("Unknown field '{}' for type {}", extra, name)).with_origin(origin),
            );
        }
        let mut map = TypeMap::default();
        for decl in declared {
            let Some((_, actual)) = fields.iter().find(|(n, _)| *n == decl.name) else {
                return Err(unknown_member(format!("Missing field '{}' for type {}", decl.name, name))
                    .with_origin(origin));
            };
            if !unify_type(&decl.ty, actual, &mut map) {
                let expected = substitute_type(&decl.ty, &map);
                let context = format!("field '{}' of '{}'", decl.name, name);
                self.checker
                    .ensure_compatible_type(actual, &expected, &context, origin)?;
            }
        }
        Ok(applied_with(info, &map))
    }

    /// Try every registered record whose field names match, on a scratch
    /// binding map each, and keep the most concrete fit.
    fn best_record_candidate(&self, fields: &[(String, Ty)]) -> Option<Ty> {
        let mut best: Option<(usize, Ty)> = None;
        for entry in self.types.iter() {
            let info = &entry.value;
            let Some(declared) = info.ty.record_fields() else {
                continue;
            };
            if declared.len() != fields.len() {
                continue;
            }
            let mut map = TypeMap::default();
            let fits = declared.iter().all(|decl| {
                fields
                    .iter()
                    .find(|(n, _)| *n == decl.name)
                    .is_some_and(|(_, actual)| unify_type(&decl.ty, actual, &mut map))
            });
            if !fits {
                continue;
            }
            let candidate = applied_with(info, &map);
            let score = candidate.concreteness();
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, ty)| ty)
    }
}

/// The declaration applied to its type parameters as bound in `map`.
fn applied_with(info: &TypeInfo, map: &TypeMap) -> Ty {
    substitute_type(&info.applied(), map)
}
