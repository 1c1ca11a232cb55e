//! Compile errors raised by semantic analysis.
//!
//! Every failure surfaces as a single `CompileError` carrying a kind, a
//! human-readable message and, when known, the source range that caused it.
//! Errors are never recovered locally: they abort the enclosing pass.

use std::fmt;

use rowan::TextRange;

use crate::registry::RegistryError;

/// The category of a compile error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A name was not found in any lookup tier.
    UnknownIdentifier,
    /// A type name does not resolve to a registered type.
    UnknownType,
    /// A method or field is not defined for the receiver type.
    UnknownMember,
    /// A call or method invoked with the wrong number of arguments.
    ArityMismatch,
    /// The compatibility gate rejected a type.
    TypeMismatch,
    /// A type variable was bound to two incompatible types in one call.
    InconsistentBinding,
    /// Match arms leave sum-type variants uncovered.
    NonExhaustiveMatch,
    /// A match with no arms.
    EmptyMatch,
    /// Unknown constraint name, or a type argument violating a constraint.
    InvalidConstraint,
    /// An operator applied to operands of the wrong kind.
    InvalidOperand,
    /// No rule at a stage accepted the node.
    NoApplicableRule,
    /// Registry misuse (bad alias target, alias colliding with a name).
    Registry,
}

/// A fatal semantic error.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub origin: Option<TextRange>,
}

pub type SemaResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
            origin: None,
        }
    }

    /// Attach a source range unless one is already recorded.
    pub fn with_origin(mut self, origin: Option<TextRange>) -> Self {
        if self.origin.is_none() {
            self.origin = origin;
        }
        self
    }

    pub fn unknown_identifier(name: &str, visible: &[String]) -> Self {
        let scope = if visible.is_empty() {
            "<empty>".to_string()
        } else {
            visible.join(", ")
        };
        Self::new(
            ErrorKind::UnknownIdentifier,
            format!("Unknown identifier '{}' (in scope: {})", name, scope),
        )
    }

    pub fn unknown_type(name: &str) -> Self {
        Self::new(ErrorKind::UnknownType, format!("Unknown type '{}'", name))
    }

    pub fn function_arity(name: &str, expected: usize, found: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!(
                "Function '{}' expects {} argument(s), got {}",
                name, expected, found
            ),
        )
    }

    pub fn method_arity(name: &str, expected: usize, found: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!(
                "Method '{}' expects {} argument(s), got {}",
                name, expected, found
            ),
        )
    }

    pub fn type_mismatch(context: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("{} expected {}, got {}", context, expected, actual),
        )
    }

    pub fn inconsistent_binding(var: &str, first: &str, second: &str) -> Self {
        Self::new(
            ErrorKind::InconsistentBinding,
            format!("Type variable {} bound to both {} and {}", var, first, second),
        )
    }

    pub fn non_exhaustive(missing: &[String]) -> Self {
        Self::new(
            ErrorKind::NonExhaustiveMatch,
            format!(
                "Non-exhaustive match: missing variant(s) {}",
                missing.join(", ")
            ),
        )
    }

    /// Both rejected compatibility checks and conflicting generic bindings
    /// are type errors from the user's point of view.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::TypeMismatch | ErrorKind::InconsistentBinding
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

impl From<RegistryError> for CompileError {
    fn from(err: RegistryError) -> Self {
        CompileError::new(ErrorKind::Registry, err.to_string())
    }
}
