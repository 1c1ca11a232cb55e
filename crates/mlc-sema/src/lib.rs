//! MLC semantic analysis: type checking, inference and lowering to typed IR.
//!
//! This crate takes the declaration tree produced by the parser and turns
//! it into a typed IR, rejecting ill-typed programs with a single
//! `CompileError`. It covers:
//!
//! - A structural type model with named primitives, records, sum types,
//!   generics, function types and type variables
//! - Type and function registries with module/namespace metadata and
//!   qualified aliases
//! - Generic call resolution through unification and a constraint solver
//! - Sum-type constructors and exhaustive pattern matching
//! - A pluggable rule engine that drives lowering stage by stage
//! - Loading and emitting module metadata for cross-module imports
//!
//! # Architecture
//!
//! - [`ty`]: Core type representation (Ty, TypeVar, TypeInfo, FunctionInfo)
//! - [`registry`]: Type and function registries with alias support
//! - [`checker`]: The name-based compatibility gate and constraint checks
//! - [`unify`] / [`solver`]: Type-variable binding and substitution
//! - [`infer`]: Expression typing (calls, operators, members)
//! - [`constructors`]: Sum-type constructor table
//! - [`match_analyzer`]: Match typing and exhaustiveness
//! - [`rules`]: The rule engine and the built-in lowering rules
//! - [`lower`]: The lowering driver
//! - [`metadata`]: Module metadata loading and generation
//! - [`diagnostics`]: Terminal rendering of compile errors

pub mod ast;
pub mod builtins;
pub mod checker;
pub mod config;
pub mod constructors;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod infer;
pub mod ir;
pub mod lower;
pub mod match_analyzer;
pub mod metadata;
pub mod purity;
pub mod registry;
pub mod rules;
pub mod solver;
pub mod ty;
pub mod unify;

pub use config::SemaConfig;
pub use error::{CompileError, ErrorKind, SemaResult};
pub use lower::{lower_module, Lowering};
pub use metadata::{InMemoryMetadata, MetadataSource, ModuleMetadata};
pub use rules::{Rule, RuleEngine, Stage};
pub use ty::{FunctionInfo, Ty, TypeInfo};

/// Lower `module` and emit the metadata other modules need to import it.
pub fn compile_module(
    config: SemaConfig,
    module: &ast::Module,
) -> SemaResult<(ir::Module, ModuleMetadata)> {
    let (ir, _) = lower_module(config, module)?;
    let metadata = ModuleMetadata::from_module(&ir);
    Ok((ir, metadata))
}
