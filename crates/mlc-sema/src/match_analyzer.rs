//! Match expression analysis.
//!
//! Lowers every arm through a caller-supplied callback, checks that all arm
//! bodies agree with the first arm's type, and verifies that a match over a
//! sum type covers every variant. Only the top level of each pattern is
//! inspected: nested sub-patterns never affect exhaustiveness.

use std::collections::BTreeSet;

use mlc_common::events::EventBus;
use rowan::TextRange;
use tracing::debug;

use crate::checker::TypeChecker;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::ir;
use crate::registry::TypeRegistry;
use crate::ty::Ty;

/// State the analyzer reads between arm transformations.
pub trait MatchContext {
    fn types(&self) -> &TypeRegistry;
    fn events(&self) -> &EventBus;
}

#[derive(Clone, Debug)]
pub struct MatchAnalysis {
    pub arms: Vec<ir::MatchArm>,
    /// The first arm's body type.
    pub result_type: Ty,
}

#[derive(Clone, Copy, Debug)]
pub struct MatchAnalyzer {
    check_exhaustiveness: bool,
}

impl MatchAnalyzer {
    pub fn new(check_exhaustiveness: bool) -> Self {
        MatchAnalyzer {
            check_exhaustiveness,
        }
    }

    pub fn analyze<C, A, F>(
        &self,
        cx: &mut C,
        scrutinee: &Ty,
        arms: &[A],
        origin: Option<TextRange>,
        mut transform_arm: F,
    ) -> SemaResult<MatchAnalysis>
    where
        C: MatchContext + ?Sized,
        F: FnMut(&mut C, &A) -> SemaResult<ir::MatchArm>,
    {
        if arms.is_empty() {
            return Err(CompileError::new(
                ErrorKind::EmptyMatch,
                "Match expression must have at least one arm",
            )
            .with_origin(origin));
        }

        let mut lowered = Vec::with_capacity(arms.len());
        for arm in arms {
            lowered.push(transform_arm(&mut *cx, arm)?);
        }

        let result_type = lowered[0].body.ty.clone();
        let checker = TypeChecker::new(cx.events());
        for (i, arm) in lowered.iter().enumerate() {
            let context = format!("match arm {}", i + 1);
            checker.ensure_compatible_type(
                &arm.body.ty,
                &result_type,
                &context,
                arm.body.origin.or(origin),
            )?;
        }

        if self.check_exhaustiveness {
            self.check_exhaustive(cx.types(), scrutinee, &lowered, origin)?;
        }

        Ok(MatchAnalysis {
            arms: lowered,
            result_type,
        })
    }

    /// Every variant of a sum-type scrutinee must be covered by some arm's
    /// top-level pattern, unless an arm matches anything.
    pub fn check_exhaustive(
        &self,
        types: &TypeRegistry,
        scrutinee: &Ty,
        arms: &[ir::MatchArm],
        origin: Option<TextRange>,
    ) -> SemaResult<()> {
        let sum_name = scrutinee.name();
        let declared = types.lookup(&sum_name).and_then(Ty::sum_variants);
        let Some(variants) = declared.or_else(|| scrutinee.sum_variants()) else {
            return Ok(());
        };

        if arms.iter().any(|arm| arm.pattern.is_catch_all()) {
            return Ok(());
        }

        let mut covered = Vec::new();
        for arm in arms {
            arm.pattern.covered_variants(&mut covered);
        }
        let missing: Vec<String> = variants
            .iter()
            .map(|v| v.name.clone())
            .filter(|name| !covered.contains(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        debug!(sum = %sum_name, ?missing, "checked match exhaustiveness");
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CompileError::non_exhaustive(&missing).with_origin(origin))
        }
    }
}
