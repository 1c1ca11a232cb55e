//! Sum-type variant constructors.
//!
//! Each variant of a sum type becomes a callable pseudo-function: its
//! parameters are the variant's fields and it returns the sum type, applied
//! to the declaration's own type variables when the sum is generic. Calls
//! such as `Some(42)` then go through ordinary call inference and generic
//! solving.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::registry::{FunctionRegistry, Registration};
use crate::ty::{FunctionInfo, Ty, TypeInfo};
use crate::unify::specialize_constructor;

/// Constructor signatures by variant name.
#[derive(Clone, Debug, Default)]
pub struct ConstructorTable {
    by_name: FxHashMap<String, Constructor>,
    by_sum: FxHashMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constructor {
    /// The sum type this variant belongs to.
    pub sum_name: String,
    pub info: FunctionInfo,
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every variant of `sum` in the table and as a function.
    ///
    /// Returns the constructor signatures in declaration order. Declarations
    /// that are not sum types register nothing.
    pub fn register_sum_type(
        &mut self,
        sum: &TypeInfo,
        functions: &mut FunctionRegistry,
        reg: &Registration,
    ) -> Vec<FunctionInfo> {
        let Some(variants) = sum.ty.sum_variants() else {
            return Vec::new();
        };
        let ret_type = sum.applied();

        self.forget_sum(&sum.name, functions);
        let mut registered = Vec::with_capacity(variants.len());
        for variant in variants {
            let info = FunctionInfo::new(variant.name.clone(), variant.fields.clone(), ret_type.clone())
                .with_type_params(sum.type_params.clone());
            functions.register(info.clone(), reg.clone());
            self.by_name.insert(
                variant.name.clone(),
                Constructor {
                    sum_name: sum.name.clone(),
                    info: info.clone(),
                },
            );
            self.by_sum
                .entry(sum.name.clone())
                .or_default()
                .push(variant.name.clone());
            registered.push(info);
        }
        debug!(sum = %sum.name, count = registered.len(), "registered variant constructors");
        registered
    }

    /// Drop constructors left over from an earlier registration of `sum_name`.
    fn forget_sum(&mut self, sum_name: &str, functions: &mut FunctionRegistry) {
        for variant in self.by_sum.remove(sum_name).unwrap_or_default() {
            self.by_name.remove(&variant);
            functions.delete(&variant);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Constructor> {
        self.by_name.get(name)
    }

    pub fn is_constructor(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Variant names of `sum_name` in declaration order.
    pub fn variants_of(&self, sum_name: &str) -> &[String] {
        self.by_sum.get(sum_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The constructor `name` specialized to a scrutinee of type `scrutinee`.
    pub fn info_for(&self, name: &str, scrutinee: &Ty) -> Option<FunctionInfo> {
        self.by_name
            .get(name)
            .map(|c| specialize_constructor(&c.info, scrutinee))
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.by_sum.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{TypeParam, Variant};

    fn option_decl() -> TypeInfo {
        TypeInfo::new(
            "Option",
            Ty::Sum {
                name: "Option".into(),
                variants: vec![
                    Variant::new("Some", vec![Ty::var("T")]),
                    Variant::new("None", vec![]),
                ],
            },
        )
        .with_type_params(vec![TypeParam::new("T")])
    }

    #[test]
    fn generic_sum_constructors_return_applied_type() {
        let mut table = ConstructorTable::new();
        let mut funcs = FunctionRegistry::new();
        let infos = table.register_sum_type(&option_decl(), &mut funcs, &Registration::default());

        assert_eq!(infos.len(), 2);
        let some = funcs.fetch("Some").unwrap();
        assert_eq!(some.ret_type.to_string(), "Option<T>");
        assert_eq!(some.param_types, vec![Ty::var("T")]);
        assert!(some.is_generic());
        assert_eq!(table.variants_of("Option"), &["Some".to_string(), "None".to_string()]);
        assert_eq!(table.get("None").map(|c| c.sum_name.as_str()), Some("Option"));
    }

    #[test]
    fn plain_sum_constructors_return_the_sum() {
        let color = TypeInfo::new(
            "Color",
            Ty::Sum {
                name: "Color".into(),
                variants: vec![Variant::new("Red", vec![]), Variant::new("Rgb", vec![Ty::i32(); 3])],
            },
        );
        let mut table = ConstructorTable::new();
        let mut funcs = FunctionRegistry::new();
        table.register_sum_type(&color, &mut funcs, &Registration::default());

        let rgb = funcs.fetch("Rgb").unwrap();
        assert_eq!(rgb.ret_type.to_string(), "Color");
        assert!(!rgb.is_generic());
    }

    #[test]
    fn reregistration_replaces_stale_variants() {
        let mut table = ConstructorTable::new();
        let mut funcs = FunctionRegistry::new();
        table.register_sum_type(&option_decl(), &mut funcs, &Registration::default());

        let renamed = TypeInfo::new(
            "Option",
            Ty::Sum {
                name: "Option".into(),
                variants: vec![Variant::new("Just", vec![Ty::var("T")]), Variant::new("Nothing", vec![])],
            },
        )
        .with_type_params(vec![TypeParam::new("T")]);
        table.register_sum_type(&renamed, &mut funcs, &Registration::default());

        assert!(!funcs.is_registered("Some"));
        assert!(!table.is_constructor("None"));
        assert!(table.is_constructor("Just"));
    }

    #[test]
    fn info_for_specializes_to_scrutinee() {
        let mut table = ConstructorTable::new();
        let mut funcs = FunctionRegistry::new();
        let decl = option_decl();
        table.register_sum_type(&decl, &mut funcs, &Registration::default());

        let scrutinee = Ty::generic(decl.ty.clone(), vec![Ty::i32()]);
        let some = table.info_for("Some", &scrutinee).unwrap();
        assert_eq!(some.param_types, vec![Ty::i32()]);
        assert!(table.info_for("Missing", &scrutinee).is_none());
    }
}
