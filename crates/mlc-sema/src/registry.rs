//! Type and function registries.
//!
//! Both registries share one symbol table: a canonical name maps to exactly
//! one entry, any number of aliases (`Module.member` keys and the like)
//! resolve to a canonical name, and every entry records which module owns
//! it, the namespace derived from that module, and export/external flags.
//!
//! Lookups never fail: a miss is `None` and callers decide what it means.

use std::fmt;

use mlc_common::module_path::{derive_namespace, member_key, qualify};
use rowan::TextRange;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ty::{Field, FunctionInfo, Ty, TypeInfo};

/// Registry misuse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The alias target is not registered.
    UnknownTarget { alias: String, target: String },
    /// The alias is already a canonical name.
    AliasCollision { alias: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownTarget { alias, target } => write!(
                f,
                "Cannot alias '{}' to unknown symbol '{}'",
                alias, target
            ),
            RegistryError::AliasCollision { alias } => {
                write!(f, "Alias '{}' collides with a registered name", alias)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Where a declaration came from and how visible it is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registration {
    pub module_name: Option<String>,
    /// Explicit namespace; derived from `module_name` when `None`.
    pub namespace: Option<String>,
    pub exported: bool,
    pub external: bool,
    pub origin: Option<TextRange>,
}

impl Registration {
    pub fn in_module(module_name: impl Into<String>) -> Self {
        Registration {
            module_name: Some(module_name.into()),
            ..Self::default()
        }
    }

    pub fn exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    pub fn with_origin(mut self, origin: Option<TextRange>) -> Self {
        self.origin = origin;
        self
    }

    fn resolved_namespace(&self) -> Option<String> {
        self.namespace
            .clone()
            .or_else(|| derive_namespace(self.module_name.as_deref()))
    }
}

/// A registered declaration plus its cross-module metadata.
#[derive(Clone, Debug)]
pub struct Entry<T> {
    pub name: String,
    pub value: T,
    pub module_name: Option<String>,
    pub namespace: Option<String>,
    pub exported: bool,
    pub external: bool,
    pub origin: Option<TextRange>,
    /// Alias names resolving to this entry, in registration order.
    pub aliases: Vec<String>,
}

impl<T> Entry<T> {
    /// `namespace::name`, or the bare name outside any namespace.
    pub fn qualified_name(&self) -> String {
        qualify(self.namespace.as_deref(), &self.name)
    }

    fn apply(&mut self, reg: &Registration) {
        self.namespace = reg.resolved_namespace();
        self.module_name = reg.module_name.clone();
        self.exported = reg.exported;
        self.external = reg.external;
        self.origin = reg.origin;
    }
}

/// The shared symbol table behind both registries.
#[derive(Clone, Debug)]
pub struct SymbolTable<T> {
    entries: FxHashMap<String, Entry<T>>,
    aliases: FxHashMap<String, String>,
    by_namespace: FxHashMap<String, Vec<String>>,
    by_module: FxHashMap<String, Vec<String>>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable {
            entries: FxHashMap::default(),
            aliases: FxHashMap::default(),
            by_namespace: FxHashMap::default(),
            by_module: FxHashMap::default(),
        }
    }
}

fn unlist(index: &mut FxHashMap<String, Vec<String>>, key: Option<&str>, name: &str) {
    if let Some(key) = key {
        if let Some(names) = index.get_mut(key) {
            names.retain(|n| n != name);
            if names.is_empty() {
                index.remove(key);
            }
        }
    }
}

fn list(index: &mut FxHashMap<String, Vec<String>>, key: Option<&str>, name: &str) {
    if let Some(key) = key {
        let names = index.entry(key.to_string()).or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
}

impl<T> SymbolTable<T> {
    /// Register (or re-register) `name`. A re-registration keeps the entry's
    /// aliases and moves it between module/namespace listings as needed.
    pub fn register(&mut self, name: &str, value: T, reg: Registration) -> &Entry<T> {
        // A canonical name always wins over a stale alias of the same spelling.
        if let Some(target) = self.aliases.remove(name) {
            if let Some(entry) = self.entries.get_mut(&target) {
                entry.aliases.retain(|a| a != name);
            }
        }

        if let Some(existing) = self.entries.get(name) {
            let (old_ns, old_mod) = (existing.namespace.clone(), existing.module_name.clone());
            unlist(&mut self.by_namespace, old_ns.as_deref(), name);
            unlist(&mut self.by_module, old_mod.as_deref(), name);
            if old_mod != reg.module_name {
                debug!(
                    symbol = name,
                    from = ?old_mod,
                    to = ?reg.module_name,
                    "moving symbol between modules"
                );
            }
        }

        if let Some(entry) = self.entries.get_mut(name) {
            entry.value = value;
            entry.apply(&reg);
        } else {
            let mut entry = Entry {
                name: name.to_string(),
                value,
                module_name: None,
                namespace: None,
                exported: false,
                external: false,
                origin: None,
                aliases: Vec::new(),
            };
            entry.apply(&reg);
            self.entries.insert(name.to_string(), entry);
        }

        let entry = &self.entries[name];
        list(&mut self.by_namespace, entry.namespace.as_deref(), name);
        list(&mut self.by_module, entry.module_name.as_deref(), name);
        &self.entries[name]
    }

    /// Make `alias` resolve to `target` (itself resolved through aliases).
    /// An alias that pointed elsewhere is repointed.
    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<(), RegistryError> {
        let canonical = match self.canonical_name(target) {
            Some(c) => c.to_string(),
            None => {
                return Err(RegistryError::UnknownTarget {
                    alias: alias.to_string(),
                    target: target.to_string(),
                })
            }
        };
        if self.entries.contains_key(alias) {
            return Err(RegistryError::AliasCollision {
                alias: alias.to_string(),
            });
        }

        if let Some(previous) = self.aliases.insert(alias.to_string(), canonical.clone()) {
            if previous != canonical {
                if let Some(entry) = self.entries.get_mut(&previous) {
                    entry.aliases.retain(|a| a != alias);
                }
            }
        }
        if let Some(entry) = self.entries.get_mut(&canonical) {
            if !entry.aliases.iter().any(|a| a == alias) {
                entry.aliases.push(alias.to_string());
            }
        }
        debug!(alias, target = %canonical, "registered alias");
        Ok(())
    }

    /// The canonical name for `name`, which may itself be canonical.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(name) {
            return Some(key.as_str());
        }
        self.aliases.get(name).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Entry<T>> {
        let canonical = self.canonical_name(name)?;
        self.entries.get(canonical)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entry<T>> {
        let canonical = self.canonical_name(name)?.to_string();
        self.entries.get_mut(&canonical)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.canonical_name(name).is_some()
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Aliases of the entry `name` resolves to, in registration order.
    pub fn aliases_for(&self, name: &str) -> &[String] {
        self.get(name).map(|e| e.aliases.as_slice()).unwrap_or(&[])
    }

    /// Replace an entry's metadata, re-indexing its module/namespace listings.
    /// Returns `false` when `name` is unknown.
    pub fn update_metadata(&mut self, name: &str, reg: Registration) -> bool {
        let Some(canonical) = self.canonical_name(name).map(str::to_string) else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(&canonical) else {
            return false;
        };
        let (old_ns, old_mod) = (entry.namespace.clone(), entry.module_name.clone());
        entry.apply(&reg);
        let (new_ns, new_mod) = (entry.namespace.clone(), entry.module_name.clone());

        unlist(&mut self.by_namespace, old_ns.as_deref(), &canonical);
        unlist(&mut self.by_module, old_mod.as_deref(), &canonical);
        list(&mut self.by_namespace, new_ns.as_deref(), &canonical);
        list(&mut self.by_module, new_mod.as_deref(), &canonical);
        true
    }

    /// Delete an alias (the canonical entry survives) or a canonical entry
    /// (all of its aliases go with it). Returns whether anything was removed.
    pub fn delete(&mut self, name: &str) -> bool {
        if let Some(target) = self.aliases.remove(name) {
            if let Some(entry) = self.entries.get_mut(&target) {
                entry.aliases.retain(|a| a != name);
            }
            return true;
        }
        let Some(entry) = self.entries.remove(name) else {
            return false;
        };
        for alias in &entry.aliases {
            self.aliases.remove(alias);
        }
        unlist(&mut self.by_namespace, entry.namespace.as_deref(), name);
        unlist(&mut self.by_module, entry.module_name.as_deref(), name);
        true
    }

    pub fn in_namespace(&self, namespace: &str) -> Vec<&Entry<T>> {
        self.listed(&self.by_namespace, namespace)
    }

    pub fn in_module(&self, module_name: &str) -> Vec<&Entry<T>> {
        self.listed(&self.by_module, module_name)
    }

    fn listed(&self, index: &FxHashMap<String, Vec<String>>, key: &str) -> Vec<&Entry<T>> {
        index
            .get(key)
            .map(|names| names.iter().filter_map(|n| self.entries.get(n)).collect())
            .unwrap_or_default()
    }

    /// All entries, sorted by canonical name.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        let mut entries: Vec<&Entry<T>> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.into_iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.aliases.clear();
        self.by_namespace.clear();
        self.by_module.clear();
    }
}

// ── Type Registry ──────────────────────────────────────────────────────

/// Primitive types known before any declaration is seen.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "bool", "void", "unit", "i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64", "f32", "f64",
    "usize", "str", "string", "regex",
];

/// Catalog of named types.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    table: SymbolTable<TypeInfo>,
}

impl TypeRegistry {
    /// Create a registry holding only the primitive types.
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            table: SymbolTable::default(),
        };
        registry.register_primitives();
        registry
    }

    fn register_primitives(&mut self) {
        for name in PRIMITIVE_TYPES {
            self.table.register(
                name,
                TypeInfo::new(*name, Ty::prim(*name)),
                Registration::default(),
            );
        }
    }

    pub fn register(&mut self, info: TypeInfo, reg: Registration) -> &Entry<TypeInfo> {
        let name = info.name.clone();
        debug!(ty = %name, module = ?reg.module_name, "registering type");
        self.table.register(&name, info, reg)
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<(), RegistryError> {
        self.table.register_alias(alias, target)
    }

    pub fn aliases_for(&self, name: &str) -> &[String] {
        self.table.aliases_for(name)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    /// The declared shape of `name`.
    pub fn lookup(&self, name: &str) -> Option<&Ty> {
        self.table.get(name).map(|e| &e.value.ty)
    }

    pub fn lookup_info(&self, name: &str) -> Option<&TypeInfo> {
        self.table.get(name).map(|e| &e.value)
    }

    pub fn fetch_entry(&self, name: &str) -> Option<&Entry<TypeInfo>> {
        self.table.get(name)
    }

    /// The type of field `member` on record type `type_name`.
    pub fn resolve_member(&self, type_name: &str, member: &str) -> Option<&Ty> {
        self.lookup(type_name)?
            .record_fields()?
            .iter()
            .find(|f| f.name == member)
            .map(|f: &Field| &f.ty)
    }

    pub fn update_metadata(&mut self, name: &str, reg: Registration) -> bool {
        self.table.update_metadata(name, reg)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.table.delete(name)
    }

    pub fn types_in_namespace(&self, namespace: &str) -> Vec<&Entry<TypeInfo>> {
        self.table.in_namespace(namespace)
    }

    pub fn types_in_module(&self, module_name: &str, exported_only: bool) -> Vec<&Entry<TypeInfo>> {
        self.table
            .in_module(module_name)
            .into_iter()
            .filter(|e| !exported_only || e.exported)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<TypeInfo>> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Forget everything except the primitive types.
    pub fn clear(&mut self) {
        self.table.clear();
        self.register_primitives();
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Function Registry ──────────────────────────────────────────────────

/// Side-effect tags attached to functions for the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Effect {
    Pure,
    Constexpr,
    Noexcept,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Effect::Pure => "pure",
            Effect::Constexpr => "constexpr",
            Effect::Noexcept => "noexcept",
        };
        f.write_str(s)
    }
}

/// Catalog of callable signatures.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    table: SymbolTable<FunctionInfo>,
    effects: FxHashMap<String, Vec<Effect>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: FunctionInfo, reg: Registration) -> &Entry<FunctionInfo> {
        let name = info.name.clone();
        debug!(function = %name, module = ?reg.module_name, "registering function");
        self.table.register(&name, info, reg)
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<(), RegistryError> {
        self.table.register_alias(alias, target)
    }

    pub fn aliases_for(&self, name: &str) -> &[String] {
        self.table.aliases_for(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn fetch(&self, name: &str) -> Option<&FunctionInfo> {
        self.table.get(name).map(|e| &e.value)
    }

    pub fn fetch_entry(&self, name: &str) -> Option<&Entry<FunctionInfo>> {
        self.table.get(name)
    }

    /// Resolve `container.member`: first as a registered `container.member`
    /// alias, then as `member` listed under the container's namespace or
    /// module.
    pub fn fetch_member(&self, container: &str, member: &str) -> Option<&Entry<FunctionInfo>> {
        if let Some(entry) = self.table.get(&member_key(container, member)) {
            return Some(entry);
        }
        let by_namespace = derive_namespace(Some(container))
            .map(|ns| self.table.in_namespace(&ns))
            .unwrap_or_default();
        by_namespace
            .into_iter()
            .chain(self.table.in_module(container))
            .find(|e| e.name == member)
    }

    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.table.canonical_name(name)
    }

    pub fn update_metadata(&mut self, name: &str, reg: Registration) -> bool {
        self.table.update_metadata(name, reg)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        if !self.table.is_alias(name) {
            self.effects.remove(name);
        }
        self.table.delete(name)
    }

    pub fn functions_in_namespace(&self, namespace: &str) -> Vec<&Entry<FunctionInfo>> {
        self.table.in_namespace(namespace)
    }

    pub fn functions_in_module(&self, module_name: &str) -> Vec<&Entry<FunctionInfo>> {
        self.table.in_module(module_name)
    }

    pub fn exported_functions(&self) -> Vec<&Entry<FunctionInfo>> {
        self.table.iter().filter(|e| e.exported).collect()
    }

    pub fn external_functions(&self) -> Vec<&Entry<FunctionInfo>> {
        self.table.iter().filter(|e| e.external).collect()
    }

    /// Effect tags of `name` (resolved through aliases), sorted and unique.
    pub fn effects(&self, name: &str) -> &[Effect] {
        self.table
            .canonical_name(name)
            .and_then(|c| self.effects.get(c))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn add_effect(&mut self, name: &str, effect: Effect) -> bool {
        let Some(canonical) = self.table.canonical_name(name).map(str::to_string) else {
            return false;
        };
        let tags = self.effects.entry(canonical).or_default();
        if !tags.contains(&effect) {
            tags.push(effect);
            tags.sort();
        }
        true
    }

    pub fn replace_effects(&mut self, name: &str, effects: &[Effect]) -> bool {
        let Some(canonical) = self.table.canonical_name(name).map(str::to_string) else {
            return false;
        };
        let mut tags = effects.to_vec();
        tags.sort();
        tags.dedup();
        self.effects.insert(canonical, tags);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<FunctionInfo>> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.effects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_fn() -> FunctionInfo {
        FunctionInfo::new("add", vec![Ty::i32(), Ty::i32()], Ty::i32())
    }

    #[test]
    fn primitives_survive_clear() {
        let mut types = TypeRegistry::new();
        assert!(types.has_type("i32"));
        assert!(types.has_type("regex"));
        types.register(TypeInfo::new("Point", Ty::Opaque("Point".into())), Registration::default());
        types.clear();
        assert!(!types.has_type("Point"));
        assert!(types.has_type("string"));
        assert_eq!(types.len(), PRIMITIVE_TYPES.len());
    }

    #[test]
    fn reregistering_type_moves_module_listing() {
        let mut types = TypeRegistry::new();
        let point = TypeInfo::new("Point", Ty::Opaque("Point".into()));
        types.register(point.clone(), Registration::in_module("Geo").exported(true));
        assert_eq!(types.types_in_module("Geo", false).len(), 1);
        assert_eq!(types.types_in_namespace("geo").len(), 1);

        types.register(point, Registration::in_module("Shapes"));
        assert!(types.types_in_module("Geo", false).is_empty());
        assert!(types.types_in_namespace("geo").is_empty());
        assert_eq!(types.types_in_module("Shapes", false).len(), 1);
        assert!(types.types_in_module("Shapes", true).is_empty());
    }

    #[test]
    fn resolve_member_reads_record_fields() {
        let mut types = TypeRegistry::new();
        let point = Ty::Record {
            name: "Point".into(),
            fields: vec![Field::new("x", Ty::i32()), Field::new("y", Ty::f32())],
        };
        types.register(TypeInfo::new("Point", point), Registration::default());
        assert_eq!(types.resolve_member("Point", "y"), Some(&Ty::f32()));
        assert_eq!(types.resolve_member("Point", "z"), None);
        assert_eq!(types.resolve_member("i32", "x"), None);
    }

    #[test]
    fn alias_resolves_to_same_entry_and_deletes_cleanly() {
        let mut funcs = FunctionRegistry::new();
        funcs.register(add_fn(), Registration::default());
        funcs.register_alias("add_alias", "add").unwrap();

        assert_eq!(funcs.fetch("add_alias"), funcs.fetch("add"));
        assert_eq!(funcs.canonical_name("add_alias"), Some("add"));

        assert!(funcs.delete("add_alias"));
        assert!(funcs.is_registered("add"));
        assert!(funcs.fetch("add_alias").is_none());

        funcs.register_alias("plus", "add").unwrap();
        assert!(funcs.delete("add"));
        assert!(funcs.fetch("plus").is_none());
        assert!(funcs.canonical_name("plus").is_none());
    }

    #[test]
    fn alias_errors() {
        let mut funcs = FunctionRegistry::new();
        funcs.register(add_fn(), Registration::default());
        funcs.register(FunctionInfo::new("sub", vec![], Ty::i32()), Registration::default());

        assert_eq!(
            funcs.register_alias("x", "missing"),
            Err(RegistryError::UnknownTarget {
                alias: "x".into(),
                target: "missing".into()
            })
        );
        assert_eq!(
            funcs.register_alias("sub", "add"),
            Err(RegistryError::AliasCollision { alias: "sub".into() })
        );
    }

    #[test]
    fn repointing_alias_detaches_from_previous_target() {
        let mut funcs = FunctionRegistry::new();
        funcs.register(add_fn(), Registration::default());
        funcs.register(FunctionInfo::new("sub", vec![], Ty::i32()), Registration::default());
        funcs.register_alias("op", "add").unwrap();
        funcs.register_alias("op", "sub").unwrap();

        assert!(funcs.fetch_entry("add").unwrap().aliases.is_empty());
        assert_eq!(funcs.fetch_entry("sub").unwrap().aliases, vec!["op".to_string()]);
    }

    #[test]
    fn reregistration_keeps_aliases() {
        let mut funcs = FunctionRegistry::new();
        funcs.register(add_fn(), Registration::in_module("Math"));
        funcs.register_alias("Math.add", "add").unwrap();
        funcs.register(add_fn(), Registration::in_module("Math").exported(true));

        let entry = funcs.fetch_entry("Math.add").unwrap();
        assert!(entry.exported);
        assert_eq!(entry.aliases, vec!["Math.add".to_string()]);
        assert_eq!(entry.qualified_name(), "math::add");
    }

    #[test]
    fn fetch_member_via_alias_or_namespace() {
        let mut funcs = FunctionRegistry::new();
        funcs.register(add_fn(), Registration::in_module("Math").exported(true).external(true));
        assert_eq!(funcs.fetch_member("Math", "add").map(|e| e.name.as_str()), Some("add"));
        assert!(funcs.fetch_member("Math", "mul").is_none());
        assert_eq!(funcs.functions_in_namespace("math").len(), 1);
        assert_eq!(funcs.external_functions().len(), 1);
        assert_eq!(funcs.exported_functions().len(), 1);
    }

    #[test]
    fn effects_are_unique_and_follow_aliases() {
        let mut funcs = FunctionRegistry::new();
        funcs.register(add_fn(), Registration::default());
        funcs.register_alias("plus", "add").unwrap();
        funcs.add_effect("plus", Effect::Constexpr);
        funcs.add_effect("add", Effect::Pure);
        funcs.add_effect("add", Effect::Pure);
        assert_eq!(funcs.effects("add"), &[Effect::Pure, Effect::Constexpr]);
        assert!(!funcs.add_effect("missing", Effect::Pure));

        funcs.delete("add");
        assert!(funcs.effects("add").is_empty());
    }
}
