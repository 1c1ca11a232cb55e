//! Module naming helpers.
//!
//! Source modules are named with `/`-separated paths (`MyApp/Utils`). The
//! registries index symbols by a lowercase `::`-joined namespace derived from
//! that path, and resolve `Module.member` references through qualified
//! alias keys.

/// The module name that never gets a namespace.
pub const ENTRY_MODULE: &str = "main";

/// Derive the registry namespace for a module.
///
/// Returns `None` for an absent, empty, or entry (`main`) module. Otherwise
/// each `/`-separated segment is lowercased and the segments are joined with
/// `::`.
pub fn derive_namespace(module_name: Option<&str>) -> Option<String> {
    let name = module_name?.trim();
    if name.is_empty() || name == ENTRY_MODULE {
        return None;
    }
    let segments: Vec<String> = name
        .split(['/', ':'])
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("::"))
    }
}

/// Join a namespace and a member name into a `::`-qualified name.
pub fn qualify(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}::{name}"),
        _ => name.to_string(),
    }
}

/// The `Container.member` key used for member-style references.
pub fn member_key(container: &str, member: &str) -> String {
    format!("{container}.{member}")
}

/// Alias keys under which an imported member becomes reachable.
///
/// The module's own name always yields a key; an `as` alias adds a second one.
/// The result never contains duplicates.
pub fn qualified_aliases(member: &str, module_name: &str, alias: Option<&str>) -> Vec<String> {
    let mut keys = vec![member_key(module_name, member)];
    if let Some(alias) = alias.filter(|a| !a.is_empty()) {
        let key = member_key(alias, member);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// The last `/`- or `::`-separated segment of a module name (`Std/Math` -> `Math`).
pub fn short_name(module_name: &str) -> &str {
    module_name
        .rsplit(['/', ':'])
        .find(|s| !s.is_empty())
        .unwrap_or(module_name)
}
