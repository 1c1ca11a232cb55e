//! Variable scopes.
//!
//! Maps local variable names to their types with a stack of scopes: a
//! function body, block, or match arm pushes a frame and pops it on exit.
//! Lookups search from the innermost scope outward.

use rustc_hash::FxHashMap;

use crate::ty::Ty;

#[derive(Clone, Debug)]
pub struct TypeEnv {
    /// Index 0 is the module-level scope.
    scopes: Vec<FxHashMap<String, Ty>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Pop the innermost scope. The module-level scope is never popped.
    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the module scope");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind `name` in the innermost scope, shadowing outer bindings.
    pub fn insert(&mut self, name: impl Into<String>, ty: Ty) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Ty> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Every visible name, sorted, for diagnostics.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_pop() {
        let mut env = TypeEnv::new();
        env.insert("x", Ty::i32());
        env.push_scope();
        env.insert("x", Ty::string());
        env.insert("y", Ty::bool());
        assert_eq!(env.lookup("x"), Some(&Ty::string()));
        assert_eq!(env.visible_names(), vec!["x".to_string(), "y".to_string()]);

        env.pop_scope();
        assert_eq!(env.lookup("x"), Some(&Ty::i32()));
        assert!(!env.contains("y"));
        assert_eq!(env.depth(), 1);
    }
}
