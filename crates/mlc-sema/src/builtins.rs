//! Built-in names the semantic core knows without any declaration.
//!
//! - I/O and formatting pseudo-functions with fixed return types
//! - numeric primitive sets used by operator typing
//! - built-in type-parameter constraints (`Numeric`)
//! - the receiver methods supported on arrays, strings and numbers

use crate::ty::Ty;

/// Every numeric primitive.
pub const NUMERIC_TYPES: &[&str] = &[
    "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64",
];

pub const FLOAT_TYPES: &[&str] = &["f32", "f64"];

/// Members of the built-in `Numeric` constraint.
const NUMERIC_CONSTRAINT: &[&str] = &["i32", "f32", "i64", "f64", "u32", "u64"];

/// Array methods, in the order they are listed in diagnostics.
pub const ARRAY_METHODS: &[&str] = &["length", "size", "is_empty", "map", "filter", "fold"];

pub const STRING_METHODS: &[&str] = &[
    "split",
    "trim",
    "trim_start",
    "trim_end",
    "upper",
    "lower",
    "is_empty",
    "length",
];

pub const NUMERIC_METHODS: &[&str] = &["sqrt"];

/// Return type of an I/O or formatting pseudo-function.
pub fn io_return_type(name: &str) -> Option<Ty> {
    match name {
        "print" | "println" | "eprint" | "eprintln" => Some(Ty::i32()),
        "read_line" | "input" | "to_string" | "format" => Some(Ty::string()),
        "args" => Some(Ty::array(Ty::string())),
        _ => None,
    }
}

pub fn is_io_function(name: &str) -> bool {
    io_return_type(name).is_some()
}

/// Types admitted by a built-in constraint, or `None` for an unknown name.
pub fn constraint_members(constraint: &str) -> Option<&'static [&'static str]> {
    match constraint {
        "Numeric" => Some(NUMERIC_CONSTRAINT),
        _ => None,
    }
}

pub fn is_numeric_name(name: &str) -> bool {
    NUMERIC_TYPES.contains(&name)
}

pub fn is_float_name(name: &str) -> bool {
    FLOAT_TYPES.contains(&name)
}

/// Types whose values can be evaluated at compile time.
pub fn is_literal_type_name(name: &str) -> bool {
    is_numeric_name(name) || matches!(name, "bool" | "usize" | "unit" | "void")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_return_types() {
        assert_eq!(io_return_type("println"), Some(Ty::i32()));
        assert_eq!(io_return_type("format"), Some(Ty::string()));
        assert_eq!(io_return_type("args").map(|t| t.to_string()).as_deref(), Some("string[]"));
        assert_eq!(io_return_type("open"), None);
    }

    #[test]
    fn numeric_constraint_is_narrower_than_numeric_types() {
        let members = constraint_members("Numeric").unwrap();
        assert!(members.contains(&"i32"));
        assert!(!members.contains(&"i8"));
        assert!(is_numeric_name("i8"));
        assert!(constraint_members("Hashable").is_none());
    }
}
