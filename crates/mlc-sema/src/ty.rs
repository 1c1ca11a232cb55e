//! Type representation for the MLC type system.
//!
//! Defines the `Ty` enum (the shapes a resolved type can take), type
//! variables with optional constraints, function signatures (`FunctionInfo`)
//! and the declared form of named types (`TypeInfo`).
//!
//! Types are plain data. Equality is name-based for named shapes
//! (primitives, records, sums, opaque types) and structural for composite
//! shapes. A type variable only ever equals another type variable of the
//! same name.

use std::fmt;

/// A named placeholder bound during one generic call or match analysis.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeVar {
    pub name: String,
    /// Constraint name such as `Numeric`, if declared.
    pub constraint: Option<String>,
}

/// A declared type parameter: `T` or `T: Numeric`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParam {
    pub name: String,
    pub constraint: Option<String>,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        TypeParam {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn constrained(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        TypeParam {
            name: name.into(),
            constraint: Some(constraint.into()),
        }
    }

    /// The type variable this parameter introduces.
    pub fn as_var(&self) -> Ty {
        Ty::Var(TypeVar {
            name: self.name.clone(),
            constraint: self.constraint.clone(),
        })
    }
}

/// A record field.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

/// A sum-type variant and its positional field types.
#[derive(Clone, Debug, PartialEq)]
pub struct Variant {
    pub name: String,
    pub fields: Vec<Ty>,
}

impl Variant {
    pub fn new(name: impl Into<String>, fields: Vec<Ty>) -> Self {
        Variant {
            name: name.into(),
            fields,
        }
    }
}

/// An MLC type.
#[derive(Clone, Debug)]
pub enum Ty {
    /// A built-in scalar or named type referenced by name: `i32`, `string`.
    Primitive(String),
    /// `T[]`
    Array(Box<Ty>),
    /// `(params) -> ret`
    Function(Vec<Ty>, Box<Ty>),
    /// A type applied to arguments: `Option<i32>`, `Result<T, E>`.
    Generic(Box<Ty>, Vec<Ty>),
    /// An unresolved type variable.
    Var(TypeVar),
    Record { name: String, fields: Vec<Field> },
    Sum { name: String, variants: Vec<Variant> },
    Ref(Box<Ty>),
    MutRef(Box<Ty>),
    Map(Box<Ty>, Box<Ty>),
    Opaque(String),
    Unit,
}

impl Ty {
    pub fn prim(name: impl Into<String>) -> Ty {
        Ty::Primitive(name.into())
    }

    pub fn var(name: impl Into<String>) -> Ty {
        Ty::Var(TypeVar {
            name: name.into(),
            constraint: None,
        })
    }

    pub fn array(elem: Ty) -> Ty {
        Ty::Array(Box::new(elem))
    }

    pub fn func(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Function(params, Box::new(ret))
    }

    pub fn generic(base: Ty, args: Vec<Ty>) -> Ty {
        Ty::Generic(Box::new(base), args)
    }

    pub fn i32() -> Ty {
        Ty::prim("i32")
    }

    pub fn f32() -> Ty {
        Ty::prim("f32")
    }

    pub fn bool() -> Ty {
        Ty::prim("bool")
    }

    pub fn string() -> Ty {
        Ty::prim("string")
    }

    pub fn void() -> Ty {
        Ty::prim("void")
    }

    /// The placeholder for a type that could not be determined yet.
    pub fn auto() -> Ty {
        Ty::prim("auto")
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Ty::Primitive(n) if n == "auto")
    }

    /// The name used for compatibility checks and registry lookups.
    ///
    /// Named shapes report their own name; a generic reports its base name;
    /// structural shapes report their shape (`array`, `function`, ...).
    pub fn name(&self) -> String {
        match self {
            Ty::Primitive(n) | Ty::Opaque(n) => n.clone(),
            Ty::Record { name, .. } | Ty::Sum { name, .. } => name.clone(),
            Ty::Var(v) => v.name.clone(),
            Ty::Generic(base, _) => base.name(),
            Ty::Array(_) => "array".to_string(),
            Ty::Function(..) => "function".to_string(),
            Ty::Ref(_) => "ref".to_string(),
            Ty::MutRef(_) => "mut_ref".to_string(),
            Ty::Map(..) => "map".to_string(),
            Ty::Unit => "unit".to_string(),
        }
    }

    pub fn is_type_var(&self) -> bool {
        matches!(self, Ty::Var(_))
    }

    pub fn as_type_var(&self) -> Option<&TypeVar> {
        match self {
            Ty::Var(v) => Some(v),
            _ => None,
        }
    }

    /// The element type of an array.
    pub fn element(&self) -> Option<&Ty> {
        match self {
            Ty::Array(e) => Some(e),
            _ => None,
        }
    }

    /// Type arguments of a generic application (empty for everything else).
    pub fn type_args(&self) -> &[Ty] {
        match self {
            Ty::Generic(_, args) => args,
            _ => &[],
        }
    }

    /// Strips one generic application: `Option<i32>` -> `Option`'s base type.
    pub fn base(&self) -> &Ty {
        match self {
            Ty::Generic(base, _) => base,
            other => other,
        }
    }

    /// Whether any type variable occurs inside this type.
    pub fn has_type_vars(&self) -> bool {
        match self {
            Ty::Var(_) => true,
            Ty::Array(e) | Ty::Ref(e) | Ty::MutRef(e) => e.has_type_vars(),
            Ty::Function(params, ret) => {
                params.iter().any(Ty::has_type_vars) || ret.has_type_vars()
            }
            Ty::Generic(_, args) => args.iter().any(Ty::has_type_vars),
            Ty::Map(k, v) => k.has_type_vars() || v.has_type_vars(),
            Ty::Record { fields, .. } => fields.iter().any(|f| f.ty.has_type_vars()),
            Ty::Sum { variants, .. } => variants
                .iter()
                .any(|v| v.fields.iter().any(Ty::has_type_vars)),
            Ty::Primitive(_) | Ty::Opaque(_) | Ty::Unit => false,
        }
    }

    /// How many of a generic's type arguments are fully resolved.
    pub fn concreteness(&self) -> usize {
        self.type_args().iter().filter(|a| !a.has_type_vars()).count()
    }

    pub fn record_fields(&self) -> Option<&[Field]> {
        match self.base() {
            Ty::Record { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn sum_variants(&self) -> Option<&[Variant]> {
        match self.base() {
            Ty::Sum { variants, .. } => Some(variants),
            _ => None,
        }
    }
}

impl PartialEq for Ty {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Ty::Primitive(a), Ty::Primitive(b)) | (Ty::Opaque(a), Ty::Opaque(b)) => a == b,
            (Ty::Record { name: a, .. }, Ty::Record { name: b, .. }) => a == b,
            (Ty::Sum { name: a, .. }, Ty::Sum { name: b, .. }) => a == b,
            (Ty::Var(a), Ty::Var(b)) => a.name == b.name,
            (Ty::Array(a), Ty::Array(b)) | (Ty::Ref(a), Ty::Ref(b)) | (Ty::MutRef(a), Ty::MutRef(b)) => {
                a == b
            }
            (Ty::Function(pa, ra), Ty::Function(pb, rb)) => pa == pb && ra == rb,
            (Ty::Generic(ba, aa), Ty::Generic(bb, ab)) => ba.name() == bb.name() && aa == ab,
            (Ty::Map(ka, va), Ty::Map(kb, vb)) => ka == kb && va == vb,
            (Ty::Unit, Ty::Unit) => true,
            _ => false,
        }
    }
}

fn join(tys: &[Ty]) -> String {
    tys.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Primitive(n) | Ty::Opaque(n) => write!(f, "{}", n),
            Ty::Record { name, .. } | Ty::Sum { name, .. } => write!(f, "{}", name),
            Ty::Var(v) => write!(f, "{}", v.name),
            Ty::Array(e) => match e.as_ref() {
                Ty::Function(..) => write!(f, "({})[]", e),
                _ => write!(f, "{}[]", e),
            },
            Ty::Function(params, ret) => write!(f, "({}) -> {}", join(params), ret),
            Ty::Generic(base, args) => write!(f, "{}<{}>", base.name(), join(args)),
            Ty::Ref(inner) => write!(f, "&{}", inner),
            Ty::MutRef(inner) => write!(f, "&mut {}", inner),
            Ty::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            Ty::Unit => write!(f, "unit"),
        }
    }
}

/// A function signature.
///
/// Never mutated once built: solving a generic call produces a separate
/// `Instantiation` instead.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub param_types: Vec<Ty>,
    pub ret_type: Ty,
    pub type_params: Vec<TypeParam>,
}

impl FunctionInfo {
    pub fn new(name: impl Into<String>, param_types: Vec<Ty>, ret_type: Ty) -> Self {
        FunctionInfo {
            name: name.into(),
            param_types,
            ret_type,
            type_params: Vec::new(),
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<TypeParam>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    /// The signature as a first-class function type.
    pub fn fn_type(&self) -> Ty {
        Ty::func(self.param_types.clone(), self.ret_type.clone())
    }
}

/// The declared form of a named type: its shape and its type parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeInfo {
    pub name: String,
    pub ty: Ty,
    pub type_params: Vec<TypeParam>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        TypeInfo {
            name: name.into(),
            ty,
            type_params: Vec::new(),
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<TypeParam>) -> Self {
        self.type_params = type_params;
        self
    }

    /// The type as seen by users: the bare declaration, or the declaration
    /// applied to its own type variables when it has type parameters.
    pub fn applied(&self) -> Ty {
        if self.type_params.is_empty() {
            self.ty.clone()
        } else {
            Ty::generic(
                self.ty.clone(),
                self.type_params.iter().map(TypeParam::as_var).collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option_sum() -> Ty {
        Ty::Sum {
            name: "Option".into(),
            variants: vec![
                Variant::new("Some", vec![Ty::var("T")]),
                Variant::new("None", vec![]),
            ],
        }
    }

    #[test]
    fn display_follows_metadata_grammar() {
        assert_eq!(Ty::array(Ty::i32()).to_string(), "i32[]");
        assert_eq!(
            Ty::generic(option_sum(), vec![Ty::i32()]).to_string(),
            "Option<i32>"
        );
        assert_eq!(
            Ty::func(vec![Ty::i32(), Ty::string()], Ty::bool()).to_string(),
            "(i32, string) -> bool"
        );
        assert_eq!(Ty::MutRef(Box::new(Ty::i32())).to_string(), "&mut i32");
    }

    #[test]
    fn named_shapes_compare_by_name() {
        let a = Ty::Record {
            name: "Point".into(),
            fields: vec![Field::new("x", Ty::i32())],
        };
        let b = Ty::Record {
            name: "Point".into(),
            fields: vec![],
        };
        assert_eq!(a, b);
        assert_ne!(Ty::var("T"), Ty::i32());
        assert_eq!(Ty::var("T"), Ty::var("T"));
    }

    #[test]
    fn generic_name_is_base_name() {
        let ty = Ty::generic(option_sum(), vec![Ty::var("T")]);
        assert_eq!(ty.name(), "Option");
        assert_eq!(ty.concreteness(), 0);
        assert!(ty.has_type_vars());
        assert_eq!(Ty::generic(option_sum(), vec![Ty::i32()]).concreteness(), 1);
    }

    #[test]
    fn applied_wraps_type_params() {
        let info = TypeInfo::new("Option", option_sum()).with_type_params(vec![TypeParam::new("T")]);
        assert_eq!(info.applied().to_string(), "Option<T>");
        assert_eq!(TypeInfo::new("i32", Ty::i32()).applied(), Ty::i32());
    }
}
