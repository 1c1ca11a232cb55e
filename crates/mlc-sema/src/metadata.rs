//! Module metadata: the exported surface of a compiled module.
//!
//! A module's metadata lists its exported functions, record types and sum
//! types with every type written as a string. The loader parses those
//! strings back into [`Ty`] values and registers the declarations as
//! external, exported symbols; the generator produces metadata from a
//! lowered [`ir::Module`]. Reading and writing the JSON files themselves is
//! left to the caller, which plugs in through [`MetadataSource`].
//!
//! Type string grammar:
//!
//! ```text
//! type     := function | array | generic | ref | "(" type ")" | name
//! function := "(" [type ("," type)*] ")" "->" type
//! array    := type "[]"
//! generic  := name "<" type ("," type)* ">"
//! ref      := "&" type | "&mut " type
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constructors::ConstructorTable;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::ir;
use crate::registry::{FunctionRegistry, Registration, TypeRegistry, PRIMITIVE_TYPES};
use crate::ty::{Field, FunctionInfo, Ty, TypeInfo, TypeParam, Variant};

// ── Metadata structure ─────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub module_name: String,
    #[serde(default)]
    pub exports: Exports,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exports {
    pub functions: Vec<FunctionMeta>,
    pub types: Vec<TypeMeta>,
    pub sum_types: Vec<SumTypeMeta>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionMeta {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamMeta>,
    pub return_type: String,
    #[serde(default = "default_true")]
    pub is_exported: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// A record (or opaque) type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeMeta {
    pub name: String,
    #[serde(default = "default_record_kind")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<ParamMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SumTypeMeta {
    pub name: String,
    #[serde(default = "default_sum_kind")]
    pub kind: String,
    pub variants: Vec<VariantMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,
}

/// A variant is written as its bare name, or with its field types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantMeta {
    Name(String),
    Detailed { name: String, fields: Vec<String> },
}

impl VariantMeta {
    pub fn name(&self) -> &str {
        match self {
            VariantMeta::Name(name) | VariantMeta::Detailed { name, .. } => name,
        }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            VariantMeta::Name(_) => &[],
            VariantMeta::Detailed { fields, .. } => fields,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_record_kind() -> String {
    "record".to_string()
}

fn default_sum_kind() -> String {
    "sum".to_string()
}

impl ModuleMetadata {
    pub fn new(module_name: impl Into<String>) -> Self {
        ModuleMetadata {
            module_name: module_name.into(),
            exports: Exports::default(),
        }
    }

    pub fn from_json(content: &str) -> Result<ModuleMetadata, String> {
        serde_json::from_str(content).map_err(|e| format!("Failed to parse module metadata: {}", e))
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize module metadata: {}", e))
    }

    /// The exported surface of a lowered module.
    pub fn from_module(module: &ir::Module) -> Self {
        let mut meta = ModuleMetadata::new(module.name.clone());

        for func in module.functions().filter(|f| f.exported) {
            meta.exports.functions.push(FunctionMeta {
                name: func.name.clone(),
                params: func
                    .params
                    .iter()
                    .map(|p| ParamMeta {
                        name: p.name.clone(),
                        ty: p.ty.to_string(),
                    })
                    .collect(),
                return_type: func.ret_type.to_string(),
                is_exported: true,
                type_params: param_names(&func.type_params),
            });
        }

        for decl in module.types().filter(|t| t.exported) {
            let type_params = param_names(&decl.type_params);
            match &decl.ty {
                Ty::Record { fields, .. } => meta.exports.types.push(TypeMeta {
                    name: decl.name.clone(),
                    kind: "record".to_string(),
                    fields: fields
                        .iter()
                        .map(|f| ParamMeta {
                            name: f.name.clone(),
                            ty: f.ty.to_string(),
                        })
                        .collect(),
                    type_params,
                }),
                Ty::Opaque(_) => meta.exports.types.push(TypeMeta {
                    name: decl.name.clone(),
                    kind: "opaque".to_string(),
                    fields: Vec::new(),
                    type_params,
                }),
                Ty::Sum { variants, .. } => meta.exports.sum_types.push(SumTypeMeta {
                    name: decl.name.clone(),
                    kind: "sum".to_string(),
                    variants: variants.iter().map(variant_meta).collect(),
                    type_params,
                }),
                _ => {}
            }
        }
        meta
    }
}

fn param_names(params: &[TypeParam]) -> Vec<String> {
    params.iter().map(|p| p.name.clone()).collect()
}

fn variant_meta(variant: &Variant) -> VariantMeta {
    if variant.fields.is_empty() {
        VariantMeta::Name(variant.name.clone())
    } else {
        VariantMeta::Detailed {
            name: variant.name.clone(),
            fields: variant.fields.iter().map(Ty::to_string).collect(),
        }
    }
}

// ── Metadata sources ───────────────────────────────────────────────────

/// Supplies metadata for imported modules.
pub trait MetadataSource {
    /// `None` when nothing is known about `module_name`.
    fn load(&self, module_name: &str) -> Option<ModuleMetadata>;
}

/// Metadata kept in memory, keyed by module name.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadata {
    modules: FxHashMap<String, ModuleMetadata>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meta: ModuleMetadata) {
        self.modules.insert(meta.module_name.clone(), meta);
    }

    pub fn with(mut self, meta: ModuleMetadata) -> Self {
        self.insert(meta);
        self
    }
}

impl MetadataSource for InMemoryMetadata {
    fn load(&self, module_name: &str) -> Option<ModuleMetadata> {
        self.modules.get(module_name).cloned()
    }
}

// ── Type strings ───────────────────────────────────────────────────────

fn malformed(source: &str) -> CompileError {
    CompileError::new(
        ErrorKind::UnknownType,
        format!("Malformed type '{}' in module metadata", source),
    )
}

/// Index of the parenthesis closing the one at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested inside `<>`, `()` or `[]`.
/// The `>` of a `->` arrow does not close anything.
fn split_top_level(s: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut prev = '\0';
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' if prev == '-' => {}
            '>' | ')' | ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        prev = c;
    }
    if depth != 0 {
        return None;
    }
    let last = s[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    Some(parts)
}

fn is_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Parse a metadata type string. Names in `type_params` become type
/// variables; every other name is left as a by-name reference.
pub fn parse_type(source: &str, type_params: &[String]) -> SemaResult<Ty> {
    let s = source.trim();
    if s.is_empty() {
        return Err(malformed(source));
    }

    if s.starts_with('(') {
        let close = matching_paren(s, 0).ok_or_else(|| malformed(source))?;
        let rest = s[close + 1..].trim_start();
        if let Some(ret) = rest.strip_prefix("->") {
            let params = split_top_level(&s[1..close])
                .ok_or_else(|| malformed(source))?
                .into_iter()
                .map(|p| parse_type(p, type_params))
                .collect::<SemaResult<Vec<_>>>()?;
            return Ok(Ty::func(params, parse_type(ret, type_params)?));
        }
        if close == s.len() - 1 {
            return parse_type(&s[1..close], type_params);
        }
    }

    if let Some(elem) = s.strip_suffix("[]") {
        return Ok(Ty::array(parse_type(elem, type_params)?));
    }
    if let Some(inner) = s.strip_prefix("&mut ") {
        return Ok(Ty::MutRef(Box::new(parse_type(inner, type_params)?)));
    }
    if let Some(inner) = s.strip_prefix('&') {
        return Ok(Ty::Ref(Box::new(parse_type(inner, type_params)?)));
    }

    if let Some(open) = s.find('<') {
        let base = s[..open].trim();
        let inner = s[open + 1..].strip_suffix('>').ok_or_else(|| malformed(source))?;
        if !is_type_name(base) {
            return Err(malformed(source));
        }
        let args = split_top_level(inner)
            .filter(|args| !args.is_empty())
            .ok_or_else(|| malformed(source))?
            .into_iter()
            .map(|a| parse_type(a, type_params))
            .collect::<SemaResult<Vec<_>>>()?;
        if base != "Map" {
            return Ok(Ty::generic(Ty::prim(base), args));
        }
        return match <[Ty; 2]>::try_from(args) {
            Ok([k, v]) => Ok(Ty::Map(Box::new(k), Box::new(v))),
            Err(args) => Ok(Ty::generic(Ty::prim(base), args)),
        };
    }

    if s == "unit" {
        return Ok(Ty::Unit);
    }
    if type_params.iter().any(|p| p == s) {
        return Ok(Ty::var(s));
    }
    if is_type_name(s) {
        return Ok(Ty::prim(s));
    }
    Err(malformed(source))
}

// ── Loader ─────────────────────────────────────────────────────────────

/// Registers the contents of module metadata into the registries.
pub struct MetadataLoader<'a> {
    types: &'a mut TypeRegistry,
    functions: &'a mut FunctionRegistry,
    constructors: &'a mut ConstructorTable,
}

impl<'a> MetadataLoader<'a> {
    pub fn new(
        types: &'a mut TypeRegistry,
        functions: &'a mut FunctionRegistry,
        constructors: &'a mut ConstructorTable,
    ) -> Self {
        MetadataLoader {
            types,
            functions,
            constructors,
        }
    }

    /// Types first, so that function signatures can refer to them.
    pub fn load(&mut self, meta: &ModuleMetadata) -> SemaResult<()> {
        let reg = Registration::in_module(meta.module_name.clone())
            .exported(true)
            .external(true);

        for type_meta in &meta.exports.types {
            self.register_type(type_meta, &reg)?;
        }
        for sum_meta in &meta.exports.sum_types {
            self.register_sum_type(sum_meta, &reg)?;
        }
        for func_meta in &meta.exports.functions {
            self.register_function(func_meta, &reg)?;
        }

        debug!(
            module = %meta.module_name,
            functions = meta.exports.functions.len(),
            types = meta.exports.types.len(),
            sum_types = meta.exports.sum_types.len(),
            "loaded module metadata"
        );
        Ok(())
    }

    fn register_type(&mut self, meta: &TypeMeta, reg: &Registration) -> SemaResult<()> {
        let ty = match meta.kind.as_str() {
            "record" => {
                let fields = meta
                    .fields
                    .iter()
                    .map(|f| Ok(Field::new(f.name.clone(), self.parse(&f.ty, &meta.type_params)?)))
                    .collect::<SemaResult<Vec<_>>>()?;
                Ty::Record {
                    name: meta.name.clone(),
                    fields,
                }
            }
            "opaque" => Ty::Opaque(meta.name.clone()),
            _ => return Ok(()),
        };
        let info = TypeInfo::new(meta.name.clone(), ty).with_type_params(type_params(&meta.type_params));
        self.types.register(info, reg.clone());
        Ok(())
    }

    fn register_sum_type(&mut self, meta: &SumTypeMeta, reg: &Registration) -> SemaResult<()> {
        if meta.kind != "sum" {
            return Ok(());
        }
        let variants = meta
            .variants
            .iter()
            .map(|v| {
                let fields = v
                    .fields()
                    .iter()
                    .map(|f| self.parse(f, &meta.type_params))
                    .collect::<SemaResult<Vec<_>>>()?;
                Ok(Variant::new(v.name(), fields))
            })
            .collect::<SemaResult<Vec<_>>>()?;
        let info = TypeInfo::new(
            meta.name.clone(),
            Ty::Sum {
                name: meta.name.clone(),
                variants,
            },
        )
        .with_type_params(type_params(&meta.type_params));
        self.types.register(info.clone(), reg.clone());
        self.constructors.register_sum_type(&info, self.functions, reg);
        Ok(())
    }

    fn register_function(&mut self, meta: &FunctionMeta, reg: &Registration) -> SemaResult<()> {
        let params = meta
            .params
            .iter()
            .map(|p| self.parse(&p.ty, &meta.type_params))
            .collect::<SemaResult<Vec<_>>>()?;
        let ret = self.parse(&meta.return_type, &meta.type_params)?;
        let info = FunctionInfo::new(meta.name.clone(), params, ret)
            .with_type_params(type_params(&meta.type_params));
        self.functions.register(info, reg.clone());
        Ok(())
    }

    /// Parse, then swap by-name references to registered declarations for
    /// their declared shape.
    fn parse(&self, source: &str, type_params: &[String]) -> SemaResult<Ty> {
        parse_type(source, type_params).map(|ty| self.resolve_named(ty))
    }

    fn resolve_named(&self, ty: Ty) -> Ty {
        match ty {
            Ty::Primitive(name) if !PRIMITIVE_TYPES.contains(&name.as_str()) => {
                match self.types.lookup(&name) {
                    Some(declared) => declared.clone(),
                    None => Ty::Primitive(name),
                }
            }
            Ty::Array(elem) => Ty::array(self.resolve_named(*elem)),
            Ty::Generic(base, args) => Ty::generic(
                self.resolve_named(*base),
                args.into_iter().map(|a| self.resolve_named(a)).collect(),
            ),
            Ty::Function(params, ret) => Ty::func(
                params.into_iter().map(|p| self.resolve_named(p)).collect(),
                self.resolve_named(*ret),
            ),
            Ty::Ref(inner) => Ty::Ref(Box::new(self.resolve_named(*inner))),
            Ty::MutRef(inner) => Ty::MutRef(Box::new(self.resolve_named(*inner))),
            Ty::Map(k, v) => Ty::Map(Box::new(self.resolve_named(*k)), Box::new(self.resolve_named(*v))),
            other => other,
        }
    }
}

fn type_params(names: &[String]) -> Vec<TypeParam> {
    names.iter().map(TypeParam::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Ty {
        parse_type(s, &[]).unwrap()
    }

    #[test]
    fn parses_each_production() {
        assert_eq!(parse("i32"), Ty::i32());
        assert_eq!(parse("i32[]"), Ty::array(Ty::i32()));
        assert_eq!(parse("i32[][]"), Ty::array(Ty::array(Ty::i32())));
        assert_eq!(
            parse("Result<Option<i32>, string>"),
            Ty::generic(
                Ty::prim("Result"),
                vec![Ty::generic(Ty::prim("Option"), vec![Ty::i32()]), Ty::string()]
            )
        );
        assert_eq!(
            parse("(i32, string) -> bool"),
            Ty::func(vec![Ty::i32(), Ty::string()], Ty::bool())
        );
        assert_eq!(parse("() -> unit"), Ty::func(vec![], Ty::Unit));
        assert_eq!(
            parse("Map<string, i32[]>"),
            Ty::Map(Box::new(Ty::string()), Box::new(Ty::array(Ty::i32())))
        );
        assert_eq!(parse("&mut i32"), Ty::MutRef(Box::new(Ty::i32())));
    }

    #[test]
    fn round_trips_through_display() {
        for source in [
            "i32",
            "i32[]",
            "Result<Option<i32>, string>",
            "Map<string, i32[]>",
            "(i32, string) -> bool",
            "((i32) -> i32)[]",
            "&mut i32",
            "&string",
            "() -> unit",
        ] {
            let ty = parse(source);
            let printed = ty.to_string();
            assert_eq!(parse(&printed), ty, "{} printed as {}", source, printed);
        }
    }

    #[test]
    fn map_needs_exactly_two_arguments() {
        assert_eq!(
            parse("Map<string>"),
            Ty::generic(Ty::prim("Map"), vec![Ty::string()])
        );
        assert!(matches!(parse("Map<string, i32>"), Ty::Map(..)));
    }

    #[test]
    fn arrow_inside_generic_does_not_close_it() {
        let ty = parse("Box<(i32) -> i32, bool>");
        assert_eq!(ty.type_args().len(), 2);
        assert_eq!(ty.type_args()[0], Ty::func(vec![Ty::i32()], Ty::i32()));
    }

    #[test]
    fn parenthesized_function_array() {
        assert_eq!(
            parse("((i32) -> i32)[]"),
            Ty::array(Ty::func(vec![Ty::i32()], Ty::i32()))
        );
    }

    #[test]
    fn type_params_become_variables() {
        let ty = parse_type("Option<T>", &["T".to_string()]).unwrap();
        assert!(ty.type_args()[0].is_type_var());
    }

    #[test]
    fn malformed_strings_are_rejected() {
        for bad in ["", "Option<i32", "(i32 -> i32", "Vec<>", "1abc"] {
            let err = parse_type(bad, &[]).unwrap_err();
            assert_eq!(err.kind, ErrorKind::UnknownType, "{}", bad);
        }
    }

    #[test]
    fn variants_accept_bare_and_detailed_forms() {
        let json = r#"{
            "module_name": "Shapes",
            "exports": {
                "sum_types": [
                    {"name": "Shape", "kind": "sum",
                     "variants": ["Empty", {"name": "Circle", "fields": ["f32"]}]}
                ]
            }
        }"#;
        let meta = ModuleMetadata::from_json(json).unwrap();
        let variants = &meta.exports.sum_types[0].variants;
        assert_eq!(variants[0], VariantMeta::Name("Empty".to_string()));
        assert_eq!(variants[1].fields(), ["f32".to_string()]);
    }

    #[test]
    fn loader_registers_external_exported_symbols() {
        let json = r#"{
            "module_name": "Geometry/Shapes",
            "exports": {
                "functions": [
                    {"name": "area", "params": [{"name": "p", "type": "Point"}],
                     "return_type": "f32", "is_exported": true}
                ],
                "types": [
                    {"name": "Point", "kind": "record",
                     "fields": [{"name": "x", "type": "f32"}, {"name": "y", "type": "f32"}]}
                ],
                "sum_types": [
                    {"name": "Shape", "kind": "sum", "variants": ["Dot", "Blob"]}
                ]
            }
        }"#;
        let meta = ModuleMetadata::from_json(json).unwrap();
        let mut types = TypeRegistry::new();
        let mut functions = FunctionRegistry::new();
        let mut constructors = ConstructorTable::new();
        MetadataLoader::new(&mut types, &mut functions, &mut constructors)
            .load(&meta)
            .unwrap();

        let area = functions.fetch_entry("area").unwrap();
        assert!(area.exported && area.external);
        assert_eq!(area.namespace.as_deref(), Some("geometry::shapes"));
        assert!(area.value.param_types[0].record_fields().is_some());

        assert_eq!(types.resolve_member("Point", "y"), Some(&Ty::f32()));
        assert!(functions.is_registered("Dot"));
        assert_eq!(constructors.variants_of("Shape"), ["Dot".to_string(), "Blob".to_string()]);
    }

    #[test]
    fn missing_export_tables_default_to_empty() {
        let meta = ModuleMetadata::from_json(r#"{"module_name": "Empty"}"#).unwrap();
        assert_eq!(meta, ModuleMetadata::new("Empty"));
    }
}
