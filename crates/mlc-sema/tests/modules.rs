//! Integration tests for cross-module analysis.
//!
//! These tests exercise:
//! - Emitting module metadata and loading it back into a fresh pass
//! - Whole-module, aliased and selective imports
//! - Module-qualified calls (`Math.add(1, 2)`) and function references
//! - Qualified alias bookkeeping in the registries
//! - Rendering errors and reading configuration

use mlc_sema::ast::{
    BinaryOp, Expr, ExprKind, FuncDecl, Import, Item, Module, Param, TypeDecl, TypeDeclBody,
    TypeExpr, TypeParam, VariantDecl,
};
use mlc_sema::diagnostics::render_diagnostic;
use mlc_sema::{
    compile_module, ErrorKind, InMemoryMetadata, Lowering, ModuleMetadata, SemaConfig, SemaResult,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn add_decl() -> FuncDecl {
    FuncDecl::new(
        "add",
        vec![
            Param::new("a", TypeExpr::named("i32")),
            Param::new("b", TypeExpr::named("i32")),
        ],
        Some(TypeExpr::named("i32")),
        Expr::binary(BinaryOp::Add, Expr::var("a"), Expr::var("b")),
    )
    .exported()
}

fn shape_decl() -> TypeDecl {
    TypeDecl::new(
        "Shape",
        vec![],
        TypeDeclBody::Sum(vec![
            VariantDecl {
                name: "Circle".into(),
                fields: vec![TypeExpr::named("f64")],
            },
            VariantDecl {
                name: "Dot".into(),
                fields: vec![],
            },
        ]),
    )
    .exported()
}

fn math_module() -> Module {
    Module {
        name: "Math".into(),
        imports: Vec::new(),
        items: vec![Item::Type(shape_decl()), Item::Func(add_decl())],
    }
}

fn math_metadata() -> ModuleMetadata {
    let (_, meta) = compile_module(SemaConfig::default(), &math_module()).unwrap();
    meta
}

fn import(module: &str, items: &[&str], alias: Option<&str>) -> Import {
    Import {
        module: module.into(),
        items: items.iter().map(|s| s.to_string()).collect(),
        alias: alias.map(str::to_string),
        origin: None,
    }
}

fn main_with(imports: Vec<Import>, body: Expr) -> Module {
    Module {
        name: "main".into(),
        imports,
        items: vec![Item::Func(FuncDecl::new(
            "main",
            vec![],
            Some(TypeExpr::named("i32")),
            body,
        ))],
    }
}

fn lower_with_math(module: &Module) -> SemaResult<(mlc_sema::ir::Module, Lowering)> {
    let mut cx = Lowering::new(SemaConfig::default())
        .with_metadata_source(InMemoryMetadata::new().with(math_metadata()));
    let ir = cx.lower_module(module)?;
    Ok((ir, cx))
}

fn math_add(args: Vec<Expr>) -> Expr {
    Expr::call(Expr::member(Expr::var("Math"), "add"), args)
}

// ── Metadata ───────────────────────────────────────────────────────────

#[test]
fn emitted_metadata_lists_exports() {
    let meta = math_metadata();
    assert_eq!(meta.module_name, "Math");

    let add = &meta.exports.functions[0];
    assert_eq!(add.name, "add");
    let params: Vec<&str> = add.params.iter().map(|p| p.ty.as_str()).collect();
    assert_eq!(params, ["i32", "i32"]);
    assert_eq!(add.return_type, "i32");

    let shape = &meta.exports.sum_types[0];
    let variants: Vec<&str> = shape.variants.iter().map(|v| v.name()).collect();
    assert_eq!(variants, ["Circle", "Dot"]);
    assert_eq!(shape.variants[0].fields(), ["f64".to_string()]);
    assert!(shape.variants[1].fields().is_empty());
}

#[test]
fn metadata_survives_json() {
    let meta = math_metadata();
    let json = meta.to_json().unwrap();
    let back = ModuleMetadata::from_json(&json).unwrap();
    assert_eq!(back, meta);
}

#[test]
fn handwritten_metadata_is_accepted() {
    let json = r#"{
        "module_name": "Std/Collections",
        "exports": {
            "functions": [
                {
                    "name": "first",
                    "params": [{ "name": "xs", "type": "T[]" }],
                    "return_type": "Option<T>",
                    "type_params": ["T"]
                }
            ],
            "sum_types": [
                { "name": "Option", "variants": [{ "name": "Some", "fields": ["T"] }, "None"], "type_params": ["T"] }
            ]
        }
    }"#;
    let meta = ModuleMetadata::from_json(json).unwrap();
    assert!(meta.exports.functions[0].is_exported);
    assert!(meta.exports.types.is_empty());

    let mut cx = Lowering::new(SemaConfig::default()).with_metadata_source(InMemoryMetadata::new().with(meta));
    let module = main_with(
        vec![import("Std/Collections", &[], None)],
        Expr::match_expr(
            Expr::call(
                Expr::member(Expr::var("Collections"), "first"),
                vec![Expr::new(ExprKind::Array(vec![Expr::int(1)]))],
            ),
            vec![
                mlc_sema::ast::MatchArm::new(
                    mlc_sema::ast::Pattern::ctor("Some", vec![mlc_sema::ast::Pattern::bind("x")]),
                    Expr::var("x"),
                ),
                mlc_sema::ast::MatchArm::new(mlc_sema::ast::Pattern::bind("None"), Expr::int(0)),
            ],
        ),
    );
    let ir = cx.lower_module(&module).unwrap();
    let body = ir.function("main").unwrap().body.as_ref().unwrap();
    assert_eq!(body.ty.to_string(), "i32");
    assert!(cx.constructors.is_constructor("Some"));
}

#[test]
fn malformed_metadata_is_a_parse_error() {
    let err = ModuleMetadata::from_json("{ \"exports\": 3 }").unwrap_err();
    assert!(err.starts_with("Failed to parse module metadata"), "{}", err);
}

// ── Imports ────────────────────────────────────────────────────────────

#[test]
fn module_qualified_call_resolves_to_the_import() {
    let module = main_with(
        vec![import("Math", &[], None)],
        math_add(vec![Expr::int(1), Expr::int(2)]),
    );
    let (ir, cx) = lower_with_math(&module).unwrap();

    let body = ir.function("main").unwrap().body.as_ref().unwrap();
    assert_eq!(body.ty.to_string(), "i32");
    assert!(matches!(
        &body.kind,
        mlc_sema::ir::ExprKind::Call { callee: mlc_sema::ir::Callee::Function(name), .. } if name == "add"
    ));

    let entry = cx.functions.fetch_entry("add").unwrap();
    assert!(entry.external);
    assert!(entry.exported);
    assert_eq!(entry.module_name.as_deref(), Some("Math"));
}

#[test]
fn module_call_arguments_are_checked() {
    let module = main_with(
        vec![import("Math", &[], None)],
        math_add(vec![Expr::int(1), Expr::str("two")]),
    );
    let err = lower_with_math(&module).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
    insta::assert_snapshot!(err.message, @"argument 2 of 'Math.add' expected i32, got string");
}

#[test]
fn aliased_import_registers_both_keys() {
    let module = main_with(
        vec![import("Math", &[], Some("M"))],
        Expr::call(Expr::member(Expr::var("M"), "add"), vec![Expr::int(1), Expr::int(2)]),
    );
    let (_, cx) = lower_with_math(&module).unwrap();

    let mut aliases = cx.functions.aliases_for("add").to_vec();
    aliases.sort();
    assert_eq!(aliases, ["M.add", "Math.add"]);
    assert_eq!(cx.functions.canonical_name("M.add"), Some("add"));
}

#[test]
fn selective_import_of_a_missing_name_fails() {
    let module = main_with(vec![import("Math", &["mul"], None)], Expr::int(0));
    let err = lower_with_math(&module).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownIdentifier);
    insta::assert_snapshot!(err.message, @"Module 'Math' does not export 'mul'");
}

#[test]
fn selective_import_may_name_types() {
    let module = main_with(vec![import("Math", &["add", "Shape"], None)], Expr::int(0));
    assert!(lower_with_math(&module).is_ok());
}

#[test]
fn unknown_modules_are_ignored() {
    let module = main_with(vec![import("Nowhere", &["thing"], None)], Expr::int(0));
    assert!(lower_with_math(&module).is_ok());
}

#[test]
fn module_function_can_be_referenced_as_a_value() {
    let module = Module {
        name: "main".into(),
        imports: vec![import("Math", &[], None)],
        items: vec![Item::Func(FuncDecl::new(
            "pick",
            vec![],
            Some(TypeExpr::Function(
                vec![TypeExpr::named("i32"), TypeExpr::named("i32")],
                Box::new(TypeExpr::named("i32")),
            )),
            Expr::member(Expr::var("Math"), "add"),
        ))],
    };
    let (ir, _) = lower_with_math(&module).unwrap();
    let body = ir.function("pick").unwrap().body.as_ref().unwrap();
    assert_eq!(body.ty.to_string(), "(i32, i32) -> i32");
}

#[test]
fn generic_declarations_keep_their_parameters() {
    let module = Module {
        name: "Std/Box".into(),
        imports: Vec::new(),
        items: vec![
            Item::Type(
                TypeDecl::new(
                    "Boxed",
                    vec![TypeParam::new("T")],
                    TypeDeclBody::Record(vec![mlc_sema::ast::FieldDecl {
                        name: "value".into(),
                        ty: TypeExpr::named("T"),
                    }]),
                )
                .exported(),
            ),
            Item::Func(
                FuncDecl::new(
                    "unbox",
                    vec![Param::new(
                        "b",
                        TypeExpr::generic("Boxed", vec![TypeExpr::named("T")]),
                    )],
                    Some(TypeExpr::named("T")),
                    Expr::member(Expr::var("b"), "value"),
                )
                .with_type_params(vec![TypeParam::new("T")])
                .exported(),
            ),
        ],
    };
    let (ir, meta) = compile_module(SemaConfig::default(), &module).unwrap();
    assert_eq!(ir.namespace.as_deref(), Some("std::box"));
    assert_eq!(meta.exports.types[0].type_params, ["T"]);
    assert_eq!(meta.exports.functions[0].return_type, "T");
    assert_eq!(meta.exports.functions[0].params[0].ty, "Boxed<T>");
}

// ── Diagnostics & configuration ────────────────────────────────────────

#[test]
fn rendered_errors_carry_code_and_label() {
    let source = "fn main() -> i32 { Math.add(1, \"two\") }";
    let start = source.find("Math.add").unwrap() as u32;
    let end = source.rfind(')').unwrap() as u32 + 1;
    let range = rowan::TextRange::new(start.into(), end.into());
    let module = main_with(
        vec![import("Math", &[], None)],
        math_add(vec![Expr::int(1), Expr::str("two")]).at(range),
    );
    let err = lower_with_math(&module).unwrap_err();
    assert_eq!(err.origin, Some(range));

    let output = render_diagnostic(&err, source, "main.mlc");
    assert!(output.contains("E0005"), "{}", output);
    assert!(output.contains("expected i32, got string"));
}

#[test]
fn configuration_comes_from_the_sema_table() {
    let config = SemaConfig::from_toml_str(
        r#"
[package]
name = "demo"

[sema]
check_exhaustiveness = false
analyze_effects = false
"#,
    )
    .unwrap();
    assert!(!config.check_exhaustiveness);
    assert!(!config.analyze_effects);

    let (ir, _) = compile_module(config, &math_module()).unwrap();
    assert!(ir.function("add").unwrap().effects.is_empty());
}
