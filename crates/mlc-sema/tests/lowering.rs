//! Integration tests for lowering whole modules.
//!
//! These tests exercise:
//! - Generic calls resolved through constructors and the constraint solver
//! - Match typing and exhaustiveness over declared sum types
//! - Statement lowering (let, assignment, loops, returns)
//! - Effect tags on lowered functions
//! - Extending the rule engine with a custom rule

use mlc_sema::ast::{
    BinaryOp, Expr, FuncDecl, Item, MatchArm, Module, Param, Pattern, Stmt, StmtKind, TypeDecl,
    TypeDeclBody, TypeExpr, TypeParam, VariantDecl,
};
use mlc_sema::ir;
use mlc_sema::registry::Effect;
use mlc_sema::rules::{Lowered, Node, Rule, Stage};
use mlc_sema::{lower_module, CompileError, ErrorKind, Lowering, SemaConfig, SemaResult};

// ── Helpers ────────────────────────────────────────────────────────────

fn module(items: Vec<Item>) -> Module {
    Module {
        name: "main".into(),
        imports: Vec::new(),
        items,
    }
}

fn variant(name: &str, fields: Vec<TypeExpr>) -> VariantDecl {
    VariantDecl {
        name: name.into(),
        fields,
    }
}

fn option_decl() -> Item {
    Item::Type(TypeDecl::new(
        "Option",
        vec![TypeParam::new("T")],
        TypeDeclBody::Sum(vec![
            variant("Some", vec![TypeExpr::named("T")]),
            variant("None", vec![]),
        ]),
    ))
}

fn result_decl() -> Item {
    Item::Type(TypeDecl::new(
        "Result",
        vec![TypeParam::new("T"), TypeParam::new("E")],
        TypeDeclBody::Sum(vec![
            variant("Ok", vec![TypeExpr::named("T")]),
            variant("Err", vec![TypeExpr::named("E")]),
        ]),
    ))
}

/// `fn unwrap_or<T, E>(r: Result<T, E>, d: T) -> T { match r { Ok(v) => v, Err(e) => d } }`
fn unwrap_or_decl() -> Item {
    let body = Expr::match_expr(
        Expr::var("r"),
        vec![
            MatchArm::new(Pattern::ctor("Ok", vec![Pattern::bind("v")]), Expr::var("v")),
            MatchArm::new(Pattern::ctor("Err", vec![Pattern::bind("e")]), Expr::var("d")),
        ],
    );
    Item::Func(
        FuncDecl::new(
            "unwrap_or",
            vec![
                Param::new(
                    "r",
                    TypeExpr::generic("Result", vec![TypeExpr::named("T"), TypeExpr::named("E")]),
                ),
                Param::new("d", TypeExpr::named("T")),
            ],
            Some(TypeExpr::named("T")),
            body,
        )
        .with_type_params(vec![TypeParam::new("T"), TypeParam::new("E")]),
    )
}

fn main_returning(ret: &str, body: Expr) -> Item {
    Item::Func(FuncDecl::new("main", vec![], Some(TypeExpr::named(ret)), body))
}

fn lower(items: Vec<Item>) -> SemaResult<(ir::Module, Lowering)> {
    lower_module(SemaConfig::default(), &module(items))
}

fn body_type(ir: &ir::Module, name: &str) -> String {
    let func = ir.function(name).expect("function should be lowered");
    func.body.as_ref().expect("function should have a body").ty.to_string()
}

// ── Generic calls ──────────────────────────────────────────────────────

#[test]
fn unwrap_or_with_matching_default_is_i32() {
    let call = Expr::call_named(
        "unwrap_or",
        vec![Expr::call_named("Ok", vec![Expr::int(5)]), Expr::int(0)],
    );
    let (ir, _) = lower(vec![result_decl(), unwrap_or_decl(), main_returning("i32", call)]).unwrap();
    assert_eq!(body_type(&ir, "main"), "i32");
}

#[test]
fn unwrap_or_with_string_default_is_a_type_error() {
    let call = Expr::call_named(
        "unwrap_or",
        vec![Expr::call_named("Ok", vec![Expr::int(5)]), Expr::str("x")],
    );
    let err = lower(vec![result_decl(), unwrap_or_decl(), main_returning("i32", call)]).unwrap_err();
    assert!(err.is_type_error(), "{:?}", err);
    insta::assert_snapshot!(err.message, @"Type variable T bound to both i32 and string");
}

#[test]
fn identity_returns_its_argument_type() {
    let identity = FuncDecl::new(
        "identity",
        vec![Param::new("x", TypeExpr::named("T"))],
        Some(TypeExpr::named("T")),
        Expr::var("x"),
    )
    .with_type_params(vec![TypeParam::new("T")]);
    let (ir, _) = lower(vec![
        Item::Func(identity),
        main_returning("string", Expr::call_named("identity", vec![Expr::str("hi")])),
    ])
    .unwrap();
    assert_eq!(body_type(&ir, "main"), "string");
}

#[test]
fn constrained_generic_rejects_strings() {
    let double = FuncDecl::new(
        "double",
        vec![Param::new("x", TypeExpr::named("T"))],
        Some(TypeExpr::named("T")),
        Expr::binary(BinaryOp::Add, Expr::var("x"), Expr::var("x")),
    )
    .with_type_params(vec![TypeParam::constrained("T", "Numeric")]);
    let err = lower(vec![
        Item::Func(double),
        main_returning("string", Expr::call_named("double", vec![Expr::str("a")])),
    ])
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConstraint);
}

#[test]
fn unknown_callee_is_an_unknown_identifier() {
    let err = lower(vec![main_returning("i32", Expr::call_named("missing", vec![]))]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownIdentifier);
    insta::assert_snapshot!(err.message, @"Unknown identifier 'missing' (in scope: <empty>)");
}

#[test]
fn wrong_argument_count_is_reported() {
    let add = FuncDecl::new(
        "add",
        vec![
            Param::new("a", TypeExpr::named("i32")),
            Param::new("b", TypeExpr::named("i32")),
        ],
        Some(TypeExpr::named("i32")),
        Expr::binary(BinaryOp::Add, Expr::var("a"), Expr::var("b")),
    );
    let err = lower(vec![
        Item::Func(add),
        main_returning("i32", Expr::call_named("add", vec![Expr::int(1)])),
    ])
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArityMismatch);
    insta::assert_snapshot!(err.message, @"Function 'add' expects 2 argument(s), got 1");
}

// ── Matches ────────────────────────────────────────────────────────────

fn describe(arms: Vec<MatchArm>) -> Item {
    let body = Expr::match_expr(Expr::var("o"), arms);
    Item::Func(FuncDecl::new(
        "describe",
        vec![Param::new(
            "o",
            TypeExpr::generic("Option", vec![TypeExpr::named("i32")]),
        )],
        Some(TypeExpr::named("i32")),
        body,
    ))
}

fn some_arm() -> MatchArm {
    MatchArm::new(Pattern::ctor("Some", vec![Pattern::bind("x")]), Expr::var("x"))
}

#[test]
fn match_covering_every_variant_is_accepted() {
    let arms = vec![some_arm(), MatchArm::new(Pattern::bind("None"), Expr::int(0))];
    let (ir, _) = lower(vec![option_decl(), describe(arms)]).unwrap();
    assert_eq!(body_type(&ir, "describe"), "i32");
}

#[test]
fn match_missing_a_variant_is_rejected() {
    let err = lower(vec![option_decl(), describe(vec![some_arm()])]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NonExhaustiveMatch);
    insta::assert_snapshot!(err.message, @"Non-exhaustive match: missing variant(s) None");
}

#[test]
fn wildcard_arm_makes_a_match_exhaustive() {
    let arms = vec![some_arm(), MatchArm::new(Pattern::Wildcard, Expr::int(0))];
    assert!(lower(vec![option_decl(), describe(arms)]).is_ok());
}

#[test]
fn exhaustiveness_can_be_switched_off() {
    let config = SemaConfig {
        check_exhaustiveness: false,
        ..SemaConfig::default()
    };
    let result = lower_module(config, &module(vec![option_decl(), describe(vec![some_arm()])]));
    assert!(result.is_ok());
}

#[test]
fn match_arms_must_agree() {
    let arms = vec![some_arm(), MatchArm::new(Pattern::bind("None"), Expr::str("none"))];
    let err = lower(vec![option_decl(), describe(arms)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
    insta::assert_snapshot!(err.message, @"match arm 2 expected i32, got string");
}

// ── Statements ─────────────────────────────────────────────────────────

#[test]
fn statements_bind_and_check_types() {
    let body = Expr::block(
        vec![
            Stmt::new(StmtKind::Let {
                name: "total".into(),
                mutable: true,
                ty: Some(TypeExpr::named("i32")),
                value: Expr::int(0),
            }),
            Stmt::new(StmtKind::For {
                var: "n".into(),
                iterable: Expr::new(mlc_sema::ast::ExprKind::Array(vec![
                    Expr::int(1),
                    Expr::int(2),
                ])),
                body: vec![Stmt::new(StmtKind::Assign {
                    target: "total".into(),
                    value: Expr::binary(BinaryOp::Add, Expr::var("total"), Expr::var("n")),
                })],
            }),
        ],
        Some(Expr::var("total")),
    );
    let (ir, _) = lower(vec![main_returning("i32", body)]).unwrap();
    let main = ir.function("main").unwrap();
    let Some(ir::Expr {
        kind: ir::ExprKind::Block { stmts, .. },
        ..
    }) = &main.body
    else {
        panic!("expected a block body");
    };
    assert!(matches!(&stmts[1].kind, ir::StmtKind::For { var_ty, .. } if var_ty.to_string() == "i32"));
}

#[test]
fn annotated_let_rejects_other_types() {
    let body = Expr::block(
        vec![Stmt::let_("x", Some(TypeExpr::named("i32")), Expr::str("no"))],
        None,
    );
    let err = lower(vec![main_returning("void", body)]).unwrap_err();
    insta::assert_snapshot!(err.message, @"let binding 'x' expected i32, got string");
}

#[test]
fn assignment_to_an_undeclared_name_fails() {
    let body = Expr::block(
        vec![Stmt::new(StmtKind::Assign {
            target: "ghost".into(),
            value: Expr::int(1),
        })],
        None,
    );
    let err = lower(vec![main_returning("void", body)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownIdentifier);
}

#[test]
fn non_boolean_conditions_are_rejected() {
    let body = Expr::block(
        vec![Stmt::new(StmtKind::While {
            cond: Expr::int(1),
            body: vec![Stmt::new(StmtKind::Break)],
        })],
        None,
    );
    let err = lower(vec![main_returning("void", body)]).unwrap_err();
    insta::assert_snapshot!(err.message, @"while condition expected bool, got i32");
}

#[test]
fn return_is_checked_against_the_function() {
    let body = Expr::block(vec![Stmt::new(StmtKind::Return(Some(Expr::str("s"))))], None);
    let err = lower(vec![main_returning("i32", body)]).unwrap_err();
    insta::assert_snapshot!(err.message, @"return value expected i32, got string");
}

#[test]
fn iterating_a_number_is_an_invalid_operand() {
    let body = Expr::block(
        vec![Stmt::new(StmtKind::For {
            var: "x".into(),
            iterable: Expr::int(3),
            body: vec![],
        })],
        None,
    );
    let err = lower(vec![main_returning("void", body)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidOperand);
}

// ── Effects ────────────────────────────────────────────────────────────

#[test]
fn literal_functions_are_pure_and_constexpr() {
    let answer = FuncDecl::new("answer", vec![], Some(TypeExpr::named("i32")), Expr::int(42));
    let shout = FuncDecl::new(
        "shout",
        vec![Param::new("s", TypeExpr::named("string"))],
        None,
        Expr::call_named("print", vec![Expr::var("s")]),
    );
    let (ir, cx) = lower(vec![Item::Func(answer), Item::Func(shout)]).unwrap();

    assert_eq!(ir.function("answer").unwrap().effects, vec![Effect::Pure, Effect::Constexpr]);
    assert_eq!(cx.functions.effects("answer"), &[Effect::Pure, Effect::Constexpr]);
    assert!(ir.function("shout").unwrap().effects.is_empty());
}

// ── Rule engine ────────────────────────────────────────────────────────

/// Lowers `todo` to an `i32` zero instead of looking it up.
struct TodoRule;

impl Rule for TodoRule {
    fn name(&self) -> &'static str {
        "todo"
    }

    fn applies(&self, node: &Node<'_>, _cx: &Lowering) -> bool {
        matches!(node.as_expr(), Some(mlc_sema::ast::ExprKind::Var(name)) if name == "todo")
    }

    fn apply(&self, node: &Node<'_>, _cx: &mut Lowering) -> SemaResult<Lowered> {
        Ok(Lowered::Expr(ir::Expr::new(
            ir::ExprKind::Literal(mlc_sema::ast::Literal::Int(0)),
            mlc_sema::Ty::i32(),
            node.origin(),
        )))
    }
}

#[test]
fn custom_rules_take_precedence() {
    let items = vec![main_returning("i32", Expr::var("todo"))];

    let err = lower(items.clone()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownIdentifier);

    let mut engine = mlc_sema::RuleEngine::new();
    engine.register(Stage::Expression, TodoRule);
    mlc_sema::rules::register_defaults(&mut engine);
    assert_eq!(engine.rules(Stage::Expression)[0].name(), "todo");
    assert!(engine.has_rule(Stage::Expression, "variable"));

    let mut cx = Lowering::with_engine(SemaConfig::default(), engine);
    let ir = cx.lower_module(&module(items)).unwrap();
    assert_eq!(body_type(&ir, "main"), "i32");
}

#[test]
fn errors_keep_the_innermost_origin() {
    let range = rowan::TextRange::new(10.into(), 14.into());
    let body = Expr::var("nope").at(range);
    let err: CompileError = lower(vec![main_returning("i32", body)]).unwrap_err();
    assert_eq!(err.origin, Some(range));
}
