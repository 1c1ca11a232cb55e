//! The lowering driver: AST in, typed IR out.
//!
//! `Lowering` owns all state of one compilation pass (registries,
//! constructor table, variable scopes, diagnostics bus, configuration) and
//! hands every node to the rule engine. Rules call back into the driver to
//! lower their children, resolve written types and manage scopes.

use std::fmt;
use std::rc::Rc;

use mlc_common::events::EventBus;
use mlc_common::module_path::{derive_namespace, qualified_aliases, short_name};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::ast::{self, Origin, TypeExpr};
use crate::checker::{normalize_type_params, validate_type_constraints, TypeChecker};
use crate::config::SemaConfig;
use crate::constructors::ConstructorTable;
use crate::env::TypeEnv;
use crate::error::{CompileError, ErrorKind, SemaResult};
use crate::infer::{literal_type, TypeInference};
use crate::ir;
use crate::match_analyzer::MatchContext;
use crate::metadata::{MetadataLoader, MetadataSource};
use crate::registry::{FunctionRegistry, Registration, TypeRegistry};
use crate::rules::{default_engine, Lowered, Node, RuleEngine, Stage};
use crate::ty::{FunctionInfo, Ty, TypeInfo, TypeParam};

pub struct Lowering {
    pub types: TypeRegistry,
    pub functions: FunctionRegistry,
    pub constructors: ConstructorTable,
    pub env: TypeEnv,
    pub events: EventBus,
    pub config: SemaConfig,
    engine: Rc<RuleEngine>,
    metadata: Option<Box<dyn MetadataSource>>,
    module_name: String,
    namespace: Option<String>,
    /// Type parameters in scope, innermost last.
    type_params: Vec<TypeParam>,
    /// Declared return types of the enclosing functions and lambdas.
    return_types: Vec<Ty>,
    loaded_modules: FxHashSet<String>,
}

impl Lowering {
    pub fn new(config: SemaConfig) -> Self {
        Self::with_engine(config, default_engine())
    }

    pub fn with_engine(config: SemaConfig, engine: RuleEngine) -> Self {
        Lowering {
            types: TypeRegistry::new(),
            functions: FunctionRegistry::new(),
            constructors: ConstructorTable::new(),
            env: TypeEnv::new(),
            events: EventBus::with_min_level(config.event_level),
            config,
            engine: Rc::new(engine),
            metadata: None,
            module_name: String::new(),
            namespace: None,
            type_params: Vec::new(),
            return_types: Vec::new(),
            loaded_modules: FxHashSet::default(),
        }
    }

    pub fn with_metadata_source(mut self, source: impl MetadataSource + 'static) -> Self {
        self.metadata = Some(Box::new(source));
        self
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn inference(&self) -> TypeInference<'_> {
        TypeInference::new(&self.env, &self.types, &self.functions, &self.events)
    }

    pub fn checker(&self) -> TypeChecker<'_> {
        TypeChecker::new(&self.events)
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Registration metadata for a declaration of the current module.
    pub fn registration(&self, exported: bool, external: bool, origin: Origin) -> Registration {
        Registration {
            module_name: Some(self.module_name.clone()),
            namespace: self.namespace.clone(),
            exported,
            external,
            origin,
        }
    }

    pub fn current_return_type(&self) -> Option<&Ty> {
        self.return_types.last()
    }

    pub fn type_param(&self, name: &str) -> Option<&TypeParam> {
        self.type_params.iter().rev().find(|p| p.name == name)
    }

    // ── Modules ────────────────────────────────────────────────────────

    pub fn lower_module(&mut self, module: &ast::Module) -> SemaResult<ir::Module> {
        self.module_name = module.name.clone();
        self.namespace = derive_namespace(Some(&module.name));
        debug!(module = %module.name, namespace = ?self.namespace, "lowering module");

        for import in &module.imports {
            self.process_import(import)?;
        }

        // Placeholders first, so declarations may refer to each other.
        for item in &module.items {
            if let ast::Item::Type(decl) = item {
                let info = TypeInfo::new(decl.name.clone(), Ty::Opaque(decl.name.clone()))
                    .with_type_params(decl.type_params.clone());
                let reg = self.registration(decl.exported, false, decl.origin);
                self.types.register(info, reg);
            }
        }

        let mut lowered = Vec::with_capacity(module.items.len());
        for (i, item) in module.items.iter().enumerate() {
            if let ast::Item::Type(decl) = item {
                let decl = self.dispatch(Stage::TypeDecl, &Node::TypeDecl(decl))?.into_type_decl()?;
                lowered.push((i, ir::Item::Type(decl)));
            }
        }

        for item in &module.items {
            if let ast::Item::Func(decl) = item {
                self.declare_function(decl)?;
            }
        }
        for (i, item) in module.items.iter().enumerate() {
            if let ast::Item::Func(decl) = item {
                let func = self.dispatch(Stage::Function, &Node::Function(decl))?.into_function()?;
                lowered.push((i, ir::Item::Func(func)));
            }
        }
        lowered.sort_by_key(|(i, _)| *i);

        Ok(ir::Module {
            name: module.name.clone(),
            namespace: self.namespace.clone(),
            items: lowered.into_iter().map(|(_, item)| item).collect(),
        })
    }

    fn process_import(&mut self, import: &ast::Import) -> SemaResult<()> {
        if !self.loaded_modules.contains(&import.module) {
            if let Some(meta) = self.metadata.as_deref().and_then(|s| s.load(&import.module)) {
                MetadataLoader::new(&mut self.types, &mut self.functions, &mut self.constructors)
                    .load(&meta)
                    .map_err(|e| e.with_origin(import.origin))?;
            }
            self.loaded_modules.insert(import.module.clone());
        }

        let exported: Vec<String> = self
            .functions
            .functions_in_module(&import.module)
            .into_iter()
            .filter(|e| e.exported)
            .map(|e| e.name.clone())
            .collect();
        if exported.is_empty() && self.types.types_in_module(&import.module, true).is_empty() {
            trace!(module = %import.module, "nothing known about imported module");
            return Ok(());
        }

        let mut names = Vec::new();
        if import.items.is_empty() {
            names = exported;
        } else {
            for item in &import.items {
                let is_type = self
                    .types
                    .types_in_module(&import.module, true)
                    .iter()
                    .any(|e| &e.name == item);
                if exported.contains(item) {
                    names.push(item.clone());
                } else if !is_type {
                    return Err(CompileError::new(
                        ErrorKind::UnknownIdentifier,
                        format!("Module '{}' does not export '{}'", import.module, item),
                    )
                    .with_origin(import.origin));
                }
            }
        }

        let module = short_name(&import.module);
        for name in &names {
            for key in qualified_aliases(name, module, import.alias.as_deref()) {
                self.functions
                    .register_alias(&key, name)
                    .map_err(|e| CompileError::from(e).with_origin(import.origin))?;
            }
        }
        debug!(module = %import.module, count = names.len(), "imported functions");
        Ok(())
    }

    // ── Declarations ───────────────────────────────────────────────────

    /// Resolve a function's signature with its type parameters in scope.
    pub fn function_signature(&mut self, decl: &ast::FuncDecl) -> SemaResult<FunctionInfo> {
        let type_params = normalize_type_params(&decl.type_params).map_err(|e| e.with_origin(decl.origin))?;
        self.with_type_params(&type_params, |cx| {
            let params = decl
                .params
                .iter()
                .map(|p| cx.resolve_type_expr(&p.ty, decl.origin))
                .collect::<SemaResult<Vec<_>>>()?;
            let ret = match &decl.ret_type {
                Some(te) => cx.resolve_type_expr(te, decl.origin)?,
                None => Ty::void(),
            };
            Ok(FunctionInfo::new(decl.name.clone(), params, ret).with_type_params(type_params.clone()))
        })
    }

    /// Register a function's signature ahead of lowering any body.
    pub fn declare_function(&mut self, decl: &ast::FuncDecl) -> SemaResult<FunctionInfo> {
        let info = self.function_signature(decl)?;
        let reg = self.registration(decl.exported, decl.external || decl.body.is_none(), decl.origin);
        self.functions.register(info.clone(), reg);
        Ok(info)
    }

    /// Turn a written type into a `Ty`.
    pub fn resolve_type_expr(&self, te: &TypeExpr, origin: Origin) -> SemaResult<Ty> {
        match te {
            TypeExpr::Named(name) => {
                if let Some(param) = self.type_param(name) {
                    return Ok(param.as_var());
                }
                match name.as_str() {
                    "auto" => return Ok(Ty::auto()),
                    "unit" => return Ok(Ty::Unit),
                    _ => {}
                }
                self.types
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| CompileError::unknown_type(name).with_origin(origin))
            }
            TypeExpr::Generic(name, args) => {
                let args = args
                    .iter()
                    .map(|a| self.resolve_type_expr(a, origin))
                    .collect::<SemaResult<Vec<_>>>()?;
                let Some(info) = self.types.lookup_info(name) else {
                    if name == "Map" && args.len() == 2 {
                        let mut args = args.into_iter();
                        if let (Some(k), Some(v)) = (args.next(), args.next()) {
                            return Ok(Ty::Map(Box::new(k), Box::new(v)));
                        }
                    }
                    return Err(CompileError::unknown_type(name).with_origin(origin));
                };
                if !info.type_params.is_empty() && info.type_params.len() != args.len() {
                    return Err(CompileError::new(
                        ErrorKind::ArityMismatch,
                        format!(
                            "Type '{}' expects {} type argument(s), got {}",
                            name,
                            info.type_params.len(),
                            args.len()
                        ),
                    )
                    .with_origin(origin));
                }
                validate_type_constraints(name, &info.type_params, &args)
                    .map_err(|e| e.with_origin(origin))?;
                Ok(Ty::generic(info.ty.clone(), args))
            }
            TypeExpr::Array(elem) => Ok(Ty::array(self.resolve_type_expr(elem, origin)?)),
            TypeExpr::Function(params, ret) => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_type_expr(p, origin))
                    .collect::<SemaResult<Vec<_>>>()?;
                Ok(Ty::func(params, self.resolve_type_expr(ret, origin)?))
            }
            TypeExpr::Ref(inner) => Ok(Ty::Ref(Box::new(self.resolve_type_expr(inner, origin)?))),
            TypeExpr::MutRef(inner) => Ok(Ty::MutRef(Box::new(self.resolve_type_expr(inner, origin)?))),
            TypeExpr::Map(k, v) => Ok(Ty::Map(
                Box::new(self.resolve_type_expr(k, origin)?),
                Box::new(self.resolve_type_expr(v, origin)?),
            )),
            TypeExpr::Unit => Ok(Ty::Unit),
        }
    }

    // ── Expressions & statements ───────────────────────────────────────

    pub fn lower_expr(&mut self, expr: &ast::Expr) -> SemaResult<ir::Expr> {
        self.lower_expr_expecting(expr, None)
    }

    /// Lower `expr` where the context wants a value of type `expected`.
    /// The expectation guides inference; it is not checked here.
    pub fn lower_expr_expecting(&mut self, expr: &ast::Expr, expected: Option<&Ty>) -> SemaResult<ir::Expr> {
        let node = Node::Expr { expr, expected };
        self.dispatch(Stage::Expression, &node)?.into_expr()
    }

    pub fn lower_stmt(&mut self, stmt: &ast::Stmt) -> SemaResult<ir::Stmt> {
        self.dispatch(Stage::Statement, &Node::Stmt(stmt))?.into_stmt()
    }

    pub fn lower_block(&mut self, stmts: &[ast::Stmt]) -> SemaResult<Vec<ir::Stmt>> {
        stmts.iter().map(|s| self.lower_stmt(s)).collect()
    }

    fn dispatch(&mut self, stage: Stage, node: &Node<'_>) -> SemaResult<Lowered> {
        let engine = Rc::clone(&self.engine);
        match engine.apply(stage, node, self) {
            Ok(Some(lowered)) => Ok(lowered),
            Ok(None) => Err(CompileError::new(
                ErrorKind::NoApplicableRule,
                format!("No rule applies to this {}", stage),
            )
            .with_origin(node.origin())),
            Err(e) => Err(e.with_origin(node.origin())),
        }
    }

    // ── Scopes ─────────────────────────────────────────────────────────

    /// Run `f` in a fresh variable scope.
    pub fn with_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> SemaResult<R>) -> SemaResult<R> {
        self.env.push_scope();
        let result = f(self);
        self.env.pop_scope();
        result
    }

    pub fn with_type_params<R>(
        &mut self,
        params: &[TypeParam],
        f: impl FnOnce(&mut Self) -> SemaResult<R>,
    ) -> SemaResult<R> {
        let depth = self.type_params.len();
        self.type_params.extend(params.iter().cloned());
        let result = f(self);
        self.type_params.truncate(depth);
        result
    }

    pub fn with_return_type<R>(&mut self, ret: Ty, f: impl FnOnce(&mut Self) -> SemaResult<R>) -> SemaResult<R> {
        self.return_types.push(ret);
        let result = f(self);
        self.return_types.pop();
        result
    }

    // ── Patterns ───────────────────────────────────────────────────────

    /// Lower a pattern matched against a value of type `scrutinee`, binding
    /// its variables in the current scope.
    pub fn lower_pattern(&mut self, pattern: &ast::Pattern, scrutinee: &Ty, origin: Origin) -> SemaResult<ir::Pattern> {
        match pattern {
            ast::Pattern::Wildcard => Ok(ir::Pattern::Wildcard),
            ast::Pattern::Bind(name) => {
                // A bare `None` is a constructor, not a new binding.
                let nullary = self
                    .constructors
                    .get(name)
                    .is_some_and(|c| c.info.param_types.is_empty());
                if nullary {
                    return self.lower_pattern(&ast::Pattern::ctor(name.clone(), Vec::new()), scrutinee, origin);
                }
                self.env.insert(name.clone(), scrutinee.clone());
                Ok(ir::Pattern::Bind {
                    name: name.clone(),
                    ty: scrutinee.clone(),
                })
            }
            ast::Pattern::Literal(lit) => {
                self.checker()
                    .ensure_compatible_type(&literal_type(lit), scrutinee, "pattern literal", origin)?;
                Ok(ir::Pattern::Literal(lit.clone()))
            }
            ast::Pattern::Constructor { name, fields } => {
                let Some(info) = self.constructors.info_for(name, scrutinee) else {
                    return Err(CompileError::new(
                        ErrorKind::UnknownIdentifier,
                        format!("Unknown constructor '{}'", name),
                    )
                    .with_origin(origin));
                };
                self.checker().ensure_compatible_type(
                    &info.ret_type,
                    scrutinee,
                    &format!("pattern '{}'", name),
                    origin,
                )?;
                if fields.len() != info.param_types.len() {
                    return Err(CompileError::new(
                        ErrorKind::ArityMismatch,
                        format!(
                            "Constructor '{}' expects {} field(s), got {}",
                            name,
                            info.param_types.len(),
                            fields.len()
                        ),
                    )
                    .with_origin(origin));
                }
                let fields = fields
                    .iter()
                    .zip(&info.param_types)
                    .map(|(field, ty)| self.lower_pattern(field, ty, origin))
                    .collect::<SemaResult<Vec<_>>>()?;
                Ok(ir::Pattern::Constructor {
                    name: name.clone(),
                    fields,
                    ty: scrutinee.clone(),
                })
            }
            ast::Pattern::Or(alts) => {
                let alts = alts
                    .iter()
                    .map(|alt| self.lower_pattern(alt, scrutinee, origin))
                    .collect::<SemaResult<Vec<_>>>()?;
                Ok(ir::Pattern::Or(alts))
            }
        }
    }
}

impl fmt::Debug for Lowering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lowering")
            .field("module_name", &self.module_name)
            .field("namespace", &self.namespace)
            .field("types", &self.types.len())
            .field("functions", &self.functions.len())
            .field("scope_depth", &self.env.depth())
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("has_metadata_source", &self.metadata.is_some())
            .finish()
    }
}

impl MatchContext for Lowering {
    fn types(&self) -> &TypeRegistry {
        &self.types
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}

/// Lower one module with a fresh pass.
pub fn lower_module(config: SemaConfig, module: &ast::Module) -> SemaResult<(ir::Module, Lowering)> {
    let mut lowering = Lowering::new(config);
    let ir = lowering.lower_module(module)?;
    Ok((ir, lowering))
}
