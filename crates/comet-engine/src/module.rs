//! Module compilation, linking and evaluation.
//!
//! A [`ModuleUnit`] is the engine's compiled representation of one module:
//! an opaque handle the embedder stores, compares, and hands back through
//! the linking callback. Identity hashes are derived from the resource name
//! and are *not* unique (two units compiled under the same URL collide), so
//! embedders must confirm candidates with [`ModuleUnit::same`].

use crate::ast::{ImportBinding, ModuleBody, StmtKind};
use crate::interpreter;
use crate::lexer::line_col;
use crate::parser::parse_module;
use crate::value::{JsError, JsObject, JsPromise, Value};
use rustc_hash::{FxHashMap, FxHasher};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Engine-side lifecycle status of a compiled module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitStatus {
    /// Compiled, not yet linked.
    Uninstantiated,
    /// The linking walk is visiting this unit.
    Instantiating,
    /// Linked; imports and exports are connected.
    Instantiated,
    /// The evaluation walk is visiting this unit.
    Evaluating,
    /// Body has run to completion.
    Evaluated,
    /// Linking or evaluation threw; the exception is recorded.
    Errored,
}

/// Host-side services the engine calls back into during evaluation.
pub trait HostHooks {
    /// Called when evaluating code executes `import(specifier)`. Returns the
    /// promise that settles the import expression.
    fn import_module_dynamically(
        &self,
        specifier: &str,
        referrer: &str,
        has_host_options: bool,
    ) -> JsPromise;

    /// Called on the first `import.meta` access in a module, with the fresh
    /// metadata object to populate. An `Err` makes the access throw.
    fn initialize_import_meta(&self, unit: &ModuleUnit, meta: &JsObject) -> Result<(), Value>;
}

/// The synchronous per-edge resolution callback driven by
/// [`ModuleUnit::instantiate`]. Receives the requesting unit and the
/// specifier; returns the resolved unit or a thrown value that aborts the
/// whole link.
pub type ResolveModuleCallback<'a> = dyn FnMut(&ModuleUnit, &str) -> Result<ModuleUnit, Value> + 'a;

/// The engine: a factory for execution contexts.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    next_unit_id: Cell<u64>,
}

impl Engine {
    /// Creates a new engine instance.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EngineInner {
                next_unit_id: Cell::new(1),
            }),
        }
    }

    /// Creates a fresh execution context.
    pub fn create_context(&self) -> Context {
        Context {
            inner: Rc::new(ContextInner {
                engine: self.clone(),
                hooks: RefCell::new(None),
            }),
        }
    }

    fn next_unit_id(&self) -> u64 {
        let id = self.inner.next_unit_id.get();
        self.inner.next_unit_id.set(id + 1);
        id
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// An execution context (realm). Modules are compiled into, and evaluate
/// within, exactly one context.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

struct ContextInner {
    engine: Engine,
    hooks: RefCell<Option<Rc<dyn HostHooks>>>,
}

impl std::fmt::Debug for ContextInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextInner")
            .field("engine", &self.engine)
            .field("hooks", &self.hooks.borrow().is_some())
            .finish()
    }
}

impl Context {
    /// Installs the host hooks used for dynamic import and `import.meta`.
    /// Replaces any previously installed hooks.
    pub fn set_host_hooks(&self, hooks: Rc<dyn HostHooks>) {
        *self.inner.hooks.borrow_mut() = Some(hooks);
    }

    pub(crate) fn hooks(&self) -> Option<Rc<dyn HostHooks>> {
        self.inner.hooks.borrow().clone()
    }

    /// Returns true if both handles refer to the same context.
    pub fn same(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Compiles module source text into a [`ModuleUnit`].
    ///
    /// On a syntax error the `Err` carries the thrown `SyntaxError` value;
    /// no unit exists in that case.
    pub fn compile_module(&self, origin: ModuleOrigin, source: &str) -> Result<ModuleUnit, Value> {
        let body = match parse_module(source) {
            Ok(body) => body,
            Err(err) => {
                return Err(syntax_error_at(&origin.url, source, err.offset, &err.message));
            }
        };
        check_bindings(&origin.url, source, &body)?;

        let requests: Vec<String> = body.imports().map(|decl| decl.specifier.clone()).collect();
        let export_names = collect_export_names(&body);
        let identity_hash = identity_hash_for(&origin.url);

        Ok(ModuleUnit {
            inner: Rc::new(UnitInner {
                id: self.inner.engine.next_unit_id(),
                identity_hash,
                origin,
                source: source.to_string(),
                context: self.clone(),
                body,
                requests,
                export_names,
                status: Cell::new(UnitStatus::Uninstantiated),
                resolved: RefCell::new(Vec::new()),
                exports: RefCell::new(FxHashMap::default()),
                exception: RefCell::new(None),
                import_meta: RefCell::new(None),
            }),
        })
    }
}

/// Where a module comes from, as far as the engine is concerned.
#[derive(Debug, Clone)]
pub struct ModuleOrigin {
    /// The resource name (URL) the module is known by.
    pub url: String,
    /// Whether the referrer carries host-defined linking options; forwarded
    /// verbatim to the dynamic-import host hook.
    pub host_defined_options: bool,
}

impl ModuleOrigin {
    /// Creates an origin with no host-defined options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            host_defined_options: false,
        }
    }
}

/// An opaque handle to a compiled module. Cheap to clone; all clones refer
/// to the same unit.
#[derive(Debug, Clone)]
pub struct ModuleUnit {
    pub(crate) inner: Rc<UnitInner>,
}

#[derive(Debug)]
pub(crate) struct UnitInner {
    pub(crate) id: u64,
    pub(crate) identity_hash: i32,
    pub(crate) origin: ModuleOrigin,
    pub(crate) source: String,
    pub(crate) context: Context,
    pub(crate) body: ModuleBody,
    pub(crate) requests: Vec<String>,
    pub(crate) export_names: Vec<String>,
    pub(crate) status: Cell<UnitStatus>,
    pub(crate) resolved: RefCell<Vec<ModuleUnit>>,
    pub(crate) exports: RefCell<FxHashMap<String, Value>>,
    pub(crate) exception: RefCell<Option<Value>>,
    pub(crate) import_meta: RefCell<Option<JsObject>>,
}

impl ModuleUnit {
    /// The resource name the unit was compiled under.
    pub fn url(&self) -> &str {
        &self.inner.origin.url
    }

    /// The identity hash. Not unique: units compiled under the same URL
    /// share a hash, and unrelated URLs may collide too.
    pub fn identity_hash(&self) -> i32 {
        self.inner.identity_hash
    }

    /// Whether the unit's origin carries host-defined linking options.
    pub fn has_host_defined_options(&self) -> bool {
        self.inner.origin.host_defined_options
    }

    /// Handle equality: true iff both handles refer to the same unit.
    /// Unit ids are engine-assigned and never reused, unlike identity
    /// hashes.
    pub fn same(&self, other: &ModuleUnit) -> bool {
        self.inner.id == other.inner.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> UnitStatus {
        self.inner.status.get()
    }

    /// The import specifiers the module declares, in declaration order.
    pub fn requests(&self) -> &[String] {
        &self.inner.requests
    }

    /// The export names the module declares, in declaration order.
    pub fn export_names(&self) -> &[String] {
        &self.inner.export_names
    }

    /// The recorded exception, present only in status `Errored`.
    pub fn exception(&self) -> Option<Value> {
        self.inner.exception.borrow().clone()
    }

    /// Links this module and everything reachable from it.
    ///
    /// Walks import edges depth first, calling `resolver` synchronously for
    /// each one. Named imports are checked against the dependency's declared
    /// exports. On failure every unit the walk was still visiting is
    /// restored to `Uninstantiated`, so a failed link never leaves the graph
    /// half-connected.
    pub fn instantiate(&self, resolver: &mut ResolveModuleCallback<'_>) -> Result<(), Value> {
        match self.status() {
            UnitStatus::Instantiated
            | UnitStatus::Instantiating
            | UnitStatus::Evaluating
            | UnitStatus::Evaluated => return Ok(()),
            UnitStatus::Errored => {
                return Err(self
                    .exception()
                    .unwrap_or_else(|| Value::type_error("module is in errored state")));
            }
            UnitStatus::Uninstantiated => {}
        }

        let mut walked = Vec::new();
        let result = self.instantiate_inner(resolver, &mut walked);
        if result.is_err() {
            for unit in walked {
                if unit.status() == UnitStatus::Instantiating {
                    unit.inner.status.set(UnitStatus::Uninstantiated);
                    unit.inner.resolved.borrow_mut().clear();
                }
            }
        }
        result
    }

    fn instantiate_inner(
        &self,
        resolver: &mut ResolveModuleCallback<'_>,
        walked: &mut Vec<ModuleUnit>,
    ) -> Result<(), Value> {
        self.inner.status.set(UnitStatus::Instantiating);
        walked.push(self.clone());

        let mut resolved = Vec::with_capacity(self.inner.requests.len());
        for (index, specifier) in self.inner.requests.iter().enumerate() {
            let dep = resolver(self, specifier)?;
            if dep.status() == UnitStatus::Uninstantiated {
                dep.instantiate_inner(resolver, walked)?;
            }
            self.check_imported_bindings(index, specifier, &dep)?;
            resolved.push(dep);
        }

        *self.inner.resolved.borrow_mut() = resolved;
        self.inner.status.set(UnitStatus::Instantiated);
        Ok(())
    }

    fn check_imported_bindings(
        &self,
        index: usize,
        specifier: &str,
        dep: &ModuleUnit,
    ) -> Result<(), Value> {
        let decl = self
            .inner
            .body
            .imports()
            .nth(index)
            .expect("request index out of range");
        for binding in &decl.bindings {
            let needed = match binding {
                ImportBinding::Default { .. } => Some("default"),
                ImportBinding::Named { imported, .. } => Some(imported.as_str()),
                ImportBinding::Namespace { .. } => None,
            };
            if let Some(name) = needed {
                if !dep.inner.export_names.iter().any(|e| e == name) {
                    return Err(Value::syntax_error(format!(
                        "The requested module '{}' does not provide an export named '{}'",
                        specifier, name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Evaluates this module: dependencies first, in request order, then the
    /// module body, once. Returns the completion value. A thrown value is
    /// recorded on the unit and returned as `Err`; evaluating an errored
    /// unit rethrows the recorded exception.
    pub fn evaluate(&self) -> Result<Value, Value> {
        match self.status() {
            UnitStatus::Uninstantiated | UnitStatus::Instantiating => {
                return Err(Value::type_error(format!(
                    "Module '{}' must be instantiated before evaluation",
                    self.url()
                )));
            }
            UnitStatus::Evaluating | UnitStatus::Evaluated => return Ok(Value::Undefined),
            UnitStatus::Errored => {
                return Err(self
                    .exception()
                    .unwrap_or_else(|| Value::type_error("module is in errored state")));
            }
            UnitStatus::Instantiated => {}
        }

        self.inner.status.set(UnitStatus::Evaluating);

        let deps = self.inner.resolved.borrow().clone();
        for dep in deps {
            if let Err(exception) = dep.evaluate() {
                *self.inner.exception.borrow_mut() = Some(exception.clone());
                self.inner.status.set(UnitStatus::Errored);
                return Err(exception);
            }
        }

        match interpreter::run_body(self) {
            Ok(completion) => {
                self.inner.status.set(UnitStatus::Evaluated);
                Ok(completion)
            }
            Err(exception) => {
                *self.inner.exception.borrow_mut() = Some(exception.clone());
                self.inner.status.set(UnitStatus::Errored);
                Err(exception)
            }
        }
    }

    /// The module namespace: one property per declared export, keys in
    /// sorted order. Unevaluated bindings read as `undefined`.
    pub fn namespace(&self) -> Value {
        let obj = JsObject::new();
        let exports = self.inner.exports.borrow();
        for name in &self.inner.export_names {
            obj.set(
                name.clone(),
                exports.get(name).cloned().unwrap_or(Value::Undefined),
            );
        }
        Value::Object(obj)
    }

    pub(crate) fn export_value(&self, name: &str) -> Option<Value> {
        self.inner.exports.borrow().get(name).cloned()
    }

    pub(crate) fn import_meta_object(&self) -> Result<JsObject, Value> {
        if let Some(meta) = self.inner.import_meta.borrow().as_ref() {
            return Ok(meta.clone());
        }
        let hooks = self
            .inner
            .context
            .hooks()
            .ok_or_else(|| Value::type_error("import.meta is not available (no host hooks installed)"))?;
        let meta = JsObject::new();
        hooks.initialize_import_meta(self, &meta)?;
        *self.inner.import_meta.borrow_mut() = Some(meta.clone());
        Ok(meta)
    }

    pub(crate) fn dynamic_import(&self, specifier: &str) -> Result<JsPromise, Value> {
        let hooks = self.inner.context.hooks().ok_or_else(|| {
            Value::type_error("dynamic import is not available (no host hooks installed)")
        })?;
        Ok(hooks.import_module_dynamically(
            specifier,
            self.url(),
            self.has_host_defined_options(),
        ))
    }
}

fn identity_hash_for(url: &str) -> i32 {
    let mut hasher = FxHasher::default();
    url.hash(&mut hasher);
    (hasher.finish() as i32) & 0x3FFF_FFFF
}

fn syntax_error_at(url: &str, source: &str, offset: usize, message: &str) -> Value {
    let (line, col) = line_col(source, offset);
    Value::Error(JsError::with_stack(
        "SyntaxError",
        message,
        format!("SyntaxError: {}\n    at {}:{}:{}", message, url, line, col),
    ))
}

fn collect_export_names(body: &ModuleBody) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in &body.statements {
        match &stmt.kind {
            StmtKind::ExportConst { name, .. } => names.push(name.clone()),
            StmtKind::ExportDefault(_) => names.push("default".to_string()),
            StmtKind::ExportList(entries) => {
                names.extend(entries.iter().map(|e| e.exported.clone()));
            }
            _ => {}
        }
    }
    names
}

/// Static checks run at compile time: duplicate local bindings, duplicate
/// export names, and export lists referring to undeclared bindings.
fn check_bindings(url: &str, source: &str, body: &ModuleBody) -> Result<(), Value> {
    let mut locals: HashSet<&str> = HashSet::new();
    let mut exports: HashSet<&str> = HashSet::new();

    for stmt in &body.statements {
        let offset = stmt.span.start;
        match &stmt.kind {
            StmtKind::Import(decl) => {
                for binding in &decl.bindings {
                    let local = match binding {
                        ImportBinding::Default { local }
                        | ImportBinding::Named { local, .. }
                        | ImportBinding::Namespace { local } => local.as_str(),
                    };
                    if !locals.insert(local) {
                        return Err(syntax_error_at(
                            url,
                            source,
                            offset,
                            &format!("Identifier '{}' has already been declared", local),
                        ));
                    }
                }
            }
            StmtKind::Const { name, .. } | StmtKind::ExportConst { name, .. } => {
                if !locals.insert(name.as_str()) {
                    return Err(syntax_error_at(
                        url,
                        source,
                        offset,
                        &format!("Identifier '{}' has already been declared", name),
                    ));
                }
                if let StmtKind::ExportConst { name, .. } = &stmt.kind {
                    if !exports.insert(name.as_str()) {
                        return Err(syntax_error_at(
                            url,
                            source,
                            offset,
                            &format!("Duplicate export of '{}'", name),
                        ));
                    }
                }
            }
            StmtKind::ExportDefault(_) => {
                if !exports.insert("default") {
                    return Err(syntax_error_at(
                        url,
                        source,
                        offset,
                        "Duplicate export of 'default'",
                    ));
                }
            }
            StmtKind::ExportList(entries) => {
                for entry in entries {
                    if !exports.insert(entry.exported.as_str()) {
                        return Err(syntax_error_at(
                            url,
                            source,
                            offset,
                            &format!("Duplicate export of '{}'", entry.exported),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    // Export lists may only name bindings declared somewhere in the module
    for stmt in &body.statements {
        if let StmtKind::ExportList(entries) = &stmt.kind {
            for entry in entries {
                if !locals.contains(entry.local.as_str()) {
                    return Err(syntax_error_at(
                        url,
                        source,
                        stmt.span.start,
                        &format!("Export '{}' is not defined in module", entry.local),
                    ));
                }
            }
        }
    }

    Ok(())
}
