// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! Module records: the embedder's unit of compiled state.
//!
//! A [`Module`] wraps one compiled engine unit together with everything the
//! engine externalizes: the resolution cache that must be populated before
//! linking, the recorded exception, and registry membership. The lifecycle
//! is driven incrementally (construct, `compile`, `resolve_request` per
//! import, `instantiate`, `evaluate`), and every step checks the record's
//! status first; a precondition failure is a usage error that leaves the
//! record untouched.

use crate::error::{LoaderError, Result};
use crate::module_system::realm::{Realm, RealmState};
use comet_engine::{Context, ModuleOrigin, ModuleUnit, UnitStatus, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Lifecycle status of a module record.
///
/// Advances monotonically along construct → compile → instantiate →
/// evaluate, except for `Errored`, which is reachable from any non-terminal
/// state and is terminal. `Instantiating` and `Evaluating` are transient
/// states observable only while the engine's own synchronous traversal is
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleStatus {
    /// Constructed, no compiled unit yet.
    Uncompiled,
    /// Compiled, not yet linked.
    Uninstantiated,
    /// The linking walk is visiting this record's unit.
    Instantiating,
    /// Linked.
    Instantiated,
    /// The evaluation walk is visiting this record's unit.
    Evaluating,
    /// Body has run to completion.
    Evaluated,
    /// Compile, link, or evaluation failed; the exception is recorded.
    Errored,
}

impl ModuleStatus {
    /// Status code for `Uncompiled`, distinct from every engine status.
    pub const K_UNCOMPILED: i32 = -1;
    /// Status code for `Uninstantiated`.
    pub const K_UNINSTANTIATED: i32 = 0;
    /// Status code for `Instantiating`.
    pub const K_INSTANTIATING: i32 = 1;
    /// Status code for `Instantiated`.
    pub const K_INSTANTIATED: i32 = 2;
    /// Status code for `Evaluating`.
    pub const K_EVALUATING: i32 = 3;
    /// Status code for `Evaluated`.
    pub const K_EVALUATED: i32 = 4;
    /// Status code for `Errored`.
    pub const K_ERRORED: i32 = 5;

    /// The stable numeric code for this status.
    pub fn code(self) -> i32 {
        match self {
            ModuleStatus::Uncompiled => Self::K_UNCOMPILED,
            ModuleStatus::Uninstantiated => Self::K_UNINSTANTIATED,
            ModuleStatus::Instantiating => Self::K_INSTANTIATING,
            ModuleStatus::Instantiated => Self::K_INSTANTIATED,
            ModuleStatus::Evaluating => Self::K_EVALUATING,
            ModuleStatus::Evaluated => Self::K_EVALUATED,
            ModuleStatus::Errored => Self::K_ERRORED,
        }
    }

    fn from_unit(status: UnitStatus) -> Self {
        match status {
            UnitStatus::Uninstantiated => ModuleStatus::Uninstantiated,
            UnitStatus::Instantiating => ModuleStatus::Instantiating,
            UnitStatus::Instantiated => ModuleStatus::Instantiated,
            UnitStatus::Evaluating => ModuleStatus::Evaluating,
            UnitStatus::Evaluated => ModuleStatus::Evaluated,
            UnitStatus::Errored => ModuleStatus::Errored,
        }
    }
}

/// A module record. Cheap to clone; all clones refer to the same record.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) inner: Rc<ModuleInner>,
}

#[derive(Debug)]
pub(crate) struct ModuleInner {
    pub(crate) url: String,
    pub(crate) context: Context,
    pub(crate) realm: Rc<RealmState>,
    pub(crate) state: RefCell<RecordState>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordState {
    /// The compiled unit; present iff compilation succeeded.
    pub(crate) unit: Option<ModuleUnit>,
    /// Specifier → record links, populated by the embedder before linking.
    /// Entries are non-owning; the targets' lifetimes belong to whoever
    /// constructed them.
    pub(crate) resolve_cache: HashMap<String, Weak<ModuleInner>>,
    /// Early exception (failed compile) or link failure. Evaluation
    /// exceptions live on the unit itself.
    pub(crate) exception: Option<Value>,
}

impl Module {
    /// Constructs a record for a module known by `url`, in the realm's
    /// context. The record starts `Uncompiled`.
    pub fn new(realm: &Realm, url: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ModuleInner {
                url: url.into(),
                context: realm.context().clone(),
                realm: realm.state().clone(),
                state: RefCell::new(RecordState::default()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ModuleInner>) -> Self {
        Self { inner }
    }

    /// The URL the record was constructed with.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The current lifecycle status.
    pub fn status(&self) -> ModuleStatus {
        let state = self.inner.state.borrow();
        if state.exception.is_some() {
            ModuleStatus::Errored
        } else if let Some(unit) = &state.unit {
            ModuleStatus::from_unit(unit.status())
        } else {
            ModuleStatus::Uncompiled
        }
    }

    /// Compiles `source` under the record's URL.
    ///
    /// On success the record owns the compiled unit, is registered in the
    /// realm's registry, and advances to `Uninstantiated`. On a syntax
    /// error the thrown value is recorded as the early exception, the
    /// record becomes `Errored` and is never registered, and the error is
    /// propagated.
    pub fn compile(&self, source: &str) -> Result<()> {
        let status = self.status();
        if status != ModuleStatus::Uncompiled {
            return Err(self.invalid_status("compile", status));
        }

        tracing::debug!(url = %self.inner.url, "compiling module");
        let origin = ModuleOrigin::new(&self.inner.url);
        match self.inner.context.compile_module(origin, source) {
            Ok(unit) => {
                self.inner.state.borrow_mut().unit = Some(unit);
                self.inner.realm.registry.borrow_mut().register(self);
                Ok(())
            }
            Err(exception) => {
                tracing::debug!(url = %self.inner.url, %exception, "module failed to compile");
                self.inner.state.borrow_mut().exception = Some(exception.clone());
                Err(LoaderError::Exception(exception))
            }
        }
    }

    /// The import specifiers the compiled unit declares, in declaration
    /// order. Valid only after a successful compile.
    pub fn requests(&self) -> Result<Vec<String>> {
        match self.unit() {
            Some(unit) => Ok(unit.requests().to_vec()),
            None => Err(self.invalid_status("read requests of", self.status())),
        }
    }

    /// Records that `specifier`, imported from this module, resolves to
    /// `target`. Idempotent upsert; the last write for a specifier wins.
    /// Callable any number of times before `instantiate` reads the cache.
    pub fn resolve_request(&self, specifier: &str, target: &Module) -> Result<()> {
        let status = self.status();
        if !matches!(
            status,
            ModuleStatus::Uncompiled | ModuleStatus::Uninstantiated
        ) {
            return Err(self.invalid_status("resolve a request of", status));
        }
        tracing::trace!(
            url = %self.inner.url,
            specifier,
            target = %target.inner.url,
            "caching resolved request"
        );
        self.inner
            .state
            .borrow_mut()
            .resolve_cache
            .insert(specifier.to_string(), Rc::downgrade(&target.inner));
        Ok(())
    }

    /// True iff `specifier` has a live resolution cache entry.
    pub fn is_resolved(&self, specifier: &str) -> bool {
        self.inner
            .state
            .borrow()
            .resolve_cache
            .get(specifier)
            .and_then(Weak::upgrade)
            .is_some()
    }

    /// Links this module's graph.
    ///
    /// The engine walks the import edges depth first and calls back into
    /// the resolution function for each one; every answer must already be
    /// in a resolution cache, since linking never resolves lazily. On failure
    /// the exception is recorded, the record becomes `Errored`, and the
    /// error is propagated; the engine guarantees no unit in the walked
    /// graph is left half-instantiated. Calling this on an
    /// already-instantiated record is a no-op.
    pub fn instantiate(&self) -> Result<()> {
        let status = self.status();
        let unit = match status {
            ModuleStatus::Uninstantiated => self
                .inner
                .state
                .borrow()
                .unit
                .clone()
                .expect("uninstantiated record must hold a unit"),
            // Already linked, possibly as part of another record's graph
            ModuleStatus::Instantiated
            | ModuleStatus::Evaluating
            | ModuleStatus::Evaluated => return Ok(()),
            _ => return Err(self.invalid_status("instantiate", status)),
        };

        tracing::debug!(url = %self.inner.url, "instantiating module graph");
        let realm = self.inner.realm.clone();
        let result = unit.instantiate(&mut |referrer, specifier| {
            resolve_import(&realm, referrer, specifier)
        });

        match result {
            Ok(()) => Ok(()),
            Err(exception) => {
                tracing::debug!(url = %self.inner.url, %exception, "instantiation failed");
                self.inner.state.borrow_mut().exception = Some(exception.clone());
                Err(LoaderError::Exception(exception))
            }
        }
    }

    /// Evaluates the module body once and returns its completion value.
    ///
    /// Requires status `Instantiated`; in particular a second `evaluate`
    /// is a usage error rather than a silent re-run. A thrown value is
    /// recorded, the record becomes `Errored`, and the error is
    /// propagated.
    pub fn evaluate(&self) -> Result<Value> {
        let status = self.status();
        if status != ModuleStatus::Instantiated {
            return Err(self.invalid_status("evaluate", status));
        }
        let unit = self
            .inner
            .state
            .borrow()
            .unit
            .clone()
            .expect("instantiated record must hold a unit");

        tracing::debug!(url = %self.inner.url, "evaluating module");
        unit.evaluate().map_err(LoaderError::Exception)
    }

    /// The module namespace object. Well-defined once the record is at
    /// least `Instantiated`.
    pub fn namespace(&self) -> Result<Value> {
        let state = self.inner.state.borrow();
        if let Some(unit) = &state.unit {
            if unit.status() >= UnitStatus::Instantiated {
                return Ok(unit.namespace());
            }
        }
        drop(state);
        Err(self.invalid_status("read the namespace of", self.status()))
    }

    /// The recorded exception: the early exception if the record never
    /// compiled, the link failure if instantiation failed, or the engine's
    /// exception if evaluation failed. `None` means no exception, so callers
    /// can always distinguish it from a recorded falsy value.
    pub fn exception(&self) -> Option<Value> {
        let state = self.inner.state.borrow();
        if let Some(exception) = &state.exception {
            return Some(exception.clone());
        }
        match &state.unit {
            Some(unit) if unit.status() == UnitStatus::Errored => unit.exception(),
            _ => None,
        }
    }

    pub(crate) fn unit(&self) -> Option<ModuleUnit> {
        self.inner.state.borrow().unit.clone()
    }

    fn invalid_status(&self, op: &'static str, status: ModuleStatus) -> LoaderError {
        LoaderError::InvalidStatus {
            op,
            url: self.inner.url.clone(),
            status,
        }
    }
}

/// The synchronous resolution function driven by the engine's linking walk.
///
/// Recovers the requesting record through the realm registry (identity hash
/// plus handle equality, since hashes collide), consults its resolution cache,
/// and returns the target's compiled unit. Never performs new resolution
/// work: a missing answer fails the whole link.
fn resolve_import(
    realm: &Rc<RealmState>,
    referrer: &ModuleUnit,
    specifier: &str,
) -> std::result::Result<ModuleUnit, Value> {
    let Some(record) = realm.registry.borrow_mut().lookup(referrer) else {
        return Err(Value::reference_error(format!(
            "module '{}' requesting '{}' is not registered",
            referrer.url(),
            specifier
        )));
    };

    let state = record.inner.state.borrow();
    let Some(target) = state.resolve_cache.get(specifier).and_then(Weak::upgrade) else {
        return Err(Value::error(
            "Error",
            format!(
                "Cannot find module '{}' imported from {}",
                specifier, record.inner.url
            ),
        ));
    };

    let target_unit = target.state.borrow().unit.clone();
    let Some(unit) = target_unit else {
        return Err(Value::error(
            "Error",
            format!(
                "Module '{}' resolved for '{}' has not been compiled",
                target.url, specifier
            ),
        ));
    };

    tracing::trace!(specifier, referrer = referrer.url(), "resolved import edge");
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use comet_engine::Engine;

    fn realm() -> Realm {
        Realm::new(&Engine::new())
    }

    #[test]
    fn test_new_record_is_uncompiled() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        assert_eq!(module.url(), "file:///a.mjs");
        assert_eq!(module.status(), ModuleStatus::Uncompiled);
        assert_eq!(module.exception(), None);
    }

    #[test]
    fn test_compile_advances_status() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("export const x = 1;").unwrap();
        assert_eq!(module.status(), ModuleStatus::Uninstantiated);
        assert_eq!(module.exception(), None);
    }

    #[test]
    fn test_compile_failure_records_early_exception() {
        let realm = realm();
        let module = Module::new(&realm, "file:///bad.mjs");
        let err = module.compile("const = 1;").unwrap_err();
        assert!(matches!(err, LoaderError::Exception(_)));
        assert_eq!(module.status(), ModuleStatus::Errored);
        let exception = module.exception().expect("early exception");
        let Value::Error(e) = exception else {
            panic!("expected error value");
        };
        assert_eq!(e.name(), "SyntaxError");
    }

    #[test]
    fn test_compile_twice_is_a_usage_error() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("1;").unwrap();
        let err = module.compile("2;").unwrap_err();
        assert!(matches!(err, LoaderError::InvalidStatus { op: "compile", .. }));
        assert_eq!(module.status(), ModuleStatus::Uninstantiated);
    }

    #[test]
    fn test_resolve_request_upsert_last_write_wins() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("import { x } from 'dep';\nx;").unwrap();

        let first = Module::new(&realm, "file:///first.mjs");
        first.compile("export const x = 1;").unwrap();
        let second = Module::new(&realm, "file:///second.mjs");
        second.compile("export const x = 2;").unwrap();

        assert!(!module.is_resolved("dep"));
        module.resolve_request("dep", &first).unwrap();
        module.resolve_request("dep", &first).unwrap();
        assert!(module.is_resolved("dep"));
        // Re-resolving before instantiate swaps the target
        module.resolve_request("dep", &second).unwrap();

        module.instantiate().unwrap();
        assert_eq!(module.evaluate().unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_instantiate_without_resolution_fails_and_errors_record() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("import { x } from 'missing';\nx;").unwrap();
        let err = module.instantiate().unwrap_err();
        assert!(matches!(err, LoaderError::Exception(_)));
        assert_eq!(module.status(), ModuleStatus::Errored);
        assert!(module.exception().is_some());
    }

    #[test]
    fn test_evaluate_before_instantiate_is_rejected() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("1 + 1;").unwrap();
        let err = module.evaluate().unwrap_err();
        assert!(matches!(
            err,
            LoaderError::InvalidStatus { op: "evaluate", status: ModuleStatus::Uninstantiated, .. }
        ));
        // The usage error is not recorded and does not advance the status
        assert_eq!(module.status(), ModuleStatus::Uninstantiated);
        assert_eq!(module.exception(), None);
    }

    #[test]
    fn test_evaluate_twice_is_a_usage_error() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("42;").unwrap();
        module.instantiate().unwrap();
        assert_eq!(module.evaluate().unwrap(), Value::Number(42.0));
        let err = module.evaluate().unwrap_err();
        assert!(matches!(
            err,
            LoaderError::InvalidStatus { op: "evaluate", status: ModuleStatus::Evaluated, .. }
        ));
        assert_eq!(module.status(), ModuleStatus::Evaluated);
    }

    #[test]
    fn test_round_trip() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module
            .compile("export default true;\nexport const foo = 42;\nfoo;")
            .unwrap();
        module.instantiate().unwrap();
        let completion = module.evaluate().unwrap();
        assert_eq!(completion, Value::Number(42.0));
        assert_eq!(module.status(), ModuleStatus::Evaluated);

        let Value::Object(ns) = module.namespace().unwrap() else {
            panic!("expected namespace object");
        };
        assert_eq!(ns.keys(), ["default", "foo"]);
        assert_eq!(ns.get("foo"), Some(Value::Number(42.0)));
        assert_eq!(module.exception(), None);
    }

    #[test]
    fn test_namespace_before_instantiate_is_rejected() {
        let realm = realm();
        let module = Module::new(&realm, "file:///a.mjs");
        module.compile("export const x = 1;").unwrap();
        assert!(matches!(
            module.namespace(),
            Err(LoaderError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_evaluation_error_is_readable_from_record() {
        let realm = realm();
        let module = Module::new(&realm, "file:///b.mjs");
        module.compile("throw new Error(\"oops\");").unwrap();
        module.instantiate().unwrap();
        let err = module.evaluate().unwrap_err();
        let LoaderError::Exception(thrown) = err else {
            panic!("expected exception");
        };
        assert_eq!(module.status(), ModuleStatus::Errored);
        assert_eq!(module.exception(), Some(thrown.clone()));
        let Value::Error(e) = thrown else {
            panic!("expected error value");
        };
        assert_eq!(e.message(), "oops");
        assert!(e.stack().unwrap().contains("file:///b.mjs:1:7"));
    }

    #[test]
    fn test_transitively_instantiated_record_accepts_instantiate() {
        let realm = realm();
        let dep = Module::new(&realm, "file:///dep.mjs");
        dep.compile("export const x = 3;").unwrap();
        let root = Module::new(&realm, "file:///root.mjs");
        root.compile("import { x } from 'dep';\nx;").unwrap();
        root.resolve_request("dep", &dep).unwrap();

        root.instantiate().unwrap();
        // dep was linked as part of root's graph walk
        assert_eq!(dep.status(), ModuleStatus::Instantiated);
        // a direct call is a harmless no-op, not a usage error
        dep.instantiate().unwrap();
    }

    #[test]
    fn test_dropped_target_fails_link() {
        let realm = realm();
        let root = Module::new(&realm, "file:///root.mjs");
        root.compile("import { x } from 'dep';\nx;").unwrap();
        {
            let dep = Module::new(&realm, "file:///dep.mjs");
            dep.compile("export const x = 3;").unwrap();
            root.resolve_request("dep", &dep).unwrap();
            assert!(root.is_resolved("dep"));
        }
        // The cache holds non-owning links; the target is gone
        assert!(!root.is_resolved("dep"));
        assert!(root.instantiate().is_err());
    }
}
