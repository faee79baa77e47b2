// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! The reference embedder: drives module graphs from the file system.
//!
//! [`FileLoader`] performs the work the linking layer externalizes: it
//! reads files, builds one record per URL (shared across importers),
//! populates each record's resolution cache ahead of linking, and supplies
//! the realm's dynamic-import and `import.meta` callbacks.
//!
//! Dynamic imports cross the synchronous/asynchronous boundary as queued
//! requests: the callback only enqueues and returns a pending promise; the
//! queue is drained after evaluation, loading and evaluating each target
//! graph and settling its promise. A fulfilled request may enqueue further
//! requests; draining continues until the queue is dry.

use crate::error::{LoaderError, Result};
use crate::module_system::record::{Module, ModuleStatus};
use crate::module_system::realm::Realm;
use crate::module_system::resolver::{file_url, FileResolver};
use comet_engine::{JsPromise, Value};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;
use url::Url;

/// Loads, links, and runs module graphs rooted in files.
pub struct FileLoader {
    realm: Realm,
    state: Rc<LoaderState>,
}

struct LoaderState {
    resolver: FileResolver,
    /// One record per URL; importers share records through this map.
    records: RefCell<HashMap<String, Module>>,
    /// Dynamic imports waiting to be fulfilled.
    pending: RefCell<VecDeque<PendingImport>>,
    /// URL of the entry module, for `import.meta.main`.
    main: RefCell<Option<String>>,
}

struct PendingImport {
    specifier: String,
    referrer: String,
    promise: JsPromise,
}

impl FileLoader {
    /// Creates a loader bound to `realm` and installs its callbacks: the
    /// dynamic-import resolver (enqueue and return a pending promise) and
    /// the `import.meta` populator (`url` and `main`).
    pub fn new(realm: Realm) -> Self {
        let state = Rc::new(LoaderState {
            resolver: FileResolver::new(),
            records: RefCell::new(HashMap::new()),
            pending: RefCell::new(VecDeque::new()),
            main: RefCell::new(None),
        });

        let queue = state.clone();
        realm.set_dynamic_import_callback(move |specifier, referrer, _has_opts| {
            tracing::debug!(specifier, referrer, "queueing dynamic import");
            let promise = JsPromise::pending();
            queue.pending.borrow_mut().push_back(PendingImport {
                specifier: specifier.to_string(),
                referrer: referrer.to_string(),
                promise: promise.clone(),
            });
            promise
        });

        let meta_state = state.clone();
        realm.set_init_import_meta_callback(move |module, meta| {
            meta.set("url", Value::String(module.url().to_string()));
            let is_main = meta_state.main.borrow().as_deref() == Some(module.url());
            meta.set("main", Value::Boolean(is_main));
        });

        Self { realm, state }
    }

    /// The realm this loader drives.
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// The entry module record of the last [`run`](Self::run), if any.
    pub fn main_module(&self) -> Option<Module> {
        let main = self.state.main.borrow();
        let url = main.as_deref()?;
        self.state.records.borrow().get(url).cloned()
    }

    /// Loads, links, and evaluates the module graph rooted at `path`, then
    /// drains any dynamic imports it queued. Returns the entry module's
    /// completion value.
    pub fn run(&self, path: &Path) -> Result<Value> {
        let url = file_url(path)?;
        *self.state.main.borrow_mut() = Some(url.to_string());

        let module = self.load(&url)?;
        module.instantiate()?;
        let completion = module.evaluate()?;
        self.drain_dynamic_imports();
        Ok(completion)
    }

    /// Returns the record for `url`, building it (and its whole dependency
    /// graph) on first sight: read, construct, compile, then resolve every
    /// request recursively so the resolution cache is fully populated
    /// before anything links. Cycles terminate through the record map.
    pub fn load(&self, url: &Url) -> Result<Module> {
        if let Some(existing) = self.state.records.borrow().get(url.as_str()) {
            return Ok(existing.clone());
        }

        tracing::debug!(%url, "loading module file");
        let path = url
            .to_file_path()
            .map_err(|_| LoaderError::InvalidUrl(url.to_string()))?;
        let source = std::fs::read_to_string(&path)?;

        let module = Module::new(&self.realm, url.as_str());
        module.compile(&source)?;
        self.state
            .records
            .borrow_mut()
            .insert(url.to_string(), module.clone());

        for specifier in module.requests()? {
            let dep_url = self.state.resolver.resolve(&specifier, url)?;
            let dep = self.load(&dep_url)?;
            module.resolve_request(&specifier, &dep)?;
        }

        Ok(module)
    }

    /// Fulfills queued dynamic imports until the queue is dry, loading and
    /// evaluating each requested graph and settling its promise. Returns
    /// the number of requests processed.
    pub fn drain_dynamic_imports(&self) -> usize {
        let mut drained = 0;
        loop {
            let request = self.state.pending.borrow_mut().pop_front();
            let Some(request) = request else {
                return drained;
            };
            drained += 1;
            match self.fulfill(&request) {
                Ok(namespace) => {
                    request.promise.fulfill(namespace);
                }
                Err(err) => {
                    tracing::debug!(
                        specifier = %request.specifier,
                        referrer = %request.referrer,
                        %err,
                        "dynamic import failed"
                    );
                    request.promise.reject(err.into_exception());
                }
            }
        }
    }

    fn fulfill(&self, request: &PendingImport) -> Result<Value> {
        let referrer = Url::parse(&request.referrer)
            .map_err(|_| LoaderError::InvalidUrl(request.referrer.clone()))?;
        let url = self.state.resolver.resolve(&request.specifier, &referrer)?;
        let module = self.load(&url)?;

        match module.status() {
            ModuleStatus::Uninstantiated => {
                module.instantiate()?;
                module.evaluate()?;
            }
            ModuleStatus::Instantiated => {
                module.evaluate()?;
            }
            // Already ran, or currently running higher up the drain
            ModuleStatus::Evaluated | ModuleStatus::Evaluating => {}
            _ => {
                return Err(LoaderError::Exception(module.exception().unwrap_or_else(
                    || Value::type_error("imported module is in an unexpected state"),
                )));
            }
        }

        module.namespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comet_engine::Engine;
    use std::fs;

    fn loader() -> FileLoader {
        FileLoader::new(Realm::new(&Engine::new()))
    }

    #[test]
    fn test_run_single_module() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.mjs");
        fs::write(&entry, "export const x = 40;\nx + 2;").unwrap();

        let completion = loader().run(&entry).unwrap();
        assert_eq!(completion, Value::Number(42.0));
    }

    #[test]
    fn test_run_graph_with_imports() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.mjs"), "export const x = 3;").unwrap();
        fs::write(
            dir.path().join("main.mjs"),
            "import { x } from './dep.mjs';\nx * x;",
        )
        .unwrap();

        let completion = loader().run(&dir.path().join("main.mjs")).unwrap();
        assert_eq!(completion, Value::Number(9.0));
    }

    #[test]
    fn test_records_are_shared_across_importers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shared.mjs"), "export const n = 1;").unwrap();
        fs::write(
            dir.path().join("a.mjs"),
            "import { n } from './shared.mjs';\nexport const a = n;",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.mjs"),
            "import { n } from './shared.mjs';\nexport const b = n;",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.mjs"),
            "import { a } from './a.mjs';\nimport { b } from './b.mjs';\na + b;",
        )
        .unwrap();

        let loader = loader();
        let completion = loader.run(&dir.path().join("main.mjs")).unwrap();
        assert_eq!(completion, Value::Number(2.0));
        // main, a, b, shared; shared loaded once
        assert_eq!(loader.realm().registered_modules(), 4);
    }

    #[test]
    fn test_import_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.mjs"),
            "import { b } from './b.mjs';\nexport const a = 1;\nb;",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.mjs"),
            "export const b = 2;\nimport './a.mjs';",
        )
        .unwrap();

        let completion = loader().run(&dir.path().join("a.mjs")).unwrap();
        assert_eq!(completion, Value::Number(2.0));
    }

    #[test]
    fn test_missing_dependency_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.mjs"),
            "import { x } from './nope.mjs';\nx;",
        )
        .unwrap();

        let err = loader().run(&dir.path().join("main.mjs")).unwrap_err();
        assert!(matches!(err, LoaderError::ModuleNotFound { .. }));
    }

    #[test]
    fn test_dynamic_import_is_drained() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lazy.mjs"), "export const lazy = 7;").unwrap();
        fs::write(dir.path().join("main.mjs"), "import('./lazy.mjs');").unwrap();

        let loader = loader();
        let completion = loader.run(&dir.path().join("main.mjs")).unwrap();
        let Value::Promise(promise) = completion else {
            panic!("expected a promise completion");
        };
        let Some(Ok(Value::Object(ns))) = promise.result() else {
            panic!("expected a fulfilled namespace");
        };
        assert_eq!(ns.get("lazy"), Some(Value::Number(7.0)));
    }

    #[test]
    fn test_dynamic_import_failure_rejects_promise() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.mjs"), "import('./ghost.mjs');").unwrap();

        let completion = loader().run(&dir.path().join("main.mjs")).unwrap();
        let Value::Promise(promise) = completion else {
            panic!("expected a promise completion");
        };
        let Some(Err(reason)) = promise.result() else {
            panic!("expected a rejected promise");
        };
        let Value::Error(e) = reason else {
            panic!("expected an error value");
        };
        assert!(e.message().contains("Cannot find module './ghost.mjs'"));
    }

    #[test]
    fn test_nested_dynamic_imports_drain_fully() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inner.mjs"), "export const deep = 3;").unwrap();
        fs::write(
            dir.path().join("outer.mjs"),
            "import('./inner.mjs');\nexport const outer = 2;",
        )
        .unwrap();
        fs::write(dir.path().join("main.mjs"), "import('./outer.mjs');").unwrap();

        let loader = loader();
        loader.run(&dir.path().join("main.mjs")).unwrap();
        // outer and inner both got loaded by the drain loop
        assert_eq!(loader.drain_dynamic_imports(), 0);
        assert_eq!(loader.realm().registered_modules(), 3);
    }

    #[test]
    fn test_import_meta_url_and_main() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.mjs"), "export const m = import.meta.main;").unwrap();
        fs::write(
            dir.path().join("main.mjs"),
            "import { m } from './dep.mjs';\nimport.meta.main;",
        )
        .unwrap();

        let loader = loader();
        let completion = loader.run(&dir.path().join("main.mjs")).unwrap();
        // The entry module sees main: true
        assert_eq!(completion, Value::Boolean(true));
        // The dependency saw main: false
        let url = file_url(&dir.path().join("dep.mjs")).unwrap();
        let dep = loader.load(&url).unwrap();
        let Value::Object(ns) = dep.namespace().unwrap() else {
            panic!("expected namespace");
        };
        assert_eq!(ns.get("m"), Some(Value::Boolean(false)));
    }

    #[test]
    fn test_dynamic_import_of_already_evaluated_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.mjs"), "export const x = 5;").unwrap();
        fs::write(
            dir.path().join("main.mjs"),
            "import { x } from './dep.mjs';\nimport('./dep.mjs');",
        )
        .unwrap();

        let completion = loader().run(&dir.path().join("main.mjs")).unwrap();
        let Value::Promise(promise) = completion else {
            panic!("expected a promise completion");
        };
        let Some(Ok(Value::Object(ns))) = promise.result() else {
            panic!("expected a fulfilled namespace");
        };
        assert_eq!(ns.get("x"), Some(Value::Number(5.0)));
    }
}
