// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! Realms: one evaluation context and its module bookkeeping.
//!
//! A [`Realm`] owns an engine context, the registry of records compiled
//! into it, and the two embedder callback slots (dynamic import and
//! `import.meta`). Callback configuration lives here rather than in
//! process-wide state: realms coexist without sharing anything, each with a
//! single writer, and dropping a realm tears its bookkeeping down with it.

use crate::module_system::bridge::HostBridges;
use crate::module_system::record::Module;
use crate::module_system::registry::ModuleRegistry;
use comet_engine::{Context, Engine, JsObject, JsPromise};
use std::cell::RefCell;
use std::rc::Rc;

/// The embedder's dynamic-import resolver: receives the specifier, the
/// referrer's resource name, and whether the referrer carries host-defined
/// options; returns the promise that settles the `import()` expression.
pub type DynamicImportCallback = Rc<dyn Fn(&str, &str, bool) -> JsPromise>;

/// The embedder's `import.meta` populator: receives the owning record and
/// the freshly created metadata object to mutate in place.
pub type ImportMetaCallback = Rc<dyn Fn(&Module, &JsObject)>;

/// An isolated module evaluation context.
#[derive(Debug, Clone)]
pub struct Realm {
    context: Context,
    state: Rc<RealmState>,
}

pub(crate) struct RealmState {
    pub(crate) registry: RefCell<ModuleRegistry>,
    pub(crate) dynamic_import: RefCell<Option<DynamicImportCallback>>,
    pub(crate) import_meta: RefCell<Option<ImportMetaCallback>>,
}

impl std::fmt::Debug for RealmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmState")
            .field("registry", &self.registry.borrow())
            .field("dynamic_import", &self.dynamic_import.borrow().is_some())
            .field("import_meta", &self.import_meta.borrow().is_some())
            .finish()
    }
}

impl Realm {
    /// Creates a realm with a fresh context and empty registry, and wires
    /// the engine's host hooks to this realm's callback slots.
    pub fn new(engine: &Engine) -> Self {
        let context = engine.create_context();
        let state = Rc::new(RealmState {
            registry: RefCell::new(ModuleRegistry::new()),
            dynamic_import: RefCell::new(None),
            import_meta: RefCell::new(None),
        });
        context.set_host_hooks(Rc::new(HostBridges::new(state.clone())));
        Self { context, state }
    }

    /// The engine context modules are compiled into.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn state(&self) -> &Rc<RealmState> {
        &self.state
    }

    /// Registers the dynamic-import resolver, replacing any previous one.
    /// Without a resolver, dynamic imports reject loudly.
    pub fn set_dynamic_import_callback(
        &self,
        resolver: impl Fn(&str, &str, bool) -> JsPromise + 'static,
    ) {
        tracing::debug!("installing dynamic import callback");
        *self.state.dynamic_import.borrow_mut() = Some(Rc::new(resolver));
    }

    /// Registers the `import.meta` populator, replacing any previous one.
    /// Without a populator, `import.meta` access throws.
    pub fn set_init_import_meta_callback(&self, populator: impl Fn(&Module, &JsObject) + 'static) {
        tracing::debug!("installing import.meta callback");
        *self.state.import_meta.borrow_mut() = Some(Rc::new(populator));
    }

    /// Number of records currently registered in this realm.
    pub fn registered_modules(&self) -> usize {
        self.state.registry.borrow().len()
    }
}
