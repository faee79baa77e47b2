// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! The callback bridges between the engine and embedder logic.
//!
//! Both bridges are crossed synchronously by the engine mid-evaluation.
//! The dynamic-import bridge does no resolution work of its own: it
//! forwards (specifier, referrer, host-options flag) unchanged to the
//! registered resolver and hands the resolver's promise straight back to
//! the engine; the promise is the only channel through which the
//! embedder's (possibly asynchronous) answer crosses back. Resolver
//! failures travel through that promise's rejection channel, never as
//! bridge-level errors.
//!
//! The import-meta bridge recovers the owning record from the registry
//! before forwarding, since the engine only supplies an opaque unit handle.

use crate::module_system::realm::RealmState;
use comet_engine::{HostHooks, JsObject, JsPromise, ModuleUnit, Value};
use std::rc::Rc;

/// Adapter installed as the engine's host hooks, routing callbacks to the
/// realm's configured slots.
pub(crate) struct HostBridges {
    state: Rc<RealmState>,
}

impl HostBridges {
    pub(crate) fn new(state: Rc<RealmState>) -> Self {
        Self { state }
    }
}

impl HostHooks for HostBridges {
    fn import_module_dynamically(
        &self,
        specifier: &str,
        referrer: &str,
        has_host_options: bool,
    ) -> JsPromise {
        tracing::trace!(specifier, referrer, has_host_options, "dynamic import requested");
        let resolver = self.state.dynamic_import.borrow().clone();
        match resolver {
            Some(resolver) => resolver(specifier, referrer, has_host_options),
            None => JsPromise::rejected(Value::type_error(format!(
                "A dynamic import callback was not specified (while importing '{}' from {})",
                specifier, referrer
            ))),
        }
    }

    fn initialize_import_meta(&self, unit: &ModuleUnit, meta: &JsObject) -> Result<(), Value> {
        let populator = self.state.import_meta.borrow().clone();
        let Some(populator) = populator else {
            return Err(Value::type_error(
                "An import.meta callback was not specified",
            ));
        };
        // A unit whose record is already gone (racing teardown) is a no-op
        let record = self.state.registry.borrow_mut().lookup(unit);
        let Some(record) = record else {
            tracing::debug!(url = unit.url(), "import.meta for unregistered module; skipping");
            return Ok(());
        };
        populator(&record, meta);
        Ok(())
    }
}
