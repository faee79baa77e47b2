// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! The per-realm module registry.
//!
//! The engine's linking and import-meta callbacks hand back only an opaque
//! unit handle; the registry is how the wrapper record owning that unit is
//! recovered. It is indexed by the engine's identity hash, which is *not*
//! unique (distinct units can share a hash), so every bucket hit is
//! confirmed with handle equality before it counts.
//!
//! Entries are weak: the registry never owns records, and a record dies
//! when the embedder drops its last handle. Each realm owns one registry;
//! nothing here is process-global.

use crate::module_system::record::{Module, ModuleInner};
use comet_engine::ModuleUnit;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Index from engine identity hash to the records owning colliding units.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    entries: HashMap<i32, Vec<Weak<ModuleInner>>>,
}

impl ModuleRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a record under its compiled unit's identity hash. Called
    /// exactly once per record, at successful compile time; records whose
    /// compile failed are never registered.
    pub(crate) fn register(&mut self, record: &Module) {
        let hash = record
            .unit()
            .expect("only compiled records are registered")
            .identity_hash();
        tracing::trace!(url = record.url(), hash, "registering module");
        self.entries
            .entry(hash)
            .or_default()
            .push(Rc::downgrade(&record.inner));
    }

    /// Finds the record owning `unit`: hash lookup, then handle equality
    /// over the bucket. Dead entries encountered on the way are pruned.
    pub(crate) fn lookup(&mut self, unit: &ModuleUnit) -> Option<Module> {
        let bucket = self.entries.get_mut(&unit.identity_hash())?;
        bucket.retain(|entry| entry.strong_count() > 0);
        for entry in bucket.iter() {
            let Some(inner) = entry.upgrade() else {
                continue;
            };
            let owns_unit = inner
                .state
                .borrow()
                .unit
                .as_ref()
                .is_some_and(|candidate| candidate.same(unit));
            if owns_unit {
                return Some(Module::from_inner(inner));
            }
        }
        None
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flatten()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    /// True if no live registrations remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
