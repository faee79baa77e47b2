// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! The module bookkeeping layer around the engine.
//!
//! The engine compiles and evaluates module graphs but externalizes
//! specifier resolution: before a record links, every specifier it imports
//! must already map to another record. This module supplies that layer:
//!
//! - [`Module`]: one record per module, holding the compiled unit, status,
//!   resolution cache, and recorded exception
//! - [`Realm`]: an evaluation context plus its registry and embedder
//!   callback configuration
//! - [`ModuleRegistry`]: recovers records from the opaque unit handles the
//!   engine passes to its callbacks
//! - [`FileResolver`] / [`FileLoader`]: the reference embedder, driving
//!   graphs from the file system

mod bridge;
mod loader;
mod realm;
mod record;
mod registry;
mod resolver;

pub use loader::FileLoader;
pub use realm::{DynamicImportCallback, ImportMetaCallback, Realm};
pub use record::{Module, ModuleStatus};
pub use registry::ModuleRegistry;
pub use resolver::FileResolver;
