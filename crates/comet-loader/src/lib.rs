// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! # comet-loader
//!
//! ECMAScript module linking and loading on top of the Comet engine.
//!
//! The engine handles syntax and graph evaluation but leaves specifier
//! resolution and dynamic-import triggering to the embedder. This crate is
//! the bookkeeping that contract demands:
//!
//! - a module record lifecycle that is driven incrementally (construct,
//!   compile, resolve each import, instantiate, evaluate), with every
//!   resolution answer cached *before* the engine's synchronous linking
//!   callback asks for it
//! - a per-realm registry that recovers a record from the opaque unit
//!   handle the engine hands back, tolerant of identity-hash collisions
//! - bridges that carry the engine's dynamic-import and `import.meta`
//!   callbacks into embedder-supplied logic
//! - a reference embedder ([`FileLoader`]) that drives all of the above
//!   from the file system
//!
//! ## Quick Start
//!
//! ```rust
//! use comet_engine::{Engine, Value};
//! use comet_loader::{Module, Realm};
//!
//! # fn main() -> comet_loader::Result<()> {
//! let realm = Realm::new(&Engine::new());
//!
//! let dep = Module::new(&realm, "file:///dep.mjs");
//! dep.compile("export const x = 3;")?;
//!
//! let main = Module::new(&realm, "file:///main.mjs");
//! main.compile("import { x } from 'dep';\nx * 14;")?;
//! main.resolve_request("dep", &dep)?;
//!
//! main.instantiate()?;
//! assert_eq!(main.evaluate()?, Value::Number(42.0));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod module_system;

// Re-exports
pub use error::{LoaderError, Result};
pub use module_system::{
    DynamicImportCallback, FileLoader, FileResolver, ImportMetaCallback, Module, ModuleRegistry,
    ModuleStatus, Realm,
};

/// Version of the comet-loader crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
