// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! # comet-engine
//!
//! A miniature ECMAScript module engine: enough of the language to compile,
//! link, and evaluate module graphs, exposed through the narrow surface an
//! embedder needs.
//!
//! ## Overview
//!
//! The engine compiles a small module subset (import/export declarations,
//! `const` bindings, arithmetic and string expressions, `throw`, dynamic
//! `import()` and `import.meta`) and leaves everything an embedder is better
//! placed to decide to host callbacks: how specifiers map to modules, how
//! dynamic imports are fulfilled, and what `import.meta` contains.
//!
//! ## Quick Start
//!
//! ```rust
//! use comet_engine::{Engine, ModuleOrigin, Value};
//!
//! let ctx = Engine::new().create_context();
//! let unit = ctx
//!     .compile_module(ModuleOrigin::new("file:///a.mjs"), "export const x = 41;\nx + 1;")
//!     .unwrap();
//! unit.instantiate(&mut |_, _| unreachable!("no imports")).unwrap();
//! assert_eq!(unit.evaluate().unwrap(), Value::Number(42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
mod interpreter;
pub mod lexer;
pub mod parser;
mod module;
mod value;

pub use module::{
    Context, Engine, HostHooks, ModuleOrigin, ModuleUnit, ResolveModuleCallback, UnitStatus,
};
pub use value::{JsError, JsObject, JsPromise, Value};
