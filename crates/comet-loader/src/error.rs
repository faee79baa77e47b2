// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! Error types for the module loading layer.

use crate::module_system::ModuleStatus;
use comet_engine::Value;
use thiserror::Error;

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur while loading, linking, or evaluating modules.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// An exception surfaced by the engine during compile, link, or
    /// evaluation. The same value is retrievable from the module record.
    #[error("{0}")]
    Exception(Value),

    /// An operation was invoked on a record whose status does not permit
    /// it. Never recorded on the record; its status is left untouched.
    #[error("cannot {op} module '{url}' while in status {status:?}")]
    InvalidStatus {
        /// The operation that was attempted.
        op: &'static str,
        /// The record's URL.
        url: String,
        /// The record's status at the time of the call.
        status: ModuleStatus,
    },

    /// A specifier did not resolve to a loadable file.
    #[error("Cannot find module '{specifier}' imported from {referrer}")]
    ModuleNotFound {
        /// The specifier as written.
        specifier: String,
        /// URL of the importing module.
        referrer: String,
    },

    /// A specifier resolved, but to something that cannot be loaded.
    #[error("Error resolving module '{specifier}': {reason}")]
    Resolve {
        /// The specifier as written.
        specifier: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A module URL that is not a valid file URL.
    #[error("Invalid module URL: {0}")]
    InvalidUrl(String),

    /// File system error while reading module source.
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// package.json could not be parsed.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl LoaderError {
    /// Creates a resolution error.
    pub fn resolve(specifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolve {
            specifier: specifier.into(),
            reason: reason.into(),
        }
    }

    /// The engine exception carried by this error, if any.
    pub fn exception_value(&self) -> Option<&Value> {
        match self {
            Self::Exception(value) => Some(value),
            _ => None,
        }
    }

    /// Converts this error into a value suitable for rejecting a promise:
    /// engine exceptions pass through unchanged, everything else becomes an
    /// `Error` value with this error's message.
    pub fn into_exception(self) -> Value {
        match self {
            Self::Exception(value) => value,
            other => Value::error("Error", other.to_string()),
        }
    }
}
