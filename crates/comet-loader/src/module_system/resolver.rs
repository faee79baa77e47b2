// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! File system specifier resolution for the reference embedder.
//!
//! Maps a specifier written in an import statement, in the context of a
//! referrer URL, to the `file://` URL of an existing module file. Only
//! relative (`./`, `../`) and absolute path specifiers are supported; bare
//! specifiers would need package resolution, which this embedder does not
//! take on.

use crate::error::{LoaderError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Resolves module specifiers against the file system.
#[derive(Debug)]
pub struct FileResolver {
    /// Extensions probed, in order, when the specifier names no existing
    /// file directly.
    extensions: Vec<&'static str>,
}

impl FileResolver {
    /// Creates a resolver with the default extension list.
    pub fn new() -> Self {
        Self {
            extensions: vec![".mjs", ".js"],
        }
    }

    /// Resolves `specifier` against `referrer`, returning the URL of an
    /// existing module file.
    pub fn resolve(&self, specifier: &str, referrer: &Url) -> Result<Url> {
        if !specifier.starts_with("./")
            && !specifier.starts_with("../")
            && !specifier.starts_with('/')
        {
            return Err(LoaderError::resolve(
                specifier,
                "bare specifiers are not supported; use a relative or absolute path",
            ));
        }

        let resolved = referrer
            .join(specifier)
            .map_err(|_| LoaderError::resolve(specifier, "specifier does not form a valid URL"))?;
        let path = resolved
            .to_file_path()
            .map_err(|_| LoaderError::InvalidUrl(resolved.to_string()))?;

        if path.is_file() {
            self.check_loadable(specifier, &path)?;
            return file_url(&path);
        }

        for ext in &self.extensions {
            let mut candidate = path.clone().into_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                self.check_loadable(specifier, &candidate)?;
                return file_url(&candidate);
            }
        }

        Err(LoaderError::ModuleNotFound {
            specifier: specifier.to_string(),
            referrer: referrer.to_string(),
        })
    }

    /// Rejects files that exist but cannot be loaded as ES modules.
    fn check_loadable(&self, specifier: &str, path: &Path) -> Result<()> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mjs") => Ok(()),
            Some("js") => {
                if self.find_package_type(path)?.as_deref() == Some("module") {
                    Ok(())
                } else {
                    Err(LoaderError::resolve(
                        specifier,
                        "'.js' files are only loadable from a package with \"type\": \"module\"",
                    ))
                }
            }
            Some(other) => Err(LoaderError::resolve(
                specifier,
                format!("unknown file extension '.{}'", other),
            )),
            None => Err(LoaderError::resolve(specifier, "file has no extension")),
        }
    }

    /// Walks up from the file looking for the nearest package.json `type`
    /// field.
    fn find_package_type(&self, path: &Path) -> Result<Option<String>> {
        let mut current = path.parent();
        while let Some(dir) = current {
            let pkg_path = dir.join("package.json");
            if pkg_path.is_file() {
                let content = std::fs::read_to_string(&pkg_path)?;
                let pkg: PackageJson = serde_json::from_str(&content)?;
                return Ok(pkg.type_field);
            }
            current = dir.parent();
        }
        Ok(None)
    }
}

impl Default for FileResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a path to a `file://` URL.
pub(crate) fn file_url(path: &Path) -> Result<Url> {
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Url::from_file_path(&absolute)
        .map_err(|_| LoaderError::InvalidUrl(absolute.display().to_string()))
}

/// Minimal package.json structure for type detection.
#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(rename = "type")]
    type_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn referrer(dir: &Path) -> Url {
        Url::from_file_path(dir.join("main.mjs")).unwrap()
    }

    #[test]
    fn test_relative_specifier_resolves() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.mjs"), "export const x = 1;").unwrap();

        let resolver = FileResolver::new();
        let url = resolver.resolve("./dep.mjs", &referrer(dir.path())).unwrap();
        assert!(url.path().ends_with("/dep.mjs"));
    }

    #[test]
    fn test_extension_probing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.mjs"), "export const x = 1;").unwrap();

        let resolver = FileResolver::new();
        let url = resolver.resolve("./dep", &referrer(dir.path())).unwrap();
        assert!(url.path().ends_with("/dep.mjs"));
    }

    #[test]
    fn test_bare_specifier_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new();
        let err = resolver.resolve("lodash", &referrer(dir.path())).unwrap_err();
        assert!(matches!(err, LoaderError::Resolve { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new();
        let err = resolver
            .resolve("./missing.mjs", &referrer(dir.path()))
            .unwrap_err();
        assert!(matches!(err, LoaderError::ModuleNotFound { .. }));
    }

    #[test]
    fn test_js_requires_module_package_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.js"), "export const x = 1;").unwrap();

        let resolver = FileResolver::new();
        let err = resolver.resolve("./dep.js", &referrer(dir.path())).unwrap_err();
        assert!(matches!(err, LoaderError::Resolve { .. }));

        fs::write(dir.path().join("package.json"), r#"{"type": "module"}"#).unwrap();
        let url = resolver.resolve("./dep.js", &referrer(dir.path())).unwrap();
        assert!(url.path().ends_with("/dep.js"));
    }

    #[test]
    fn test_parent_directory_specifier() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("shared.mjs"), "export const x = 1;").unwrap();

        let resolver = FileResolver::new();
        let url = resolver.resolve("../shared.mjs", &referrer(&nested)).unwrap();
        assert!(url.path().ends_with("/shared.mjs"));
    }
}
