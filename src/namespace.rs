//! Import lines in the `murmur` namespace package that expose installed
//! artifacts, e.g. `from .web_search.main import web_search`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::delegate::python::PythonEnv;
use crate::error::{MurError, codes};
use crate::manifest::pep8_name;

pub const NAMESPACE: &str = "murmur";
pub const SUBPACKAGES: [&str; 3] = ["agents", "tools", "artifacts"];

pub fn import_line(artifact_name: &str) -> String {
    let module = pep8_name(artifact_name);
    format!("from .{module}.main import {module}")
}

/// `<purelib>/murmur/artifacts/__init__.py`, creating the directory.
pub fn artifacts_init_path(python: &dyn PythonEnv) -> Result<PathBuf> {
    let dir = python.purelib()?.join(NAMESPACE).join("artifacts");
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir.join("__init__.py"))
}

/// Appends the import line once. Returns whether the file changed.
pub fn add_import(init_path: &Path, artifact_name: &str) -> Result<bool> {
    let line = import_line(artifact_name);
    let mut content = if init_path.exists() {
        fs::read_to_string(init_path)
            .with_context(|| format!("failed to read {}", init_path.display()))?
    } else {
        String::new()
    };
    if content.lines().any(|existing| existing.trim() == line) {
        return Ok(false);
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&line);
    content.push('\n');
    fs::write(init_path, content)
        .with_context(|| format!("failed to write {}", init_path.display()))?;
    Ok(true)
}

/// Drops every `from .<module>.` line. Returns whether the file changed.
pub fn remove_import(init_path: &Path, artifact_name: &str) -> Result<bool> {
    let prefix = format!("from .{}.", pep8_name(artifact_name));
    let content = fs::read_to_string(init_path)
        .with_context(|| format!("failed to read {}", init_path.display()))?;
    let kept: Vec<&str> = content
        .split_inclusive('\n')
        .filter(|line| !line.trim_start().starts_with(&prefix))
        .collect();
    let updated = kept.concat();
    if updated == content {
        return Ok(false);
    }
    fs::write(init_path, updated)
        .with_context(|| format!("failed to write {}", init_path.display()))?;
    Ok(true)
}

/// Removes the artifact's import lines from each sub-package `__init__.py`
/// found in the namespace locations.
pub fn cleanup_imports(python: &dyn PythonEnv, artifact_name: &str) -> Result<Vec<PathBuf>> {
    let locations = python.module_locations(NAMESPACE)?;
    if locations.is_empty() {
        return Err(MurError::new(codes::NAMESPACE_MISSING, "Could not locate murmur namespace")
            .warning()
            .into());
    }

    let mut changed = Vec::new();
    for subpackage in SUBPACKAGES {
        let Some(init_path) = locations
            .iter()
            .map(|location| location.join(subpackage).join("__init__.py"))
            .find(|path| path.exists())
        else {
            tracing::debug!(subpackage, "no __init__.py in murmur namespace locations");
            continue;
        };
        if remove_import(&init_path, artifact_name)? {
            tracing::info!(path = %init_path.display(), "removed import");
            changed.push(init_path);
        }
    }
    Ok(changed)
}
