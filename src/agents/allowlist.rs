//! Path allow-list enforcement
//!
//! Every path an agent touches is normalized, symlinks in its existing
//! prefix are resolved, and the result must be a root or live under one.
//! The check happens before any operation on the target itself.

use crate::error::AgentError;
use std::path::{Component, Path, PathBuf};

/// Allow-list of directory roots
#[derive(Debug, Clone)]
pub struct PathPolicy {
    roots: Vec<PathBuf>,
}

impl PathPolicy {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|root| resolve_existing_prefix(&absolutize(root.as_ref())))
            .collect();
        Self { roots }
    }

    /// Normalized roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve a user-supplied path, rejecting anything outside the roots
    pub fn resolve(&self, input: &str) -> Result<PathBuf, AgentError> {
        let resolved = resolve_existing_prefix(&absolutize(Path::new(input)));

        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(AgentError::AccessDenied {
                path: input.to_string(),
            })
        }
    }

    /// Whether a resolved path is one of the roots themselves
    pub fn is_root(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| root == path)
    }
}

/// Make a path absolute and fold `.` and `..` lexically
fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonicalize the longest existing ancestor and re-append the rest
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}
