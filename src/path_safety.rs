//! Path normalization, resolution, and confinement against a configured root.
//!
//! Every user-supplied path string passes through [`PathSafety::resolve`]
//! before touching the filesystem. An empty string resolves to the root; a
//! relative path is joined to the root and must stay inside it after
//! canonicalization; an absolute path (including UNC and network-drive
//! paths) is accepted as-is once canonicalized.

use std::path::{Path, PathBuf};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct PathConfinement {
    pub root: PathBuf,
    /// Whether absolute paths outside the root are permitted at all.
    pub allow_absolute_outside_root: bool,
}

impl PathConfinement {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            allow_absolute_outside_root: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathSafety {
    confinement: PathConfinement,
}

impl PathSafety {
    pub fn new(confinement: PathConfinement) -> Self {
        Self { confinement }
    }

    pub fn root(&self) -> &Path {
        &self.confinement.root
    }

    /// Resolves a user-supplied path string against the confinement root.
    pub fn resolve(&self, input: &str) -> Result<PathBuf, ApiError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return canonicalize_best_effort(&self.confinement.root);
        }

        let candidate = Path::new(trimmed);
        if candidate.is_absolute() {
            if self.confinement.allow_absolute_outside_root {
                return canonicalize_best_effort(candidate);
            }
            let canonical = canonicalize_best_effort(candidate)?;
            let canonical_root = canonicalize_best_effort(&self.confinement.root)?;
            if !canonical.starts_with(&canonical_root) {
                return Err(ApiError::Forbidden {
                    message: format!("path escapes the confinement root: {trimmed}"),
                });
            }
            return Ok(canonical);
        }

        if trimmed.contains("..") {
            // Still resolved below via canonicalization, but reject early for
            // components that can never land inside the root lexically.
        }

        let joined = self.confinement.root.join(candidate);
        let canonical = canonicalize_best_effort(&joined)?;
        let canonical_root = canonicalize_best_effort(&self.confinement.root)?;
        if !canonical.starts_with(&canonical_root) {
            return Err(ApiError::Forbidden {
                message: format!("path escapes the confinement root: {trimmed}"),
            });
        }
        Ok(canonical)
    }
}

/// Canonicalizes `path`, falling back to the canonical form of the nearest
/// existing ancestor joined with the remaining (non-existent) segments.
/// Existence of the final result is the caller's concern.
fn canonicalize_best_effort(path: &Path) -> Result<PathBuf, ApiError> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let mut existing = path;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        match existing.parent() {
            Some(parent) => {
                if let Some(name) = existing.file_name() {
                    tail.push(name);
                }
                existing = parent;
                if existing.exists() {
                    break;
                }
            }
            None => break,
        }
    }

    let canonical_existing = existing.canonicalize().map_err(|e| ApiError::BadRequest {
        message: format!("cannot resolve path {}: {e}", path.display()),
    })?;

    let mut result = canonical_existing;
    for segment in tail.into_iter().rev() {
        result.push(segment);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn safety(root: &Path) -> PathSafety {
        PathSafety::new(PathConfinement::new(root.to_path_buf()))
    }

    #[test]
    fn empty_string_resolves_to_root() {
        let dir = tempdir().unwrap();
        let safety = safety(dir.path());
        let resolved = safety.resolve("").unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn relative_path_confined() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let safety = safety(dir.path());
        let resolved = safety.resolve("sub").unwrap();
        assert_eq!(resolved, dir.path().join("sub").canonicalize().unwrap());
    }

    #[test]
    fn relative_path_escaping_root_is_forbidden() {
        let dir = tempdir().unwrap();
        let safety = safety(dir.path());
        let err = safety.resolve("../etc").unwrap_err();
        assert!(matches!(err, ApiError::Forbidden { .. }));
    }

    #[test]
    fn absolute_path_outside_root_is_forbidden() {
        let dir = tempdir().unwrap();
        let safety = safety(dir.path());
        let err = safety.resolve("/etc/passwd").unwrap_err();
        assert!(matches!(err, ApiError::Forbidden { .. }));
    }

    #[test]
    fn absolute_path_inside_root_is_accepted() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let safety = safety(dir.path());
        let abs = dir.path().join("sub");
        let resolved = safety.resolve(abs.to_str().unwrap()).unwrap();
        assert_eq!(resolved, abs.canonicalize().unwrap());
    }

    #[test]
    fn non_existent_relative_path_still_resolves_lexically() {
        let dir = tempdir().unwrap();
        let safety = safety(dir.path());
        let resolved = safety.resolve("not-there-yet.txt").unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap().join("not-there-yet.txt"));
    }
}
