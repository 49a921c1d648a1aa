//! Live search: a bounded recursive name-match walk from a start directory.
//!
//! Always a simple walk, never a persistent index — see the bulk engine's
//! module docs for why this repo doesn't carry one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Extended with the caller's own patterns; version-control directories and
/// OS/tooling noise that shows up in nearly every project tree.
const DEFAULT_IGNORES: &[&str] = &[".git", ".svn", "__pycache__", ".DS_Store", "node_modules"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    All,
    File,
    Directory,
}

pub struct SearchParams<'a> {
    pub query: &'a str,
    pub start_path: &'a Path,
    pub max_depth: u32,
    pub ignore_patterns: &'a [String],
    pub max_results: usize,
    pub type_filter: TypeFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
}

pub fn search(params: &SearchParams) -> Result<Vec<SearchHit>, ApiError> {
    let mut ignore_globs: Vec<glob::Pattern> = Vec::new();
    for pattern in params.ignore_patterns.iter().chain(DEFAULT_IGNORES.iter().map(|s| &s.to_string())) {
        if let Ok(p) = glob::Pattern::new(pattern) {
            ignore_globs.push(p);
        }
    }

    let query_lower = params.query.to_lowercase();
    let mut results = Vec::new();
    walk(params.start_path, params.start_path, &query_lower, 0, params, &ignore_globs, &mut results);
    Ok(results)
}

fn should_ignore(name: &str, path_str: &str, ignore_globs: &[glob::Pattern]) -> bool {
    ignore_globs.iter().any(|p| p.matches(name) || path_str.contains(p.as_str()))
}

#[allow(clippy::too_many_arguments)]
fn walk(
    base: &Path,
    dir: &Path,
    query_lower: &str,
    depth: u32,
    params: &SearchParams,
    ignore_globs: &[glob::Pattern],
    results: &mut Vec<SearchHit>,
) {
    if results.len() >= params.max_results {
        return;
    }
    if params.max_depth != 0 && depth > params.max_depth {
        return;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if results.len() >= params.max_results {
            return;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let path_str = path.to_string_lossy().to_string();

        if should_ignore(&name, &path_str, ignore_globs) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        // Symlinks are never followed, and a symlink resolving back inside
        // the walked tree is skipped outright to prevent cycles.
        if file_type.is_symlink() {
            if let Ok(resolved) = path.canonicalize()
                && resolved.starts_with(base)
            {
                continue;
            }
            continue;
        }

        let is_dir = file_type.is_dir();

        if name.to_lowercase().contains(query_lower) {
            let type_ok = match params.type_filter {
                TypeFilter::All => true,
                TypeFilter::File => !is_dir,
                TypeFilter::Directory => is_dir,
            };
            if type_ok {
                results.push(SearchHit {
                    name: name.clone(),
                    path: path_str,
                    is_directory: is_dir,
                });
            }
        }

        if is_dir {
            walk(base, &path, query_lower, depth + 1, params, ignore_globs, results);
        }
    }
}

pub fn count_files(paths: &[PathBuf], max_depth: u32) -> u64 {
    let mut count = 0u64;
    for path in paths {
        count += count_recursive(path, 0, max_depth);
    }
    count
}

fn count_recursive(dir: &Path, depth: u32, max_depth: u32) -> u64 {
    if max_depth != 0 && depth > max_depth {
        return 0;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut count = 0u64;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            count += count_recursive(&entry.path(), depth + 1, max_depth);
        } else {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ignores_node_modules_by_default() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/foo.txt"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/foo.txt"), b"x").unwrap();

        let params = SearchParams {
            query: "foo",
            start_path: dir.path(),
            max_depth: 0,
            ignore_patterns: &[],
            max_results: 1000,
            type_filter: TypeFilter::All,
        };
        let hits = search(&params).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].path.contains("src"));
    }

    #[test]
    fn case_insensitive_substring_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ReadMe.TXT"), b"x").unwrap();

        let params = SearchParams {
            query: "readme",
            start_path: dir.path(),
            max_depth: 0,
            ignore_patterns: &[],
            max_results: 1000,
            type_filter: TypeFilter::All,
        };
        let hits = search(&params).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn respects_max_results_cap() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("match-{i}.txt")), b"x").unwrap();
        }

        let params = SearchParams {
            query: "match",
            start_path: dir.path(),
            max_depth: 0,
            ignore_patterns: &[],
            max_results: 3,
            type_filter: TypeFilter::All,
        };
        let hits = search(&params).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn count_files_counts_recursively() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"x").unwrap();
        let count = count_files(&[dir.path().to_path_buf()], 0);
        assert_eq!(count, 2);
    }
}
