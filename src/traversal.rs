//! Directory traversal
//!
//! Produces the list of regular files to inventory. Hidden entries (names
//! starting with `.`) are skipped and hidden directories are pruned without
//! descending into them. `.gitignore` files get no special treatment: only
//! the hidden-name convention and explicit ignore globs exclude anything.
//! Symbolic links are not followed and are not returned.

use crate::error::Result;
use crate::utils;
use ignore::{overrides::OverrideBuilder, WalkBuilder, WalkState};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Traversal settings
#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    /// Glob patterns (gitignore syntax) to exclude, relative to the root;
    /// patterns starting with `!` are skipped
    pub ignore_patterns: Vec<String>,
    /// Specific files never returned, e.g. the snapshot being written
    pub exclude: Vec<PathBuf>,
    /// Walker threads (0 = let the walker decide)
    pub threads: usize,
}

/// Collect every regular, non-hidden file under `root`
///
/// Paths are returned joined onto `root` and sorted. Entries the walker
/// cannot read are logged and skipped.
pub fn collect_files(root: &Path, options: &TraversalOptions) -> Result<Vec<PathBuf>> {
    let start = Instant::now();

    let mut walker_builder = WalkBuilder::new(root);
    walker_builder
        .follow_links(false)
        .hidden(true)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .threads(options.threads);

    if !options.ignore_patterns.is_empty() {
        let mut override_builder = OverrideBuilder::new(root);
        for pattern in &options.ignore_patterns {
            // A negated pattern would become a whitelist and hide everything else.
            if pattern.starts_with('!') {
                warn!("Skipping ignore pattern '{}': negation is not supported", pattern);
                continue;
            }
            // Override globs select by default; a leading ! turns them into exclusions.
            if let Err(e) = override_builder.add(&format!("!{}", pattern)) {
                warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match override_builder.build() {
            Ok(overrides) => {
                walker_builder.overrides(overrides);
            }
            Err(e) => warn!("Ignoring ignore patterns: {}", e),
        }
    }

    let excluded = Arc::new(excluded_keys(root, &options.exclude));
    let files = Arc::new(Mutex::new(Vec::<PathBuf>::new()));

    walker_builder.build_parallel().run(|| {
        let files = Arc::clone(&files);
        let excluded = Arc::clone(&excluded);
        let root = root.to_path_buf();

        Box::new(move |entry_result| {
            match entry_result {
                Ok(entry) => {
                    let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                    if !is_file {
                        return WalkState::Continue;
                    }

                    let path = entry.path();
                    if !excluded.is_empty() {
                        if let Ok(relative) = utils::make_relative(path, &root) {
                            if excluded.contains(&relative) {
                                trace!("Excluding {:?}", path);
                                return WalkState::Continue;
                            }
                        }
                    }

                    files.lock().push(path.to_path_buf());
                }
                Err(e) => {
                    warn!("Walk error: {}", e);
                }
            }
            WalkState::Continue
        })
    });

    let mut files = std::mem::take(&mut *files.lock());
    files.sort();

    debug!("Found {} files under {:?} in {:?}", files.len(), root, start.elapsed());
    Ok(files)
}

/// Root-relative paths of the explicitly excluded files that live under `root`
fn excluded_keys(root: &Path, exclude: &[PathBuf]) -> HashSet<PathBuf> {
    let Ok(root_canon) = root.canonicalize() else {
        return HashSet::new();
    };

    exclude
        .iter()
        .filter_map(|path| {
            let file_name = path.file_name()?;
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let absolute = parent.canonicalize().ok()?.join(file_name);
            absolute.strip_prefix(&root_canon).ok().map(Path::to_path_buf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn relative_names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| utils::snapshot_key(&utils::make_relative(f, root).unwrap()))
            .collect()
    }

    #[test]
    fn test_collects_regular_files_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("top.txt"), "1").unwrap();
        fs::write(root.join("a/mid.txt"), "2").unwrap();
        fs::write(root.join("a/b/deep.txt"), "3").unwrap();
        fs::create_dir(root.join("empty")).unwrap();

        let files = collect_files(root, &TraversalOptions::default()).unwrap();
        assert_eq!(
            relative_names(root, &files),
            vec!["a/b/deep.txt", "a/mid.txt", "top.txt"]
        );
    }

    #[test]
    fn test_hidden_entries_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join(".git/objects/abc"), "obj").unwrap();
        fs::write(root.join(".env"), "secret").unwrap();
        fs::write(root.join("src/.hidden.rs"), "h").unwrap();
        fs::write(root.join("src/main.rs"), "m").unwrap();

        let files = collect_files(root, &TraversalOptions::default()).unwrap();
        assert_eq!(relative_names(root, &files), vec!["src/main.rs"]);
    }

    #[test]
    fn test_gitignore_is_not_honored() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("keep.log"), "log").unwrap();
        fs::write(root.join(".gitignore"), "*.log").unwrap();

        let files = collect_files(root, &TraversalOptions::default()).unwrap();
        assert_eq!(relative_names(root, &files), vec!["keep.log"]);
    }

    #[test]
    fn test_negated_pattern_does_not_whitelist() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.jpg"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("c.tmp"), "c").unwrap();

        let options = TraversalOptions {
            ignore_patterns: vec!["!*.jpg".to_string(), "*.tmp".to_string()],
            ..Default::default()
        };
        let files = collect_files(root, &options).unwrap();
        assert_eq!(relative_names(root, &files), vec!["a.jpg", "b.txt"]);
    }

    #[test]
    fn test_ignore_patterns_and_excludes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("cache")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.tmp"), "b").unwrap();
        fs::write(root.join("cache/c.txt"), "c").unwrap();
        fs::write(root.join("files.json"), "{}").unwrap();

        let options = TraversalOptions {
            ignore_patterns: vec!["*.tmp".to_string(), "cache/".to_string()],
            exclude: vec![root.join("files.json")],
            threads: 2,
        };
        let files = collect_files(root, &options).unwrap();
        assert_eq!(relative_names(root, &files), vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_returned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("real.txt"), "r").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        let files = collect_files(root, &TraversalOptions::default()).unwrap();
        assert_eq!(relative_names(root, &files), vec!["real.txt"]);
    }
}
