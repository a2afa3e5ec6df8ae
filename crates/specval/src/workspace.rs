//! Candidate file discovery and the unmanaged-path matcher.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::ValidationOptions;
use crate::error::SpecvalError;

const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Canonical root of a validation run.
pub fn canonical_root(root: &Path) -> Result<PathBuf, SpecvalError> {
    if !root.exists() {
        return Err(SpecvalError::Workspace(format!(
            "validation root {} does not exist",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(SpecvalError::Workspace(format!(
            "validation root {} is not a directory",
            root.display()
        )));
    }
    fs::canonicalize(root).map_err(SpecvalError::from)
}

/// Markdown files under `root`, sorted, with VCS directories, hidden entries
/// and ignored paths removed.
pub fn discover_markdown_files(
    root: &Path,
    options: &ValidationOptions,
) -> Result<Vec<PathBuf>, SpecvalError> {
    let mut files: Vec<PathBuf> = walker(root, options)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| is_markdown(path))
        .collect();
    files.sort();
    tracing::debug!(root = %root.display(), count = files.len(), "discovered markdown files");
    Ok(files)
}

/// Walker configured with the run's ignore layers; shared with the test scan.
pub(crate) fn walker(root: &Path, options: &ValidationOptions) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .ignore(false)
        .parents(options.respect_gitignore)
        .git_ignore(options.respect_gitignore)
        .git_global(false)
        .git_exclude(options.respect_gitignore)
        .require_git(false);
    if options.use_specignore && !options.specignore_file.is_empty() {
        builder.add_custom_ignore_filename(&options.specignore_file);
    }
    builder
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Paths that are deliberately left without a schema.
///
/// Matching such a path turns the strict-mode `unclassified_file` warning into
/// a `no_type_match` info.
#[derive(Clone, Debug)]
pub struct UnmanagedPatterns {
    matcher: Gitignore,
}

impl UnmanagedPatterns {
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self, SpecvalError> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder.add_line(None, pattern).map_err(|err| {
                SpecvalError::Config(format!("invalid unmanaged pattern '{pattern}': {err}"))
            })?;
        }
        let matcher = builder
            .build()
            .map_err(|err| SpecvalError::Config(format!("invalid unmanaged patterns: {err}")))?;
        Ok(Self { matcher })
    }

    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    /// `relative` is relative to the validation root.
    pub fn is_unmanaged(&self, relative: &Path) -> bool {
        if relative.has_root() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }
}
