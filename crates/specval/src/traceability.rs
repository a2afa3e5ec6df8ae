//! Links module ids to the test sources that mention them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{TraceabilityOptions, ValidationOptions};
use crate::ids::IdRegistry;
use crate::report::{ErrorType, ValidationError};
use crate::workspace::walker;

const BINARY_CHECK_BYTES: usize = 8192;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestLocation {
    pub file: PathBuf,
    pub line: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceabilityReport {
    /// Module id → every test location mentioning it.
    pub coverage: BTreeMap<String, Vec<TestLocation>>,
    /// Modules of a covered type with no test mention.
    pub untested: Vec<String>,
    pub files_scanned: usize,
}

impl TraceabilityReport {
    pub fn is_covered(&self, module_id: &str) -> bool {
        self.coverage.contains_key(module_id)
    }

    /// One `untested_module` warning per untested module.
    pub fn warnings(&self, ids: &IdRegistry) -> Vec<ValidationError> {
        self.untested
            .iter()
            .map(|id| {
                let mut warning = ValidationError::warning(
                    ErrorType::UntestedModule,
                    format!("module {id} is not mentioned by any test"),
                )
                .with_suggestion(format!("reference {id} from a test name or comment"));
                if let Some(record) = ids.module(id) {
                    warning = warning.in_file(&record.path).at_line(record.position.line);
                }
                warning
            })
            .collect()
    }
}

/// Walks the configured test roots and records where known module ids appear.
///
/// Identifier-like strings are found with `id_pattern`; only ids present in the
/// registry count.
pub fn trace_modules(
    root: &Path,
    options: &ValidationOptions,
    trace: &TraceabilityOptions,
    ids: &IdRegistry,
    id_pattern: &Regex,
) -> TraceabilityReport {
    let mut report = TraceabilityReport::default();
    let extensions: BTreeSet<&str> = trace.extensions.iter().map(String::as_str).collect();

    for test_root in &trace.test_paths {
        let test_root = if test_root.is_absolute() {
            test_root.clone()
        } else {
            root.join(test_root)
        };
        if !test_root.exists() {
            tracing::warn!(path = %test_root.display(), "traceability test path does not exist");
            continue;
        }

        for entry in walker(&test_root, options).build().flatten() {
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let matches_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(ext));
            if !matches_extension || is_binary(path) {
                continue;
            }
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable test file");
                    continue;
                }
            };

            report.files_scanned += 1;
            let file = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            for (index, line) in content.lines().enumerate() {
                for found in id_pattern.find_iter(line) {
                    if ids.module(found.as_str()).is_none() {
                        continue;
                    }
                    let locations = report.coverage.entry(found.as_str().to_string()).or_default();
                    let location = TestLocation {
                        file: file.clone(),
                        line: index + 1,
                    };
                    if !locations.contains(&location) {
                        locations.push(location);
                    }
                }
            }
        }
    }

    report.untested = ids
        .modules()
        .filter(|record| trace.types.is_empty() || trace.types.contains(&record.type_name))
        .map(|record| record.id.clone())
        .filter(|id| !report.coverage.contains_key(id))
        .collect();

    tracing::debug!(
        files = report.files_scanned,
        covered = report.coverage.len(),
        untested = report.untested.len(),
        "traced modules to tests"
    );
    report
}

/// Check first few bytes for nulls.
fn is_binary(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut buffer = [0; BINARY_CHECK_BYTES];
    match file.read(&mut buffer) {
        Ok(n) => buffer[..n].contains(&0),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::default_identifier_regex;
    use crate::ids::ModuleRecord;
    use crate::tokens::Position;
    use tempfile::tempdir;

    fn registry(ids: &[(&str, &str)]) -> IdRegistry {
        let mut registry = IdRegistry::new();
        for (id, type_name) in ids {
            registry.register_module(ModuleRecord {
                id: id.to_string(),
                type_name: type_name.to_string(),
                path: PathBuf::from(format!("/ws/{id}.md")),
                position: Position::line(1),
                metadata: BTreeMap::new(),
            });
        }
        registry
    }

    #[test]
    fn mentions_in_test_files_cover_modules() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(
            root.join("tests/login.rs"),
            "// covers REQ-001\n#[test]\nfn req_001() {}\n// REQ-999 is not a module\n",
        )
        .unwrap();
        fs::write(root.join("tests/notes.txt"), "REQ-002\n").unwrap();
        fs::write(root.join("tests/blob.rs"), b"REQ-002\0\0").unwrap();

        let ids = registry(&[("REQ-001", "requirement"), ("REQ-002", "requirement"), ("ADR-001", "adr")]);
        let trace = TraceabilityOptions {
            types: vec!["requirement".to_string()],
            ..TraceabilityOptions::default()
        };
        let report = trace_modules(
            root,
            &ValidationOptions::default(),
            &trace,
            &ids,
            default_identifier_regex(),
        );

        assert!(report.is_covered("REQ-001"));
        assert_eq!(
            report.coverage["REQ-001"],
            vec![TestLocation {
                file: PathBuf::from("tests/login.rs"),
                line: 1
            }]
        );
        assert_eq!(report.untested, vec!["REQ-002"]);
        assert_eq!(report.files_scanned, 1);

        let warnings = report.warnings(&ids);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].error_type, ErrorType::UntestedModule);
        assert_eq!(warnings[0].file.as_deref(), Some(Path::new("/ws/REQ-002.md")));
    }

    #[test]
    fn missing_test_root_yields_everything_untested() {
        let temp = tempdir().unwrap();
        let ids = registry(&[("REQ-001", "requirement")]);
        let report = trace_modules(
            temp.path(),
            &ValidationOptions::default(),
            &TraceabilityOptions::default(),
            &ids,
            default_identifier_regex(),
        );
        assert_eq!(report.untested, vec!["REQ-001"]);
        assert_eq!(report.files_scanned, 0);
    }
}
