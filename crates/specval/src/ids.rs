//! Per-run identifier registry.
//!
//! Created empty by each validation run, filled during type assignment and
//! read-only during reference resolution. Re-registering an identifier never
//! overwrites the first occurrence; every occurrence is kept so duplicates can
//! be reported once, after all documents are classified.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::report::{ErrorType, ValidationError, path_to_forward_slashes};
use crate::tokens::Position;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: String,
    pub type_name: String,
    pub path: PathBuf,
    pub position: Position,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassRecord {
    pub id: String,
    pub type_name: String,
    pub module_id: Option<String>,
    pub path: PathBuf,
    pub section_path: Vec<String>,
    pub position: Position,
}

/// Every document in the corpus, typed or not, for path-based resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRecord {
    pub path: PathBuf,
    pub module_id: Option<String>,
    pub type_name: Option<String>,
    pub slugs: BTreeSet<String>,
}

/// Uniqueness bucket for class identifiers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassScope {
    Global,
    /// Scoped to one document, keyed by its path.
    Document(PathBuf),
}

#[derive(Clone, Debug, Default)]
pub struct IdRegistry {
    modules: BTreeMap<String, ModuleRecord>,
    classes: BTreeMap<(ClassScope, String), ClassRecord>,
    documents: BTreeMap<PathBuf, DocumentRecord>,
    module_occurrences: BTreeMap<String, Vec<ModuleRecord>>,
    class_occurrences: BTreeMap<(ClassScope, String), Vec<ClassRecord>>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a module id; returns `false` when the id was already taken.
    pub fn register_module(&mut self, record: ModuleRecord) -> bool {
        let occurrences = self
            .module_occurrences
            .entry(record.id.clone())
            .or_default();
        occurrences.push(record.clone());
        if self.modules.contains_key(&record.id) {
            return false;
        }
        self.modules.insert(record.id.clone(), record);
        true
    }

    pub fn register_class(&mut self, scope: ClassScope, record: ClassRecord) -> bool {
        let key = (scope, record.id.clone());
        self.class_occurrences
            .entry(key.clone())
            .or_default()
            .push(record.clone());
        if self.classes.contains_key(&key) {
            return false;
        }
        self.classes.insert(key, record);
        true
    }

    pub fn register_document(&mut self, record: DocumentRecord) {
        self.documents.entry(record.path.clone()).or_insert(record);
    }

    pub fn module(&self, id: &str) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Every registration of `id`, in registration order.
    pub fn module_occurrences(&self, id: &str) -> &[ModuleRecord] {
        self.module_occurrences
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reverse file → document lookup (typed, degraded and unmanaged documents).
    pub fn resolve_path(&self, path: &Path) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    pub fn document(&self, path: &Path) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents.values()
    }

    /// Document-scoped lookup first, then global.
    ///
    /// Searches every occurrence, so a document still finds its own instance
    /// of a globally duplicated id.
    pub fn find_class(&self, document: &Path, id: &str) -> Option<&ClassRecord> {
        [ClassScope::Document(document.to_path_buf()), ClassScope::Global]
            .into_iter()
            .filter_map(|scope| self.class_occurrences.get(&(scope, id.to_string())))
            .flatten()
            .find(|record| record.path == document)
    }

    pub fn class_ids_in(&self, document: &Path) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .class_occurrences
            .values()
            .flatten()
            .filter(|record| record.path == document)
            .map(|record| record.id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// One error per duplicated identifier, listing every location.
    ///
    /// Locations are sorted by path and line so the report does not depend on
    /// registration order.
    pub fn duplicate_errors(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (id, occurrences) in &self.module_occurrences {
            if occurrences.len() < 2 {
                continue;
            }
            let mut locations: Vec<(&Path, usize)> = occurrences
                .iter()
                .map(|r| (r.path.as_path(), r.position.line))
                .collect();
            locations.sort();
            errors.push(duplicate_error(
                ErrorType::DuplicateModuleId,
                format!("module id '{id}'"),
                &locations,
            ));
        }

        for ((_, id), occurrences) in &self.class_occurrences {
            if occurrences.len() < 2 {
                continue;
            }
            let mut locations: Vec<(&Path, usize)> = occurrences
                .iter()
                .map(|r| (r.path.as_path(), r.position.line))
                .collect();
            locations.sort();
            errors.push(duplicate_error(
                ErrorType::DuplicateClassId,
                format!("class id '{id}'"),
                &locations,
            ));
        }

        errors
    }
}

fn duplicate_error(
    error_type: ErrorType,
    subject: String,
    locations: &[(&Path, usize)],
) -> ValidationError {
    let listed = locations
        .iter()
        .map(|(path, line)| format!("{}:{line}", path_to_forward_slashes(path)))
        .collect::<Vec<_>>();
    let (first_path, first_line) = locations[0];
    ValidationError::error(
        error_type,
        format!(
            "{subject} is declared {} times: {}",
            locations.len(),
            listed.join(", ")
        ),
    )
    .in_file(first_path)
    .at_line(first_line)
    .with_suggestion("give each occurrence a unique identifier")
    .with_context(listed.join("\n"))
}
