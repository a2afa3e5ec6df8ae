use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ids::{DocumentRecord, IdRegistry};
use crate::report::{ErrorType, Severity, ValidationError};
use crate::schema::{ReferenceRule, TypeRegistry};
use crate::suggest;

use super::{Reference, ReferenceGraph, ReferenceKind};

const MARKDOWN_EXTENSIONS: [&str; 2] = [".md", ".markdown"];

/// What a reference landed on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedTarget {
    Module {
        path: PathBuf,
        module_id: Option<String>,
    },
    Class {
        path: PathBuf,
        module_id: Option<String>,
        class_id: String,
    },
    /// Fragment matched a heading anchor rather than a class id.
    Heading {
        path: PathBuf,
        module_id: Option<String>,
        slug: String,
    },
    External {
        url: String,
    },
}

impl ResolvedTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedTarget::Module { path, .. }
            | ResolvedTarget::Class { path, .. }
            | ResolvedTarget::Heading { path, .. } => Some(path),
            ResolvedTarget::External { .. } => None,
        }
    }

    pub fn module_id(&self) -> Option<&str> {
        match self {
            ResolvedTarget::Module { module_id, .. }
            | ResolvedTarget::Class { module_id, .. }
            | ResolvedTarget::Heading { module_id, .. } => module_id.as_deref(),
            ResolvedTarget::External { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub target: ResolvedTarget,
}

#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub resolved: Vec<ResolvedReference>,
    /// Non-external references that went through resolution.
    pub checked: usize,
    pub diagnostics: Vec<ValidationError>,
}

/// Resolves references against a fully populated [`IdRegistry`].
pub struct ReferenceResolver<'a> {
    ids: &'a IdRegistry,
    types: &'a TypeRegistry,
    allow_circular: bool,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(ids: &'a IdRegistry, types: &'a TypeRegistry) -> Self {
        Self {
            ids,
            types,
            allow_circular: false,
        }
    }

    /// Global default; a reference rule's own `allow_circular` overrides it.
    pub fn allow_circular(mut self, allow: bool) -> Self {
        self.allow_circular = allow;
        self
    }

    /// Resolution, type compatibility, cardinality and cycle checks over the
    /// whole reference set.
    pub fn resolve_all(&self, references: &[Reference]) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();

        for reference in references {
            if !reference.is_external() {
                outcome.checked += 1;
            }
            match self.resolve(reference) {
                Ok(target) => {
                    if let Some(warning) = self.check_target_type(reference, &target) {
                        outcome.diagnostics.push(warning);
                    }
                    outcome.resolved.push(ResolvedReference {
                        reference: reference.clone(),
                        target,
                    });
                }
                Err(error) => outcome.diagnostics.push(error),
            }
        }

        outcome.diagnostics.extend(self.check_cardinality(references));
        outcome.diagnostics.extend(self.check_cycles(&outcome.resolved));

        tracing::debug!(
            checked = outcome.checked,
            resolved = outcome.resolved.len(),
            findings = outcome.diagnostics.len(),
            "resolved references"
        );
        outcome
    }

    pub fn resolve(&self, reference: &Reference) -> Result<ResolvedTarget, ValidationError> {
        if reference.kind == ReferenceKind::ExternalReference {
            return Ok(ResolvedTarget::External {
                url: reference.target.clone(),
            });
        }

        let (path_part, fragment) = split_target(&reference.target);
        match fragment {
            Some(fragment) => self.resolve_fragment(reference, path_part, fragment),
            None => {
                let document = self.resolve_document(reference, path_part)?;
                Ok(ResolvedTarget::Module {
                    path: document.path.clone(),
                    module_id: document.module_id.clone(),
                })
            }
        }
    }

    /// Module id lookup first, then a path relative to the referencing file.
    fn resolve_document(
        &self,
        reference: &Reference,
        path_part: &str,
    ) -> Result<&'a DocumentRecord, ValidationError> {
        let ids = self.ids;
        let candidate = strip_markdown_extension(path_part);

        if let Some(document) = ids.module(candidate).and_then(|m| ids.document(&m.path)) {
            return Ok(document);
        }

        if !candidate.is_empty() {
            let relative = if candidate.len() == path_part.len() {
                format!("{path_part}.md")
            } else {
                path_part.to_string()
            };
            let base = reference.source_file.parent().unwrap_or(Path::new(""));
            let resolved = normalize_path_lexical(&base.join(relative));
            if let Some(document) = ids.resolve_path(&resolved) {
                return Ok(document);
            }
        }

        Err(self.broken(
            reference,
            format!("broken reference: '{candidate}' does not match any module id or document"),
            candidate,
            ids.module_ids().collect(),
        ))
    }

    fn resolve_fragment(
        &self,
        reference: &Reference,
        path_part: &str,
        fragment: &str,
    ) -> Result<ResolvedTarget, ValidationError> {
        let ids = self.ids;
        let document = if path_part.is_empty() {
            ids.document(&reference.source_file).ok_or_else(|| {
                self.broken(
                    reference,
                    format!("broken reference: '{}' has no source document", reference.target),
                    fragment,
                    Vec::new(),
                )
            })?
        } else {
            self.resolve_document(reference, path_part)?
        };

        if let Some(class) = ids.find_class(&document.path, fragment) {
            return Ok(ResolvedTarget::Class {
                path: document.path.clone(),
                module_id: document.module_id.clone(),
                class_id: class.id.clone(),
            });
        }

        let slug = fragment.to_lowercase();
        if document.slugs.contains(&slug) {
            return Ok(ResolvedTarget::Heading {
                path: document.path.clone(),
                module_id: document.module_id.clone(),
                slug,
            });
        }

        let owner = document
            .module_id
            .clone()
            .unwrap_or_else(|| document.path.display().to_string());
        let mut pool = ids.class_ids_in(&document.path);
        pool.extend(document.slugs.iter().map(String::as_str));
        Err(self.broken(
            reference,
            format!("broken reference: '{fragment}' is not a class or heading in {owner}"),
            fragment,
            pool,
        ))
    }

    fn broken(
        &self,
        reference: &Reference,
        message: String,
        needle: &str,
        pool: Vec<&str>,
    ) -> ValidationError {
        let candidates = suggest::closest(needle, pool);
        let optional = self.rule_for(reference).is_some_and(|rule| !rule.must_exist);
        let severity = if optional {
            Severity::Warning
        } else {
            Severity::Error
        };

        let message = match suggest::did_you_mean(&candidates) {
            Some(hint) => format!("{message} ({hint})"),
            None => message,
        };
        let mut error = located(
            ValidationError::new(ErrorType::BrokenReference, severity, message),
            reference,
        );
        if let Some(best) = candidates.first() {
            error = error.with_suggestion(format!("link to {best}"));
        }
        error
    }

    fn rule_for(&self, reference: &Reference) -> Option<&'a ReferenceRule> {
        let relationship = reference.relationship.as_deref()?;
        let type_name = self
            .ids
            .document(&reference.source_file)?
            .type_name
            .as_deref()?;
        self.types.get(type_name)?.reference_rule(relationship)
    }

    /// Resolved, but pointing at a document of another type than the rule expects.
    fn check_target_type(
        &self,
        reference: &Reference,
        target: &ResolvedTarget,
    ) -> Option<ValidationError> {
        let rule = self.rule_for(reference)?;
        let expected = rule.target_type.as_deref()?;
        let document = self.ids.document(target.path()?)?;
        let actual = document.type_name.as_deref();
        if actual == Some(expected) {
            return None;
        }
        Some(
            located(
                ValidationError::warning(
                    ErrorType::ReferenceWarning,
                    format!(
                        "'{}' reference should target a {expected}, but '{}' is {}",
                        rule.name,
                        reference.target,
                        actual.map_or("unmanaged".to_string(), |t| format!("a {t}"))
                    ),
                ),
                reference,
            )
            .with_suggestion(format!("link to a {expected} document")),
        )
    }

    /// Counts outgoing references per typed module and declared rule.
    pub fn check_cardinality(&self, references: &[Reference]) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for document in self.ids.documents() {
            let (Some(module_id), Some(type_name)) = (&document.module_id, &document.type_name)
            else {
                continue;
            };
            let Some(schema) = self.types.get(type_name) else {
                continue;
            };
            let line = self
                .ids
                .module(module_id)
                .filter(|record| record.path == document.path)
                .map_or(1, |record| record.position.line);

            for rule in schema.references.iter().filter(|r| r.source_type == schema.name) {
                let count = references
                    .iter()
                    .filter(|r| {
                        r.source_file == document.path
                            && r.relationship.as_deref() == Some(rule.name.as_str())
                    })
                    .count();
                let problem = if rule.cardinality.is_below_min(count) {
                    "missing required reference"
                } else if rule.cardinality.is_above_max(count) {
                    "too many references"
                } else {
                    continue;
                };
                errors.push(
                    ValidationError::error(
                        ErrorType::CardinalityViolation,
                        format!(
                            "{module_id}: {problem} '{}' (expected {}, found {count})",
                            rule.name, rule.cardinality
                        ),
                    )
                    .in_file(&document.path)
                    .at_line(line),
                );
            }
        }
        errors
    }

    /// Skipped entirely when no edge is subject to the cycle check.
    pub fn check_cycles(&self, resolved: &[ResolvedReference]) -> Vec<ValidationError> {
        let mut graph = ReferenceGraph::new();
        for item in resolved {
            let (Some(source), Some(target)) = (
                item.reference.source_module_id.as_deref(),
                item.target.module_id(),
            ) else {
                continue;
            };
            let allowed = self
                .rule_for(&item.reference)
                .and_then(|rule| rule.allow_circular)
                .unwrap_or(self.allow_circular);
            if !allowed {
                graph.add_edge(source, target);
            }
        }

        if graph.is_empty() {
            tracing::debug!("no reference edges subject to cycle detection");
            return Vec::new();
        }

        graph
            .find_cycles()
            .into_iter()
            .map(|cycle| {
                let mut error = ValidationError::error(
                    ErrorType::CircularReference,
                    format!("circular reference: {}", cycle.join(" -> ")),
                )
                .with_suggestion("remove one of the references or mark the relationship allow_circular");
                if let Some(record) = cycle.first().and_then(|id| self.ids.module(id)) {
                    error = error.in_file(&record.path).at_line(record.position.line);
                }
                error
            })
            .collect()
    }
}

fn located(error: ValidationError, reference: &Reference) -> ValidationError {
    error
        .in_file(&reference.source_file)
        .at_line(reference.position.line)
        .at_column(reference.position.column)
        .with_context(reference.target.clone())
}

/// Splits `path?query#fragment` into the path and the optional fragment.
fn split_target(target: &str) -> (&str, Option<&str>) {
    fn strip_query(s: &str) -> &str {
        s.split_once('?').map_or(s, |(before, _)| before)
    }
    match target.trim().split_once('#') {
        Some((path, fragment)) => (strip_query(path), Some(strip_query(fragment).trim())),
        None => (strip_query(target.trim()), None),
    }
}

fn strip_markdown_extension(path: &str) -> &str {
    let lowered = path.to_ascii_lowercase();
    MARKDOWN_EXTENSIONS
        .iter()
        .find(|ext| lowered.ends_with(*ext))
        .map_or(path, |ext| &path[..path.len() - ext.len()])
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize_path_lexical(path: &Path) -> PathBuf {
    let mut anchored = PathBuf::new();
    let mut parts: Vec<OsString> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => anchored.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() && anchored.as_os_str().is_empty() {
                    parts.push(OsString::from(".."));
                }
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }

    anchored.extend(parts);
    anchored
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::ids::{ClassRecord, ClassScope, ModuleRecord};
    use crate::tokens::Position;

    fn registry_with(docs: &[(&str, Option<&str>, Option<&str>)]) -> IdRegistry {
        let mut ids = IdRegistry::new();
        for (path, id, type_name) in docs {
            let path = PathBuf::from(path);
            if let (Some(id), Some(type_name)) = (id, type_name) {
                ids.register_module(ModuleRecord {
                    id: id.to_string(),
                    type_name: type_name.to_string(),
                    path: path.clone(),
                    position: Position::line(1),
                    metadata: BTreeMap::new(),
                });
            }
            ids.register_document(DocumentRecord {
                path,
                module_id: id.map(str::to_string),
                type_name: type_name.map(str::to_string),
                slugs: BTreeSet::from(["overview".to_string()]),
            });
        }
        ids
    }

    fn reference(source: &str, source_id: Option<&str>, target: &str, relationship: Option<&str>) -> Reference {
        Reference {
            source_file: PathBuf::from(source),
            source_module_id: source_id.map(str::to_string),
            source_section: None,
            text: target.to_string(),
            target: target.to_string(),
            kind: crate::references::classify_target(target),
            position: Position::new(3, Some(1)),
            relationship: relationship.map(str::to_string),
            context: None,
        }
    }

    #[test]
    fn module_reference_by_id_and_by_relative_path() {
        let ids = registry_with(&[
            ("/ws/reqs/REQ-001.md", Some("REQ-001"), Some("requirement")),
            ("/ws/reqs/REQ-002.md", Some("REQ-002"), Some("requirement")),
            ("/ws/notes/glossary.md", None, None),
        ]);
        let types = TypeRegistry::with_defaults();
        let resolver = ReferenceResolver::new(&ids, &types);

        let by_id = resolver
            .resolve(&reference("/ws/reqs/REQ-001.md", Some("REQ-001"), "REQ-002.md", None))
            .unwrap();
        assert_eq!(by_id.module_id(), Some("REQ-002"));

        let by_path = resolver
            .resolve(&reference("/ws/reqs/REQ-001.md", Some("REQ-001"), "../notes/glossary.md", None))
            .unwrap();
        assert_eq!(by_path.path(), Some(Path::new("/ws/notes/glossary.md")));
        assert_eq!(by_path.module_id(), None);
    }

    #[test]
    fn unresolved_module_names_stripped_target_and_suggests() {
        let ids = registry_with(&[("/ws/REQ-001.md", Some("REQ-001"), Some("requirement"))]);
        let types = TypeRegistry::with_defaults();
        let err = ReferenceResolver::new(&ids, &types)
            .resolve(&reference("/ws/REQ-001.md", Some("REQ-001"), "REQ-002.md", None))
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::BrokenReference);
        assert_eq!(err.severity, Severity::Error);
        assert!(err.message.contains("'REQ-002'"), "{}", err.message);
        assert!(err.message.contains("did you mean: REQ-001?"));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn optional_relationship_downgrades_broken_reference() {
        let ids = registry_with(&[("/ws/REQ-001.md", Some("REQ-001"), Some("requirement"))]);
        let types = TypeRegistry::with_defaults();
        let err = ReferenceResolver::new(&ids, &types)
            .resolve(&reference("/ws/REQ-001.md", Some("REQ-001"), "TEST-9.md", Some("validated_by")))
            .unwrap_err();
        assert_eq!(err.severity, Severity::Warning);
    }

    #[test]
    fn class_and_heading_fragments() {
        let mut ids = registry_with(&[
            ("/ws/REQ-001.md", Some("REQ-001"), Some("requirement")),
            ("/ws/REQ-002.md", Some("REQ-002"), Some("requirement")),
        ]);
        ids.register_class(
            ClassScope::Document(PathBuf::from("/ws/REQ-002.md")),
            ClassRecord {
                id: "AC-01".to_string(),
                type_name: "acceptance_criterion".to_string(),
                module_id: Some("REQ-002".to_string()),
                path: PathBuf::from("/ws/REQ-002.md"),
                section_path: Vec::new(),
                position: Position::line(7),
            },
        );
        let types = TypeRegistry::with_defaults();
        let resolver = ReferenceResolver::new(&ids, &types);

        let class = resolver
            .resolve(&reference("/ws/REQ-001.md", Some("REQ-001"), "REQ-002.md#AC-01", None))
            .unwrap();
        assert!(matches!(class, ResolvedTarget::Class { ref class_id, .. } if class_id == "AC-01"));

        let heading = resolver
            .resolve(&reference("/ws/REQ-001.md", Some("REQ-001"), "#overview", None))
            .unwrap();
        assert!(matches!(heading, ResolvedTarget::Heading { .. }));

        let err = resolver
            .resolve(&reference("/ws/REQ-001.md", Some("REQ-001"), "REQ-002.md#AC-02", None))
            .unwrap_err();
        assert!(err.message.contains("'AC-02'"));
        assert!(err.message.contains("AC-01"));

        let err = resolver
            .resolve(&reference("/ws/REQ-001.md", Some("REQ-001"), "#AC-01", None))
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::BrokenReference);
    }

    #[test]
    fn type_mismatch_is_a_warning_on_a_resolved_reference() {
        let ids = registry_with(&[
            ("/ws/ADR-001.md", Some("ADR-001"), Some("adr")),
            ("/ws/ADR-002.md", Some("ADR-002"), Some("adr")),
            ("/ws/REQ-001.md", Some("REQ-001"), Some("requirement")),
        ]);
        let types = TypeRegistry::with_defaults();
        let outcome = ReferenceResolver::new(&ids, &types).resolve_all(&[reference(
            "/ws/ADR-002.md",
            Some("ADR-002"),
            "REQ-001.md",
            Some("supersedes"),
        )]);
        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].error_type, ErrorType::ReferenceWarning);
        assert_eq!(outcome.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn rule_level_allow_circular_overrides_the_global_default() {
        let ids = registry_with(&[
            ("/ws/REQ-001.md", Some("REQ-001"), Some("requirement")),
            ("/ws/REQ-002.md", Some("REQ-002"), Some("requirement")),
        ]);
        let types = TypeRegistry::from_yaml_str(
            r"
- name: requirement
  file_pattern: '^REQ-\d+\.md$'
  sections: [{heading: Overview, required: true}]
  references:
    - name: depends_on
      allow_circular: false
    - name: see_also
      allow_circular: true
",
        )
        .unwrap();
        let loop_of = |relationship: &str| {
            vec![
                reference("/ws/REQ-001.md", Some("REQ-001"), "REQ-002.md", Some(relationship)),
                reference("/ws/REQ-002.md", Some("REQ-002"), "REQ-001.md", Some(relationship)),
            ]
        };

        let permissive = ReferenceResolver::new(&ids, &types).allow_circular(true);
        let resolved = permissive.resolve_all(&loop_of("depends_on")).resolved;
        assert_eq!(resolved.len(), 2);
        let errors = permissive.check_cycles(&resolved);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorType::CircularReference);

        let strict = ReferenceResolver::new(&ids, &types).allow_circular(false);
        let resolved = strict.resolve_all(&loop_of("see_also")).resolved;
        assert_eq!(resolved.len(), 2);
        assert!(strict.check_cycles(&resolved).is_empty());
    }

    #[test]
    fn lexical_normalization() {
        assert_eq!(
            normalize_path_lexical(Path::new("/ws/a/./b/../c.md")),
            PathBuf::from("/ws/a/c.md")
        );
        assert_eq!(normalize_path_lexical(Path::new("../x.md")), PathBuf::from("../x.md"));
    }

    #[test]
    fn split_target_drops_query() {
        assert_eq!(split_target("REQ-002.md?plain=1#AC-01"), ("REQ-002.md", Some("AC-01")));
        assert_eq!(split_target("REQ-002.md"), ("REQ-002.md", None));
        assert_eq!(strip_markdown_extension("notes/Glossary.MD"), "notes/Glossary");
    }
}
