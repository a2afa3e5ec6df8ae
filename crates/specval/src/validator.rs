use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{ClassifyContext, Document, classify_document};
use crate::config::ValidationOptions;
use crate::error::SpecvalError;
use crate::extract::SpecExtractor;
use crate::ids::IdRegistry;
use crate::references::{Reference, ReferenceResolver, extract_references};
use crate::report::{ErrorType, ValidationError, ValidationResult};
use crate::schema::TypeRegistry;
use crate::structural::validate_structure;
use crate::structure::SectionTree;
use crate::traceability::trace_modules;
use crate::workspace::{UnmanagedPatterns, canonical_root, discover_markdown_files};

/// Multi-pass validator over a corpus of markdown documents.
///
/// Each run builds a fresh [`IdRegistry`]; the [`TypeRegistry`] is shared and
/// read-only.
#[derive(Clone)]
pub struct Validator {
    types: TypeRegistry,
    options: ValidationOptions,
    extractor: SpecExtractor,
}

impl Validator {
    pub fn new(types: TypeRegistry, options: ValidationOptions) -> Result<Self, SpecvalError> {
        let extractor = match &options.identifier_pattern {
            Some(pattern) => SpecExtractor::with_pattern(pattern).map_err(|err| {
                SpecvalError::Config(format!("invalid identifier pattern '{pattern}': {err}"))
            })?,
            None => SpecExtractor::new(),
        };
        Ok(Self {
            types,
            options,
            extractor,
        })
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Discovers markdown files under `root` and validates them together.
    ///
    /// Only a missing or unreadable root is an `Err`; everything else ends up in
    /// the returned report.
    pub fn validate(&self, root: &Path) -> Result<ValidationResult, SpecvalError> {
        let root = canonical_root(root)?;
        let files = discover_markdown_files(&root, &self.options)?;

        let mut diagnostics = Vec::new();
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            match fs::read_to_string(&path) {
                Ok(content) => sources.push((path, content)),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to read document");
                    diagnostics.push(
                        ValidationError::error(
                            ErrorType::ParseError,
                            format!("failed to read document: {err}"),
                        )
                        .in_file(&path),
                    );
                }
            }
        }

        self.run(&root, sources, diagnostics)
    }

    /// Validates in-memory documents; relative paths are taken relative to `root`.
    pub fn validate_sources(
        &self,
        root: &Path,
        sources: Vec<(PathBuf, String)>,
    ) -> Result<ValidationResult, SpecvalError> {
        let sources = sources
            .into_iter()
            .map(|(path, content)| {
                let path = if path.is_absolute() {
                    path
                } else {
                    root.join(path)
                };
                (path, content)
            })
            .collect();
        self.run(root, sources, Vec::new())
    }

    fn run(
        &self,
        root: &Path,
        sources: Vec<(PathBuf, String)>,
        mut diagnostics: Vec<ValidationError>,
    ) -> Result<ValidationResult, SpecvalError> {
        let unmanaged = UnmanagedPatterns::new(root, &self.options.unmanaged_patterns)?;
        let ctx = ClassifyContext {
            types: &self.types,
            strict: self.options.strict,
            unmanaged: &unmanaged,
        };
        let mut ids = IdRegistry::new();

        // Every document is registered before any reference is resolved.
        let mut documents: Vec<Document> = Vec::with_capacity(sources.len());
        for (path, content) in sources {
            let parsed = match self.extractor.extract(&path, &content, &mut diagnostics) {
                Ok(parsed) => parsed,
                Err(error) => {
                    diagnostics.push(error);
                    continue;
                }
            };
            let tree = SectionTree::build(&parsed);
            let relative = path.strip_prefix(root).unwrap_or(path.as_path()).to_path_buf();
            documents.push(classify_document(
                parsed,
                tree,
                relative,
                &ctx,
                &mut ids,
                &mut diagnostics,
            ));
        }
        diagnostics.extend(ids.duplicate_errors());
        tracing::debug!(
            documents = documents.len(),
            typed = documents.iter().filter(|d| d.is_typed()).count(),
            "classified documents"
        );

        for document in &documents {
            if let Some(schema) = document.schema(&self.types) {
                diagnostics.extend(validate_structure(document, schema));
            }
        }

        let references: Vec<Reference> = documents
            .iter()
            .flat_map(|document| extract_references(document, document.schema(&self.types)))
            .collect();
        let outcome = ReferenceResolver::new(&ids, &self.types)
            .allow_circular(self.options.allow_circular)
            .resolve_all(&references);
        diagnostics.extend(outcome.diagnostics);

        let traceability = self.options.traceability.as_ref().map(|trace| {
            trace_modules(root, &self.options, trace, &ids, self.extractor.id_pattern())
        });
        if let Some(report) = &traceability {
            diagnostics.extend(report.warnings(&ids));
        }

        let mut result = ValidationResult::from_diagnostics(diagnostics, documents.len(), references);
        result.references_validated = outcome.checked;
        result.traceability = traceability;

        tracing::info!(
            documents = result.documents_validated,
            references = result.references_validated,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "validation finished"
        );
        Ok(result)
    }
}

/// Validates `root` with the built-in schemas.
pub fn validate(root: &Path, options: &ValidationOptions) -> Result<ValidationResult, SpecvalError> {
    Validator::new(TypeRegistry::with_defaults(), options.clone())?.validate(root)
}
