use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::extract::ParsedDocument;
use crate::ids::{ClassRecord, ClassScope, DocumentRecord, IdRegistry, ModuleRecord};
use crate::report::{ErrorType, ValidationError};
use crate::schema::{
    IdentifierLocation, IdentifierSpec, ModuleSchema, TypeMatch, TypeRegistry, UniquenessScope,
};
use crate::structure::{SectionId, SectionTree};
use crate::tokens::Position;
use crate::workspace::UnmanagedPatterns;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    /// Matched exactly one schema.
    Typed { schema: String },
    /// Matched no schema; still a reference source and target.
    Unmanaged,
    /// Matched several schemas; handled like an unmanaged document.
    Ambiguous,
}

/// One file after extraction, tree building and type assignment.
#[derive(Clone, Debug)]
pub struct Document {
    pub parsed: ParsedDocument,
    pub tree: SectionTree,
    /// Path relative to the validation root, used for schema matching.
    pub relative_path: PathBuf,
    pub kind: DocumentKind,
    pub module_id: Option<String>,
    /// Typed document whose required identifier could not be found.
    pub missing_identifier: bool,
}

impl Document {
    pub fn path(&self) -> &Path {
        &self.parsed.path
    }

    pub fn schema<'a>(&self, types: &'a TypeRegistry) -> Option<&'a ModuleSchema> {
        match &self.kind {
            DocumentKind::Typed { schema } => types.get(schema),
            _ => None,
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self.kind, DocumentKind::Typed { .. })
    }
}

/// Settings for the type-assignment pass.
pub struct ClassifyContext<'a> {
    pub types: &'a TypeRegistry,
    pub strict: bool,
    pub unmanaged: &'a UnmanagedPatterns,
}

/// Matches a document to a schema, extracts and registers its identifiers.
///
/// Duplicate identifiers are only recorded here; they are reported after every
/// document has been classified.
pub fn classify_document(
    parsed: ParsedDocument,
    tree: SectionTree,
    relative_path: PathBuf,
    ctx: &ClassifyContext<'_>,
    ids: &mut IdRegistry,
    diagnostics: &mut Vec<ValidationError>,
) -> Document {
    let mut document = Document {
        parsed,
        tree,
        relative_path,
        kind: DocumentKind::Unmanaged,
        module_id: None,
        missing_identifier: false,
    };

    match ctx.types.match_file(&document.relative_path) {
        TypeMatch::Unmatched => {
            if ctx.strict {
                if ctx.unmanaged.is_unmanaged(&document.relative_path) {
                    diagnostics.push(
                        ValidationError::info(
                            ErrorType::NoTypeMatch,
                            "file matches no module schema and is listed as unmanaged",
                        )
                        .in_file(document.path()),
                    );
                } else {
                    diagnostics.push(
                        ValidationError::warning(
                            ErrorType::UnclassifiedFile,
                            "file matches no module schema",
                        )
                        .in_file(document.path())
                        .with_suggestion(
                            "rename the file to match a schema or list it in the unmanaged patterns",
                        ),
                    );
                }
            }
        }
        TypeMatch::Ambiguous(names) => {
            document.kind = DocumentKind::Ambiguous;
            diagnostics.push(
                ValidationError::error(
                    ErrorType::AmbiguousTypeMatch,
                    format!("file matches several module schemas: {}", names.join(", ")),
                )
                .in_file(document.path())
                .with_suggestion("tighten the schemas' file or location patterns"),
            );
        }
        TypeMatch::Matched(schema) => {
            document.kind = DocumentKind::Typed {
                schema: schema.name.clone(),
            };
            assign_module_identifier(&mut document, schema, ids, diagnostics);
            register_class_instances(&document, schema, ids);
        }
    }

    ids.register_document(DocumentRecord {
        path: document.path().to_path_buf(),
        module_id: document.module_id.clone(),
        type_name: match &document.kind {
            DocumentKind::Typed { schema } => Some(schema.clone()),
            _ => None,
        },
        slugs: document
            .parsed
            .heading_slugs()
            .into_iter()
            .map(str::to_string)
            .collect(),
    });

    tracing::trace!(
        path = %document.path().display(),
        kind = ?document.kind,
        module_id = ?document.module_id,
        "classified document"
    );
    document
}

fn assign_module_identifier(
    document: &mut Document,
    schema: &ModuleSchema,
    ids: &mut IdRegistry,
    diagnostics: &mut Vec<ValidationError>,
) {
    let Some(spec) = &schema.identifier else {
        document.module_id = document.parsed.spec_id.clone();
        if let Some(id) = document.module_id.clone() {
            register_module(document, schema, id, ids);
        }
        return;
    };

    match find_module_identifier(document, spec) {
        Some(id) => {
            document.module_id = Some(id.clone());
            register_module(document, schema, id, ids);
        }
        None => {
            document.missing_identifier = true;
            let suggestion = match spec.location {
                IdentifierLocation::Title => format!(
                    "start the title with the identifier, e.g. `# <ID>: Title` (pattern {})",
                    spec.pattern
                ),
                IdentifierLocation::Metadata => format!(
                    "add a metadata line `**ID**: <ID>` (pattern {})",
                    spec.pattern
                ),
            };
            diagnostics.push(
                ValidationError::error(
                    ErrorType::MissingIdentifier,
                    format!(
                        "no {} identifier found for schema '{}'",
                        location_name(spec.location),
                        schema.name
                    ),
                )
                .in_file(document.path())
                .at_line(1)
                .with_suggestion(suggestion),
            );
        }
    }
}

fn location_name(location: IdentifierLocation) -> &'static str {
    match location {
        IdentifierLocation::Title => "title",
        IdentifierLocation::Metadata => "metadata",
    }
}

/// Title lookup tries the document-level `ID:` line, then the first top-level
/// heading's own id, then the pattern anywhere in that heading.
fn find_module_identifier(document: &Document, spec: &IdentifierSpec) -> Option<String> {
    match spec.location {
        IdentifierLocation::Title => {
            let tree = &document.tree;
            if let Some(id) = tree.root().id.as_deref().and_then(|id| spec.find_in(id)) {
                return Some(id.to_string());
            }
            let first = tree.node(*tree.root().children.first()?);
            first
                .id
                .as_deref()
                .and_then(|id| spec.find_in(id))
                .or_else(|| spec.find_in(&first.heading))
                .map(str::to_string)
        }
        IdentifierLocation::Metadata => document
            .parsed
            .metadata_value("id")
            .and_then(|value| spec.find_in(value))
            .map(str::to_string),
    }
}

fn register_module(document: &Document, schema: &ModuleSchema, id: String, ids: &mut IdRegistry) {
    let tree = &document.tree;
    let position = tree
        .root()
        .children
        .first()
        .map(|first| tree.node(*first).position)
        .unwrap_or(Position::line(1));
    ids.register_module(ModuleRecord {
        id,
        type_name: schema.name.clone(),
        path: document.path().to_path_buf(),
        position,
        metadata: document.parsed.metadata.clone(),
    });
}

fn register_class_instances(document: &Document, schema: &ModuleSchema, ids: &mut IdRegistry) {
    let tree = &document.tree;
    // A heading matched by several classes still declares its id once.
    let mut registered: BTreeSet<(SectionId, String)> = BTreeSet::new();
    for section in tree.all_sections() {
        let node = tree.node(section);
        for class in schema.classes.values() {
            if !class.matches(&node.heading) {
                continue;
            }
            let Some(id) = class.instance_id(&node.heading, node.id.as_deref()) else {
                continue;
            };
            if !registered.insert((section, id.clone())) {
                continue;
            }
            let scope = match class.scope() {
                UniquenessScope::Global => ClassScope::Global,
                UniquenessScope::Document => ClassScope::Document(document.path().to_path_buf()),
            };
            ids.register_class(
                scope,
                ClassRecord {
                    id,
                    type_name: class.name.clone(),
                    module_id: document.module_id.clone(),
                    path: document.path().to_path_buf(),
                    section_path: tree.section_path(section),
                    position: node.position,
                },
            );
        }
    }
}
