pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod front_matter;
pub mod ids;
pub mod references;
pub mod report;
pub mod schema;
pub mod structural;
pub mod structure;
pub mod suggest;
pub mod tokens;
pub mod traceability;
pub mod validator;
pub mod workspace;

pub use classify::{ClassifyContext, Document, DocumentKind, classify_document};
pub use config::{SpecvalConfig, TraceabilityOptions, ValidationOptions};
pub use error::{SchemaError, SpecvalError};
pub use extract::{
    DEFAULT_IDENTIFIER_PATTERN, Heading, IdentifierOccurrence, ParsedDocument, SpecExtractor,
    slugify_heading,
};
pub use ids::{ClassRecord, ClassScope, DocumentRecord, IdRegistry, ModuleRecord};
pub use references::{
    Reference, ReferenceGraph, ReferenceKind, ReferenceResolver, ResolutionOutcome,
    ResolvedReference, ResolvedTarget, classify_target, extract_references, infer_relationship,
};
pub use report::{ErrorType, Severity, ValidationError, ValidationResult};
pub use schema::{
    BuiltinValidator, Cardinality, ClassDefinition, ClassSchema, ContentValidator,
    IdentifierDefinition, IdentifierLocation, IdentifierSpec, ModuleDefinition, ModuleSchema,
    ReferenceDefinition, ReferenceRule, SectionContent, SectionDefinition, SectionRule, TypeMatch,
    TypeRegistry, UniquenessScope, ValidatorRef, ValidatorSet,
};
pub use structural::validate_structure;
pub use structure::{ContentBlock, ROOT, SectionId, SectionNode, SectionTree, section_body};
pub use tokens::{BlockKind, Position, Token, tokenize};
pub use traceability::{TestLocation, TraceabilityReport, trace_modules};
pub use validator::{Validator, validate};
pub use workspace::{UnmanagedPatterns, canonical_root, discover_markdown_files};
