//! Cross-document references: extraction, resolution, cardinality and cycles.

mod extract;
mod graph;
mod resolve;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tokens::Position;

pub use extract::{classify_target, extract_references, infer_relationship};
pub use graph::ReferenceGraph;
pub use resolve::{ReferenceResolver, ResolutionOutcome, ResolvedReference, ResolvedTarget};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    ModuleReference,
    /// Target carries a `#fragment`.
    ClassReference,
    ExternalReference,
}

/// One hyperlink found in a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source_file: PathBuf,
    pub source_module_id: Option<String>,
    /// Nearest enclosing heading.
    pub source_section: Option<String>,
    pub text: String,
    /// Raw link destination.
    pub target: String,
    pub kind: ReferenceKind,
    pub position: Position,
    pub relationship: Option<String>,
    pub context: Option<String>,
}

impl Reference {
    pub fn is_external(&self) -> bool {
        self.kind == ReferenceKind::ExternalReference
    }
}
