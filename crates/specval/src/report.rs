use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SpecvalError;
use crate::references::Reference;
use crate::traceability::TraceabilityReport;

/// Closed vocabulary of diagnostics produced by the validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ParseError,
    MissingIdentifier,
    DuplicateModuleId,
    DuplicateClassId,
    MissingSection,
    MissingRequiredClasses,
    MisplacedClassInstance,
    IncorrectHeadingLevel,
    InvalidGherkinFormat,
    EmptyContent,
    BrokenReference,
    ReferenceWarning,
    CardinalityViolation,
    CircularReference,
    UnclassifiedFile,
    NoTypeMatch,
    AmbiguousTypeMatch,
    UntestedModule,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::ParseError => "parse_error",
            ErrorType::MissingIdentifier => "missing_identifier",
            ErrorType::DuplicateModuleId => "duplicate_module_id",
            ErrorType::DuplicateClassId => "duplicate_class_id",
            ErrorType::MissingSection => "missing_section",
            ErrorType::MissingRequiredClasses => "missing_required_classes",
            ErrorType::MisplacedClassInstance => "misplaced_class_instance",
            ErrorType::IncorrectHeadingLevel => "incorrect_heading_level",
            ErrorType::InvalidGherkinFormat => "invalid_gherkin_format",
            ErrorType::EmptyContent => "empty_content",
            ErrorType::BrokenReference => "broken_reference",
            ErrorType::ReferenceWarning => "reference_warning",
            ErrorType::CardinalityViolation => "cardinality_violation",
            ErrorType::CircularReference => "circular_reference",
            ErrorType::UnclassifiedFile => "unclassified_file",
            ErrorType::NoTypeMatch => "no_type_match",
            ErrorType::AmbiguousTypeMatch => "ambiguous_type_match",
            ErrorType::UntestedModule => "untested_module",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// One diagnostic with file/line context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
    pub suggestion: Option<String>,
    pub context: Option<String>,
}

impl ValidationError {
    pub fn new(error_type: ErrorType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            error_type,
            severity,
            file: None,
            line: None,
            column: None,
            message: message.into(),
            suggestion: None,
            context: None,
        }
    }

    pub fn error(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::new(error_type, Severity::Error, message)
    }

    pub fn warning(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::new(error_type, Severity::Warning, message)
    }

    pub fn info(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::new(error_type, Severity::Info, message)
    }

    pub fn in_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn at_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn location(&self) -> String {
        let mut out = match &self.file {
            Some(path) => path_to_forward_slashes(path),
            None => "<workspace>".to_string(),
        };
        if let Some(line) = self.line {
            out.push_str(&format!(":{line}"));
            if let Some(column) = self.column {
                out.push_str(&format!(":{column}"));
            }
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.location(),
            self.severity,
            self.error_type,
            self.message
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n    suggestion: {suggestion}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\n    context: {context}")?;
        }
        Ok(())
    }
}

/// Aggregated outcome of one `validate()` run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `true` when no `error`-severity diagnostics were produced.
    pub success: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    pub infos: Vec<ValidationError>,
    pub documents_validated: usize,
    pub references_validated: usize,
    /// Every link extracted from the corpus, in document order.
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceability: Option<TraceabilityReport>,
}

impl ValidationResult {
    /// Splits diagnostics by severity, keeping each list in a stable file/line order.
    pub fn from_diagnostics(
        diagnostics: Vec<ValidationError>,
        documents_validated: usize,
        references: Vec<Reference>,
    ) -> Self {
        let mut result = ValidationResult {
            documents_validated,
            references_validated: references.len(),
            references,
            ..Default::default()
        };

        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => result.errors.push(diagnostic),
                Severity::Warning => result.warnings.push(diagnostic),
                Severity::Info => result.infos.push(diagnostic),
            }
        }

        for list in [&mut result.errors, &mut result.warnings, &mut result.infos] {
            list.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        }

        result.success = result.errors.is_empty();
        result
    }

    pub fn all(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.infos.iter())
    }

    pub fn count_of(&self, error_type: ErrorType) -> usize {
        self.all().filter(|e| e.error_type == error_type).count()
    }

    pub fn to_json(&self) -> Result<String, SpecvalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable multi-line rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for diagnostic in self.all() {
            out.push_str(&diagnostic.to_string());
            out.push('\n');
        }
        let status = if self.success { "PASS" } else { "FAIL" };
        out.push_str(&format!(
            "Validation {status}: {} documents, {} references, {} errors, {} warnings, {} info\n",
            self.documents_validated,
            self.references_validated,
            self.errors.len(),
            self.warnings.len(),
            self.infos.len()
        ));
        out
    }
}

pub(crate) fn path_to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
