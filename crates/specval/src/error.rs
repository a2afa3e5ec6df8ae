use std::fmt;

use thiserror::Error;

/// Failures raised while compiling declarative schema definitions.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema '{schema}': invalid {field} pattern '{pattern}': {source}")]
    InvalidPattern {
        schema: String,
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid cardinality '{0}'")]
    InvalidCardinality(String),
    #[error("schema '{0}' declares no required sections")]
    NoRequiredSections(String),
    #[error("schema '{schema}' references unknown content validator '{validator}'")]
    UnknownValidator { schema: String, validator: String },
    #[error("schema '{schema}': section '{section}' allows unknown class '{class}'")]
    UnknownClass {
        schema: String,
        section: String,
        class: String,
    },
    #[error("duplicate schema name '{0}'")]
    DuplicateSchema(String),
}

/// High-level error type shared across specval components.
///
/// Only unrecoverable conditions surface here; per-document and per-reference
/// problems are collected as [`crate::ValidationError`] values instead.
#[derive(Debug, Error)]
pub enum SpecvalError {
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SpecvalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SpecvalError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl SpecvalError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            SpecvalError::Workspace(msg) => SpecvalError::Workspace(format!("{ctx}: {msg}")),
            SpecvalError::Schema(err) => SpecvalError::Config(format!("{ctx}: {err}")),
            SpecvalError::Config(msg) => SpecvalError::Config(format!("{ctx}: {msg}")),
            SpecvalError::Serialization(msg) => {
                SpecvalError::Serialization(format!("{ctx}: {msg}"))
            }
            SpecvalError::Io(err) => SpecvalError::Io(err),
        }
    }
}
