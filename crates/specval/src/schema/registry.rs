use std::path::Path;
use std::sync::Arc;

use crate::error::{SchemaError, SpecvalError};
use crate::report::path_to_forward_slashes;

use super::content_validator::{ContentValidator, ValidatorSet};
use super::model::{ModuleDefinition, ModuleSchema};

const DEFAULT_SCHEMAS: &str = include_str!("defaults.yaml");

/// Outcome of matching one file path against every registered schema.
#[derive(Debug)]
pub enum TypeMatch<'a> {
    Unmatched,
    Matched(&'a ModuleSchema),
    /// More than one schema matched; never resolved by picking one.
    Ambiguous(Vec<&'a str>),
}

/// Known module schemas. Loaded once, read-only during a validation run.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    schemas: Vec<ModuleSchema>,
    validators: ValidatorSet,
}

impl TypeRegistry {
    /// Empty registry with the built-in content validators available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `requirement`, `adr` and `jtbd` schemas.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_all(&default_definitions())
            .expect("built-in schemas compile");
        registry
    }

    pub fn from_definitions(
        definitions: &[ModuleDefinition],
        include_defaults: bool,
    ) -> Result<Self, SchemaError> {
        let mut registry = if include_defaults {
            Self::with_defaults()
        } else {
            Self::new()
        };
        registry.register_all(definitions)?;
        Ok(registry)
    }

    /// Parses a YAML sequence of module definitions.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SpecvalError> {
        let definitions: Vec<ModuleDefinition> = serde_yaml::from_str(yaml)?;
        Ok(Self::from_definitions(&definitions, false)?)
    }

    /// Makes a custom validator available to definitions registered afterwards.
    pub fn register_validator(
        &mut self,
        name: impl Into<String>,
        validator: Arc<dyn ContentValidator>,
    ) {
        self.validators.register(name, validator);
    }

    pub fn register(&mut self, definition: &ModuleDefinition) -> Result<(), SchemaError> {
        if self.get(&definition.name).is_some() {
            return Err(SchemaError::DuplicateSchema(definition.name.clone()));
        }
        let schema = definition.compile(&self.validators)?;
        tracing::debug!(schema = %schema.name, "registered module schema");
        self.schemas.push(schema);
        Ok(())
    }

    pub fn register_all(&mut self, definitions: &[ModuleDefinition]) -> Result<(), SchemaError> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSchema> {
        self.schemas.iter().find(|schema| schema.name == name)
    }

    pub fn schemas(&self) -> &[ModuleSchema] {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Tests each schema's file pattern against the base name and its location
    /// pattern (substring search) against the whole path.
    pub fn match_file(&self, path: &Path) -> TypeMatch<'_> {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return TypeMatch::Unmatched;
        };
        let full = path_to_forward_slashes(path);

        let matched: Vec<&ModuleSchema> = self
            .schemas
            .iter()
            .filter(|schema| {
                schema.file_pattern.is_match(&file_name) && schema.location_pattern.is_match(&full)
            })
            .collect();

        match matched.as_slice() {
            [] => TypeMatch::Unmatched,
            [schema] => TypeMatch::Matched(schema),
            many => TypeMatch::Ambiguous(many.iter().map(|s| s.name.as_str()).collect()),
        }
    }
}

pub fn default_definitions() -> Vec<ModuleDefinition> {
    serde_yaml::from_str(DEFAULT_SCHEMAS).expect("built-in schema YAML parses")
}
