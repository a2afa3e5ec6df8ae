use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SpecvalError;
use crate::schema::{ModuleDefinition, TypeRegistry};

/// Knobs for one `validate()` run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Honour `.gitignore` files (no git repository required).
    pub respect_gitignore: bool,
    pub use_specignore: bool,
    pub specignore_file: String,
    /// Warn about files that match no schema.
    pub strict: bool,
    /// Global default for reference rules without their own `allow_circular`.
    pub allow_circular: bool,
    /// Gitignore-style globs for files that are deliberately unmanaged.
    pub unmanaged_patterns: Vec<String>,
    /// Overrides the extractor's identifier regex.
    pub identifier_pattern: Option<String>,
    pub traceability: Option<TraceabilityOptions>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            use_specignore: true,
            specignore_file: ".specignore".to_string(),
            strict: false,
            allow_circular: false,
            unmanaged_patterns: Vec::new(),
            identifier_pattern: None,
            traceability: None,
        }
    }
}

/// Where to look for test code that mentions module ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceabilityOptions {
    /// Roots to scan, relative to the validation root unless absolute.
    pub test_paths: Vec<PathBuf>,
    /// File extensions (without the dot) considered test sources.
    pub extensions: Vec<String>,
    /// Module types that must be covered; empty means every typed module.
    pub types: Vec<String>,
}

impl Default for TraceabilityOptions {
    fn default() -> Self {
        Self {
            test_paths: vec![PathBuf::from("tests")],
            extensions: ["rs", "py", "ts", "js", "go", "java", "feature"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            types: Vec::new(),
        }
    }
}

/// On-disk configuration: run options plus schema definitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecvalConfig {
    pub options: ValidationOptions,
    pub schemas: Vec<ModuleDefinition>,
    /// Keep the built-in `requirement`, `adr` and `jtbd` schemas alongside `schemas`.
    pub include_default_schemas: bool,
}

impl Default for SpecvalConfig {
    fn default() -> Self {
        Self {
            options: ValidationOptions::default(),
            schemas: Vec::new(),
            include_default_schemas: true,
        }
    }
}

impl SpecvalConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SpecvalError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, SpecvalError> {
        let content = fs::read_to_string(path).map_err(|err| {
            SpecvalError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&content).map_err(|err| err.context(path.display()))
    }

    /// Compiles the configured schemas into a registry.
    pub fn type_registry(&self) -> Result<TypeRegistry, SpecvalError> {
        Ok(TypeRegistry::from_definitions(
            &self.schemas,
            self.include_default_schemas,
        )?)
    }

    pub fn into_parts(self) -> Result<(TypeRegistry, ValidationOptions), SpecvalError> {
        let types = self.type_registry()?;
        Ok((types, self.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SpecvalConfig::from_yaml_str("").unwrap();
        assert_eq!(config.options, ValidationOptions::default());
        assert!(config.include_default_schemas);
        assert_eq!(config.type_registry().unwrap().len(), 3);
    }

    #[test]
    fn partial_options_keep_remaining_defaults() {
        let config = SpecvalConfig::from_yaml_str(
            "options:\n  strict: true\n  unmanaged_patterns: ['drafts/']\n  traceability:\n    test_paths: [spec_tests]\n",
        )
        .unwrap();
        assert!(config.options.strict);
        assert!(config.options.respect_gitignore);
        assert_eq!(config.options.specignore_file, ".specignore");
        let trace = config.options.traceability.unwrap();
        assert_eq!(trace.test_paths, vec![PathBuf::from("spec_tests")]);
        assert!(trace.extensions.contains(&"rs".to_string()));
    }

    #[test]
    fn custom_schemas_can_replace_defaults() {
        let config = SpecvalConfig::from_yaml_str(
            r"
include_default_schemas: false
schemas:
  - name: story
    file_pattern: '^STORY-\d+\.md$'
    sections:
      - heading: Story
        required: true
",
        )
        .unwrap();
        let types = config.type_registry().unwrap();
        assert_eq!(types.len(), 1);
        assert!(types.get("story").is_some());
    }

    #[test]
    fn invalid_schema_surfaces_as_error() {
        let config = SpecvalConfig::from_yaml_str(
            "schemas:\n  - name: broken\n    file_pattern: '('\n    sections: [{heading: A, required: true}]\n",
        )
        .unwrap();
        assert!(matches!(config.type_registry(), Err(SpecvalError::Schema(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SpecvalConfig::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, SpecvalError::Config(msg) if msg.contains("not/here.yaml")));
    }
}
