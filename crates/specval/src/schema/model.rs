use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

use super::content_validator::{ValidatorRef, ValidatorSet};

/// Min/max constraint on how many references of one relationship a module may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CardinalityRepr", into = "String")]
pub struct Cardinality {
    min: u32,
    max: Option<u32>,
}

impl Cardinality {
    pub const ANY: Cardinality = Cardinality { min: 0, max: None };

    pub fn new(min: u32, max: Option<u32>) -> Result<Self, SchemaError> {
        if let Some(max) = max {
            if max < min {
                return Err(SchemaError::InvalidCardinality(format!("{min}..{max}")));
            }
        }
        Ok(Self { min, max })
    }

    pub fn exactly(n: u32) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    pub fn is_below_min(&self, count: usize) -> bool {
        count < self.min as usize
    }

    pub fn is_above_max(&self, count: usize) -> bool {
        self.max.is_some_and(|max| count > max as usize)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::ANY
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}..{max}", self.min),
            None => write!(f, "{}..*", self.min),
        }
    }
}

impl FromStr for Cardinality {
    type Err = SchemaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidCardinality(raw.to_string());
        let trimmed = raw.trim();
        if trimmed == "*" {
            return Ok(Self::ANY);
        }
        match trimmed.split_once("..") {
            Some((min, max)) => {
                let min = min.trim().parse::<u32>().map_err(|_| invalid())?;
                let max = match max.trim() {
                    "*" | "n" => None,
                    value => Some(value.parse::<u32>().map_err(|_| invalid())?),
                };
                Self::new(min, max).map_err(|_| invalid())
            }
            None => trimmed
                .parse::<u32>()
                .map(Self::exactly)
                .map_err(|_| invalid()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CardinalityRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<CardinalityRepr> for Cardinality {
    type Error = SchemaError;

    fn try_from(value: CardinalityRepr) -> Result<Self, Self::Error> {
        match value {
            CardinalityRepr::Number(n) => Ok(Self::exactly(n)),
            CardinalityRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Cardinality> for String {
    fn from(value: Cardinality) -> Self {
        value.to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierLocation {
    #[default]
    Title,
    Metadata,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    Global,
    /// Unique within the containing document.
    Document,
}

// ---------------------------------------------------------------------------
// Declarative definitions (YAML / built-in defaults)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentifierDefinition {
    pub pattern: String,
    #[serde(default)]
    pub location: IdentifierLocation,
    #[serde(default)]
    pub scope: Option<UniquenessScope>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionDefinition {
    pub heading: String,
    #[serde(default = "default_section_level")]
    pub level: u8,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validator: Option<String>,
    #[serde(default)]
    pub allowed_classes: Vec<String>,
    #[serde(default)]
    pub require_classes: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceDefinition {
    pub name: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default = "default_true")]
    pub must_exist: bool,
    #[serde(default)]
    pub allow_circular: Option<bool>,
    #[serde(default)]
    pub allowed_sections: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub heading_pattern: String,
    #[serde(default = "default_class_level")]
    pub level: u8,
    #[serde(default)]
    pub identifier: Option<IdentifierDefinition>,
    #[serde(default)]
    pub validator: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub file_pattern: String,
    #[serde(default)]
    pub location_pattern: String,
    #[serde(default)]
    pub identifier: Option<IdentifierDefinition>,
    #[serde(default)]
    pub sections: Vec<SectionDefinition>,
    #[serde(default)]
    pub references: Vec<ReferenceDefinition>,
    #[serde(default)]
    pub classes: BTreeMap<String, ClassDefinition>,
}

fn default_section_level() -> u8 {
    2
}

fn default_class_level() -> u8 {
    3
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Compiled schema model
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct IdentifierSpec {
    pub pattern: Regex,
    pub location: IdentifierLocation,
    pub scope: UniquenessScope,
}

impl IdentifierSpec {
    /// First pattern match inside `text`.
    pub fn find_in<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern.find(text).map(|m| m.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct SectionRule {
    pub heading: String,
    pub level: u8,
    pub required: bool,
    pub validator: Option<ValidatorRef>,
    pub allowed_classes: Vec<String>,
    pub require_classes: bool,
}

impl SectionRule {
    pub fn allows(&self, class: &str) -> bool {
        self.allowed_classes.iter().any(|c| c == class)
    }

    /// Markup for the heading this rule expects, e.g. `## Overview`.
    pub fn heading_markup(&self) -> String {
        format!("{} {}", "#".repeat(self.level.max(1) as usize), self.heading)
    }
}

#[derive(Clone, Debug)]
pub struct ReferenceRule {
    pub name: String,
    pub source_type: String,
    pub target_type: Option<String>,
    pub cardinality: Cardinality,
    pub must_exist: bool,
    pub allow_circular: Option<bool>,
    pub allowed_sections: Vec<String>,
}

impl ReferenceRule {
    /// Empty `allowed_sections` means the rule applies anywhere in the document.
    pub fn applies_to_section(&self, section: Option<&str>) -> bool {
        if self.allowed_sections.is_empty() {
            return true;
        }
        section.is_some_and(|s| {
            self.allowed_sections
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(s.trim()))
        })
    }
}

#[derive(Clone, Debug)]
pub struct ClassSchema {
    pub name: String,
    pub heading_pattern: Regex,
    pub level: u8,
    pub identifier: Option<IdentifierSpec>,
    pub validator: Option<ValidatorRef>,
}

impl ClassSchema {
    pub fn matches(&self, heading: &str) -> bool {
        self.heading_pattern.is_match(heading.trim())
    }

    /// Instance id: the identifier pattern applied to the heading, else the heading's own id.
    pub fn instance_id(&self, heading: &str, section_id: Option<&str>) -> Option<String> {
        match &self.identifier {
            Some(spec) => spec.find_in(heading).map(str::to_string),
            None => section_id.map(str::to_string),
        }
    }

    pub fn scope(&self) -> UniquenessScope {
        self.identifier
            .as_ref()
            .map(|spec| spec.scope)
            .unwrap_or(UniquenessScope::Document)
    }
}

/// A named document-type contract.
#[derive(Clone, Debug)]
pub struct ModuleSchema {
    pub name: String,
    pub file_pattern: Regex,
    pub location_pattern: Regex,
    pub identifier: Option<IdentifierSpec>,
    pub sections: Vec<SectionRule>,
    pub references: Vec<ReferenceRule>,
    pub classes: BTreeMap<String, ClassSchema>,
}

impl ModuleSchema {
    /// Classes named by at least one section's `allowed_classes`.
    pub fn restricted_classes(&self) -> BTreeSet<&str> {
        self.sections
            .iter()
            .flat_map(|rule| rule.allowed_classes.iter().map(String::as_str))
            .collect()
    }

    pub fn sections_allowing(&self, class: &str) -> Vec<&SectionRule> {
        self.sections.iter().filter(|rule| rule.allows(class)).collect()
    }

    pub fn reference_rule(&self, name: &str) -> Option<&ReferenceRule> {
        self.references.iter().find(|rule| rule.name == name)
    }
}

fn compile_regex(schema: &str, field: &'static str, pattern: &str) -> Result<Regex, SchemaError> {
    Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
        schema: schema.to_string(),
        field,
        pattern: pattern.to_string(),
        source,
    })
}

fn resolve_validator(
    schema: &str,
    name: Option<&String>,
    validators: &ValidatorSet,
) -> Result<Option<ValidatorRef>, SchemaError> {
    name.map(|name| {
        validators
            .get(name)
            .ok_or_else(|| SchemaError::UnknownValidator {
                schema: schema.to_string(),
                validator: name.clone(),
            })
    })
    .transpose()
}

impl IdentifierDefinition {
    fn compile(
        &self,
        schema: &str,
        default_scope: UniquenessScope,
    ) -> Result<IdentifierSpec, SchemaError> {
        Ok(IdentifierSpec {
            pattern: compile_regex(schema, "identifier", &self.pattern)?,
            location: self.location,
            scope: self.scope.unwrap_or(default_scope),
        })
    }
}

impl ModuleDefinition {
    pub fn compile(&self, validators: &ValidatorSet) -> Result<ModuleSchema, SchemaError> {
        let name = self.name.as_str();

        if !self.sections.iter().any(|s| s.required) {
            return Err(SchemaError::NoRequiredSections(self.name.clone()));
        }

        let mut classes = BTreeMap::new();
        for (class_name, class) in &self.classes {
            classes.insert(
                class_name.clone(),
                ClassSchema {
                    name: class_name.clone(),
                    heading_pattern: compile_regex(name, "class heading", &class.heading_pattern)?,
                    level: class.level,
                    identifier: class
                        .identifier
                        .as_ref()
                        .map(|id| id.compile(name, UniquenessScope::Document))
                        .transpose()?,
                    validator: resolve_validator(name, class.validator.as_ref(), validators)?,
                },
            );
        }

        let mut sections = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            if let Some(unknown) = section
                .allowed_classes
                .iter()
                .find(|c| !classes.contains_key(*c))
            {
                return Err(SchemaError::UnknownClass {
                    schema: self.name.clone(),
                    section: section.heading.clone(),
                    class: unknown.clone(),
                });
            }
            sections.push(SectionRule {
                heading: section.heading.clone(),
                level: section.level,
                required: section.required,
                validator: resolve_validator(name, section.validator.as_ref(), validators)?,
                allowed_classes: section.allowed_classes.clone(),
                require_classes: section.require_classes,
            });
        }

        let references = self
            .references
            .iter()
            .map(|r| ReferenceRule {
                name: r.name.clone(),
                source_type: r.source_type.clone().unwrap_or_else(|| self.name.clone()),
                target_type: r.target_type.clone(),
                cardinality: r.cardinality,
                must_exist: r.must_exist,
                allow_circular: r.allow_circular,
                allowed_sections: r.allowed_sections.clone(),
            })
            .collect();

        Ok(ModuleSchema {
            name: self.name.clone(),
            file_pattern: compile_regex(name, "file", &self.file_pattern)?,
            location_pattern: compile_regex(name, "location", &self.location_pattern)?,
            identifier: self
                .identifier
                .as_ref()
                .map(|id| id.compile(name, UniquenessScope::Global))
                .transpose()?,
            sections,
            references,
            classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_parses_canonical_forms() {
        for (raw, min, max) in [
            ("1", 1, Some(1)),
            ("0..1", 0, Some(1)),
            ("1..*", 1, None),
            ("0..*", 0, None),
            ("2..5", 2, Some(5)),
            ("*", 0, None),
        ] {
            let parsed: Cardinality = raw.parse().unwrap();
            assert_eq!((parsed.min(), parsed.max()), (min, max), "{raw}");
        }
        assert_eq!(Cardinality::exactly(1).to_string(), "1");
        assert_eq!("1..*".parse::<Cardinality>().unwrap().to_string(), "1..*");
        assert_eq!("0..1".parse::<Cardinality>().unwrap().to_string(), "0..1");
    }

    #[test]
    fn cardinality_rejects_inverted_bounds() {
        assert!(matches!(
            "3..1".parse::<Cardinality>(),
            Err(SchemaError::InvalidCardinality(_))
        ));
        assert!("x".parse::<Cardinality>().is_err());
    }

    #[test]
    fn cardinality_boundaries() {
        let one = Cardinality::exactly(1);
        assert!(one.is_below_min(0));
        assert!(!one.is_below_min(1) && !one.is_above_max(1));
        assert!(one.is_above_max(2));
        assert!(!Cardinality::ANY.is_above_max(1000));
    }

    #[test]
    fn cardinality_deserializes_from_number_or_string() {
        #[derive(Deserialize)]
        struct Holder {
            a: Cardinality,
            b: Cardinality,
        }
        let holder: Holder = serde_yaml::from_str("a: 1\nb: '0..*'\n").unwrap();
        assert_eq!(holder.a, Cardinality::exactly(1));
        assert_eq!(holder.b, Cardinality::ANY);
    }

    fn definition(yaml: &str) -> ModuleDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn schema_without_required_sections_is_rejected() {
        let def = definition(
            "name: note\nfile_pattern: '.*'\nsections:\n  - heading: Body\n    required: false\n",
        );
        let err = def.compile(&ValidatorSet::default()).unwrap_err();
        assert!(matches!(err, SchemaError::NoRequiredSections(name) if name == "note"));
    }

    #[test]
    fn unknown_validator_and_class_are_rejected() {
        let def = definition(
            "name: req\nfile_pattern: '.*'\nsections:\n  - heading: Body\n    required: true\n    validator: yaml\n",
        );
        assert!(matches!(
            def.compile(&ValidatorSet::default()),
            Err(SchemaError::UnknownValidator { .. })
        ));

        let def = definition(
            "name: req\nfile_pattern: '.*'\nsections:\n  - heading: Body\n    required: true\n    allowed_classes: [ac]\n",
        );
        assert!(matches!(
            def.compile(&ValidatorSet::default()),
            Err(SchemaError::UnknownClass { .. })
        ));
    }

    #[test]
    fn compile_applies_defaults() {
        let def = definition(
            r"
name: req
file_pattern: '^REQ-\d+\.md$'
identifier:
  pattern: 'REQ-\d+'
sections:
  - heading: Overview
    required: true
  - heading: Acceptance Criteria
    allowed_classes: [ac]
classes:
  ac:
    heading_pattern: '^AC-\d+'
    identifier:
      pattern: 'AC-\d+'
    validator: gherkin
references:
  - name: depends_on
    cardinality: '1..*'
",
        );
        let schema = def.compile(&ValidatorSet::default()).unwrap();
        assert_eq!(schema.sections[0].level, 2);
        assert_eq!(schema.sections[0].heading_markup(), "## Overview");
        let ident = schema.identifier.as_ref().unwrap();
        assert_eq!(ident.location, IdentifierLocation::Title);
        assert_eq!(ident.scope, UniquenessScope::Global);

        let ac = &schema.classes["ac"];
        assert_eq!(ac.level, 3);
        assert_eq!(ac.scope(), UniquenessScope::Document);
        assert_eq!(ac.instance_id("AC-07: Logout", None).as_deref(), Some("AC-07"));

        let rule = schema.reference_rule("depends_on").unwrap();
        assert_eq!(rule.source_type, "req");
        assert!(rule.must_exist);
        assert_eq!(rule.cardinality.to_string(), "1..*");
        assert_eq!(schema.restricted_classes().into_iter().collect::<Vec<_>>(), vec!["ac"]);
    }
}
