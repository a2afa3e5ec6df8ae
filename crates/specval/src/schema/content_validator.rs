use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::report::{ErrorType, ValidationError};
use crate::structure::ContentBlock;

/// A section body handed to a [`ContentValidator`].
#[derive(Clone, Copy, Debug)]
pub struct SectionContent<'a> {
    pub heading: &'a str,
    pub blocks: &'a [ContentBlock],
    /// Raw text between the heading and the next heading.
    pub text: &'a str,
    pub path: &'a Path,
    /// Line of the section heading.
    pub line: usize,
}

/// Capability for checking the body of a section or class instance.
pub trait ContentValidator: Send + Sync {
    fn validate(&self, content: &SectionContent<'_>) -> Vec<ValidationError>;
}

/// Validators shipped with the crate, addressable by name from schema definitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinValidator {
    /// Given/When/Then narrative with emphasised keywords.
    Gherkin,
    AcceptAll,
}

impl BuiltinValidator {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinValidator::Gherkin => "gherkin",
            BuiltinValidator::AcceptAll => "accept_all",
        }
    }
}

impl ContentValidator for BuiltinValidator {
    fn validate(&self, content: &SectionContent<'_>) -> Vec<ValidationError> {
        match self {
            BuiltinValidator::Gherkin => validate_gherkin(content),
            BuiltinValidator::AcceptAll => Vec::new(),
        }
    }
}

const GHERKIN_KEYWORDS: [&str; 3] = ["Given", "When", "Then"];

fn validate_gherkin(content: &SectionContent<'_>) -> Vec<ValidationError> {
    let located = |err: ValidationError| {
        err.in_file(content.path)
            .at_line(content.line)
            .with_context(content.heading.to_string())
    };

    if content.text.trim().is_empty() {
        return vec![located(
            ValidationError::error(
                ErrorType::EmptyContent,
                format!("section '{}' has no content", content.heading),
            )
            .with_suggestion("Describe the scenario with **Given**, **When** and **Then** steps"),
        )];
    }

    let mut errors = Vec::new();
    let mut missing = Vec::new();
    for (keyword, (plain, emphasised)) in GHERKIN_KEYWORDS.iter().zip(keyword_patterns()) {
        if !plain.is_match(content.text) {
            missing.push(*keyword);
        } else if !emphasised.is_match(content.text) {
            errors.push(located(
                ValidationError::error(
                    ErrorType::InvalidGherkinFormat,
                    format!(
                        "keyword '{keyword}' in '{}' must be emphasised",
                        content.heading
                    ),
                )
                .with_suggestion(format!("use bold: **{keyword}**")),
            ));
        }
    }

    if !missing.is_empty() {
        errors.insert(
            0,
            located(
                ValidationError::error(
                    ErrorType::InvalidGherkinFormat,
                    format!(
                        "'{}' is missing Gherkin keyword(s): {}",
                        content.heading,
                        missing.join(", ")
                    ),
                )
                .with_suggestion(
                    missing
                        .iter()
                        .map(|k| format!("**{k}** ..."))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            ),
        );
    }
    errors
}

/// `(plain, emphasised)` regex pairs in keyword order.
fn keyword_patterns() -> &'static [(Regex, Regex)] {
    static PATTERNS: OnceLock<Vec<(Regex, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        GHERKIN_KEYWORDS
            .iter()
            .map(|k| {
                let plain = Regex::new(&format!(r"(?i)\b{k}\b")).expect("Invalid regex");
                let emphasised = Regex::new(&format!(
                    r"(?i)(?:\*\*|__|\*|_)\s*{k}:?\s*(?:\*\*|__|\*|_)"
                ))
                .expect("Invalid regex");
                (plain, emphasised)
            })
            .collect()
    })
}

/// Named validator handle stored on compiled schema rules.
#[derive(Clone)]
pub struct ValidatorRef {
    pub name: String,
    pub validator: Arc<dyn ContentValidator>,
}

impl fmt::Debug for ValidatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Name → validator table consulted when schema definitions are compiled.
#[derive(Clone)]
pub struct ValidatorSet {
    validators: BTreeMap<String, Arc<dyn ContentValidator>>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        let mut set = Self {
            validators: BTreeMap::new(),
        };
        for builtin in [BuiltinValidator::Gherkin, BuiltinValidator::AcceptAll] {
            set.register(builtin.name(), Arc::new(builtin));
        }
        set
    }
}

impl ValidatorSet {
    pub fn register(&mut self, name: impl Into<String>, validator: Arc<dyn ContentValidator>) {
        self.validators.insert(name.into(), validator);
    }

    pub fn get(&self, name: &str) -> Option<ValidatorRef> {
        self.validators.get(name).map(|validator| ValidatorRef {
            name: name.to_string(),
            validator: validator.clone(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }
}
