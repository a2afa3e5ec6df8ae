//! Structural and content checks for typed documents.

use std::collections::BTreeSet;

use crate::classify::Document;
use crate::report::{ErrorType, ValidationError};
use crate::schema::{ClassSchema, ModuleSchema, SectionContent, SectionRule, ValidatorRef};
use crate::structure::{SectionId, section_body};

/// Runs every structural rule of `schema` against one document.
///
/// Documents whose identifier could not be found are skipped entirely.
pub fn validate_structure(document: &Document, schema: &ModuleSchema) -> Vec<ValidationError> {
    if document.missing_identifier {
        return Vec::new();
    }

    let mut checker = StructureChecker {
        document,
        schema,
        claimed: BTreeSet::new(),
        errors: Vec::new(),
    };
    for rule in &schema.sections {
        checker.check_section(rule);
    }
    checker.check_misplaced_classes();
    checker.check_unrestricted_classes();
    checker.errors
}

struct StructureChecker<'a> {
    document: &'a Document,
    schema: &'a ModuleSchema,
    /// (node, class name) pairs already accounted for by a permitting section.
    claimed: BTreeSet<(SectionId, &'a str)>,
    errors: Vec<ValidationError>,
}

impl<'a> StructureChecker<'a> {
    fn check_section(&mut self, rule: &'a SectionRule) {
        let document = self.document;
        let tree = &document.tree;
        let Some(section) = tree.find_by_heading(&rule.heading, true) else {
            if rule.required {
                self.errors.push(
                    ValidationError::error(
                        ErrorType::MissingSection,
                        format!("required section '{}' is missing", rule.heading),
                    )
                    .in_file(self.document.path())
                    .at_line(1)
                    .with_suggestion(format!("add a `{}` section", rule.heading_markup())),
                );
            }
            return;
        };

        let node = tree.node(section);
        if node.level != rule.level {
            self.errors.push(level_warning(
                self.document,
                &node.heading,
                node.level,
                rule.level,
                node.position.line,
            ));
        }

        if let Some(validator) = &rule.validator {
            self.run_validator(validator, section);
        }

        if !rule.allowed_classes.is_empty() {
            self.check_section_classes(rule, section);
        }
    }

    fn check_section_classes(&mut self, rule: &'a SectionRule, section: SectionId) {
        let document = self.document;
        let tree = &document.tree;
        let schema = self.schema;
        let mut found = 0usize;

        for descendant in tree.descendants(section) {
            let node = tree.node(descendant);
            for class_name in &rule.allowed_classes {
                let Some(class) = schema.classes.get(class_name) else {
                    continue;
                };
                if !class.matches(&node.heading) {
                    continue;
                }
                found += 1;
                self.claimed.insert((descendant, class.name.as_str()));
                self.check_instance(class, descendant);
            }
        }

        if rule.require_classes && found == 0 {
            let node = tree.node(section);
            self.errors.push(
                ValidationError::error(
                    ErrorType::MissingRequiredClasses,
                    format!(
                        "section '{}' requires at least one of: {}",
                        rule.heading,
                        rule.allowed_classes.join(", ")
                    ),
                )
                .in_file(self.document.path())
                .at_line(node.position.line)
                .with_suggestion(self.class_example(rule)),
            );
        }
    }

    fn class_example(&self, rule: &SectionRule) -> String {
        let level = rule
            .allowed_classes
            .first()
            .and_then(|name| self.schema.classes.get(name))
            .map(|class| class.level)
            .unwrap_or(rule.level.saturating_add(1));
        format!(
            "add a `{} ...` heading under `{}` matching one of the allowed classes",
            "#".repeat(level.max(1) as usize),
            rule.heading_markup()
        )
    }

    fn check_instance(&mut self, class: &ClassSchema, id: SectionId) {
        let document = self.document;
        let node = document.tree.node(id);
        if node.level != class.level {
            self.errors.push(level_warning(
                self.document,
                &node.heading,
                node.level,
                class.level,
                node.position.line,
            ));
        }
        if let Some(validator) = &class.validator {
            self.run_validator(validator, id);
        }
    }

    fn check_misplaced_classes(&mut self) {
        let document = self.document;
        let tree = &document.tree;
        let schema = self.schema;
        let restricted = schema.restricted_classes();

        for section in tree.all_sections() {
            let node = tree.node(section);
            for class_name in &restricted {
                if self.claimed.contains(&(section, *class_name)) {
                    continue;
                }
                let Some(class) = schema.classes.get(*class_name) else {
                    continue;
                };
                if !class.matches(&node.heading) {
                    continue;
                }

                let homes = schema.sections_allowing(class_name);
                let mut error = ValidationError::error(
                    ErrorType::MisplacedClassInstance,
                    format!(
                        "'{}' is a {} instance outside of a section that allows it",
                        node.heading, class_name
                    ),
                )
                .in_file(self.document.path())
                .at_line(node.position.line)
                .with_context(tree.section_path(section).join(" > "));
                if let Some(home) = homes.first() {
                    error = error.with_suggestion(format!("move it under `{}`", home.heading_markup()));
                }
                self.errors.push(error);
            }
        }
    }

    fn check_unrestricted_classes(&mut self) {
        let document = self.document;
        let tree = &document.tree;
        let schema = self.schema;
        let restricted = schema.restricted_classes();

        for class in schema.classes.values() {
            if restricted.contains(class.name.as_str()) {
                continue;
            }
            for section in tree.all_sections() {
                let node = tree.node(section);
                if node.level == class.level && class.matches(&node.heading) {
                    if let Some(validator) = &class.validator {
                        self.run_validator(validator, section);
                    }
                }
            }
        }
    }

    fn run_validator(&mut self, validator: &ValidatorRef, section: SectionId) {
        let document = self.document;
        let node = document.tree.node(section);
        let text = section_body(&document.parsed, &document.tree, section);
        let content = SectionContent {
            heading: &node.heading,
            blocks: &node.blocks,
            text: &text,
            path: document.path(),
            line: node.position.line,
        };
        let found = validator.validator.validate(&content);
        tracing::trace!(
            validator = %validator.name,
            heading = %node.heading,
            findings = found.len(),
            "ran content validator"
        );
        self.errors.extend(found);
    }
}

fn level_warning(
    document: &Document,
    heading: &str,
    actual: u8,
    expected: u8,
    line: usize,
) -> ValidationError {
    ValidationError::warning(
        ErrorType::IncorrectHeadingLevel,
        format!("'{heading}' is a level {actual} heading, expected level {expected}"),
    )
    .in_file(document.path())
    .at_line(line)
    .with_suggestion(format!(
        "use `{} {}`",
        "#".repeat(expected.max(1) as usize),
        heading
    ))
}
