use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::classify::Document;
use crate::schema::ModuleSchema;
use crate::tokens::Token;

use super::{Reference, ReferenceKind};

const EXTERNAL_SCHEMES: [&str; 4] = ["http", "https", "mailto", "ftp"];
const CONTEXT_LIMIT: usize = 200;

/// Link-text phrases and the relationship they imply, checked in order.
const TEXT_HINTS: [(&str, &str); 6] = [
    ("implements", "depends_on"),
    ("depends on", "depends_on"),
    ("validated by", "validated_by"),
    ("tested by", "validated_by"),
    ("supersedes", "supersedes"),
    ("see also", "see_also"),
];

/// Every link in `document`, typed or not, in document order.
pub fn extract_references(document: &Document, schema: Option<&ModuleSchema>) -> Vec<Reference> {
    let mut references = Vec::new();
    let mut section: Option<&str> = None;
    let mut block: Option<&str> = None;

    for token in &document.parsed.tokens {
        match token {
            Token::Heading { text, .. } => {
                section = Some(text.as_str());
                block = None;
            }
            Token::Block { raw, .. } => block = Some(raw.as_str()),
            Token::Link {
                url,
                text,
                position,
            } => {
                let target = url.trim();
                if target.is_empty() {
                    continue;
                }
                references.push(Reference {
                    source_file: document.path().to_path_buf(),
                    source_module_id: document.module_id.clone(),
                    source_section: section.map(str::to_string),
                    text: text.clone(),
                    target: target.to_string(),
                    kind: classify_target(target),
                    position: *position,
                    relationship: infer_relationship(text, section, schema),
                    context: block.map(condense),
                });
            }
            _ => {}
        }
    }

    tracing::trace!(
        path = %document.path().display(),
        count = references.len(),
        "extracted references"
    );
    references
}

/// External when the target parses as a URL with a web/mail scheme, class
/// when it has a fragment, otherwise a module reference.
pub fn classify_target(target: &str) -> ReferenceKind {
    let trimmed = target.trim();
    if let Ok(url) = Url::parse(trimmed) {
        if EXTERNAL_SCHEMES.contains(&url.scheme()) {
            return ReferenceKind::ExternalReference;
        }
    }
    if trimmed.contains('#') {
        ReferenceKind::ClassReference
    } else {
        ReferenceKind::ModuleReference
    }
}

/// Relationship label from, in order: link text hints, the enclosing section
/// name, or the only reference rule applicable to that section.
pub fn infer_relationship(
    text: &str,
    section: Option<&str>,
    schema: Option<&ModuleSchema>,
) -> Option<String> {
    let lowered = text.to_lowercase();
    if let Some((_, name)) = TEXT_HINTS.iter().find(|(hint, _)| lowered.contains(hint)) {
        return Some((*name).to_string());
    }

    if let Some(section) = section {
        if let Some(name) = relationship_from_section(section, schema) {
            return Some(name);
        }
    }

    let schema = schema?;
    let mut applicable = schema
        .references
        .iter()
        .filter(|rule| rule.applies_to_section(section));
    match (applicable.next(), applicable.next()) {
        (Some(rule), None) => Some(rule.name.clone()),
        _ => None,
    }
}

fn relationship_from_section(section: &str, schema: Option<&ModuleSchema>) -> Option<String> {
    let snake = snake_case(section);
    if let Some(rule) = schema.and_then(|s| s.reference_rule(&snake)) {
        return Some(rule.name.clone());
    }

    let lowered = section.to_lowercase();
    let name = if lowered.contains("depend") {
        "depends_on"
    } else if lowered.contains("validat") || test_word().is_match(&lowered) {
        "validated_by"
    } else if lowered.contains("supersede") {
        "supersedes"
    } else if lowered.contains("related") || lowered.contains("see also") {
        "see_also"
    } else {
        return None;
    };
    Some(name.to_string())
}

fn test_word() -> &'static Regex {
    static TEST_WORD: OnceLock<Regex> = OnceLock::new();
    TEST_WORD.get_or_init(|| Regex::new(r"\btest(s|ed|ing)?\b").expect("Invalid regex"))
}

fn snake_case(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

fn condense(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(CONTEXT_LIMIT) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}
