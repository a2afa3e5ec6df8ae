use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::front_matter::{front_matter_line_count, front_matter_metadata, split_front_matter};
use crate::report::{ErrorType, ValidationError};
use crate::tokens::{Position, Token, tokenize};

/// Identifier shape used when neither a schema nor the caller supplies one
/// (`REQ-001`, `AC-01`, `ADR-0007`, `REQ-AUTH-12`).
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"\b[A-Z][A-Z0-9]*(?:-[A-Z][A-Z0-9]*)*-\d+(?:\.\d+)*\b";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub position: Position,
    pub end_line: usize,
    /// GitHub-style anchor, deduplicated within the document.
    pub slug: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentifierOccurrence {
    pub id: String,
    pub position: Position,
    pub in_code_block: bool,
}

/// Flat per-file model produced once by [`SpecExtractor::extract`].
#[derive(Clone, Debug)]
pub struct ParsedDocument {
    pub path: PathBuf,
    pub source: String,
    pub tokens: Vec<Token>,
    pub spec_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub headings: Vec<Heading>,
    pub identifiers: Vec<IdentifierOccurrence>,
}

impl ParsedDocument {
    /// Identifier occurrences; code-block occurrences only when asked for.
    pub fn get_identifiers(&self, include_code_blocks: bool) -> Vec<&IdentifierOccurrence> {
        self.identifiers
            .iter()
            .filter(|occ| include_code_blocks || !occ.in_code_block)
            .collect()
    }

    /// Case-insensitive metadata lookup.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn lines(&self) -> Vec<&str> {
        self.source.lines().collect()
    }

    pub fn heading_slugs(&self) -> BTreeSet<&str> {
        self.headings
            .iter()
            .filter_map(|h| h.slug.as_deref())
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct SpecExtractor {
    id_pattern: Regex,
}

impl Default for SpecExtractor {
    fn default() -> Self {
        Self {
            id_pattern: default_identifier_regex().clone(),
        }
    }
}

impl SpecExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            id_pattern: Regex::new(pattern)?,
        })
    }

    pub fn id_pattern(&self) -> &Regex {
        &self.id_pattern
    }

    /// Builds the flat model for one file.
    ///
    /// A tokenizer failure is returned as a `parse_error`; recoverable problems
    /// (bad front matter) are pushed onto `diagnostics` and extraction continues.
    pub fn extract(
        &self,
        path: &Path,
        source: &str,
        diagnostics: &mut Vec<ValidationError>,
    ) -> Result<ParsedDocument, ValidationError> {
        let tokens = tokenize(source).map_err(|message| {
            ValidationError::error(
                ErrorType::ParseError,
                format!("markdown parse error: {message}"),
            )
            .in_file(path)
        })?;

        let headings = collect_headings(&tokens);
        let code_lines = code_lines(&tokens);
        let lines: Vec<&str> = source.lines().collect();
        let skip = front_matter_line_count(source);

        let mut metadata = BTreeMap::new();
        let mut front_matter_id = None;
        if let Some(split) = split_front_matter(source) {
            match front_matter_metadata(split.yaml) {
                Ok(values) => {
                    front_matter_id = values
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case("id"))
                        .map(|(_, v)| v.trim().to_string());
                    metadata.extend(values);
                }
                Err(err) => diagnostics.push(
                    ValidationError::warning(ErrorType::ParseError, err.to_string())
                        .in_file(path)
                        .at_line(1),
                ),
            }
        }
        metadata.extend(self.inline_metadata(&lines, skip, &headings, &code_lines));

        let spec_id = self
            .scan_spec_id(&lines, skip, &headings, &code_lines)
            .or_else(|| front_matter_id.filter(|id| self.is_identifier(id)));

        let identifiers = self.collect_identifiers(&tokens);

        Ok(ParsedDocument {
            path: path.to_path_buf(),
            source: source.to_string(),
            tokens,
            spec_id,
            metadata,
            headings,
            identifiers,
        })
    }

    fn is_identifier(&self, candidate: &str) -> bool {
        self.id_pattern
            .find(candidate)
            .is_some_and(|m| m.start() == 0 && m.end() == candidate.len())
    }

    /// `ID: <id>` lines before the first H2+ heading; first match wins.
    fn scan_spec_id(
        &self,
        lines: &[&str],
        skip: usize,
        headings: &[Heading],
        code_lines: &BTreeSet<usize>,
    ) -> Option<String> {
        let boundary = headings
            .iter()
            .find(|h| h.level >= 2)
            .map(|h| h.position.line)
            .unwrap_or(usize::MAX);

        lines
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(idx, line)| (idx + 1, *line))
            .take_while(|(line_no, _)| *line_no < boundary)
            .filter(|(line_no, _)| !code_lines.contains(line_no))
            .filter_map(|(_, line)| parse_id_line(line))
            .find(|value| self.is_identifier(value))
    }

    /// `**Key**: value` pairs before the second heading.
    fn inline_metadata(
        &self,
        lines: &[&str],
        skip: usize,
        headings: &[Heading],
        code_lines: &BTreeSet<usize>,
    ) -> BTreeMap<String, String> {
        let heading_at: BTreeMap<usize, &Heading> =
            headings.iter().map(|h| (h.position.line, h)).collect();

        let mut metadata = BTreeMap::new();
        let mut seen_title = false;
        let mut line_no = skip;
        while line_no < lines.len() {
            let current = line_no + 1;
            if let Some(heading) = heading_at.get(&current) {
                if heading.level >= 2 || seen_title {
                    break;
                }
                seen_title = true;
                line_no = heading.end_line.max(current);
                continue;
            }
            if code_lines.contains(&current) {
                break;
            }

            let line = lines[line_no];
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            if let Some((key, value)) = parse_metadata_line(line) {
                metadata.insert(key, value);
                continue;
            }
            if let Some(value) = parse_id_line(line) {
                metadata.insert("ID".to_string(), value);
                continue;
            }
            break;
        }
        metadata
    }

    fn collect_identifiers(&self, tokens: &[Token]) -> Vec<IdentifierOccurrence> {
        let mut out = Vec::new();
        for token in tokens {
            match token {
                Token::Heading { text, position, .. } | Token::Text { value: text, position } => {
                    for m in self.id_pattern.find_iter(text) {
                        out.push(IdentifierOccurrence {
                            id: m.as_str().to_string(),
                            position: locate(text, *position, m.start()),
                            in_code_block: false,
                        });
                    }
                }
                Token::Code { value, position } => {
                    for (offset, line) in value.lines().enumerate() {
                        for m in self.id_pattern.find_iter(line) {
                            out.push(IdentifierOccurrence {
                                id: m.as_str().to_string(),
                                position: Position::new(
                                    position.line + offset,
                                    Some(line[..m.start()].chars().count() + 1),
                                ),
                                in_code_block: true,
                            });
                        }
                    }
                }
                Token::Block { .. } | Token::Link { .. } => {}
            }
        }
        out
    }
}

pub(crate) fn default_identifier_regex() -> &'static Regex {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    ID_REGEX.get_or_init(|| Regex::new(DEFAULT_IDENTIFIER_PATTERN).expect("Invalid regex"))
}

fn collect_headings(tokens: &[Token]) -> Vec<Heading> {
    let mut occurrences = BTreeMap::<String, usize>::new();
    tokens
        .iter()
        .filter_map(|token| match token {
            Token::Heading {
                level,
                text,
                position,
                end_line,
            } => {
                let slug = slugify_heading(text).map(|base| {
                    let count = occurrences.entry(base.clone()).or_insert(0);
                    let slug = if *count == 0 {
                        base
                    } else {
                        format!("{base}-{count}")
                    };
                    *count += 1;
                    slug
                });
                Some(Heading {
                    level: *level,
                    text: text.clone(),
                    position: *position,
                    end_line: *end_line,
                    slug,
                })
            }
            _ => None,
        })
        .collect()
}

fn code_lines(tokens: &[Token]) -> BTreeSet<usize> {
    let mut lines = BTreeSet::new();
    for token in tokens {
        if let Token::Code { value, position } = token {
            let count = value.lines().count().max(1);
            lines.extend(position.line..position.line + count);
        }
    }
    lines
}

fn locate(text: &str, start: Position, byte_idx: usize) -> Position {
    let before = &text[..byte_idx];
    match before.rfind('\n') {
        None => Position::new(
            start.line,
            start.column.map(|c| c + before.chars().count()),
        ),
        Some(nl) => Position::new(
            start.line + before.matches('\n').count(),
            Some(before[nl + 1..].chars().count() + 1),
        ),
    }
}

fn parse_metadata_line(line: &str) -> Option<(String, String)> {
    static META_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = META_REGEX.get_or_init(|| {
        Regex::new(
            r"^\s*(?:[-*+]\s+)?\*\*(?P<k1>[^*]+?):\*\*\s*(?P<v1>.*?)\s*$|^\s*(?:[-*+]\s+)?\*\*(?P<k2>[^*]+?)\*\*\s*:\s*(?P<v2>.*?)\s*$",
        )
        .expect("Invalid regex")
    });
    let caps = re.captures(line)?;
    let key = caps.name("k1").or_else(|| caps.name("k2"))?.as_str().trim();
    let value = caps.name("v1").or_else(|| caps.name("v2"))?.as_str().trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

fn parse_id_line(line: &str) -> Option<String> {
    static ID_LINE_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = ID_LINE_REGEX
        .get_or_init(|| Regex::new(r"(?i)^id\s*:\s*(\S+)$").expect("Invalid regex"));
    let cleaned = line.replace("**", "");
    let cleaned = cleaned.trim().trim_start_matches(['-', '*', '+']).trim();
    let caps = re.captures(cleaned)?;
    Some(caps[1].trim_matches('`').to_string())
}

/// GitHub-style heading anchor: NFKD, lowercase, punctuation dropped, whitespace hyphenated.
pub fn slugify_heading(title: &str) -> Option<String> {
    let normalized = title.nfkd().collect::<String>();
    let lowered = normalized.to_lowercase();

    let mut filtered = String::new();
    for ch in lowered.chars() {
        let mapped = if ch.is_whitespace() { ' ' } else { ch };
        if mapped.is_alphabetic() || mapped.is_numeric() || mapped == ' ' || mapped == '-' {
            filtered.push(mapped);
        }
    }

    let mut cleaned = String::new();
    let mut prev_hyphen = false;
    for ch in filtered.chars() {
        if ch == ' ' || ch == '-' {
            if !prev_hyphen {
                cleaned.push('-');
                prev_hyphen = true;
            }
        } else {
            cleaned.push(ch);
            prev_hyphen = false;
        }
    }

    let cleaned = cleaned.trim_matches('-').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ParsedDocument {
        let mut diagnostics = Vec::new();
        let doc = SpecExtractor::new()
            .extract(Path::new("REQ-001.md"), source, &mut diagnostics)
            .expect("extract");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        doc
    }

    #[test]
    fn code_fence_identifiers_are_flagged() {
        let doc = extract("# REQ-001: Login\n\nDepends on REQ-002.\n\n```text\nREQ-003 sample\n```\n");

        let prose: Vec<_> = doc.get_identifiers(false).iter().map(|o| o.id.clone()).collect();
        assert_eq!(prose, vec!["REQ-001", "REQ-002"]);

        let all = doc.get_identifiers(true);
        let fenced = all.iter().find(|o| o.id == "REQ-003").expect("fenced id");
        assert!(fenced.in_code_block);
        assert_eq!(fenced.position.line, 6);
        assert!(all.iter().filter(|o| o.id != "REQ-003").all(|o| !o.in_code_block));
    }

    #[test]
    fn spec_id_comes_from_id_line_before_first_section() {
        let doc = extract("# Login\n\nID: REQ-042\n\n## Overview\n\nID: REQ-999\n");
        assert_eq!(doc.spec_id.as_deref(), Some("REQ-042"));
    }

    #[test]
    fn spec_id_ignored_after_first_section() {
        let doc = extract("# Login\n\n## Overview\n\nID: REQ-999\n");
        assert_eq!(doc.spec_id, None);
    }

    #[test]
    fn spec_id_inside_code_fence_is_ignored() {
        let doc = extract("# Login\n\n```\nID: REQ-777\n```\n");
        assert_eq!(doc.spec_id, None);
    }

    #[test]
    fn bold_metadata_stops_at_first_prose_line() {
        let doc = extract(
            "# Login\n\n**Status**: Draft\n**Owner:** Platform\n\nFree text.\n\n**Late**: ignored\n",
        );
        assert_eq!(doc.metadata_value("status"), Some("Draft"));
        assert_eq!(doc.metadata_value("owner"), Some("Platform"));
        assert_eq!(doc.metadata_value("late"), None);
    }

    #[test]
    fn metadata_before_title_is_collected() {
        let doc = extract("**ID**: REQ-010\n\n# Title\n\n**Priority**: High\n\n## Body\n");
        assert_eq!(doc.metadata_value("id"), Some("REQ-010"));
        assert_eq!(doc.metadata_value("priority"), Some("High"));
        assert_eq!(doc.spec_id.as_deref(), Some("REQ-010"));
    }

    #[test]
    fn front_matter_feeds_metadata_and_id() {
        let doc = extract("---\nid: REQ-005\nstatus: accepted\n---\n# Title\n");
        assert_eq!(doc.metadata_value("status"), Some("accepted"));
        assert_eq!(doc.spec_id.as_deref(), Some("REQ-005"));
        assert_eq!(doc.headings[0].position.line, 5);
    }

    #[test]
    fn heading_slugs_are_deduplicated() {
        let doc = extract("# Overview\n\n## Overview\n\n## Café, au lait!\n");
        let slugs: Vec<_> = doc.headings.iter().filter_map(|h| h.slug.clone()).collect();
        assert_eq!(slugs, vec!["overview", "overview-1", "cafe-au-lait"]);
    }

    #[test]
    fn identifier_columns_track_multiline_text() {
        let doc = extract("See REQ-002\nand REQ-003 too.\n");
        let ids = doc.get_identifiers(false);
        assert_eq!(ids[0].position, Position::new(1, Some(5)));
        assert_eq!(ids[1].position, Position::new(2, Some(5)));
    }
}
