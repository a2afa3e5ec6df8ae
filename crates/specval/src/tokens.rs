//! Flat token stream over the `markdown` crate's mdast.
//!
//! Every later pass consumes this stream instead of the tree so that
//! heading/link/code handling agrees on one document order.

use std::collections::BTreeMap;

use markdown::mdast::Node;
use serde::{Deserialize, Serialize};

/// 1-indexed line with an optional 1-indexed column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: Option<usize>,
}

impl Position {
    pub fn new(line: usize, column: Option<usize>) -> Self {
        Self { line, column }
    }

    pub fn line(line: usize) -> Self {
        Self { line, column: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    List,
    Code,
    Table,
    Blockquote,
    Html,
    ThematicBreak,
    Definition,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Heading {
        level: u8,
        text: String,
        position: Position,
        /// Last source line of the heading (differs from `position.line` for setext headings).
        end_line: usize,
    },
    /// Top-level non-heading block with its raw source text.
    Block {
        kind: BlockKind,
        raw: String,
        position: Position,
    },
    /// Fenced or indented code; `position.line` is the first content line.
    Code { value: String, position: Position },
    Text { value: String, position: Position },
    Link {
        url: String,
        text: String,
        position: Position,
    },
}

impl Token {
    pub fn position(&self) -> Position {
        match self {
            Token::Heading { position, .. }
            | Token::Block { position, .. }
            | Token::Code { position, .. }
            | Token::Text { position, .. }
            | Token::Link { position, .. } => *position,
        }
    }
}

pub fn parse_options() -> markdown::ParseOptions {
    markdown::ParseOptions {
        constructs: markdown::Constructs {
            frontmatter: true,
            ..markdown::Constructs::gfm()
        },
        ..markdown::ParseOptions::gfm()
    }
}

/// Tokenizes `source`; the error string is the parser's message.
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let root = markdown::to_mdast(source, &parse_options()).map_err(|m| m.to_string())?;
    let definitions = collect_definitions(&root);

    let mut tokens = Vec::new();
    if let Some(children) = root.children() {
        for child in children {
            push_block(child, source, &mut tokens);
            walk(child, source, &definitions, &mut tokens);
        }
    }
    Ok(tokens)
}

fn position_of(node: &Node) -> Position {
    node.position()
        .map(|p| Position::new(p.start.line, Some(p.start.column)))
        .unwrap_or_default()
}

fn push_block(node: &Node, source: &str, tokens: &mut Vec<Token>) {
    let kind = match node {
        Node::Heading(_) | Node::Yaml(_) | Node::Toml(_) => return,
        Node::Paragraph(_) => BlockKind::Paragraph,
        Node::List(_) => BlockKind::List,
        Node::Code(_) => BlockKind::Code,
        Node::Table(_) => BlockKind::Table,
        Node::Blockquote(_) => BlockKind::Blockquote,
        Node::Html(_) => BlockKind::Html,
        Node::ThematicBreak(_) => BlockKind::ThematicBreak,
        Node::Definition(_) => BlockKind::Definition,
        _ => BlockKind::Other,
    };
    let raw = node
        .position()
        .and_then(|p| source.get(p.start.offset..p.end.offset))
        .unwrap_or_default()
        .to_string();
    tokens.push(Token::Block {
        kind,
        raw,
        position: position_of(node),
    });
}

fn walk(node: &Node, source: &str, defs: &BTreeMap<String, String>, tokens: &mut Vec<Token>) {
    match node {
        Node::Heading(h) => {
            let mut text = String::new();
            for child in &h.children {
                plain_text(child, &mut text);
            }
            let end_line = h
                .position
                .as_ref()
                .map(|p| p.end.line)
                .unwrap_or_default();
            tokens.push(Token::Heading {
                level: h.depth,
                text: text.trim().to_string(),
                position: position_of(node),
                end_line,
            });
            // Heading text is already in the token; keep only its links.
            let mut inner = Vec::new();
            for child in &h.children {
                walk(child, source, defs, &mut inner);
            }
            tokens.extend(inner.into_iter().filter(|t| matches!(t, Token::Link { .. })));
        }
        Node::Code(code) => {
            let Some(pos) = code.position.as_ref() else {
                return;
            };
            let opening = source.get(pos.start.offset..).unwrap_or_default();
            let fenced = opening.starts_with("```") || opening.starts_with("~~~");
            let first_line = if fenced {
                pos.start.line + 1
            } else {
                pos.start.line
            };
            tokens.push(Token::Code {
                value: code.value.clone(),
                position: Position::line(first_line),
            });
        }
        Node::Text(t) => tokens.push(Token::Text {
            value: t.value.clone(),
            position: position_of(node),
        }),
        Node::InlineCode(c) => tokens.push(Token::Text {
            value: c.value.clone(),
            position: position_of(node),
        }),
        Node::Link(link) => {
            let mut text = String::new();
            for child in &link.children {
                plain_text(child, &mut text);
            }
            tokens.push(Token::Link {
                url: link.url.clone(),
                text,
                position: position_of(node),
            });
            for child in &link.children {
                walk(child, source, defs, tokens);
            }
        }
        Node::LinkReference(lr) => {
            let mut text = String::new();
            for child in &lr.children {
                plain_text(child, &mut text);
            }
            if let Some(url) = defs.get(&lr.identifier) {
                tokens.push(Token::Link {
                    url: url.clone(),
                    text,
                    position: position_of(node),
                });
            }
            for child in &lr.children {
                walk(child, source, defs, tokens);
            }
        }
        Node::Image(_) | Node::ImageReference(_) | Node::Yaml(_) | Node::Toml(_) => {}
        _ => {
            if let Some(children) = node.children() {
                for child in children {
                    walk(child, source, defs, tokens);
                }
            }
        }
    }
}

fn plain_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&t.value),
        Node::InlineCode(c) => out.push_str(&c.value),
        _ => {
            if let Some(children) = node.children() {
                for child in children {
                    plain_text(child, out);
                }
            }
        }
    }
}

fn collect_definitions(root: &Node) -> BTreeMap<String, String> {
    let mut defs = BTreeMap::new();

    fn walk(node: &Node, defs: &mut BTreeMap<String, String>) {
        match node {
            Node::Definition(def) => {
                defs.insert(def.identifier.clone(), def.url.clone());
            }
            _ => {
                if let Some(children) = node.children() {
                    for child in children {
                        walk(child, defs);
                    }
                }
            }
        }
    }

    walk(root, &mut defs);
    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_record_level_text_and_line() {
        let tokens = tokenize("# Title\n\nIntro\n\n## Sub *part*\n").unwrap();
        let headings: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Heading {
                    level,
                    text,
                    position,
                    ..
                } => Some((*level, text.clone(), position.line)),
                _ => None,
            })
            .collect();
        assert_eq!(
            headings,
            vec![(1, "Title".to_string(), 1), (2, "Sub part".to_string(), 5)]
        );
    }

    #[test]
    fn fenced_code_content_starts_after_fence() {
        let tokens = tokenize("Text\n\n```\nREQ-009\n```\n").unwrap();
        let code = tokens
            .iter()
            .find_map(|t| match t {
                Token::Code { value, position } => Some((value.clone(), position.line)),
                _ => None,
            })
            .unwrap();
        assert_eq!(code, ("REQ-009".to_string(), 4));
    }

    #[test]
    fn reference_style_links_resolve_through_definitions() {
        let tokens = tokenize("See [the doc][d].\n\n[d]: REQ-002.md\n").unwrap();
        let link = tokens
            .iter()
            .find_map(|t| match t {
                Token::Link { url, text, .. } => Some((url.clone(), text.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(link, ("REQ-002.md".to_string(), "the doc".to_string()));
    }

    #[test]
    fn links_inside_headings_follow_the_heading() {
        let tokens = tokenize("# Notes\n\n## See [REQ-404](REQ-404.md)\n").unwrap();
        let kinds: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Heading { text, .. } => Some(format!("h:{text}")),
                Token::Link { url, .. } => Some(format!("l:{url}")),
                Token::Text { .. } => Some("t".to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["h:Notes", "h:See REQ-404", "l:REQ-404.md"]);
    }

    #[test]
    fn front_matter_is_not_a_block() {
        let tokens = tokenize("---\nid: REQ-001\n---\n# Title\n").unwrap();
        assert!(
            !tokens
                .iter()
                .any(|t| matches!(t, Token::Block { raw, .. } if raw.contains("id: REQ-001")))
        );
    }
}
