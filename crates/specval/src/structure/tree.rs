use std::sync::OnceLock;

use regex::Regex;

use crate::extract::{Heading, ParsedDocument};
use crate::tokens::{BlockKind, Position, Token};

/// Index of a node inside its [`SectionTree`].
pub type SectionId = usize;

/// Root node index; the synthetic level-0 root always occupies slot 0.
pub const ROOT: SectionId = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub raw: String,
    pub position: Position,
}

#[derive(Clone, Debug)]
pub struct SectionNode {
    pub heading: String,
    /// 1-6, or 0 for the synthetic root.
    pub level: u8,
    pub position: Position,
    pub blocks: Vec<ContentBlock>,
    pub children: Vec<SectionId>,
    pub id: Option<String>,
    /// Non-owning back-reference used for path reconstruction.
    pub parent: Option<SectionId>,
    /// Index into the document's flat heading list; `None` for the root.
    pub heading_index: Option<usize>,
}

/// Heading hierarchy of one document. Nodes are owned by the arena top-down.
#[derive(Clone, Debug)]
pub struct SectionTree {
    nodes: Vec<SectionNode>,
}

impl SectionTree {
    /// Builds the tree from a document: headings become nodes, top-level
    /// blocks attach to the most recently opened section, and the root
    /// carries the document-level identifier.
    pub fn build(doc: &ParsedDocument) -> Self {
        let mut tree = Self::from_headings(&doc.headings);
        tree.nodes[ROOT].id = doc.spec_id.clone();

        let mut current = ROOT;
        let mut next_heading = 0usize;
        for token in &doc.tokens {
            match token {
                Token::Heading { .. } => {
                    next_heading += 1;
                    current = tree.node_for_heading(next_heading - 1).unwrap_or(ROOT);
                }
                Token::Block {
                    kind,
                    raw,
                    position,
                } => tree.nodes[current].blocks.push(ContentBlock {
                    kind: *kind,
                    raw: raw.clone(),
                    position: *position,
                }),
                _ => {}
            }
        }
        tree
    }

    /// Single linear pass over a level-stack seeded with the root.
    pub fn from_headings(headings: &[Heading]) -> Self {
        let mut nodes = vec![SectionNode {
            heading: String::new(),
            level: 0,
            position: Position::default(),
            blocks: Vec::new(),
            children: Vec::new(),
            id: None,
            parent: None,
            heading_index: None,
        }];
        let mut stack: Vec<(u8, SectionId)> = vec![(0, ROOT)];

        for (index, heading) in headings.iter().enumerate() {
            while let Some((level, _)) = stack.last() {
                if *level < heading.level {
                    break;
                }
                stack.pop();
            }
            let parent = stack.last().map(|(_, id)| *id).unwrap_or(ROOT);

            let id = nodes.len();
            nodes.push(SectionNode {
                heading: heading.text.clone(),
                level: heading.level,
                position: heading.position,
                blocks: Vec::new(),
                children: Vec::new(),
                id: extract_section_id(&heading.text),
                parent: Some(parent),
                heading_index: Some(index),
            });
            nodes[parent].children.push(id);
            stack.push((heading.level, id));
        }

        Self { nodes }
    }

    fn node_for_heading(&self, heading_index: usize) -> Option<SectionId> {
        // Headings are appended in order, so node `n` holds heading `n - 1`.
        let id = heading_index + 1;
        (self.nodes.get(id)?.heading_index == Some(heading_index)).then_some(id)
    }

    pub fn root(&self) -> &SectionNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, id: SectionId) -> &SectionNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Depth-first preorder over every non-root node.
    pub fn all_sections(&self) -> Vec<SectionId> {
        self.descendants(ROOT)
    }

    /// Depth-first preorder over the descendants of `id` (excluding `id`).
    pub fn descendants(&self, id: SectionId) -> Vec<SectionId> {
        let mut out = Vec::new();
        let mut stack: Vec<SectionId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    pub fn sections_at_level(&self, level: u8) -> Vec<SectionId> {
        self.all_sections()
            .into_iter()
            .filter(|id| self.nodes[*id].level == level)
            .collect()
    }

    /// Case-insensitive heading match, among direct children of the root or recursively.
    pub fn find_by_heading(&self, text: &str, recursive: bool) -> Option<SectionId> {
        self.find_under(ROOT, recursive, |node| {
            node.heading.trim().eq_ignore_ascii_case(text.trim())
        })
    }

    pub fn find_by_id(&self, id: &str, recursive: bool) -> Option<SectionId> {
        self.find_under(ROOT, recursive, |node| node.id.as_deref() == Some(id))
    }

    fn find_under<F>(&self, start: SectionId, recursive: bool, predicate: F) -> Option<SectionId>
    where
        F: Fn(&SectionNode) -> bool,
    {
        let candidates = if recursive {
            self.descendants(start)
        } else {
            self.nodes[start].children.clone()
        };
        candidates
            .into_iter()
            .find(|id| predicate(&self.nodes[*id]))
    }

    /// Heading texts from the outermost section down to `id`.
    pub fn section_path(&self, id: SectionId) -> Vec<String> {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ROOT {
                break;
            }
            path.push(self.nodes[current].heading.clone());
            cursor = self.nodes[current].parent;
        }
        path.reverse();
        path
    }

    pub fn is_descendant_of(&self, id: SectionId, ancestor: SectionId) -> bool {
        let mut cursor = self.nodes[id].parent;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes[current].parent;
        }
        false
    }
}

/// Section identifier from heading text; the first matching form wins:
/// `ID: title`, `title (ID)`, `ID title`, `ID/SUBID: title`.
pub fn extract_section_id(heading: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        const ID: &str = r"[A-Z][A-Z0-9]*-[A-Z0-9][A-Z0-9.\-]*";
        [
            format!(r"^({ID})\s*:"),
            format!(r"\(({ID})\)"),
            format!(r"^({ID})(?:\s|$)"),
            format!(r"^({ID}/{ID})\s*:"),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid regex"))
        .collect()
    });

    let heading = heading.trim();
    patterns
        .iter()
        .find_map(|re| re.captures(heading))
        .map(|caps| caps[1].trim_end_matches(['.', '-']).to_string())
}
