use crate::extract::ParsedDocument;
use crate::front_matter::front_matter_line_count;

use super::tree::{ROOT, SectionId, SectionTree};

/// Raw text owned directly by a section: the lines after its heading up to the
/// next heading of any level. Nested subsections keep their own bodies.
pub fn section_body(doc: &ParsedDocument, tree: &SectionTree, id: SectionId) -> String {
    let lines = doc.lines();
    let (start, end) = match tree.node(id).heading_index {
        None if id == ROOT => {
            let start = front_matter_line_count(&doc.source);
            let end = doc
                .headings
                .first()
                .map(|h| h.position.line.saturating_sub(1))
                .unwrap_or(lines.len());
            (start, end)
        }
        None => return String::new(),
        Some(index) => {
            let start = doc.headings[index].end_line;
            let end = doc
                .headings
                .get(index + 1)
                .map(|h| h.position.line.saturating_sub(1))
                .unwrap_or(lines.len());
            (start, end)
        }
    };

    let end = end.min(lines.len());
    if start >= end {
        return String::new();
    }
    join_lines(&lines[start..end])
}

fn join_lines(lines: &[&str]) -> String {
    let trimmed_end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let trimmed_start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(trimmed_end);
    if trimmed_start >= trimmed_end {
        return String::new();
    }
    let mut out = lines[trimmed_start..trimmed_end].join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::extract::SpecExtractor;

    fn parse(source: &str) -> (ParsedDocument, SectionTree) {
        let mut diagnostics = Vec::new();
        let doc = SpecExtractor::new()
            .extract(Path::new("doc.md"), source, &mut diagnostics)
            .unwrap();
        let tree = SectionTree::build(&doc);
        (doc, tree)
    }

    #[test]
    fn body_stops_at_next_heading_of_any_level() {
        let (doc, tree) = parse(
            "# Title\n\n## Acceptance Criteria\n\nIntro line.\n\n### AC-01: Login\n\n**Given** a user\n\n## Notes\n\nLast.\n",
        );
        let criteria = tree.find_by_heading("Acceptance Criteria", true).unwrap();
        assert_eq!(section_body(&doc, &tree, criteria), "Intro line.\n");

        let ac = tree.find_by_id("AC-01", true).unwrap();
        assert_eq!(section_body(&doc, &tree, ac), "**Given** a user\n");

        let notes = tree.find_by_heading("Notes", true).unwrap();
        assert_eq!(section_body(&doc, &tree, notes), "Last.\n");
    }

    #[test]
    fn empty_section_has_empty_body() {
        let (doc, tree) = parse("# Title\n## Empty\n## Next\ntext\n");
        let empty = tree.find_by_heading("Empty", true).unwrap();
        assert_eq!(section_body(&doc, &tree, empty), "");
    }

    #[test]
    fn root_body_skips_front_matter() {
        let (doc, tree) = parse("---\nid: REQ-1\n---\nPreamble\n# Title\n");
        assert_eq!(section_body(&doc, &tree, ROOT), "Preamble\n");
    }

    #[test]
    fn blocks_attach_to_owning_section() {
        let (_, tree) = parse("Intro\n\n# Title\n\nPara one\n\n## Sub\n\n- item\n");
        assert_eq!(tree.root().blocks.len(), 1);
        let title = tree.find_by_heading("Title", false).unwrap();
        assert_eq!(tree.node(title).blocks.len(), 1);
        let sub = tree.find_by_heading("Sub", true).unwrap();
        assert_eq!(tree.node(sub).blocks[0].raw.trim(), "- item");
    }
}
