use std::path::Path;

use proptest::prelude::*;
use specval::{Heading, Position, ROOT, SectionTree, SpecExtractor};

fn headings(levels: &[u8]) -> Vec<Heading> {
    levels
        .iter()
        .enumerate()
        .map(|(index, level)| Heading {
            level: *level,
            text: format!("Heading {index}"),
            position: Position::line(index + 1),
            end_line: index + 1,
            slug: Some(format!("heading-{index}")),
        })
        .collect()
}

fn markdown(levels: &[u8]) -> String {
    levels
        .iter()
        .enumerate()
        .map(|(index, level)| format!("{} Heading {index}\n\nBody {index}.\n\n", "#".repeat(*level as usize)))
        .collect()
}

proptest! {
    #[test]
    fn preorder_walk_reproduces_heading_order(levels in prop::collection::vec(1u8..=6, 0..40)) {
        let tree = SectionTree::from_headings(&headings(&levels));

        let walked: Vec<u8> = tree.all_sections().iter().map(|id| tree.node(*id).level).collect();
        prop_assert_eq!(walked, levels.clone());
        prop_assert_eq!(tree.len(), levels.len() + 1);
    }

    #[test]
    fn parents_are_shallower_and_link_back(levels in prop::collection::vec(1u8..=6, 0..40)) {
        let tree = SectionTree::from_headings(&headings(&levels));

        for id in tree.all_sections() {
            let node = tree.node(id);
            let parent = node.parent.expect("non-root node has a parent");
            prop_assert!(tree.node(parent).level < node.level);
            prop_assert!(tree.node(parent).children.contains(&id));
            prop_assert!(tree.is_descendant_of(id, ROOT));
        }
    }

    #[test]
    fn parsed_markdown_builds_the_same_tree(levels in prop::collection::vec(1u8..=6, 1..20)) {
        let source = markdown(&levels);
        let mut diagnostics = Vec::new();
        let doc = SpecExtractor::new()
            .extract(Path::new("doc.md"), &source, &mut diagnostics)
            .expect("extract");
        let tree = SectionTree::build(&doc);

        let walked: Vec<u8> = tree.all_sections().iter().map(|id| tree.node(*id).level).collect();
        prop_assert_eq!(walked, levels.clone());
        for id in tree.all_sections() {
            prop_assert_eq!(tree.node(id).blocks.len(), 1);
        }
    }

    #[test]
    fn fenced_identifiers_are_only_returned_on_request(
        number in 1u32..1000,
        fenced in any::<bool>(),
    ) {
        let id = format!("REQ-{number:03}");
        let source = if fenced {
            format!("# Notes\n\n```text\n{id}\n```\n")
        } else {
            format!("# Notes\n\nMentions {id} inline.\n")
        };
        let mut diagnostics = Vec::new();
        let doc = SpecExtractor::new()
            .extract(Path::new("notes.md"), &source, &mut diagnostics)
            .expect("extract");

        let prose: Vec<&str> = doc.get_identifiers(false).iter().map(|o| o.id.as_str()).collect();
        let all: Vec<&str> = doc.get_identifiers(true).iter().map(|o| o.id.as_str()).collect();

        prop_assert_eq!(all, vec![id.as_str()]);
        if fenced {
            prop_assert!(prose.is_empty());
        } else {
            prop_assert_eq!(prose, vec![id.as_str()]);
        }
    }
}
