mod content;
mod tree;

pub use content::section_body;
pub use tree::{ContentBlock, ROOT, SectionId, SectionNode, SectionTree, extract_section_id};
