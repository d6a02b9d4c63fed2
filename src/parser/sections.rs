use std::sync::LazyLock;

use regex::Regex;

use super::blocks::Block;

/// Level of the headings that delimit article sections.
const SECTION_LEVEL: u8 = 2;

static SEE_ALSO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)see also").unwrap());

/// Blocks strictly between a section heading and the next heading of the same
/// or a higher level.
#[derive(Debug, Clone)]
pub struct Section {
    pub heading: String,
    pub blocks: Vec<Block>,
}

/// All top-level section headings, in document order.
pub fn headings(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|b| match b {
            Block::Heading { level, text } if *level == SECTION_LEVEL => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Body of the first top-level section whose heading equals `heading`.
pub fn section_body(blocks: &[Block], heading: &str) -> Option<Section> {
    let start = blocks.iter().position(|b| {
        matches!(b, Block::Heading { level, text } if *level == SECTION_LEVEL && text == heading)
    })?;

    let body = blocks[start + 1..]
        .iter()
        .take_while(|b| !matches!(b, Block::Heading { level, .. } if *level <= SECTION_LEVEL))
        .cloned()
        .collect();

    Some(Section {
        heading: heading.to_string(),
        blocks: body,
    })
}

/// Whether a heading names a "See also" section ("See also", "See Also[edit]", ...).
pub fn is_see_also_heading(text: &str) -> bool {
    SEE_ALSO_RE.is_match(text)
}

// ── Tests ──
