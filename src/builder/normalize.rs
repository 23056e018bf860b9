//! Whitespace cleanup of the output documents.

use super::BuildState;
use crate::dom::{Document, NodeId, heading_level};
use crate::util::collapse_whitespace;

pub(super) fn normalize_state(state: &mut BuildState) {
    for (_, smil) in &mut state.smils {
        strip_whitespace_text(smil);
    }
    normalize_blocks(&mut state.ncc);
    if let Some(content) = state.content.as_mut() {
        normalize_blocks(content);
    }
}

/// Drop whitespace-only text nodes.
pub(super) fn strip_whitespace_text(doc: &mut Document) {
    let blank: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.text(n).is_some_and(|t| t.trim().is_empty()))
        .collect();
    for node in blank {
        doc.detach(node);
    }
}

/// Collapse whitespace inside headings and paragraphs and trim their edges.
pub(super) fn normalize_blocks(doc: &mut Document) {
    let Some(body) = doc.body() else {
        return;
    };
    let blocks: Vec<NodeId> = doc
        .descendants(body)
        .into_iter()
        .filter(|&n| {
            doc.element_name(n)
                .is_some_and(|name| name == "p" || heading_level(name).is_some())
        })
        .collect();
    for block in blocks {
        normalize_block(doc, block);
    }
}

/// Collapse every text run below `block`, then trim the block's leading and
/// trailing whitespace, however deeply the edge text is wrapped.
fn normalize_block(doc: &mut Document, block: NodeId) {
    let texts: Vec<NodeId> = doc
        .descendants(block)
        .into_iter()
        .filter(|&n| doc.is_text(n))
        .collect();
    for &node in &texts {
        if let Some(text) = doc.text(node) {
            let collapsed = collapse_whitespace(text);
            doc.set_text(node, collapsed);
        }
    }

    let mut kept = texts;
    while let Some(&node) = kept.first() {
        let trimmed = doc.text(node).unwrap_or_default().trim_start().to_string();
        if trimmed.is_empty() {
            doc.detach(node);
            kept.remove(0);
        } else {
            doc.set_text(node, trimmed);
            break;
        }
    }
    while let Some(&node) = kept.last() {
        let trimmed = doc.text(node).unwrap_or_default().trim_end().to_string();
        if trimmed.is_empty() {
            doc.detach(node);
            kept.pop();
        } else {
            doc.set_text(node, trimmed);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_str;

    #[test]
    fn test_strip_whitespace_text() {
        let mut smil = parse_str(
            "<smil><body>\n  <seq>\n    <par id=\"a\"/>\n  </seq>\n</body></smil>",
            None,
        )
        .unwrap();
        strip_whitespace_text(&mut smil);
        assert_eq!(
            smil.outer_xml(smil.find_by_tag("body").unwrap()),
            r#"<body><seq><par id="a" /></seq></body>"#
        );
    }

    #[test]
    fn test_normalize_heading_through_sole_child() {
        let mut ncc = parse_str(
            "<html><body><h1 id=\"h\">\n  <a href=\"a.smil#x\">  Chapter\n\t One  </a>\n</h1></body></html>",
            None,
        )
        .unwrap();
        normalize_blocks(&mut ncc);
        let h1 = ncc.get_by_id("h").unwrap();
        assert_eq!(ncc.text_content(h1), "Chapter One");
    }

    #[test]
    fn test_normalize_mixed_paragraph() {
        let mut doc = parse_str(
            "<html><body><p id=\"p\">  Some   <em>very</em>\n text  </p></body></html>",
            None,
        )
        .unwrap();
        normalize_blocks(&mut doc);
        let p = doc.get_by_id("p").unwrap();
        assert_eq!(doc.text_content(p), "Some very text");
    }
}
