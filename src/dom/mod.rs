//! Document model shared by NCC, SMIL, and content documents.
//!
//! Documents are parsed with quick-xml into an append-only node arena
//! ([`Document`]). Cloning a run of elements into an output document and
//! rewriting its references are explicit operations on that arena; the
//! source document is never mutated.
//!
//! ```
//! use dtbmerge::dom::parse_str;
//!
//! let doc = parse_str(r#"<html><body><h1 id="a">Title</h1></body></html>"#, None).unwrap();
//! let h1 = doc.get_by_id("a").unwrap();
//! assert_eq!(doc.text_content(h1), "Title");
//! ```

mod arena;
mod parser;
mod serialize;
pub mod uri;

pub use arena::{Attribute, ChildrenIter, Document, Node, NodeData, NodeId};
pub use parser::{parse_bytes, parse_str};
pub use uri::{Reference, document_identity, resolve_reference};

/// Heading rank of an element name (`h1` → 1 … `h6` → 6).
pub fn heading_level(name: &str) -> Option<u8> {
    let digit = name.strip_prefix('h')?;
    match digit {
        "1" | "2" | "3" | "4" | "5" | "6" => digit.parse().ok(),
        _ => None,
    }
}

impl Document {
    /// Heading rank of the element at `id`, if it is a heading.
    pub fn heading_level(&self, id: NodeId) -> Option<u8> {
        self.element_name(id).and_then(heading_level)
    }

    /// The `<head>` element, if present.
    pub fn head(&self) -> Option<NodeId> {
        self.find_by_tag("head")
    }

    /// The `<body>` element, if present.
    pub fn body(&self) -> Option<NodeId> {
        self.find_by_tag("body")
    }

    /// `<meta name=... content=...>` lookup in the head.
    pub fn meta_content(&self, name: &str) -> Option<&str> {
        let head = self.head()?;
        self.element_children(head)
            .find(|&m| self.element_name(m) == Some("meta") && self.attr(m, "name") == Some(name))
            .and_then(|m| self.attr(m, "content"))
    }

    /// Set a `<meta name=... content=...>` in the head, replacing an existing
    /// one with the same name. Does nothing when the document has no head.
    pub fn set_meta(&mut self, name: &str, content: &str) {
        let Some(head) = self.head() else {
            return;
        };
        let existing = self
            .element_children(head)
            .find(|&m| self.element_name(m) == Some("meta") && self.attr(m, "name") == Some(name));
        match existing {
            Some(meta) => self.set_attr(meta, "content", content),
            None => {
                let meta = self.create_element(
                    "meta",
                    vec![Attribute::new("name", name), Attribute::new("content", content)],
                );
                self.append(head, meta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("h1"), Some(1));
        assert_eq!(heading_level("h6"), Some(6));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("head"), None);
        assert_eq!(heading_level("html"), None);
    }

    #[test]
    fn test_set_meta_replaces() {
        let mut doc = parse_str(
            r#"<html><head><meta name="ncc:depth" content="1"/></head><body/></html>"#,
            None,
        )
        .unwrap();
        doc.set_meta("ncc:depth", "3");
        doc.set_meta("dc:format", "Daisy 2.02");
        assert_eq!(doc.meta_content("ncc:depth"), Some("3"));
        assert_eq!(doc.meta_content("dc:format"), Some("Daisy 2.02"));
        let head = doc.head().unwrap();
        assert_eq!(doc.element_children(head).count(), 2);
    }
}
