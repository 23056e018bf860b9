//! Document serialization.

use super::arena::{Document, NodeData, NodeId};

/// Elements that are empty by definition in XHTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "hr", "img", "input", "link", "meta", "param",
];

impl Document {
    /// Serialize the document, including an XML declaration.
    pub fn serialize(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        let xhtml = self
            .element_children(self.root())
            .next()
            .and_then(|root| self.element_name(root))
            == Some("html");
        for child in self.children(self.root()) {
            self.write_node(child, xhtml, &mut out);
            if !self.is_text(child) {
                out.push('\n');
            }
        }
        out
    }

    /// Serialize a single node and its subtree.
    pub fn outer_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, false, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, xhtml: bool, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Document => {
                for child in self.children(id) {
                    self.write_node(child, xhtml, out);
                }
            }
            NodeData::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for attr in attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape_xml(&attr.value));
                    out.push('"');
                }
                if node.first_child.is_none()
                    && (!xhtml || VOID_ELEMENTS.contains(&name.as_str()))
                {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_node(child, xhtml, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Doctype(body) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(body);
                out.push('>');
            }
        }
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
