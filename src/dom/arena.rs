//! Arena-based document tree.
//!
//! Every node lives in a contiguous vector and is addressed by a stable
//! [`NodeId`]. Nodes are never freed: detaching only unlinks them, so ids held
//! elsewhere (run lists, side tables) stay valid for the life of the document.

use std::collections::HashMap;

use url::Url;

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Document root.
    Document,
    /// Element with qualified name (prefix kept verbatim) and attributes.
    Element { name: String, attrs: Vec<Attribute> },
    /// Text content, entities already resolved.
    Text(String),
    Comment(String),
    /// Raw DOCTYPE body, e.g. `html PUBLIC "..." "..."`.
    Doctype(String),
}

/// Element attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// An XML/XHTML document stored as a node arena.
///
/// `base_uri` is the location the document was loaded from. Subtrees copied in
/// from other documents keep their own base URI in the `origin` side table, so
/// relative references inside them can still be resolved after the copy.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    id_map: HashMap<String, NodeId>,
    base_uri: Option<Url>,
    origin: HashMap<NodeId, Url>,
}

impl Document {
    /// Create a new empty document with a root node.
    pub fn new(base_uri: Option<Url>) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId::NONE,
            id_map: HashMap::new(),
            base_uri,
            origin: HashMap::new(),
        };
        doc.root = doc.alloc(Node::new(NodeData::Document));
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get the document root ID.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    /// Base URI in effect for `id`: the origin of the imported subtree it
    /// belongs to, or the document's own base URI.
    pub fn base_uri_of(&self, id: NodeId) -> Option<&Url> {
        let mut current = id;
        while current.is_some() {
            if let Some(url) = self.origin.get(&current) {
                return Some(url);
            }
            current = self.parent(current);
        }
        self.base_uri.as_ref()
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Create a new, unattached element node.
    pub fn create_element(&mut self, name: impl Into<String>, attrs: Vec<Attribute>) -> NodeId {
        let id_attr = attrs
            .iter()
            .find(|a| a.name == "id")
            .map(|a| a.value.clone());
        let node_id = self.alloc(Node::new(NodeData::Element {
            name: name.into(),
            attrs,
        }));
        if let Some(id_str) = id_attr {
            self.id_map.entry(id_str).or_insert(node_id);
        }
        node_id
    }

    /// Create a new, unattached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text.into())))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text.into())))
    }

    pub fn create_doctype(&mut self, body: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Doctype(body.into())))
    }

    /// Append a child to a parent node.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if last_child.is_some()
            && let Some(last_node) = self.get_mut(last_child)
        {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Append text to an existing trailing text node, or create a new one.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(ref mut existing) = last.data
        {
            existing.push_str(text);
            return;
        }

        let text_node = self.create_text(text);
        self.append(parent, text_node);
    }

    /// Unlink a node from its parent. The node and its subtree stay in the
    /// arena but are no longer reachable from the root.
    pub fn detach(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);

        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = next;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = next;
        }

        if let Some(n) = self.get_mut(next) {
            n.prev_sibling = prev;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Deep-copy a subtree of `src` into this arena, returning the unattached
    /// copy. The copy remembers the base URI of the node it was taken from.
    pub fn import_subtree(&mut self, src: &Document, node: NodeId) -> NodeId {
        let copy = self.import_node(src, node);
        if let Some(url) = src.base_uri_of(node) {
            self.origin.insert(copy, url.clone());
        }
        copy
    }

    fn import_node(&mut self, src: &Document, node: NodeId) -> NodeId {
        let Some(src_node) = src.get(node) else {
            return NodeId::NONE;
        };
        let copy = match &src_node.data {
            NodeData::Element { name, attrs } => self.create_element(name.clone(), attrs.clone()),
            other => self.alloc(Node::new(other.clone())),
        };
        let children: Vec<NodeId> = src.children(node).collect();
        for child in children {
            let child_copy = self.import_node(src, child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Get node by id attribute.
    ///
    /// Only ids present at creation or set through [`Document::set_attr`] are
    /// indexed; the first element carrying an id wins.
    pub fn get_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_map.get(id).copied()
    }

    /// Get the number of nodes in the arena, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the document has nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.get(self.root).is_none_or(|n| n.first_child.is_none())
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.parent).unwrap_or(NodeId::NONE)
    }

    /// Iterate over children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        ChildrenIter {
            doc: self,
            current: first,
        }
    }

    /// Iterate over element children of a node.
    pub fn element_children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent).filter(|&c| self.is_element(c))
    }

    /// Next sibling that is an element.
    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.get(id)?.next_sibling;
        while current.is_some() {
            if self.is_element(current) {
                return Some(current);
            }
            current = self.get(current)?.next_sibling;
        }
        None
    }

    /// All nodes below `id` in document order, `id` itself first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.get(current).is_none() {
                continue;
            }
            out.push(current);
            let mut children: Vec<_> = self.children(current).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Element descendants of `id` (inclusive) with the given tag name.
    pub fn descendants_named(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.element_name(n) == Some(tag))
            .collect()
    }

    /// Find element by tag name (first match in document order).
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.element_name(n) == Some(tag))
    }

    /// Nearest ancestor-or-self element with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = id;
        while current.is_some() {
            if self.element_name(current) == Some(tag) {
                return Some(current);
            }
            current = self.parent(current);
        }
        None
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self
            .doc
            .get(id)
            .map(|n| n.next_sibling)
            .unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Convenience methods for element and text nodes.
impl Document {
    /// Get element's tag name.
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Rename an element in place.
    pub fn set_element_name(&mut self, id: NodeId, new_name: &str) {
        if let Some(Node {
            data: NodeData::Element { name, .. },
            ..
        }) = self.get_mut(id)
        {
            *name = new_name.to_string();
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { attrs, .. } => Some(attrs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Get an attribute value.
    pub fn attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| a.name == attr_name)
            .map(|a| a.value.as_str())
    }

    /// Set (or add) an attribute value. Setting `id` updates the id index.
    pub fn set_attr(&mut self, id: NodeId, attr_name: &str, value: &str) {
        let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.get_mut(id)
        else {
            return;
        };
        let previous = match attrs.iter_mut().find(|a| a.name == attr_name) {
            Some(attr) => Some(std::mem::replace(&mut attr.value, value.to_string())),
            None => {
                attrs.push(Attribute::new(attr_name, value));
                None
            }
        };
        if attr_name == "id" {
            if let Some(old) = previous
                && self.id_map.get(&old) == Some(&id)
            {
                self.id_map.remove(&old);
            }
            self.id_map.insert(value.to_string(), id);
        }
    }

    /// Get element's id attribute.
    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.attr(id, "id")
    }

    /// Check whether the element's `class` attribute contains `class`.
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|v| v.split_whitespace().any(|c| c == class))
    }

    /// Check if node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    /// Check if node is a text node.
    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| matches!(n.data, NodeData::Text(_)))
    }

    /// Get text of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Replace the text of a text node.
    pub fn set_text(&mut self, id: NodeId, text: String) {
        if let Some(Node {
            data: NodeData::Text(existing),
            ..
        }) = self.get_mut(id)
        {
            *existing = text;
        }
    }

    /// Concatenated text of all text nodes below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }
}
