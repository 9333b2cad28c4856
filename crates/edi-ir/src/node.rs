//! Node types for materialized EDI documents

use serde::{Deserialize, Serialize};

/// A node in an EDI document tree
///
/// Parse output maps each matched grammar node to one `Node`, named by the
/// grammar node's output name. Leaf nodes (fields, components, sub-components)
/// carry the unescaped raw text; container nodes carry children only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Element name (the grammar node's output name)
    pub name: String,

    /// Element namespace, when the grammar declares one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Text content (unescaped), present on leaf nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Child nodes, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    /// Create an empty container node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            value: None,
            children: Vec::new(),
        }
    }

    /// Create an empty container node in a namespace
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            value: None,
            children: Vec::new(),
        }
    }

    /// Create a leaf node carrying text content
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    /// Add a child node
    pub fn add_child(&mut self, child: Node) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Builder-style child attachment
    #[must_use]
    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append text to this node's content
    pub fn append_text(&mut self, text: &str) {
        match &mut self.value {
            Some(existing) => existing.push_str(text),
            None => self.value = Some(text.to_string()),
        }
    }

    /// Find the first child with the given name
    pub fn find_child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Find all children with the given name
    pub fn find_children(&self, name: &str) -> Vec<&Node> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    /// Text content of the first child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.find_child(name).and_then(|c| c.value.as_deref())
    }

    /// True when the node has neither text nor children
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Total number of nodes in this subtree, including this node
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_line(item: &str, qty: &str) -> Node {
        Node::new("line-item")
            .child(Node::leaf("item", item))
            .child(Node::leaf("quantity", qty))
    }

    #[test]
    fn test_find_child_returns_first_match() {
        let node = Node::new("order")
            .child(order_line("111", "2"))
            .child(order_line("222", "5"));

        let first = node.find_child("line-item").unwrap();
        assert_eq!(first.child_text("item"), Some("111"));
        assert_eq!(node.find_children("line-item").len(), 2);
    }

    #[test]
    fn test_append_text_concatenates() {
        let mut node = Node::new("name");
        node.append_text("Joe");
        node.append_text(" Bloggs");
        assert_eq!(node.value.as_deref(), Some("Joe Bloggs"));
    }

    #[test]
    fn test_subtree_len_counts_self_and_descendants() {
        let node = Node::new("order").child(order_line("111", "2"));
        assert_eq!(node.subtree_len(), 4);
    }

    #[test]
    fn test_serialization_skips_empty_parts() {
        let json = serde_json::to_string(&Node::leaf("item", "111")).unwrap();
        assert_eq!(json, r#"{"name":"item","value":"111"}"#);
    }
}
