//! Element events and sinks
//!
//! Parsing emits a flat, ordered stream of start/text/end events. Consumers
//! implement [`EventSink`] to receive it; [`TreeBuilder`] is the built-in sink
//! for callers that want a materialized [`Node`] tree.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Error, Node, Result};

/// One element event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Opens an element
    StartNode {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },

    /// Text content of the innermost open element
    Text(String),

    /// Closes the innermost open element
    EndNode { name: String },
}

/// Receiver for the element-event stream
///
/// Events arrive in document order and are properly nested: every
/// `start_node` is eventually closed by an `end_node` carrying the same name.
/// A sink error aborts the producing parse.
pub trait EventSink {
    /// An element opens.
    fn start_node(&mut self, name: &str, namespace: Option<&str>) -> Result<()>;

    /// Text content for the innermost open element.
    fn text(&mut self, value: &str) -> Result<()>;

    /// The innermost open element closes.
    fn end_node(&mut self, name: &str) -> Result<()>;
}

/// Sink that records the raw event sequence
#[derive(Debug, Default)]
pub struct EventCollector {
    /// Events in arrival order
    pub events: Vec<Event>,
}

impl EventCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for EventCollector {
    fn start_node(&mut self, name: &str, namespace: Option<&str>) -> Result<()> {
        self.events.push(Event::StartNode {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        });
        Ok(())
    }

    fn text(&mut self, value: &str) -> Result<()> {
        self.events.push(Event::Text(value.to_string()));
        Ok(())
    }

    fn end_node(&mut self, name: &str) -> Result<()> {
        self.events.push(Event::EndNode {
            name: name.to_string(),
        });
        Ok(())
    }
}

/// Sink that assembles [`Node`] trees from the event stream
///
/// Top-level start/end pairs each produce one root; a single message parse
/// produces exactly one.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    stack: Vec<Node>,
    roots: Vec<Node>,
}

impl TreeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth of currently open elements
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Finish and return the single root node
    pub fn into_root(self) -> Result<Node> {
        let mut roots = self.into_roots()?;
        match roots.len() {
            1 => Ok(roots.remove(0)),
            0 => Err(Error::EmptyStream),
            n => Err(Error::MultipleRoots { count: n }),
        }
    }

    /// Finish and return all root nodes in document order
    pub fn into_roots(self) -> Result<Vec<Node>> {
        if !self.stack.is_empty() {
            return Err(Error::UnclosedNodes {
                depth: self.stack.len(),
            });
        }
        if self.roots.is_empty() {
            return Err(Error::EmptyStream);
        }
        Ok(self.roots)
    }
}

impl EventSink for TreeBuilder {
    fn start_node(&mut self, name: &str, namespace: Option<&str>) -> Result<()> {
        let node = match namespace {
            Some(ns) => Node::with_namespace(name, ns),
            None => Node::new(name),
        };
        self.stack.push(node);
        Ok(())
    }

    fn text(&mut self, value: &str) -> Result<()> {
        match self.stack.last_mut() {
            Some(open) => {
                open.append_text(value);
                Ok(())
            }
            None => Err(Error::TextOutsideNode),
        }
    }

    fn end_node(&mut self, name: &str) -> Result<()> {
        let node = self.stack.pop().ok_or_else(|| Error::EndWithoutStart {
            name: name.to_string(),
        })?;
        if node.name != name {
            return Err(Error::unbalanced_end(node.name, name));
        }
        match self.stack.last_mut() {
            Some(parent) => {
                parent.add_child(node);
            }
            None => {
                trace!(root = %node.name, "root element complete");
                self.roots.push(node);
            }
        }
        Ok(())
    }
}
