#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-ir
//!
//! Intermediate Representation for EDI documents: the element-event stream
//! produced by parsing, the sink contract consumers implement to receive it,
//! and a generic node tree for callers that want a materialized document
//! (and for feeding the writer).

/// Element events and the sink contract for receiving them.
pub mod event;
/// Core tree node model used for materialized EDI documents.
pub mod node;
/// Source positions attached to parse output and errors.
pub mod position;
/// Typed values produced by data-type decoding.
pub mod value;

/// Event primitives and built-in sinks.
pub use event::{Event, EventCollector, EventSink, TreeBuilder};
/// Node tree type.
pub use node::Node;
/// Source position (segment and line numbers).
pub use position::Position;
/// Typed value produced by decoding.
pub use value::Value;

use thiserror::Error;

/// Errors that can occur when assembling trees from event streams
#[derive(Error, Debug)]
pub enum Error {
    #[error("end of node '{found}' does not close open node '{expected}'")]
    UnbalancedEnd { expected: String, found: String },

    #[error("end of node '{name}' with no node open")]
    EndWithoutStart { name: String },

    #[error("text event received with no node open")]
    TextOutsideNode,

    #[error("event stream finished with {depth} node(s) still open")]
    UnclosedNodes { depth: usize },

    #[error("event stream produced {count} root nodes where one was expected")]
    MultipleRoots { count: usize },

    #[error("event stream produced no root node")]
    EmptyStream,
}

impl Error {
    /// Build an unbalanced-end error naming the open node and the closer.
    pub fn unbalanced_end(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnbalancedEnd {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Crate-local result type for IR operations.
pub type Result<T> = std::result::Result<T, Error>;
