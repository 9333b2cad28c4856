//! # edi-grammar
//!
//! The declarative grammar model that drives EDI parsing and writing.
//!
//! A grammar is an [`Edimap`]: a delimiter set plus a tree of segment groups,
//! segments, fields, components and sub-components describing the expected
//! message structure with occurrence bounds. Grammars are built once, validated
//! eagerly, and shared read-only between parses via a [`GrammarRegistry`].

pub mod delimiters;
pub mod model;
pub mod registry;
pub mod types;
pub mod validate;

pub use delimiters::Delimiters;
pub use model::{
    Component, Description, Edimap, Field, GroupChild, MaxOccurs, Segment, SegmentGroup,
    SubComponent,
};
pub use registry::GrammarRegistry;
pub use types::DataType;

use thiserror::Error;

/// Errors raised while building, validating or resolving grammars
#[derive(Error, Debug)]
pub enum Error {
    #[error("delimiter roles {role_a} and {role_b} both use '{ch}'")]
    DuplicateDelimiter {
        role_a: &'static str,
        role_b: &'static str,
        ch: char,
    },

    #[error("ambiguous grammar in '{container}': tag '{tag}' can start more than one sibling")]
    AmbiguousGrammar { container: String, tag: String },

    #[error("segment group '{name}' has no children")]
    EmptyGroup { name: String },

    #[error("segment '{name}' declares an empty segment code")]
    EmptySegcode { name: String },

    #[error("no grammar registered for message '{name}' version '{version}'")]
    UnknownMessageType { name: String, version: String },

    #[error("grammar '{key}' is already registered")]
    DuplicateGrammar { key: String },

    #[error("cannot decode '{value}' as {expected}: {reason}")]
    Decode {
        value: String,
        expected: &'static str,
        reason: String,
    },

    #[error("cannot encode {found} value as {expected}")]
    Encode {
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    /// Build a decode error for an offending raw value.
    pub fn decode(value: impl Into<String>, expected: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            value: value.into(),
            expected,
            reason: reason.into(),
        }
    }
}

/// Crate-local result type for grammar operations.
pub type Result<T> = std::result::Result<T, Error>;
