//! # edi-codec
//!
//! Streaming codec for delimited EDI interchanges. A [`SegmentReader`]
//! tokenizes raw input into segments, a [`GrammarParser`] matches them
//! against an [`edi_grammar::Edimap`] and emits element events, and an
//! [`EdiWriter`] serializes element trees back into delimited text. The
//! [`envelopes`] and [`interchange`] modules layer UN/EDIFACT envelope
//! handling (UNA service string, UNB/UNZ, UNG/UNE, UNH/UNT) on top of the
//! message machinery.
//!
//! Parsing is pull-based and single-pass: segments are read on demand and
//! at most one unconsumed segment is held in memory for lookahead.

pub mod envelopes;
pub mod interchange;
pub mod parser;
pub mod reader;
pub mod writer;

use edi_ir::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use envelopes::{
    DateTimeStamp, ENVELOPE_NAMESPACE, GroupVersion, Identification, MessageTypeIdentifier,
    PartyId, RecipientRef, SyntaxIdentifier, TransferStatus, UnbSegment, UneSegment, UngSegment,
    UnhSegment, UntSegment, UnzSegment,
};
pub use interchange::{
    GroupEnvelope, Interchange, InterchangeMessage, NullSink, UnEdifactParser, UnEdifactWriter,
};
pub use parser::GrammarParser;
pub use reader::{RawSegment, SegmentCursor, SegmentReader};
pub use writer::EdiWriter;

/// Errors raised while reading, parsing or writing EDI streams
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying reader or writer failed
    #[error("I/O failure on the EDI stream: {0}")]
    Io(#[from] std::io::Error),

    /// Grammar lookup, validation or value decoding failed
    #[error(transparent)]
    Grammar(#[from] edi_grammar::Error),

    /// The event sink rejected the stream
    #[error(transparent)]
    Sink(#[from] edi_ir::Error),

    /// The input byte stream is not valid UTF-8
    #[error("{position}: input is not valid UTF-8")]
    InvalidUtf8 {
        /// Where decoding failed
        position: Position,
    },

    /// A mandatory grammar node has no matching input
    #[error("{position}: expected mandatory {kind} '{name}', found {found}")]
    MissingMandatory {
        /// Node kind: segment, segment group, field, component or
        /// sub-component
        kind: &'static str,
        /// Grammar identifier of the missing node
        name: String,
        /// What was present instead
        found: String,
        /// Where the mismatch was detected
        position: Position,
    },

    /// An input segment matches no position in the grammar
    #[error("{position}: segment '{tag}' does not match any grammar position")]
    UnmappedSegment {
        /// Tag of the offending segment
        tag: String,
        /// Where it was read
        position: Position,
    },

    /// A segment carries more data fields than its grammar declares
    #[error("{position}: segment '{tag}' carries {actual} data fields, grammar declares {declared}")]
    UnmappedFields {
        /// Segment code
        tag: String,
        /// Declared field count
        declared: usize,
        /// Fields present in the input
        actual: usize,
        /// Where the segment was read
        position: Position,
    },

    /// A composite value carries more parts than its grammar declares
    #[error("{position}: {container} '{name}' carries {actual} values, grammar declares {declared}")]
    UnmappedComponents {
        /// Containing node kind: field or component
        container: &'static str,
        /// Output name of the composite
        name: String,
        /// Declared part count
        declared: usize,
        /// Parts present in the input
        actual: usize,
        /// Where the composite was read
        position: Position,
    },

    /// A value failed to decode as its declared data type
    #[error("{position}: field '{name}': {source}")]
    Decode {
        /// Output name of the value node
        name: String,
        /// Where the value was read
        position: Position,
        /// The underlying decode failure
        source: edi_grammar::Error,
    },

    /// A value is outside its declared length bounds
    #[error("{position}: value of '{name}' is {actual} characters, grammar requires {bound}")]
    LengthBounds {
        /// Output name of the value node
        name: String,
        /// Observed length in characters
        actual: usize,
        /// Human-readable bound that was violated
        bound: String,
        /// Where the value was read
        position: Position,
    },

    /// A control segment is structurally broken
    #[error("{position}: malformed {tag} segment: {reason}")]
    MalformedControl {
        /// Control segment tag
        tag: &'static str,
        /// What is wrong with it
        reason: String,
        /// Where the segment was read
        position: Position,
    },

    /// A segment appeared where the envelope state machine does not allow it
    #[error("{position}: unexpected segment '{tag}' in interchange envelope")]
    UnexpectedEnvelopeSegment {
        /// Tag of the offending segment
        tag: String,
        /// Where it was read
        position: Position,
    },

    /// Input ended in the middle of an envelope
    #[error("input ended while expecting {expected}")]
    UnexpectedEof {
        /// What the parser was waiting for
        expected: &'static str,
    },

    /// Header and trailer control references disagree
    #[error("{scope} control reference mismatch: header '{header}', trailer '{trailer}'")]
    ControlReferenceMismatch {
        /// Envelope scope: message, functional group or interchange
        scope: &'static str,
        /// Reference carried by the header
        header: String,
        /// Reference carried by the trailer
        trailer: String,
    },

    /// A trailer count does not match what was actually read
    #[error("{scope} trailer declares {declared} {unit}s, found {actual}")]
    CountMismatch {
        /// Envelope scope: message, functional group or interchange
        scope: &'static str,
        /// Counted unit: segment, message or group
        unit: &'static str,
        /// Count carried by the trailer
        declared: usize,
        /// Count observed while parsing
        actual: usize,
    },

    /// A tree node does not fit the grammar during writing
    #[error("cannot write '{name}': {reason}")]
    WriteMismatch {
        /// Name of the offending node
        name: String,
        /// Why it does not fit
        reason: String,
    },
}

impl Error {
    pub(crate) fn malformed_control(
        tag: &'static str,
        reason: impl Into<String>,
        position: Position,
    ) -> Self {
        Self::MalformedControl {
            tag,
            reason: reason.into(),
            position,
        }
    }

    pub(crate) fn write_mismatch(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteMismatch {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for codec results
pub type Result<T> = std::result::Result<T, Error>;

/// Policy switches for grammar-driven parsing
///
/// The two ignore policies are independent: either, both or neither can be
/// active. Anything they suppress is recorded as a [`Diagnostic`] instead
/// of failing the parse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Skip input segments whose tag appears nowhere in the grammar
    pub ignore_unmapped_segments: bool,
    /// Treat absent mandatory nodes as present-but-empty
    pub ignore_missing_mandatory: bool,
    /// Skip newline characters between segments
    pub ignore_newlines: bool,
    /// Decode values per their declared data types and enforce length
    /// bounds while parsing
    pub validate: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ignore_unmapped_segments: false,
            ignore_missing_mandatory: false,
            ignore_newlines: false,
            validate: true,
        }
    }
}

/// Policies for whole-interchange parsing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterchangeOptions {
    /// Message-level parse policies
    pub parse: ParseOptions,
    /// Route message content into per-message trees only, keeping the
    /// shared event stream envelope-only
    pub fragment_split: bool,
}

/// A failure converted into a note by a lenient parse policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What was suppressed
    pub message: String,
    /// Tag of the input segment involved, when one exists
    pub tag: Option<String>,
    /// Where in the input
    pub position: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert!(!options.ignore_unmapped_segments);
        assert!(!options.ignore_missing_mandatory);
        assert!(!options.ignore_newlines);
        assert!(options.validate);

        let interchange = InterchangeOptions::default();
        assert!(!interchange.fragment_split);
        assert!(interchange.parse.validate);
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: ParseOptions = serde_json::from_str("{}").unwrap();
        assert!(options.validate);

        let options: ParseOptions =
            serde_json::from_str(r#"{"ignore_unmapped_segments":true,"validate":false}"#).unwrap();
        assert!(options.ignore_unmapped_segments);
        assert!(!options.validate);
    }
}
