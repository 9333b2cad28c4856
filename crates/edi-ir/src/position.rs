//! Source positions for parse output and errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a raw segment in the input
///
/// Segment numbers are 1-based and count segments from the start of the
/// input; line numbers are 1-based physical lines, tracked even when
/// newlines between segments are being ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 1-based segment number
    pub segment: usize,

    /// 1-based line number where the segment starts
    pub line: usize,
}

impl Position {
    /// Create a position
    pub fn new(segment: usize, line: usize) -> Self {
        Self { segment, line }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {} (line {})", self.segment, self.line)
    }
}
