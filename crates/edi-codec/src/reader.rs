//! Segment-level input
//!
//! [`SegmentReader`] pulls raw segments out of a byte stream one at a time,
//! honoring the escape character and the newline policy. [`SegmentCursor`]
//! adds one-segment lookahead and boundary tags so nested parsers can stop
//! at a control segment without consuming it.

use std::cell::OnceCell;
use std::io::BufRead;

use edi_grammar::Delimiters;
use edi_ir::Position;
use tracing::{debug, trace};

use crate::{Error, Result};

/// One raw, undecoded segment
///
/// Holds the segment text without its terminator, with escape sequences
/// intact. Fields are split lazily on first access.
#[derive(Debug)]
pub struct RawSegment {
    raw: String,
    number: usize,
    line: usize,
    fields: OnceCell<Vec<String>>,
}

impl RawSegment {
    fn new(raw: String, number: usize, line: usize) -> Self {
        Self {
            raw,
            number,
            line,
            fields: OnceCell::new(),
        }
    }

    /// Segment text, terminator excluded, escapes intact
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// One-based ordinal of this segment in the stream
    pub fn number(&self) -> usize {
        self.number
    }

    /// One-based line on which this segment starts
    pub fn line(&self) -> usize {
        self.line
    }

    /// Input position of this segment
    pub fn position(&self) -> Position {
        Position::new(self.number, self.line)
    }

    /// Raw field tokens; index 0 is the segment tag
    pub fn fields(&self, delimiters: &Delimiters) -> &[String] {
        self.fields
            .get_or_init(|| delimiters.split(&self.raw, delimiters.field))
    }

    /// Segment tag
    pub fn tag(&self, delimiters: &Delimiters) -> &str {
        self.fields(delimiters).first().map_or("", String::as_str)
    }

    /// Data fields, tag excluded
    pub fn data(&self, delimiters: &Delimiters) -> &[String] {
        self.fields(delimiters).get(1..).unwrap_or(&[])
    }
}

/// Streaming segment tokenizer
///
/// Reads one segment per call, decoding UTF-8 incrementally. Empty segments
/// are skipped; a trailing unterminated segment is still produced at end of
/// input, but pure whitespace after the last terminator is not.
pub struct SegmentReader<R> {
    input: R,
    delimiters: Delimiters,
    ignore_newlines: bool,
    pushback: Vec<char>,
    line: usize,
    segment_count: usize,
    probed: bool,
}

impl<R: BufRead> SegmentReader<R> {
    /// Create a reader over `input` using `delimiters`
    pub fn new(input: R, delimiters: Delimiters) -> Self {
        Self {
            input,
            delimiters,
            ignore_newlines: false,
            pushback: Vec::new(),
            line: 1,
            segment_count: 0,
            probed: false,
        }
    }

    /// Skip newline characters appearing between segments
    #[must_use]
    pub fn ignore_newlines(mut self, ignore: bool) -> Self {
        self.ignore_newlines = ignore;
        self
    }

    /// The delimiter set currently in force
    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// Number of segments produced so far
    pub fn segments_read(&self) -> usize {
        self.segment_count
    }

    /// Position of the next unread content
    pub fn position(&self) -> Position {
        Position::new(self.segment_count + 1, self.line)
    }

    /// Probe for a UNA service string advice at the start of the stream
    ///
    /// Only the very beginning of the stream is probed; once any segment has
    /// been read the probe window is closed and this returns `Ok(None)`.
    /// When a UNA advice is found, the delimiters it declares replace the
    /// reader's set for the rest of the stream.
    pub fn detect_una(&mut self) -> Result<Option<Delimiters>> {
        if self.probed {
            return Ok(None);
        }
        self.probed = true;
        if self.ignore_newlines {
            self.skip_newlines()?;
        }
        let mut probe = ['\0'; 3];
        for i in 0..3 {
            match self.next_char()? {
                Some(c) => probe[i] = c,
                None => {
                    for c in probe[..i].iter().rev() {
                        self.unread_char(*c);
                    }
                    return Ok(None);
                }
            }
        }
        if probe != ['U', 'N', 'A'] {
            for c in probe.iter().rev() {
                self.unread_char(*c);
            }
            return Ok(None);
        }
        let mut advice = String::from("UNA");
        for _ in 0..6 {
            let Some(c) = self.next_char()? else {
                return Err(Error::malformed_control(
                    "UNA",
                    "service string advice is shorter than six characters",
                    self.position(),
                ));
            };
            advice.push(c);
        }
        let Some(delimiters) = Delimiters::from_una(&advice) else {
            return Err(Error::malformed_control(
                "UNA",
                "service string advice could not be read",
                self.position(),
            ));
        };
        delimiters.validate()?;
        debug!(advice = %advice, "UNA service string applied");
        self.delimiters = delimiters;
        Ok(Some(delimiters))
    }

    /// Read the next raw segment
    pub fn next_segment(&mut self) -> Result<Option<RawSegment>> {
        self.probed = true;
        let mut raw = String::new();
        let mut line = self.line;
        let mut released = false;
        loop {
            let at_line = self.line;
            let Some(c) = self.next_char()? else {
                if raw.chars().all(char::is_whitespace) {
                    return Ok(None);
                }
                return Ok(Some(self.emit(raw, line)));
            };
            if released {
                raw.push(c);
                released = false;
                continue;
            }
            if c == self.delimiters.escape {
                if raw.is_empty() {
                    line = at_line;
                }
                raw.push(c);
                released = true;
                continue;
            }
            if c == self.delimiters.segment {
                if raw.is_empty() {
                    continue;
                }
                return Ok(Some(self.emit(raw, line)));
            }
            if raw.is_empty() {
                if self.ignore_newlines && (c == '\n' || c == '\r') {
                    continue;
                }
                line = at_line;
            }
            raw.push(c);
        }
    }

    fn emit(&mut self, raw: String, line: usize) -> RawSegment {
        self.segment_count += 1;
        trace!(number = self.segment_count, line, "segment read");
        RawSegment::new(raw, self.segment_count, line)
    }

    fn skip_newlines(&mut self) -> Result<()> {
        loop {
            match self.next_char()? {
                Some(c) if c == '\n' || c == '\r' => {}
                Some(c) => {
                    self.unread_char(c);
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
    }

    fn next_char(&mut self) -> Result<Option<char>> {
        let c = match self.pushback.pop() {
            Some(c) => Some(c),
            None => self.decode_char()?,
        };
        if c == Some('\n') {
            self.line += 1;
        }
        Ok(c)
    }

    fn unread_char(&mut self, c: char) {
        if c == '\n' {
            self.line -= 1;
        }
        self.pushback.push(c);
    }

    fn decode_char(&mut self) -> Result<Option<char>> {
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };
        let width = match first {
            0x00..=0x7F => return Ok(Some(first as char)),
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => {
                return Err(Error::InvalidUtf8 {
                    position: self.position(),
                })
            }
        };
        let mut bytes = [first, 0, 0, 0];
        for slot in &mut bytes[1..width] {
            let Some(b) = self.read_byte()? else {
                return Err(Error::InvalidUtf8 {
                    position: self.position(),
                });
            };
            *slot = b;
        }
        match std::str::from_utf8(&bytes[..width]).ok().and_then(|s| s.chars().next()) {
            Some(c) => Ok(Some(c)),
            None => Err(Error::InvalidUtf8 {
                position: self.position(),
            }),
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let buf = self.input.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        let b = buf[0];
        self.input.consume(1);
        Ok(Some(b))
    }
}

impl<R> std::fmt::Debug for SegmentReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("delimiters", &self.delimiters)
            .field("line", &self.line)
            .field("segment_count", &self.segment_count)
            .finish_non_exhaustive()
    }
}

/// Lookahead cursor over a segment stream
///
/// Materializes at most one unconsumed segment. A boundary tag makes
/// [`SegmentCursor::peek`] and [`SegmentCursor::next_segment`] report end of
/// input when the lookahead carries that tag, without consuming it; popping
/// the boundary makes the segment visible again. Nested message parsers use
/// this to stop at their trailer and hand control back to the envelope.
#[derive(Debug)]
pub struct SegmentCursor<R> {
    reader: SegmentReader<R>,
    lookahead: Option<RawSegment>,
    boundaries: Vec<String>,
    last_number: usize,
}

impl<R: BufRead> SegmentCursor<R> {
    /// Wrap a reader
    pub fn new(reader: SegmentReader<R>) -> Self {
        Self {
            reader,
            lookahead: None,
            boundaries: Vec::new(),
            last_number: 0,
        }
    }

    /// The delimiter set currently in force
    pub fn delimiters(&self) -> Delimiters {
        self.reader.delimiters()
    }

    /// Probe for a UNA service string advice
    pub fn detect_una(&mut self) -> Result<Option<Delimiters>> {
        self.reader.detect_una()
    }

    /// Look at the next segment without consuming it
    ///
    /// Returns `None` at end of input or when the next segment carries the
    /// active boundary tag.
    pub fn peek(&mut self) -> Result<Option<&RawSegment>> {
        self.fill()?;
        if self.at_boundary() {
            return Ok(None);
        }
        Ok(self.lookahead.as_ref())
    }

    /// Tag of the next segment, if one is visible
    pub fn peek_tag(&mut self) -> Result<Option<String>> {
        let delimiters = self.reader.delimiters();
        Ok(self.peek()?.map(|seg| seg.tag(&delimiters).to_string()))
    }

    /// Consume and return the next visible segment
    pub fn next_segment(&mut self) -> Result<Option<RawSegment>> {
        self.fill()?;
        if self.at_boundary() {
            return Ok(None);
        }
        let segment = self.lookahead.take();
        if let Some(seg) = &segment {
            self.last_number = seg.number();
        }
        Ok(segment)
    }

    /// Mask segments carrying `tag` from peek and next
    pub fn push_boundary(&mut self, tag: impl Into<String>) {
        self.boundaries.push(tag.into());
    }

    /// Remove the innermost boundary tag
    pub fn pop_boundary(&mut self) -> Option<String> {
        self.boundaries.pop()
    }

    /// Ordinal of the most recently consumed segment
    pub fn last_number(&self) -> usize {
        self.last_number
    }

    /// Position of the next segment, or of the read head at end of input
    pub fn position(&self) -> Position {
        match &self.lookahead {
            Some(seg) => seg.position(),
            None => self.reader.position(),
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.lookahead.is_none() {
            self.lookahead = self.reader.next_segment()?;
        }
        Ok(())
    }

    fn at_boundary(&self) -> bool {
        let delimiters = self.reader.delimiters();
        match (&self.lookahead, self.boundaries.last()) {
            (Some(seg), Some(tag)) => seg.tag(&delimiters) == tag,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> Vec<RawSegment> {
        let mut reader = SegmentReader::new(input.as_bytes(), Delimiters::default());
        let mut out = Vec::new();
        while let Some(seg) = reader.next_segment().unwrap() {
            out.push(seg);
        }
        out
    }

    #[test]
    fn test_segments_split_on_terminator() {
        let segments = read_all("UNB+A'SEG+1'");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].raw(), "UNB+A");
        assert_eq!(segments[1].raw(), "SEG+1");
        assert_eq!(segments[0].number(), 1);
        assert_eq!(segments[1].number(), 2);
    }

    #[test]
    fn test_escaped_terminator_stays_in_segment() {
        let segments = read_all("SEG+AB?'CD'");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].raw(), "SEG+AB?'CD");
    }

    #[test]
    fn test_empty_segments_skipped() {
        let segments = read_all("A''B'''");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].raw(), "A");
        assert_eq!(segments[1].raw(), "B");
    }

    #[test]
    fn test_unterminated_final_segment_produced() {
        let segments = read_all("A'B+1");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].raw(), "B+1");
    }

    #[test]
    fn test_trailing_whitespace_not_a_segment() {
        let segments = read_all("A'\n  \n");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].raw(), "A");
    }

    #[test]
    fn test_strict_mode_keeps_newlines_as_content() {
        let segments = read_all("A'\nB'");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].raw(), "\nB");
    }

    #[test]
    fn test_ignore_newlines_skips_between_segments() {
        let mut reader =
            SegmentReader::new("A'\r\nB'\nC'".as_bytes(), Delimiters::default()).ignore_newlines(true);
        let mut raws = Vec::new();
        while let Some(seg) = reader.next_segment().unwrap() {
            raws.push(seg.raw().to_string());
        }
        assert_eq!(raws, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_newline_inside_segment_is_content() {
        let mut reader =
            SegmentReader::new("SEG+a\nb'".as_bytes(), Delimiters::default()).ignore_newlines(true);
        let seg = reader.next_segment().unwrap().unwrap();
        assert_eq!(seg.raw(), "SEG+a\nb");
    }

    #[test]
    fn test_line_numbers() {
        let mut reader =
            SegmentReader::new("A'\nB'\nC'".as_bytes(), Delimiters::default()).ignore_newlines(true);
        let a = reader.next_segment().unwrap().unwrap();
        let b = reader.next_segment().unwrap().unwrap();
        let c = reader.next_segment().unwrap().unwrap();
        assert_eq!((a.line(), b.line(), c.line()), (1, 2, 3));
    }

    #[test]
    fn test_fields_preserve_empty_tokens() {
        let delimiters = Delimiters::default();
        let segments = read_all("SEG+A++B+'");
        assert_eq!(segments[0].tag(&delimiters), "SEG");
        assert_eq!(segments[0].data(&delimiters), ["A", "", "B", ""]);
    }

    #[test]
    fn test_una_applies_custom_delimiters() {
        let input = "UNA|*.?~#UNB*A|B#";
        let mut reader = SegmentReader::new(input.as_bytes(), Delimiters::default());
        let detected = reader.detect_una().unwrap().unwrap();
        assert_eq!(detected.component, '|');
        assert_eq!(detected.field, '*');
        assert_eq!(detected.segment, '#');
        let seg = reader.next_segment().unwrap().unwrap();
        assert_eq!(seg.tag(&detected), "UNB");
        assert_eq!(seg.data(&detected), ["A|B"]);
    }

    #[test]
    fn test_una_absent_leaves_stream_intact() {
        let mut reader = SegmentReader::new("UNB+A'".as_bytes(), Delimiters::default());
        assert!(reader.detect_una().unwrap().is_none());
        let seg = reader.next_segment().unwrap().unwrap();
        assert_eq!(seg.raw(), "UNB+A");
    }

    #[test]
    fn test_una_probe_window_closes_after_first_segment() {
        let mut reader = SegmentReader::new("SEG+1'UNA:+.? '".as_bytes(), Delimiters::default());
        reader.next_segment().unwrap().unwrap();
        assert!(reader.detect_una().unwrap().is_none());
    }

    #[test]
    fn test_truncated_una_rejected() {
        let mut reader = SegmentReader::new("UNA:+.".as_bytes(), Delimiters::default());
        let err = reader.detect_una().unwrap_err();
        assert!(matches!(err, Error::MalformedControl { tag: "UNA", .. }));
    }

    #[test]
    fn test_una_with_duplicate_roles_rejected() {
        // field and component both '+'
        let mut reader = SegmentReader::new("UNA++.? '".as_bytes(), Delimiters::default());
        let err = reader.detect_una().unwrap_err();
        assert!(matches!(err, Error::Grammar(_)));
    }

    #[test]
    fn test_multibyte_content() {
        let segments = read_all("SEG+héllo+日本'");
        let delimiters = Delimiters::default();
        assert_eq!(segments[0].data(&delimiters), ["héllo", "日本"]);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let bytes: &[u8] = &[b'S', b'E', b'G', 0xFF, b'\''];
        let mut reader = SegmentReader::new(bytes, Delimiters::default());
        let err = reader.next_segment().unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_reads_from_file() {
        use std::io::Write as _;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "UNB+A'UNH+1'").unwrap();
        let file = std::fs::File::open(tmp.path()).unwrap();
        let mut reader = SegmentReader::new(std::io::BufReader::new(file), Delimiters::default());
        let mut count = 0;
        while reader.next_segment().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_cursor_peek_does_not_consume() {
        let reader = SegmentReader::new("A'B'".as_bytes(), Delimiters::default());
        let mut cursor = SegmentCursor::new(reader);
        assert_eq!(cursor.peek_tag().unwrap().as_deref(), Some("A"));
        assert_eq!(cursor.peek_tag().unwrap().as_deref(), Some("A"));
        let seg = cursor.next_segment().unwrap().unwrap();
        assert_eq!(seg.raw(), "A");
        assert_eq!(cursor.last_number(), 1);
        assert_eq!(cursor.peek_tag().unwrap().as_deref(), Some("B"));
    }

    #[test]
    fn test_cursor_boundary_masks_segment() {
        let reader = SegmentReader::new("SEG+1'UNT+2+M1'UNZ+1+X'".as_bytes(), Delimiters::default());
        let mut cursor = SegmentCursor::new(reader);
        cursor.push_boundary("UNT");
        assert_eq!(cursor.peek_tag().unwrap().as_deref(), Some("SEG"));
        cursor.next_segment().unwrap().unwrap();
        // UNT is next but masked
        assert!(cursor.peek().unwrap().is_none());
        assert!(cursor.next_segment().unwrap().is_none());
        cursor.pop_boundary();
        let unt = cursor.next_segment().unwrap().unwrap();
        assert_eq!(unt.raw(), "UNT+2+M1");
        assert_eq!(cursor.peek_tag().unwrap().as_deref(), Some("UNZ"));
    }
}
