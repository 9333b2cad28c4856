//! Grammar-driven message parsing
//!
//! A recursive-descent walk over the grammar tree, driven by one-segment
//! lookahead. Each grammar child consumes matching input up to its
//! occurrence bound; a mandatory child with no matching input fails the
//! parse unless the missing-mandatory policy converts the failure into a
//! diagnostic.

use std::collections::HashSet;
use std::io::BufRead;

use edi_grammar::{
    Component, DataType, Delimiters, Edimap, Field, GroupChild, Segment, SubComponent,
};
use edi_ir::{EventSink, Position};
use tracing::{debug, trace};

use crate::reader::{RawSegment, SegmentCursor, SegmentReader};
use crate::{Diagnostic, Error, ParseOptions, Result};

/// Maps one tokenized segment onto element events
///
/// Shared between [`GrammarParser`] and the envelope parser, which maps
/// control segments against fixed definitions.
#[derive(Debug)]
pub(crate) struct SegmentMapper {
    pub(crate) delimiters: Delimiters,
    pub(crate) options: ParseOptions,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl SegmentMapper {
    pub(crate) fn new(delimiters: Delimiters, options: ParseOptions) -> Self {
        Self {
            delimiters,
            options,
            diagnostics: Vec::new(),
        }
    }

    /// Map a segment with no nested children: open, fields, close
    pub(crate) fn map_segment(
        &mut self,
        def: &Segment,
        raw: &RawSegment,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        sink.start_node(&def.output_name, def.namespace.as_deref())?;
        self.map_fields(def, raw, sink)?;
        sink.end_node(&def.output_name)?;
        Ok(())
    }

    /// Map the data fields of `raw` against `def`, emitting value events
    pub(crate) fn map_fields(
        &mut self,
        def: &Segment,
        raw: &RawSegment,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let position = raw.position();
        let data = raw.data(&self.delimiters);
        let present = occupied(data);
        if present > def.fields.len() && !def.ignore_unmapped_fields {
            return Err(Error::UnmappedFields {
                tag: def.segcode.clone(),
                declared: def.fields.len(),
                actual: present,
                position,
            });
        }
        for (index, field) in def.fields.iter().enumerate() {
            match data.get(index) {
                Some(token) => self.map_field(field, token, position, sink)?,
                None if field.required => {
                    self.missing(
                        "field",
                        &field.output_name,
                        &field.output_name,
                        field.namespace.as_deref(),
                        "nothing",
                        position,
                        sink,
                    )?;
                }
                None => {}
            }
        }
        Ok(())
    }

    fn map_field(
        &mut self,
        def: &Field,
        token: &str,
        position: Position,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        if !def.is_composite() {
            return self.map_value(&ValueDef::from_field(def), token, position, sink);
        }
        if token.is_empty() {
            if def.required {
                return self.missing(
                    "field",
                    &def.output_name,
                    &def.output_name,
                    def.namespace.as_deref(),
                    "empty value",
                    position,
                    sink,
                );
            }
            return Ok(());
        }
        let parts = self.delimiters.split(token, self.delimiters.component);
        self.check_width("field", &def.output_name, def.components.len(), &parts, position)?;
        sink.start_node(&def.output_name, def.namespace.as_deref())?;
        for (index, component) in def.components.iter().enumerate() {
            match parts.get(index) {
                Some(part) => self.map_component(component, part, position, sink)?,
                None if component.required => {
                    self.missing(
                        "component",
                        &component.output_name,
                        &component.output_name,
                        component.namespace.as_deref(),
                        "nothing",
                        position,
                        sink,
                    )?;
                }
                None => {}
            }
        }
        sink.end_node(&def.output_name)?;
        Ok(())
    }

    fn map_component(
        &mut self,
        def: &Component,
        token: &str,
        position: Position,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        if !def.is_composite() {
            return self.map_value(&ValueDef::from_component(def), token, position, sink);
        }
        if token.is_empty() {
            if def.required {
                return self.missing(
                    "component",
                    &def.output_name,
                    &def.output_name,
                    def.namespace.as_deref(),
                    "empty value",
                    position,
                    sink,
                );
            }
            return Ok(());
        }
        let parts = self.delimiters.split(token, self.delimiters.sub_component);
        self.check_width(
            "component",
            &def.output_name,
            def.sub_components.len(),
            &parts,
            position,
        )?;
        sink.start_node(&def.output_name, def.namespace.as_deref())?;
        for (index, sub) in def.sub_components.iter().enumerate() {
            match parts.get(index) {
                Some(part) => self.map_value(&ValueDef::from_sub(sub), part, position, sink)?,
                None if sub.required => {
                    self.missing(
                        "sub-component",
                        &sub.output_name,
                        &sub.output_name,
                        sub.namespace.as_deref(),
                        "nothing",
                        position,
                        sink,
                    )?;
                }
                None => {}
            }
        }
        sink.end_node(&def.output_name)?;
        Ok(())
    }

    fn map_value(
        &mut self,
        def: &ValueDef<'_>,
        token: &str,
        position: Position,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let text = self.delimiters.unescape(token);
        if text.is_empty() {
            if def.required {
                return self.missing(
                    def.kind,
                    def.name,
                    def.name,
                    def.namespace,
                    "empty value",
                    position,
                    sink,
                );
            }
            return Ok(());
        }
        let text = if self.options.validate {
            self.check_value(def, &text, position)?
        } else {
            text
        };
        sink.start_node(def.name, def.namespace)?;
        sink.text(&text)?;
        sink.end_node(def.name)?;
        Ok(())
    }

    /// Validate `text` against `def` and return its canonical form
    ///
    /// Typed values are normalized: decimals to '.' notation, integers
    /// stripped of leading zeros. Length bounds apply to the input form.
    fn check_value(&self, def: &ValueDef<'_>, text: &str, position: Position) -> Result<String> {
        let length = text.chars().count();
        if let Some(min) = def.min_length {
            if length < min {
                return Err(Error::LengthBounds {
                    name: def.name.to_string(),
                    actual: length,
                    bound: format!("at least {min}"),
                    position,
                });
            }
        }
        if let Some(max) = def.max_length {
            if length > max {
                return Err(Error::LengthBounds {
                    name: def.name.to_string(),
                    actual: length,
                    bound: format!("at most {max}"),
                    position,
                });
            }
        }
        let value = def
            .data_type
            .decode(text, &self.delimiters)
            .map_err(|source| Error::Decode {
                name: def.name.to_string(),
                position,
                source,
            })?;
        def.data_type
            .encode(&value, &Delimiters::default())
            .map_err(|source| Error::Decode {
                name: def.name.to_string(),
                position,
                source,
            })
    }

    fn check_width(
        &self,
        container: &'static str,
        name: &str,
        declared: usize,
        parts: &[String],
        position: Position,
    ) -> Result<()> {
        let actual = occupied(parts);
        if actual > declared {
            return Err(Error::UnmappedComponents {
                container,
                name: name.to_string(),
                declared,
                actual,
                position,
            });
        }
        Ok(())
    }

    /// Apply the missing-mandatory policy: an empty element plus a
    /// diagnostic, or a hard failure
    pub(crate) fn missing(
        &mut self,
        kind: &'static str,
        grammar_name: &str,
        element: &str,
        namespace: Option<&str>,
        found: &str,
        position: Position,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        if self.options.ignore_missing_mandatory {
            trace!(kind, name = grammar_name, "missing mandatory node tolerated");
            self.diagnostics.push(Diagnostic {
                message: format!("missing mandatory {kind} '{grammar_name}' treated as empty"),
                tag: None,
                position,
            });
            sink.start_node(element, namespace)?;
            sink.end_node(element)?;
            return Ok(());
        }
        Err(Error::MissingMandatory {
            kind,
            name: grammar_name.to_string(),
            found: found.to_string(),
            position,
        })
    }
}

/// Positions up to the last non-empty token
///
/// Trailing empty tokens are not unmapped content; a non-truncatable writer
/// pads with them.
fn occupied(tokens: &[String]) -> usize {
    tokens.iter().rposition(|t| !t.is_empty()).map_or(0, |i| i + 1)
}

struct ValueDef<'g> {
    kind: &'static str,
    name: &'g str,
    namespace: Option<&'g str>,
    data_type: &'g DataType,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl<'g> ValueDef<'g> {
    fn from_field(def: &'g Field) -> Self {
        Self {
            kind: "field",
            name: &def.output_name,
            namespace: def.namespace.as_deref(),
            data_type: &def.data_type,
            required: def.required,
            min_length: def.min_length,
            max_length: def.max_length,
        }
    }

    fn from_component(def: &'g Component) -> Self {
        Self {
            kind: "component",
            name: &def.output_name,
            namespace: def.namespace.as_deref(),
            data_type: &def.data_type,
            required: def.required,
            min_length: def.min_length,
            max_length: def.max_length,
        }
    }

    fn from_sub(def: &'g SubComponent) -> Self {
        Self {
            kind: "sub-component",
            name: &def.output_name,
            namespace: def.namespace.as_deref(),
            data_type: &def.data_type,
            required: def.required,
            min_length: def.min_length,
            max_length: def.max_length,
        }
    }
}

/// Recursive-descent parser matching segments against a mapping grammar
#[derive(Debug)]
pub struct GrammarParser<'g> {
    edimap: &'g Edimap,
    mapper: SegmentMapper,
    known_codes: HashSet<String>,
}

impl<'g> GrammarParser<'g> {
    /// Create a parser for `edimap` using its declared delimiters
    pub fn new(edimap: &'g Edimap) -> Self {
        Self {
            edimap,
            mapper: SegmentMapper::new(edimap.delimiters, ParseOptions::default()),
            known_codes: edimap.segment_codes(),
        }
    }

    /// Replace the parse policies
    #[must_use]
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.mapper.options = options;
        self
    }

    /// Override the grammar's declared delimiters
    ///
    /// The envelope parser uses this when a UNA service string redefines
    /// the delimiters for a whole interchange.
    #[must_use]
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.mapper.delimiters = delimiters;
        self
    }

    /// Parse a standalone message body from `input`
    ///
    /// Returns the diagnostics recorded by lenient policies.
    pub fn parse<R: BufRead>(
        &mut self,
        input: R,
        sink: &mut dyn EventSink,
    ) -> Result<Vec<Diagnostic>> {
        let reader = SegmentReader::new(input, self.mapper.delimiters)
            .ignore_newlines(self.mapper.options.ignore_newlines);
        let mut cursor = SegmentCursor::new(reader);
        self.parse_cursor(&mut cursor, sink)?;
        Ok(self.take_diagnostics())
    }

    /// Parse one message at the cursor position
    ///
    /// Stops at end of input or at the cursor's boundary tag. Input left
    /// over after the root group completes fails the parse unless the
    /// unmapped-segments policy skips it.
    pub fn parse_cursor<R: BufRead>(
        &mut self,
        cursor: &mut SegmentCursor<R>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let root = &self.edimap.segments;
        debug!(
            name = %self.edimap.description.name,
            version = %self.edimap.description.version,
            "parsing message"
        );
        sink.start_node(&root.output_name, root.namespace.as_deref())?;
        self.parse_children(&root.children, cursor, sink)?;
        if let Some(tag) = self.peek_mapped_tag(cursor)? {
            return Err(Error::UnmappedSegment {
                tag,
                position: cursor.position(),
            });
        }
        sink.end_node(&root.output_name)?;
        Ok(())
    }

    /// Diagnostics recorded so far, draining the buffer
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.mapper.diagnostics)
    }

    fn parse_children<R: BufRead>(
        &mut self,
        children: &[GroupChild],
        cursor: &mut SegmentCursor<R>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        for child in children {
            let mut count = 0usize;
            while child.max_occurs().allows(count) {
                let Some(tag) = self.peek_mapped_tag(cursor)? else {
                    break;
                };
                if !child.matches_tag(&tag) {
                    break;
                }
                match child {
                    GroupChild::Segment(segment) => {
                        let Some(raw) = cursor.next_segment()? else {
                            break;
                        };
                        self.map_segment(segment, &raw, cursor, sink)?;
                    }
                    GroupChild::Group(group) => {
                        let before = cursor.last_number();
                        trace!(group = %group.output_name, "entering group");
                        sink.start_node(&group.output_name, group.namespace.as_deref())?;
                        self.parse_children(&group.children, cursor, sink)?;
                        sink.end_node(&group.output_name)?;
                        if cursor.last_number() == before {
                            // zero-progress guard for degenerate grammars
                            break;
                        }
                    }
                }
                count += 1;
            }
            if count < child.min_occurs() {
                let kind = match child {
                    GroupChild::Segment(_) => "segment",
                    GroupChild::Group(_) => "segment group",
                };
                let found = self
                    .peek_mapped_tag(cursor)?
                    .map_or_else(|| "end of input".to_string(), |t| format!("'{t}'"));
                let position = cursor.position();
                self.mapper.missing(
                    kind,
                    child.grammar_name(),
                    child.output_name(),
                    child.namespace(),
                    &found,
                    position,
                    sink,
                )?;
            }
        }
        Ok(())
    }

    fn map_segment<R: BufRead>(
        &mut self,
        def: &Segment,
        raw: &RawSegment,
        cursor: &mut SegmentCursor<R>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        trace!(tag = %def.segcode, number = raw.number(), "mapping segment");
        sink.start_node(&def.output_name, def.namespace.as_deref())?;
        self.mapper.map_fields(def, raw, sink)?;
        if !def.children.is_empty() {
            self.parse_children(&def.children, cursor, sink)?;
        }
        sink.end_node(&def.output_name)?;
        Ok(())
    }

    /// Tag of the next segment the grammar could consume
    ///
    /// Skips unknown segments when the unmapped policy allows, recording a
    /// diagnostic per skip.
    fn peek_mapped_tag<R: BufRead>(
        &mut self,
        cursor: &mut SegmentCursor<R>,
    ) -> Result<Option<String>> {
        loop {
            let Some(tag) = cursor.peek_tag()? else {
                return Ok(None);
            };
            if self.mapper.options.ignore_unmapped_segments && !self.known_codes.contains(&tag) {
                let position = cursor.position();
                trace!(%tag, "skipping unmapped segment");
                self.mapper.diagnostics.push(Diagnostic {
                    message: format!("skipped unmapped segment '{tag}'"),
                    tag: Some(tag),
                    position,
                });
                cursor.next_segment()?;
                continue;
            }
            return Ok(Some(tag));
        }
    }
}
