//! UN/EDIFACT interchange parsing and writing
//!
//! The envelope layer drives a segment cursor through UNB..UNZ, resolving
//! each UNH against a grammar registry and handing the message body to the
//! grammar-driven parser. Writing renders the same structures back to
//! delimited text with trailer counts recomputed from the content.

use std::io::{BufRead, Write};
use std::sync::Arc;

use edi_grammar::{Delimiters, Edimap, GrammarRegistry};
use edi_ir::{EventSink, Node, TreeBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::envelopes::{
    ENVELOPE_NAMESPACE, UNB_DEF, UNE_DEF, UNG_DEF, UNH_DEF, UNT_DEF, UNZ_DEF, UnbSegment,
    UneSegment, UngSegment, UnhSegment, UntSegment, UnzSegment, parse_unb, parse_une, parse_ung,
    parse_unh, parse_unt, parse_unz, render_unb, render_une, render_ung, render_unh, render_unt,
    render_unz,
};
use crate::parser::{GrammarParser, SegmentMapper};
use crate::reader::{SegmentCursor, SegmentReader};
use crate::writer::EdiWriter;
use crate::{Diagnostic, Error, InterchangeOptions, Result};

/// Root element opened for every interchange event stream
pub const INTERCHANGE_ELEMENT: &str = "unEdifact";
/// Element wrapping each functional group
pub const GROUP_ELEMENT: &str = "functionalGroup";
/// Element wrapping each message, envelope and body alike
pub const MESSAGE_ELEMENT: &str = "interchangeMessage";

/// One message with its envelope and materialized body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeMessage {
    /// UNH header
    pub header: UnhSegment,
    /// Message body tree, rooted at the grammar's root output name
    pub body: Node,
    /// UNT trailer as read from the input
    pub trailer: UntSegment,
    /// Index into [`Interchange::groups`] when the message arrived inside
    /// a functional group
    pub group: Option<usize>,
}

/// A functional group envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEnvelope {
    /// UNG header
    pub header: UngSegment,
    /// UNE trailer as read from the input
    pub trailer: UneSegment,
}

/// A fully parsed interchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interchange {
    /// Delimiters in force, from UNA or the syntax defaults
    pub delimiters: Delimiters,
    /// True when the input opened with a UNA service string advice
    pub una_present: bool,
    /// UNB header
    pub header: UnbSegment,
    /// Functional group envelopes, in arrival order
    pub groups: Vec<GroupEnvelope>,
    /// Messages in arrival order, grouped and ungrouped alike
    pub messages: Vec<InterchangeMessage>,
    /// UNZ trailer as read from the input
    pub trailer: UnzSegment,
    /// Diagnostics recorded by lenient parse policies
    pub diagnostics: Vec<Diagnostic>,
}

/// Sink that drops every event
///
/// [`UnEdifactParser::parse`] uses it when the caller only wants the
/// materialized interchange.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn start_node(&mut self, _name: &str, _namespace: Option<&str>) -> edi_ir::Result<()> {
        Ok(())
    }

    fn text(&mut self, _value: &str) -> edi_ir::Result<()> {
        Ok(())
    }

    fn end_node(&mut self, _name: &str) -> edi_ir::Result<()> {
        Ok(())
    }
}

/// Duplicates message body events into the per-message tree and the
/// caller's sink
struct TeeSink<'a> {
    builder: &'a mut TreeBuilder,
    outer: &'a mut dyn EventSink,
}

impl EventSink for TeeSink<'_> {
    fn start_node(&mut self, name: &str, namespace: Option<&str>) -> edi_ir::Result<()> {
        self.builder.start_node(name, namespace)?;
        self.outer.start_node(name, namespace)
    }

    fn text(&mut self, value: &str) -> edi_ir::Result<()> {
        self.builder.text(value)?;
        self.outer.text(value)
    }

    fn end_node(&mut self, name: &str) -> edi_ir::Result<()> {
        self.builder.end_node(name)?;
        self.outer.end_node(name)
    }
}

/// Streaming UN/EDIFACT interchange parser
///
/// Reads one interchange per call: optional UNA, a UNB header, messages
/// either loose or inside UNG functional groups, and the UNZ trailer. Each
/// UNH is resolved against the registry by message type and version key,
/// and the body between UNH and UNT is parsed with that grammar.
///
/// Control references and trailer counts are checked and fail the parse on
/// mismatch regardless of the configured policies.
#[derive(Debug)]
pub struct UnEdifactParser {
    registry: Arc<GrammarRegistry>,
    options: InterchangeOptions,
}

impl UnEdifactParser {
    /// Create a parser resolving message grammars from `registry`
    pub fn new(registry: Arc<GrammarRegistry>) -> Self {
        Self {
            registry,
            options: InterchangeOptions::default(),
        }
    }

    /// Replace the interchange options
    #[must_use]
    pub fn with_options(mut self, options: InterchangeOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse an interchange, materializing every message body
    pub fn parse<R: BufRead>(&self, input: R) -> Result<Interchange> {
        self.parse_into(input, &mut NullSink)
    }

    /// Parse an interchange, forwarding events to `sink`
    ///
    /// The sink receives one `unEdifact` document: envelope segments as
    /// elements in the envelope namespace, each message wrapped in an
    /// `interchangeMessage` element, each group in a `functionalGroup`.
    /// Message bodies are materialized into the returned interchange as
    /// well; with `fragment_split` they go only there and the sink stays
    /// envelope-only.
    pub fn parse_into<R: BufRead>(
        &self,
        input: R,
        sink: &mut dyn EventSink,
    ) -> Result<Interchange> {
        let reader = SegmentReader::new(input, Delimiters::default())
            .ignore_newlines(self.options.parse.ignore_newlines);
        let mut cursor = SegmentCursor::new(reader);
        let una_present = cursor.detect_una()?.is_some();
        let delimiters = cursor.delimiters();
        let mut mapper = SegmentMapper::new(delimiters, self.options.parse);
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        let raw = cursor
            .next_segment()?
            .ok_or(Error::UnexpectedEof { expected: "UNB" })?;
        if raw.tag(&delimiters) != "UNB" {
            return Err(Error::UnexpectedEnvelopeSegment {
                tag: raw.tag(&delimiters).to_string(),
                position: raw.position(),
            });
        }
        let header = parse_unb(&raw, &delimiters)?;
        debug!(control_ref = %header.control_ref, "interchange opened");
        sink.start_node(INTERCHANGE_ELEMENT, Some(ENVELOPE_NAMESPACE))?;
        mapper.map_segment(&UNB_DEF, &raw, sink)?;

        let mut groups: Vec<GroupEnvelope> = Vec::new();
        let mut messages: Vec<InterchangeMessage> = Vec::new();
        let mut open_group: Option<(UngSegment, usize)> = None;

        let trailer = loop {
            let Some(raw) = cursor.next_segment()? else {
                return Err(Error::UnexpectedEof {
                    expected: if open_group.is_some() { "UNE" } else { "UNZ" },
                });
            };
            let tag = raw.tag(&delimiters).to_string();
            match tag.as_str() {
                "UNH" => {
                    let unh = parse_unh(&raw, &delimiters)?;
                    let edimap = self
                        .registry
                        .resolve(&unh.message_type.id, &unh.message_type.version_key())?;
                    debug!(
                        message_ref = %unh.message_ref,
                        message_type = %unh.message_type.id,
                        "message opened"
                    );
                    sink.start_node(MESSAGE_ELEMENT, Some(ENVELOPE_NAMESPACE))?;
                    mapper.map_segment(&UNH_DEF, &raw, sink)?;

                    let unh_number = raw.number();
                    let mut builder = TreeBuilder::new();
                    cursor.push_boundary("UNT");
                    let parsed =
                        self.parse_body(&edimap, delimiters, &mut cursor, &mut builder, sink);
                    cursor.pop_boundary();
                    diagnostics.extend(parsed?);
                    let body = builder.into_root()?;

                    let raw_unt = cursor
                        .next_segment()?
                        .ok_or(Error::UnexpectedEof { expected: "UNT" })?;
                    let unt = parse_unt(&raw_unt, &delimiters)?;
                    if unt.message_ref != unh.message_ref {
                        return Err(Error::ControlReferenceMismatch {
                            scope: "message",
                            header: unh.message_ref,
                            trailer: unt.message_ref,
                        });
                    }
                    let actual = raw_unt.number() - unh_number + 1;
                    if unt.segment_count != actual {
                        return Err(Error::CountMismatch {
                            scope: "message",
                            unit: "segment",
                            declared: unt.segment_count,
                            actual,
                        });
                    }
                    mapper.map_segment(&UNT_DEF, &raw_unt, sink)?;
                    sink.end_node(MESSAGE_ELEMENT)?;

                    let group = open_group.as_mut().map(|(_, count)| {
                        *count += 1;
                        groups.len()
                    });
                    messages.push(InterchangeMessage {
                        header: unh,
                        body,
                        trailer: unt,
                        group,
                    });
                }
                "UNG" => {
                    if open_group.is_some() {
                        return Err(Error::UnexpectedEnvelopeSegment {
                            tag,
                            position: raw.position(),
                        });
                    }
                    let ung = parse_ung(&raw, &delimiters)?;
                    trace!(group_ref = %ung.group_ref, "functional group opened");
                    sink.start_node(GROUP_ELEMENT, Some(ENVELOPE_NAMESPACE))?;
                    mapper.map_segment(&UNG_DEF, &raw, sink)?;
                    open_group = Some((ung, 0));
                }
                "UNE" => {
                    let Some((ung, count)) = open_group.take() else {
                        return Err(Error::UnexpectedEnvelopeSegment {
                            tag,
                            position: raw.position(),
                        });
                    };
                    let une = parse_une(&raw, &delimiters)?;
                    if une.group_ref != ung.group_ref {
                        return Err(Error::ControlReferenceMismatch {
                            scope: "functional group",
                            header: ung.group_ref,
                            trailer: une.group_ref,
                        });
                    }
                    if une.message_count != count {
                        return Err(Error::CountMismatch {
                            scope: "functional group",
                            unit: "message",
                            declared: une.message_count,
                            actual: count,
                        });
                    }
                    mapper.map_segment(&UNE_DEF, &raw, sink)?;
                    sink.end_node(GROUP_ELEMENT)?;
                    groups.push(GroupEnvelope {
                        header: ung,
                        trailer: une,
                    });
                }
                "UNZ" => {
                    if open_group.is_some() {
                        return Err(Error::UnexpectedEnvelopeSegment {
                            tag,
                            position: raw.position(),
                        });
                    }
                    let unz = parse_unz(&raw, &delimiters)?;
                    mapper.map_segment(&UNZ_DEF, &raw, sink)?;
                    break unz;
                }
                _ => {
                    return Err(Error::UnexpectedEnvelopeSegment {
                        tag,
                        position: raw.position(),
                    });
                }
            }
        };

        if trailer.control_ref != header.control_ref {
            return Err(Error::ControlReferenceMismatch {
                scope: "interchange",
                header: header.control_ref,
                trailer: trailer.control_ref,
            });
        }
        let (unit, actual) = if groups.is_empty() {
            ("message", messages.len())
        } else {
            ("functional group", groups.len())
        };
        if trailer.control_count != actual {
            return Err(Error::CountMismatch {
                scope: "interchange",
                unit,
                declared: trailer.control_count,
                actual,
            });
        }
        if let Some(extra) = cursor.next_segment()? {
            return Err(Error::UnexpectedEnvelopeSegment {
                tag: extra.tag(&delimiters).to_string(),
                position: extra.position(),
            });
        }
        sink.end_node(INTERCHANGE_ELEMENT)?;
        diagnostics.append(&mut mapper.diagnostics);
        debug!(
            messages = messages.len(),
            groups = groups.len(),
            "interchange closed"
        );
        Ok(Interchange {
            delimiters,
            una_present,
            header,
            groups,
            messages,
            trailer,
            diagnostics,
        })
    }

    fn parse_body<R: BufRead>(
        &self,
        edimap: &Edimap,
        delimiters: Delimiters,
        cursor: &mut SegmentCursor<R>,
        builder: &mut TreeBuilder,
        outer: &mut dyn EventSink,
    ) -> Result<Vec<Diagnostic>> {
        let mut parser = GrammarParser::new(edimap)
            .with_delimiters(delimiters)
            .with_options(self.options.parse);
        if self.options.fragment_split {
            parser.parse_cursor(cursor, builder)?;
        } else {
            let mut tee = TeeSink { builder, outer };
            parser.parse_cursor(cursor, &mut tee)?;
        }
        Ok(parser.take_diagnostics())
    }
}

/// Writer for whole interchanges
///
/// Envelope segments are rendered from their typed forms, message bodies
/// grammar-driven from their trees. Trailer counts are recomputed from the
/// content actually written and control references are echoed from the
/// headers, so a modified interchange always leaves with consistent
/// envelopes.
#[derive(Debug)]
pub struct UnEdifactWriter {
    registry: Arc<GrammarRegistry>,
}

impl UnEdifactWriter {
    /// Create a writer resolving message grammars from `registry`
    pub fn new(registry: Arc<GrammarRegistry>) -> Self {
        Self { registry }
    }

    /// Render `interchange` to `out`
    ///
    /// A UNA service string advice is emitted first when the delimiters
    /// differ from the syntax defaults.
    pub fn write<W: Write>(&self, interchange: &Interchange, out: &mut W) -> Result<()> {
        let delimiters = interchange.delimiters;
        delimiters.validate()?;
        if delimiters != Delimiters::default() {
            out.write_all(delimiters.to_una().as_bytes())?;
        }
        out.write_all(render_unb(&interchange.header, &delimiters).as_bytes())?;

        if interchange.groups.is_empty() {
            for message in &interchange.messages {
                if message.group.is_some() {
                    return Err(Error::write_mismatch(
                        MESSAGE_ELEMENT,
                        "message references a functional group that is not present",
                    ));
                }
                self.write_message(message, &delimiters, out)?;
            }
        } else {
            for message in &interchange.messages {
                match message.group {
                    Some(index) if index < interchange.groups.len() => {}
                    Some(_) => {
                        return Err(Error::write_mismatch(
                            MESSAGE_ELEMENT,
                            "message references a functional group that is not present",
                        ));
                    }
                    None => {
                        return Err(Error::write_mismatch(
                            INTERCHANGE_ELEMENT,
                            "grouped interchanges require every message to belong to a group",
                        ));
                    }
                }
            }
            for (index, group) in interchange.groups.iter().enumerate() {
                out.write_all(render_ung(&group.header, &delimiters).as_bytes())?;
                let mut count = 0usize;
                for message in interchange
                    .messages
                    .iter()
                    .filter(|m| m.group == Some(index))
                {
                    self.write_message(message, &delimiters, out)?;
                    count += 1;
                }
                let une = UneSegment {
                    message_count: count,
                    group_ref: group.header.group_ref.clone(),
                };
                out.write_all(render_une(&une, &delimiters).as_bytes())?;
            }
        }

        let control_count = if interchange.groups.is_empty() {
            interchange.messages.len()
        } else {
            interchange.groups.len()
        };
        let unz = UnzSegment {
            control_count,
            control_ref: interchange.header.control_ref.clone(),
        };
        out.write_all(render_unz(&unz, &delimiters).as_bytes())?;
        trace!(
            messages = interchange.messages.len(),
            groups = interchange.groups.len(),
            "interchange written"
        );
        Ok(())
    }

    /// Render `interchange` into a string
    pub fn write_to_string(&self, interchange: &Interchange) -> Result<String> {
        let mut out = Vec::new();
        self.write(interchange, &mut out)?;
        String::from_utf8(out)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    }

    fn write_message<W: Write>(
        &self,
        message: &InterchangeMessage,
        delimiters: &Delimiters,
        out: &mut W,
    ) -> Result<()> {
        let edimap = self.registry.resolve(
            &message.header.message_type.id,
            &message.header.message_type.version_key(),
        )?;
        out.write_all(render_unh(&message.header, delimiters).as_bytes())?;
        let body_segments = EdiWriter::new(&edimap)
            .with_delimiters(*delimiters)
            .write(&message.body, out)?;
        let unt = UntSegment {
            segment_count: body_segments + 2,
            message_ref: message.header.message_ref.clone(),
        };
        out.write_all(render_unt(&unt, delimiters).as_bytes())?;
        Ok(())
    }
}
