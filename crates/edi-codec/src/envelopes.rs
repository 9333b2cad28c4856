//! UN/EDIFACT envelope segments (UNB/UNZ, UNG/UNE, UNH/UNT)
//!
//! Typed views of the control segments, the fixed grammar definitions used
//! to map them onto element events, and the renderers that turn them back
//! into delimited text. Control segments are never grammar registered:
//! their shape comes from the syntax itself, not from a message grammar.

use std::sync::LazyLock;

use edi_grammar::{Component, DataType, Delimiters, Field, Segment};
use edi_ir::Position;
use serde::{Deserialize, Serialize};

use crate::reader::RawSegment;
use crate::writer::join_tokens;
use crate::{Error, Result};

/// Namespace carried by every envelope element event
pub const ENVELOPE_NAMESPACE: &str = "urn:edi:unedifact:envelope";

// ============================================================================
// Typed control segments
// ============================================================================

/// Syntax identifier composite from UNB (S001)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIdentifier {
    /// Controlling agency and level (e.g., "UNOA", "UNOC")
    pub identifier: String,
    /// Syntax version number (e.g., "3", "4")
    pub version: String,
    /// Service code list directory version (optional)
    pub service_code_list: Option<String>,
    /// Coded character encoding (optional)
    pub encoding: Option<String>,
}

impl Default for SyntaxIdentifier {
    fn default() -> Self {
        Self {
            identifier: "UNOA".to_string(),
            version: "3".to_string(),
            service_code_list: None,
            encoding: None,
        }
    }
}

/// Party identification composite (S002/S003 in UNB, S006/S007 in UNG)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartyId {
    /// Party identification (e.g., "SENDER001")
    pub id: String,
    /// Code qualifier (e.g., "14" for EAN International)
    pub qualifier: Option<String>,
    /// Routing address internal to the party (optional)
    pub internal_id: Option<String>,
    /// Sub-level routing address (optional)
    pub internal_qualifier: Option<String>,
}

/// Date and time of preparation composite (S004)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateTimeStamp {
    /// Date in YYMMDD or CCYYMMDD form
    pub date: String,
    /// Time in HHMM form
    pub time: String,
}

/// Recipient reference composite from UNB (S005)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRef {
    /// Reference or password to the recipient's system
    pub reference: String,
    /// Reference qualifier (optional)
    pub qualifier: Option<String>,
}

/// UNB, the interchange header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbSegment {
    /// Syntax identifier composite
    pub syntax_identifier: SyntaxIdentifier,
    /// Interchange sender
    pub sender: PartyId,
    /// Interchange recipient
    pub recipient: PartyId,
    /// Date and time of preparation
    pub datetime: DateTimeStamp,
    /// Interchange control reference, echoed by UNZ
    pub control_ref: String,
    /// Recipient reference or password (optional)
    pub recipient_ref: Option<RecipientRef>,
    /// Application reference (optional)
    pub application_ref: Option<String>,
    /// Processing priority code (optional, e.g., "A")
    pub priority: Option<String>,
    /// Acknowledgement request (optional, "1" = requested)
    pub ack_request: Option<String>,
    /// Communications agreement id (optional)
    pub agreement_id: Option<String>,
    /// Test indicator (optional, "1" = test interchange)
    pub test_indicator: Option<String>,
}

/// UNZ, the interchange trailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnzSegment {
    /// Count of messages, or of functional groups when groups are present
    pub control_count: usize,
    /// Interchange control reference, must match UNB
    pub control_ref: String,
}

/// Message type identifier composite from UNH (S009)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTypeIdentifier {
    /// Message type (e.g., "ORDERS", "INVOIC")
    pub id: String,
    /// Message version number (e.g., "D")
    pub version: String,
    /// Message release number (e.g., "96A", "03B")
    pub release: String,
    /// Controlling agency (optional, e.g., "UN")
    pub agency: Option<String>,
    /// Association assigned code (optional)
    pub association_code: Option<String>,
    /// Code list directory version number (optional)
    pub code_list_version: Option<String>,
    /// Message type sub-function identification (optional)
    pub sub_function_id: Option<String>,
}

impl MessageTypeIdentifier {
    /// Version key used for grammar registry lookups
    pub fn version_key(&self) -> String {
        format!("{}:{}", self.version, self.release)
    }
}

impl Default for MessageTypeIdentifier {
    fn default() -> Self {
        Self {
            id: "ORDERS".to_string(),
            version: "D".to_string(),
            release: "96A".to_string(),
            agency: Some("UN".to_string()),
            association_code: None,
            code_list_version: None,
            sub_function_id: None,
        }
    }
}

/// Status of the transfer composite from UNH (S010)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    /// Sequence number of this transfer within the set
    pub sequence: String,
    /// First/last indicator ("F", "L", or absent mid-sequence)
    pub first_and_last: Option<String>,
}

/// Identification composite from UNH (S016/S017/S018)
///
/// Shared by the subset, implementation guideline and scenario fields; all
/// three carry an identifier qualified by version, release and agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    /// Identifier
    pub id: String,
    /// Version number (optional)
    pub version: Option<String>,
    /// Release number (optional)
    pub release: Option<String>,
    /// Controlling agency (optional)
    pub agency: Option<String>,
}

/// UNH, the message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhSegment {
    /// Message reference number, echoed by UNT
    pub message_ref: String,
    /// Message type identifier, drives grammar resolution
    pub message_type: MessageTypeIdentifier,
    /// Common access reference (optional)
    pub common_access_ref: Option<String>,
    /// Status of the transfer for split messages (optional)
    pub status_of_transfer: Option<TransferStatus>,
    /// Message subset identification (optional)
    pub subset: Option<Identification>,
    /// Implementation guideline identification (optional)
    pub implementation_guideline: Option<Identification>,
    /// Scenario identification (optional)
    pub scenario: Option<Identification>,
}

/// UNT, the message trailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntSegment {
    /// Number of segments in the message, UNH and UNT included
    pub segment_count: usize,
    /// Message reference number, must match UNH
    pub message_ref: String,
}

/// Message version composite from UNG (S008)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersion {
    /// Message version number
    pub version: String,
    /// Message release number
    pub release: String,
    /// Association assigned code (optional)
    pub association_code: Option<String>,
}

/// UNG, the functional group header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UngSegment {
    /// Identification of the message types in the group (e.g., "ORDERS")
    pub group_id: String,
    /// Application sender
    pub sender: PartyId,
    /// Application recipient
    pub recipient: PartyId,
    /// Date and time of preparation
    pub datetime: DateTimeStamp,
    /// Group reference, echoed by UNE
    pub group_ref: String,
    /// Controlling agency (optional, e.g., "UN")
    pub agency: Option<String>,
    /// Message version shared by the group (optional)
    pub message_version: Option<GroupVersion>,
    /// Application password (optional)
    pub application_password: Option<String>,
}

/// UNE, the functional group trailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UneSegment {
    /// Count of messages in the group
    pub message_count: usize,
    /// Group reference, must match UNG
    pub group_ref: String,
}

// ============================================================================
// Event-mapping definitions
// ============================================================================

fn envelope_segment(tag: &'static str) -> Segment {
    // real-world control segments often carry trailing service elements the
    // typed views do not model; tolerate them
    Segment::new(tag, tag).truncatable().ignore_unmapped_fields()
}

fn party_field(name: &str) -> Field {
    Field::new(name)
        .component(Component::new("id").required())
        .component(Component::new("codeQualifier"))
        .component(Component::new("internalId"))
        .component(Component::new("internalSubId"))
}

fn date_time_field() -> Field {
    Field::new("dateTime")
        .component(Component::new("date").required())
        .component(Component::new("time").required())
}

fn identification_field(name: &str) -> Field {
    Field::new(name)
        .component(Component::new("id").required())
        .component(Component::new("versionNum"))
        .component(Component::new("releaseNum"))
        .component(Component::new("controllingAgencyCode"))
}

pub(crate) static UNB_DEF: LazyLock<Segment> = LazyLock::new(|| {
    let mut def = envelope_segment("UNB")
        .field(
            Field::new("syntaxIdentifier")
                .required()
                .component(Component::new("id").required())
                .component(Component::new("versionNum").required())
                .component(Component::new("serviceCodeListDirVersion"))
                .component(Component::new("codedCharacterEncoding")),
        )
        .field(party_field("sender").required())
        .field(party_field("recipient").required())
        .field(date_time_field().required())
        .field(Field::new("controlRef").required())
        .field(
            Field::new("recipientRef")
                .component(Component::new("ref"))
                .component(Component::new("refQualifier")),
        )
        .field(Field::new("applicationRef"))
        .field(Field::new("processingPriorityCode"))
        .field(Field::new("ackRequest"))
        .field(Field::new("agreementId"))
        .field(Field::new("testIndicator"));
    def.propagate_namespace(ENVELOPE_NAMESPACE);
    def
});

pub(crate) static UNZ_DEF: LazyLock<Segment> = LazyLock::new(|| {
    let mut def = envelope_segment("UNZ")
        .field(
            Field::new("controlCount")
                .required()
                .data_type(DataType::Integer),
        )
        .field(Field::new("controlRef").required());
    def.propagate_namespace(ENVELOPE_NAMESPACE);
    def
});

pub(crate) static UNH_DEF: LazyLock<Segment> = LazyLock::new(|| {
    let mut def = envelope_segment("UNH")
        .field(Field::new("messageRefNum").required())
        .field(
            Field::new("messageIdentifier")
                .required()
                .component(Component::new("id").required())
                .component(Component::new("versionNum").required())
                .component(Component::new("releaseNum").required())
                .component(Component::new("controllingAgencyCode"))
                .component(Component::new("associationAssignedCode"))
                .component(Component::new("codeListDirVersionNum"))
                .component(Component::new("typeSubFunctionId")),
        )
        .field(Field::new("commonAccessRef"))
        .field(
            Field::new("statusOfTransfer")
                .component(Component::new("sequenceOfTransfers").required())
                .component(Component::new("firstAndLastTransfer")),
        )
        .field(identification_field("subset"))
        .field(identification_field("implementationGuideline"))
        .field(identification_field("scenario"));
    def.propagate_namespace(ENVELOPE_NAMESPACE);
    def
});

pub(crate) static UNT_DEF: LazyLock<Segment> = LazyLock::new(|| {
    let mut def = envelope_segment("UNT")
        .field(
            Field::new("segmentCount")
                .required()
                .data_type(DataType::Integer),
        )
        .field(Field::new("messageRefNum").required());
    def.propagate_namespace(ENVELOPE_NAMESPACE);
    def
});

pub(crate) static UNG_DEF: LazyLock<Segment> = LazyLock::new(|| {
    let mut def = envelope_segment("UNG")
        .field(Field::new("groupId").required())
        .field(
            Field::new("senderApp")
                .required()
                .component(Component::new("id").required())
                .component(Component::new("codeQualifier")),
        )
        .field(
            Field::new("recipientApp")
                .required()
                .component(Component::new("id").required())
                .component(Component::new("codeQualifier")),
        )
        .field(date_time_field().required())
        .field(Field::new("groupRef").required())
        .field(Field::new("controllingAgencyCode"))
        .field(
            Field::new("messageVersion")
                .component(Component::new("versionNum"))
                .component(Component::new("releaseNum"))
                .component(Component::new("associationCode")),
        )
        .field(Field::new("applicationPassword"));
    def.propagate_namespace(ENVELOPE_NAMESPACE);
    def
});

pub(crate) static UNE_DEF: LazyLock<Segment> = LazyLock::new(|| {
    let mut def = envelope_segment("UNE")
        .field(
            Field::new("controlCount")
                .required()
                .data_type(DataType::Integer),
        )
        .field(Field::new("groupRef").required());
    def.propagate_namespace(ENVELOPE_NAMESPACE);
    def
});

// ============================================================================
// Parsing
// ============================================================================

/// Parse a UNB interchange header
pub fn parse_unb(raw: &RawSegment, delimiters: &Delimiters) -> Result<UnbSegment> {
    expect_tag(raw, delimiters, "UNB")?;
    let position = raw.position();
    let syntax = split_parts(
        required_raw(raw, delimiters, 1, "UNB", "syntax identifier")?,
        delimiters,
    );
    let syntax_identifier = SyntaxIdentifier {
        identifier: required_part(&syntax, 0, "UNB", "syntax identifier", position)?,
        version: required_part(&syntax, 1, "UNB", "syntax version number", position)?,
        service_code_list: optional_part(&syntax, 2),
        encoding: optional_part(&syntax, 3),
    };
    let sender = parse_party(
        required_raw(raw, delimiters, 2, "UNB", "interchange sender")?,
        delimiters,
        "UNB",
        "sender identification",
        position,
    )?;
    let recipient = parse_party(
        required_raw(raw, delimiters, 3, "UNB", "interchange recipient")?,
        delimiters,
        "UNB",
        "recipient identification",
        position,
    )?;
    let datetime = parse_datetime(
        required_raw(raw, delimiters, 4, "UNB", "date and time of preparation")?,
        delimiters,
        "UNB",
        position,
    )?;
    let control_ref = simple(raw, delimiters, 5, "UNB", "interchange control reference")?;
    let recipient_ref = raw_field(raw, delimiters, 6).map(|token| {
        let parts = split_parts(token, delimiters);
        RecipientRef {
            reference: parts.first().cloned().unwrap_or_default(),
            qualifier: optional_part(&parts, 1),
        }
    });
    Ok(UnbSegment {
        syntax_identifier,
        sender,
        recipient,
        datetime,
        control_ref,
        recipient_ref,
        application_ref: optional(raw, delimiters, 7),
        priority: optional(raw, delimiters, 8),
        ack_request: optional(raw, delimiters, 9),
        agreement_id: optional(raw, delimiters, 10),
        test_indicator: optional(raw, delimiters, 11),
    })
}

/// Parse a UNZ interchange trailer
pub fn parse_unz(raw: &RawSegment, delimiters: &Delimiters) -> Result<UnzSegment> {
    expect_tag(raw, delimiters, "UNZ")?;
    Ok(UnzSegment {
        control_count: count(raw, delimiters, 1, "UNZ", "interchange control count")?,
        control_ref: simple(raw, delimiters, 2, "UNZ", "interchange control reference")?,
    })
}

/// Parse a UNH message header
pub fn parse_unh(raw: &RawSegment, delimiters: &Delimiters) -> Result<UnhSegment> {
    expect_tag(raw, delimiters, "UNH")?;
    let position = raw.position();
    let message_ref = simple(raw, delimiters, 1, "UNH", "message reference number")?;
    let identifier = split_parts(
        required_raw(raw, delimiters, 2, "UNH", "message identifier")?,
        delimiters,
    );
    let message_type = MessageTypeIdentifier {
        id: required_part(&identifier, 0, "UNH", "message type", position)?,
        version: required_part(&identifier, 1, "UNH", "message version number", position)?,
        release: required_part(&identifier, 2, "UNH", "message release number", position)?,
        agency: optional_part(&identifier, 3),
        association_code: optional_part(&identifier, 4),
        code_list_version: optional_part(&identifier, 5),
        sub_function_id: optional_part(&identifier, 6),
    };
    let status_of_transfer = raw_field(raw, delimiters, 4)
        .map(|token| -> Result<TransferStatus> {
            let parts = split_parts(token, delimiters);
            Ok(TransferStatus {
                sequence: required_part(&parts, 0, "UNH", "transfer sequence number", position)?,
                first_and_last: optional_part(&parts, 1),
            })
        })
        .transpose()?;
    Ok(UnhSegment {
        message_ref,
        message_type,
        common_access_ref: optional(raw, delimiters, 3),
        status_of_transfer,
        subset: parse_identification(raw, delimiters, 5, "subset identification", position)?,
        implementation_guideline: parse_identification(
            raw,
            delimiters,
            6,
            "implementation guideline identification",
            position,
        )?,
        scenario: parse_identification(raw, delimiters, 7, "scenario identification", position)?,
    })
}

/// Parse a UNT message trailer
pub fn parse_unt(raw: &RawSegment, delimiters: &Delimiters) -> Result<UntSegment> {
    expect_tag(raw, delimiters, "UNT")?;
    Ok(UntSegment {
        segment_count: count(raw, delimiters, 1, "UNT", "segment count")?,
        message_ref: simple(raw, delimiters, 2, "UNT", "message reference number")?,
    })
}

/// Parse a UNG functional group header
pub fn parse_ung(raw: &RawSegment, delimiters: &Delimiters) -> Result<UngSegment> {
    expect_tag(raw, delimiters, "UNG")?;
    let position = raw.position();
    let group_id = simple(raw, delimiters, 1, "UNG", "group identification")?;
    let sender = parse_party(
        required_raw(raw, delimiters, 2, "UNG", "application sender")?,
        delimiters,
        "UNG",
        "application sender identification",
        position,
    )?;
    let recipient = parse_party(
        required_raw(raw, delimiters, 3, "UNG", "application recipient")?,
        delimiters,
        "UNG",
        "application recipient identification",
        position,
    )?;
    let datetime = parse_datetime(
        required_raw(raw, delimiters, 4, "UNG", "date and time of preparation")?,
        delimiters,
        "UNG",
        position,
    )?;
    let group_ref = simple(raw, delimiters, 5, "UNG", "group reference")?;
    let message_version = raw_field(raw, delimiters, 7)
        .map(|token| -> Result<GroupVersion> {
            let parts = split_parts(token, delimiters);
            Ok(GroupVersion {
                version: required_part(&parts, 0, "UNG", "message version number", position)?,
                release: required_part(&parts, 1, "UNG", "message release number", position)?,
                association_code: optional_part(&parts, 2),
            })
        })
        .transpose()?;
    Ok(UngSegment {
        group_id,
        sender,
        recipient,
        datetime,
        group_ref,
        agency: optional(raw, delimiters, 6),
        message_version,
        application_password: optional(raw, delimiters, 8),
    })
}

/// Parse a UNE functional group trailer
pub fn parse_une(raw: &RawSegment, delimiters: &Delimiters) -> Result<UneSegment> {
    expect_tag(raw, delimiters, "UNE")?;
    Ok(UneSegment {
        message_count: count(raw, delimiters, 1, "UNE", "group control count")?,
        group_ref: simple(raw, delimiters, 2, "UNE", "group reference")?,
    })
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn expect_tag(raw: &RawSegment, delimiters: &Delimiters, tag: &'static str) -> Result<()> {
    let found = raw.tag(delimiters);
    if found != tag {
        return Err(Error::malformed_control(
            tag,
            format!("expected {tag}, found '{found}'"),
            raw.position(),
        ));
    }
    Ok(())
}

fn raw_field<'s>(raw: &'s RawSegment, delimiters: &Delimiters, index: usize) -> Option<&'s str> {
    raw.fields(delimiters)
        .get(index)
        .map(String::as_str)
        .filter(|t| !t.is_empty())
}

fn required_raw<'s>(
    raw: &'s RawSegment,
    delimiters: &Delimiters,
    index: usize,
    tag: &'static str,
    what: &str,
) -> Result<&'s str> {
    raw_field(raw, delimiters, index)
        .ok_or_else(|| Error::malformed_control(tag, format!("missing {what}"), raw.position()))
}

fn simple(
    raw: &RawSegment,
    delimiters: &Delimiters,
    index: usize,
    tag: &'static str,
    what: &str,
) -> Result<String> {
    Ok(delimiters.unescape(required_raw(raw, delimiters, index, tag, what)?))
}

fn optional(raw: &RawSegment, delimiters: &Delimiters, index: usize) -> Option<String> {
    raw_field(raw, delimiters, index).map(|t| delimiters.unescape(t))
}

fn count(
    raw: &RawSegment,
    delimiters: &Delimiters,
    index: usize,
    tag: &'static str,
    what: &str,
) -> Result<usize> {
    let text = simple(raw, delimiters, index, tag, what)?;
    text.parse().map_err(|_| {
        Error::malformed_control(
            tag,
            format!("{what} '{text}' is not a number"),
            raw.position(),
        )
    })
}

fn split_parts(token: &str, delimiters: &Delimiters) -> Vec<String> {
    delimiters
        .split(token, delimiters.component)
        .iter()
        .map(|part| delimiters.unescape(part))
        .collect()
}

fn required_part(
    parts: &[String],
    index: usize,
    tag: &'static str,
    what: &str,
    position: Position,
) -> Result<String> {
    parts
        .get(index)
        .filter(|p| !p.is_empty())
        .cloned()
        .ok_or_else(|| Error::malformed_control(tag, format!("missing {what}"), position))
}

fn optional_part(parts: &[String], index: usize) -> Option<String> {
    parts.get(index).filter(|p| !p.is_empty()).cloned()
}

fn parse_party(
    token: &str,
    delimiters: &Delimiters,
    tag: &'static str,
    what: &str,
    position: Position,
) -> Result<PartyId> {
    let parts = split_parts(token, delimiters);
    Ok(PartyId {
        id: required_part(&parts, 0, tag, what, position)?,
        qualifier: optional_part(&parts, 1),
        internal_id: optional_part(&parts, 2),
        internal_qualifier: optional_part(&parts, 3),
    })
}

fn parse_datetime(
    token: &str,
    delimiters: &Delimiters,
    tag: &'static str,
    position: Position,
) -> Result<DateTimeStamp> {
    let parts = split_parts(token, delimiters);
    Ok(DateTimeStamp {
        date: required_part(&parts, 0, tag, "preparation date", position)?,
        time: required_part(&parts, 1, tag, "preparation time", position)?,
    })
}

fn parse_identification(
    raw: &RawSegment,
    delimiters: &Delimiters,
    index: usize,
    what: &str,
    position: Position,
) -> Result<Option<Identification>> {
    raw_field(raw, delimiters, index)
        .map(|token| {
            let parts = split_parts(token, delimiters);
            Ok(Identification {
                id: required_part(&parts, 0, "UNH", what, position)?,
                version: optional_part(&parts, 1),
                release: optional_part(&parts, 2),
                agency: optional_part(&parts, 3),
            })
        })
        .transpose()
}

// ============================================================================
// Rendering
// ============================================================================

/// Render a UNB segment, terminator included
pub fn render_unb(unb: &UnbSegment, delimiters: &Delimiters) -> String {
    let fields = vec![
        compose(
            &[
                Some(unb.syntax_identifier.identifier.as_str()),
                Some(unb.syntax_identifier.version.as_str()),
                unb.syntax_identifier.service_code_list.as_deref(),
                unb.syntax_identifier.encoding.as_deref(),
            ],
            delimiters,
        ),
        render_party(&unb.sender, delimiters),
        render_party(&unb.recipient, delimiters),
        render_datetime(&unb.datetime, delimiters),
        delimiters.escape(&unb.control_ref),
        unb.recipient_ref.as_ref().map_or_else(String::new, |r| {
            compose(
                &[Some(r.reference.as_str()), r.qualifier.as_deref()],
                delimiters,
            )
        }),
        opt(unb.application_ref.as_deref(), delimiters),
        opt(unb.priority.as_deref(), delimiters),
        opt(unb.ack_request.as_deref(), delimiters),
        opt(unb.agreement_id.as_deref(), delimiters),
        opt(unb.test_indicator.as_deref(), delimiters),
    ];
    render_segment("UNB", fields, delimiters)
}

/// Render a UNZ segment, terminator included
pub fn render_unz(unz: &UnzSegment, delimiters: &Delimiters) -> String {
    let fields = vec![
        unz.control_count.to_string(),
        delimiters.escape(&unz.control_ref),
    ];
    render_segment("UNZ", fields, delimiters)
}

/// Render a UNH segment, terminator included
pub fn render_unh(unh: &UnhSegment, delimiters: &Delimiters) -> String {
    let fields = vec![
        delimiters.escape(&unh.message_ref),
        compose(
            &[
                Some(unh.message_type.id.as_str()),
                Some(unh.message_type.version.as_str()),
                Some(unh.message_type.release.as_str()),
                unh.message_type.agency.as_deref(),
                unh.message_type.association_code.as_deref(),
                unh.message_type.code_list_version.as_deref(),
                unh.message_type.sub_function_id.as_deref(),
            ],
            delimiters,
        ),
        opt(unh.common_access_ref.as_deref(), delimiters),
        unh.status_of_transfer.as_ref().map_or_else(String::new, |s| {
            compose(
                &[Some(s.sequence.as_str()), s.first_and_last.as_deref()],
                delimiters,
            )
        }),
        render_identification(unh.subset.as_ref(), delimiters),
        render_identification(unh.implementation_guideline.as_ref(), delimiters),
        render_identification(unh.scenario.as_ref(), delimiters),
    ];
    render_segment("UNH", fields, delimiters)
}

/// Render a UNT segment, terminator included
pub fn render_unt(unt: &UntSegment, delimiters: &Delimiters) -> String {
    let fields = vec![
        unt.segment_count.to_string(),
        delimiters.escape(&unt.message_ref),
    ];
    render_segment("UNT", fields, delimiters)
}

/// Render a UNG segment, terminator included
pub fn render_ung(ung: &UngSegment, delimiters: &Delimiters) -> String {
    let fields = vec![
        delimiters.escape(&ung.group_id),
        render_party(&ung.sender, delimiters),
        render_party(&ung.recipient, delimiters),
        render_datetime(&ung.datetime, delimiters),
        delimiters.escape(&ung.group_ref),
        opt(ung.agency.as_deref(), delimiters),
        ung.message_version.as_ref().map_or_else(String::new, |v| {
            compose(
                &[
                    Some(v.version.as_str()),
                    Some(v.release.as_str()),
                    v.association_code.as_deref(),
                ],
                delimiters,
            )
        }),
        opt(ung.application_password.as_deref(), delimiters),
    ];
    render_segment("UNG", fields, delimiters)
}

/// Render a UNE segment, terminator included
pub fn render_une(une: &UneSegment, delimiters: &Delimiters) -> String {
    let fields = vec![
        une.message_count.to_string(),
        delimiters.escape(&une.group_ref),
    ];
    render_segment("UNE", fields, delimiters)
}

fn render_segment(tag: &str, fields: Vec<String>, delimiters: &Delimiters) -> String {
    let body = join_tokens(fields, delimiters.field, true, delimiters);
    let mut out = String::with_capacity(tag.len() + body.len() + 2);
    out.push_str(tag);
    if !body.is_empty() {
        out.push(delimiters.field);
        out.push_str(&body);
    }
    out.push(delimiters.segment);
    out
}

fn render_party(party: &PartyId, delimiters: &Delimiters) -> String {
    compose(
        &[
            Some(party.id.as_str()),
            party.qualifier.as_deref(),
            party.internal_id.as_deref(),
            party.internal_qualifier.as_deref(),
        ],
        delimiters,
    )
}

fn render_datetime(datetime: &DateTimeStamp, delimiters: &Delimiters) -> String {
    compose(
        &[Some(datetime.date.as_str()), Some(datetime.time.as_str())],
        delimiters,
    )
}

fn render_identification(value: Option<&Identification>, delimiters: &Delimiters) -> String {
    value.map_or_else(String::new, |v| {
        compose(
            &[
                Some(v.id.as_str()),
                v.version.as_deref(),
                v.release.as_deref(),
                v.agency.as_deref(),
            ],
            delimiters,
        )
    })
}

fn compose(parts: &[Option<&str>], delimiters: &Delimiters) -> String {
    let tokens: Vec<String> = parts
        .iter()
        .map(|part| part.map_or_else(String::new, |v| delimiters.escape(v)))
        .collect();
    join_tokens(tokens, delimiters.component, true, delimiters)
}

fn opt(value: Option<&str>, delimiters: &Delimiters) -> String {
    value.map_or_else(String::new, |v| delimiters.escape(v))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SegmentReader;

    fn segment(input: &str) -> RawSegment {
        let mut reader = SegmentReader::new(input.as_bytes(), Delimiters::default());
        reader.next_segment().unwrap().unwrap()
    }

    #[test]
    fn test_parse_unb() {
        let raw = segment("UNB+UNOA:3+SENDER+RECEIVER+200101:1200+12345'");
        let unb = parse_unb(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unb.syntax_identifier.identifier, "UNOA");
        assert_eq!(unb.syntax_identifier.version, "3");
        assert_eq!(unb.sender.id, "SENDER");
        assert_eq!(unb.recipient.id, "RECEIVER");
        assert_eq!(unb.datetime.date, "200101");
        assert_eq!(unb.datetime.time, "1200");
        assert_eq!(unb.control_ref, "12345");
        assert!(unb.recipient_ref.is_none());
        assert!(unb.test_indicator.is_none());
    }

    #[test]
    fn test_parse_unb_with_qualifiers() {
        let raw = segment("UNB+UNOA:3+SENDER:14:INTERNAL:ZZ+RECEIVER:14+200101:1200+12345'");
        let unb = parse_unb(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unb.sender.qualifier.as_deref(), Some("14"));
        assert_eq!(unb.sender.internal_id.as_deref(), Some("INTERNAL"));
        assert_eq!(unb.sender.internal_qualifier.as_deref(), Some("ZZ"));
        assert_eq!(unb.recipient.qualifier.as_deref(), Some("14"));
        assert!(unb.recipient.internal_id.is_none());
    }

    #[test]
    fn test_parse_unb_with_optional_fields() {
        let raw = segment("UNB+UNOA:3+S+R+200101:1200+REF1+RREF:AA+APP+A+1+AGREE+1'");
        let unb = parse_unb(&raw, &Delimiters::default()).unwrap();
        let rref = unb.recipient_ref.unwrap();
        assert_eq!(rref.reference, "RREF");
        assert_eq!(rref.qualifier.as_deref(), Some("AA"));
        assert_eq!(unb.application_ref.as_deref(), Some("APP"));
        assert_eq!(unb.priority.as_deref(), Some("A"));
        assert_eq!(unb.ack_request.as_deref(), Some("1"));
        assert_eq!(unb.agreement_id.as_deref(), Some("AGREE"));
        assert_eq!(unb.test_indicator.as_deref(), Some("1"));
    }

    #[test]
    fn test_parse_unb_missing_control_ref() {
        let raw = segment("UNB+UNOA:3+S+R+200101:1200'");
        let err = parse_unb(&raw, &Delimiters::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { tag: "UNB", .. }));
    }

    #[test]
    fn test_parse_unh() {
        let raw = segment("UNH+MSG001+ORDERS:D:03B:UN'");
        let unh = parse_unh(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unh.message_ref, "MSG001");
        assert_eq!(unh.message_type.id, "ORDERS");
        assert_eq!(unh.message_type.version, "D");
        assert_eq!(unh.message_type.release, "03B");
        assert_eq!(unh.message_type.agency.as_deref(), Some("UN"));
        assert_eq!(unh.message_type.version_key(), "D:03B");
    }

    #[test]
    fn test_parse_unh_full_message_identifier() {
        let raw = segment("UNH+1+ORDERS:D:96A:UN:EAN008:201:SF1'");
        let unh = parse_unh(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unh.message_type.association_code.as_deref(), Some("EAN008"));
        assert_eq!(unh.message_type.code_list_version.as_deref(), Some("201"));
        assert_eq!(unh.message_type.sub_function_id.as_deref(), Some("SF1"));
    }

    #[test]
    fn test_parse_unh_incomplete_identifier() {
        let raw = segment("UNH+1+ORDERS:D'");
        let err = parse_unh(&raw, &Delimiters::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { tag: "UNH", .. }));
    }

    #[test]
    fn test_parse_unh_status_of_transfer() {
        let raw = segment("UNH+1+ORDERS:D:96A:UN+CAR+2:F'");
        let unh = parse_unh(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unh.common_access_ref.as_deref(), Some("CAR"));
        let status = unh.status_of_transfer.unwrap();
        assert_eq!(status.sequence, "2");
        assert_eq!(status.first_and_last.as_deref(), Some("F"));
    }

    #[test]
    fn test_parse_unh_identification_fields() {
        let raw = segment("UNH+1+ORDERS:D:96A:UN++2+EAN007:3::UN++SCEN1'");
        let unh = parse_unh(&raw, &Delimiters::default()).unwrap();
        assert!(unh.common_access_ref.is_none());
        assert_eq!(unh.status_of_transfer.unwrap().sequence, "2");
        let subset = unh.subset.unwrap();
        assert_eq!(subset.id, "EAN007");
        assert_eq!(subset.version.as_deref(), Some("3"));
        assert!(subset.release.is_none());
        assert_eq!(subset.agency.as_deref(), Some("UN"));
        assert!(unh.implementation_guideline.is_none());
        assert_eq!(unh.scenario.unwrap().id, "SCEN1");
    }

    #[test]
    fn test_parse_unt() {
        let raw = segment("UNT+15+MSG001'");
        let unt = parse_unt(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unt.segment_count, 15);
        assert_eq!(unt.message_ref, "MSG001");
    }

    #[test]
    fn test_parse_unt_non_numeric_count() {
        let raw = segment("UNT+abc+MSG001'");
        let err = parse_unt(&raw, &Delimiters::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { tag: "UNT", .. }));
    }

    #[test]
    fn test_parse_unz() {
        let raw = segment("UNZ+5+12345'");
        let unz = parse_unz(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unz.control_count, 5);
        assert_eq!(unz.control_ref, "12345");
    }

    #[test]
    fn test_parse_ung() {
        let raw = segment("UNG+ORDERS+APPSND:1+APPRCV:1+200101:1200+G1+UN+D:96A'");
        let ung = parse_ung(&raw, &Delimiters::default()).unwrap();
        assert_eq!(ung.group_id, "ORDERS");
        assert_eq!(ung.sender.id, "APPSND");
        assert_eq!(ung.sender.qualifier.as_deref(), Some("1"));
        assert_eq!(ung.group_ref, "G1");
        assert_eq!(ung.agency.as_deref(), Some("UN"));
        let version = ung.message_version.unwrap();
        assert_eq!(version.version, "D");
        assert_eq!(version.release, "96A");
    }

    #[test]
    fn test_parse_une() {
        let raw = segment("UNE+2+G1'");
        let une = parse_une(&raw, &Delimiters::default()).unwrap();
        assert_eq!(une.message_count, 2);
        assert_eq!(une.group_ref, "G1");
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let raw = segment("UNH+1+ORDERS:D:96A'");
        let err = parse_unb(&raw, &Delimiters::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedControl { tag: "UNB", .. }));
    }

    #[test]
    fn test_escaped_values_unescaped() {
        let raw = segment("UNB+UNOA:3+A?+B+R+200101:1200+REF?:1'");
        let unb = parse_unb(&raw, &Delimiters::default()).unwrap();
        assert_eq!(unb.sender.id, "A+B");
        assert_eq!(unb.control_ref, "REF:1");
    }

    #[test]
    fn test_render_unb_minimal() {
        let unb = UnbSegment {
            syntax_identifier: SyntaxIdentifier::default(),
            sender: PartyId {
                id: "SENDER".to_string(),
                ..PartyId::default()
            },
            recipient: PartyId {
                id: "RECEIVER".to_string(),
                ..PartyId::default()
            },
            datetime: DateTimeStamp {
                date: "200101".to_string(),
                time: "1200".to_string(),
            },
            control_ref: "12345".to_string(),
            recipient_ref: None,
            application_ref: None,
            priority: None,
            ack_request: None,
            agreement_id: None,
            test_indicator: None,
        };
        let rendered = render_unb(&unb, &Delimiters::default());
        assert_eq!(rendered, "UNB+UNOA:3+SENDER+RECEIVER+200101:1200+12345'");
    }

    #[test]
    fn test_render_parse_round_trip() {
        let raw = segment("UNB+UNOA:3+SND:14+RCV:14+200101:1200+REF+RREF:AA+APP'");
        let delimiters = Delimiters::default();
        let unb = parse_unb(&raw, &delimiters).unwrap();
        let rendered = render_unb(&unb, &delimiters);
        let reparsed = parse_unb(&segment(&rendered), &delimiters).unwrap();
        assert_eq!(unb, reparsed);
    }

    #[test]
    fn test_render_escapes_separators() {
        let unt = UntSegment {
            segment_count: 4,
            message_ref: "M+1".to_string(),
        };
        assert_eq!(render_unt(&unt, &Delimiters::default()), "UNT+4+M?+1'");
    }

    #[test]
    fn test_render_unh_trailing_options_truncated() {
        let unh = UnhSegment {
            message_ref: "1".to_string(),
            message_type: MessageTypeIdentifier {
                id: "ORDERS".to_string(),
                version: "D".to_string(),
                release: "96A".to_string(),
                agency: None,
                association_code: None,
                code_list_version: None,
                sub_function_id: None,
            },
            common_access_ref: None,
            status_of_transfer: None,
            subset: None,
            implementation_guideline: None,
            scenario: None,
        };
        assert_eq!(render_unh(&unh, &Delimiters::default()), "UNH+1+ORDERS:D:96A'");
    }

    #[test]
    fn test_render_unh_keeps_transfer_and_identifications() {
        let input = "UNH+1+ORDERS:D:96A:UN+CAR+2:F+SUB:1:A:UN+GUIDE+SCEN:2'";
        let delimiters = Delimiters::default();
        let unh = parse_unh(&segment(input), &delimiters).unwrap();
        assert_eq!(render_unh(&unh, &delimiters), input);
    }

    #[test]
    fn test_envelope_metadata_serde_round_trip() {
        let raw = segment("UNB+UNOA:3+SENDER:14+RECEIVER+200101:1200+REF1+RREF:AA'");
        let unb = parse_unb(&raw, &Delimiters::default()).unwrap();
        let json = serde_json::to_string(&unb).unwrap();
        assert!(json.contains(r#""control_ref":"REF1""#));
        let back: UnbSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unb);
    }

    #[test]
    fn test_definitions_carry_envelope_namespace() {
        assert_eq!(UNB_DEF.namespace.as_deref(), Some(ENVELOPE_NAMESPACE));
        assert_eq!(
            UNB_DEF.fields[0].namespace.as_deref(),
            Some(ENVELOPE_NAMESPACE)
        );
        assert_eq!(
            UNB_DEF.fields[0].components[0].namespace.as_deref(),
            Some(ENVELOPE_NAMESPACE)
        );
        assert!(UNH_DEF.ignore_unmapped_fields);
        assert!(UNT_DEF.truncatable);
    }
}
