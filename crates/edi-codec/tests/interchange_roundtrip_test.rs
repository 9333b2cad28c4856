//! Interchange round-trip tests
//!
//! End-to-end coverage for the UN/EDIFACT envelope layer: parse a complete
//! interchange to typed envelopes and body trees, write it back out, and
//! compare with the original text.

use std::io::{BufReader, Write};
use std::sync::Arc;

use edi_codec::interchange::{INTERCHANGE_ELEMENT, MESSAGE_ELEMENT};
use edi_codec::{Error, InterchangeOptions, ParseOptions, UnEdifactParser, UnEdifactWriter};
use edi_grammar::{
    Component, DataType, Delimiters, Description, Edimap, Field, GrammarRegistry, MaxOccurs,
    Segment, SegmentGroup,
};
use edi_ir::{Event, EventCollector};

/// ORDERS-shaped grammar with truncatable segments, so sparse input
/// round-trips without padding
fn orders_grammar() -> Edimap {
    Edimap::new(
        Description::new("ORDERS", "D:96A"),
        Delimiters::default(),
        SegmentGroup::new("orders")
            .segment(
                Segment::new("BGM", "beginningOfMessage")
                    .truncatable()
                    .field(Field::new("documentName").required())
                    .field(Field::new("documentNumber")),
            )
            .segment(
                Segment::new("DTM", "dateTimePeriod")
                    .truncatable()
                    .occurs(0, MaxOccurs::Bounded(1))
                    .field(
                        Field::new("dateTime")
                            .component(Component::new("qualifier").required())
                            .component(Component::new("date"))
                            .component(Component::new("format")),
                    ),
            )
            .group(
                SegmentGroup::new("lineItem")
                    .occurs(0, MaxOccurs::Unbounded)
                    .segment(
                        Segment::new("LIN", "line")
                            .truncatable()
                            .field(Field::new("lineNumber").required())
                            .field(Field::new("actionCode"))
                            .field(
                                Field::new("item")
                                    .component(Component::new("code").required())
                                    .component(Component::new("codeType")),
                            ),
                    )
                    .segment(
                        Segment::new("QTY", "quantity")
                            .truncatable()
                            .occurs(0, MaxOccurs::Bounded(1))
                            .field(
                                Field::new("details")
                                    .component(Component::new("qualifier").required())
                                    .component(
                                        Component::new("amount")
                                            .required()
                                            .data_type(DataType::Decimal),
                                    ),
                            ),
                    ),
            ),
    )
}

fn registry() -> Arc<GrammarRegistry> {
    let registry = GrammarRegistry::new();
    registry
        .register(orders_grammar())
        .expect("grammar should validate");
    Arc::new(registry)
}

const ORDERS_INTERCHANGE: &str =
    "UNB+UNOA:3+5412345000013:14+8798765000004:14+200323:0620+EXAMPLE1'\
UNH+1+ORDERS:D:96A:UN'\
BGM+220+PO1'\
DTM+137:20200323:102'\
LIN+1++9783898307529:EN'\
QTY+21:5'\
LIN+2++9783898307530:EN'\
QTY+21:3'\
UNT+8+1'\
UNZ+1+EXAMPLE1'";

#[test]
fn test_parse_then_write_is_identity() {
    let registry = registry();
    let interchange = UnEdifactParser::new(Arc::clone(&registry))
        .parse(ORDERS_INTERCHANGE.as_bytes())
        .expect("interchange should parse");

    // sanity-check the materialized side before writing
    assert_eq!(interchange.messages.len(), 1);
    let body = &interchange.messages[0].body;
    assert_eq!(body.find_children("lineItem").len(), 2);
    let first_line = body.find_children("lineItem")[0];
    let item = first_line.find_child("line").unwrap().find_child("item").unwrap();
    assert_eq!(item.child_text("code"), Some("9783898307529"));

    let written = UnEdifactWriter::new(registry)
        .write_to_string(&interchange)
        .expect("interchange should write");
    assert_eq!(written, ORDERS_INTERCHANGE);
}

#[test]
fn test_escape_sequences_survive_round_trip() {
    let input = "UNB+UNOA:3+SENDER+RECEIVER+200101:1200+REF1'\
UNH+1+ORDERS:D:96A'\
BGM+220+P?'O?+1?:A??B'\
UNT+3+1'\
UNZ+1+REF1'";
    let registry = registry();
    let interchange = UnEdifactParser::new(Arc::clone(&registry))
        .parse(input.as_bytes())
        .expect("escaped input should parse");

    // released characters are plain text in the tree
    let bgm = interchange.messages[0]
        .body
        .find_child("beginningOfMessage")
        .unwrap();
    assert_eq!(bgm.child_text("documentNumber"), Some("P'O+1:A?B"));

    let written = UnEdifactWriter::new(registry)
        .write_to_string(&interchange)
        .expect("escaped values should write");
    assert_eq!(written, input);
}

#[test]
fn test_group_with_only_leading_segment_round_trips() {
    // the first line item has no QTY; the group must close and reopen
    let input = "UNB+UNOA:3+S+R+200101:1200+REF1'\
UNH+1+ORDERS:D:96A'\
BGM+220+PO9'\
LIN+1++A:EN'\
LIN+2++B:EN'\
QTY+21:4'\
UNT+6+1'\
UNZ+1+REF1'";
    let registry = registry();
    let interchange = UnEdifactParser::new(Arc::clone(&registry))
        .parse(input.as_bytes())
        .expect("should parse");
    let body = &interchange.messages[0].body;
    let lines = body.find_children("lineItem");
    assert_eq!(lines.len(), 2);
    assert!(lines[0].find_child("quantity").is_none());
    assert!(lines[1].find_child("quantity").is_some());

    let written = UnEdifactWriter::new(registry)
        .write_to_string(&interchange)
        .expect("should write");
    assert_eq!(written, input);
}

#[test]
fn test_decimal_separator_normalized_and_restored() {
    // UNA declares ',' as the decimal separator; tree text is canonical
    // '.' notation and writing restores the comma
    let input = "UNA:+,? 'UNB+UNOA:3+S+R+200101:1200+D1'\
UNH+1+ORDERS:D:96A'\
BGM+220'\
LIN+1++X:EN'\
QTY+21:1,5'\
UNT+5+1'\
UNZ+1+D1'";
    let registry = registry();
    let interchange = UnEdifactParser::new(Arc::clone(&registry))
        .parse(input.as_bytes())
        .expect("comma-decimal input should parse");
    assert!(interchange.una_present);
    assert_eq!(interchange.delimiters.decimal_separator, ',');

    let qty = interchange.messages[0].body.find_children("lineItem")[0]
        .find_child("quantity")
        .unwrap()
        .find_child("details")
        .unwrap();
    assert_eq!(qty.child_text("amount"), Some("1.5"));

    let written = UnEdifactWriter::new(registry)
        .write_to_string(&interchange)
        .expect("should write with UNA");
    assert_eq!(written, input);
}

#[test]
fn test_trailer_count_mismatches_are_rejected() {
    let registry = registry();

    let bad_unt = ORDERS_INTERCHANGE.replace("UNT+8+1'", "UNT+9+1'");
    let err = UnEdifactParser::new(Arc::clone(&registry))
        .parse(bad_unt.as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CountMismatch {
            scope: "message",
            declared: 9,
            actual: 8,
            ..
        }
    ));

    let bad_unz = ORDERS_INTERCHANGE.replace("UNZ+1+EXAMPLE1'", "UNZ+2+EXAMPLE1'");
    let err = UnEdifactParser::new(registry)
        .parse(bad_unz.as_bytes())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CountMismatch {
            scope: "interchange",
            declared: 2,
            actual: 1,
            ..
        }
    ));
}

#[test]
fn test_fragment_split_separates_two_orders() {
    let input = "UNB+UNOA:3+S+R+200101:1200+REF1'\
UNH+1+ORDERS:D:96A'BGM+220+PO1'UNT+3+1'\
UNH+2+ORDERS:D:96A'BGM+220+PO2'UNT+3+2'\
UNZ+2+REF1'";
    let options = InterchangeOptions {
        fragment_split: true,
        ..InterchangeOptions::default()
    };
    let mut collector = EventCollector::new();
    let interchange = UnEdifactParser::new(registry())
        .with_options(options)
        .parse_into(input.as_bytes(), &mut collector)
        .expect("should parse");

    // each message body lands in its own tree
    assert_eq!(interchange.messages.len(), 2);
    let number = |index: usize| {
        interchange.messages[index]
            .body
            .find_child("beginningOfMessage")
            .and_then(|bgm| bgm.child_text("documentNumber"))
            .map(str::to_string)
    };
    assert_eq!(number(0).as_deref(), Some("PO1"));
    assert_eq!(number(1).as_deref(), Some("PO2"));

    // the shared stream carries the envelope only
    let starts: Vec<&str> = collector
        .events
        .iter()
        .filter_map(|e| match e {
            Event::StartNode { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        starts.iter().filter(|&&n| n == MESSAGE_ELEMENT).count(),
        2
    );
    assert!(!starts.contains(&"orders"));
    assert!(!starts.contains(&"beginningOfMessage"));
    assert_eq!(starts.first(), Some(&INTERCHANGE_ELEMENT));
}

#[test]
fn test_parse_from_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(ORDERS_INTERCHANGE.as_bytes())?;
    let reader = BufReader::new(file.reopen()?);

    let interchange = UnEdifactParser::new(registry()).parse(reader)?;
    assert_eq!(interchange.header.control_ref, "EXAMPLE1");
    assert_eq!(interchange.messages.len(), 1);
    Ok(())
}

#[test]
fn test_newlines_between_segments() {
    let input = ORDERS_INTERCHANGE.replace('\'', "'\n");

    // strict reading treats the newline as segment content
    let strict = UnEdifactParser::new(registry()).parse(input.as_bytes());
    assert!(strict.is_err());

    // the lenient policy skips newlines between segments
    let options = InterchangeOptions {
        parse: ParseOptions {
            ignore_newlines: true,
            ..ParseOptions::default()
        },
        ..InterchangeOptions::default()
    };
    let interchange = UnEdifactParser::new(registry())
        .with_options(options)
        .parse(input.as_bytes())
        .expect("newline-separated input should parse");
    assert_eq!(interchange.messages.len(), 1);
}
