use std::io::Cursor;

use blr_events::{BinlogEvent, EventNormalizer, FieldValue, IntField, TimestampField};

const DUMP: &str = "\
=== WriteRowsEventV2 ===
Date: yesterday afternoon
Log position: 5x0
Immediate commmit timestamp: 1704067200 (not-a-time)
Table: 17
=== XidEvent ===
Date: 2024-01-01 00:00:00
Log position: 600
";

#[test]
fn unparseable_values_degrade_to_text_with_one_warning_each() {
    let mut normalizer = EventNormalizer::from_reader(Cursor::new(DUMP), "mysql-bin.000001");
    let events = normalizer
        .by_ref()
        .collect::<std::io::Result<Vec<_>>>()
        .unwrap();

    // The bad block is still emitted and the next block is unaffected.
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].log_position(), 600);

    let bad = &events[0];
    assert_eq!(bad.get("date"), Some(&FieldValue::Text("yesterday afternoon".to_string())));
    assert!(bad.get("timestamp").is_none());
    assert_eq!(bad.get("log_position"), Some(&FieldValue::Text("5x0".to_string())));
    assert_eq!(bad.log_position(), 0);
    assert_eq!(bad.get("table"), Some(&FieldValue::Int(17)));

    let warned: Vec<_> = normalizer.warnings().iter().map(|w| w.key.as_str()).collect();
    assert_eq!(
        warned,
        vec!["Date", "Log position", "Immediate commmit timestamp"]
    );
    assert_eq!(normalizer.warnings()[0].line, 2);
}

#[test]
fn degraded_fields_surface_as_raw_variants_downstream() {
    let events = EventNormalizer::from_reader(Cursor::new(DUMP), "mysql-bin.000001")
        .collect::<std::io::Result<Vec<_>>>()
        .unwrap();
    let typed: BinlogEvent = serde_json::from_str(&events[0].to_json_line().unwrap()).unwrap();

    assert_eq!(typed.log_position, Some(IntField::Raw("5x0".to_string())));
    assert_eq!(typed.position(), None);
    assert!(matches!(
        typed.immediate_commmit_timestamp,
        Some(TimestampField::Raw(_))
    ));
    assert_eq!(typed.reference_instant(), None);
}

#[test]
fn non_utf8_bytes_are_replaced_and_later_blocks_survive() {
    let mut dump: Vec<u8> = Vec::new();
    dump.extend_from_slice(b"=== QueryEvent ===\nLog position: 300\nQuery: INSERT INTO t VALUES ('caf");
    dump.push(0xE9);
    dump.extend_from_slice(b"')\n=== WriteRowsEventV2 ===\nDate: 2024-01-01 00:00:00\nLog position: 500\n");

    let mut normalizer = EventNormalizer::from_reader(Cursor::new(dump), "mysql-bin.000001");
    let events = normalizer
        .by_ref()
        .collect::<std::io::Result<Vec<_>>>()
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].get("query"),
        Some(&FieldValue::Text("INSERT INTO t VALUES ('caf\u{FFFD}')".to_string()))
    );
    assert_eq!(events[1].event_type(), Some("WriteRowsEventV2"));
    assert_eq!(events[1].log_position(), 500);

    let warnings = normalizer.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].line, 3);
    assert_eq!(warnings[0].key, "Query");
}

#[test]
fn failed_reads_end_the_stream() {
    let lines = vec![
        Ok(b"=== XidEvent ===".to_vec()),
        Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone")),
        Ok(b"Log position: 4".to_vec()),
    ];
    let mut normalizer = EventNormalizer::new(lines.into_iter(), "f");
    assert!(normalizer.next().unwrap().is_err());
    assert!(normalizer.next().is_none());
}
