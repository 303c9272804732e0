use blr_reconcile::*;

const BINLOG: &str = r#"{"binlog_file":"a.000001","event_type":"WriteRowsEventV2","log_position":500,"timestamp":"2024-01-01T00:00:00Z"}
{"binlog_file":"a.000001","event_type":"WriteRowsEventV2","log_pos
this is not json

{"binlog_file":"a.000001","event_type":"UpdateRowsEventV2","log_position":600,"timestamp":"2024-01-01T00:00:00Z"}
{"binlog_file":"a.000001","event_type":"UpdateRowsEventV2","log_position":"60x","timestamp":"2024-01-01T00:00:00Z"}
"#;

const SOURCE: &str = r#"{"source_timestamp":1704067200000,"source_metadata":{"database":"shop","table":"orders","binlog_file":{"string":"a.000001"},"binlog_position":{"long":500}}}
{"source_timestamp":
{"source_metadata":{"binlog_file":{"string":"a.000001"},"binlog_position":{"long":600}}}
{"source_timestamp":1704067200000,"source_metadata":{"database":"shop","table":"orders","binlog_file":{"string":"a.000001"},"binlog_position":{"long":600}}}
{"source_timestamp":1704067200000,"source_metadata":{"database":"shop","table":"orders","binlog_file":{"string":"a.000001"}}}
"#;

#[test]
fn scenario_malformed_binlog_lines_do_not_abort_the_load() {
    let (index, stats) = RecordIndex::load(BINLOG.as_bytes()).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(stats.malformed_lines, 2);
    assert_eq!(stats.rejected_events, 1);
    assert_eq!(stats.indexed_events, 2);
}

#[test]
fn scenario_malformed_and_keyless_source_records_are_skipped_and_counted() {
    let (index, _) = RecordIndex::load(BINLOG.as_bytes()).unwrap();
    let r = reconcile_stream(index, SOURCE.as_bytes(), ReconcilePolicy::default()).unwrap();

    // Missing source_timestamp makes a line malformed, not a record.
    assert_eq!(r.counters.malformed_lines, 2);
    assert_eq!(r.counters.records_processed, 3);
    assert_eq!(r.counters.rejected, 1);
    assert_eq!(r.counters.matched, 2);
    assert_eq!(r.counters.source_only, 0);
    assert_eq!(r.counters.index_only, 0);
    assert!(r.is_consistent());
}

#[test]
fn scenario_read_error_is_fatal() {
    struct Broken;
    impl std::io::Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
        }
    }
    let reader = std::io::BufReader::new(Broken);
    let res = reconcile_stream(RecordIndex::new(), reader, ReconcilePolicy::default());
    assert!(res.is_err());
}
