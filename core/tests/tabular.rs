//! Integration tests for the tabular source/sink.
//!
//! Tests verify:
//! 1. Empty fields become absent at the boundary
//! 2. Missing declared columns fail with SchemaMismatch
//! 3. CSV stores round-trip what steps write
//! 4. Position rows decode into typed records and degrade bad values

use lgd_core::{
    config::PipelineConfig,
    error::LgdError,
    position::PositionCodec,
    tabular::{CsvStore, MemoryStore, Row, Table, TabularStore},
    temporal::DatePattern,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lgd-tabular-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn strings(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: absence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_field_is_absent() {
    let row = Row::from_pairs([("a", Some("")), ("b", Some("x")), ("c", None)]);
    assert_eq!(row.get("a"), None);
    assert_eq!(row.get("b"), Some("x"));
    assert_eq!(row.get("c"), None);
    assert!(row.has_column("a"));
    assert!(!row.has_column("z"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: schema checks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn memory_store_reports_missing_column() {
    let mut store = MemoryStore::new().with_table("s", Table::new(strings(&["a", "b"])));
    let err = store.read("s", &strings(&["a", "c"])).unwrap_err();
    match err {
        LgdError::SchemaMismatch { stream, column } => {
            assert_eq!(stream, "s");
            assert_eq!(column, "c");
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn csv_store_reports_missing_column() {
    let dir = scratch_dir("mismatch");
    let path = dir.join("in.csv");
    std::fs::write(&path, "codicebanca,ndgprincipale\n01,A\n").unwrap();

    let mut store = CsvStore::new(b',', BTreeMap::from([("in".to_string(), path)]));
    let err = store.read("in", &strings(&["codicebanca", "datainiziodef"])).unwrap_err();
    assert!(matches!(err, LgdError::SchemaMismatch { .. }));
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn unknown_stream_is_a_configuration_error() {
    let mut store = CsvStore::new(b',', BTreeMap::new());
    assert!(matches!(store.read("nope", &[]), Err(LgdError::Configuration(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: CSV round trip
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn csv_store_round_trips_tables() {
    let dir = scratch_dir("roundtrip");
    let path = dir.join("nested").join("out.csv");
    let mut store = CsvStore::new(b';', BTreeMap::from([("out".to_string(), path)]));

    let mut table = Table::new(strings(&["a", "b"]));
    table.push(vec![Some("1".into()), None]);
    table.push(vec![Some("x;y".into()), Some("2".into())]);
    store.write("out", &table).unwrap();

    let rows = store.read("out", &strings(&["a", "b"])).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("b"), None);
    assert_eq!(rows[1].get("a"), Some("x;y"));
    std::fs::remove_dir_all(dir).ok();
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: position decoding
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn legacy_rows_decode_with_two_digit_years() {
    let codec = PositionCodec::new(PipelineConfig::default_test().streams.legacy).unwrap();
    let row = Row::from_pairs([
        ("codicebanca", Some("01")),
        ("ndgprincipale", Some("N1")),
        ("datainizioDEF", Some("07-03-01")),
        ("dataFINEDEF", Some("99-12-31")),
        ("dataINIZIOPD", Some("not a date")),
        ("datainizioinc", Some("")),
        ("dataSOFFERENZA", Some("07-06-01")),
        ("flagincristrut", Some("S")),
        ("cumulo", None),
    ]);

    let (records, stats) = codec.decode_all(&[row]);
    let r = &records[0];
    let common = DatePattern::new("yyyyMMdd").unwrap();

    assert_eq!(r.join_key(&common).unwrap().default_start_date, "20070301");
    assert_eq!(r.past_due_start_date, None);
    assert_eq!(r.workout_start_date, None);
    assert_eq!(stats.degraded_fields, 1);
    assert_eq!(stats.bad_key_dates, 0);
    assert_eq!(r.extra, vec![("flagincristrut".to_string(), Some("S".to_string())), ("cumulo".to_string(), None)]);
}

#[test]
fn legacy_codec_reads_two_digit_years_in_its_century_window() {
    let codec = PositionCodec::new(PipelineConfig::default_test().streams.legacy).unwrap();
    let row = Row::from_pairs([
        ("codicebanca", Some("01")),
        ("ndgprincipale", Some("N1")),
        ("datainizioDEF", Some("60-01-01")),
        ("dataFINEDEF", Some("39-12-31")),
    ]);
    let (records, _) = codec.decode_all(&[row]);
    let common = DatePattern::new("yyyyMMdd").unwrap();

    assert_eq!(records[0].join_key(&common).unwrap().default_start_date, "19600101");
    assert_eq!(records[0].default_end_date.map(|d| common.format(d)).as_deref(), Some("20391231"));
}

#[test]
fn unparsable_start_date_leaves_record_unkeyed() {
    let codec = PositionCodec::new(PipelineConfig::default_test().streams.primary).unwrap();
    let row = Row::from_pairs([
        ("codicebanca", Some("01")),
        ("ndgprincipale", Some("N1")),
        ("datainiziodef", Some("2007-03-01")),
    ]);
    let (records, stats) = codec.decode_all(&[row]);
    assert_eq!(stats.bad_key_dates, 1);
    assert!(records[0].join_key(&DatePattern::new("yyyyMMdd").unwrap()).is_none());
}

#[test]
fn amounts_accept_decimal_comma() {
    let codec = PositionCodec::new(PipelineConfig::default_test().streams.positions).unwrap();
    let row = Row::from_pairs([
        ("codicebanca", Some("01")),
        ("ndgprincipale", Some("N1")),
        ("datainiziodef", Some("20070301")),
        ("totaccordatodatdef", Some("1234,5")),
        ("totutilizzdatdef", Some("n/a")),
    ]);
    let (records, stats) = codec.decode_all(&[row]);
    assert_eq!(records[0].total_granted, Some(1234.5));
    assert_eq!(records[0].total_utilized, None);
    assert_eq!(stats.degraded_fields, 1);
}

#[test]
fn encode_writes_declared_columns_in_order() {
    let codec = PositionCodec::new(PipelineConfig::default_test().streams.legacy).unwrap();
    let row = Row::from_pairs([
        ("codicebanca", Some("01")),
        ("ndgprincipale", Some("N1")),
        ("datainizioDEF", Some("07-03-01")),
    ]);
    let (records, _) = codec.decode_all(&[row]);
    let values = codec.encode(&records[0], &DatePattern::new("yyyyMMdd").unwrap());

    assert_eq!(values.len(), codec.width());
    assert_eq!(values[0].as_deref(), Some("01"));
    assert_eq!(values[2].as_deref(), Some("20070301"));
    assert!(values[3..].iter().all(Option::is_none));
}
