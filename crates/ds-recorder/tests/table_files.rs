// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Table, configuration and feed file tests

use ds_recorder::{
    ConfigError, DestinationTable, Engine, EngineConfig, FilenameMode, FilterKind, FilterTable,
    FsStorage, HeaderKind, MessageId, PacketReader,
};
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;

const FILTER_TABLE: &str = r#"
description = "Flight filter table"

[[packets]]
message_id = 0x0801
filters = [
    { dest = 0, kind = "by-count", n = 1, x = 1 },
    { dest = 1, kind = "by-count", n = 1, x = 4, o = 2 },
]

[[packets]]
message_id = 0x0802
filters = [{ dest = 1, kind = "by-time", n = 2, x = 16 }]
"#;

fn dest_table(root: &str) -> String {
    format!(
        r#"
description = "Flight dest table"

[[files]]
path = "{root}/events"
basename = "events"
extension = ".dat"
size_limit = 4096
age_limit = 600
enabled = true

[[files]]
path = "{root}/hk"
basename = "hk"
filename_mode = "time"
size_limit = 1024
age_limit = 60
move_directory = "{root}/downlink"
enabled = false
"#
    )
}

// ============================================================================
// Table parsing
// ============================================================================

#[test]
fn test_parse_filter_table() {
    let table = FilterTable::from_toml_str(FILTER_TABLE).expect("parse");

    assert_eq!(table.description(), "Flight filter table");
    assert_eq!(table.len(), 2);

    let entry = &table.entries()[table.lookup(MessageId(0x0801)).expect("entry")];
    let active: Vec<_> = entry.active_filters().map(|(_, f)| *f).collect();
    assert_eq!(active.len(), 2);
    assert_eq!((active[1].dest, active[1].n, active[1].x, active[1].o), (1, 1, 4, 2));

    let entry = &table.entries()[table.lookup(MessageId(0x0802)).expect("entry")];
    assert_eq!(entry.filters[0].kind, FilterKind::ByTime);
    assert_eq!(entry.filters[1].kind, FilterKind::Unused);
}

#[test]
fn test_parse_dest_table() {
    let table = DestinationTable::from_toml_str(&dest_table("/ram")).expect("parse");

    assert_eq!(table.len(), 2);
    assert_eq!(table.files[0].filename_mode, FilenameMode::Sequence);
    assert_eq!(table.files[0].sequence_count, 1);
    assert_eq!(table.files[1].filename_mode, FilenameMode::Time);
    assert_eq!(table.files[1].move_directory.as_deref(), Some("/ram/downlink"));
    assert!(!table.files[1].enabled);
    assert!(table.validate(99_999_999).is_ok());
}

#[test]
fn test_filter_table_survives_rewrite() {
    let table = FilterTable::from_toml_str(FILTER_TABLE).expect("parse");
    let text = table.to_toml_string().expect("render");
    let reparsed = FilterTable::from_toml_str(&text).expect("reparse");

    assert_eq!(reparsed, table);
}

#[test]
fn test_filter_n_greater_than_x_rejected() {
    let table = FilterTable::from_toml_str(
        r#"
[[packets]]
message_id = 1
filters = [{ dest = 0, kind = "by-count", n = 5, x = 4 }]
"#,
    )
    .expect("parse");

    assert!(matches!(
        table.validate(1),
        Err(ConfigError::InvalidFilterParms { n: 5, x: 4, .. })
    ));
}

#[test]
fn test_dest_limits_below_minimum_rejected() {
    let small = dest_table("/ram").replace("size_limit = 1024", "size_limit = 1000");
    let table = DestinationTable::from_toml_str(&small).expect("parse");
    assert!(table.validate(99_999_999).is_err());

    let young = dest_table("/ram").replace("age_limit = 60\n", "age_limit = 30\n");
    let table = DestinationTable::from_toml_str(&young).expect("parse");
    assert!(table.validate(99_999_999).is_err());
}

#[test]
fn test_missing_table_file() {
    let dir = tempdir().expect("tempdir");
    assert!(matches!(
        FilterTable::from_file(dir.path().join("missing.toml")),
        Err(ConfigError::Io(_))
    ));
}

// ============================================================================
// Files on disk
// ============================================================================

#[test]
fn test_config_and_tables_from_disk() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().display().to_string();
    fs::create_dir_all(dir.path().join("events")).expect("mkdir");

    let config_path = dir.path().join("ds.toml");
    fs::write(
        &config_path,
        r#"
secs_per_hk_cycle = 2
header = "none"
persist_enable_state = false
"#,
    )
    .expect("write config");
    let filter_path = dir.path().join("filter.toml");
    fs::write(&filter_path, FILTER_TABLE).expect("write filters");
    let dest_path = dir.path().join("dest.toml");
    fs::write(&dest_path, dest_table(&root)).expect("write dests");

    let config = EngineConfig::from_file(&config_path).expect("config");
    assert_eq!(config.header, HeaderKind::None);

    let mut engine = Engine::new(config, FsStorage::new()).expect("engine");
    engine
        .load_tables(
            FilterTable::from_file(&filter_path).expect("filters"),
            DestinationTable::from_file(&dest_path).expect("dests"),
        )
        .expect("load");

    engine.on_message(0x0801u32, &[5; 10]);
    // Slot 1 is disabled in the table.
    engine.on_message(0x0802u32, &[6; 10]);
    let report = engine.shutdown();

    assert_eq!(report.counters.file_writes, 1);
    assert_eq!(
        fs::read(dir.path().join("events/events_00000001.dat")).expect("read"),
        vec![5; 10]
    );
    assert!(!dir.path().join("hk").exists());
}

#[test]
fn test_invalid_config_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("ds.toml");
    fs::write(&path, "sequence_digits = 2\nmax_sequence_count = 1000\n").expect("write");

    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(ConfigError::Invalid(_))
    ));
}

// ============================================================================
// Packet feed
// ============================================================================

fn ccsds(stream_id: u16, data: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(6 + data.len());
    bytes.extend_from_slice(&stream_id.to_be_bytes());
    bytes.extend_from_slice(&0xC000u16.to_be_bytes());
    bytes.extend_from_slice(&((data.len() - 1) as u16).to_be_bytes());
    bytes.extend_from_slice(data);
    bytes
}

#[test]
fn test_feed_into_engine() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().display().to_string();
    fs::create_dir_all(dir.path().join("events")).expect("mkdir");

    let config = EngineConfig::builder()
        .header(HeaderKind::None)
        .persist_enable_state(false)
        .build();
    let mut engine = Engine::new(config, FsStorage::new()).expect("engine");
    engine
        .load_tables(
            FilterTable::from_toml_str(FILTER_TABLE).expect("filters"),
            DestinationTable::from_toml_str(&dest_table(&root)).expect("dests"),
        )
        .expect("load");

    let mut stream = Vec::new();
    for i in 0..3u8 {
        stream.extend(ccsds(0x0801, &[i; 4]));
        stream.extend(ccsds(0x0900, &[i; 4]));
    }
    for packet in PacketReader::new(Cursor::new(stream)) {
        engine.on_packet(&packet.expect("packet").as_packet());
    }
    let report = engine.shutdown();

    assert_eq!(report.counters.ignored_packets, 3);
    assert_eq!(report.counters.file_writes, 3);
    let written = fs::read(dir.path().join("events/events_00000001.dat")).expect("read");
    assert_eq!(written.len(), 3 * 10);
    assert_eq!(&written[..2], &[0x08, 0x01]);
}
