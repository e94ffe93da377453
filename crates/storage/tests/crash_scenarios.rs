//! Crash scenario tests
//!
//! Reproduce the on-disk states a process can leave behind when it dies
//! mid-operation, and check what reopening the log makes of them.

use std::fs::OpenOptions;
use std::io::Write;

use seglog_core::{LogConfig, Record};
use seglog_storage::Log;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Helper to create a closed log holding `count` records
fn create_log_with_data(dir: &std::path::Path, config: &LogConfig, count: usize) {
    let log = Log::open(dir, config.clone()).unwrap();
    for i in 0..count {
        log.append(Record::new(vec![i as u8; 20])).unwrap();
    }
    log.close().unwrap();
}

// === Index Padding Scenarios ===

#[test]
fn scenario_index_left_padded() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LogConfig::for_testing();
    create_log_with_data(dir.path(), &config, 5);

    // Re-pad the index as if the process died while it was mapped
    let index_path = dir.path().join("0.index");
    OpenOptions::new()
        .write(true)
        .open(&index_path)
        .unwrap()
        .set_len(1024)
        .unwrap();

    let log = Log::open(dir.path(), config).unwrap();
    assert_eq!(log.highest_offset(), 4);
    assert_eq!(log.read(4).unwrap().value, vec![4u8; 20]);
    assert_eq!(log.append(Record::new("next")).unwrap(), 5);
}

#[test]
fn scenario_torn_index_entry() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LogConfig::for_testing();
    create_log_with_data(dir.path(), &config, 3);

    // Half an entry written at the tail
    let index_path = dir.path().join("0.index");
    let mut file = OpenOptions::new().append(true).open(&index_path).unwrap();
    file.write_all(&[0, 0, 0, 3, 0, 0]).unwrap();
    drop(file);

    let log = Log::open(dir.path(), config).unwrap();
    assert_eq!(log.highest_offset(), 2);
    // Only whole entries count; the torn bytes are overwritten by the next append
    let reports = log.verify().unwrap();
    assert_eq!(reports[0].unindexed_frames, 0);
    assert!(reports[0].is_consistent());
}

// === Store Tail Scenarios ===

#[test]
fn scenario_orphan_store_frame() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LogConfig::for_testing();
    create_log_with_data(dir.path(), &config, 3);

    // A complete frame that never got its index entry
    let orphan = Record {
        value: b"orphan".to_vec(),
        offset: 3,
    }
    .encode()
    .unwrap();
    let store_path = dir.path().join("0.store");
    let mut file = OpenOptions::new().append(true).open(&store_path).unwrap();
    file.write_all(&(orphan.len() as u64).to_be_bytes()).unwrap();
    file.write_all(&orphan).unwrap();
    drop(file);

    let log = Log::open(dir.path(), config).unwrap();
    assert_eq!(log.highest_offset(), 2);
    assert!(log.read(3).unwrap_err().is_out_of_range());

    let report = &log.verify().unwrap()[0];
    assert_eq!(report.indexed_records, 3);
    assert_eq!(report.store_frames, 4);
    assert_eq!(report.unindexed_frames, 1);
    assert_eq!(report.torn_bytes, 0);
}

#[test]
fn scenario_torn_store_frame() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LogConfig::for_testing();
    create_log_with_data(dir.path(), &config, 3);

    // Header promising 500 bytes followed by only 10
    let store_path = dir.path().join("0.store");
    let mut file = OpenOptions::new().append(true).open(&store_path).unwrap();
    file.write_all(&500u64.to_be_bytes()).unwrap();
    file.write_all(&[0xAB; 10]).unwrap();
    drop(file);

    let log = Log::open(dir.path(), config).unwrap();
    for offset in 0..3 {
        assert_eq!(log.read(offset).unwrap().value, vec![offset as u8; 20]);
    }

    let report = &log.verify().unwrap()[0];
    assert_eq!(report.store_frames, 3);
    assert_eq!(report.torn_bytes, 18);
    assert!(!report.is_consistent());
}

// === Directory Scenarios ===

#[test]
fn scenario_foreign_files_in_directory() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LogConfig::for_testing();
    create_log_with_data(dir.path(), &config, 2);

    std::fs::write(dir.path().join("notes.txt"), b"not a segment").unwrap();
    std::fs::write(dir.path().join("garbage.store"), b"").unwrap();

    let log = Log::open(dir.path(), config).unwrap();
    assert_eq!(log.segment_base_offsets(), vec![0]);
    assert_eq!(log.highest_offset(), 1);
}

#[test]
fn scenario_store_without_index() {
    init_tracing();
    let dir = tempdir().unwrap();
    let config = LogConfig::new()
        .with_max_store_bytes(1 << 20)
        .with_max_index_bytes(24);
    create_log_with_data(dir.path(), &config, 4);

    // The newest segment lost its index file entirely
    std::fs::remove_file(dir.path().join("4.index")).unwrap();

    let log = Log::open(dir.path(), config).unwrap();
    assert_eq!(log.segment_base_offsets(), vec![0, 2, 4]);
    assert_eq!(log.highest_offset(), 3);
    assert_eq!(log.append(Record::new("after")).unwrap(), 4);
}
