// WAL reader: replaying records for crash recovery.

use task_state::wal::reader::WALReader;
use task_state::wal::writer::WALWriter;
use task_state::wal::{SyncPolicy, WALOp, WALRecord};

fn record(i: usize) -> WALRecord {
    WALRecord::new(
        i as u64 + 1,
        vec![WALOp::put(
            format!("key{}", i).into_bytes(),
            format!("val{}", i).into_bytes(),
            None,
        )],
    )
}

/// Helper: write N single-put records to a WAL file, return the path.
fn write_test_wal(dir: &tempfile::TempDir, count: usize) -> std::path::PathBuf {
    let path = dir.path().join("wal.log");
    let mut writer = WALWriter::new(&path, SyncPolicy::EveryWrite).unwrap();
    for i in 0..count {
        writer.append(&record(i)).unwrap();
    }
    writer.sync().unwrap();
    path
}

// =============================================================================
// Test 1: Write 5 records, read all 5 back
// =============================================================================
#[test]
fn read_all_records_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_test_wal(&dir, 5);

    let reader = WALReader::new(&path).unwrap();
    let mut iter = reader.iter();
    let records: Vec<WALRecord> = iter.by_ref().collect();

    assert_eq!(records, (0..5).map(record).collect::<Vec<_>>());
    assert!(!iter.is_damaged());
    assert_eq!(iter.valid_len(), reader.len());
}

// =============================================================================
// Test 2: Truncate file mid-record → yields first 4, stops at 5th
// =============================================================================
#[test]
fn truncated_last_record_yields_preceding() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_test_wal(&dir, 5);

    // Chop off last few bytes to simulate crash mid-write
    let file_len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(file_len - 3).unwrap();

    let reader = WALReader::new(&path).unwrap();
    let mut iter = reader.iter();
    let records: Vec<WALRecord> = iter.by_ref().collect();

    assert_eq!(records.len(), 4);
    assert!(iter.is_damaged());
    let intact: usize = records.iter().map(WALRecord::encoded_size).sum();
    assert_eq!(iter.valid_len(), intact);
}

// =============================================================================
// Test 3: Corrupt CRC of record 3 → yields records 1-2, stops
// =============================================================================
#[test]
fn corrupt_crc_stops_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_test_wal(&dir, 5);

    let mut data = std::fs::read(&path).unwrap();
    let record_size = record(0).encoded_size();
    // Flip a byte in the third record's body.
    data[2 * record_size + 12] ^= 0xFF;
    std::fs::write(&path, &data).unwrap();

    let reader = WALReader::new(&path).unwrap();
    let records: Vec<WALRecord> = reader.iter().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].ops[0].key, b"key1");
}

// =============================================================================
// Test 4: Empty WAL file → iterator immediately exhausted
// =============================================================================
#[test]
fn empty_wal_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    std::fs::File::create(&path).unwrap();

    let reader = WALReader::new(&path).unwrap();
    assert!(reader.is_empty());
    assert_eq!(reader.iter().count(), 0);
}

// =============================================================================
// Test 5: Partial first record → yields nothing
// =============================================================================
#[test]
fn partial_first_record_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let encoded = record(0).encode();
    std::fs::write(&path, &encoded[..encoded.len() - 1]).unwrap();

    let reader = WALReader::new(&path).unwrap();
    let mut iter = reader.iter();
    assert!(iter.next().is_none());
    assert!(iter.is_damaged());
    assert_eq!(iter.valid_len(), 0);
}
