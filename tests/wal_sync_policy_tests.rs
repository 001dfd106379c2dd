// WAL sync policies and log rewrite.

use task_state::wal::reader::WALReader;
use task_state::wal::writer::{WALWriter, rewrite};
use task_state::wal::{RecordType, SyncPolicy, WALOp, WALRecord};

fn make_record(i: usize) -> WALRecord {
    WALRecord::new(
        i as u64 + 1,
        vec![WALOp::put(
            format!("key{}", i).into_bytes(),
            format!("val{}", i).into_bytes(),
            None,
        )],
    )
}

// =============================================================================
// Test 1: EveryWrite: counter resets after every append
// =============================================================================
#[test]
fn every_write_syncs_after_each_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let mut writer = WALWriter::new(&path, SyncPolicy::EveryWrite).unwrap();

    assert_eq!(writer.writes_since_sync(), 0);
    for i in 0..3 {
        writer.append(&make_record(i)).unwrap();
        assert_eq!(writer.writes_since_sync(), 0, "should reset after every write");
    }
}

// =============================================================================
// Test 2: EveryNWrites(3): counter accumulates, resets on 3rd write
// =============================================================================
#[test]
fn every_n_writes_syncs_after_nth_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let mut writer = WALWriter::new(&path, SyncPolicy::EveryNWrites(3)).unwrap();

    writer.append(&make_record(0)).unwrap();
    assert_eq!(writer.writes_since_sync(), 1, "no sync yet");
    writer.append(&make_record(1)).unwrap();
    assert_eq!(writer.writes_since_sync(), 2, "no sync yet");
    writer.append(&make_record(2)).unwrap();
    assert_eq!(writer.writes_since_sync(), 0, "should reset after 3rd write");

    writer.append(&make_record(3)).unwrap();
    assert_eq!(writer.writes_since_sync(), 1, "new batch started");
}

// =============================================================================
// Test 3: EveryNMillis: a long window defers the fsync, sync() forces it
// =============================================================================
#[test]
fn every_n_millis_defers_until_window_or_explicit_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let mut writer = WALWriter::new(&path, SyncPolicy::EveryNMillis(60_000)).unwrap();

    writer.append(&make_record(0)).unwrap();
    writer.append(&make_record(1)).unwrap();
    assert_eq!(writer.writes_since_sync(), 2);

    writer.sync().unwrap();
    assert_eq!(writer.writes_since_sync(), 0);

    let zero = dir.path().join("zero.log");
    let mut eager = WALWriter::new(&zero, SyncPolicy::EveryNMillis(0)).unwrap();
    eager.append(&make_record(0)).unwrap();
    assert_eq!(eager.writes_since_sync(), 0, "a zero window syncs every append");
}

// =============================================================================
// Test 4: All policies produce readable WAL files
// =============================================================================
#[test]
fn all_policies_produce_readable_files() {
    let policies = vec![
        SyncPolicy::EveryWrite,
        SyncPolicy::EveryNWrites(2),
        SyncPolicy::EveryNMillis(1000),
    ];

    for (idx, policy) in policies.into_iter().enumerate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("wal_{}.log", idx));

        {
            let mut writer = WALWriter::new(&path, policy).unwrap();
            for i in 0..5 {
                writer.append(&make_record(i)).unwrap();
            }
            writer.sync().unwrap();
        }

        let reader = WALReader::new(&path).unwrap();
        let records: Vec<WALRecord> = reader.iter().collect();

        assert_eq!(records.len(), 5, "policy {:?} should produce 5 readable records", policy);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.ops[0].record_type, RecordType::Put);
            assert_eq!(record.ops[0].key, format!("key{}", i).as_bytes());
        }
    }
}

// =============================================================================
// Test 5: Policy names parse and print
// =============================================================================
#[test]
fn policy_names_round_trip() {
    for policy in [
        SyncPolicy::EveryWrite,
        SyncPolicy::EveryNWrites(16),
        SyncPolicy::EveryNMillis(250),
    ] {
        assert_eq!(policy.to_string().parse::<SyncPolicy>().unwrap(), policy);
    }
    assert!("every-n-writes:0".parse::<SyncPolicy>().is_err());
    assert!("every-n-writes:x".parse::<SyncPolicy>().is_err());
    assert!("hourly".parse::<SyncPolicy>().is_err());
}

// =============================================================================
// Test 6: Rewrite replaces the log and keeps appending after it
// =============================================================================
#[test]
fn rewrite_replaces_log_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    {
        let mut writer = WALWriter::new(&path, SyncPolicy::EveryWrite).unwrap();
        for i in 0..10 {
            writer.append(&make_record(i)).unwrap();
        }
    }

    let kept = vec![make_record(8), make_record(9)];
    let mut writer = rewrite(&path, &kept, SyncPolicy::EveryWrite).unwrap();
    assert!(!dir.path().join("wal.log.tmp").exists());
    writer.append(&make_record(10)).unwrap();

    let reader = WALReader::new(&path).unwrap();
    let sequences: Vec<u64> = reader.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![9, 10, 11]);
}
