// Store cursors: look-ahead iteration over [from, to).

mod common;

use common::{Scratch, open_disk_store, open_memory_store, open_store};
use task_state::{Entry, Error, StoreConfig};

// =============================================================================
// Test 1: has_next / next_entry walk the range, then NoSuchElement
// =============================================================================
#[test]
fn walks_range_then_reports_exhaustion() {
    let scratch = Scratch::new();
    let store = open_disk_store(&scratch);
    for key in ["a", "b", "c", "d"] {
        store.put(key.as_bytes(), Some(key.to_uppercase().as_bytes())).unwrap();
    }

    let mut cursor = store.range(b"b", b"d").unwrap();
    assert!(cursor.has_next().unwrap());
    assert_eq!(cursor.next_entry().unwrap(), Entry::new(b"b".to_vec(), b"B".to_vec()));
    assert!(cursor.has_next().unwrap());
    assert_eq!(cursor.next_entry().unwrap(), Entry::new(b"c".to_vec(), b"C".to_vec()));
    assert!(!cursor.has_next().unwrap());
    assert!(matches!(cursor.next_entry(), Err(Error::NoSuchElement)));
    // Asking again does not change the answer.
    assert!(!cursor.has_next().unwrap());
    cursor.close();
}

// =============================================================================
// Test 2: After close, everything but close fails with IteratorClosed
// =============================================================================
#[test]
fn closed_cursor_rejects_calls() {
    let scratch = Scratch::new();
    let store = open_disk_store(&scratch);
    store.put(b"a", Some(b"1")).unwrap();

    let mut cursor = store.all().unwrap();
    cursor.close();
    assert!(cursor.is_closed());
    assert!(matches!(cursor.has_next(), Err(Error::IteratorClosed)));
    assert!(matches!(cursor.next_entry(), Err(Error::IteratorClosed)));
    assert!(matches!(cursor.next(), Some(Err(Error::IteratorClosed))));
    // Idempotent.
    cursor.close();
}

// =============================================================================
// Test 3: remove is never supported
// =============================================================================
#[test]
fn remove_is_unsupported() {
    let scratch = Scratch::new();
    let store = open_disk_store(&scratch);
    store.put(b"a", Some(b"1")).unwrap();

    let mut cursor = store.all().unwrap();
    assert!(matches!(cursor.remove(), Err(Error::UnsupportedOperation(_))));
    // The cursor is unaffected.
    assert_eq!(cursor.next_entry().unwrap().key, b"a");
}

// =============================================================================
// Test 4: A cursor reads the state as of its creation
// =============================================================================
#[test]
fn cursor_ignores_writes_after_creation() {
    let scratch = Scratch::new();
    let store = open_disk_store(&scratch);
    store.put(b"a", Some(b"1")).unwrap();
    store.put(b"c", Some(b"3")).unwrap();

    let cursor = store.all().unwrap();
    store.put(b"b", Some(b"2")).unwrap();
    store.delete(b"c").unwrap();
    store.put(b"a", Some(b"changed")).unwrap();

    let seen: Vec<Entry> = cursor.map(Result::unwrap).collect();
    assert_eq!(
        seen,
        vec![
            Entry::new(b"a".to_vec(), b"1".to_vec()),
            Entry::new(b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

// =============================================================================
// Test 5: Cursors merge the table with newer memtable versions
// =============================================================================
#[test]
fn cursor_merges_table_and_memtable() {
    let scratch = Scratch::new();
    // Without auto-compaction, close folds everything into the table.
    let config = StoreConfig::from_properties([("compaction.auto", "false")]).unwrap();
    {
        let (store, _) = open_store(&scratch, config.clone());
        store.put(b"a", Some(b"old")).unwrap();
        store.put(b"b", Some(b"2")).unwrap();
        store.put(b"d", Some(b"4")).unwrap();
        store.close().unwrap();
    }

    let (store, _) = open_store(&scratch, config);
    store.put(b"a", Some(b"new")).unwrap();
    store.delete(b"b").unwrap();
    store.put(b"c", Some(b"3")).unwrap();

    let entries: Vec<Entry> = store.all().unwrap().map(Result::unwrap).collect();
    assert_eq!(
        entries,
        vec![
            Entry::new(b"a".to_vec(), b"new".to_vec()),
            Entry::new(b"c".to_vec(), b"3".to_vec()),
            Entry::new(b"d".to_vec(), b"4".to_vec()),
        ]
    );
}

// =============================================================================
// Test 6: Binary keys order as unsigned bytes; prefixes sort first
// =============================================================================
#[test]
fn binary_keys_use_unsigned_lexicographic_order() {
    let scratch = Scratch::new();
    let store = open_memory_store(&scratch);
    let keys: [&[u8]; 5] = [&[0xFF], &[0x00, 0x01], &[0x00], &[0x7F, 0xFF], &[0x80]];
    for key in keys {
        store.put(key, Some(b"v")).unwrap();
    }

    let ordered: Vec<Vec<u8>> = store.all().unwrap().map(|e| e.unwrap().key).collect();
    assert_eq!(
        ordered,
        vec![vec![0x00], vec![0x00, 0x01], vec![0x7F, 0xFF], vec![0x80], vec![0xFF]]
    );

    let bounded: Vec<Vec<u8>> = store
        .range(&[0x00, 0x01], &[0x80])
        .unwrap()
        .map(|e| e.unwrap().key)
        .collect();
    assert_eq!(bounded, vec![vec![0x00, 0x01], vec![0x7F, 0xFF]]);
}

// =============================================================================
// Test 7: Closing the store invalidates open cursors
// =============================================================================
#[test]
fn cursor_fails_once_store_is_closed() {
    let scratch = Scratch::new();
    let store = open_disk_store(&scratch);
    store.put(b"a", Some(b"1")).unwrap();
    store.put(b"b", Some(b"2")).unwrap();

    let mut cursor = store.all().unwrap();
    store.close().unwrap();
    // Advancing past the buffered entry needs the engine.
    assert!(matches!(cursor.next_entry(), Err(Error::EngineClosed)));
}

// =============================================================================
// Test 8: A failed advance keeps the cursor on the entry it could not leave
// =============================================================================
#[test]
fn failed_advance_keeps_cursor_on_current_entry() {
    let scratch = Scratch::new();
    let config =
        StoreConfig::from_properties([("wal.enabled", "false"), ("block.size.bytes", "64")])
            .unwrap();
    let (store, _) = open_store(&scratch, config);
    let expected: Vec<(String, String)> = (0..40)
        .map(|i| (format!("key{i:03}"), format!("value{i:03}")))
        .collect();
    for (key, value) in &expected {
        store.put(key.as_bytes(), Some(value.as_bytes())).unwrap();
    }
    // Folds everything into a table of many small blocks.
    store.flush().unwrap();

    let table = scratch.store_dir().join("data.sst");
    let bytes = std::fs::read(&table).unwrap();
    let mut cursor = store.all().unwrap();
    let mut seen = vec![cursor.next_entry().unwrap()];

    // Blocks not yet read now fail to load.
    std::fs::OpenOptions::new()
        .write(true)
        .open(&table)
        .unwrap()
        .set_len(0)
        .unwrap();
    let failure = loop {
        match cursor.next_entry() {
            Ok(entry) => seen.push(entry),
            Err(err) => break err,
        }
    };
    assert!(matches!(failure, Error::Io(_)), "{failure}");
    assert!(cursor.has_next().unwrap());

    // Once the table reads again, nothing was skipped.
    std::fs::write(&table, &bytes).unwrap();
    while cursor.has_next().unwrap() {
        seen.push(cursor.next_entry().unwrap());
    }
    let seen: Vec<(String, String)> = seen
        .into_iter()
        .map(|Entry { key, value }| {
            (
                String::from_utf8(key).unwrap(),
                String::from_utf8(value).unwrap(),
            )
        })
        .collect();
    assert_eq!(seen, expected);
}
