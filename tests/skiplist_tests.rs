// Skip list: insert, lookup and ordered seeks.
//
// Note: files in tests/ are integration tests: they see the crate as an
// external consumer. No need for #[cfg(test)] or inner mod.

use task_state::memtable::skiplist::SkipList;

// =============================================================================
// Test 1: Insert one key, get it back
// =============================================================================
#[test]
fn insert_one_key_get_it_back() {
    let mut sl = SkipList::new();
    sl.insert(b"hello".to_vec(), b"world".to_vec());
    assert_eq!(sl.get(&b"hello".to_vec()), Some(&b"world".to_vec()));
}

// =============================================================================
// Test 2: Keys inserted out of order are found
// =============================================================================
#[test]
fn insert_two_keys_out_of_order() {
    let mut sl = SkipList::new();
    sl.insert(b"b".to_vec(), 2);
    sl.insert(b"a".to_vec(), 1);
    assert_eq!(sl.get(&b"a".to_vec()), Some(&1));
    assert_eq!(sl.get(&b"b".to_vec()), Some(&2));
}

// =============================================================================
// Test 3: Duplicate key overwrites and returns the old value
// =============================================================================
#[test]
fn insert_duplicate_key_overwrites() {
    let mut sl = SkipList::new();
    assert_eq!(sl.insert(b"key".to_vec(), "old"), None);
    assert_eq!(sl.insert(b"key".to_vec(), "new"), Some("old"));
    assert_eq!(sl.get(&b"key".to_vec()), Some(&"new"));
    assert_eq!(sl.len(), 1);
}

// =============================================================================
// Test 4: Missing key
// =============================================================================
#[test]
fn get_nonexistent_key_returns_none() {
    let mut sl = SkipList::new();
    sl.insert(b"a".to_vec(), 1);
    assert_eq!(sl.get(&b"z".to_vec()), None);
}

// =============================================================================
// Test 5: 1000 keys, iteration comes out sorted
// =============================================================================
#[test]
fn insert_1000_keys_iterate_sorted() {
    let mut sl = SkipList::new();
    // Insert in a scrambled order.
    for i in 0..1000u32 {
        let n = (i * 7919) % 1000;
        sl.insert(format!("key_{n:05}").into_bytes(), n);
    }
    assert_eq!(sl.len(), 1000);

    let keys: Vec<&Vec<u8>> = sl.iter().map(|(k, _)| k).collect();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    for i in 0..1000u32 {
        assert_eq!(sl.get(&format!("key_{i:05}").into_bytes()), Some(&i));
    }
}

// =============================================================================
// Test 6: Seek lands on the first key >= target
// =============================================================================
#[test]
fn seek_lands_on_first_key_at_or_after_target() {
    let mut sl = SkipList::new();
    for key in ["b", "d", "f"] {
        sl.insert(key.as_bytes().to_vec(), ());
    }

    let first = |target: &str| sl.seek(&target.as_bytes().to_vec()).peek().map(|(k, _)| k.clone());
    assert_eq!(first("a"), Some(b"b".to_vec()));
    assert_eq!(first("d"), Some(b"d".to_vec()));
    assert_eq!(first("e"), Some(b"f".to_vec()));
    assert_eq!(first("g"), None);
}

// =============================================================================
// Test 7: Empty skip list
// =============================================================================
#[test]
fn empty_skiplist_behavior() {
    let sl: SkipList<Vec<u8>, u32> = SkipList::new();
    assert_eq!(sl.get(&b"anything".to_vec()), None);
    assert_eq!(sl.len(), 0);
    assert!(sl.is_empty());
    assert!(!sl.iter().is_valid());
}
