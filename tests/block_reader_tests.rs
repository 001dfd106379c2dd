// Block reader: decoding and binary search.

use task_state::sstable::TableEntry;
use task_state::sstable::block::builder::BlockBuilder;
use task_state::sstable::block::reader::Block;

// Helper: build and decode a block from (key, value) pairs.
fn block_of(entries: &[(&[u8], &[u8])]) -> Block {
    let mut builder = BlockBuilder::new(4096);
    for (k, v) in entries {
        assert!(builder.add(k, v, None), "entry should fit in test block");
    }
    Block::decode(builder.build()).expect("decode should succeed")
}

fn value(entry: Option<TableEntry>) -> Option<Vec<u8>> {
    entry.map(|e| e.value)
}

// =============================================================================
// Test 1: Build then decode keeps every entry in order
// =============================================================================
#[test]
fn roundtrip_build_and_decode() {
    let block = block_of(&[
        (b"apple", b"red"),
        (b"banana", b"yellow"),
        (b"cherry", b"dark_red"),
    ]);
    assert_eq!(block.len(), 3);
    let keys: Vec<Vec<u8>> = (0..block.len()).map(|i| block.entry(i).key).collect();
    assert_eq!(keys, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
}

// =============================================================================
// Test 2: get() on existing and missing keys
// =============================================================================
#[test]
fn get_existing_and_missing_keys() {
    let block = block_of(&[
        (b"ant", b"tiny"),
        (b"bat", b"wings"),
        (b"cat", b"meow"),
        (b"dog", b"woof"),
        (b"elk", b"antlers"),
    ]);

    assert_eq!(value(block.get(b"ant")), Some(b"tiny".to_vec()));
    assert_eq!(value(block.get(b"cat")), Some(b"meow".to_vec()));
    assert_eq!(value(block.get(b"elk")), Some(b"antlers".to_vec()));
    assert_eq!(value(block.get(b"aaa")), None);
    assert_eq!(value(block.get(b"cow")), None);
    assert_eq!(value(block.get(b"zebra")), None);
}

// =============================================================================
// Test 3: seek() inclusive vs exclusive
// =============================================================================
#[test]
fn seek_inclusive_and_exclusive() {
    let block = block_of(&[(b"b", b"1"), (b"d", b"2"), (b"f", b"3")]);

    assert_eq!(block.seek(b"a", true), 0);
    assert_eq!(block.seek(b"d", true), 1);
    assert_eq!(block.seek(b"d", false), 2);
    assert_eq!(block.seek(b"e", true), 2);
    assert_eq!(block.seek(b"f", false), 3);
    assert_eq!(block.seek(b"z", true), block.len());
}

// =============================================================================
// Test 4: Expiry survives the round trip
// =============================================================================
#[test]
fn expiry_round_trips() {
    let mut builder = BlockBuilder::new(4096);
    builder.add(b"forever", b"v", None);
    builder.add(b"session", b"v", Some(42_000));
    let block = Block::decode(builder.build()).unwrap();

    assert_eq!(block.entry(0).expires_at, None);
    let session = block.entry(1);
    assert_eq!(session.expires_at, Some(42_000));
    assert!(!session.is_expired(41_999));
    assert!(session.is_expired(42_000));
}

// =============================================================================
// Test 5: Empty block decodes to zero entries
// =============================================================================
#[test]
fn empty_block_decodes() {
    let block = Block::decode(BlockBuilder::new(4096).build()).unwrap();
    assert!(block.is_empty());
    assert_eq!(value(block.get(b"any")), None);
    assert_eq!(block.seek(b"any", true), 0);
}

// =============================================================================
// Test 6: Damaged blocks are rejected
// =============================================================================
#[test]
fn damaged_block_is_corruption() {
    assert!(Block::decode(vec![1, 2]).is_err());

    // Count claims more offsets than the block holds.
    assert!(Block::decode(1000u32.to_le_bytes().to_vec()).is_err());

    // Key length pointing past the data region.
    let mut builder = BlockBuilder::new(4096);
    builder.add(b"key", b"value", None);
    let mut data = builder.build();
    data[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(Block::decode(data).is_err());
}
