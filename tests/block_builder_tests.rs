// Block builder: sorted entries packed into fixed-size blocks.

use task_state::sstable::block::builder::{BlockBuilder, ENTRY_HEADER_SIZE};

// =============================================================================
// Test 1: Empty block is just the entry count
// =============================================================================
#[test]
fn build_empty_block() {
    let builder = BlockBuilder::new(4096);
    assert!(builder.is_empty());
    assert_eq!(builder.build(), 0u32.to_le_bytes().to_vec());
}

// =============================================================================
// Test 2: One entry: header + key + value + offset + count
// =============================================================================
#[test]
fn add_one_entry_and_build() {
    let mut builder = BlockBuilder::new(4096);
    assert!(builder.add(b"key1", b"value1", None));
    assert!(!builder.is_empty());

    let expected = ENTRY_HEADER_SIZE + 4 + 6 + 4 + 4;
    assert_eq!(builder.estimated_size(), expected);
    assert_eq!(builder.build().len(), expected);
}

// =============================================================================
// Test 3: Expiry is stored in the entry header
// =============================================================================
#[test]
fn expiry_is_encoded_in_header() {
    let mut builder = BlockBuilder::new(4096);
    assert!(builder.add(b"k", b"v", Some(0x0102_0304)));
    let block = builder.build();

    // [key_len][val_len][expires]
    assert_eq!(&block[0..4], &1u32.to_le_bytes());
    assert_eq!(&block[4..8], &1u32.to_le_bytes());
    assert_eq!(&block[8..16], &0x0102_0304u64.to_le_bytes());
}

// =============================================================================
// Test 4: Entry that overflows the block is rejected
// =============================================================================
#[test]
fn block_full_returns_false() {
    let mut builder = BlockBuilder::new(64);
    assert!(builder.add(b"a", b"b", None));

    let big_value = vec![0u8; 64];
    assert!(!builder.add(b"c", &big_value, None), "should reject when block is full");
    // A small one still fits.
    assert!(builder.add(b"d", b"e", None));
}

// =============================================================================
// Test 5: First entry is always accepted, even oversized
// =============================================================================
#[test]
fn oversized_first_entry_is_accepted() {
    let mut builder = BlockBuilder::new(128);
    let window_buffer = vec![7u8; 100_000];
    assert!(builder.add(b"window", &window_buffer, None));
    assert!(builder.build().len() > 100_000);
}

// =============================================================================
// Test 6: Filled block stays within target size
// =============================================================================
#[test]
fn block_size_within_target() {
    let target = 4096;
    let mut builder = BlockBuilder::new(target);

    let mut added = 0u32;
    while builder.add(
        format!("key_{added:06}").as_bytes(),
        format!("value_{added:06}").as_bytes(),
        None,
    ) {
        added += 1;
    }

    assert!(added > 1);
    let block = builder.build();
    assert!(block.len() <= target, "block {} > target {}", block.len(), target);
}
