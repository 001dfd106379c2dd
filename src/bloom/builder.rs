use crate::bloom::BloomFilter;

/// Collects key hashes while an SSTable is written, then sizes the filter
/// for the exact key count once the table is finished.
///
/// Compaction doesn't know up front how many keys survive tombstone and TTL
/// filtering, so keys are buffered and the filter is built at `build()`.
pub struct BloomFilterBuilder {
    keys: Vec<Vec<u8>>,
    false_positive_rate: f64,
}

impl BloomFilterBuilder {
    /// Create a builder expecting approximately `estimated_keys` keys.
    pub fn new(estimated_keys: usize, false_positive_rate: f64) -> Self {
        BloomFilterBuilder {
            keys: Vec::with_capacity(estimated_keys),
            false_positive_rate,
        }
    }

    /// Add a key to the bloom filter being built.
    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    /// Finalize and return the bloom filter.
    pub fn build(self) -> BloomFilter {
        let mut filter = BloomFilter::new(self.keys.len().max(1), self.false_positive_rate);
        for key in &self.keys {
            filter.insert(key);
        }
        filter
    }
}
