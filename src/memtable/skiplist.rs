use rand::Rng;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Each level is promoted with probability 1/BRANCHING.
const BRANCHING: u32 = 4;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Pointers are indices into the arena (`SkipList::nodes`), so there is
/// no unsafe code and nodes stay packed together.
struct SkipNode<K, V> {
    key: K,
    value: V,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map, append-only: entries are inserted or
/// overwritten but never unlinked. The memtable is rebuilt on compaction
/// rather than shrunk in place.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
pub struct SkipList<K, V> {
    /// Forward pointers of the head sentinel, one per level.
    head: [Option<usize>; MAX_HEIGHT],
    nodes: Vec<SkipNode<K, V>>,
    /// Current max level in use (>= 1).
    height: usize,
}

impl<K: Ord, V> Default for SkipList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> SkipList<K, V> {
    /// Create a new empty skip list.
    pub fn new() -> Self {
        SkipList {
            head: [None; MAX_HEIGHT],
            nodes: Vec::new(),
            height: 1,
        }
    }

    /// Insert a key-value pair. Returns the previous value if the key
    /// already existed.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut prev = [None; MAX_HEIGHT];
        if let Some(idx) = self.find_greater_or_equal(&key, Some(&mut prev)) {
            if self.nodes[idx].key == key {
                return Some(std::mem::replace(&mut self.nodes[idx].value, value));
            }
        }

        let height = random_height();
        if height > self.height {
            // Levels above the old height hang off the head sentinel.
            for slot in prev.iter_mut().take(height).skip(self.height) {
                *slot = None;
            }
            self.height = height;
        }

        let idx = self.nodes.len();
        let forward = (0..height).map(|level| self.next_of(prev[level], level)).collect();
        self.nodes.push(SkipNode {
            key,
            value,
            forward,
        });

        for (level, pred) in prev.iter().enumerate().take(height) {
            match pred {
                None => self.head[level] = Some(idx),
                Some(p) => self.nodes[*p].forward[level] = Some(idx),
            }
        }
        None
    }

    /// Look up a key. Returns the value if found.
    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = self.find_greater_or_equal(key, None)?;
        let node = &self.nodes[idx];
        (node.key == *key).then_some(&node.value)
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate all entries in sorted order (level 0 holds every entry).
    pub fn iter(&self) -> SkipListIterator<'_, K, V> {
        SkipListIterator {
            list: self,
            current: self.head[0],
        }
    }

    /// Iterate from the first entry with key >= `key`.
    pub fn seek(&self, key: &K) -> SkipListIterator<'_, K, V> {
        SkipListIterator {
            list: self,
            current: self.find_greater_or_equal(key, None),
        }
    }

    fn next_of(&self, node: Option<usize>, level: usize) -> Option<usize> {
        match node {
            None => self.head[level],
            Some(idx) => self.nodes[idx].forward[level],
        }
    }

    /// Start at head, highest level; move forward while next key < target,
    /// drop a level, repeat. Records the predecessor at each level when
    /// `prev` is given (None = head sentinel).
    fn find_greater_or_equal(
        &self,
        key: &K,
        mut prev: Option<&mut [Option<usize>; MAX_HEIGHT]>,
    ) -> Option<usize> {
        let mut x: Option<usize> = None;
        let mut level = self.height - 1;
        loop {
            let next = self.next_of(x, level);
            match next {
                Some(n) if self.nodes[n].key < *key => x = Some(n),
                _ => {
                    if let Some(prev) = prev.as_deref_mut() {
                        prev[level] = x;
                    }
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }
}

/// Coin flip per level, capped at MAX_HEIGHT.
fn random_height() -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < MAX_HEIGHT && rng.gen_ratio(1, BRANCHING) {
        height += 1;
    }
    height
}

/// Iterator over skip list entries in sorted order.
///
/// Simply follows level 0 forward pointers.
pub struct SkipListIterator<'a, K, V> {
    list: &'a SkipList<K, V>,
    current: Option<usize>,
}

impl<'a, K, V> SkipListIterator<'a, K, V> {
    /// Whether the iterator is positioned at an entry.
    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    /// The entry the iterator is positioned at, without advancing.
    pub fn peek(&self) -> Option<(&'a K, &'a V)> {
        let list = self.list;
        self.current.map(|idx| {
            let node = &list.nodes[idx];
            (&node.key, &node.value)
        })
    }
}

impl<'a, K, V> Iterator for SkipListIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let list = self.list;
        let idx = self.current?;
        let node = &list.nodes[idx];
        self.current = node.forward[0];
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_height_in_bounds() {
        for _ in 0..1000 {
            let h = random_height();
            assert!((1..=MAX_HEIGHT).contains(&h));
        }
    }

    #[test]
    fn seek_past_end_is_invalid() {
        let mut sl = SkipList::new();
        sl.insert(1u32, "a");
        assert!(!sl.seek(&2).is_valid());
        assert_eq!(sl.seek(&0).peek(), Some((&1, &"a")));
    }
}
