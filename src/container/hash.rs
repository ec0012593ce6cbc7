use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Mutex;

use log::debug;

/// A small unordered bag of key/value pairs that occupies one or more
/// directory slots. A bucket of local depth d collects every key agreeing
/// with it on the low d bits of the hash; linear scan is enough because the
/// capacity stays small.
struct Bucket<K, V> {
    items: Vec<(K, V)>,
    /// number of hash bits that uniquely identify this bucket.
    depth: usize,
    capacity: usize,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(depth: usize, capacity: usize) -> Self {
        Bucket { items: Vec::with_capacity(capacity), depth, capacity }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(i) => {
                self.items.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Insert the pair. An existing key is overwritten even when the bucket
    /// is full; a full bucket refuses a new key and hands the pair back to
    /// the caller for the split path.
    fn insert(&mut self, key: K, value: V) -> Result<(), (K, V)> {
        if let Some(item) = self.items.iter_mut().find(|(k, _)| *k == key) {
            item.1 = value;
            return Ok(());
        }
        if self.is_full() {
            return Err((key, value));
        }
        self.items.push((key, value));
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

/// ExtendibleHashTable implements an associative K to V mapping with dynamic
/// bucket splitting, the shape a buffer pool uses for its page table.
///
/// A directory of 2^global_depth slots maps the low-order bits of a key's
/// hash to a bucket; each bucket carries a local depth and is aliased by
/// every slot agreeing with it on that many low bits. A full bucket splits
/// into two on insert, doubling the directory first when the bucket already
/// consumes all global_depth bits. The directory only ever grows, buckets
/// are never merged back.
///
/// Buckets live in an arena and the directory stores arena indices, so
/// doubling the directory just duplicates indices and bucket identity is
/// index equality.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    /// maps the masked hash to a bucket in the arena. multiple slots may
    /// alias the same bucket.
    directory: Vec<usize>,
    /// bucket arena. buckets are created at construction and on split and
    /// never destroyed, so the arena length is the live bucket count.
    buckets: Vec<Bucket<K, V>>,
    global_depth: usize,
    bucket_size: usize,
    hasher: S,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    /// Create a table with a caller-supplied hasher. The hasher must be
    /// deterministic for the lifetime of the table.
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket size should be larger than zero");
        ExtendibleHashTable {
            directory: vec![0],
            buckets: vec![Bucket::new(0, bucket_size)],
            global_depth: 0,
            bucket_size,
            hasher,
        }
    }

    /// The directory slot owning the key under the current global depth.
    fn index_of(&self, key: &K) -> usize {
        let mask = (1usize << self.global_depth) - 1;
        self.hasher.hash_one(key) as usize & mask
    }

    /// Look up the current value for the key, if any.
    pub fn find(&self, key: &K) -> Option<V> {
        let index = self.index_of(key);
        self.buckets[self.directory[index]].find(key).cloned()
    }

    /// Delete the key from the table. Return true iff the key was present.
    pub fn remove(&mut self, key: &K) -> bool {
        let index = self.index_of(key);
        let bucket = self.directory[index];
        self.buckets[bucket].remove(key)
    }

    /// Insert the pair, overwriting any prior mapping for the key.
    ///
    /// Keeps splitting the target bucket until it accepts the pair. One
    /// split is usually enough; when every item rehashes into the same
    /// child the loop splits again with one more hash bit in play.
    pub fn insert(&mut self, key: K, value: V) {
        let (mut key, mut value) = (key, value);
        loop {
            let index = self.index_of(&key);
            let bucket = self.directory[index];
            match self.buckets[bucket].insert(key, value) {
                Ok(()) => return,
                Err(refused) => (key, value) = refused,
            }
            self.split(index);
        }
    }

    /// Split the bucket behind directory slot `index`, doubling the
    /// directory first if the bucket already uses every global bit.
    fn split(&mut self, index: usize) {
        let old = self.directory[index];
        if self.buckets[old].depth == self.global_depth {
            // double the directory: new slot i + old_size mirrors slot i,
            // which keeps every alias chain intact.
            self.directory.extend_from_within(..);
            self.global_depth += 1;
            debug!("directory doubled, global depth is {}", self.global_depth);
        }

        let depth = self.buckets[old].depth;
        self.buckets[old].depth = depth + 1;
        let new = self.buckets.len();
        self.buckets.push(Bucket::new(depth + 1, self.bucket_size));

        // rebind every slot aliasing the old bucket whose newly significant
        // bit is set.
        let bit = 1usize << depth;
        for (i, slot) in self.directory.iter_mut().enumerate() {
            if *slot == old && i & bit != 0 {
                *slot = new;
            }
        }

        // move the items whose slot now resolves to the new bucket. the move
        // is unconditional so the split never drops an item; a child that
        // ends up over capacity is split again by the insert loop.
        let items = std::mem::take(&mut self.buckets[old].items);
        for (key, value) in items {
            let slot = self.directory[self.index_of(&key)];
            self.buckets[slot].items.push((key, value));
        }
        debug!("bucket split, {} buckets with local depth {}", self.buckets.len(), depth + 1);
    }

    /// Number of low-order hash bits consulted for lookup.
    pub fn global_depth(&self) -> usize {
        self.global_depth
    }

    /// Local depth of the bucket referenced by directory slot `index`.
    pub fn local_depth(&self, index: usize) -> usize {
        self.buckets[self.directory[index]].depth
    }

    /// Count of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

/// SyncExtendibleHashTable implements the thread-safe version of the table,
/// basically all the heavy lifting are happens in the ExtendibleHashTable.
/// Every operation takes the table-wide latch for its full duration.
pub struct SyncExtendibleHashTable<K, V, S = RandomState> {
    inner: Mutex<ExtendibleHashTable<K, V, S>>,
}

impl<K: Hash + Eq, V: Clone> SyncExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Self {
        let inner = Mutex::new(ExtendibleHashTable::new(bucket_size));
        SyncExtendibleHashTable { inner }
    }
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> SyncExtendibleHashTable<K, V, S> {
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        let inner = Mutex::new(ExtendibleHashTable::with_hasher(bucket_size, hasher));
        SyncExtendibleHashTable { inner }
    }

    /// Look up the current value for the key, if any.
    pub fn find(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock().unwrap();
        guard.find(key)
    }

    /// Insert the pair, overwriting any prior mapping for the key.
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(key, value)
    }

    /// Delete the key from the table. Return true iff the key was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(key)
    }

    /// Number of low-order hash bits consulted for lookup.
    pub fn global_depth(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.global_depth()
    }

    /// Local depth of the bucket referenced by directory slot `index`.
    pub fn local_depth(&self, index: usize) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.local_depth(index)
    }

    /// Count of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.num_buckets()
    }
}

#[cfg(test)]
impl<K: Hash + Eq, V: Clone, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    /// Check the structural invariants: directory size tracks global depth,
    /// alias chains agree on the low local-depth bits with the right alias
    /// count, every item resolves back to its own bucket, capacity is
    /// respected and keys are unique.
    fn check_invariants(&self) {
        use std::collections::HashSet;

        assert_eq!(1usize << self.global_depth, self.directory.len());

        let mut canonical = vec![None; self.buckets.len()];
        let mut aliases = vec![0usize; self.buckets.len()];
        for (i, &b) in self.directory.iter().enumerate() {
            let depth = self.buckets[b].depth;
            assert!(depth <= self.global_depth);
            let low = i & ((1usize << depth) - 1);
            match canonical[b] {
                None => canonical[b] = Some(low),
                Some(expect) => assert_eq!(expect, low),
            }
            aliases[b] += 1;
        }
        for (b, bucket) in self.buckets.iter().enumerate() {
            assert_eq!(1usize << (self.global_depth - bucket.depth), aliases[b]);
            assert!(bucket.items.len() <= self.bucket_size);
        }

        let mut seen = HashSet::new();
        for (b, bucket) in self.buckets.iter().enumerate() {
            for (key, _) in &bucket.items {
                assert_eq!(b, self.directory[self.index_of(key)]);
                assert!(seen.insert(key));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::hash::Hasher;

    use rand::Rng;

    use super::*;

    /// Hashes a u64 key to itself so tests can steer keys into known
    /// directory slots.
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, _bytes: &[u8]) {
            unimplemented!("test keys are u64");
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    struct IdentityState;

    impl BuildHasher for IdentityState {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> IdentityHasher {
            IdentityHasher(0)
        }
    }

    #[test]
    fn test_directory_doubling() {
        let mut table = ExtendibleHashTable::with_hasher(2, IdentityState);

        // Scenario: the first two inserts fit in the single depth-0 bucket.
        table.insert(1u64, "a");
        table.insert(2u64, "b");
        assert_eq!(0, table.global_depth());
        assert_eq!(1, table.num_buckets());

        // Scenario: the third insert splits on the low bit: the directory
        // doubles and the bucket splits into a pair of depth-1 buckets.
        table.insert(3u64, "c");
        assert_eq!(1, table.global_depth());
        assert_eq!(2, table.num_buckets());
        assert_eq!(1, table.local_depth(0));
        assert_eq!(1, table.local_depth(1));

        assert_eq!(Some("a"), table.find(&1));
        assert_eq!(Some("b"), table.find(&2));
        assert_eq!(Some("c"), table.find(&3));
        assert_eq!(None, table.find(&99));

        table.check_invariants();
    }

    #[test]
    fn test_overwrite_does_not_split() {
        let mut table = ExtendibleHashTable::with_hasher(2, IdentityState);

        // Scenario: overwriting a key in a full bucket is an in-place update,
        // never a split.
        table.insert(1u64, "a");
        table.insert(2u64, "b");
        table.insert(1u64, "a2");
        assert_eq!(1, table.num_buckets());
        assert_eq!(0, table.global_depth());
        assert_eq!(Some("a2"), table.find(&1));

        table.check_invariants();
    }

    #[test]
    fn test_repeated_split_on_skewed_keys() {
        let mut table = ExtendibleHashTable::with_hasher(2, IdentityState);

        // Scenario: 0, 4 and 8 agree on the two low hash bits, so a single
        // split cannot separate them. The insert loop keeps splitting until
        // bit 2 comes into play.
        table.insert(0u64, "a");
        table.insert(4u64, "b");
        table.insert(8u64, "c");

        assert_eq!(3, table.global_depth());
        assert_eq!(4, table.num_buckets());
        assert_eq!(Some("a"), table.find(&0));
        assert_eq!(Some("b"), table.find(&4));
        assert_eq!(Some("c"), table.find(&8));

        table.check_invariants();
    }

    #[test]
    fn test_remove() {
        let mut table = ExtendibleHashTable::with_hasher(2, IdentityState);

        table.insert(1u64, "a");
        table.insert(2u64, "b");
        assert!(table.remove(&1));
        assert_eq!(None, table.find(&1));
        assert!(!table.remove(&1));
        assert_eq!(Some("b"), table.find(&2));

        // a removed key can come back without a split
        table.insert(1u64, "a2");
        assert_eq!(Some("a2"), table.find(&1));
        assert_eq!(1, table.num_buckets());

        table.check_invariants();
    }

    #[test]
    fn test_many_inserts_deep_directory() {
        let mut table = ExtendibleHashTable::with_hasher(4, IdentityState);

        for key in 0..256u64 {
            table.insert(key, key * 2);
        }
        table.check_invariants();
        assert!(table.global_depth() >= 6);

        for key in 0..256u64 {
            assert_eq!(Some(key * 2), table.find(&key));
        }
        for key in 0..128u64 {
            assert!(table.remove(&key));
        }
        table.check_invariants();
        for key in 0..256u64 {
            let want = if key < 128 { None } else { Some(key * 2) };
            assert_eq!(want, table.find(&key));
        }
    }

    #[test]
    fn test_random_against_std_hashmap() {
        let mut rng = rand::thread_rng();
        let mut table = ExtendibleHashTable::new(4);
        let mut model: HashMap<u64, u64> = HashMap::new();

        for _ in 0..10_000 {
            let key = rng.gen_range(0..512u64);
            match rng.gen_range(0..3) {
                0 => {
                    let value = rng.gen::<u64>();
                    table.insert(key, value);
                    model.insert(key, value);
                }
                1 => {
                    assert_eq!(model.remove(&key).is_some(), table.remove(&key));
                }
                _ => {
                    assert_eq!(model.get(&key).cloned(), table.find(&key));
                }
            }
            table.check_invariants();
        }

        for (key, value) in &model {
            assert_eq!(Some(*value), table.find(key));
        }
    }
}
