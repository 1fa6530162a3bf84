use std::mem::size_of;

use crate::bitpacked::PackedArray;
use crate::error::CacheError;

/// Bridges a cache's opaque `V` slots to the `K` type used for addressing.
///
/// Bundling `hash`/`key_from_value`/`equal` into one trait (rather than
/// three separate closures threaded through every call) keeps
/// `SetAssociativeCache` generic over a single type parameter, the same way
/// other pluggable collaborators in this codebase are expressed as traits
/// rather than closure bags.
pub trait CacheAdapter<K, V> {
    fn hash(key: &K) -> u64;
    fn key_from_value(value: &V) -> K;
    fn equal(a: &K, b: &K) -> bool {
        // Most keys are `Eq`; adapters for keys that aren't can override.
        let _ = (a, b);
        unimplemented!("CacheAdapter::equal must be implemented unless K: Eq")
    }
}

/// Layout parameters for a [`SetAssociativeCache`], validated once at
/// construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub ways: usize,
    pub tag_bits: u32,
    pub clock_bits: u32,
    pub cache_line_size: usize,
}

impl Layout {
    fn validate<K, V>(&self, value_count_max: usize) -> Result<(), CacheError> {
        if !matches!(self.ways, 2 | 4 | 16) {
            return Err(CacheError::InvalidWays(self.ways));
        }
        if !matches!(self.tag_bits, 8 | 16) {
            return Err(CacheError::InvalidTagBits(self.tag_bits));
        }
        if !matches!(self.clock_bits, 1 | 2 | 4) {
            return Err(CacheError::InvalidClockBits(self.clock_bits));
        }
        let key_size = size_of::<K>();
        let value_size = size_of::<V>();
        if !key_size.is_power_of_two() {
            return Err(CacheError::KeySizeNotPowerOfTwo(key_size));
        }
        if !value_size.is_power_of_two() {
            return Err(CacheError::ValueSizeNotPowerOfTwo(value_size));
        }
        if key_size > value_size {
            return Err(CacheError::KeyLargerThanValue {
                key: key_size,
                value: value_size,
            });
        }
        if key_size >= self.cache_line_size {
            return Err(CacheError::KeyNotSmallerThanCacheLine {
                key: key_size,
                line: self.cache_line_size,
            });
        }
        if !self.cache_line_size.is_power_of_two()
            || self.cache_line_size % key_size != 0
        {
            return Err(CacheError::CacheLineSizeInvalid {
                line: self.cache_line_size,
                key: key_size,
            });
        }
        if self.cache_line_size % value_size != 0 && value_size % self.cache_line_size != 0 {
            return Err(CacheError::CacheLineValueMismatch {
                line: self.cache_line_size,
                value: value_size,
            });
        }
        if !value_count_max.is_power_of_two()
            || value_count_max < self.ways
            || value_count_max % self.ways != 0
        {
            return Err(CacheError::InvalidValueCountMax(value_count_max));
        }
        Ok(())
    }

    fn clock_hand_bits(&self) -> u32 {
        self.ways.trailing_zeros()
    }
}

/// A fixed-capacity, power-of-two set-associative cache with CLOCK-style
/// second-chance eviction, backed by bit-packed per-slot metadata.
///
/// Single-owner, single-threaded: nothing here synchronizes concurrent
/// access, matching the protocol's non-goal of thread-safe sharing.
#[derive(Debug)]
pub struct SetAssociativeCache<K, V, A: CacheAdapter<K, V>> {
    layout: Layout,
    sets: usize,
    tags: Vec<u16>,
    values: Vec<V>,
    counts: PackedArray,
    clocks: PackedArray,
    _adapter: std::marker::PhantomData<(K, A)>,
}

impl<K, V, A> SetAssociativeCache<K, V, A>
where
    V: Clone + Default,
    A: CacheAdapter<K, V>,
{
    /// Allocates and zeros metadata for a cache holding up to
    /// `value_count_max` entries. Fails if `value_count_max` or `layout`
    /// violate any of the construction invariants.
    pub fn init(layout: Layout, value_count_max: usize) -> Result<Self, CacheError> {
        layout.validate::<K, V>(value_count_max)?;
        let sets = value_count_max / layout.ways;
        let clock_hand_bits = layout.clock_hand_bits();
        Ok(Self {
            layout,
            sets,
            tags: vec![0u16; value_count_max],
            values: vec![V::default(); value_count_max],
            counts: PackedArray::new(value_count_max, layout.clock_bits),
            clocks: PackedArray::new(sets, clock_hand_bits.max(1)),
            _adapter: std::marker::PhantomData,
        })
    }

    pub fn sets(&self) -> usize {
        self.sets
    }

    pub fn ways(&self) -> usize {
        self.layout.ways
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Clears all metadata (not values) so every slot reads as empty, in
    /// O(sets).
    pub fn reset(&mut self) {
        self.counts.clear();
        self.clocks.clear();
    }

    fn log2_sets(&self) -> u32 {
        self.sets.trailing_zeros()
    }

    fn addr(&self, key: &K) -> (usize, u16) {
        let h = A::hash(key);
        let set_index = (h % self.sets as u64) as usize;
        let tag_mask = (1u64 << self.layout.tag_bits) - 1;
        let tag = ((h >> self.log2_sets()) & tag_mask) as u16;
        (set_index, tag)
    }

    fn find_way(&self, set_index: usize, tag: u16, key: &K) -> Option<usize> {
        let base = set_index * self.layout.ways;
        (0..self.layout.ways).find(|&way| {
            let slot = base + way;
            self.tags[slot] == tag
                && self.counts.get(slot) > 0
                && A::equal(&A::key_from_value(&self.values[slot]), key)
        })
    }

    /// Looks up `key`, returning a reference to its value if present.
    ///
    /// On a hit, saturates the slot's CLOCK counter so recently-used
    /// entries survive eviction sweeps instead of aging out alongside
    /// entries that were never read back.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let (set_index, tag) = self.addr(key);
        let way = self.find_way(set_index, tag, key)?;
        let slot = set_index * self.layout.ways + way;
        let max = self.counts.max_value();
        let current = self.counts.get(slot);
        if current < max {
            self.counts.set(slot, current + 1);
        }
        Some(&self.values[slot])
    }

    /// Upserts a slot keyed by `A::key_from_value(&value)`.
    ///
    /// On an update (key already present) the value is overwritten in
    /// place and the counter is left unchanged. On a miss, a victim slot is
    /// chosen by sweeping the set's CLOCK hand until a counter of zero is
    /// found, decrementing every counter it passes over.
    pub fn put(&mut self, value: V) {
        let key = A::key_from_value(&value);
        let (set_index, tag) = self.addr(&key);
        if let Some(way) = self.find_way(set_index, tag, &key) {
            let slot = set_index * self.layout.ways + way;
            self.values[slot] = value;
            return;
        }

        let base = set_index * self.layout.ways;
        let mut hand = self.clocks.get(set_index) as usize;
        loop {
            let slot = base + hand;
            let count = self.counts.get(slot);
            if count == 0 {
                tracing::trace!(set_index, way = hand, "installing into a vacated slot");
                self.tags[slot] = tag;
                self.values[slot] = value;
                self.counts.set(slot, 1);
                hand = (hand + 1) % self.layout.ways;
                self.clocks.set(set_index, hand as u64);
                return;
            }
            self.counts.set(slot, count - 1);
            hand = (hand + 1) % self.layout.ways;
        }
    }
}
