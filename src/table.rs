//! A dense hash table using Robin Hood probing with fingerprinted metadata.
//!
//! The table splits its storage in two. A metadata array holds one packed
//! 64-bit word per probe slot (fingerprint, probe distance, state and entry
//! index), and a dense entry array holds the actual values with no gaps. The metadata array is what the probe loop touches, so a lookup
//! walks a contiguous run of 8-byte words and only dereferences into the
//! entry array when a fingerprint matches. The entry array is what iteration
//! touches, so a full scan is a linear walk over exactly `len` live values.
//! That dense scan is the design's headline property: iteration speed does
//! not degrade with capacity or deletions.
//!
//! ## Probing
//!
//! Probing is linear from the home slot (`hash mod capacity`) with Robin
//! Hood balancing: on collision, the element that has travelled further from
//! its home keeps the slot, and the other continues probing. This bounds the
//! variance of probe lengths, which matters more than the mean for tail
//! latency. A displacement swaps only metadata words; the 46-bit entry index
//! travels with the word and the values themselves never move.
//!
//! Each bucket caches an 8-bit fingerprint of the hash. A probe compares
//! fingerprints before touching the entry array, so almost all non-matching
//! slots are rejected without a key comparison or a second cache miss. The
//! zero fingerprint is reserved for slots without a live entry, and hashes
//! that would produce it are remixed first (see [`crate::hash`]).
//!
//! Probe distance saturates at [`MAX_DISTANCE`]. An insert that would exceed
//! it resizes and retries; with a non-degenerate hash function this path is
//! effectively unreachable below the load limit.
//!
//! ## Deletion
//!
//! Erase keeps the entry array dense by moving the last entry into the freed
//! index and retargeting the single metadata word that referenced the old
//! tail position. The vacated probe slot becomes a tombstone that preserves
//! its fingerprint and distance, so existing probe chains keep their shape.
//! Tombstones count against the load budget alongside live entries, which
//! guarantees every probe chain still terminates at an empty slot; when
//! tombstones alone trip the budget the table rehashes at the same capacity
//! to shed them. Rebuilding metadata from scratch is cheap here because the
//! per-entry hash is cached: a rehash never consults the key type.
//!
//! A tombstone is reused by an insert only after the probe has confirmed the
//! key is absent. Filling the first tombstone on sight would shadow a
//! duplicate living further down the same chain.
//!
//! ## What this table is not
//!
//! Entry indices are not stable: erasing any entry may renumber the former
//! tail. Iteration order is arbitrary and changes across mutation. The table
//! itself is single-threaded; the sharded variant composes one of these per
//! partition with atomic metadata.
//!
//! This is a low-level structure: callers provide the hash and an equality
//! predicate for every operation. Use [`DenseMap`](crate::DenseMap) for a
//! keyed interface.

use alloc::vec::Vec;

use crate::bucket::{Bucket, MAX_ENTRY_INDEX};
use crate::error::Error;
use crate::hash::fold;

/// Smallest number of probe slots a table allocates.
pub const INITIAL_CAPACITY: usize = 16;

/// Probe distances saturate here; an insert that would reach this distance
/// resizes and retries instead.
pub const MAX_DISTANCE: usize = 255;

/// Maximum live entries for a given slot count (a 3/4 load factor).
#[inline(always)]
pub(crate) const fn max_load(slots: usize) -> usize {
    slots / 4 * 3
}

#[inline(always)]
fn home_slot(hash: u64, slots: usize) -> usize {
    // Capacities are kept power-of-two, but the modulo is correct for any
    // slot count.
    (hash % slots as u64) as usize
}

/// A dense hash table storing values of type `V`.
///
/// `DenseTable` requires the caller to provide the hash value and an
/// equality predicate for each operation, which keeps it independent of any
/// key type or hasher. All hashes pass through the fingerprint fold, so
/// callers hand in raw hasher output.
pub struct DenseTable<V> {
    buckets: Vec<Bucket>,
    /// Folded hash for each entry, parallel to `entries`. Rebuilds derive
    /// fingerprints and home slots from these without touching `V`.
    hashes: Vec<u64>,
    entries: Vec<V>,
    tombstones: usize,
}

impl<V> DenseTable<V> {
    /// Creates a table that can hold at least `capacity` entries before
    /// resizing. At least [`INITIAL_CAPACITY`] slots are always allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = slots_for(capacity);
        check_capacity_limit(slots);
        DenseTable {
            buckets: alloc::vec![Bucket::EMPTY; slots],
            hashes: Vec::new(),
            entries: Vec::new(),
            tombstones: 0,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries the table can hold before resizing.
    pub fn capacity(&self) -> usize {
        max_load(self.buckets.len())
    }

    /// Number of allocated probe slots. Exceeds `capacity` by the load-factor
    /// headroom.
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hashes.clear();
        self.buckets.fill(Bucket::EMPTY);
        self.tombstones = 0;
    }

    /// Reserves capacity for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        let required = self.entries.len().saturating_add(additional);
        if required > self.capacity() {
            self.entries.reserve(additional);
            self.hashes.reserve(additional);
            self.rebuild(slots_for(required));
        }
    }

    /// Fallible [`reserve`](Self::reserve): on allocation failure the table
    /// is left untouched and [`Error::AllocationFailed`] is returned.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        let required = self.entries.len().saturating_add(additional);
        self.entries
            .try_reserve(additional)
            .map_err(|_| Error::AllocationFailed)?;
        self.hashes
            .try_reserve(additional)
            .map_err(|_| Error::AllocationFailed)?;
        if required > self.capacity() {
            let slots = slots_for(required);
            self.buckets
                .try_reserve(slots.saturating_sub(self.buckets.len()))
                .map_err(|_| Error::AllocationFailed)?;
            // The bucket allocation is in hand; the rebuild itself cannot
            // allocate beyond it unless probe saturation forces a further
            // doubling, which follows the infallible convention.
            self.rebuild(slots);
        }
        Ok(())
    }

    /// Shrinks the table's footprint to fit the current number of entries.
    pub fn shrink_to_fit(&mut self) {
        self.entries.shrink_to_fit();
        self.hashes.shrink_to_fit();
        let target = slots_for(self.entries.len());
        if target < self.bucket_count() {
            self.rebuild(target);
        }
    }

    /// Looks up a value by hash and equality predicate.
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let (hash, fp) = fold(hash);
        self.probe_find(hash, fp, &eq)
            .map(|pos| &self.entries[self.buckets[pos].entry_index()])
    }

    /// Looks up a value by hash and equality predicate, returning a mutable
    /// reference.
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let (hash, fp) = fold(hash);
        self.probe_find(hash, fp, &eq)
            .map(|pos| &mut self.entries[self.buckets[pos].entry_index()])
    }

    /// Removes and returns the value matching `hash` and `eq`, if present.
    ///
    /// The entry array stays dense: the last entry moves into the freed
    /// index, so any previously observed entry indices are invalidated.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let (hash, fp) = fold(hash);
        self.probe_find(hash, fp, &eq).map(|pos| self.erase_at(pos))
    }

    /// Gets an entry for the given hash and equality predicate, for in-place
    /// insertion or modification.
    ///
    /// The table may grow before probing so that a vacant entry can always
    /// be filled without further checks.
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V> {
        let (hash, fp) = fold(hash);
        self.maybe_grow();
        match self.probe_find(hash, fp, &eq) {
            Some(pos) => Entry::Occupied(OccupiedEntry { table: self, pos }),
            None => Entry::Vacant(VacantEntry { table: self, hash }),
        }
    }

    /// Returns an iterator over the values in the table.
    ///
    /// This is a straight walk of the dense entry array: no skipping, no
    /// per-slot occupancy checks.
    pub fn iter(&self) -> core::slice::Iter<'_, V> {
        self.entries.iter()
    }

    /// Returns an iterator yielding mutable references to the values.
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, V> {
        self.entries.iter_mut()
    }

    /// Removes and yields every value, leaving the table empty.
    pub fn drain(&mut self) -> alloc::vec::Drain<'_, V> {
        self.hashes.clear();
        self.buckets.fill(Bucket::EMPTY);
        self.tombstones = 0;
        self.entries.drain(..)
    }

    /// Consumes the table, returning the dense entry array.
    pub(crate) fn into_entries(self) -> Vec<V> {
        self.entries
    }

    /// Walks the probe chain for `hash`, returning the bucket position of
    /// the matching entry. Tombstones never terminate the walk; an empty
    /// slot always does.
    fn probe_find(&self, hash: u64, fp: u8, eq: &impl Fn(&V) -> bool) -> Option<usize> {
        let slots = self.buckets.len();
        let mut pos = home_slot(hash, slots);
        for _ in 0..MAX_DISTANCE {
            let bucket = self.buckets[pos];
            if bucket.is_empty() {
                return None;
            }
            if bucket.is_occupied() && bucket.fingerprint() == fp {
                let index = bucket.entry_index();
                if eq(&self.entries[index]) {
                    return Some(pos);
                }
            }
            pos += 1;
            if pos == slots {
                pos = 0;
            }
        }
        None
    }

    /// Erases the entry referenced by the occupied bucket at `pos`,
    /// compacting the entry array and tombstoning the metadata slot.
    fn erase_at(&mut self, pos: usize) -> V {
        let bucket = self.buckets[pos];
        debug_assert!(bucket.is_occupied());
        let index = bucket.entry_index();
        let last = self.entries.len() - 1;

        if index != last {
            // Exactly one occupied bucket references the tail entry; point
            // it at the index the tail is about to move into.
            for slot in self.buckets.iter_mut() {
                if slot.is_occupied() && slot.entry_index() == last {
                    *slot = slot.with_entry_index(index);
                    break;
                }
            }
        }

        self.hashes.swap_remove(index);
        let value = self.entries.swap_remove(index);

        self.buckets[pos] = bucket.into_tombstone();
        self.tombstones += 1;
        value
    }

    /// Grows (or compacts) ahead of an insertion so the insert itself cannot
    /// violate the load bound.
    fn maybe_grow(&mut self) {
        let len = self.entries.len();
        let budget = max_load(self.buckets.len());
        if len + self.tombstones + 1 > budget {
            if len + 1 > budget {
                self.rebuild(grow_slots(self.buckets.len()));
            } else {
                // Live entries still fit; only tombstones are crowding the
                // table. Rehash in place to shed them.
                self.rebuild(self.buckets.len());
            }
        }
    }

    /// Rebuilds the metadata array at `slots` capacity from the cached
    /// hashes, dropping all tombstones. Doubles and restarts in the
    /// (pathological) event of probe saturation during the rebuild.
    fn rebuild(&mut self, mut slots: usize) {
        'attempt: loop {
            check_capacity_limit(slots);
            self.buckets.clear();
            self.buckets.resize(slots, Bucket::EMPTY);
            self.tombstones = 0;
            for index in 0..self.entries.len() {
                if !self.place(self.hashes[index], index) {
                    slots = grow_slots(slots);
                    continue 'attempt;
                }
            }
            return;
        }
    }

    /// Robin Hood placement of a known-absent entry's metadata. Returns
    /// `false` if the probe distance would saturate, in which case the
    /// metadata array is left in need of a rebuild.
    fn place(&mut self, hash: u64, index: usize) -> bool {
        let slots = self.buckets.len();
        let mut pos = home_slot(hash, slots);
        // The fold invariant guarantees a non-zero low byte for every cached
        // hash, so the fingerprint can be re-derived directly.
        let mut fp = hash as u8;
        let mut index = index;
        let mut dist = 0usize;

        while dist < MAX_DISTANCE {
            let bucket = self.buckets[pos];
            if !bucket.is_occupied() {
                if bucket.is_tombstone() {
                    self.tombstones -= 1;
                }
                self.buckets[pos] = Bucket::occupied(fp, dist as u8, index);
                return true;
            }
            if (bucket.distance() as usize) < dist {
                // The resident has travelled less; it yields the slot and
                // continues probing in our place. Metadata only: the entry
                // array is untouched.
                self.buckets[pos] = Bucket::occupied(fp, dist as u8, index);
                fp = bucket.fingerprint();
                dist = bucket.distance() as usize;
                index = bucket.entry_index();
            }
            pos += 1;
            if pos == slots {
                pos = 0;
            }
            dist += 1;
        }
        false
    }

    /// Places a known-absent entry's metadata, growing as needed until
    /// placement succeeds. The caller pushes the entry afterwards.
    fn insert_unique(&mut self, hash: u64, index: usize) {
        while !self.place(hash, index) {
            // A failed placement may have displaced metadata mid-chain; the
            // rebuild reconstructs everything from the cached hashes.
            self.rebuild(grow_slots(self.buckets.len()));
        }
    }
}

#[inline(always)]
fn grow_slots(slots: usize) -> usize {
    let doubled = slots.checked_mul(2).unwrap_or_else(|| capacity_overflow());
    doubled.max(INITIAL_CAPACITY)
}

/// Smallest power-of-two slot count whose load budget fits `entries`.
fn slots_for(entries: usize) -> usize {
    let mut slots = INITIAL_CAPACITY;
    while max_load(slots) < entries {
        slots = grow_slots(slots);
    }
    slots
}

#[inline(always)]
fn check_capacity_limit(slots: usize) {
    if slots > MAX_ENTRY_INDEX + 1 {
        capacity_overflow();
    }
}

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("hash table capacity overflow: entry indices are limited to 46 bits");
}

impl<V: Clone> Clone for DenseTable<V> {
    fn clone(&self) -> Self {
        DenseTable {
            buckets: self.buckets.clone(),
            hashes: self.hashes.clone(),
            entries: self.entries.clone(),
            tombstones: self.tombstones,
        }
    }
}

impl<V> Default for DenseTable<V> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<V: core::fmt::Debug> core::fmt::Debug for DenseTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DenseTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("slots", &self.buckets.len())
            .field("tombstones", &self.tombstones)
            .field("entries", &self.entries)
            .finish()
    }
}

/// A view into a single slot of the table, which is either vacant or
/// occupied.
///
/// Constructed by [`DenseTable::entry`].
pub enum Entry<'a, V> {
    /// No value matched; the entry can be filled without re-probing.
    Vacant(VacantEntry<'a, V>),
    /// A value matched the hash and predicate.
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Returns the matching value, inserting `default` if the entry is
    /// vacant.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Returns the matching value, inserting the result of `default` if the
    /// entry is vacant. The closure runs only on insertion.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Returns the matching value, inserting the default value if vacant.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }
}

/// A vacant slot in a [`DenseTable`], ready to be filled.
pub struct VacantEntry<'a, V> {
    table: &'a mut DenseTable<V>,
    hash: u64,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts a value into the vacant slot and returns a reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let index = self.table.entries.len();
        self.table.insert_unique(self.hash, index);
        self.table.hashes.push(self.hash);
        self.table.entries.push(value);
        &mut self.table.entries[index]
    }
}

/// An occupied slot in a [`DenseTable`].
pub struct OccupiedEntry<'a, V> {
    table: &'a mut DenseTable<V>,
    pos: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        &self.table.entries[self.table.buckets[self.pos].entry_index()]
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        let index = self.table.buckets[self.pos].entry_index();
        &mut self.table.entries[index]
    }

    /// Converts the entry into a mutable reference tied to the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        let index = self.table.buckets[self.pos].entry_index();
        &mut self.table.entries[index]
    }

    /// Removes the entry from the table and returns its value.
    pub fn remove(self) -> V {
        self.table.erase_at(self.pos)
    }
}

/// Occupancy and probe statistics for analysis and debugging.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries.
    pub len: usize,
    /// Entries the table can hold before resizing.
    pub capacity: usize,
    /// Total probe slots allocated.
    pub slots: usize,
    /// Tombstoned probe slots awaiting compaction.
    pub tombstones: usize,
    /// `len / capacity`.
    pub load_factor: f64,
    /// Largest probe distance of any live entry.
    pub max_probe_distance: usize,
    /// Mean probe distance across live entries.
    pub mean_probe_distance: f64,
}

#[cfg(feature = "stats")]
impl<V> DenseTable<V> {
    /// Collects occupancy and probe-distance statistics from the metadata
    /// array.
    pub fn debug_stats(&self) -> DebugStats {
        let mut max_dist = 0usize;
        let mut total_dist = 0usize;
        for bucket in &self.buckets {
            if bucket.is_occupied() {
                let dist = bucket.distance() as usize;
                max_dist = max_dist.max(dist);
                total_dist += dist;
            }
        }
        let len = self.entries.len();
        DebugStats {
            len,
            capacity: self.capacity(),
            slots: self.buckets.len(),
            tombstones: self.tombstones,
            load_factor: if self.capacity() == 0 {
                0.0
            } else {
                len as f64 / self.capacity() as f64
            },
            max_probe_distance: max_dist,
            mean_probe_distance: if len == 0 {
                0.0
            } else {
                total_dist as f64 / len as f64
            },
        }
    }

    /// Histogram of probe distances. Index `d` counts live entries at
    /// distance `d`; distances past the histogram width land in the final
    /// bucket.
    pub fn probe_histogram(&self) -> [usize; 17] {
        let mut histogram = [0usize; 17];
        for bucket in &self.buckets {
            if bucket.is_occupied() {
                let dist = (bucket.distance() as usize).min(16);
                histogram[dist] += 1;
            }
        }
        histogram
    }
}
