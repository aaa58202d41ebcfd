//! A sharded concurrent hash map composing the dense table design.
//!
//! The map is an array of independent partitions. A key's hash selects its
//! shard from the low bits; the remaining bits, run through the same
//! fingerprint fold as the single-threaded table, drive placement within the
//! shard. Using disjoint hash slices keeps shard-level collisions from also
//! collapsing in-shard probe distributions.
//!
//! Each shard holds the familiar split layout with two concessions to
//! concurrency:
//!
//! - Bucket metadata lives in `AtomicU64` words. Readers load a word once
//!   with acquire ordering and decode it locally; writers publish
//!   fully-formed words with compare-and-swap. The one-word bucket packing
//!   is what makes this possible.
//! - The entry store is a fixed window of slots with an atomic tail.
//!   An insert reserves a slot index from the tail, writes the pair, and
//!   marks the slot live before its bucket word is ever published, so any
//!   reader that can see the bucket can safely read the entry.
//!
//! Every operation runs under the shard's read gate. The write gate is taken
//! only to resize, so "locking" here degenerates to a shared atomic
//! increment except in the rare windows where a shard is rebuilding. Resize
//! re-packs live entries densely, rebuilds all metadata with true Robin Hood
//! ordering, and reclaims dead slots.
//!
//! ## Deviations from the single-threaded table
//!
//! Robin Hood displacement is not performed concurrently. A displacement
//! rewrites two metadata words, which cannot be one CAS, and the displaced
//! key would be unfindable in between. Inserts instead claim the first
//! empty slot on the chain with their true distance recorded; displacement
//! ordering is restored wholesale at the next resize.
//!
//! Tombstones are never reused concurrently, only skipped. Reusing one
//! requires verifying the key is absent beyond it and then claiming it,
//! two steps that cannot be one CAS; a same-key insert racing with the
//! erase that produced the tombstone could land beyond the scan and yield
//! two live copies. Claiming only empty slots pins every racer for a key
//! to the same word, where CAS picks exactly one winner. Erase likewise
//! does not compact the entry store: it marks the slot dead and tombstones
//! the bucket, leaving both for the resize to reclaim.
//!
//! ## Ordering guarantees
//!
//! Per key, the linearization point of an insert is the bucket CAS that
//! publishes the occupied word; for an erase it is the live-to-dead slot
//! transition, which strictly precedes the bucket's tombstone CAS. Losers
//! of either race observe the winner and report accordingly. Across keys
//! and shards there is no ordering; [`len`](ShardedMap::len) is maintained
//! with release/acquire updates and is only monotonically consistent.
//! Iteration is snapshot-weak: entries inserted or erased mid-traversal may
//! or may not be observed.

use core::cell::UnsafeCell;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use alloc::boxed::Box;
use alloc::vec::Vec;

use cfg_if::cfg_if;
use parking_lot::RwLock;

use crate::bucket::{Bucket, MAX_ENTRY_INDEX};
use crate::hash::{fold, DefaultHashBuilder};
use crate::table::{max_load, INITIAL_CAPACITY, MAX_DISTANCE};

cfg_if! {
    if #[cfg(feature = "shards-256")] {
        const SHARDS: usize = 256;
        const SHARD_BITS: u32 = 8;
    } else {
        const SHARDS: usize = 64;
        const SHARD_BITS: u32 = 6;
    }
}

const SLOT_VACANT: u8 = 0;
const SLOT_LIVE: u8 = 1;
const SLOT_DEAD: u8 = 2;

/// One entry-store slot: a state byte gating a possibly-initialized pair.
///
/// State transitions: `VACANT -> LIVE` when an inserter that reserved the
/// slot publishes its payload (release store, before the bucket CAS);
/// `LIVE -> DEAD` when an eraser claims the entry (the per-key decider);
/// `LIVE/DEAD -> VACANT` only under the exclusive gate, when a resize moves
/// or drops the payload.
struct EntrySlot<K, V> {
    state: AtomicU8,
    key: UnsafeCell<MaybeUninit<K>>,
    value: UnsafeCell<MaybeUninit<V>>,
}

impl<K, V> EntrySlot<K, V> {
    fn vacant() -> Self {
        EntrySlot {
            state: AtomicU8::new(SLOT_VACANT),
            key: UnsafeCell::new(MaybeUninit::uninit()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

// SAFETY: a slot's payload is written exactly once, by the thread that
// reserved its index from the tail, before the LIVE release store. After
// that the payload is read-only until a resize (exclusive gate) reclaims
// it; readers order their accesses with acquire loads of `state` or of a
// bucket word published after the LIVE store. Sending a slot moves the
// payload, hence K: Send, V: Send.
unsafe impl<K: Send, V: Send> Send for EntrySlot<K, V> {}

// SAFETY: shared access only ever reads the payload (`&K`, `&V`) after
// observing LIVE with acquire ordering, hence K: Sync, V: Sync; concurrent
// writes cannot occur because reservation is unique and reclamation holds
// the exclusive gate.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for EntrySlot<K, V> {}

/// The storage of one shard: atomic bucket words plus the slot window.
struct ShardCore<K, V> {
    buckets: Box<[AtomicU64]>,
    slots: Box<[EntrySlot<K, V>]>,
    /// Next unreserved slot index. Reservations may race past the load
    /// budget by the number of contending threads; the window between the
    /// budget and `slots.len()` absorbs them.
    tail: AtomicUsize,
}

impl<K, V> ShardCore<K, V> {
    fn with_slots(slot_count: usize) -> Self {
        ShardCore {
            buckets: (0..slot_count).map(|_| AtomicU64::new(0)).collect(),
            slots: (0..slot_count).map(|_| EntrySlot::vacant()).collect(),
            tail: AtomicUsize::new(0),
        }
    }

    fn slot_count(&self) -> usize {
        self.buckets.len()
    }

    /// Slots that have ever been reserved, clamped to the window.
    fn reserved(&self) -> usize {
        self.tail.load(Ordering::Acquire).min(self.slots.len())
    }

    /// Moves every live pair out, drops every dead one, and resets all slot
    /// states. Requires exclusive access (`&mut`).
    fn drain_live(&mut self) -> Vec<(K, V)> {
        let reserved = self.reserved();
        let mut live = Vec::with_capacity(reserved);
        for slot in &self.slots[..reserved] {
            match slot.state.load(Ordering::Relaxed) {
                // SAFETY: LIVE and DEAD slots hold initialized payloads and
                // exclusive access means no other thread can observe them;
                // each payload is moved or dropped exactly once and the
                // state is reset to VACANT so the subsequent drop of this
                // core does not touch it again.
                SLOT_LIVE => unsafe {
                    live.push((
                        (*slot.key.get()).assume_init_read(),
                        (*slot.value.get()).assume_init_read(),
                    ));
                },
                SLOT_DEAD => unsafe {
                    (*slot.key.get()).assume_init_drop();
                    (*slot.value.get()).assume_init_drop();
                },
                _ => {}
            }
            slot.state.store(SLOT_VACANT, Ordering::Relaxed);
        }
        self.tail.store(0, Ordering::Relaxed);
        live
    }
}

impl<K, V> Drop for ShardCore<K, V> {
    fn drop(&mut self) {
        let reserved = self.reserved();
        for slot in &self.slots[..reserved] {
            if slot.state.load(Ordering::Relaxed) != SLOT_VACANT {
                // SAFETY: non-VACANT slots hold initialized payloads and we
                // have exclusive access during drop.
                unsafe {
                    (*slot.key.get()).assume_init_drop();
                    (*slot.value.get()).assume_init_drop();
                }
            }
        }
    }
}

/// A concurrent dense hash map partitioned across independent shards.
///
/// Supports many parallel readers and writers on shared state. Point
/// operations take `&self`; clone an `Arc<ShardedMap<..>>` to share the map
/// across threads.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
///
/// use densemap::ShardedMap;
///
/// let map: Arc<ShardedMap<u64, u64>> = Arc::new(ShardedMap::new());
/// let handles: Vec<_> = (0..4u64)
///     .map(|t| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.insert(t * 100 + i, t);
///             }
///         })
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(map.len(), 400);
/// ```
pub struct ShardedMap<K, V, S = DefaultHashBuilder> {
    shards: Box<[RwLock<ShardCore<K, V>>]>,
    len: AtomicUsize,
    hash_builder: S,
}

impl<K, V, S: Default> ShardedMap<K, V, S> {
    /// Creates an empty map with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S: Default> Default for ShardedMap<K, V, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ShardedMap<K, V, S> {
    /// Creates an empty map with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        ShardedMap {
            shards: (0..SHARDS)
                .map(|_| RwLock::new(ShardCore::with_slots(INITIAL_CAPACITY)))
                .collect(),
            len: AtomicUsize::new(0),
            hash_builder,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// The count is maintained with release/acquire updates; concurrent
    /// mutators make it a momentary snapshot, exact once writers quiesce.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> ShardedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Routes a key: shard index from the low hash bits, folded in-shard
    /// hash and fingerprint from the rest.
    fn route(&self, key: &K) -> (usize, u64, u8) {
        let raw = self.hash_builder.hash_one(key);
        let shard = (raw & (SHARDS as u64 - 1)) as usize;
        let (hash, fp) = fold(raw >> SHARD_BITS);
        (shard, hash, fp)
    }

    /// Inserts a key-value pair, returning whether an insertion happened.
    ///
    /// If the key is already present the stored value is untouched and
    /// `false` is returned.
    pub fn insert(&self, key: K, value: V) -> bool {
        let (shard, hash, fp) = self.route(&key);
        let mut pair = (key, value);
        loop {
            let core = self.shards[shard].read();
            let seen_slots = core.slot_count();
            match try_insert(&core, hash, fp, pair.0, pair.1) {
                Ok(inserted) => {
                    drop(core);
                    if inserted {
                        self.len.fetch_add(1, Ordering::AcqRel);
                    }
                    return inserted;
                }
                Err(returned) => {
                    pair = returned;
                    drop(core);
                    self.grow_shard(shard, seen_slots);
                }
            }
        }
    }

    /// Removes `key` from the map, returning whether an entry was removed.
    ///
    /// The live-to-dead slot transition decides racing erasers; the loser
    /// returns `false`. The pair itself is reclaimed at the shard's next
    /// resize.
    pub fn erase(&self, key: &K) -> bool {
        let (shard, hash, fp) = self.route(key);
        let core = self.shards[shard].read();
        let slot_count = core.slot_count();
        let mut pos = (hash % slot_count as u64) as usize;
        let mut dist = 0;

        while dist < MAX_DISTANCE {
            let word = core.buckets[pos].load(Ordering::Acquire);
            let bucket = Bucket(word);
            if bucket.is_empty() {
                return false;
            }
            if bucket.is_occupied() && bucket.fingerprint() == fp {
                let index = bucket.entry_index();
                let slot = &core.slots[index];
                if slot.state.load(Ordering::Acquire) == SLOT_LIVE {
                    // SAFETY: a LIVE state (acquire) orders after the
                    // payload writes, and keys are immutable until a resize,
                    // which our shared gate excludes.
                    let stored = unsafe { (*slot.key.get()).assume_init_ref() };
                    if stored == key {
                        if slot
                            .state
                            .compare_exchange(
                                SLOT_LIVE,
                                SLOT_DEAD,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            // We own the removal. Retire the bucket word,
                            // keeping fingerprint and distance so the chain
                            // shape survives. No other writer touches an
                            // occupied word, so this CAS cannot fail.
                            let retired = core.buckets[pos].compare_exchange(
                                word,
                                bucket.into_tombstone().0,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            );
                            debug_assert!(retired.is_ok());
                            self.len.fetch_sub(1, Ordering::AcqRel);
                            return true;
                        }
                        return false;
                    }
                }
            }
            pos += 1;
            if pos == slot_count {
                pos = 0;
            }
            dist += 1;
        }
        false
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains(&self, key: &K) -> bool {
        let (shard, hash, fp) = self.route(key);
        let core = self.shards[shard].read();
        probe(&core, hash, fp, key).is_some()
    }

    /// Returns a snapshot of the value for `key`, if present.
    ///
    /// The clone is taken under the shard's shared gate; a concurrent erase
    /// may invalidate the entry immediately after, which is inherent to any
    /// value handed across threads.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let (shard, hash, fp) = self.route(key);
        let core = self.shards[shard].read();
        let slot = probe(&core, hash, fp, key)?;
        // SAFETY: `probe` observed LIVE with acquire ordering, and the
        // payload cannot be reclaimed while we hold the shared gate.
        Some(unsafe { (*slot.value.get()).assume_init_ref() }.clone())
    }

    /// Returns a snapshot-weak iterator over the map's pairs.
    ///
    /// Each shard is buffered in turn under its shared gate. Entries
    /// inserted or erased while iteration is in flight may or may not be
    /// observed.
    pub fn iter(&self) -> Iter<'_, K, V, S>
    where
        K: Clone,
        V: Clone,
    {
        Iter {
            map: self,
            shard: 0,
            buffered: Vec::new().into_iter(),
        }
    }

    /// Rebuilds a shard under its exclusive gate.
    ///
    /// Skips out if another thread already resized (the slot count no
    /// longer matches what the caller observed). Grows only when live
    /// entries genuinely crowd the shard; a window exhausted by dead slots
    /// is compacted at the same capacity.
    #[cold]
    fn grow_shard(&self, shard: usize, seen_slots: usize) {
        let mut core = self.shards[shard].write();
        if core.slot_count() != seen_slots {
            return;
        }

        let live = core.drain_live();
        let mut slot_count = if (live.len() + 1) * 2 > max_load(seen_slots) {
            seen_slots * 2
        } else {
            seen_slots
        };

        let fresh = loop {
            if slot_count > MAX_ENTRY_INDEX + 1 {
                panic!("hash table capacity overflow: entry indices are limited to 46 bits");
            }
            let fresh = ShardCore::with_slots(slot_count);
            let mut placed = true;
            for (index, (key, _)) in live.iter().enumerate() {
                let (hash, fp) = fold(self.hash_builder.hash_one(key) >> SHARD_BITS);
                if !place_word(&fresh.buckets, hash, fp, index) {
                    placed = false;
                    break;
                }
            }
            if placed {
                break fresh;
            }
            slot_count *= 2;
        };

        let count = live.len();
        for (index, (key, value)) in live.into_iter().enumerate() {
            let slot = &fresh.slots[index];
            // SAFETY: `fresh` is not yet shared; every slot is VACANT and
            // written at most once here.
            unsafe {
                (*slot.key.get()).write(key);
                (*slot.value.get()).write(value);
            }
            slot.state.store(SLOT_LIVE, Ordering::Relaxed);
        }
        fresh.tail.store(count, Ordering::Relaxed);

        // Publication happens-before any reader through the gate release.
        *core = fresh;
    }
}

impl<K, V, S> core::fmt::Debug for ShardedMap<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShardedMap")
            .field("len", &self.len())
            .field("shards", &SHARDS)
            .finish()
    }
}

/// Walks a shard's probe chain for `key`, returning its slot when a live
/// match is found. Dead entries and tombstones are skipped, an empty bucket
/// terminates.
fn probe<'a, K: Eq, V>(
    core: &'a ShardCore<K, V>,
    hash: u64,
    fp: u8,
    key: &K,
) -> Option<&'a EntrySlot<K, V>> {
    let slot_count = core.slot_count();
    let mut pos = (hash % slot_count as u64) as usize;
    for _ in 0..MAX_DISTANCE {
        let bucket = Bucket(core.buckets[pos].load(Ordering::Acquire));
        if bucket.is_empty() {
            return None;
        }
        if bucket.is_occupied() && bucket.fingerprint() == fp {
            let slot = &core.slots[bucket.entry_index()];
            if slot.state.load(Ordering::Acquire) == SLOT_LIVE {
                // SAFETY: LIVE (acquire) orders after the payload writes;
                // the payload outlives the shared gate implied by `core`.
                if unsafe { (*slot.key.get()).assume_init_ref() } == key {
                    return Some(slot);
                }
            }
        }
        pos += 1;
        if pos == slot_count {
            pos = 0;
        }
    }
    None
}

/// The insert protocol for one shard, run under its shared gate.
///
/// Reserves a slot, publishes the payload, then walks the chain CASing a
/// bucket word into place. `Ok(false)` reports a duplicate (the reservation
/// is retired in place); `Err` hands the pair back because the shard needs
/// an exclusive rebuild first.
fn try_insert<K: Eq, V>(
    core: &ShardCore<K, V>,
    hash: u64,
    fp: u8,
    key: K,
    value: V,
) -> Result<bool, (K, V)> {
    let slot_count = core.slot_count();
    if core.tail.load(Ordering::Acquire) >= max_load(slot_count) {
        return Err((key, value));
    }

    let index = core.tail.fetch_add(1, Ordering::AcqRel);
    if index >= core.slots.len() {
        // Lost a reservation race past the window; the dangling tail is
        // clamped by the resize.
        return Err((key, value));
    }
    let slot = &core.slots[index];
    // SAFETY: the fetch_add makes `index` exclusively ours and the slot is
    // VACANT (never reserved since the last exclusive reset), so these are
    // the first writes to it.
    unsafe {
        (*slot.key.get()).write(key);
        (*slot.value.get()).write(value);
    }
    slot.state.store(SLOT_LIVE, Ordering::Release);
    // SAFETY: written and published just above; immutable hereafter.
    let key_ref = unsafe { (*slot.key.get()).assume_init_ref() };

    let mut pos = (hash % slot_count as u64) as usize;
    let mut dist = 0;
    while dist < MAX_DISTANCE {
        let word = core.buckets[pos].load(Ordering::Acquire);
        let bucket = Bucket(word);

        if bucket.is_empty() {
            let desired = Bucket::occupied(fp, dist as u8, index).0;
            match core.buckets[pos].compare_exchange(
                word,
                desired,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(true),
                // Re-evaluate whatever won the slot.
                Err(_) => continue,
            }
        }

        // Tombstones are skipped, never claimed; see the module notes.
        if bucket.is_occupied() && bucket.fingerprint() == fp {
            let other = &core.slots[bucket.entry_index()];
            if other.state.load(Ordering::Acquire) == SLOT_LIVE {
                // SAFETY: as in `probe`.
                if unsafe { (*other.key.get()).assume_init_ref() } == key_ref {
                    // Duplicate. Retire our unpublished reservation; the
                    // resize reclaims it.
                    slot.state.store(SLOT_DEAD, Ordering::Release);
                    return Ok(false);
                }
            }
        }

        pos += 1;
        if pos == slot_count {
            pos = 0;
        }
        dist += 1;
    }

    // Probe saturation. Take the payload back and request a rebuild.
    // SAFETY: our bucket word was never published, so no other thread can
    // reference the slot; resetting to VACANT keeps reclamation from
    // double-dropping the moved-out payload.
    let pair = unsafe {
        (
            (*slot.key.get()).assume_init_read(),
            (*slot.value.get()).assume_init_read(),
        )
    };
    slot.state.store(SLOT_VACANT, Ordering::Release);
    Err(pair)
}

/// Robin Hood metadata placement during a resize. Runs with exclusive
/// access, so plain relaxed stores suffice; the gate release publishes the
/// rebuilt shard. Returns `false` on probe saturation.
fn place_word(buckets: &[AtomicU64], hash: u64, fp: u8, index: usize) -> bool {
    let slot_count = buckets.len();
    let mut pos = (hash % slot_count as u64) as usize;
    let mut fp = fp;
    let mut index = index;
    let mut dist = 0usize;

    while dist < MAX_DISTANCE {
        let bucket = Bucket(buckets[pos].load(Ordering::Relaxed));
        if bucket.is_empty() {
            buckets[pos].store(Bucket::occupied(fp, dist as u8, index).0, Ordering::Relaxed);
            return true;
        }
        if (bucket.distance() as usize) < dist {
            buckets[pos].store(Bucket::occupied(fp, dist as u8, index).0, Ordering::Relaxed);
            fp = bucket.fingerprint();
            dist = bucket.distance() as usize;
            index = bucket.entry_index();
        }
        pos += 1;
        if pos == slot_count {
            pos = 0;
        }
        dist += 1;
    }
    false
}

/// A snapshot-weak iterator over a [`ShardedMap`].
///
/// Buffers one shard at a time under that shard's shared gate.
pub struct Iter<'a, K, V, S> {
    map: &'a ShardedMap<K, V, S>,
    shard: usize,
    buffered: alloc::vec::IntoIter<(K, V)>,
}

impl<K, V, S> Iterator for Iter<'_, K, V, S>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.buffered.next() {
                return Some(pair);
            }
            if self.shard == SHARDS {
                return None;
            }
            let core = self.map.shards[self.shard].read();
            self.shard += 1;
            let mut snapshot = Vec::new();
            // Walk the published bucket words rather than the slot window:
            // a reservation that never won its bucket CAS (a racing
            // duplicate) is momentarily live in the window but must not be
            // observed.
            for bucket in core.buckets.iter() {
                let bucket = Bucket(bucket.load(Ordering::Acquire));
                if !bucket.is_occupied() {
                    continue;
                }
                let slot = &core.slots[bucket.entry_index()];
                if slot.state.load(Ordering::Acquire) == SLOT_LIVE {
                    // SAFETY: LIVE (acquire) orders after the payload
                    // writes; the shared gate keeps the payload alive while
                    // we clone.
                    unsafe {
                        snapshot.push((
                            (*slot.key.get()).assume_init_ref().clone(),
                            (*slot.value.get()).assume_init_ref().clone(),
                        ));
                    }
                }
            }
            self.buffered = snapshot.into_iter();
        }
    }
}
