//! A keyed hash map over the dense table.
//!
//! `DenseMap<K, V, S>` pairs a [`DenseTable`] of `(K, V)` entries with a
//! [`BuildHasher`]. Iteration is a linear walk of the dense entry array and
//! is the fastest way to visit every pair; point operations go through the
//! fingerprinted probe path.
//!
//! Unlike the standard library map, [`insert`](DenseMap::insert) never
//! overwrites: inserting a present key returns the existing value untouched.
//! Use the [`entry`](DenseMap::entry) API or
//! [`get_mut`](DenseMap::get_mut) to update values in place.

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use alloc::vec::Vec;

use crate::error::Error;
use crate::hash::DefaultHashBuilder;
use crate::table::DenseTable;
use crate::table::Entry as TableEntry;
use crate::table::OccupiedEntry as TableOccupiedEntry;
use crate::table::VacantEntry as TableVacantEntry;

/// A dense hash map with Robin Hood probing and cache-friendly iteration.
///
/// # Examples
///
/// ```rust
/// use densemap::DenseMap;
///
/// let mut map: DenseMap<&str, i32> = DenseMap::new();
/// map.insert("apple", 1);
/// map.insert("banana", 2);
///
/// assert_eq!(map.get(&"apple"), Some(&1));
/// assert_eq!(map.len(), 2);
///
/// map.remove(&"apple");
/// assert!(!map.contains_key(&"apple"));
/// ```
#[derive(Clone)]
pub struct DenseMap<K, V, S = DefaultHashBuilder> {
    table: DenseTable<(K, V)>,
    hash_builder: S,
}

impl<K, V, S: Default> DenseMap<K, V, S> {
    /// Creates an empty map with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty map that can hold at least `capacity` entries
    /// before resizing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S: Default> Default for DenseMap<K, V, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> DenseMap<K, V, S> {
    /// Creates an empty map with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with the given capacity and hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: DenseTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the map can hold before resizing.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the map's key-value pairs in entry order.
    ///
    /// Entry order is arbitrary and changes across mutation, but iterating
    /// it is a contiguous scan of exactly `len` pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator yielding mutable references to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the map's keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the map's values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator yielding mutable references to the map's values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Removes and yields every key-value pair, leaving the map empty.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S> DenseMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts a key-value pair, returning a reference to the stored value
    /// and whether an insertion happened.
    ///
    /// If the key is already present the stored value is left untouched,
    /// `value` is dropped, and `false` is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use densemap::DenseMap;
    ///
    /// let mut map: DenseMap<i32, &str> = DenseMap::new();
    /// let (stored, inserted) = map.insert(1, "a");
    /// assert!(inserted);
    /// assert_eq!(*stored, "a");
    ///
    /// let (stored, inserted) = map.insert(1, "b");
    /// assert!(!inserted);
    /// assert_eq!(*stored, "a");
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| *k == key) {
            TableEntry::Occupied(entry) => (&mut entry.into_mut().1, false),
            TableEntry::Vacant(entry) => (&mut entry.insert((key, value)).1, true),
        }
    }

    /// Gets the entry for `key`, for lazy insertion or in-place updates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use densemap::DenseMap;
    ///
    /// let mut map: DenseMap<&str, u32> = DenseMap::new();
    /// *map.entry("counter").or_insert(0) += 1;
    /// *map.entry("counter").or_insert(0) += 1;
    /// assert_eq!(map.get(&"counter"), Some(&2));
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| *k == key) {
            TableEntry::Occupied(inner) => Entry::Occupied(OccupiedEntry { inner }),
            TableEntry::Vacant(inner) => Entry::Vacant(VacantEntry { inner, key }),
        }
    }

    /// Returns a reference to the value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value for `key`, if present.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_mut(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the stored key-value pair for `key`, if present.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k == key).map(|(k, v)| (k, v))
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a reference to the value for `key`, or
    /// [`Error::KeyNotFound`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use densemap::{DenseMap, Error};
    ///
    /// let mut map: DenseMap<&str, i32> = DenseMap::new();
    /// map.insert("present", 1);
    /// assert_eq!(map.at(&"present"), Ok(&1));
    /// assert_eq!(map.at(&"absent"), Err(Error::KeyNotFound));
    /// ```
    pub fn at(&self, key: &K) -> Result<&V, Error> {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Returns a mutable reference to the value for `key`, or
    /// [`Error::KeyNotFound`].
    pub fn at_mut(&mut self, key: &K) -> Result<&mut V, Error> {
        self.get_mut(key).ok_or(Error::KeyNotFound)
    }

    /// Removes `key` from the map, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use densemap::DenseMap;
    ///
    /// let mut map: DenseMap<i32, &str> = DenseMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Reserves capacity for at least `additional` more entries, rehashing
    /// at most once for the whole reservation.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Fallible [`reserve`](Self::reserve): on allocation failure the map is
    /// left untouched and [`Error::AllocationFailed`] is returned.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.table.try_reserve(additional)
    }

    /// Shrinks the map's footprint to fit the current number of entries.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Inserts every pair from `batch`, reserving capacity up front so the
    /// whole batch rehashes at most once.
    ///
    /// Semantically identical to inserting one pair at a time: keys already
    /// present keep their stored values.
    pub fn batch_insert<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let batch = batch.into_iter();
        let (low, _) = batch.size_hint();
        self.reserve(low);
        for (key, value) in batch {
            self.insert(key, value);
        }
    }

    /// Looks up each key in `keys`, producing results in input order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use densemap::DenseMap;
    ///
    /// let mut map: DenseMap<i32, i32> = DenseMap::new();
    /// map.batch_insert([(1, 10), (2, 20)]);
    ///
    /// let found = map.batch_get(&[2, 3, 1]);
    /// assert_eq!(found, vec![Some(&20), None, Some(&10)]);
    /// ```
    pub fn batch_get(&self, keys: &[K]) -> Vec<Option<&V>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Tests each key in `keys` for membership, producing results in input
    /// order.
    pub fn batch_contains(&self, keys: &[K]) -> Vec<bool> {
        keys.iter().map(|key| self.contains_key(key)).collect()
    }
}

impl<K, V, S> Debug for DenseMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> Index<&K> for DenseMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &K) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K, V, S> Extend<(K, V)> for DenseMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Extends the map with `iter`. Keys already present keep their stored
    /// values.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.batch_insert(iter);
    }
}

impl<K, V, S> FromIterator<(K, V)> for DenseMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.batch_insert(iter);
        map
    }
}

/// A view into a single entry of a [`DenseMap`], which is either vacant or
/// occupied.
///
/// Constructed by [`DenseMap::entry`].
pub enum Entry<'a, K, V> {
    /// The key is not present.
    Vacant(VacantEntry<'a, K, V>),
    /// The key is present.
    Occupied(OccupiedEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Returns the value for the entry's key, inserting `default` if vacant.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Returns the value for the entry's key, inserting the result of
    /// `default` if vacant. The closure runs only on insertion.
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

    /// Returns the value for the entry's key, inserting `V::default()` if
    /// vacant.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }
}

/// A vacant entry in a [`DenseMap`]. Holds the key, ready to insert.
pub struct VacantEntry<'a, K, V> {
    inner: TableVacantEntry<'a, (K, V)>,
    key: K,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Returns a reference to the key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Inserts a value for the key and returns a reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.inner.insert((self.key, value)).1
    }
}

/// An occupied entry in a [`DenseMap`].
pub struct OccupiedEntry<'a, K, V> {
    inner: TableOccupiedEntry<'a, (K, V)>,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    /// Returns a reference to the stored key.
    pub fn key(&self) -> &K {
        &self.inner.get().0
    }

    /// Returns a reference to the value.
    pub fn get(&self) -> &V {
        &self.inner.get().1
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.inner.get_mut().1
    }

    /// Converts the entry into a mutable reference tied to the map borrow.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.inner.into_mut().1
    }

    /// Removes the entry from the map and returns its value.
    pub fn remove(self) -> V {
        self.inner.remove().1
    }

    /// Removes the entry from the map and returns the stored pair.
    pub fn remove_entry(self) -> (K, V) {
        self.inner.remove()
    }
}

/// An iterator over the key-value pairs of a [`DenseMap`].
pub struct Iter<'a, K, V> {
    inner: core::slice::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// An iterator over the pairs of a [`DenseMap`] with mutable values.
pub struct IterMut<'a, K, V> {
    inner: core::slice::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the keys of a [`DenseMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`DenseMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// An iterator over the values of a [`DenseMap`] with mutable access.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}

/// An owning iterator over the pairs of a [`DenseMap`].
pub struct IntoIter<K, V> {
    inner: alloc::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

/// A draining iterator over the pairs of a [`DenseMap`].
pub struct Drain<'a, K, V> {
    inner: alloc::vec::Drain<'a, (K, V)>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<'a, K, V, S> IntoIterator for &'a DenseMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut DenseMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, S> IntoIterator for DenseMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_entries().into_iter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;
    use core::hash::Hasher;

    use super::*;

    /// Passes integer keys through untouched; lookups and inserts then lean
    /// entirely on the fingerprint fold for mixing.
    #[derive(Clone, Default)]
    struct IdentityHashBuilder;

    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, _bytes: &[u8]) {
            unimplemented!("identity hashing is only defined for u64 keys");
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    impl BuildHasher for IdentityHashBuilder {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher(0)
        }
    }

    #[test]
    fn basic_insert_find_erase() {
        // Empty map; insert {1, 2, 3} with values {10, 20, 30}; erase 1.
        let mut map: DenseMap<u64, i64> = DenseMap::new();
        for (k, v) in [(1, 10), (2, 20), (3, 30)] {
            let (_, inserted) = map.insert(k, v);
            assert!(inserted);
        }
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&2), Some(&20));

        assert_eq!(map.remove(&1), Some(10));
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key(&1));

        let mut collected: Vec<(u64, i64)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        collected.sort_unstable();
        assert_eq!(collected, vec![(2, 20), (3, 30)]);
    }

    #[test]
    fn thousand_round_trip() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        for i in 0..1000 {
            map.insert(i, 2 * i);
        }
        assert_eq!(map.len(), 1000);
        for i in 0..1000 {
            assert_eq!(map.get(&i), Some(&(2 * i)));
        }
    }

    #[test]
    fn erase_range_preserves_the_rest() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        for i in 0..100 {
            map.insert(i, 2 * i);
        }
        for i in 25..30 {
            assert!(map.remove(&i).is_some());
        }
        assert_eq!(map.len(), 95);
        for i in 25..30 {
            assert!(!map.contains_key(&i));
        }
        for i in (0..25).chain(30..100) {
            assert_eq!(map.get(&i), Some(&(2 * i)));
        }
    }

    #[test]
    fn zero_low_byte_hashes_take_the_remix_path() {
        // With identity hashing, keys that are multiples of 256 hash to a
        // zero low byte and exercise the fingerprint remix.
        let mut map: DenseMap<u64, u64, IdentityHashBuilder> = DenseMap::new();
        for i in 0..1000 {
            map.insert(i * 256, i);
        }
        assert_eq!(map.len(), 1000);
        for i in 0..1000 {
            assert_eq!(map.get(&(i * 256)), Some(&i));
        }
    }

    #[test]
    fn string_keys() {
        let mut map: DenseMap<String, i32> = DenseMap::new();
        map.insert("apple".to_string(), 1);
        map.insert("banana".to_string(), 2);
        map.insert("cherry".to_string(), 3);

        assert_eq!(map.remove(&"apple".to_string()), Some(1));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&"banana".to_string()), Some(&2));
        assert!(!map.contains_key(&"apple".to_string()));
    }

    #[test]
    fn insert_never_overwrites() {
        let mut map: DenseMap<u64, String> = DenseMap::new();
        let (stored, inserted) = map.insert(7, "first".to_string());
        assert!(inserted);
        assert_eq!(stored, "first");

        let (stored, inserted) = map.insert(7, "second".to_string());
        assert!(!inserted);
        assert_eq!(stored, "first");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn entry_or_insert_with_is_lazy() {
        let mut map: DenseMap<u64, String> = DenseMap::new();
        map.insert(1, "present".to_string());

        // The constructor must not run when the key exists.
        let value = map
            .entry(1)
            .or_insert_with(|| panic!("constructed a value for a present key"));
        assert_eq!(value, "present");

        let value = map.entry(2).or_insert_with(|| "made".to_string());
        assert_eq!(value, "made");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn entry_or_default_mirrors_indexing() {
        let mut map: DenseMap<String, u32> = DenseMap::new();
        *map.entry("hits".to_string()).or_default() += 1;
        *map.entry("hits".to_string()).or_default() += 1;
        assert_eq!(map[&"hits".to_string()], 2);
    }

    #[test]
    fn entry_remove() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        map.insert(1, 100);
        match map.entry(1) {
            Entry::Occupied(entry) => {
                assert_eq!(entry.key(), &1);
                assert_eq!(entry.remove_entry(), (1, 100));
            }
            Entry::Vacant(_) => panic!("expected occupied"),
        }
        assert!(map.is_empty());
    }

    #[test]
    #[should_panic(expected = "no entry found for key")]
    fn index_panics_on_missing_key() {
        let map: DenseMap<u64, u64> = DenseMap::new();
        let _ = map[&1];
    }

    #[test]
    fn at_reports_key_not_found() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        map.insert(1, 10);
        assert_eq!(map.at(&1), Ok(&10));
        assert_eq!(map.at(&2), Err(Error::KeyNotFound));

        *map.at_mut(&1).unwrap() += 1;
        assert_eq!(map.at(&1), Ok(&11));
        assert_eq!(map.at_mut(&2), Err(Error::KeyNotFound));
    }

    #[test]
    fn batch_operations() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        map.batch_insert((0..500).map(|i| (i, 3 * i)));
        assert_eq!(map.len(), 500);

        let keys: Vec<u64> = vec![10, 600, 499, 0];
        assert_eq!(
            map.batch_get(&keys),
            vec![Some(&30), None, Some(&1497), Some(&0)]
        );
        assert_eq!(map.batch_contains(&keys), vec![true, false, true, true]);

        // Batches behave exactly like one-by-one insertion: duplicates keep
        // the first value.
        map.batch_insert([(10, 999), (1000, 1)]);
        assert_eq!(map.get(&10), Some(&30));
        assert_eq!(map.get(&1000), Some(&1));
    }

    #[test]
    fn iteration_yields_exactly_len_pairs() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        for i in 0..100 {
            map.insert(i, i);
        }
        for i in 0..50 {
            map.remove(&(i * 2));
        }
        assert_eq!(map.len(), 50);
        assert_eq!(map.iter().count(), 50);
        assert_eq!(map.keys().count(), 50);
        assert_eq!(map.values().count(), 50);
        assert!(map.keys().all(|k| k % 2 == 1));
    }

    #[test]
    fn iter_mut_and_values_mut() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        for i in 0..10 {
            map.insert(i, i);
        }
        for (_, v) in map.iter_mut() {
            *v *= 10;
        }
        for v in map.values_mut() {
            *v += 1;
        }
        for i in 0..10 {
            assert_eq!(map.get(&i), Some(&(i * 10 + 1)));
        }
    }

    #[test]
    fn into_iter_and_from_iter() {
        let map: DenseMap<u64, u64> = (0..64).map(|i| (i, i * i)).collect();
        assert_eq!(map.len(), 64);

        let mut pairs: Vec<(u64, u64)> = map.into_iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs.len(), 64);
        assert_eq!(pairs[10], (10, 100));
    }

    #[test]
    fn drain_then_reuse() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        for i in 0..32 {
            map.insert(i, i);
        }
        assert_eq!(map.drain().count(), 32);
        assert!(map.is_empty());
        map.insert(1, 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        for i in 0..100 {
            map.insert(i, i);
        }
        map.clear();
        assert_eq!(map.len(), 0);
        assert!(map.capacity() >= 1);
        for i in 0..100 {
            assert!(!map.contains_key(&i));
        }
    }

    #[test]
    fn clone_and_debug() {
        let mut map: DenseMap<u64, u64> = DenseMap::new();
        map.insert(1, 10);
        let copy = map.clone();
        map.remove(&1);
        assert_eq!(copy.get(&1), Some(&10));
        assert!(alloc::format!("{copy:?}").contains("1: 10"));
    }

    #[test]
    fn with_capacity_does_not_rehash_under_budget() {
        let mut map: DenseMap<u64, u64> = DenseMap::with_capacity(100);
        assert!(map.capacity() >= 100);
        let capacity = map.capacity();
        for i in 0..100 {
            map.insert(i, i);
        }
        assert_eq!(map.capacity(), capacity);
    }
}
