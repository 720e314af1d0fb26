use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::common::config::DB_PAGE_SIZE;
use crate::common::rid::RID;
use crate::storage::index::comparator::KeyComparator;
use crate::storage::index::generic_key::IndexKey;
use crate::storage::page::hash_table_page_defs::{mapping_encoded_len, MappingType};
use crate::storage::page::page::PageData;

/// Bucket page for the extendible hash index: page-local associative storage
/// of (key, RID) pairs. Supports non-unique keys; an exact (key, RID)
/// duplicate is rejected.
///
/// Bucket page format (sizes in bytes, `n` = `max_size`):
/// ------------------------------------------------------------------
/// | Occupied (n/8) | Readable (n/8) | KEY(1) + RID(1) | ... | Free
/// ------------------------------------------------------------------
///
/// A slot is *occupied* once it has ever held a pair and *readable* while it
/// holds a live one; an occupied non-readable slot is a tombstone. Occupied
/// bits form a prefix of the slot array, so probes stop at the first
/// never-used slot.
pub struct HashTableBucketPage<K> {
    occupied: Box<[u8]>,
    readable: Box<[u8]>,
    slots: Box<[u8]>,
    max_size: usize,
    _marker: PhantomData<K>,
}

impl<K: IndexKey> HashTableBucketPage<K> {
    /// Creates an empty bucket holding up to `max_size` pairs.
    pub fn new(max_size: usize) -> Self {
        let bitmap_len = max_size.div_ceil(8);
        assert!(
            2 * bitmap_len + max_size * mapping_encoded_len::<K>() <= DB_PAGE_SIZE,
            "bucket of {} slots does not fit a page",
            max_size
        );
        Self {
            occupied: vec![0; bitmap_len].into_boxed_slice(),
            readable: vec![0; bitmap_len].into_boxed_slice(),
            slots: vec![0; max_size * mapping_encoded_len::<K>()].into_boxed_slice(),
            max_size,
            _marker: PhantomData,
        }
    }

    /// Reads a bucket out of a page image.
    pub fn decode(data: &PageData, max_size: usize) -> Self {
        let mut bucket = Self::new(max_size);
        let bitmap_len = bucket.occupied.len();
        bucket.occupied.copy_from_slice(&data[..bitmap_len]);
        bucket
            .readable
            .copy_from_slice(&data[bitmap_len..2 * bitmap_len]);
        let slots_len = bucket.slots.len();
        bucket
            .slots
            .copy_from_slice(&data[2 * bitmap_len..2 * bitmap_len + slots_len]);
        bucket
    }

    /// Writes the bucket back into a page image.
    pub fn encode(&self, data: &mut PageData) {
        let bitmap_len = self.occupied.len();
        data[..bitmap_len].copy_from_slice(&self.occupied);
        data[bitmap_len..2 * bitmap_len].copy_from_slice(&self.readable);
        data[2 * bitmap_len..2 * bitmap_len + self.slots.len()].copy_from_slice(&self.slots);
    }

    /// Scans the bucket and collects the RIDs stored under `key`.
    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Vec<RID> {
        let mut result = Vec::new();
        for i in 0..self.max_size {
            if !self.is_occupied(i) {
                break;
            }
            if self.is_readable(i) && cmp.compare(&self.key_at(i), key) == Ordering::Equal {
                result.push(self.value_at(i));
            }
        }
        result
    }

    /// Attempts to insert a (key, RID) pair.
    ///
    /// Returns false when the exact pair is already present or the bucket is
    /// full; otherwise writes into the first non-readable slot, so tombstones
    /// are reused before fresh slots.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: K, value: RID, cmp: &C) -> bool {
        if self.is_full() {
            return false;
        }
        for i in 0..self.max_size {
            if !self.is_occupied(i) {
                break;
            }
            if self.is_readable(i)
                && cmp.compare(&self.key_at(i), &key) == Ordering::Equal
                && self.value_at(i) == value
            {
                return false;
            }
        }
        for i in 0..self.max_size {
            if !self.is_readable(i) {
                self.put_at(i, &key, value);
                return true;
            }
        }
        false
    }

    /// Removes the first slot matching the (key, RID) pair. Returns false if
    /// no slot matches.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, value: &RID, cmp: &C) -> bool {
        for i in 0..self.max_size {
            if !self.is_occupied(i) {
                break;
            }
            if self.is_readable(i)
                && cmp.compare(&self.key_at(i), key) == Ordering::Equal
                && self.value_at(i) == *value
            {
                self.remove_at(i);
                return true;
            }
        }
        false
    }

    /// Gets the key stored at `bucket_idx`.
    pub fn key_at(&self, bucket_idx: usize) -> K {
        let at = bucket_idx * mapping_encoded_len::<K>();
        K::decode_from(&self.slots[at..at + K::ENCODED_LEN])
    }

    /// Gets the RID stored at `bucket_idx`.
    pub fn value_at(&self, bucket_idx: usize) -> RID {
        let at = bucket_idx * mapping_encoded_len::<K>() + K::ENCODED_LEN;
        RID::deserialize(&self.slots[at..at + RID::ENCODED_LEN])
    }

    fn put_at(&mut self, bucket_idx: usize, key: &K, value: RID) {
        let at = bucket_idx * mapping_encoded_len::<K>();
        key.encode_into(&mut self.slots[at..at + K::ENCODED_LEN]);
        self.slots[at + K::ENCODED_LEN..at + mapping_encoded_len::<K>()]
            .copy_from_slice(&value.to_bytes_le());
        self.occupied[bucket_idx / 8] |= 1 << (bucket_idx % 8);
        self.readable[bucket_idx / 8] |= 1 << (bucket_idx % 8);
    }

    /// Turns the slot at `bucket_idx` into a tombstone.
    pub fn remove_at(&mut self, bucket_idx: usize) {
        self.readable[bucket_idx / 8] &= !(1 << (bucket_idx % 8));
    }

    /// Whether the slot has ever held a pair (live pair or tombstone).
    pub fn is_occupied(&self, bucket_idx: usize) -> bool {
        self.occupied[bucket_idx / 8] & (1 << (bucket_idx % 8)) != 0
    }

    /// Whether the slot currently holds a live pair.
    pub fn is_readable(&self, bucket_idx: usize) -> bool {
        self.readable[bucket_idx / 8] & (1 << (bucket_idx % 8)) != 0
    }

    /// The number of live pairs, i.e. the current size.
    pub fn num_readable(&self) -> usize {
        self.readable.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Whether every slot holds a live pair.
    pub fn is_full(&self) -> bool {
        self.num_readable() == self.max_size
    }

    /// Whether no slot holds a live pair.
    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    /// Snapshots all live (key, RID) pairs, for redistribution on a split.
    pub fn array_copy(&self) -> Vec<MappingType<K>> {
        let mut pairs = Vec::with_capacity(self.num_readable());
        for i in 0..self.max_size {
            if !self.is_occupied(i) {
                break;
            }
            if self.is_readable(i) {
                pairs.push((self.key_at(i), self.value_at(i)));
            }
        }
        pairs
    }

    /// Clears all occupied and readable bits.
    pub fn reset(&mut self) {
        self.occupied.fill(0);
        self.readable.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index::comparator::OrdComparator;

    fn bucket(max_size: usize) -> HashTableBucketPage<u32> {
        HashTableBucketPage::new(max_size)
    }

    #[test]
    fn test_insert_and_get_value() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(4);
        assert!(b.insert(1, RID::new(1, 0), &cmp));
        assert!(b.insert(2, RID::new(2, 0), &cmp));
        assert_eq!(b.get_value(&1, &cmp), vec![RID::new(1, 0)]);
        assert_eq!(b.get_value(&3, &cmp), vec![]);
        assert_eq!(b.num_readable(), 2);
    }

    #[test]
    fn test_non_unique_keys_distinct_rids() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(4);
        assert!(b.insert(7, RID::new(1, 0), &cmp));
        assert!(b.insert(7, RID::new(2, 0), &cmp));
        assert_eq!(b.get_value(&7, &cmp).len(), 2);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(4);
        assert!(b.insert(7, RID::new(1, 0), &cmp));
        assert!(!b.insert(7, RID::new(1, 0), &cmp));
        assert_eq!(b.num_readable(), 1);
    }

    #[test]
    fn test_full_bucket_rejects() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(2);
        assert!(b.insert(1, RID::new(1, 0), &cmp));
        assert!(b.insert(2, RID::new(2, 0), &cmp));
        assert!(b.is_full());
        assert!(!b.insert(3, RID::new(3, 0), &cmp));
    }

    #[test]
    fn test_remove_and_tombstone_reuse() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(4);
        assert!(b.insert(1, RID::new(1, 0), &cmp));
        assert!(b.insert(2, RID::new(2, 0), &cmp));
        assert!(b.remove(&1, &RID::new(1, 0), &cmp));
        assert!(!b.remove(&1, &RID::new(1, 0), &cmp));
        // slot 0 is a tombstone: occupied but not readable
        assert!(b.is_occupied(0));
        assert!(!b.is_readable(0));
        // the next insert reuses it
        assert!(b.insert(3, RID::new(3, 0), &cmp));
        assert_eq!(b.key_at(0), 3);
        assert_eq!(b.get_value(&2, &cmp), vec![RID::new(2, 0)]);
    }

    #[test]
    fn test_array_copy_and_reset() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(4);
        assert!(b.insert(1, RID::new(1, 0), &cmp));
        assert!(b.insert(2, RID::new(2, 0), &cmp));
        assert!(b.remove(&1, &RID::new(1, 0), &cmp));
        let pairs = b.array_copy();
        assert_eq!(pairs, vec![(2, RID::new(2, 0))]);
        b.reset();
        assert!(b.is_empty());
        assert!(!b.is_occupied(0));
    }

    #[test]
    fn test_encode_decode() {
        let cmp = OrdComparator::<u32>::new();
        let mut b = bucket(4);
        assert!(b.insert(1, RID::new(1, 0), &cmp));
        assert!(b.insert(2, RID::new(2, 0), &cmp));
        assert!(b.remove(&1, &RID::new(1, 0), &cmp));

        let mut data = [0u8; DB_PAGE_SIZE];
        b.encode(&mut data);
        let decoded = HashTableBucketPage::<u32>::decode(&data, 4);
        assert_eq!(decoded.num_readable(), 1);
        assert!(decoded.is_occupied(0) && !decoded.is_readable(0));
        assert_eq!(decoded.get_value(&2, &cmp), vec![RID::new(2, 0)]);
    }

    #[test]
    fn test_zeroed_page_decodes_empty() {
        let data = [0u8; DB_PAGE_SIZE];
        let decoded = HashTableBucketPage::<u32>::decode(&data, 8);
        assert!(decoded.is_empty());
        assert!(!decoded.is_full());
    }
}
