use std::collections::HashMap;

use crate::common::config::{PageId, DIRECTORY_ARRAY_SIZE, INVALID_PAGE_ID};
use crate::storage::page::page::PageData;

const OFFSET_GLOBAL_DEPTH: usize = 0;
const OFFSET_LOCAL_DEPTHS: usize = 4;
const OFFSET_BUCKET_PAGE_IDS: usize = OFFSET_LOCAL_DEPTHS + DIRECTORY_ARRAY_SIZE;

/// Directory page for the extendible hash index: the routing table from the
/// low bits of a key's fingerprint to the bucket page responsible for it.
///
/// On-page format (sizes in bytes):
/// ---------------------------------------------------------------------
/// | GlobalDepth (4) | LocalDepths (256) | BucketPageIds (256 * 8) | Free
/// ---------------------------------------------------------------------
///
/// Only the first `2^global_depth` slots of both arrays are meaningful.
pub struct HashTableDirectoryPage {
    global_depth: u32,
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
}

impl HashTableDirectoryPage {
    /// Creates a fresh directory: depth zero, a single unassigned slot.
    pub fn new() -> Self {
        Self {
            global_depth: 0,
            local_depths: [0; DIRECTORY_ARRAY_SIZE],
            bucket_page_ids: [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE],
        }
    }

    /// Reads a directory out of a page image.
    pub fn decode(data: &PageData) -> Self {
        let global_depth = u32::from_le_bytes(
            data[OFFSET_GLOBAL_DEPTH..OFFSET_GLOBAL_DEPTH + 4]
                .try_into()
                .unwrap(),
        );
        let mut local_depths = [0u8; DIRECTORY_ARRAY_SIZE];
        local_depths
            .copy_from_slice(&data[OFFSET_LOCAL_DEPTHS..OFFSET_LOCAL_DEPTHS + DIRECTORY_ARRAY_SIZE]);
        let mut bucket_page_ids = [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE];
        for (i, id) in bucket_page_ids.iter_mut().enumerate() {
            let at = OFFSET_BUCKET_PAGE_IDS + i * 8;
            *id = PageId::from_le_bytes(data[at..at + 8].try_into().unwrap());
        }
        Self {
            global_depth,
            local_depths,
            bucket_page_ids,
        }
    }

    /// Writes the directory back into a page image.
    pub fn encode(&self, data: &mut PageData) {
        data[OFFSET_GLOBAL_DEPTH..OFFSET_GLOBAL_DEPTH + 4]
            .copy_from_slice(&self.global_depth.to_le_bytes());
        data[OFFSET_LOCAL_DEPTHS..OFFSET_LOCAL_DEPTHS + DIRECTORY_ARRAY_SIZE]
            .copy_from_slice(&self.local_depths);
        for (i, id) in self.bucket_page_ids.iter().enumerate() {
            let at = OFFSET_BUCKET_PAGE_IDS + i * 8;
            data[at..at + 8].copy_from_slice(&id.to_le_bytes());
        }
    }

    /// Returns the global depth of the directory.
    pub fn get_global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Returns a mask of global-depth 1's and the rest 0's.
    pub fn get_global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth) - 1
    }

    /// Returns the current directory size, `2^global_depth`.
    pub fn size(&self) -> usize {
        1usize << self.global_depth
    }

    /// Returns the local depth of the bucket routed at `bucket_idx`.
    pub fn get_local_depth(&self, bucket_idx: usize) -> u32 {
        debug_assert!(bucket_idx < self.size());
        self.local_depths[bucket_idx] as u32
    }

    /// Returns a mask of local-depth 1's and the rest 0's for `bucket_idx`.
    pub fn get_local_depth_mask(&self, bucket_idx: usize) -> u32 {
        (1u32 << self.get_local_depth(bucket_idx)) - 1
    }

    /// Sets the local depth of the slot at `bucket_idx`.
    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u32) {
        debug_assert!(bucket_idx < self.size());
        debug_assert!(local_depth <= self.global_depth);
        self.local_depths[bucket_idx] = local_depth as u8;
    }

    /// Increments the local depth of the slot at `bucket_idx`.
    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        debug_assert!((self.local_depths[bucket_idx] as u32) < self.global_depth);
        self.local_depths[bucket_idx] += 1;
    }

    /// Decrements the local depth of the slot at `bucket_idx`.
    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        debug_assert!(self.local_depths[bucket_idx] > 0);
        self.local_depths[bucket_idx] -= 1;
    }

    /// Looks up the bucket page routed at `bucket_idx`.
    pub fn get_bucket_page_id(&self, bucket_idx: usize) -> PageId {
        debug_assert!(bucket_idx < self.size());
        self.bucket_page_ids[bucket_idx]
    }

    /// Routes `bucket_idx` at `bucket_page_id`.
    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, bucket_page_id: PageId) {
        debug_assert!(bucket_idx < self.size());
        self.bucket_page_ids[bucket_idx] = bucket_page_id;
    }

    /// Gets the split image of `bucket_idx`: the slot that differs from it in
    /// exactly the highest bit its local depth distinguishes. Requires a
    /// local depth of at least 1.
    pub fn get_split_image_index(&self, bucket_idx: usize) -> usize {
        let local_depth = self.get_local_depth(bucket_idx);
        debug_assert!(local_depth >= 1);
        bucket_idx ^ (1usize << (local_depth - 1))
    }

    /// Doubles the directory. Every new upper-half slot mirrors its low-order
    /// counterpart, so all aliases keep pointing at the same bucket with the
    /// same local depth.
    pub fn incr_global_depth(&mut self) {
        let old_size = self.size();
        assert!(
            old_size * 2 <= DIRECTORY_ARRAY_SIZE,
            "directory page has no room beyond depth {}",
            self.global_depth
        );
        for i in 0..old_size {
            self.local_depths[old_size + i] = self.local_depths[i];
            self.bucket_page_ids[old_size + i] = self.bucket_page_ids[i];
        }
        self.global_depth += 1;
    }

    /// Halves the directory. The upper half is redundant whenever this is
    /// legal (see `can_shrink`).
    pub fn decr_global_depth(&mut self) {
        debug_assert!(self.global_depth > 0);
        self.global_depth -= 1;
    }

    /// Returns true iff every local depth is strictly below the global depth,
    /// i.e. no bucket needs the directory's highest routing bit.
    pub fn can_shrink(&self) -> bool {
        self.global_depth > 0
            && (0..self.size()).all(|i| (self.local_depths[i] as u32) < self.global_depth)
    }

    /// Asserts the directory invariants:
    ///
    /// - every local depth is at most the global depth,
    /// - each bucket page has exactly `2^(global_depth - local_depth)` slots
    ///   pointing at it,
    /// - every slot sharing a bucket page records the same local depth.
    pub fn verify_integrity(&self) {
        // page id -> (local depth, pointer count)
        let mut page_id_to_depth: HashMap<PageId, (u32, usize)> = HashMap::new();

        for i in 0..self.size() {
            let local_depth = self.get_local_depth(i);
            assert!(
                local_depth <= self.global_depth,
                "local depth {} at slot {} exceeds global depth {}",
                local_depth,
                i,
                self.global_depth
            );
            let page_id = self.get_bucket_page_id(i);
            let entry = page_id_to_depth.entry(page_id).or_insert((local_depth, 0));
            assert_eq!(
                entry.0, local_depth,
                "slots sharing bucket page {} disagree on local depth ({} vs {})",
                page_id, entry.0, local_depth
            );
            entry.1 += 1;
        }

        for (page_id, (local_depth, count)) in page_id_to_depth {
            let expected = 1usize << (self.global_depth - local_depth);
            assert_eq!(
                count, expected,
                "bucket page {} at local depth {} has {} pointers, expected {}",
                page_id, local_depth, count, expected
            );
        }
    }
}

impl Default for HashTableDirectoryPage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_directory() {
        let directory = HashTableDirectoryPage::new();
        assert_eq!(directory.get_global_depth(), 0);
        assert_eq!(directory.get_global_depth_mask(), 0);
        assert_eq!(directory.size(), 1);
        assert_eq!(directory.get_bucket_page_id(0), INVALID_PAGE_ID);
    }

    #[test]
    fn test_growth_mirrors_slots() {
        let mut directory = HashTableDirectoryPage::new();
        directory.set_bucket_page_id(0, 10);

        directory.incr_global_depth();
        assert_eq!(directory.size(), 2);
        assert_eq!(directory.get_bucket_page_id(1), 10);
        assert_eq!(directory.get_local_depth(1), 0);

        directory.set_local_depth(0, 1);
        directory.set_local_depth(1, 1);
        directory.set_bucket_page_id(1, 11);
        directory.incr_global_depth();
        assert_eq!(directory.size(), 4);
        assert_eq!(directory.get_bucket_page_id(2), 10);
        assert_eq!(directory.get_bucket_page_id(3), 11);
        assert_eq!(directory.get_local_depth(2), 1);
        assert_eq!(directory.get_local_depth(3), 1);
        directory.verify_integrity();
    }

    #[test]
    fn test_split_image_index() {
        let mut directory = HashTableDirectoryPage::new();
        directory.set_bucket_page_id(0, 10);
        directory.incr_global_depth();
        directory.incr_global_depth();

        directory.set_local_depth(1, 1);
        assert_eq!(directory.get_split_image_index(1), 0);
        directory.set_local_depth(2, 2);
        assert_eq!(directory.get_split_image_index(2), 0);
        directory.set_local_depth(3, 2);
        assert_eq!(directory.get_split_image_index(3), 1);
    }

    #[test]
    fn test_can_shrink() {
        let mut directory = HashTableDirectoryPage::new();
        directory.set_bucket_page_id(0, 10);
        assert!(!directory.can_shrink());

        directory.incr_global_depth();
        // both slots still at depth 0: the highest bit is unused
        assert!(directory.can_shrink());

        directory.set_local_depth(0, 1);
        directory.set_local_depth(1, 1);
        directory.set_bucket_page_id(1, 11);
        assert!(!directory.can_shrink());
    }

    #[test]
    fn test_encode_decode_preserves_routing() {
        let mut directory = HashTableDirectoryPage::new();
        directory.set_bucket_page_id(0, 10);
        directory.incr_global_depth();
        directory.set_local_depth(0, 1);
        directory.set_local_depth(1, 1);
        directory.set_bucket_page_id(1, 11);

        let mut data = [0u8; crate::common::config::DB_PAGE_SIZE];
        directory.encode(&mut data);
        let decoded = HashTableDirectoryPage::decode(&data);
        assert_eq!(decoded.get_global_depth(), 1);
        assert_eq!(decoded.get_bucket_page_id(0), 10);
        assert_eq!(decoded.get_bucket_page_id(1), 11);
        assert_eq!(decoded.get_local_depth(0), 1);
        decoded.verify_integrity();
    }

    #[test]
    #[should_panic(expected = "disagree on local depth")]
    fn test_verify_integrity_catches_depth_mismatch() {
        let mut directory = HashTableDirectoryPage::new();
        directory.set_bucket_page_id(0, 10);
        directory.incr_global_depth();
        directory.set_local_depth(0, 1);
        // slot 1 still claims depth 0 while sharing page 10
        directory.verify_integrity();
    }
}
