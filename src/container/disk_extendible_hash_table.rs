use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::config::{PageId, DIRECTORY_MAX_DEPTH, INVALID_PAGE_ID};
use crate::common::rid::RID;
use crate::concurrency::transaction::Transaction;
use crate::container::hash_function::HashFunction;
use crate::storage::index::comparator::KeyComparator;
use crate::storage::index::generic_key::IndexKey;
use crate::storage::page::hash_table_bucket_page::HashTableBucketPage;
use crate::storage::page::hash_table_directory_page::HashTableDirectoryPage;
use crate::storage::page::hash_table_page_defs::bucket_array_size;
use crate::storage::page::page::{Page, PageData};

/// Implementation of an extendible hash table backed by a buffer pool
/// manager. Non-unique keys are supported; values are RIDs and an identical
/// (key, RID) pair is rejected. The table grows and shrinks dynamically as
/// buckets fill up and empty out.
///
/// Plain operations run under the shared table latch plus the affected
/// bucket's page latch; structural changes (bucket split, bucket merge,
/// directory resize) serialize through the exclusive table latch. The
/// split/merge paths never upgrade the latch: they release it, re-acquire it
/// exclusively and re-validate what they saw.
pub struct DiskExtendibleHashTable<K, C, H> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    hash_fn: H,
    /// Lazily assigned; [`INVALID_PAGE_ID`] until the first operation. The
    /// mutex doubles as the directory creation lock, which must be distinct
    /// from the table latch because creation happens under the shared latch.
    directory_page_id: Mutex<PageId>,
    table_latch: RwLock<()>,
    directory_max_depth: u32,
    bucket_max_size: usize,
    _marker: PhantomData<K>,
}

impl<K, C, H> DiskExtendibleHashTable<K, C, H>
where
    K: IndexKey,
    C: KeyComparator<K>,
    H: HashFunction<K>,
{
    /// Creates a hash table with the page-derived bucket capacity and the
    /// full directory depth.
    pub fn new(index_name: String, bpm: Arc<BufferPoolManager>, comparator: C, hash_fn: H) -> Self {
        Self::with_limits(
            index_name,
            bpm,
            comparator,
            hash_fn,
            DIRECTORY_MAX_DEPTH,
            bucket_array_size::<K>(),
        )
    }

    /// Creates a hash table with explicit capacity limits. Mostly useful for
    /// exercising splits and merges with small buckets.
    pub fn with_limits(
        index_name: String,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        hash_fn: H,
        directory_max_depth: u32,
        bucket_max_size: usize,
    ) -> Self {
        assert!(directory_max_depth <= DIRECTORY_MAX_DEPTH);
        assert!(bucket_max_size >= 1 && bucket_max_size <= bucket_array_size::<K>());
        info!(
            "creating extendible hash table {} (directory depth limit {}, bucket capacity {})",
            index_name, directory_max_depth, bucket_max_size
        );
        Self {
            index_name,
            bpm,
            comparator,
            hash_fn,
            directory_page_id: Mutex::new(INVALID_PAGE_ID),
            table_latch: RwLock::new(()),
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        }
    }

    /// Downcast of the configured hash to the 32-bit fingerprint extendible
    /// hashing works on.
    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.get_hash(key) as u32
    }

    fn key_to_directory_index(&self, key: &K, directory: &HashTableDirectoryPage) -> usize {
        (self.hash(key) & directory.get_global_depth_mask()) as usize
    }

    fn decode_bucket(&self, data: &PageData) -> HashTableBucketPage<K> {
        HashTableBucketPage::decode(data, self.bucket_max_size)
    }

    /// Returns the directory page, pinned, creating it together with the
    /// first bucket on first use.
    fn fetch_directory_page(&self) -> Arc<Page> {
        let mut directory_page_id = self.directory_page_id.lock();
        if *directory_page_id == INVALID_PAGE_ID {
            let directory_page = self.new_page_or_die();
            let bucket_page = self.new_page_or_die();

            let mut directory = HashTableDirectoryPage::new();
            directory.set_bucket_page_id(0, bucket_page.get_page_id());
            directory.encode(&mut directory_page.write());

            *directory_page_id = directory_page.get_page_id();
            info!(
                "initialized directory page {} with first bucket page {} for index {}",
                directory_page.get_page_id(),
                bucket_page.get_page_id(),
                self.index_name
            );
            self.unpin(directory_page.get_page_id(), true);
            self.unpin(bucket_page.get_page_id(), true);
        }
        let page_id = *directory_page_id;
        drop(directory_page_id);
        self.fetch_page_or_die(page_id)
    }

    /// A missing page mid-operation means the buffer pool cannot free a
    /// frame, which is unrecoverable at this layer.
    fn fetch_page_or_die(&self, page_id: PageId) -> Arc<Page> {
        self.bpm
            .fetch_page(page_id)
            .unwrap_or_else(|| panic!("buffer pool exhausted while fetching page {page_id}"))
    }

    fn new_page_or_die(&self) -> Arc<Page> {
        self.bpm.new_page().unwrap_or_else(|| {
            panic!(
                "buffer pool exhausted while allocating a page for index {}",
                self.index_name
            )
        })
    }

    fn unpin(&self, page_id: PageId, is_dirty: bool) {
        assert!(
            self.bpm.unpin_page(page_id, is_dirty),
            "unpin of page {} failed",
            page_id
        );
    }

    /// Collects the RIDs stored under `key`.
    pub fn get_value(&self, _transaction: Option<&Transaction>, key: &K) -> Vec<RID> {
        let table_guard = self.table_latch.read();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        let directory = HashTableDirectoryPage::decode(&directory_page.read());

        let bucket_index = self.key_to_directory_index(key, &directory);
        let bucket_page_id = directory.get_bucket_page_id(bucket_index);
        let bucket_page = self.fetch_page_or_die(bucket_page_id);
        let result = {
            let bucket_guard = bucket_page.read();
            self.decode_bucket(&bucket_guard).get_value(key, &self.comparator)
        };

        self.unpin(bucket_page_id, false);
        self.unpin(directory_page_id, false);
        drop(table_guard);
        result
    }

    /// Inserts a (key, RID) pair. Returns false when the identical pair is
    /// already present, or when the pair's bucket cannot split any further.
    pub fn insert(&self, transaction: Option<&Transaction>, key: &K, value: RID) -> bool {
        let table_guard = self.table_latch.read();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        let directory = HashTableDirectoryPage::decode(&directory_page.read());

        let bucket_index = self.key_to_directory_index(key, &directory);
        let bucket_page_id = directory.get_bucket_page_id(bucket_index);
        let bucket_page = self.fetch_page_or_die(bucket_page_id);
        let mut bucket_guard = bucket_page.write();
        let mut bucket = self.decode_bucket(&bucket_guard);

        if !bucket.is_full() {
            let inserted = bucket.insert(key.clone(), value, &self.comparator);
            if inserted {
                bucket.encode(&mut bucket_guard);
            }
            drop(bucket_guard);
            self.unpin(bucket_page_id, inserted);
            self.unpin(directory_page_id, false);
            drop(table_guard);
            return inserted;
        }

        // full bucket: redo the work under the exclusive table latch
        drop(bucket_guard);
        self.unpin(bucket_page_id, false);
        self.unpin(directory_page_id, false);
        drop(table_guard);
        self.split_insert(transaction, key, value)
    }

    /// Splits the bucket the key routes to and re-attempts the insert. The
    /// re-entry through `insert` handles buckets that are still full after
    /// one split; the local depth limit bounds the recursion.
    fn split_insert(&self, transaction: Option<&Transaction>, key: &K, value: RID) -> bool {
        let table_guard = self.table_latch.write();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        let mut directory_guard = directory_page.write();
        let mut directory = HashTableDirectoryPage::decode(&directory_guard);

        let split_index = self.key_to_directory_index(key, &directory);
        let split_depth = directory.get_local_depth(split_index);

        if split_depth >= self.directory_max_depth {
            debug!(
                "insert into index {} failed: bucket at slot {} is at the depth limit",
                self.index_name, split_index
            );
            drop(directory_guard);
            self.unpin(directory_page_id, false);
            drop(table_guard);
            return false;
        }

        if split_depth == directory.get_global_depth() {
            directory.incr_global_depth();
        }
        directory.incr_local_depth(split_index);

        // copy out and clear the overfull bucket
        let split_page_id = directory.get_bucket_page_id(split_index);
        let split_page = self.fetch_page_or_die(split_page_id);
        let mut split_guard = split_page.write();
        let mut split_bucket = self.decode_bucket(&split_guard);
        let pairs = split_bucket.array_copy();
        split_bucket.reset();

        // bring up the split image
        let image_page = self.new_page_or_die();
        let image_page_id = image_page.get_page_id();
        let mut image_guard = image_page.write();
        let mut image_bucket = HashTableBucketPage::<K>::new(self.bucket_max_size);
        let image_index = directory.get_split_image_index(split_index);
        let new_depth = directory.get_local_depth(split_index);
        directory.set_local_depth(image_index, new_depth);
        directory.set_bucket_page_id(image_index, image_page_id);

        // every slot that aliased the pre-split bucket agrees with the split
        // slot on the old prefix; the freshly significant bit decides which
        // half it now routes to
        let old_mask = (1usize << (new_depth - 1)) - 1;
        let new_mask = directory.get_local_depth_mask(split_index) as usize;
        for i in 0..directory.size() {
            if i & old_mask == split_index & old_mask {
                if i & new_mask == split_index & new_mask {
                    directory.set_bucket_page_id(i, split_page_id);
                } else {
                    directory.set_bucket_page_id(i, image_page_id);
                }
                directory.set_local_depth(i, new_depth);
            }
        }

        // redistribute under the extended prefix
        for (pair_key, pair_value) in pairs {
            let target_index = self.hash(&pair_key) as usize & new_mask;
            let target_page_id = directory.get_bucket_page_id(target_index);
            assert!(
                target_page_id == split_page_id || target_page_id == image_page_id,
                "rehashed pair routed outside the split, to bucket page {}",
                target_page_id
            );
            if target_page_id == split_page_id {
                assert!(split_bucket.insert(pair_key, pair_value, &self.comparator));
            } else {
                assert!(image_bucket.insert(pair_key, pair_value, &self.comparator));
            }
        }

        debug!(
            "split bucket page {} (slot {}) into page {} (slot {}), global depth now {}",
            split_page_id,
            split_index,
            image_page_id,
            image_index,
            directory.get_global_depth()
        );

        split_bucket.encode(&mut split_guard);
        image_bucket.encode(&mut image_guard);
        directory.encode(&mut directory_guard);
        drop(split_guard);
        drop(image_guard);
        drop(directory_guard);
        self.unpin(split_page_id, true);
        self.unpin(image_page_id, true);
        self.unpin(directory_page_id, true);
        drop(table_guard);

        self.insert(transaction, key, value)
    }

    /// Removes a (key, RID) pair. Returns false when no such pair is stored.
    pub fn remove(&self, transaction: Option<&Transaction>, key: &K, value: RID) -> bool {
        let table_guard = self.table_latch.read();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        let directory = HashTableDirectoryPage::decode(&directory_page.read());

        let bucket_index = self.key_to_directory_index(key, &directory);
        let bucket_page_id = directory.get_bucket_page_id(bucket_index);
        let bucket_page = self.fetch_page_or_die(bucket_page_id);
        let mut bucket_guard = bucket_page.write();
        let mut bucket = self.decode_bucket(&bucket_guard);

        let removed = bucket.remove(key, &value, &self.comparator);
        if removed {
            bucket.encode(&mut bucket_guard);
        }
        let now_empty = bucket.is_empty();

        drop(bucket_guard);
        self.unpin(bucket_page_id, removed);
        self.unpin(directory_page_id, false);
        drop(table_guard);

        if now_empty {
            self.merge(transaction, bucket_index);
        }
        removed
    }

    /// Folds the empty bucket at `target_index` into its split image and
    /// shrinks the directory as far as possible. The table latch was released
    /// between the remove and this call, so every precondition is checked
    /// again; when one no longer holds the merge is skipped, which is the
    /// defined behavior rather than an error. The image bucket is never
    /// merged in the same pass even if it is empty too; the next remove that
    /// observes it empty picks it up.
    fn merge(&self, _transaction: Option<&Transaction>, target_index: usize) {
        let table_guard = self.table_latch.write();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        let mut directory_guard = directory_page.write();
        let mut directory = HashTableDirectoryPage::decode(&directory_guard);

        // the directory may have shrunk while the table latch was released
        if target_index >= directory.size() {
            drop(directory_guard);
            self.unpin(directory_page_id, false);
            drop(table_guard);
            return;
        }

        // a bucket spanning the whole directory has nothing to merge with
        let local_depth = directory.get_local_depth(target_index);
        if local_depth == 0 {
            drop(directory_guard);
            self.unpin(directory_page_id, false);
            drop(table_guard);
            return;
        }

        // the image is only a merge partner at the same depth
        let image_index = directory.get_split_image_index(target_index);
        if directory.get_local_depth(image_index) != local_depth {
            drop(directory_guard);
            self.unpin(directory_page_id, false);
            drop(table_guard);
            return;
        }

        // a concurrent insert may have refilled the bucket
        let target_page_id = directory.get_bucket_page_id(target_index);
        let target_page = self.fetch_page_or_die(target_page_id);
        let still_empty = {
            let target_guard = target_page.read();
            self.decode_bucket(&target_guard).is_empty()
        };
        if !still_empty {
            drop(directory_guard);
            self.unpin(target_page_id, false);
            self.unpin(directory_page_id, false);
            drop(table_guard);
            return;
        }

        self.unpin(target_page_id, false);
        assert!(
            self.bpm.delete_page(target_page_id),
            "empty bucket page {} still pinned during merge",
            target_page_id
        );

        let image_page_id = directory.get_bucket_page_id(image_index);
        directory.set_bucket_page_id(target_index, image_page_id);
        directory.decr_local_depth(target_index);
        directory.decr_local_depth(image_index);

        // every alias of either half now routes to the surviving page
        let new_depth = directory.get_local_depth(target_index);
        for i in 0..directory.size() {
            let page_id = directory.get_bucket_page_id(i);
            if page_id == target_page_id || page_id == image_page_id {
                directory.set_bucket_page_id(i, image_page_id);
                directory.set_local_depth(i, new_depth);
            }
        }

        // a single merge can strand the top bit at several levels
        while directory.can_shrink() {
            directory.decr_global_depth();
        }

        debug!(
            "merged bucket page {} into page {}, global depth now {}",
            target_page_id,
            image_page_id,
            directory.get_global_depth()
        );

        directory.encode(&mut directory_guard);
        drop(directory_guard);
        self.unpin(directory_page_id, true);
        drop(table_guard);
    }

    /// Returns the directory's current global depth.
    pub fn get_global_depth(&self) -> u32 {
        let table_guard = self.table_latch.read();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        let global_depth = HashTableDirectoryPage::decode(&directory_page.read()).get_global_depth();
        self.unpin(directory_page_id, false);
        drop(table_guard);
        global_depth
    }

    /// Asserts the directory invariants; see
    /// [`HashTableDirectoryPage::verify_integrity`].
    pub fn verify_integrity(&self) {
        let table_guard = self.table_latch.read();
        let directory_page = self.fetch_directory_page();
        let directory_page_id = directory_page.get_page_id();
        HashTableDirectoryPage::decode(&directory_page.read()).verify_integrity();
        self.unpin(directory_page_id, false);
        drop(table_guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::lru_k_replacer::LruKReplacer;
    use crate::common::logger::initialize_logger;
    use crate::container::hash_function::Xxh3HashFunction;
    use crate::storage::disk::disk_manager::FileDiskManager;
    use crate::storage::disk::disk_scheduler::DiskScheduler;
    use crate::storage::index::comparator::OrdComparator;
    use tempfile::TempDir;

    struct TestContext {
        bpm: Arc<BufferPoolManager>,
        _temp_dir: TempDir,
    }

    impl TestContext {
        fn new(name: &str) -> Self {
            initialize_logger();
            const BUFFER_POOL_SIZE: usize = 64;
            const K: usize = 2;

            let temp_dir = TempDir::new().unwrap();
            let db_path = temp_dir.path().join(format!("{name}.db"));
            let disk_manager = Arc::new(FileDiskManager::new(db_path).unwrap());
            let disk_scheduler = DiskScheduler::new(disk_manager);
            let replacer = LruKReplacer::new(BUFFER_POOL_SIZE, K);
            let bpm = Arc::new(BufferPoolManager::new(
                BUFFER_POOL_SIZE,
                disk_scheduler,
                replacer,
            ));

            Self {
                bpm,
                _temp_dir: temp_dir,
            }
        }
    }

    /// Routes keys by their own low bits so tests choose fingerprints.
    struct IdentityHashFunction;

    impl HashFunction<u32> for IdentityHashFunction {
        fn get_hash(&self, key: &u32) -> u64 {
            *key as u64
        }
    }

    fn small_table(
        ctx: &TestContext,
        directory_max_depth: u32,
        bucket_max_size: usize,
    ) -> DiskExtendibleHashTable<u32, OrdComparator<u32>, IdentityHashFunction> {
        DiskExtendibleHashTable::with_limits(
            "test_table".to_string(),
            ctx.bpm.clone(),
            OrdComparator::new(),
            IdentityHashFunction,
            directory_max_depth,
            bucket_max_size,
        )
    }

    #[test]
    fn test_insert_and_get() {
        let ctx = TestContext::new("test_insert_and_get");
        let ht = DiskExtendibleHashTable::<u32, _, _>::new(
            "test_table".to_string(),
            ctx.bpm.clone(),
            OrdComparator::new(),
            Xxh3HashFunction::new(),
        );

        assert!(ht.insert(None, &1, RID::new(1, 0)));
        assert!(ht.insert(None, &2, RID::new(2, 0)));

        assert_eq!(ht.get_value(None, &1), vec![RID::new(1, 0)]);
        assert_eq!(ht.get_value(None, &2), vec![RID::new(2, 0)]);
        assert_eq!(ht.get_value(None, &3), vec![]);
        ht.verify_integrity();
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let ctx = TestContext::new("test_duplicate_pair_rejected");
        let ht = small_table(&ctx, 4, 4);

        assert!(ht.insert(None, &1, RID::new(1, 0)));
        assert!(!ht.insert(None, &1, RID::new(1, 0)));
        // same key, distinct RID is fine
        assert!(ht.insert(None, &1, RID::new(2, 0)));
        assert_eq!(ht.get_value(None, &1).len(), 2);
    }

    #[test]
    fn test_remove() {
        let ctx = TestContext::new("test_remove");
        let ht = small_table(&ctx, 4, 4);

        assert!(ht.insert(None, &1, RID::new(1, 1)));
        assert!(ht.remove(None, &1, RID::new(1, 1)));
        assert_eq!(ht.get_value(None, &1), vec![]);
        assert!(!ht.remove(None, &1, RID::new(1, 1)));
    }

    #[test]
    fn test_single_split() {
        let ctx = TestContext::new("test_single_split");
        let ht = small_table(&ctx, 4, 2);

        assert!(ht.insert(None, &1, RID::new(1, 0)));
        assert!(ht.insert(None, &2, RID::new(2, 0)));
        assert_eq!(ht.get_global_depth(), 0);

        // third insert overflows the only bucket
        assert!(ht.insert(None, &3, RID::new(3, 0)));
        assert_eq!(ht.get_global_depth(), 1);
        ht.verify_integrity();

        for key in 1..=3u32 {
            assert_eq!(ht.get_value(None, &key), vec![RID::new(key as u64, 0)]);
        }
    }

    #[test]
    fn test_depth_exhaustion_rejects_insert() {
        let ctx = TestContext::new("test_depth_exhaustion_rejects_insert");
        let ht = small_table(&ctx, 2, 2);

        // 4 buckets x 2 slots at the depth limit
        for key in 0..8u32 {
            assert!(ht.insert(None, &key, RID::new(key as u64, 0)), "key {key}");
        }
        assert_eq!(ht.get_global_depth(), 2);
        ht.verify_integrity();

        // every slot with fingerprint suffix 00 is taken
        assert!(!ht.insert(None, &8, RID::new(8, 0)));

        for key in 0..8u32 {
            assert_eq!(ht.get_value(None, &key), vec![RID::new(key as u64, 0)]);
        }
    }

    #[test]
    fn test_merge_and_shrink() {
        let ctx = TestContext::new("test_merge_and_shrink");
        let ht = small_table(&ctx, 4, 2);

        assert!(ht.insert(None, &1, RID::new(1, 0)));
        assert!(ht.insert(None, &2, RID::new(2, 0)));
        assert!(ht.insert(None, &3, RID::new(3, 0)));
        assert_eq!(ht.get_global_depth(), 1);

        // emptying the odd bucket folds it back into its image
        assert!(ht.remove(None, &3, RID::new(3, 0)));
        assert_eq!(ht.get_global_depth(), 1);
        assert!(ht.remove(None, &1, RID::new(1, 0)));
        assert_eq!(ht.get_global_depth(), 0);
        ht.verify_integrity();

        assert_eq!(ht.get_value(None, &2), vec![RID::new(2, 0)]);
        assert_eq!(ht.get_value(None, &1), vec![]);
    }

    #[test]
    fn test_merge_skips_deeper_split_image() {
        let ctx = TestContext::new("test_merge_skips_deeper_split_image");
        let ht = small_table(&ctx, 4, 2);

        // two splits on the even side: slot 0 at depth 2, odd slots at depth 1
        assert!(ht.insert(None, &0, RID::new(10, 0)));
        assert!(ht.insert(None, &4, RID::new(14, 0)));
        assert!(ht.insert(None, &2, RID::new(12, 0)));
        assert_eq!(ht.get_global_depth(), 2);
        ht.verify_integrity();

        // empty the odd bucket; its image (slot 0) sits at a greater depth,
        // so the merge must skip and leave the directory alone
        assert!(ht.insert(None, &1, RID::new(11, 0)));
        assert!(ht.remove(None, &1, RID::new(11, 0)));
        assert_eq!(ht.get_global_depth(), 2);
        ht.verify_integrity();

        assert_eq!(ht.get_value(None, &0), vec![RID::new(10, 0)]);
        assert_eq!(ht.get_value(None, &4), vec![RID::new(14, 0)]);
        assert_eq!(ht.get_value(None, &2), vec![RID::new(12, 0)]);
    }

    #[test]
    fn test_grows_and_shrinks_back_to_depth_zero() {
        let ctx = TestContext::new("test_grows_and_shrinks_back_to_depth_zero");
        let ht = small_table(&ctx, 4, 2);

        for key in 0..16u32 {
            assert!(ht.insert(None, &key, RID::new(key as u64, 0)));
        }
        assert!(ht.get_global_depth() >= 3);
        ht.verify_integrity();

        for key in 0..16u32 {
            assert!(ht.remove(None, &key, RID::new(key as u64, 0)));
        }
        ht.verify_integrity();
        assert_eq!(ht.get_global_depth(), 0);

        for key in 0..16u32 {
            assert_eq!(ht.get_value(None, &key), vec![]);
        }
    }
}
