use crate::common::config::DB_PAGE_SIZE;
use crate::common::rid::RID;
use crate::storage::index::generic_key::IndexKey;

/// A (key, record id) pair as stored by a hash index bucket.
pub type MappingType<K> = (K, RID);

/// Encoded width of one bucket slot.
pub fn mapping_encoded_len<K: IndexKey>() -> usize {
    K::ENCODED_LEN + RID::ENCODED_LEN
}

/// BUCKET_ARRAY_SIZE is the number of (key, RID) pairs that can be stored in
/// an extendible hash index bucket page. Every slot needs two bitmap bits
/// (occupied and readable) next to its encoded pair, so the capacity is
/// roughly `4 * DB_PAGE_SIZE / (4 * mapping_len + 1)`, corrected downward
/// until the two byte-rounded bitmaps and the slot array fit the page.
pub fn bucket_array_size<K: IndexKey>() -> usize {
    let mapping_len = mapping_encoded_len::<K>();
    let mut size = (4 * DB_PAGE_SIZE) / (4 * mapping_len + 1);
    while 2 * size.div_ceil(8) + size * mapping_len > DB_PAGE_SIZE {
        size -= 1;
    }
    size
}
