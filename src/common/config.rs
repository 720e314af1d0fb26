pub const INVALID_PAGE_ID: PageId = PageId::MAX; // invalid page id
pub const INVALID_TXN_ID: TxnId = TxnId::MAX; // invalid transaction id

pub const DB_PAGE_SIZE: usize = 4096; // size of a data page in bytes
pub const BUFFER_POOL_SIZE: usize = 64; // default size of the buffer pool
pub const LRUK_REPLACER_K: usize = 2; // lookback window for the lru-k replacer

/// Maximum global (and therefore local) depth of the hash index directory.
/// 2^8 routing slots is what a single directory page can hold next to the
/// depth bookkeeping with 64-bit page ids.
pub const DIRECTORY_MAX_DEPTH: u32 = 8;

/// Number of routing slots a directory page carries.
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << DIRECTORY_MAX_DEPTH;

pub type FrameId = usize; // frame id type
pub type PageId = u64; // page id type
pub type TxnId = u64; // transaction id type
