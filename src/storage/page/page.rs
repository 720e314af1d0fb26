use log::error;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::config::{PageId, DB_PAGE_SIZE, INVALID_PAGE_ID};

/// Raw contents of one page.
pub type PageData = [u8; DB_PAGE_SIZE];

#[derive(Debug)]
struct PageMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

/// Page is the basic unit of storage within the database system. It wraps the
/// actual data bytes held in a buffer pool frame together with the
/// bookkeeping the buffer pool manager needs: page id, pin count and dirty
/// flag. The lock around the data doubles as the per-page latch; `read` and
/// `write` are the RLatch/WLatch of the latching protocol.
#[derive(Debug)]
pub struct Page {
    meta: Mutex<PageMeta>,
    data: RwLock<Box<PageData>>,
}

impl Page {
    /// Constructs an unmapped frame with zeroed data.
    pub fn new() -> Self {
        Self {
            meta: Mutex::new(PageMeta {
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
            }),
            data: RwLock::new(Box::new([0; DB_PAGE_SIZE])),
        }
    }

    /// Returns the page id of this page.
    pub fn get_page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    /// Returns the pin count of this page.
    pub fn get_pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Returns true if the page has been modified since it was read from disk.
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    /// Acquires the page latch in shared mode.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<PageData>> {
        self.data.read()
    }

    /// Acquires the page latch in exclusive mode.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<PageData>> {
        self.data.write()
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.meta.lock().page_id = page_id;
    }

    pub(crate) fn set_dirty(&self, is_dirty: bool) {
        self.meta.lock().is_dirty = is_dirty;
    }

    pub(crate) fn set_pin_count(&self, pin_count: u32) {
        self.meta.lock().pin_count = pin_count;
    }

    /// Increments the pin count, returning the new value.
    pub(crate) fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pin_count += 1;
        meta.pin_count
    }

    /// Decrements the pin count, returning the new value.
    pub(crate) fn unpin(&self) -> u32 {
        let mut meta = self.meta.lock();
        if meta.pin_count == 0 {
            error!(
                "attempted to decrement pin count below 0 for page {}",
                meta.page_id
            );
            return 0;
        }
        meta.pin_count -= 1;
        meta.pin_count
    }

    /// Zeroes out the data held within the page.
    pub(crate) fn reset_memory(&self) {
        self.data.write().fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
