use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::buffer::lru_k_replacer::LruKReplacer;
use crate::common::config::{FrameId, PageId, INVALID_PAGE_ID};
use crate::common::exception::BufferPoolError;
use crate::storage::disk::disk_scheduler::DiskScheduler;
use crate::storage::page::page::Page;

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
}

/// The buffer pool manager caches disk pages in a fixed set of frames and
/// hands them out pinned. A page stays in its frame at least until its pin
/// count drops to zero; after that the LRU-K replacer may evict it, writing
/// the frame back through the disk scheduler when it is dirty.
pub struct BufferPoolManager {
    pool_size: usize,
    next_page_id: AtomicU64,
    frames: Box<[Arc<Page>]>,
    state: Mutex<PoolState>,
    replacer: Mutex<LruKReplacer>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_scheduler: DiskScheduler, replacer: LruKReplacer) -> Self {
        let frames: Box<[Arc<Page>]> = (0..pool_size).map(|_| Arc::new(Page::new())).collect();
        let free_list: Vec<FrameId> = (0..pool_size).rev().collect();
        Self {
            pool_size,
            next_page_id: AtomicU64::new(0),
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: Mutex::new(replacer),
            disk_scheduler,
        }
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocates a new page and pins it. Returns `None` when every frame is
    /// pinned.
    pub fn new_page(&self) -> Option<Arc<Page>> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);

        let frame = &self.frames[frame_id];
        frame.reset_memory();
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.set_pin_count(1);
        state.page_table.insert(page_id, frame_id);

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);

        debug!("allocated page {} in frame {}", page_id, frame_id);
        Some(Arc::clone(frame))
    }

    /// Fetches the requested page, pinning it. Reads the page from disk when
    /// it is not resident; returns `None` when no frame can be freed for it.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>> {
        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id];
            frame.pin();
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
            return Some(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id];
        let data = match self.disk_scheduler.schedule_read(page_id).blocking_recv() {
            Ok(data) => data,
            Err(_) => {
                error!("read of page {} failed, returning frame {}", page_id, frame_id);
                state.free_list.push(frame_id);
                return None;
            }
        };
        **frame.write() = *data;
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.set_pin_count(1);
        state.page_table.insert(page_id, frame_id);

        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);

        debug!("fetched page {} into frame {}", page_id, frame_id);
        Some(Arc::clone(frame))
    }

    /// Unpins a page, recording whether the caller dirtied it. Returns false
    /// when the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            warn!("unpin of non-resident page {}", page_id);
            return false;
        };
        let frame = &self.frames[frame_id];
        if frame.get_pin_count() == 0 {
            warn!("unpin of page {} with zero pin count", page_id);
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.lock().set_evictable(frame_id, true);
        }
        true
    }

    /// Drops a page from the pool and returns its frame to the free list.
    /// Returns false while the page is pinned; a page that is not resident
    /// counts as already deleted.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id];
        if frame.get_pin_count() > 0 {
            return false;
        }
        state.page_table.remove(&page_id);
        self.replacer.lock().remove(frame_id);
        frame.reset_memory();
        frame.set_page_id(INVALID_PAGE_ID);
        frame.set_dirty(false);
        state.free_list.push(frame_id);
        debug!("deleted page {} from frame {}", page_id, frame_id);
        true
    }

    /// Writes a resident page to disk regardless of its dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(BufferPoolError::PageNotFound(page_id));
        };
        let frame = &self.frames[frame_id];
        let data = Box::new(**frame.read());
        self.disk_scheduler
            .schedule_write(page_id, data)
            .blocking_recv()
            .map_err(|_| {
                BufferPoolError::Io(std::io::Error::other(format!(
                    "flush of page {page_id} failed"
                )))
            })?;
        frame.set_dirty(false);
        Ok(())
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();
        for page_id in page_ids {
            match self.flush_page(page_id) {
                // deleted concurrently; nothing left to flush
                Err(BufferPoolError::PageNotFound(_)) => {}
                other => other?,
            }
        }
        Ok(())
    }

    /// Finds a usable frame: the free list first, otherwise the replacer's
    /// victim, whose old page is written back if dirty and unmapped.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Some(frame_id);
        }
        let frame_id = self.replacer.lock().evict()?;
        let frame = &self.frames[frame_id];
        let old_page_id = frame.get_page_id();
        if frame.is_dirty() {
            let data = Box::new(**frame.read());
            if self
                .disk_scheduler
                .schedule_write(old_page_id, data)
                .blocking_recv()
                .is_err()
            {
                error!("write-back of evicted page {} failed", old_page_id);
            }
        }
        state.page_table.remove(&old_page_id);
        debug!("evicted page {} from frame {}", old_page_id, frame_id);
        Some(frame_id)
    }
}
