use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use log::error;
use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;

use crate::common::config::{PageId, DB_PAGE_SIZE};
use crate::storage::disk::disk_manager::DiskIO;

/// A request queued for the background I/O worker. Completion is signalled
/// through the attached oneshot channel; a dropped sender tells the caller
/// the operation failed.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        done: oneshot::Sender<Box<[u8; DB_PAGE_SIZE]>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; DB_PAGE_SIZE]>,
        done: oneshot::Sender<()>,
    },
}

struct RequestQueue {
    requests: VecDeque<DiskRequest>,
    stopped: bool,
}

/// `DiskScheduler` funnels page reads and writes through a single background
/// worker thread so callers never block each other on the file handle. The
/// queue is drained before shutdown completes.
pub struct DiskScheduler {
    queue: Arc<(Mutex<RequestQueue>, Condvar)>,
    worker_thread: Option<thread::JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<dyn DiskIO>) -> Self {
        let queue = Arc::new((
            Mutex::new(RequestQueue {
                requests: VecDeque::new(),
                stopped: false,
            }),
            Condvar::new(),
        ));
        let worker_queue = Arc::clone(&queue);
        let worker_thread = thread::spawn(move || Self::run_worker(worker_queue, disk_manager));
        Self {
            queue,
            worker_thread: Some(worker_thread),
        }
    }

    /// Queues a read of `page_id`. The receiver yields the page image, or an
    /// error if the read failed.
    pub fn schedule_read(&self, page_id: PageId) -> oneshot::Receiver<Box<[u8; DB_PAGE_SIZE]>> {
        let (done, receiver) = oneshot::channel();
        self.push(DiskRequest::Read { page_id, done });
        receiver
    }

    /// Queues a write of `data` to `page_id`. The receiver resolves once the
    /// page is on disk.
    pub fn schedule_write(
        &self,
        page_id: PageId,
        data: Box<[u8; DB_PAGE_SIZE]>,
    ) -> oneshot::Receiver<()> {
        let (done, receiver) = oneshot::channel();
        self.push(DiskRequest::Write {
            page_id,
            data,
            done,
        });
        receiver
    }

    fn push(&self, request: DiskRequest) {
        let (lock, cvar) = &*self.queue;
        let mut queue = lock.lock();
        queue.requests.push_back(request);
        cvar.notify_one();
    }

    fn run_worker(queue: Arc<(Mutex<RequestQueue>, Condvar)>, disk_manager: Arc<dyn DiskIO>) {
        let (lock, cvar) = &*queue;
        loop {
            let request = {
                let mut queue = lock.lock();
                loop {
                    if let Some(request) = queue.requests.pop_front() {
                        break request;
                    }
                    if queue.stopped {
                        return;
                    }
                    cvar.wait(&mut queue);
                }
            };

            match request {
                DiskRequest::Read { page_id, done } => {
                    let mut data = Box::new([0u8; DB_PAGE_SIZE]);
                    match disk_manager.read_page(page_id, &mut data) {
                        Ok(()) => {
                            let _ = done.send(data);
                        }
                        Err(e) => error!("read of page {} failed: {}", page_id, e),
                    }
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    done,
                } => match disk_manager.write_page(page_id, &data) {
                    Ok(()) => {
                        let _ = done.send(());
                    }
                    Err(e) => error!("write of page {} failed: {}", page_id, e),
                },
            }
        }
    }

    pub fn shut_down(&self) {
        let (lock, cvar) = &*self.queue;
        lock.lock().stopped = true;
        cvar.notify_all();
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shut_down();
        if let Some(handle) = self.worker_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::disk_manager::FileDiskManager;
    use tempfile::TempDir;

    #[test]
    fn test_schedule_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager =
            Arc::new(FileDiskManager::new(temp_dir.path().join("test.db")).unwrap());
        let scheduler = DiskScheduler::new(disk_manager);

        let mut data = Box::new([0u8; DB_PAGE_SIZE]);
        data[17] = 99;
        scheduler.schedule_write(5, data).blocking_recv().unwrap();

        let back = scheduler.schedule_read(5).blocking_recv().unwrap();
        assert_eq!(back[17], 99);
    }

    #[test]
    fn test_requests_drain_before_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager =
            Arc::new(FileDiskManager::new(temp_dir.path().join("test.db")).unwrap());
        let scheduler = DiskScheduler::new(disk_manager);

        let mut receivers = Vec::new();
        for page_id in 0..16 {
            let data = Box::new([page_id as u8; DB_PAGE_SIZE]);
            receivers.push(scheduler.schedule_write(page_id, data));
        }
        drop(scheduler);
        for receiver in receivers {
            assert!(receiver.blocking_recv().is_ok());
        }
    }
}
