use thiserror::Error;

use crate::common::config::PageId;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("page {0} not found in page table")]
    PageNotFound(PageId),
    #[error("disk i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
