//! A disk-backed extendible hash index and the storage plumbing it sits on:
//! a buffer pool with LRU-K replacement, a background disk scheduler, and
//! typed directory/bucket pages over fixed-size page frames.

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod container;
pub mod storage;
