//! File-backed implementation of [`labgrid_core::store::ResultStore`].

mod export;
mod result_manager;

pub use result_manager::{FileResultManager, StorageInfo};
