//! Photo clutter triage.
//!
//! Scans a photo library for screenshots, duplicates and blurry shots using
//! cheap metadata signals, and reports how much space removing them would
//! free.

pub mod classify;
pub mod cleanup;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod export;
pub mod logging;
pub mod scanner;
pub mod store;
pub mod trash;

pub use error::{AssetStoreError, ScanError};
pub use scanner::{ScanOptions, ScanProgress, ScanResult, Scanner};
pub use store::{AssetStore, FsAssetStore, MemoryAssetStore};
