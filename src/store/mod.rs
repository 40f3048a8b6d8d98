//! The asset store boundary.
//!
//! The engine never touches photos directly. Everything it knows about an
//! asset comes through [`AssetStore`]: enumeration, on-demand metadata,
//! resampled image bytes and deletion.

pub mod filesystem;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use filesystem::FsAssetStore;
pub use memory::MemoryAssetStore;

use crate::error::AssetStoreError;

/// Default number of assets enumerated per scan.
pub const DEFAULT_ASSET_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Photo,
    Video,
    Other,
}

/// An asset as reported by the store. Width and height of `0` mean unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// Creation time in milliseconds since the Unix epoch.
    pub creation_time: Option<i64>,
    pub media_type: MediaType,
    pub uri: String,
}

impl AssetRecord {
    /// Width divided by height, or `None` when either dimension is unknown.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(self.width as f64 / self.height as f64)
        }
    }

    /// Pixel count, or `None` when either dimension is unknown.
    pub fn pixel_count(&self) -> Option<u64> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(self.width as u64 * self.height as u64)
        }
    }
}

/// Per-asset details that are only fetched on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadataExtra {
    pub file_size_bytes: Option<u64>,
    pub is_favorite: bool,
    pub location_present: bool,
    pub platform_subtypes: BTreeSet<String>,
}

impl AssetMetadataExtra {
    pub fn has_subtype(&self, subtype: &str) -> bool {
        self.platform_subtypes.contains(subtype)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreationTimeAsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub media_type: MediaType,
    pub limit: usize,
    pub order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            media_type: MediaType::Photo,
            limit: DEFAULT_ASSET_LIMIT,
            order: SortOrder::CreationTimeAsc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted_count: usize,
}

/// Access to the underlying photo library.
///
/// Implementations must tolerate being called from several threads when a
/// scan classifies blur batches in parallel.
pub trait AssetStore: Send + Sync {
    fn check_permission(&self) -> Permission;

    fn request_permission(&self) -> Permission;

    /// List assets in the order requested, at most `options.limit` of them.
    fn list_assets(&self, options: &ListOptions) -> Result<Vec<AssetRecord>, AssetStoreError>;

    fn get_asset_metadata(&self, id: &str) -> Result<AssetMetadataExtra, AssetStoreError>;

    /// Resample the image at `uri` to exactly `width` x `height` and return
    /// the encoded bytes.
    fn resample(&self, uri: &str, width: u32, height: u32) -> Result<Vec<u8>, AssetStoreError>;

    /// Delete every asset in `ids`, or none of them.
    fn delete_assets(&self, ids: &[String]) -> Result<DeleteOutcome, AssetStoreError>;
}
