use thiserror::Error;

/// Failures reported by an [`AssetStore`](crate::store::AssetStore).
///
/// Only enumeration and deletion failures ever reach the caller of a scan;
/// the others are recovered where they happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetStoreError {
    #[error("failed to enumerate assets: {0}")]
    Enumeration(String),

    #[error("failed to fetch metadata for {id}: {reason}")]
    MetadataFetch { id: String, reason: String },

    #[error("failed to resample {uri}: {reason}")]
    Resample { uri: String, reason: String },

    #[error("failed to delete assets: {0}")]
    Delete(String),
}

/// Errors that abort a whole scan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Enumeration failed: {0}")]
    Enumeration(#[from] AssetStoreError),
}
