//! Deleting flagged photos and reporting reclaimed space.

use crate::error::AssetStoreError;
use crate::store::{AssetStore, DeleteOutcome};

/// Delete `ids` through the store. Failures are returned as-is.
pub fn delete_photos(store: &dyn AssetStore, ids: &[String]) -> Result<DeleteOutcome, AssetStoreError> {
    if ids.is_empty() {
        return Ok(DeleteOutcome { deleted_count: 0 });
    }

    match store.delete_assets(ids) {
        Ok(outcome) => {
            tracing::info!(count = outcome.deleted_count, "Deleted photos");
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error deleting photos");
            Err(e)
        }
    }
}

/// Human-readable size in powers of 1024, e.g. `1.5 KB`. Stops at GB.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut scale: u64 = 1;
    while unit + 1 < UNITS.len() && bytes >= scale * 1024 {
        scale *= 1024;
        unit += 1;
    }

    let value = format!("{:.2}", bytes as f64 / scale as f64);
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AssetMetadataExtra, AssetRecord, MediaType, MemoryAssetStore};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 1024 * 1024 / 4), "5.25 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    fn store() -> MemoryAssetStore {
        let asset = AssetRecord {
            id: "a".to_string(),
            filename: "a.jpg".to_string(),
            width: 10,
            height: 10,
            creation_time: Some(0),
            media_type: MediaType::Photo,
            uri: "mem://a".to_string(),
        };
        MemoryAssetStore::new().with_asset(asset, AssetMetadataExtra::default())
    }

    #[test]
    fn test_delete_photos() {
        let store = store();
        let outcome = delete_photos(&store, &["a".to_string()]).unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert!(store.asset_ids().is_empty());
    }

    #[test]
    fn test_delete_nothing() {
        let store = store().with_delete_error("should not be called");
        assert_eq!(delete_photos(&store, &[]).unwrap().deleted_count, 0);
    }

    #[test]
    fn test_delete_error_surfaces() {
        let store = store().with_delete_error("user declined");
        let err = delete_photos(&store, &["a".to_string()]).unwrap_err();
        assert_eq!(err, AssetStoreError::Delete("user declined".to_string()));
        assert_eq!(store.asset_ids(), vec!["a"]);
    }
}
