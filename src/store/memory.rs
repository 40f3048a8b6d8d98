//! In-memory asset store.
//!
//! Holds assets, metadata and resample payloads in maps, and can be told to
//! fail specific calls. Scans against it are fully deterministic, which is
//! what the engine's tests rely on.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{
    AssetMetadataExtra, AssetRecord, AssetStore, DeleteOutcome, ListOptions, Permission,
};
use crate::error::AssetStoreError;

pub struct MemoryAssetStore {
    assets: Mutex<Vec<AssetRecord>>,
    metadata: HashMap<String, AssetMetadataExtra>,
    resampled: HashMap<String, Vec<u8>>,
    failing_metadata: HashSet<String>,
    failing_resample: HashSet<String>,
    permission: Mutex<Permission>,
    grant_on_request: bool,
    enumeration_error: Option<String>,
    delete_error: Option<String>,
    permission_requests: AtomicUsize,
    metadata_fetches: AtomicUsize,
    resample_calls: AtomicUsize,
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self {
            assets: Mutex::new(Vec::new()),
            metadata: HashMap::new(),
            resampled: HashMap::new(),
            failing_metadata: HashSet::new(),
            failing_resample: HashSet::new(),
            permission: Mutex::new(Permission::Granted),
            grant_on_request: true,
            enumeration_error: None,
            delete_error: None,
            permission_requests: AtomicUsize::new(0),
            metadata_fetches: AtomicUsize::new(0),
            resample_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_asset(mut self, asset: AssetRecord, metadata: AssetMetadataExtra) -> Self {
        self.metadata.insert(asset.id.clone(), metadata);
        self.push_asset(asset);
        self
    }

    /// Add an asset whose metadata lookup always fails.
    pub fn with_failing_metadata(mut self, asset: AssetRecord) -> Self {
        self.failing_metadata.insert(asset.id.clone());
        self.push_asset(asset);
        self
    }

    /// Bytes returned by `resample` for `uri`, whatever size is requested.
    pub fn with_resampled(mut self, uri: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.resampled.insert(uri.into(), bytes);
        self
    }

    pub fn with_failing_resample(mut self, uri: impl Into<String>) -> Self {
        self.failing_resample.insert(uri.into());
        self
    }

    /// Start with `permission`; `grant_on_request` decides what a request returns.
    pub fn with_permission(mut self, permission: Permission, grant_on_request: bool) -> Self {
        self.permission = Mutex::new(permission);
        self.grant_on_request = grant_on_request;
        self
    }

    pub fn with_enumeration_error(mut self, reason: impl Into<String>) -> Self {
        self.enumeration_error = Some(reason.into());
        self
    }

    pub fn with_delete_error(mut self, reason: impl Into<String>) -> Self {
        self.delete_error = Some(reason.into());
        self
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn metadata_fetches(&self) -> usize {
        self.metadata_fetches.load(Ordering::SeqCst)
    }

    pub fn resample_calls(&self) -> usize {
        self.resample_calls.load(Ordering::SeqCst)
    }

    pub fn asset_ids(&self) -> Vec<String> {
        self.lock_assets().iter().map(|a| a.id.clone()).collect()
    }

    fn push_asset(&mut self, asset: AssetRecord) {
        self.assets
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(asset);
    }

    fn lock_assets(&self) -> std::sync::MutexGuard<'_, Vec<AssetRecord>> {
        self.assets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AssetStore for MemoryAssetStore {
    fn check_permission(&self) -> Permission {
        *self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_permission(&self) -> Permission {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let mut permission = self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.grant_on_request {
            *permission = Permission::Granted;
        }
        *permission
    }

    fn list_assets(&self, options: &ListOptions) -> Result<Vec<AssetRecord>, AssetStoreError> {
        if let Some(ref reason) = self.enumeration_error {
            return Err(AssetStoreError::Enumeration(reason.clone()));
        }

        let mut assets: Vec<AssetRecord> = self
            .lock_assets()
            .iter()
            .filter(|a| a.media_type == options.media_type)
            .cloned()
            .collect();
        // Stable, so undated assets and ties keep insertion order.
        assets.sort_by_key(|a| a.creation_time.unwrap_or(i64::MIN));
        assets.truncate(options.limit);
        Ok(assets)
    }

    fn get_asset_metadata(&self, id: &str) -> Result<AssetMetadataExtra, AssetStoreError> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_metadata.contains(id) {
            return Err(AssetStoreError::MetadataFetch {
                id: id.to_string(),
                reason: "metadata unavailable".to_string(),
            });
        }
        self.metadata
            .get(id)
            .cloned()
            .ok_or_else(|| AssetStoreError::MetadataFetch {
                id: id.to_string(),
                reason: "asset not found".to_string(),
            })
    }

    fn resample(&self, uri: &str, _width: u32, _height: u32) -> Result<Vec<u8>, AssetStoreError> {
        self.resample_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_resample.contains(uri) {
            return Err(AssetStoreError::Resample {
                uri: uri.to_string(),
                reason: "resample failed".to_string(),
            });
        }
        self.resampled
            .get(uri)
            .cloned()
            .ok_or_else(|| AssetStoreError::Resample {
                uri: uri.to_string(),
                reason: "no image data".to_string(),
            })
    }

    fn delete_assets(&self, ids: &[String]) -> Result<DeleteOutcome, AssetStoreError> {
        if let Some(ref reason) = self.delete_error {
            return Err(AssetStoreError::Delete(reason.clone()));
        }

        let mut assets = self.lock_assets();
        if let Some(missing) = ids.iter().find(|id| !assets.iter().any(|a| &a.id == *id)) {
            return Err(AssetStoreError::Delete(format!("unknown asset {}", missing)));
        }
        let before = assets.len();
        assets.retain(|a| !ids.contains(&a.id));
        Ok(DeleteOutcome {
            deleted_count: before - assets.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MediaType;

    fn asset(id: &str, creation_time: Option<i64>) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            filename: format!("{}.jpg", id),
            width: 100,
            height: 100,
            creation_time,
            media_type: MediaType::Photo,
            uri: format!("mem://{}", id),
        }
    }

    #[test]
    fn test_lists_in_creation_order_with_limit() {
        let store = MemoryAssetStore::new()
            .with_asset(asset("late", Some(3000)), AssetMetadataExtra::default())
            .with_asset(asset("early", Some(1000)), AssetMetadataExtra::default())
            .with_asset(asset("middle", Some(2000)), AssetMetadataExtra::default());

        let options = ListOptions {
            limit: 2,
            ..ListOptions::default()
        };
        let ids: Vec<String> = store
            .list_assets(&options)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["early", "middle"]);
    }

    #[test]
    fn test_delete_is_all_or_nothing() {
        let store = MemoryAssetStore::new()
            .with_asset(asset("a", None), AssetMetadataExtra::default())
            .with_asset(asset("b", None), AssetMetadataExtra::default());

        let err = store
            .delete_assets(&["a".to_string(), "missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, AssetStoreError::Delete(_)));
        assert_eq!(store.asset_ids().len(), 2);

        let outcome = store.delete_assets(&["a".to_string()]).unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(store.asset_ids(), vec!["b"]);
    }

    #[test]
    fn test_delete_counts_each_asset_once() {
        let store = MemoryAssetStore::new()
            .with_asset(asset("a", None), AssetMetadataExtra::default())
            .with_asset(asset("b", None), AssetMetadataExtra::default());

        let outcome = store
            .delete_assets(&["a".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(store.asset_ids(), vec!["b"]);
    }

    #[test]
    fn test_request_permission_counts_calls() {
        let store = MemoryAssetStore::new().with_permission(Permission::Denied, false);
        assert_eq!(store.check_permission(), Permission::Denied);
        assert_eq!(store.request_permission(), Permission::Denied);
        assert_eq!(store.permission_requests(), 1);
    }
}
