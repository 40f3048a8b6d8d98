//! Three-tier duplicate resolution.
//!
//! Every asset is checked against the tiers in order and the first match
//! wins:
//!
//! 1. exact: same file size, dimensions and filename;
//! 2. near: same dimensions, taken within the same 5 second window, and
//!    file sizes within 10% of each other;
//! 3. similar: same aspect/quality/5 minute bucket, or (with
//!    [`SimilarityMethod::Perceptual`]) a similar 9x9 difference hash.
//!
//! The first asset registered under a key is the only anchor that later
//! assets are compared against. A resolver holds its lookup maps for one
//! pass only; build a new one per scan.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::phash::{are_similar, percent_similar, HashSampling, PerceptualHash, PerceptualHasher, DEFAULT_SIMILARITY_THRESHOLD};
use super::{DuplicateRelation, DuplicateTier};
use crate::classify::{Signal, SignalKind};
use crate::store::{AssetMetadataExtra, AssetRecord, AssetStore};

/// Width of the near-duplicate capture window.
pub const NEAR_TIME_WINDOW_MS: i64 = 5_000;
/// Near duplicates must differ in size by less than this fraction.
const NEAR_SIZE_TOLERANCE: f64 = 0.1;
/// Width of the visual-similarity time bucket.
pub const SIMILAR_TIME_BUCKET_MS: i64 = 5 * 60 * 1000;
const SIMILAR_KEY_LEN: usize = 16;

/// How tier 3 decides two photos look alike.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMethod {
    /// Exact match of a key built from aspect ratio, bytes per pixel and a
    /// 5 minute time bucket.
    #[default]
    Metadata,
    /// Hamming similarity of 9x9 difference hashes.
    Perceptual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverOptions {
    pub include_visual_similarity: bool,
    pub similarity_method: SimilarityMethod,
    pub hash_sampling: HashSampling,
    /// Percent threshold for [`SimilarityMethod::Perceptual`].
    pub similarity_threshold: f64,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            include_visual_similarity: true,
            similarity_method: SimilarityMethod::Metadata,
            hash_sampling: HashSampling::Digest,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
struct Anchor {
    id: String,
    size: u64,
}

pub struct DuplicateResolver<'a> {
    store: &'a dyn AssetStore,
    options: ResolverOptions,
    hasher: PerceptualHasher,
    exact: HashMap<String, String>,
    near: HashMap<(u32, u32, i64), Anchor>,
    similar: HashMap<String, String>,
    perceptual: Vec<(String, PerceptualHash)>,
    metadata: HashMap<String, AssetMetadataExtra>,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(store: &'a dyn AssetStore, options: ResolverOptions) -> Self {
        Self {
            store,
            options,
            hasher: PerceptualHasher::new(options.hash_sampling),
            exact: HashMap::new(),
            near: HashMap::new(),
            similar: HashMap::new(),
            perceptual: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Resolve `assets` in order and return relations in scan order.
    ///
    /// Assets whose metadata cannot be fetched are left out of every tier.
    pub fn resolve(&mut self, assets: &[AssetRecord]) -> Vec<DuplicateRelation> {
        let mut relations = Vec::new();

        for asset in assets {
            let metadata = match self.store.get_asset_metadata(&asset.id) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(asset = %asset.id, error = %e, "Skipping asset for duplicate detection");
                    continue;
                }
            };

            let relation = self
                .check_exact(asset, &metadata)
                .or_else(|| self.check_near(asset, &metadata))
                .or_else(|| self.check_similar(asset, &metadata));

            self.metadata.insert(asset.id.clone(), metadata);

            if let Some(relation) = relation {
                tracing::debug!(
                    original = %relation.original_id,
                    duplicate = %relation.duplicate_id,
                    tier = ?relation.tier,
                    "Duplicate found"
                );
                relations.push(relation);
            }
        }

        relations
    }

    /// Metadata fetched for `id` during [`resolve`](Self::resolve).
    pub fn metadata_for(&self, id: &str) -> Option<&AssetMetadataExtra> {
        self.metadata.get(id)
    }

    fn check_exact(&mut self, asset: &AssetRecord, metadata: &AssetMetadataExtra) -> Option<DuplicateRelation> {
        let key = exact_key(asset, metadata)?;

        match self.exact.get(&key) {
            Some(original) => Some(DuplicateRelation::new(
                original,
                &asset.id,
                DuplicateTier::Exact,
                vec![Signal::flag(SignalKind::FileHash, 1.0)],
            )),
            None => {
                self.exact.insert(key, asset.id.clone());
                None
            }
        }
    }

    fn check_near(&mut self, asset: &AssetRecord, metadata: &AssetMetadataExtra) -> Option<DuplicateRelation> {
        let key = near_key(asset)?;
        let size = metadata.file_size_bytes.unwrap_or(0);

        match self.near.get(&key) {
            Some(anchor) => {
                let diff = anchor.size.abs_diff(size);
                let tolerance = anchor.size.max(size) as f64 * NEAR_SIZE_TOLERANCE;
                if (diff as f64) < tolerance {
                    Some(DuplicateRelation::new(
                        &anchor.id,
                        &asset.id,
                        DuplicateTier::Near,
                        vec![
                            Signal::flag(SignalKind::MetadataCluster, 1.0),
                            Signal::number(SignalKind::SizeSimilarity, diff as f64, 1.0),
                        ],
                    ))
                } else {
                    // The anchor stays; this asset never becomes one.
                    None
                }
            }
            None => {
                self.near.insert(
                    key,
                    Anchor {
                        id: asset.id.clone(),
                        size,
                    },
                );
                None
            }
        }
    }

    fn check_similar(&mut self, asset: &AssetRecord, metadata: &AssetMetadataExtra) -> Option<DuplicateRelation> {
        if !self.options.include_visual_similarity {
            return None;
        }

        match self.options.similarity_method {
            SimilarityMethod::Metadata => {
                let key = similarity_key(asset, metadata)?;
                match self.similar.get(&key) {
                    Some(original) => Some(DuplicateRelation::new(
                        original,
                        &asset.id,
                        DuplicateTier::Similar,
                        vec![Signal::flag(SignalKind::PerceptualHash, 1.0)],
                    )),
                    None => {
                        self.similar.insert(key, asset.id.clone());
                        None
                    }
                }
            }
            SimilarityMethod::Perceptual => {
                let hash = self.hasher.compute_hash(self.store, &asset.uri)?;
                let threshold = self.options.similarity_threshold;
                let matched = self
                    .perceptual
                    .iter()
                    .find(|(_, anchor)| are_similar(anchor, &hash, threshold));

                match matched {
                    Some((original, anchor)) => Some(DuplicateRelation::new(
                        original,
                        &asset.id,
                        DuplicateTier::Similar,
                        vec![Signal::number(
                            SignalKind::PerceptualHash,
                            percent_similar(anchor, &hash),
                            1.0,
                        )],
                    )),
                    None => {
                        self.perceptual.push((asset.id.clone(), hash));
                        None
                    }
                }
            }
        }
    }
}

/// Resolve `assets` with a fresh resolver.
pub fn find_duplicates(
    store: &dyn AssetStore,
    assets: &[AssetRecord],
    options: ResolverOptions,
) -> Vec<DuplicateRelation> {
    DuplicateResolver::new(store, options).resolve(assets)
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Digest of size, dimensions and filename. `None` when the size is unknown.
fn exact_key(asset: &AssetRecord, metadata: &AssetMetadataExtra) -> Option<String> {
    let size = metadata.file_size_bytes?;
    Some(md5_hex(&format!(
        "{}_{}_{}_{}",
        size, asset.width, asset.height, asset.filename
    )))
}

/// Dimensions plus 5 second capture window. Needs known dimensions and time.
fn near_key(asset: &AssetRecord) -> Option<(u32, u32, i64)> {
    asset.pixel_count()?;
    let created = asset.creation_time?;
    Some((asset.width, asset.height, created.div_euclid(NEAR_TIME_WINDOW_MS)))
}

/// Aspect-ratio, bytes-per-pixel and 5 minute buckets, digested.
fn similarity_key(asset: &AssetRecord, metadata: &AssetMetadataExtra) -> Option<String> {
    let aspect = asset.aspect_ratio()?;
    let pixels = asset.pixel_count()?;
    let size = metadata.file_size_bytes?;
    let created = asset.creation_time?;

    let aspect_bucket = (aspect * 1000.0).floor() as i64;
    let quality_bucket = (size as f64 / pixels as f64 * 10_000.0).floor() as i64;
    let time_bucket = created.div_euclid(SIMILAR_TIME_BUCKET_MS);

    let mut key = md5_hex(&format!("{}_{}_{}", aspect_bucket, quality_bucket, time_bucket));
    key.truncate(SIMILAR_KEY_LEN);
    Some(key)
}
