//! Blur estimation.
//!
//! Two strategies share the [`BlurEstimator`] trait. The fast one looks only
//! at compressed bytes per pixel. The deep one also resamples the image and
//! uses the size of the re-encoded thumbnail as an edge-energy proxy. Either
//! can be replaced by a real edge detector without touching the scanner.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{Signal, SignalKind};
use crate::error::AssetStoreError;
use crate::store::{AssetMetadataExtra, AssetRecord, AssetStore};

/// Bytes per pixel below which a photo is considered blurry.
const BLURRY_DENSITY: f64 = 0.3;
/// Bytes per pixel at which the deep density score saturates.
const SHARP_DENSITY: f64 = 0.5;

const FAST_BLURRY_CONFIDENCE: f64 = 0.6;
const FAST_SHARP_CONFIDENCE: f64 = 0.3;

const EDGE_SAMPLE_SIZE: u32 = 64;
/// Encoded length expected from a sharp 64x64 thumbnail.
const EXPECTED_EDGE_SAMPLE_LEN: f64 = (EDGE_SAMPLE_SIZE * EDGE_SAMPLE_SIZE) as f64 * 1.5;
const RESOLUTION_SATURATION: f64 = 1_000_000.0;

const WEIGHT_DENSITY: f64 = 0.4;
const WEIGHT_EDGES: f64 = 0.4;
const WEIGHT_RESOLUTION: f64 = 0.2;

const DEEP_BLURRY_BELOW: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlurMethod {
    Fast,
    Deep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlurVerdict {
    pub is_blurry: bool,
    pub confidence: f64,
    pub method: BlurMethod,
    pub signals: Vec<Signal>,
    pub error: Option<String>,
}

impl BlurVerdict {
    /// The non-match returned whenever evidence could not be gathered.
    fn inconclusive(method: BlurMethod, error: impl Into<String>) -> Self {
        Self {
            is_blurry: false,
            confidence: 0.0,
            method,
            signals: Vec::new(),
            error: Some(error.into()),
        }
    }
}

pub trait BlurEstimator: Send + Sync {
    fn method(&self) -> BlurMethod;

    fn estimate(
        &self,
        asset: &AssetRecord,
        metadata: Result<&AssetMetadataExtra, &AssetStoreError>,
        store: &dyn AssetStore,
    ) -> BlurVerdict;
}

/// Classify with the estimator matching `method`.
pub fn classify_blur(
    asset: &AssetRecord,
    metadata: Result<&AssetMetadataExtra, &AssetStoreError>,
    method: BlurMethod,
    store: &dyn AssetStore,
) -> BlurVerdict {
    estimator_for(method).estimate(asset, metadata, store)
}

pub fn estimator_for(method: BlurMethod) -> Box<dyn BlurEstimator> {
    match method {
        BlurMethod::Fast => Box::new(FastBlurEstimator),
        BlurMethod::Deep => Box::new(DeepBlurEstimator),
    }
}

/// Bytes per pixel; unknown dimensions count as a single pixel.
fn density(asset: &AssetRecord, file_size: u64) -> f64 {
    file_size as f64 / asset.pixel_count().unwrap_or(1) as f64
}

fn known_file_size(
    asset: &AssetRecord,
    metadata: Result<&AssetMetadataExtra, &AssetStoreError>,
) -> Result<u64, String> {
    match metadata {
        Ok(metadata) => metadata
            .file_size_bytes
            .ok_or_else(|| format!("file size unknown for {}", asset.id)),
        Err(e) => Err(e.to_string()),
    }
}

/// File-size heuristic. Performs no image I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastBlurEstimator;

impl BlurEstimator for FastBlurEstimator {
    fn method(&self) -> BlurMethod {
        BlurMethod::Fast
    }

    fn estimate(
        &self,
        asset: &AssetRecord,
        metadata: Result<&AssetMetadataExtra, &AssetStoreError>,
        _store: &dyn AssetStore,
    ) -> BlurVerdict {
        let file_size = match known_file_size(asset, metadata) {
            Ok(size) => size,
            Err(e) => return BlurVerdict::inconclusive(BlurMethod::Fast, e),
        };

        let density = density(asset, file_size);
        let is_blurry = density < BLURRY_DENSITY;

        BlurVerdict {
            is_blurry,
            confidence: if is_blurry {
                FAST_BLURRY_CONFIDENCE
            } else {
                FAST_SHARP_CONFIDENCE
            },
            method: BlurMethod::Fast,
            signals: vec![Signal::number(SignalKind::BytesPerPixel, density, 1.0)],
            error: None,
        }
    }
}

/// Density, edge-energy proxy and resolution, combined with fixed weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepBlurEstimator;

impl DeepBlurEstimator {
    /// Edge-energy proxy in [0, 1] from an encoded 64x64 resample.
    ///
    /// Detailed images compress less, so their thumbnails are larger. The
    /// length is measured on the base64 text of the encoded bytes.
    pub fn edge_score(encoded: &[u8]) -> f64 {
        let encoded_len = STANDARD.encode(encoded).len() as f64;
        let compression_ratio = encoded_len / EXPECTED_EDGE_SAMPLE_LEN;
        (compression_ratio - 0.5).clamp(0.0, 1.0)
    }
}

impl BlurEstimator for DeepBlurEstimator {
    fn method(&self) -> BlurMethod {
        BlurMethod::Deep
    }

    fn estimate(
        &self,
        asset: &AssetRecord,
        metadata: Result<&AssetMetadataExtra, &AssetStoreError>,
        store: &dyn AssetStore,
    ) -> BlurVerdict {
        let file_size = match known_file_size(asset, metadata) {
            Ok(size) => size,
            Err(e) => return BlurVerdict::inconclusive(BlurMethod::Deep, e),
        };

        let sample = match store.resample(&asset.uri, EDGE_SAMPLE_SIZE, EDGE_SAMPLE_SIZE) {
            Ok(bytes) => bytes,
            Err(e) => return BlurVerdict::inconclusive(BlurMethod::Deep, e.to_string()),
        };

        let density = density(asset, file_size);
        let density_score = (density / SHARP_DENSITY).min(1.0);
        let edge_score = Self::edge_score(&sample);
        let resolution = asset.pixel_count().unwrap_or(0) as f64;
        let resolution_score = (resolution / RESOLUTION_SATURATION).min(1.0);

        let combined = density_score * WEIGHT_DENSITY
            + edge_score * WEIGHT_EDGES
            + resolution_score * WEIGHT_RESOLUTION;

        let is_blurry = combined < DEEP_BLURRY_BELOW;
        let confidence = if is_blurry { 1.0 - combined } else { combined };

        BlurVerdict {
            is_blurry,
            confidence: confidence.clamp(0.0, 1.0),
            method: BlurMethod::Deep,
            signals: vec![
                Signal::number(SignalKind::BytesPerPixel, density, WEIGHT_DENSITY),
                Signal::number(SignalKind::EdgeEstimation, edge_score, WEIGHT_EDGES),
                Signal::number(SignalKind::Resolution, resolution, WEIGHT_RESOLUTION),
            ],
            error: None,
        }
    }
}
