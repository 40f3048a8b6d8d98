//! 72-bit difference hash (dHash) over a 9x9 resample.
//!
//! Each of the 9 rows contributes 8 bits, one per adjacent pair of samples
//! (`1` when the left sample is brighter). Bits are packed row-major into
//! 18 lowercase hex digits.
//!
//! The store hands back encoded image bytes rather than pixels, so the
//! default sampler derives the 81 samples from a SHA-256 digest of those
//! bytes. [`HashSampling::Pixels`] decodes the resample and uses real luma
//! instead; the hash layout is the same either way.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::store::AssetStore;

pub const HASH_GRID: u32 = 9;
const SAMPLE_COUNT: usize = (HASH_GRID * HASH_GRID) as usize;
pub const HASH_BITS: usize = (HASH_GRID * (HASH_GRID - 1)) as usize;

/// Default `are_similar` threshold, in percent.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 85.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash(String);

impl PerceptualHash {
    /// Parse a hex hash. Any non-empty hex string is accepted so hashes of
    /// other lengths can be represented; they simply never compare as similar.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bit_len(&self) -> usize {
        self.0.len() * 4
    }

    fn nibbles(&self) -> impl Iterator<Item = u32> + '_ {
        // Validated as hex on construction.
        self.0.chars().map(|c| c.to_digit(16).unwrap_or(0))
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid perceptual hash: {}", value))
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.0
    }
}

/// Number of differing bits, or `None` when the lengths differ.
pub fn hamming_distance(a: &PerceptualHash, b: &PerceptualHash) -> Option<u32> {
    if a.bit_len() != b.bit_len() {
        return None;
    }
    Some(
        a.nibbles()
            .zip(b.nibbles())
            .map(|(x, y)| (x ^ y).count_ones())
            .sum(),
    )
}

/// Similarity in percent: `100 * (bits - distance) / bits`, 0 for unequal lengths.
pub fn percent_similar(a: &PerceptualHash, b: &PerceptualHash) -> f64 {
    match hamming_distance(a, b) {
        Some(distance) => {
            let bits = a.bit_len() as f64;
            100.0 * (bits - distance as f64) / bits
        }
        None => 0.0,
    }
}

pub fn are_similar(a: &PerceptualHash, b: &PerceptualHash, threshold: f64) -> bool {
    percent_similar(a, b) >= threshold
}

/// How the 81 samples are obtained from a 9x9 resample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashSampling {
    /// Bytes of a SHA-256 digest of the encoded resample.
    #[default]
    Digest,
    /// Decoded 8-bit luma of the resample.
    Pixels,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualHasher {
    sampling: HashSampling,
}

impl PerceptualHasher {
    pub fn new(sampling: HashSampling) -> Self {
        Self { sampling }
    }

    /// Hash the image at `uri`, or `None` if it cannot be resampled or decoded.
    pub fn compute_hash(&self, store: &dyn AssetStore, uri: &str) -> Option<PerceptualHash> {
        let encoded = match store.resample(uri, HASH_GRID, HASH_GRID) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "Perceptual hash resample failed");
                return None;
            }
        };

        match self.hash_encoded(&encoded) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "Perceptual hash failed");
                None
            }
        }
    }

    /// Hash already-resampled encoded image bytes.
    pub fn hash_encoded(&self, encoded: &[u8]) -> Result<PerceptualHash> {
        let samples = match self.sampling {
            HashSampling::Digest => digest_samples(encoded),
            HashSampling::Pixels => pixel_samples(encoded)?,
        };
        Ok(difference_hash(&samples))
    }
}

fn digest_samples(encoded: &[u8]) -> [u8; SAMPLE_COUNT] {
    let text = STANDARD.encode(encoded);
    let digest = Sha256::digest(text.as_bytes());

    let mut samples = [0u8; SAMPLE_COUNT];
    for (slot, byte) in samples.iter_mut().zip(digest.iter()) {
        *slot = *byte;
    }
    samples
}

fn pixel_samples(encoded: &[u8]) -> Result<[u8; SAMPLE_COUNT]> {
    let image = image::load_from_memory(encoded)?;
    let luma = image
        .resize_exact(HASH_GRID, HASH_GRID, image::imageops::FilterType::Triangle)
        .to_luma8()
        .into_raw();

    luma.try_into()
        .map_err(|raw: Vec<u8>| anyhow!("expected {} samples, got {}", SAMPLE_COUNT, raw.len()))
}

/// Row-major difference hash over a 9x9 grid of samples.
pub fn difference_hash(samples: &[u8; SAMPLE_COUNT]) -> PerceptualHash {
    let grid = HASH_GRID as usize;
    let mut bits = Vec::with_capacity(HASH_BITS);

    for row in 0..grid {
        for col in 0..grid - 1 {
            let index = row * grid + col;
            bits.push(samples[index] > samples[index + 1]);
        }
    }

    PerceptualHash(pack_hex(&bits))
}

fn pack_hex(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|chunk| {
            let nibble = chunk
                .iter()
                .fold(0u32, |acc, &bit| (acc << 1) | u32::from(bit));
            char::from_digit(nibble, 16).unwrap_or('0')
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAssetStore;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn hash(hex: &str) -> PerceptualHash {
        PerceptualHash::from_hex(hex).unwrap()
    }

    #[test]
    fn test_hash_has_72_bits() {
        let h = PerceptualHasher::default().hash_encoded(b"some jpeg bytes").unwrap();
        assert_eq!(h.as_str().len(), 18);
        assert_eq!(h.bit_len(), HASH_BITS);
    }

    #[test]
    fn test_digest_sampling_is_deterministic() {
        let hasher = PerceptualHasher::default();
        let a = hasher.hash_encoded(b"image").unwrap();
        let b = hasher.hash_encoded(b"image").unwrap();
        let c = hasher.hash_encoded(b"other image").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_padding_rows_are_zero() {
        // Only the first 32 samples come from the digest; rows 4..9 are padding.
        let h = PerceptualHasher::default().hash_encoded(b"image").unwrap();
        assert!(h.as_str()[8..].chars().all(|c| c == '0'));
    }

    #[test]
    fn test_self_distance_is_zero() {
        let h = PerceptualHasher::default().hash_encoded(b"image").unwrap();
        assert_eq!(hamming_distance(&h, &h), Some(0));
        assert!(are_similar(&h, &h, DEFAULT_SIMILARITY_THRESHOLD));
        assert_eq!(percent_similar(&h, &h), 100.0);
    }

    #[test]
    fn test_distance_counts_bits() {
        let a = hash("000000000000000000");
        let b = hash("f00000000000000001");
        assert_eq!(hamming_distance(&a, &b), Some(5));
        assert!((percent_similar(&a, &b) - 100.0 * 67.0 / 72.0).abs() < 1e-9);
        assert!(are_similar(&a, &b, 85.0));
        assert!(!are_similar(&a, &hash("ffff00000000000000"), 85.0));
    }

    #[test]
    fn test_unequal_lengths_are_dissimilar() {
        let a = hash("abcd");
        let b = hash("abcdef");
        assert_eq!(hamming_distance(&a, &b), None);
        assert_eq!(percent_similar(&a, &b), 0.0);
        assert!(!are_similar(&a, &b, 0.1));
    }

    #[test]
    fn test_rejects_non_hex() {
        assert!(PerceptualHash::from_hex("xyz").is_none());
        assert!(PerceptualHash::from_hex("").is_none());
        assert_eq!(hash("ABC").as_str(), "abc");
    }

    #[test]
    fn test_difference_hash_of_gradient() {
        // Brightness falls left to right: every comparison is 1.
        let mut samples = [0u8; 81];
        for row in 0..9 {
            for col in 0..9 {
                samples[row * 9 + col] = 200 - (col as u8) * 20;
            }
        }
        assert_eq!(difference_hash(&samples).as_str(), "ffffffffffffffffff");
    }

    #[test]
    fn test_pixel_sampling_reads_luma() {
        let image = GrayImage::from_fn(9, 9, |x, _| Luma([(x * 25) as u8]));
        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image)
            .write_to(&mut encoded, ImageFormat::Png)
            .unwrap();

        // Brightness rises left to right: every comparison is 0.
        let h = PerceptualHasher::new(HashSampling::Pixels)
            .hash_encoded(encoded.get_ref())
            .unwrap();
        assert_eq!(h.as_str(), "000000000000000000");
    }

    #[test]
    fn test_compute_hash_resample_failure() {
        let store = MemoryAssetStore::new().with_failing_resample("mem://a");
        assert!(PerceptualHasher::default().compute_hash(&store, "mem://a").is_none());

        let store = MemoryAssetStore::new().with_resampled("mem://a", b"bytes".to_vec());
        assert!(PerceptualHasher::default().compute_hash(&store, "mem://a").is_some());
    }
}
