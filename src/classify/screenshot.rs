//! Screenshot detection from asset metadata.
//!
//! Six independent signals each add a fixed weight to an additive
//! confidence, capped at 1.0. No pixel data is read.

use serde::{Deserialize, Serialize};

use super::{Signal, SignalKind};
use crate::error::AssetStoreError;
use crate::store::{AssetMetadataExtra, AssetRecord};

pub const DEFAULT_SCREENSHOT_THRESHOLD: f64 = 0.3;

const WEIGHT_MEDIA_SUBTYPE: f64 = 0.5;
const WEIGHT_FILENAME: f64 = 0.35;
const WEIGHT_ASPECT_RATIO: f64 = 0.2;
const WEIGHT_WIDTH: f64 = 0.15;
const WEIGHT_HEIGHT: f64 = 0.15;
const WEIGHT_NO_LOCATION: f64 = 0.1;

/// Confidence reported when only the filename could be evaluated.
const FALLBACK_CONFIDENCE: f64 = 0.7;

const ASPECT_RATIO_TOLERANCE: f64 = 0.06;

const SCREENSHOT_ASPECT_RATIOS: [f64; 11] = [
    0.46, 0.47, 0.48, 0.5, 0.56, 0.6, 0.75, // classic phone ratios
    0.462, 0.521, // 19.5:9, 20:9
    0.436, 0.476, // 21:9, notched displays
];

const COMMON_SCREENSHOT_WIDTHS: [u32; 12] = [
    720, 750, 828, 1080, 1170, 1242, 1284, 1290, 1440, 1620, 1920, 2160,
];

const COMMON_SCREENSHOT_HEIGHTS: [u32; 11] = [
    1334, 1792, 1920, 2208, 2340, 2436, 2532, 2688, 2778, 2796, 3088,
];

const SCREENSHOT_NAME_FRAGMENTS: [&str; 3] = ["screenshot", "screen shot", "screen_shot"];

/// Default screenshot filename prefixes of localized desktop and phone systems.
const SCREENSHOT_NAME_PREFIXES: [&str; 8] = [
    "bildschirmfoto",
    "capture d'écran",
    "capture d’écran",
    "captura de pantalla",
    "schermafbeelding",
    "istantanea schermo",
    "スクリーンショット",
    "屏幕截图",
];

pub const SCREENSHOT_SUBTYPE: &str = "screenshot";

/// Weighted screenshot confidence for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub signals: Vec<Signal>,
    pub confidence: f64,
    pub is_screenshot: bool,
    /// Set when metadata could not be fetched and only the filename was used.
    pub error: Option<String>,
}

/// Score `asset` as a screenshot.
///
/// A metadata failure degrades to a filename-only evaluation carrying an
/// error marker; this function never fails.
pub fn classify_screenshot(
    asset: &AssetRecord,
    metadata: Result<&AssetMetadataExtra, &AssetStoreError>,
    threshold: f64,
) -> SignalScore {
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(e) => return filename_fallback(asset, threshold, e),
    };

    let mut signals = Vec::new();

    if metadata.has_subtype(SCREENSHOT_SUBTYPE) {
        signals.push(Signal::flag(SignalKind::MediaSubtype, WEIGHT_MEDIA_SUBTYPE));
    }

    if is_screenshot_filename(&asset.filename) {
        signals.push(Signal::flag(SignalKind::Filename, WEIGHT_FILENAME));
    }

    if let Some(ratio) = asset.aspect_ratio() {
        if is_screenshot_ratio(ratio) {
            signals.push(Signal::number(SignalKind::AspectRatio, ratio, WEIGHT_ASPECT_RATIO));
        }
    }

    if COMMON_SCREENSHOT_WIDTHS.contains(&asset.width) {
        signals.push(Signal::number(SignalKind::Width, asset.width as f64, WEIGHT_WIDTH));
    }

    if COMMON_SCREENSHOT_HEIGHTS.contains(&asset.height) {
        signals.push(Signal::number(SignalKind::Height, asset.height as f64, WEIGHT_HEIGHT));
    }

    if !metadata.location_present {
        signals.push(Signal::flag(SignalKind::NoLocation, WEIGHT_NO_LOCATION));
    }

    let confidence = signals.iter().map(|s| s.weight).sum::<f64>().min(1.0);

    SignalScore {
        signals,
        confidence,
        is_screenshot: confidence > threshold,
        error: None,
    }
}

fn filename_fallback(asset: &AssetRecord, threshold: f64, error: &AssetStoreError) -> SignalScore {
    let matched = is_screenshot_filename(&asset.filename);
    let confidence = if matched { FALLBACK_CONFIDENCE } else { 0.0 };

    let signals = if matched {
        vec![Signal::flag(SignalKind::FilenameFallback, FALLBACK_CONFIDENCE)]
    } else {
        Vec::new()
    };

    SignalScore {
        signals,
        confidence,
        is_screenshot: confidence > threshold,
        error: Some(error.to_string()),
    }
}

pub fn is_screenshot_filename(filename: &str) -> bool {
    let name = filename.to_lowercase();
    SCREENSHOT_NAME_FRAGMENTS.iter().any(|f| name.contains(f))
        || SCREENSHOT_NAME_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn is_screenshot_ratio(ratio: f64) -> bool {
    SCREENSHOT_ASPECT_RATIOS
        .iter()
        .any(|known| (ratio - known).abs() < ASPECT_RATIO_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MediaType;
    use std::collections::BTreeSet;

    fn asset(filename: &str, width: u32, height: u32) -> AssetRecord {
        AssetRecord {
            id: "asset".to_string(),
            filename: filename.to_string(),
            width,
            height,
            creation_time: Some(1_700_000_000_000),
            media_type: MediaType::Photo,
            uri: "mem://asset".to_string(),
        }
    }

    fn metadata(subtypes: &[&str], location_present: bool) -> AssetMetadataExtra {
        AssetMetadataExtra {
            file_size_bytes: Some(500_000),
            is_favorite: false,
            location_present,
            platform_subtypes: subtypes.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn kinds(score: &SignalScore) -> Vec<SignalKind> {
        score.signals.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_all_signals_cap_at_one() {
        let score = classify_screenshot(
            &asset("Screenshot_2024.png", 1080, 2340),
            Ok(&metadata(&["screenshot"], false)),
            DEFAULT_SCREENSHOT_THRESHOLD,
        );

        assert_eq!(score.confidence, 1.0);
        assert!(score.is_screenshot);
        assert_eq!(
            kinds(&score),
            vec![
                SignalKind::MediaSubtype,
                SignalKind::Filename,
                SignalKind::AspectRatio,
                SignalKind::Width,
                SignalKind::Height,
                SignalKind::NoLocation,
            ]
        );
    }

    #[test]
    fn test_dimensions_without_filename_hint() {
        let score = classify_screenshot(
            &asset("random.jpg", 1080, 2340),
            Ok(&metadata(&[], false)),
            DEFAULT_SCREENSHOT_THRESHOLD,
        );

        assert!(kinds(&score).contains(&SignalKind::Width));
        assert!(kinds(&score).contains(&SignalKind::Height));
        assert!((score.confidence - 0.6).abs() < 1e-9);
        assert!(score.is_screenshot);
    }

    #[test]
    fn test_camera_photo_is_not_screenshot() {
        let score = classify_screenshot(
            &asset("IMG_1234.jpg", 4032, 3024),
            Ok(&metadata(&[], true)),
            DEFAULT_SCREENSHOT_THRESHOLD,
        );

        assert_eq!(score.confidence, 0.0);
        assert!(!score.is_screenshot);
        assert!(score.signals.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        // Filename alone: 0.35, plus no location: 0.45.
        let meta = metadata(&[], false);
        let subject = asset("screen shot.png", 4000, 3000);

        let at = classify_screenshot(&subject, Ok(&meta), 0.45);
        assert!((at.confidence - 0.45).abs() < 1e-9);
        assert!(!at.is_screenshot);

        let below = classify_screenshot(&subject, Ok(&meta), 0.44);
        assert!(below.is_screenshot);
    }

    #[test]
    fn test_unknown_dimensions_contribute_nothing() {
        let score = classify_screenshot(
            &asset("photo.jpg", 0, 0),
            Ok(&metadata(&[], true)),
            DEFAULT_SCREENSHOT_THRESHOLD,
        );
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn test_localized_prefix() {
        assert!(is_screenshot_filename("Bildschirmfoto 2024-01-02 um 10.00.00.png"));
        assert!(is_screenshot_filename("Screen Shot 2020-05-01.png"));
        assert!(!is_screenshot_filename("IMG_0001.HEIC"));
    }

    #[test]
    fn test_metadata_failure_falls_back_to_filename() {
        let err = AssetStoreError::MetadataFetch {
            id: "asset".to_string(),
            reason: "Permission denied".to_string(),
        };

        let score = classify_screenshot(
            &asset("Screenshot_20240204.png", 1080, 2340),
            Err(&err),
            DEFAULT_SCREENSHOT_THRESHOLD,
        );
        assert!(score.is_screenshot);
        assert_eq!(score.confidence, 0.7);
        assert!(score.error.is_some());
        assert_eq!(kinds(&score), vec![SignalKind::FilenameFallback]);

        let score = classify_screenshot(
            &asset("holiday.jpg", 1080, 2340),
            Err(&err),
            DEFAULT_SCREENSHOT_THRESHOLD,
        );
        assert!(!score.is_screenshot);
        assert_eq!(score.confidence, 0.0);
        assert!(score.error.is_some());
    }
}
