//! Metadata-driven classifiers for screenshots and blurry photos.

pub mod blur;
pub mod screenshot;

use serde::{Deserialize, Serialize};

pub use blur::{classify_blur, BlurEstimator, BlurMethod, BlurVerdict, DeepBlurEstimator, FastBlurEstimator};
pub use screenshot::{classify_screenshot, SignalScore, DEFAULT_SCREENSHOT_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    MediaSubtype,
    Filename,
    FilenameFallback,
    AspectRatio,
    Width,
    Height,
    NoLocation,
    BytesPerPixel,
    EdgeEstimation,
    Resolution,
    FileHash,
    MetadataCluster,
    SizeSimilarity,
    PerceptualHash,
}

/// Value observed for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Flag(bool),
    Number(f64),
}

/// One discrete observation and the weight it contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub value: SignalValue,
    pub weight: f64,
}

impl Signal {
    pub fn flag(kind: SignalKind, weight: f64) -> Self {
        Self {
            kind,
            value: SignalValue::Flag(true),
            weight,
        }
    }

    pub fn number(kind: SignalKind, value: f64, weight: f64) -> Self {
        Self {
            kind,
            value: SignalValue::Number(value),
            weight,
        }
    }
}
