use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ScanOptions;
use crate::classify::{BlurVerdict, SignalScore};
use crate::dedupe::ranking::{rank_groups, DuplicateGroup};
use crate::dedupe::DuplicateRelation;
use crate::store::AssetRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotFinding {
    #[serde(flatten)]
    pub asset: AssetRecord,
    pub file_size_bytes: Option<u64>,
    pub score: SignalScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlurFinding {
    #[serde(flatten)]
    pub asset: AssetRecord,
    pub file_size_bytes: Option<u64>,
    pub verdict: BlurVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateFinding {
    #[serde(flatten)]
    pub asset: AssetRecord,
    pub file_size_bytes: Option<u64>,
    pub location_present: bool,
    pub relation: DuplicateRelation,
}

/// Annotated assets per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetails {
    pub screenshots: Vec<ScreenshotFinding>,
    pub blurry: Vec<BlurFinding>,
    pub duplicates: Vec<DuplicateFinding>,
}

/// Outcome of one scan. Counts always equal the lengths of the detail lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub screenshots: usize,
    pub blurry: usize,
    pub duplicates: usize,
    pub total_space_bytes: u64,
    pub details: CategoryDetails,
    /// Every enumerated asset, including favorites and ones that failed.
    pub scanned_count: usize,
    pub scan_options: ScanOptions,
    pub cancelled: bool,
}

impl ScanResult {
    pub(crate) fn new(
        details: CategoryDetails,
        total_space_bytes: u64,
        scanned_count: usize,
        scan_options: ScanOptions,
        cancelled: bool,
    ) -> Self {
        Self {
            screenshots: details.screenshots.len(),
            blurry: details.blurry.len(),
            duplicates: details.duplicates.len(),
            total_space_bytes,
            details,
            scanned_count,
            scan_options,
            cancelled,
        }
    }

    pub fn flagged_count(&self) -> usize {
        self.screenshots + self.blurry + self.duplicates
    }

    /// Ids of every flagged asset, screenshots first.
    pub fn flagged_ids(&self) -> Vec<String> {
        self.details
            .screenshots
            .iter()
            .map(|f| f.asset.id.clone())
            .chain(self.details.duplicates.iter().map(|f| f.asset.id.clone()))
            .chain(self.details.blurry.iter().map(|f| f.asset.id.clone()))
            .collect()
    }

    pub fn duplicate_groups(&self, now: DateTime<Utc>) -> Vec<DuplicateGroup> {
        rank_groups(&self.details.duplicates, now)
    }
}
