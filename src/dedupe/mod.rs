//! Duplicate detection and keeper selection.

pub mod phash;
pub mod ranking;
pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::classify::Signal;

pub use phash::{are_similar, hamming_distance, percent_similar, HashSampling, PerceptualHash, PerceptualHasher};
pub use ranking::{group_duplicates, select_best_in_groups, smart_select, DuplicateGroup, SmartSelection};
pub use resolver::{find_duplicates, DuplicateResolver, ResolverOptions, SimilarityMethod};

/// Detection method of a duplicate. Encodes how much the match is trusted,
/// not how severe it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateTier {
    Exact,
    Near,
    Similar,
}

impl DuplicateTier {
    pub fn confidence(&self) -> f64 {
        match self {
            DuplicateTier::Exact => 1.0,
            DuplicateTier::Near => 0.85,
            DuplicateTier::Similar => 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateRelation {
    pub original_id: String,
    pub duplicate_id: String,
    pub tier: DuplicateTier,
    pub confidence: f64,
    pub signals: Vec<Signal>,
}

impl DuplicateRelation {
    pub fn new(original_id: &str, duplicate_id: &str, tier: DuplicateTier, signals: Vec<Signal>) -> Self {
        Self {
            original_id: original_id.to_string(),
            duplicate_id: duplicate_id.to_string(),
            tier,
            confidence: tier.confidence(),
            signals,
        }
    }
}
