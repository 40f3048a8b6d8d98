//! Keeper selection within duplicate groups.
//!
//! Duplicates flagged against the same original form a group. Within a
//! group of two or more, the highest scoring photo is kept and the others
//! become deletion candidates. Equal scores keep relation order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::scanner::DuplicateFinding;

const MS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;
const AGE_PENALTY_PER_DAY: f64 = 0.1;
const EDITED_NAME_BONUS: f64 = 5.0;
const COPY_NAME_PENALTY: f64 = 2.0;
const LOCATION_BONUS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub original_id: String,
    pub keeper: String,
    pub keeper_score: f64,
    /// Everything in the group except the keeper, best first.
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmartSelection<'a> {
    pub keep: Vec<&'a DuplicateFinding>,
    pub delete: Vec<&'a DuplicateFinding>,
}

impl SmartSelection<'_> {
    pub fn kept_count(&self) -> usize {
        self.keep.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.delete.len()
    }
}

/// Quality score; higher means more worth keeping.
pub fn score_photo(finding: &DuplicateFinding, now: DateTime<Utc>) -> f64 {
    let asset = &finding.asset;
    let mut score = 0.0;

    score += finding.file_size_bytes.unwrap_or(0) as f64 / 1_000_000.0;
    score += asset.pixel_count().unwrap_or(0) as f64 / 1_000_000.0;

    if let Some(created) = asset.creation_time {
        let age_days = (now.timestamp_millis() - created) as f64 / MS_PER_DAY;
        score -= age_days * AGE_PENALTY_PER_DAY;
    }

    let name = asset.filename.to_lowercase();
    if name.contains("edit") || name.contains("crop") {
        score += EDITED_NAME_BONUS;
    }
    if name.contains("copy") {
        score -= COPY_NAME_PENALTY;
    }

    if finding.location_present {
        score += LOCATION_BONUS;
    }

    score
}

/// Findings grouped by original id, groups in order of first appearance.
pub fn group_duplicates(findings: &[DuplicateFinding]) -> Vec<(&str, Vec<&DuplicateFinding>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&DuplicateFinding>)> = Vec::new();

    for finding in findings {
        let original = finding.relation.original_id.as_str();
        match index.get(original) {
            Some(&slot) => groups[slot].1.push(finding),
            None => {
                index.insert(original, groups.len());
                groups.push((original, vec![finding]));
            }
        }
    }

    groups
}

/// Rank every group of two or more members.
pub fn rank_groups(findings: &[DuplicateFinding], now: DateTime<Utc>) -> Vec<DuplicateGroup> {
    group_duplicates(findings)
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(original_id, members)| {
            let mut scored: Vec<(&DuplicateFinding, f64)> =
                members.into_iter().map(|m| (m, score_photo(m, now))).collect();
            // Stable: equal scores keep relation order.
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

            let (keeper, keeper_score) = scored[0];
            tracing::debug!(
                group = %original_id,
                keeper = %keeper.asset.filename,
                score = keeper_score,
                "Selected keeper"
            );

            DuplicateGroup {
                original_id: original_id.to_string(),
                keeper: keeper.asset.id.clone(),
                keeper_score,
                candidates: scored[1..].iter().map(|(m, _)| m.asset.id.clone()).collect(),
            }
        })
        .collect()
}

/// Ids to delete so that each group keeps only its best photo.
pub fn select_best_in_groups(findings: &[DuplicateFinding], now: DateTime<Utc>) -> Vec<String> {
    rank_groups(findings, now)
        .into_iter()
        .flat_map(|group| group.candidates)
        .collect()
}

/// Split findings into those to keep and those to delete.
pub fn smart_select(findings: &[DuplicateFinding], now: DateTime<Utc>) -> SmartSelection<'_> {
    let to_delete = select_best_in_groups(findings, now);
    let (delete, keep): (Vec<&DuplicateFinding>, Vec<&DuplicateFinding>) = findings
        .iter()
        .partition(|f| to_delete.contains(&f.asset.id));
    SmartSelection { keep, delete }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::{DuplicateRelation, DuplicateTier};
    use crate::store::{AssetRecord, MediaType};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn finding(id: &str, original: &str, filename: &str, size: u64, location: bool) -> DuplicateFinding {
        DuplicateFinding {
            asset: AssetRecord {
                id: id.to_string(),
                filename: filename.to_string(),
                width: 4000,
                height: 3000,
                creation_time: Some(now().timestamp_millis()),
                media_type: MediaType::Photo,
                uri: format!("mem://{}", id),
            },
            file_size_bytes: Some(size),
            location_present: location,
            relation: DuplicateRelation::new(original, id, DuplicateTier::Exact, Vec::new()),
        }
    }

    #[test]
    fn test_score_components() {
        // 3 MB + 12 MP + 5 (edit) + 3 (location), age 0.
        let f = finding("a", "o", "IMG_edit.jpg", 3_000_000, true);
        assert!((score_photo(&f, now()) - 23.0).abs() < 1e-9);

        // 3 MB + 12 MP - 2 (copy)
        let f = finding("b", "o", "photo copy.jpg", 3_000_000, false);
        assert!((score_photo(&f, now()) - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_older_photos_score_lower() {
        let mut old = finding("old", "o", "a.jpg", 3_000_000, false);
        old.asset.creation_time = Some(now().timestamp_millis() - 10 * 86_400_000);
        let fresh = finding("fresh", "o", "a.jpg", 3_000_000, false);
        assert!((score_photo(&fresh, now()) - score_photo(&old, now()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_of_n_returns_n_minus_one() {
        let findings = vec![
            finding("a", "orig", "a.jpg", 1_000_000, false),
            finding("b", "orig", "b.jpg", 5_000_000, false),
            finding("c", "orig", "c.jpg", 2_000_000, false),
            finding("single", "other", "d.jpg", 1_000_000, false),
        ];

        let to_delete = select_best_in_groups(&findings, now());
        assert_eq!(to_delete, vec!["c", "a"]);

        let groups = rank_groups(&findings, now());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keeper, "b");
        assert_eq!(groups[0].original_id, "orig");
    }

    #[test]
    fn test_ties_keep_relation_order() {
        let findings = vec![
            finding("first", "orig", "a.jpg", 1_000_000, false),
            finding("second", "orig", "b.jpg", 1_000_000, false),
        ];
        assert_eq!(select_best_in_groups(&findings, now()), vec!["second"]);
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let findings = vec![
            finding("a", "x", "a.jpg", 1, false),
            finding("b", "y", "b.jpg", 1, false),
            finding("c", "x", "c.jpg", 1, false),
        ];
        let groups = group_duplicates(&findings);
        let keys: Vec<&str> = groups.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["x", "y"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_smart_select_partitions() {
        let findings = vec![
            finding("a", "orig", "a copy.jpg", 1_000_000, false),
            finding("b", "orig", "b_edited.jpg", 1_000_000, true),
            finding("solo", "other", "c.jpg", 1_000_000, false),
        ];
        let selection = smart_select(&findings, now());
        assert_eq!(selection.deleted_count(), 1);
        assert_eq!(selection.kept_count(), 2);
        assert_eq!(selection.delete[0].asset.id, "a");
    }
}
