//! Phased clutter scan.
//!
//! A scan enumerates photos once and then runs three phases over a
//! shrinking pool: screenshots, duplicates, blur. Anything flagged by one
//! phase is removed before the next. Favorites are never flagged.

pub mod result;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::classify::blur::estimator_for;
use crate::classify::{classify_screenshot, BlurEstimator, BlurMethod, DEFAULT_SCREENSHOT_THRESHOLD};
use crate::dedupe::phash::DEFAULT_SIMILARITY_THRESHOLD;
use crate::dedupe::{DuplicateResolver, HashSampling, ResolverOptions, SimilarityMethod};
use crate::error::ScanError;
use crate::store::{AssetRecord, AssetStore, ListOptions, MediaType, Permission, SortOrder, DEFAULT_ASSET_LIMIT};

pub use result::{BlurFinding, CategoryDetails, DuplicateFinding, ScanResult, ScreenshotFinding};

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Use the deep blur estimator instead of the fast one.
    pub deep_scan: bool,
    pub include_visual_similarity: bool,
    pub batch_size: usize,
    pub asset_limit: usize,
    pub screenshot_threshold: f64,
    pub similarity_method: SimilarityMethod,
    pub hash_sampling: HashSampling,
    pub similarity_threshold: f64,
    /// Classify each blur batch on the rayon pool.
    pub parallel_blur: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            deep_scan: true,
            include_visual_similarity: true,
            batch_size: DEFAULT_BATCH_SIZE,
            asset_limit: DEFAULT_ASSET_LIMIT,
            screenshot_threshold: DEFAULT_SCREENSHOT_THRESHOLD,
            similarity_method: SimilarityMethod::Metadata,
            hash_sampling: HashSampling::Digest,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            parallel_blur: false,
        }
    }
}

impl ScanOptions {
    fn blur_method(&self) -> BlurMethod {
        if self.deep_scan {
            BlurMethod::Deep
        } else {
            BlurMethod::Fast
        }
    }

    fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            include_visual_similarity: self.include_visual_similarity,
            similarity_method: self.similarity_method,
            hash_sampling: self.hash_sampling,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Screenshots,
    Duplicates,
    Blur,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    Phase {
        phase: ScanPhase,
        current: usize,
        total: usize,
    },
    Completed {
        scanned: usize,
        flagged: usize,
        total_space_bytes: u64,
        cancelled: bool,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    PermissionCheck,
    EnumerateAssets,
    PhaseScreenshots,
    PhaseDuplicates,
    PhaseBlur,
    Done,
    Failed(String),
}

/// Marker for a scan stopped through its cancel flag.
struct Cancelled;

#[derive(Default)]
struct Accumulator {
    details: CategoryDetails,
    total_space_bytes: u64,
}

impl Accumulator {
    fn add_space(&mut self, bytes: Option<u64>) {
        self.total_space_bytes += bytes.unwrap_or(0);
    }
}

/// Progress and cancellation plumbing for one run.
struct RunContext<'a> {
    store: &'a dyn AssetStore,
    options: &'a ScanOptions,
    progress_tx: Option<mpsc::Sender<ScanProgress>>,
    cancel: Option<&'a AtomicBool>,
}

impl RunContext<'_> {
    fn send(&self, event: ScanProgress) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(event);
        }
    }

    fn tick(&self, phase: ScanPhase, current: usize, total: usize) {
        self.send(ScanProgress::Phase { phase, current, total });
    }

    fn check_cancelled(&self) -> Result<(), Cancelled> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Cancelled),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Scanner {
    state: ScanState,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Run a full scan against `store`.
    ///
    /// Only a denied permission or a failed enumeration aborts the scan.
    /// Setting `cancel` stops it between assets and batches; the partial
    /// result is returned with `cancelled` set.
    pub fn run_scan(
        &mut self,
        store: &dyn AssetStore,
        options: &ScanOptions,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
        cancel: Option<&AtomicBool>,
    ) -> Result<ScanResult, ScanError> {
        let ctx = RunContext {
            store,
            options,
            progress_tx,
            cancel,
        };

        self.transition(ScanState::PermissionCheck);
        if let Err(e) = ensure_permission(store) {
            return Err(self.fail(&ctx, e));
        }

        self.transition(ScanState::EnumerateAssets);
        let list_options = ListOptions {
            media_type: MediaType::Photo,
            limit: options.asset_limit,
            order: SortOrder::CreationTimeAsc,
        };
        let assets = match store.list_assets(&list_options) {
            Ok(assets) => assets,
            Err(e) => return Err(self.fail(&ctx, ScanError::Enumeration(e))),
        };

        let scanned_count = assets.len();
        info!(count = scanned_count, deep = options.deep_scan, "Starting clutter scan");

        let mut acc = Accumulator::default();
        let cancelled = self.run_phases(&ctx, assets, &mut acc).is_err();
        if cancelled {
            info!("Scan cancelled");
        }

        self.transition(ScanState::Done);
        let result = ScanResult::new(
            acc.details,
            acc.total_space_bytes,
            scanned_count,
            options.clone(),
            cancelled,
        );

        info!(
            screenshots = result.screenshots,
            duplicates = result.duplicates,
            blurry = result.blurry,
            bytes = result.total_space_bytes,
            "Scan finished"
        );
        ctx.send(ScanProgress::Completed {
            scanned: scanned_count,
            flagged: result.flagged_count(),
            total_space_bytes: result.total_space_bytes,
            cancelled,
        });

        Ok(result)
    }

    fn run_phases(&mut self, ctx: &RunContext<'_>, assets: Vec<AssetRecord>, acc: &mut Accumulator) -> Result<(), Cancelled> {
        if assets.is_empty() {
            return Ok(());
        }

        self.transition(ScanState::PhaseScreenshots);
        let pool = detect_screenshots(ctx, assets, acc)?;

        self.transition(ScanState::PhaseDuplicates);
        let pool = detect_duplicates(ctx, pool, acc)?;

        self.transition(ScanState::PhaseBlur);
        detect_blur(ctx, &pool, acc)
    }

    fn transition(&mut self, next: ScanState) {
        debug!(from = ?self.state, to = ?next, "Scan state");
        self.state = next;
    }

    fn fail(&mut self, ctx: &RunContext<'_>, e: ScanError) -> ScanError {
        error!(error = %e, "Scan failed");
        self.transition(ScanState::Failed(e.to_string()));
        ctx.send(ScanProgress::Failed { reason: e.to_string() });
        e
    }
}

fn ensure_permission(store: &dyn AssetStore) -> Result<(), ScanError> {
    if store.check_permission() == Permission::Granted {
        return Ok(());
    }
    debug!("Requesting library permission");
    match store.request_permission() {
        Permission::Granted => Ok(()),
        Permission::Denied => Err(ScanError::PermissionDenied),
    }
}

/// Flag screenshots and return everything else.
fn detect_screenshots(
    ctx: &RunContext<'_>,
    assets: Vec<AssetRecord>,
    acc: &mut Accumulator,
) -> Result<Vec<AssetRecord>, Cancelled> {
    let total = assets.len();
    let mut remaining = Vec::with_capacity(total);

    for (index, asset) in assets.into_iter().enumerate() {
        ctx.check_cancelled()?;
        ctx.tick(ScanPhase::Screenshots, index + 1, total);

        let metadata = match ctx.store.get_asset_metadata(&asset.id) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(asset = %asset.id, error = %e, "Skipping screenshot check");
                remaining.push(asset);
                continue;
            }
        };

        if metadata.is_favorite {
            debug!(asset = %asset.id, "Skipping favorite");
            remaining.push(asset);
            continue;
        }

        let score = classify_screenshot(&asset, Ok(&metadata), ctx.options.screenshot_threshold);
        if score.is_screenshot {
            debug!(asset = %asset.id, confidence = score.confidence, "Screenshot");
            acc.add_space(metadata.file_size_bytes);
            acc.details.screenshots.push(ScreenshotFinding {
                asset,
                file_size_bytes: metadata.file_size_bytes,
                score,
            });
        } else {
            remaining.push(asset);
        }
    }

    info!(found = acc.details.screenshots.len(), "Screenshot phase done");
    Ok(remaining)
}

/// Flag duplicates among `pool` and return the rest.
fn detect_duplicates(
    ctx: &RunContext<'_>,
    pool: Vec<AssetRecord>,
    acc: &mut Accumulator,
) -> Result<Vec<AssetRecord>, Cancelled> {
    ctx.check_cancelled()?;
    ctx.tick(ScanPhase::Duplicates, 0, pool.len());

    let mut resolver = DuplicateResolver::new(ctx.store, ctx.options.resolver_options());
    let relations = resolver.resolve(&pool);

    let index: HashMap<&str, &AssetRecord> = pool.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut flagged: HashSet<String> = HashSet::new();

    for relation in relations {
        let (Some(asset), Some(metadata)) = (
            index.get(relation.duplicate_id.as_str()),
            resolver.metadata_for(&relation.duplicate_id),
        ) else {
            continue;
        };

        if metadata.is_favorite {
            debug!(asset = %asset.id, "Keeping favorited duplicate");
            continue;
        }

        acc.add_space(metadata.file_size_bytes);
        flagged.insert(asset.id.clone());
        acc.details.duplicates.push(DuplicateFinding {
            asset: (*asset).clone(),
            file_size_bytes: metadata.file_size_bytes,
            location_present: metadata.location_present,
            relation,
        });
    }

    info!(found = flagged.len(), "Duplicate phase done");
    Ok(pool.into_iter().filter(|a| !flagged.contains(&a.id)).collect())
}

/// Flag blurry photos in batches.
fn detect_blur(ctx: &RunContext<'_>, pool: &[AssetRecord], acc: &mut Accumulator) -> Result<(), Cancelled> {
    let total = pool.len();
    let batch_size = ctx.options.batch_size.max(1);
    let estimator = estimator_for(ctx.options.blur_method());

    for (batch_index, batch) in pool.chunks(batch_size).enumerate() {
        ctx.check_cancelled()?;
        ctx.tick(ScanPhase::Blur, batch_index * batch_size, total);

        let findings: Vec<Option<BlurFinding>> = if ctx.options.parallel_blur {
            batch
                .par_iter()
                .map(|asset| check_blur(ctx.store, estimator.as_ref(), asset))
                .collect()
        } else {
            batch
                .iter()
                .map(|asset| check_blur(ctx.store, estimator.as_ref(), asset))
                .collect()
        };

        for finding in findings.into_iter().flatten() {
            acc.add_space(finding.file_size_bytes);
            acc.details.blurry.push(finding);
        }
    }

    info!(found = acc.details.blurry.len(), "Blur phase done");
    Ok(())
}

fn check_blur(store: &dyn AssetStore, estimator: &dyn BlurEstimator, asset: &AssetRecord) -> Option<BlurFinding> {
    let metadata = match store.get_asset_metadata(&asset.id) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(asset = %asset.id, error = %e, "Skipping blur check");
            return None;
        }
    };

    if metadata.is_favorite {
        return None;
    }

    let verdict = estimator.estimate(asset, Ok(&metadata), store);
    if let Some(ref reason) = verdict.error {
        debug!(asset = %asset.id, reason = %reason, "Blur inconclusive");
    }

    verdict.is_blurry.then(|| BlurFinding {
        asset: asset.clone(),
        file_size_bytes: metadata.file_size_bytes,
        verdict,
    })
}
