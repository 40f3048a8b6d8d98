use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::scanner::ScanResult;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Pick a format from the output file's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!(
                "Unsupported export format {:?}, expected .{} or .{}",
                other,
                ExportFormat::Json.extension(),
                ExportFormat::Csv.extension()
            ),
        }
    }
}

/// One flagged asset, flattened for tabular export.
#[derive(Debug, Serialize, PartialEq)]
pub struct ExportedFinding {
    pub category: &'static str,
    pub id: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
    pub confidence: f64,
    pub tier: Option<String>,
    pub original_id: Option<String>,
}

/// Write `result` to `output_path`, returning how many findings were written.
pub fn export_result(result: &ScanResult, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let findings = flatten(result);
    let count = findings.len();

    match format {
        ExportFormat::Json => export_json(result, output_path),
        ExportFormat::Csv => export_csv(&findings, output_path),
    }
    .with_context(|| format!("Failed to export to {}", output_path.display()))?;

    tracing::info!(path = %output_path.display(), count, "Exported scan result");
    Ok(count)
}

pub fn flatten(result: &ScanResult) -> Vec<ExportedFinding> {
    let details = &result.details;
    let screenshots = details.screenshots.iter().map(|f| ExportedFinding {
        category: "screenshot",
        id: f.asset.id.clone(),
        filename: f.asset.filename.clone(),
        width: f.asset.width,
        height: f.asset.height,
        file_size: f.file_size_bytes,
        confidence: f.score.confidence,
        tier: None,
        original_id: None,
    });
    let duplicates = details.duplicates.iter().map(|f| ExportedFinding {
        category: "duplicate",
        id: f.asset.id.clone(),
        filename: f.asset.filename.clone(),
        width: f.asset.width,
        height: f.asset.height,
        file_size: f.file_size_bytes,
        confidence: f.relation.confidence,
        tier: Some(format!("{:?}", f.relation.tier).to_lowercase()),
        original_id: Some(f.relation.original_id.clone()),
    });
    let blurry = details.blurry.iter().map(|f| ExportedFinding {
        category: "blurry",
        id: f.asset.id.clone(),
        filename: f.asset.filename.clone(),
        width: f.asset.width,
        height: f.asset.height,
        file_size: f.file_size_bytes,
        confidence: f.verdict.confidence,
        tier: None,
        original_id: None,
    });

    screenshots.chain(duplicates).chain(blurry).collect()
}

fn export_json(result: &ScanResult, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(findings: &[ExportedFinding], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "category",
        "id",
        "filename",
        "width",
        "height",
        "file_size",
        "confidence",
        "tier",
        "original_id",
    ])?;

    for finding in findings {
        wtr.write_record([
            finding.category,
            &finding.id,
            &finding.filename,
            &finding.width.to_string(),
            &finding.height.to_string(),
            &finding.file_size.map(|v| v.to_string()).unwrap_or_default(),
            &format!("{:.2}", finding.confidence),
            finding.tier.as_deref().unwrap_or(""),
            finding.original_id.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
