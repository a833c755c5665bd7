// Reports module - leaderboards and saved run reports

pub mod ranking;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::sync::SyncStatus;
pub use ranking::{
    is_rankable, rank, Exclusion, RankedEntry, RankedReport, RankingConfig, SchemeEvaluation,
};

/// What one pipeline run did, plus the leaderboards it produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_on: NaiveDate,
    /// `as_of` date the returns were computed for, if pinned
    pub as_of: Option<NaiveDate>,
    pub schemes_considered: usize,
    pub sync_counts: BTreeMap<SyncStatus, usize>,
    pub report: RankedReport,
}

impl RunSummary {
    pub fn sync_count(&self, status: SyncStatus) -> usize {
        self.sync_counts.get(&status).copied().unwrap_or(0)
    }
}

/// Write `summary` as `report_<date>.json` under `dir`
pub fn save_report(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports directory {:?}", dir))?;

    let path = dir.join(format!(
        "report_{}.json",
        summary.generated_on.format("%Y-%m-%d")
    ));
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json).with_context(|| format!("Failed to write report {:?}", path))?;

    info!("Saved report to {:?}", path);
    Ok(path)
}
