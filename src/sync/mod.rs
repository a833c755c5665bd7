// Sync module - reconcile stored NAV history with the upstream provider

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::provider::NavProvider;
use crate::store::{NavStore, SchemeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Latest stored NAV is within the freshness window; nothing fetched
    UpToDate,
    /// New points were fetched and merged
    Updated,
    /// Upstream has nothing recent enough; stored history kept as is
    Stale,
    /// Provider (or shard write) failed; stored history kept as is
    FetchFailed,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 4] = [
        SyncStatus::UpToDate,
        SyncStatus::Updated,
        SyncStatus::Stale,
        SyncStatus::FetchFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::UpToDate => "UP_TO_DATE",
            SyncStatus::Updated => "UPDATED",
            SyncStatus::Stale => "STALE",
            SyncStatus::FetchFailed => "FETCH_FAILED",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub scheme_id: SchemeId,
    pub status: SyncStatus,
    /// Points newly persisted by this sync
    pub added: usize,
    /// Latest stored NAV date after the sync
    pub latest_date: Option<NaiveDate>,
    /// Failure cause for `FetchFailed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    fn new(scheme_id: &SchemeId, status: SyncStatus, latest_date: Option<NaiveDate>) -> Self {
        Self {
            scheme_id: scheme_id.clone(),
            status,
            added: 0,
            latest_date,
            error: None,
        }
    }

    fn failed(scheme_id: &SchemeId, latest_date: Option<NaiveDate>, cause: String) -> Self {
        Self {
            error: Some(cause),
            ..Self::new(scheme_id, SyncStatus::FetchFailed, latest_date)
        }
    }
}

/// Decides what to fetch for a scheme and merges the delta into the store.
///
/// Holds no state of its own; repeated calls for an up-to-date scheme are
/// no-ops that never touch the network.
pub struct Synchronizer<'a> {
    store: &'a NavStore,
    provider: &'a dyn NavProvider,
    staleness_days: u32,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a NavStore, provider: &'a dyn NavProvider, staleness_days: u32) -> Self {
        Self {
            store,
            provider,
            staleness_days,
        }
    }

    /// Oldest latest-NAV date still considered fresh on `today`
    pub fn freshness_threshold(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.staleness_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn is_stale(&self, latest: Option<NaiveDate>, today: NaiveDate) -> bool {
        latest.is_none_or(|date| date < self.freshness_threshold(today))
    }

    pub fn sync(&self, scheme_id: &SchemeId, today: NaiveDate) -> SyncOutcome {
        // Undecodable rows are rebuilt from a full fetch; merging alone
        // would keep the bad rows forever
        let (latest, rebuild) = match self.store.try_load(scheme_id) {
            Ok(series) => (series.latest_date(), false),
            Err(StoreError::ShardCorrupt { reason, .. }) => {
                warn!("Scheme {} history unreadable ({}), refetching", scheme_id, reason);
                (None, true)
            }
            Err(e) => {
                warn!("Treating scheme {} as cold start: {}", scheme_id, e);
                (None, false)
            }
        };

        if !self.is_stale(latest, today) {
            debug!("Scheme {} up to date (latest NAV {:?})", scheme_id, latest);
            return SyncOutcome::new(scheme_id, SyncStatus::UpToDate, latest);
        }

        match latest {
            Some(date) => debug!("Scheme {} stale since {}, fetching delta", scheme_id, date),
            None => debug!("Scheme {} has no stored history, fetching all", scheme_id),
        }

        let history = match self.provider.fetch_history(scheme_id, latest, today) {
            Ok(history) => history,
            Err(e) => {
                warn!("Fetch failed for scheme {}: {}", scheme_id, e);
                return SyncOutcome::failed(scheme_id, latest, e.to_string());
            }
        };

        if let Some(meta) = &history.meta {
            if let Err(e) = self.store.upsert_meta(meta) {
                warn!("Failed to store metadata for scheme {}: {}", scheme_id, e);
            }
        }

        let written = if rebuild {
            self.store.replace(scheme_id, &history.points)
        } else {
            self.store.merge(scheme_id, &history.points)
        };
        let merged = match written {
            Ok(merged) => merged,
            Err(e) => {
                error!("Failed to persist NAVs for scheme {}: {}", scheme_id, e);
                return SyncOutcome::failed(scheme_id, latest, e.to_string());
            }
        };

        let latest_after = history.points.iter().map(|p| p.date).chain(latest).max();

        let status = if self.is_stale(latest_after, today) {
            info!(
                "Scheme {} stale: latest NAV {:?}, {} new points",
                scheme_id, latest_after, merged.added
            );
            SyncStatus::Stale
        } else {
            SyncStatus::Updated
        };

        debug!(
            "Synced scheme {}: {} added, {} skipped",
            scheme_id, merged.added, merged.skipped
        );

        SyncOutcome {
            added: merged.added,
            ..SyncOutcome::new(scheme_id, status, latest_after)
        }
    }
}
