//! Full run: scheme list, per-scheme sync and XIRR, then ranking
//!
//! Schemes are independent. Each one is synced and scored on a blocking
//! worker thread, with at most `concurrency` in flight; the NAV store's
//! per-shard locks are the only shared state. A failing scheme is recorded
//! as an exclusion and never aborts the run.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::SchemeError;
use crate::provider::NavProvider;
use crate::reports::{rank, RankingConfig, RunSummary, SchemeEvaluation};
use crate::returns::{compute_trailing_xirr, ReturnConfig};
use crate::store::{NavStore, SchemeId, SchemeMeta};
use crate::sync::{SyncOutcome, SyncStatus, Synchronizer};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub today: NaiveDate,
    /// Compute returns as of this date instead of each scheme's latest NAV
    pub as_of: Option<NaiveDate>,
    pub scheme_limit: Option<usize>,
    pub staleness_days: u32,
    pub concurrency: usize,
    pub returns: ReturnConfig,
    pub ranking: RankingConfig,
}

impl PipelineOptions {
    pub fn from_config(config: &crate::config::Config, today: NaiveDate) -> Self {
        Self {
            today,
            as_of: None,
            scheme_limit: config.ranking.scheme_limit,
            staleness_days: config.sync.staleness_days,
            concurrency: config.sync.concurrency,
            returns: config.return_config(),
            ranking: config.ranking_config(),
        }
    }
}

/// Progress notifications for the caller's UI
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    SchemesListed { total: usize, from_cache: bool },
    SchemeDone {
        scheme_id: SchemeId,
        status: SyncStatus,
        completed: usize,
        total: usize,
    },
}

/// Sync one scheme, then score it from the stored history
pub fn evaluate_scheme(
    store: &NavStore,
    provider: &dyn NavProvider,
    listed: SchemeMeta,
    options: &PipelineOptions,
) -> (SyncOutcome, SchemeEvaluation) {
    let scheme_id = listed.scheme_id.clone();
    let outcome = Synchronizer::new(store, provider, options.staleness_days)
        .sync(&scheme_id, options.today);

    // Stored metadata comes from history responses and knows the category
    let meta = match store.load_meta(&scheme_id) {
        Some(stored) if !stored.name.is_empty() => stored.merged_with(&listed),
        Some(stored) => listed.merged_with(&stored),
        None => listed,
    };

    let result = match outcome.status {
        SyncStatus::FetchFailed => Err(SchemeError::FetchFailed(
            outcome.error.clone().unwrap_or_default(),
        )),
        SyncStatus::Stale => Err(SchemeError::Stale {
            latest: outcome.latest_date,
        }),
        SyncStatus::UpToDate | SyncStatus::Updated => store
            .try_load(&scheme_id)
            .map_err(SchemeError::from)
            .and_then(|series| {
                compute_trailing_xirr(&series, options.as_of, &options.returns)
                    .map_err(SchemeError::from)
            }),
    };

    (
        outcome,
        SchemeEvaluation {
            meta,
            outcome: result,
        },
    )
}

/// Scheme list from the provider, or the locally known schemes when the
/// provider is unavailable. Duplicate ids keep their first entry.
fn list_schemes(store: &NavStore, provider: &dyn NavProvider) -> Result<(Vec<SchemeMeta>, bool)> {
    let (schemes, from_cache) = match provider.fetch_scheme_list() {
        Ok(schemes) => (schemes, false),
        Err(e) => {
            warn!("Scheme list unavailable ({}), falling back to stored schemes", e);
            let known = store.known_schemes();
            if known.is_empty() {
                return Err(anyhow!(
                    "Scheme list unavailable and no schemes stored locally: {}",
                    e
                ));
            }
            (known, true)
        }
    };

    let mut seen = HashSet::new();
    let schemes = schemes
        .into_iter()
        .filter(|meta| seen.insert(meta.scheme_id.clone()))
        .collect();
    Ok((schemes, from_cache))
}

struct RunState {
    evaluations: Vec<SchemeEvaluation>,
    sync_counts: BTreeMap<SyncStatus, usize>,
    completed: usize,
    total: usize,
}

impl RunState {
    fn record<F>(
        &mut self,
        joined: std::result::Result<(SyncOutcome, SchemeEvaluation), JoinError>,
        progress: &mut F,
    ) where
        F: FnMut(&PipelineEvent),
    {
        self.completed += 1;
        match joined {
            Ok((outcome, evaluation)) => {
                *self.sync_counts.entry(outcome.status).or_insert(0) += 1;
                progress(&PipelineEvent::SchemeDone {
                    scheme_id: outcome.scheme_id,
                    status: outcome.status,
                    completed: self.completed,
                    total: self.total,
                });
                self.evaluations.push(evaluation);
            }
            Err(e) => error!("Scheme worker failed: {}", e),
        }
    }
}

pub async fn run_pipeline<F>(
    store: Arc<NavStore>,
    provider: Arc<dyn NavProvider>,
    options: &PipelineOptions,
    mut progress: F,
) -> Result<RunSummary>
where
    F: FnMut(&PipelineEvent),
{
    let (mut schemes, from_cache) = {
        let store = store.clone();
        let provider = provider.clone();
        tokio::task::spawn_blocking(move || list_schemes(&store, provider.as_ref()))
            .await
            .context("Scheme list task failed")??
    };

    if let Some(limit) = options.scheme_limit {
        schemes.truncate(limit);
    }

    let total = schemes.len();
    info!(
        "Processing {} schemes ({} workers){}",
        total,
        options.concurrency,
        if from_cache { " from stored scheme list" } else { "" }
    );
    progress(&PipelineEvent::SchemesListed { total, from_cache });

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let mut state = RunState {
        evaluations: Vec::with_capacity(total),
        sync_counts: BTreeMap::new(),
        completed: 0,
        total,
    };

    for meta in schemes {
        // Waits here while `concurrency` schemes are in flight
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker pool closed")?;
        let store = store.clone();
        let provider = provider.clone();
        let options = options.clone();

        join_set.spawn_blocking(move || {
            let _permit = permit;
            evaluate_scheme(&store, provider.as_ref(), meta, &options)
        });

        while let Some(joined) = join_set.try_join_next() {
            state.record(joined, &mut progress);
        }
    }

    while let Some(joined) = join_set.join_next().await {
        state.record(joined, &mut progress);
    }

    debug!("Sync results: {:?}", state.sync_counts);

    let report = rank(state.evaluations, &options.ranking);
    info!(
        "Ranked {} schemes ({} excluded, {} filtered by plan)",
        report.overall.len(),
        report.excluded.len(),
        report.filtered
    );

    Ok(RunSummary {
        generated_on: options.today,
        as_of: options.as_of,
        schemes_considered: total,
        sync_counts: state.sync_counts,
        report,
    })
}
