//! Error handling for navrank
//!
//! Typed errors for each engine layer plus a per-scheme exclusion reason.
//! Application plumbing uses anyhow for context chaining; these types are
//! what individual scheme computations fail with.

use thiserror::Error;

/// Return calculation failures (data-quality problems, never fatal to a run)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    #[error("invalid NAV {value} on {date}")]
    InvalidNav { date: chrono::NaiveDate, value: String },

    #[error("date order violation: {start} is not before {end}")]
    DateOrderViolation {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("rate solver did not converge: {0}")]
    NoConvergence(String),
}

/// Persistence failures, isolated to the shard (and scheme) that produced them
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("shard {shard} corrupt for scheme {scheme_id}: {reason}")]
    ShardCorrupt {
        shard: usize,
        scheme_id: String,
        reason: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Upstream NAV provider failures (transient by assumption)
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// Why a scheme was left out of the ranked report
#[derive(Error, Debug)]
pub enum SchemeError {
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("stale: latest NAV {latest:?} older than freshness threshold")]
    Stale { latest: Option<chrono::NaiveDate> },

    #[error(transparent)]
    Calc(#[from] CalcError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for application-level operations
pub type Result<T> = anyhow::Result<T>;
