// Provider module - upstream scheme list and NAV history source

pub mod mfapi;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ProviderError;
use crate::store::{NavPoint, SchemeId, SchemeMeta};

pub use mfapi::MfApiProvider;

/// NAV points returned by one history request, plus any metadata the
/// provider attached to the response. Points come in no particular order
/// and may overlap what is already stored.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NavHistory {
    pub meta: Option<SchemeMeta>,
    pub points: Vec<NavPoint>,
}

/// Upstream source of scheme metadata and NAV history.
///
/// Implementations are blocking and must bound every call with a timeout;
/// the pipeline runs them on worker threads.
pub trait NavProvider: Send + Sync {
    /// All schemes the provider knows about
    fn fetch_scheme_list(&self) -> Result<Vec<SchemeMeta>, ProviderError>;

    /// NAV points strictly after `since` (the full history when `None`)
    /// and on or before `until`
    fn fetch_history(
        &self,
        scheme_id: &SchemeId,
        since: Option<NaiveDate>,
        until: NaiveDate,
    ) -> Result<NavHistory, ProviderError>;

    /// The most recent published NAV
    fn fetch_latest(&self, scheme_id: &SchemeId) -> Result<NavHistory, ProviderError>;
}
