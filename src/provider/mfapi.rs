use chrono::NaiveDate;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{NavHistory, NavProvider};
use crate::error::ProviderError;
use crate::store::{NavPoint, SchemeId, SchemeMeta};

pub const DEFAULT_BASE_URL: &str = "https://api.mfapi.in";

/// MFAPI dates are day-first: "16-10-2026"
const MFAPI_DATE_FORMAT: &str = "%d-%m-%Y";
const MAX_BACKOFF_MS: u64 = 30_000;

/// Scheme codes arrive as numbers from some endpoints and strings from others
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemeCode {
    Number(u64),
    Text(String),
}

impl From<SchemeCode> for SchemeId {
    fn from(code: SchemeCode) -> Self {
        match code {
            SchemeCode::Number(n) => SchemeId::from(n),
            SchemeCode::Text(s) => SchemeId::new(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemeListEntry {
    #[serde(rename = "schemeCode")]
    scheme_code: SchemeCode,
    #[serde(rename = "schemeName")]
    scheme_name: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    meta: Option<ResponseMeta>,
    #[serde(default)]
    data: Vec<ResponseNav>,
}

#[derive(Debug, Deserialize)]
struct ResponseMeta {
    fund_house: Option<String>,
    scheme_type: Option<String>,
    scheme_category: Option<String>,
    scheme_name: Option<String>,
    isin_growth: Option<String>,
    isin_div_reinvestment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseNav {
    date: String,
    nav: String,
}

/// Blocking client for api.mfapi.in
pub struct MfApiProvider {
    client: Client,
    base_url: String,
    page_size: usize,
    max_retries: u32,
}

impl MfApiProvider {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        page_size: usize,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; navrank/0.1)")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            max_retries,
        })
    }

    /// GET with retries on timeouts, connection errors and 5xx responses
    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.get_json_once(url) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let backoff = retry_backoff(attempt);
                    debug!("Retrying {} in {:?} after: {}", url, backoff, e);
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn history_url(
        &self,
        scheme_id: &SchemeId,
        since: Option<NaiveDate>,
        until: NaiveDate,
    ) -> String {
        match since.and_then(|d| d.succ_opt()) {
            Some(start) => format!(
                "{}/mf/{}?startDate={}&endDate={}",
                self.base_url,
                scheme_id,
                start.format("%Y-%m-%d"),
                until.format("%Y-%m-%d")
            ),
            None => format!("{}/mf/{}", self.base_url, scheme_id),
        }
    }

    fn get_json_once<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Delay before retry `attempt` (zero-based): 500ms doubling, capped
fn retry_backoff(attempt: u32) -> Duration {
    let millis = 500u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(millis.min(MAX_BACKOFF_MS))
}

fn is_retryable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Timeout(_) | ProviderError::Http(_) => true,
        ProviderError::Status(code) => *code >= 500,
        ProviderError::Decode(_) => false,
    }
}

impl NavProvider for MfApiProvider {
    fn fetch_scheme_list(&self) -> Result<Vec<SchemeMeta>, ProviderError> {
        let mut schemes = Vec::new();
        let mut offset = 0;
        loop {
            let url = format!(
                "{}/mf?limit={}&offset={}",
                self.base_url, self.page_size, offset
            );
            debug!("Fetching schemes: offset={}, limit={}", offset, self.page_size);
            let batch: Vec<SchemeListEntry> = self.get_json(&url)?;
            let batch_len = batch.len();
            schemes.extend(
                batch
                    .into_iter()
                    .map(|e| SchemeMeta::from_name(e.scheme_code.into(), e.scheme_name)),
            );
            if batch_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        info!("Total schemes fetched: {}", schemes.len());
        Ok(schemes)
    }

    fn fetch_history(
        &self,
        scheme_id: &SchemeId,
        since: Option<NaiveDate>,
        until: NaiveDate,
    ) -> Result<NavHistory, ProviderError> {
        let url = self.history_url(scheme_id, since, until);
        let response: HistoryResponse = self.get_json(&url)?;
        let mut history = parse_history(scheme_id, response, since);
        history.points.retain(|p| p.date <= until);
        Ok(history)
    }

    fn fetch_latest(&self, scheme_id: &SchemeId) -> Result<NavHistory, ProviderError> {
        let url = format!("{}/mf/{}/latest", self.base_url, scheme_id);
        let response: HistoryResponse = self.get_json(&url)?;
        Ok(parse_history(scheme_id, response, None))
    }
}

/// Convert a raw history response. Rows with unparsable dates or NAVs, zero
/// or negative NAVs, and rows on or before `since` are dropped.
fn parse_history(
    scheme_id: &SchemeId,
    response: HistoryResponse,
    since: Option<NaiveDate>,
) -> NavHistory {
    let mut dropped = 0;
    let points: Vec<NavPoint> = response
        .data
        .into_iter()
        .filter_map(|row| {
            let parsed = parse_nav_row(&row.date, &row.nav);
            if parsed.is_none() {
                dropped += 1;
            }
            parsed
        })
        .filter(|p| since.is_none_or(|s| p.date > s))
        .collect();

    if dropped > 0 {
        warn!("Dropped {} unusable NAV rows for scheme {}", dropped, scheme_id);
    }

    NavHistory {
        meta: response.meta.map(|m| meta_from_response(scheme_id, m)),
        points,
    }
}

fn parse_nav_row(date: &str, nav: &str) -> Option<NavPoint> {
    let date = NaiveDate::parse_from_str(date.trim(), MFAPI_DATE_FORMAT).ok()?;
    let nav = Decimal::from_str(nav.trim()).ok()?;
    if nav <= Decimal::ZERO {
        return None;
    }
    Some(NavPoint::new(date, nav))
}

fn meta_from_response(scheme_id: &SchemeId, meta: ResponseMeta) -> SchemeMeta {
    let name = meta.scheme_name.unwrap_or_default();
    let base = SchemeMeta::from_name(scheme_id.clone(), name);
    // Growth plans carry a growth ISIN; payout-only plans do not
    let idcw = base.idcw || (meta.isin_growth.is_none() && meta.isin_div_reinvestment.is_some());
    SchemeMeta {
        fund_house: meta.fund_house,
        scheme_type: meta.scheme_type,
        scheme_category: meta.scheme_category,
        isin_growth: meta.isin_growth,
        isin_div_reinvestment: meta.isin_div_reinvestment,
        idcw,
        ..base
    }
}
