// Returns module - trailing 12-month XIRR per scheme

pub mod solver;

use chrono::{Days, Months, NaiveDate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::CalcError;
use crate::store::{NavPoint, NavSeries, SchemeId};
pub use solver::{solve, CashFlow};

/// Look-back window for the trailing return
pub const TRAILING_WINDOW_DAYS: u64 = 365;

/// Fractional digits kept on reported rates
const RATE_SCALE: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct ReturnConfig {
    /// Shortest history (in calendar months) a scheme needs to be scored
    pub min_history_months: u32,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            min_history_months: 5,
        }
    }
}

/// Annualized trailing return of one scheme. Recomputed every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XirrResult {
    pub scheme_id: SchemeId,
    /// Annualized rate as a fraction (0.1 = 10%)
    pub rate: Decimal,
    /// Date of the NAV the return runs up to
    pub as_of: NaiveDate,
    pub start: NavPoint,
    pub end: NavPoint,
}

impl XirrResult {
    pub fn days(&self) -> i64 {
        (self.end.date - self.start.date).num_days()
    }

    /// Rate as a percentage, e.g. 12.34
    pub fn rate_pct(&self) -> Decimal {
        (self.rate * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Compute the trailing 12-month XIRR of `series`.
///
/// The end anchor is the latest NAV on or before `as_of` (or the latest NAV
/// overall). The start anchor is the latest NAV on or before `as_of` minus
/// 365 days; a younger series starts at its first NAV and is annualized over
/// its actual span. The return is modeled as buying one unit at the start
/// NAV and redeeming it at the end NAV.
pub fn compute_trailing_xirr(
    series: &NavSeries,
    as_of: Option<NaiveDate>,
    config: &ReturnConfig,
) -> Result<XirrResult, CalcError> {
    let end = match as_of {
        Some(date) => series.latest_on_or_before(date),
        None => series.latest(),
    }
    .ok_or_else(|| {
        CalcError::InsufficientHistory(match as_of {
            Some(date) => format!("no NAV on or before {}", date),
            None => "no NAV history".to_string(),
        })
    })?;

    let earliest = series
        .first()
        .ok_or_else(|| CalcError::InsufficientHistory("no NAV history".to_string()))?;

    let required_start = end
        .date
        .checked_sub_months(Months::new(config.min_history_months))
        .unwrap_or(NaiveDate::MIN);
    if earliest.date > required_start {
        return Err(CalcError::InsufficientHistory(format!(
            "history spans {} days ({} to {}), need {} months",
            (end.date - earliest.date).num_days(),
            earliest.date,
            end.date,
            config.min_history_months
        )));
    }

    let window_end = as_of.unwrap_or(end.date);
    let start = window_end
        .checked_sub_days(Days::new(TRAILING_WINDOW_DAYS))
        .and_then(|target| series.latest_on_or_before(target))
        .unwrap_or(earliest);

    xirr_between(series.scheme_id(), start, end)
}

/// XIRR of holding one unit from `start` to `end`
pub fn xirr_between(
    scheme_id: &SchemeId,
    start: &NavPoint,
    end: &NavPoint,
) -> Result<XirrResult, CalcError> {
    for point in [start, end] {
        if point.nav <= Decimal::ZERO {
            return Err(CalcError::InvalidNav {
                date: point.date,
                value: point.nav.to_string(),
            });
        }
    }
    if start.date >= end.date {
        return Err(CalcError::DateOrderViolation {
            start: start.date,
            end: end.date,
        });
    }

    // Units redeemed per unit invested; exact in Decimal so scaled NAVs agree
    let growth = end
        .nav
        .checked_div(start.nav)
        .and_then(|g| g.to_f64())
        .ok_or_else(|| CalcError::InvalidNav {
            date: end.date,
            value: end.nav.to_string(),
        })?;

    let rate = solve(&[
        CashFlow::new(start.date, -1.0),
        CashFlow::new(end.date, growth),
    ])?;

    let rate = Decimal::from_f64(rate)
        .ok_or_else(|| CalcError::NoConvergence(format!("rate {} is not representable", rate)))?
        .round_dp(RATE_SCALE);

    Ok(XirrResult {
        scheme_id: scheme_id.clone(),
        rate,
        as_of: end.date,
        start: *start,
        end: *end,
    })
}
