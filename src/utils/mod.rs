//! Formatting and parsing helpers shared by the CLI and reports

use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

/// Format a fractional rate as a percentage: 0.12345 -> "12.35%"
///
/// # Examples
/// ```
/// use navrank::utils::format_rate_pct;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_rate_pct(dec!(0.12345)), "12.35%");
/// assert_eq!(format_rate_pct(dec!(-0.05)), "-5.00%");
/// ```
pub fn format_rate_pct(rate: Decimal) -> String {
    format!("{:.2}%", (rate * Decimal::ONE_HUNDRED).round_dp(2))
}

/// NAVs are published with up to 4-5 decimals; show 4
///
/// # Examples
/// ```
/// use navrank::utils::format_nav;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_nav(dec!(12.3)), "12.3000");
/// ```
pub fn format_nav(nav: Decimal) -> String {
    format!("{:.4}", nav.round_dp(4))
}

/// Parse `YYYY-MM-DD`, `YYYY-MM` (last day of month) or `YYYY` (December 31)
pub fn parse_flexible_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(first) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        let next_month = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        if let Some(last) = next_month.and_then(|d| d.pred_opt()) {
            return Ok(last);
        }
    }

    if let Ok(year) = s.parse::<i32>() {
        if (1900..=2100).contains(&year) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, 12, 31) {
                return Ok(date);
            }
        }
    }

    Err(anyhow!(
        "Invalid date '{}'. Use YYYY-MM-DD, YYYY-MM, or YYYY",
        s
    ))
}
