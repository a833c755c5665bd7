//! Output formatting module for CLI display
//!
//! Keeps presentation out of the engine: every command produces a value,
//! and these functions turn it into a terminal table or JSON.

use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::provider::NavHistory;
use crate::reports::{RankedEntry, RunSummary};
use crate::returns::XirrResult;
use crate::store::{NavSeries, SchemeMeta};
use crate::sync::{SyncOutcome, SyncStatus};
use crate::utils::{format_nav, format_rate_pct};

/// Pretty JSON for any serializable result
pub fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

fn colored_rate(rate: Decimal) -> String {
    let text = format_rate_pct(rate);
    if rate >= Decimal::ZERO {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

fn status_label(status: SyncStatus) -> String {
    match status {
        SyncStatus::UpToDate => status.as_str().bright_black().to_string(),
        SyncStatus::Updated => status.as_str().green().to_string(),
        SyncStatus::Stale => status.as_str().yellow().to_string(),
        SyncStatus::FetchFailed => status.as_str().red().to_string(),
    }
}

#[derive(Tabled)]
struct LeaderboardRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Scheme")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "NAV")]
    nav: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "XIRR")]
    xirr: String,
}

fn leaderboard_table(entries: &[RankedEntry], with_category: bool) -> String {
    let rows: Vec<LeaderboardRow> = entries
        .iter()
        .map(|e| LeaderboardRow {
            rank: e.rank,
            code: e.scheme_id().to_string(),
            name: e.meta.name.clone(),
            category: if with_category {
                e.category.to_string()
            } else {
                String::new()
            },
            nav: format_nav(e.xirr.end.nav),
            since: e.xirr.start.date.format("%Y-%m-%d").to_string(),
            xirr: colored_rate(e.rate()),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    // Right-align NAV and XIRR
    table.modify(Columns::new(4..5), Alignment::right());
    table.modify(Columns::new(6..), Alignment::right());
    table.to_string()
}

/// Terminal rendering of a full run
pub fn format_run_table(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n{} NAV leaderboard - {}",
        "📈".cyan().bold(),
        summary.generated_on.format("%Y-%m-%d")
    ));
    if let Some(as_of) = summary.as_of {
        output.push_str(&format!(" (returns as of {})", as_of));
    }
    output.push('\n');

    let counts: Vec<String> = SyncStatus::ALL
        .iter()
        .map(|s| format!("{} {}", summary.sync_count(*s), status_label(*s)))
        .collect();
    output.push_str(&format!(
        "{} schemes: {}\n",
        summary.schemes_considered,
        counts.join(", ")
    ));

    let report = &summary.report;
    if report.overall.is_empty() {
        output.push_str(&format!(
            "\n{} No schemes could be ranked\n",
            "ℹ".blue().bold()
        ));
    } else {
        output.push_str(&format!(
            "\n{} (top {})\n",
            "Overall".bold(),
            report.overall.len()
        ));
        output.push_str(&leaderboard_table(&report.overall, true));
        output.push('\n');

        for (category, entries) in &report.by_category {
            output.push_str(&format!("\n{}\n", category.to_string().bold()));
            output.push_str(&leaderboard_table(entries, false));
            output.push('\n');
        }
    }

    output.push_str(&format!(
        "\n{} {} excluded, {} filtered (Regular/IDCW)\n",
        "━".repeat(3).bright_black(),
        report.excluded.len(),
        report.filtered
    ));

    output
}

pub fn format_sync_outcome(outcome: &SyncOutcome) -> String {
    let latest = outcome
        .latest_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "none".to_string());
    let mut line = format!(
        "{} {}: {} new points, latest NAV {}",
        status_label(outcome.status),
        outcome.scheme_id.to_string().bold(),
        outcome.added,
        latest
    );
    if let Some(error) = &outcome.error {
        line.push_str(&format!("\n  {}", error.red()));
    }
    line.push('\n');
    line
}

pub fn format_xirr(result: &XirrResult) -> String {
    format!(
        "{} {}\n  {} {} -> {} {} ({} days)\n",
        result.scheme_id.to_string().bold(),
        colored_rate(result.rate),
        result.start.date,
        format_nav(result.start.nav),
        result.end.date,
        format_nav(result.end.nav),
        result.days()
    )
}

#[derive(Serialize)]
pub struct HistorySummary<'a> {
    pub scheme_id: &'a str,
    pub name: Option<&'a str>,
    pub category: Option<String>,
    pub points: usize,
    pub first: Option<&'a crate::store::NavPoint>,
    pub latest: Option<&'a crate::store::NavPoint>,
}

impl<'a> HistorySummary<'a> {
    pub fn new(series: &'a NavSeries, meta: Option<&'a SchemeMeta>) -> Self {
        Self {
            scheme_id: series.scheme_id().as_str(),
            name: meta.map(|m| m.name.as_str()),
            category: meta.map(|m| m.category().to_string()),
            points: series.len(),
            first: series.first(),
            latest: series.latest(),
        }
    }
}

pub fn format_history(summary: &HistorySummary<'_>) -> String {
    if summary.points == 0 {
        return format!(
            "{} No stored NAV history for scheme {}\nFetch it first using: {} sync {}\n",
            "ℹ".blue().bold(),
            summary.scheme_id,
            "navrank".bold(),
            summary.scheme_id
        );
    }

    let mut output = format!("{}", summary.scheme_id.bold());
    if let Some(name) = summary.name {
        output.push_str(&format!(" {}", name));
    }
    output.push('\n');
    if let Some(category) = &summary.category {
        output.push_str(&format!("  {:<10} {}\n", "Category:", category));
    }
    output.push_str(&format!("  {:<10} {}\n", "Points:", summary.points));
    if let Some(first) = summary.first {
        output.push_str(&format!(
            "  {:<10} {} {}\n",
            "First:",
            first.date,
            format_nav(first.nav)
        ));
    }
    if let Some(latest) = summary.latest {
        output.push_str(&format!(
            "  {:<10} {} {}\n",
            "Latest:",
            latest.date,
            format_nav(latest.nav)
        ));
    }
    output
}

pub fn format_latest(scheme: &str, history: &NavHistory) -> String {
    let name = history
        .meta
        .as_ref()
        .map(|m| m.name.as_str())
        .unwrap_or_default();
    match history.points.iter().max_by_key(|p| p.date) {
        Some(point) => format!(
            "{} {}\n  {} {}\n",
            scheme.bold(),
            name,
            point.date,
            format_nav(point.nav)
        ),
        None => format!("{} No NAV published for scheme {}\n", "ℹ".blue().bold(), scheme),
    }
}
