use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{CalcError, SchemeError};
use crate::returns::XirrResult;
use crate::store::{Category, PlanType, SchemeId, SchemeMeta};

#[derive(Debug, Clone, Copy)]
pub struct RankingConfig {
    pub overall_top_n: usize,
    pub category_top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            overall_top_n: 75,
            category_top_n: 20,
        }
    }
}

/// A scheme's metadata paired with its return, or the reason it has none
#[derive(Debug)]
pub struct SchemeEvaluation {
    pub meta: SchemeMeta,
    pub outcome: Result<XirrResult, SchemeError>,
}

/// A ranked scheme: its full metadata and the return it was ranked on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub category: Category,
    pub meta: SchemeMeta,
    pub xirr: XirrResult,
}

impl RankedEntry {
    pub fn scheme_id(&self) -> &SchemeId {
        &self.meta.scheme_id
    }

    pub fn rate(&self) -> Decimal {
        self.xirr.rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub scheme_id: SchemeId,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RankedReport {
    pub overall: Vec<RankedEntry>,
    pub by_category: BTreeMap<Category, Vec<RankedEntry>>,
    /// Schemes dropped for a missing or failed return
    pub excluded: Vec<Exclusion>,
    /// Schemes dropped by plan filters (Regular, IDCW)
    pub filtered: usize,
}

/// Only Direct growth plans are ranked
pub fn is_rankable(meta: &SchemeMeta) -> bool {
    meta.plan == PlanType::Direct && !meta.idcw
}

pub fn rank(evaluations: Vec<SchemeEvaluation>, config: &RankingConfig) -> RankedReport {
    let mut report = RankedReport::default();
    let mut candidates = Vec::new();

    for SchemeEvaluation { meta, outcome } in evaluations {
        if !is_rankable(&meta) {
            report.filtered += 1;
            continue;
        }
        match outcome {
            Ok(xirr) => candidates.push((meta, xirr)),
            Err(e) => {
                match &e {
                    SchemeError::Calc(CalcError::InsufficientHistory(_)) => {
                        debug!("Excluding scheme {}: {}", meta.scheme_id, e)
                    }
                    _ => warn!("Excluding scheme {}: {}", meta.scheme_id, e),
                }
                report.excluded.push(Exclusion {
                    scheme_id: meta.scheme_id,
                    name: meta.name,
                    reason: e.to_string(),
                });
            }
        }
    }

    candidates.sort_by(|(a_meta, a), (b_meta, b)| {
        b.rate
            .cmp(&a.rate)
            .then_with(|| a_meta.scheme_id.cmp(&b_meta.scheme_id))
    });

    let entries: Vec<RankedEntry> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, (meta, xirr))| RankedEntry {
            rank: i + 1,
            category: meta.category(),
            meta,
            xirr,
        })
        .collect();

    report.overall = entries
        .iter()
        .take(config.overall_top_n)
        .cloned()
        .collect();

    // Grouping keeps the global order within each category
    report.by_category = entries
        .into_iter()
        .into_group_map_by(|e| e.category)
        .into_iter()
        .map(|(category, group)| {
            let top = group
                .into_iter()
                .take(config.category_top_n)
                .enumerate()
                .map(|(i, entry)| RankedEntry { rank: i + 1, ..entry })
                .collect();
            (category, top)
        })
        .collect();

    report
        .excluded
        .sort_by(|a, b| a.scheme_id.cmp(&b.scheme_id));

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NavPoint;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn eval(id: &str, name: &str, category: &str, rate: Decimal) -> SchemeEvaluation {
        let mut meta = SchemeMeta::from_name(id.into(), name);
        meta.scheme_category = Some(category.to_string());
        SchemeEvaluation {
            outcome: Ok(XirrResult {
                scheme_id: id.into(),
                rate,
                as_of: d(2024, 6, 1),
                start: NavPoint::new(d(2023, 6, 1), dec!(10)),
                end: NavPoint::new(d(2024, 6, 1), dec!(11)),
            }),
            meta,
        }
    }

    const SMALL: &str = "Equity Scheme - Small Cap Fund";
    const DEBT: &str = "Debt Scheme - Liquid Fund";

    fn ids(entries: &[RankedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.scheme_id().as_str()).collect()
    }

    #[test]
    fn test_sorted_by_rate_descending() {
        let report = rank(
            vec![
                eval("1", "A Direct Growth", SMALL, dec!(0.10)),
                eval("2", "B Direct Growth", SMALL, dec!(0.30)),
                eval("3", "C Direct Growth", DEBT, dec!(0.20)),
            ],
            &RankingConfig::default(),
        );
        assert_eq!(ids(&report.overall), vec!["2", "3", "1"]);
        assert_eq!(report.overall[0].rank, 1);
        assert_eq!(ids(&report.by_category[&Category::EquitySmallCap]), vec!["2", "1"]);
        assert_eq!(report.by_category[&Category::Debt][0].rank, 1);
    }

    #[test]
    fn test_ties_break_by_scheme_id_ascending() {
        let report = rank(
            vec![
                eval("120", "X Direct Growth", SMALL, dec!(0.15)),
                eval("99", "Y Direct Growth", SMALL, dec!(0.15)),
                eval("100", "Z Direct Growth", SMALL, dec!(0.15)),
            ],
            &RankingConfig::default(),
        );
        assert_eq!(ids(&report.overall), vec!["99", "100", "120"]);
        assert_eq!(
            ids(&report.by_category[&Category::EquitySmallCap]),
            vec!["99", "100", "120"]
        );
    }

    #[test]
    fn test_regular_and_idcw_plans_never_ranked() {
        let report = rank(
            vec![
                eval("1", "Top Fund - Regular Plan - Growth", SMALL, dec!(0.90)),
                eval("2", "Top Fund - Direct Plan - IDCW", SMALL, dec!(0.80)),
                eval("3", "Top Fund - Direct Plan - Growth", SMALL, dec!(0.10)),
            ],
            &RankingConfig::default(),
        );
        assert_eq!(ids(&report.overall), vec!["3"]);
        assert_eq!(report.filtered, 2);
        assert!(report
            .by_category
            .values()
            .flatten()
            .all(|e| e.scheme_id().as_str() == "3"));
    }

    #[test]
    fn test_failed_schemes_are_excluded_with_reason() {
        let mut failed = eval("5", "Young Fund Direct Growth", SMALL, dec!(0));
        failed.outcome = Err(SchemeError::Calc(CalcError::InsufficientHistory(
            "2 months".to_string(),
        )));
        let report = rank(
            vec![failed, eval("1", "Old Fund Direct Growth", SMALL, dec!(0.1))],
            &RankingConfig::default(),
        );
        assert_eq!(ids(&report.overall), vec!["1"]);
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].scheme_id.as_str(), "5");
        assert!(report.excluded[0].reason.contains("insufficient history"));
    }

    #[test]
    fn test_top_n_limits() {
        let evaluations = (1..=10)
            .map(|i| {
                let category = if i % 2 == 0 { SMALL } else { DEBT };
                eval(&i.to_string(), "Fund Direct Growth", category, Decimal::from(i))
            })
            .collect();
        let report = rank(
            evaluations,
            &RankingConfig {
                overall_top_n: 3,
                category_top_n: 2,
            },
        );
        assert_eq!(ids(&report.overall), vec!["10", "9", "8"]);
        assert_eq!(ids(&report.by_category[&Category::EquitySmallCap]), vec!["10", "8"]);
        assert_eq!(ids(&report.by_category[&Category::Debt]), vec!["9", "7"]);
    }

    #[test]
    fn test_entries_carry_full_metadata_and_return() {
        let mut evaluation = eval(
            "42",
            "Alpha Small Cap Fund - Direct Plan - Growth",
            SMALL,
            dec!(0.1),
        );
        evaluation.meta.fund_house = Some("Alpha Mutual Fund".to_string());
        evaluation.meta.isin_growth = Some("INF000K01AB1".to_string());
        let report = rank(vec![evaluation], &RankingConfig::default());

        let entry = &report.overall[0];
        assert_eq!(entry.meta.plan, PlanType::Direct);
        assert!(!entry.meta.idcw);
        assert_eq!(entry.meta.isin_growth.as_deref(), Some("INF000K01AB1"));
        assert_eq!(entry.meta.fund_house.as_deref(), Some("Alpha Mutual Fund"));
        assert_eq!(entry.xirr.start, NavPoint::new(d(2023, 6, 1), dec!(10)));
        assert_eq!(entry.rate(), dec!(0.1));
        assert_eq!(entry.category, Category::EquitySmallCap);
    }

    #[test]
    fn test_empty_categories_are_absent() {
        let report = rank(
            vec![eval("1", "Fund Direct Growth", DEBT, dec!(0.05))],
            &RankingConfig::default(),
        );
        assert_eq!(report.by_category.len(), 1);
        assert!(!report.by_category.contains_key(&Category::Hybrid));
    }
}
