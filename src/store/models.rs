use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Opaque scheme identifier (MFAPI scheme code)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemeId(String);

impl SchemeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemeId {
    fn from(s: &str) -> Self {
        SchemeId::new(s)
    }
}

impl From<u64> for SchemeId {
    fn from(code: u64) -> Self {
        SchemeId(code.to_string())
    }
}

/// Numeric codes compare numerically ("9999" < "100033"), everything else
/// lexicographically after them. Equal numbers fall back to the raw text so
/// the order stays total.
impl Ord for SchemeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SchemeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One published NAV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: Decimal,
}

impl NavPoint {
    pub fn new(date: NaiveDate, nav: Decimal) -> Self {
        Self { date, nav }
    }
}

/// Date-ascending NAV history of one scheme, at most one point per date
#[derive(Debug, Clone, PartialEq)]
pub struct NavSeries {
    scheme_id: SchemeId,
    points: Vec<NavPoint>,
}

impl NavSeries {
    pub fn empty(scheme_id: SchemeId) -> Self {
        Self {
            scheme_id,
            points: Vec::new(),
        }
    }

    /// Build a series from points in any order. The first point seen for a
    /// date wins.
    pub fn from_points(scheme_id: SchemeId, mut points: Vec<NavPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { scheme_id, points }
    }

    pub fn scheme_id(&self) -> &SchemeId {
        &self.scheme_id
    }

    pub fn points(&self) -> &[NavPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&NavPoint> {
        self.points.first()
    }

    pub fn latest(&self) -> Option<&NavPoint> {
        self.points.last()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Latest point dated on or before `date`
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<&NavPoint> {
        let idx = self.points.partition_point(|p| p.date <= date);
        idx.checked_sub(1).map(|i| &self.points[i])
    }

    /// Point stored for exactly `date`
    pub fn get(&self, date: NaiveDate) -> Option<&NavPoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| &self.points[i])
    }
}

/// Outcome of merging fetched points into a stored series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub added: usize,
    pub skipped: usize,
}

/// Plan variant of a scheme
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlanType {
    Direct,
    Regular,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Direct => "DIRECT",
            PlanType::Regular => "REGULAR",
        }
    }

    /// MFAPI encodes the plan only in the scheme name
    pub fn detect_from_name(name: &str) -> Self {
        if name.to_lowercase().contains("direct") {
            PlanType::Direct
        } else {
            PlanType::Regular
        }
    }
}

impl FromStr for PlanType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIRECT" => Ok(PlanType::Direct),
            "REGULAR" => Ok(PlanType::Regular),
            _ => Err(()),
        }
    }
}

/// Leaderboard buckets, declared in report display order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    EquityLargeCap,
    EquityMidCap,
    EquitySmallCap,
    Hybrid,
    Debt,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::EquityLargeCap,
        Category::EquityMidCap,
        Category::EquitySmallCap,
        Category::Hybrid,
        Category::Debt,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::EquityLargeCap => "Equity - Large Cap",
            Category::EquityMidCap => "Equity - Mid Cap",
            Category::EquitySmallCap => "Equity - Small Cap",
            Category::Hybrid => "Hybrid",
            Category::Debt => "Debt",
            Category::Other => "Other",
        }
    }

    /// Classify an AMFI scheme category string such as
    /// "Equity Scheme - Small Cap Fund" or "Debt Scheme - Liquid Fund".
    pub fn classify(scheme_category: Option<&str>) -> Self {
        let Some(raw) = scheme_category else {
            return Category::Other;
        };
        let c = raw.trim().to_lowercase();

        if c.starts_with("equity") {
            // "Large & Mid Cap" is its own AMFI category and stays in Other
            if c.contains("large & mid") || c.contains("large and mid") {
                Category::Other
            } else if c.contains("small cap") {
                Category::EquitySmallCap
            } else if c.contains("mid cap") {
                Category::EquityMidCap
            } else if c.contains("large cap") {
                Category::EquityLargeCap
            } else {
                Category::Other
            }
        } else if c.starts_with("hybrid") {
            Category::Hybrid
        } else if c.starts_with("debt") {
            Category::Debt
        } else {
            Category::Other
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External scheme metadata, consumed read-only for filtering and grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeMeta {
    pub scheme_id: SchemeId,
    pub name: String,
    pub fund_house: Option<String>,
    pub scheme_type: Option<String>,
    pub scheme_category: Option<String>,
    pub plan: PlanType,
    pub idcw: bool,
    pub isin_growth: Option<String>,
    pub isin_div_reinvestment: Option<String>,
}

impl SchemeMeta {
    /// Metadata known from the scheme list alone (name only)
    pub fn from_name(scheme_id: SchemeId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            plan: PlanType::detect_from_name(&name),
            idcw: is_idcw_name(&name),
            scheme_id,
            name,
            fund_house: None,
            scheme_type: None,
            scheme_category: None,
            isin_growth: None,
            isin_div_reinvestment: None,
        }
    }

    pub fn category(&self) -> Category {
        Category::classify(self.scheme_category.as_deref())
    }

    /// Fill gaps in `self` with whatever `other` knows
    pub fn merged_with(mut self, other: &SchemeMeta) -> Self {
        if self.fund_house.is_none() {
            self.fund_house = other.fund_house.clone();
        }
        if self.scheme_type.is_none() {
            self.scheme_type = other.scheme_type.clone();
        }
        if self.scheme_category.is_none() {
            self.scheme_category = other.scheme_category.clone();
        }
        if self.isin_growth.is_none() {
            self.isin_growth = other.isin_growth.clone();
        }
        if self.isin_div_reinvestment.is_none() {
            self.isin_div_reinvestment = other.isin_div_reinvestment.clone();
        }
        self
    }
}

fn is_idcw_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("idcw") || lower.contains("dividend")
}
