//! Rate-of-return solver for irregularly dated cash flows
//!
//! Finds the annualized rate `r` at which
//!
//! ```text
//! NPV(r) = sum(amount_i / (1 + r)^((date_i - date_0) / 365)) = 0
//! ```
//!
//! Two flows (one investment, one redemption) have a closed form. Anything
//! longer goes through Newton-Raphson, falling back to bisection when Newton
//! leaves the valid domain or stalls.

use chrono::NaiveDate;

use crate::error::CalcError;

pub const DAYS_PER_YEAR: f64 = 365.0;

const NEWTON_MAX_ITERATIONS: usize = 100;
const BISECTION_MAX_ITERATIONS: usize = 300;
const TOLERANCE: f64 = 1e-10;
const INITIAL_GUESS: f64 = 0.1;
const LOWER_BOUND: f64 = -0.9999;
const UPPER_BOUND: f64 = 100.0;

/// A dated amount. Outflows (investments) are negative, inflows positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

impl CashFlow {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        Self { date, amount }
    }
}

/// Solve for the annualized rate of a date-ordered cash flow sequence
pub fn solve(flows: &[CashFlow]) -> Result<f64, CalcError> {
    let (first, last) = match (flows.first(), flows.last()) {
        (Some(first), Some(last)) if flows.len() >= 2 => (first, last),
        _ => {
            return Err(CalcError::InsufficientHistory(
                "at least two cash flows are required".to_string(),
            ))
        }
    };

    if let Some(pair) = flows.windows(2).find(|w| w[1].date < w[0].date) {
        return Err(CalcError::DateOrderViolation {
            start: pair[0].date,
            end: pair[1].date,
        });
    }
    if first.date >= last.date {
        return Err(CalcError::DateOrderViolation {
            start: first.date,
            end: last.date,
        });
    }
    if !flows.iter().any(|f| f.amount < 0.0) || !flows.iter().any(|f| f.amount > 0.0) {
        return Err(CalcError::NoConvergence(
            "cash flows need at least one outflow and one inflow".to_string(),
        ));
    }

    if flows.len() == 2 {
        return closed_form(first, last);
    }

    let times: Vec<f64> = flows
        .iter()
        .map(|f| (f.date - first.date).num_days() as f64 / DAYS_PER_YEAR)
        .collect();

    match newton(flows, &times) {
        Some(rate) => Ok(rate),
        None => bisection(flows, &times),
    }
}

fn closed_form(start: &CashFlow, end: &CashFlow) -> Result<f64, CalcError> {
    let growth = -end.amount / start.amount;
    if growth <= 0.0 || !growth.is_finite() {
        return Err(CalcError::NoConvergence(format!(
            "growth factor {} has no real annualized rate",
            growth
        )));
    }
    let years = (end.date - start.date).num_days() as f64 / DAYS_PER_YEAR;
    let rate = growth.powf(1.0 / years) - 1.0;
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(CalcError::NoConvergence(format!(
            "annualizing {} over {:.4} years overflowed",
            growth, years
        )))
    }
}

/// Net present value at `rate`
pub fn npv(flows: &[CashFlow], times: &[f64], rate: f64) -> f64 {
    flows
        .iter()
        .zip(times)
        .map(|(f, t)| f.amount / (1.0 + rate).powf(*t))
        .sum()
}

fn npv_derivative(flows: &[CashFlow], times: &[f64], rate: f64) -> f64 {
    flows
        .iter()
        .zip(times)
        .map(|(f, t)| -t * f.amount / (1.0 + rate).powf(t + 1.0))
        .sum()
}

fn newton(flows: &[CashFlow], times: &[f64]) -> Option<f64> {
    let mut rate = INITIAL_GUESS;
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let value = npv(flows, times, rate);
        let slope = npv_derivative(flows, times, rate);
        if slope == 0.0 || !slope.is_finite() || !value.is_finite() {
            return None;
        }
        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            return None;
        }
        if (next - rate).abs() < TOLERANCE {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisection(flows: &[CashFlow], times: &[f64]) -> Result<f64, CalcError> {
    let mut lo = LOWER_BOUND;
    let mut hi = UPPER_BOUND;
    let mut f_lo = npv(flows, times, lo);
    let f_hi = npv(flows, times, hi);

    if f_lo.signum() == f_hi.signum() {
        return Err(CalcError::NoConvergence(format!(
            "no sign change of NPV within [{}, {}]",
            LOWER_BOUND, UPPER_BOUND
        )));
    }

    for _ in 0..BISECTION_MAX_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let f_mid = npv(flows, times, mid);
        if f_mid.abs() < TOLERANCE || (hi - lo) / 2.0 < TOLERANCE {
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(CalcError::NoConvergence(
        "bisection exhausted its iterations".to_string(),
    ))
}
