//! Payslip overtime handling.
//!
//! The overtime field of a payslip is typed by people, so it is read
//! with a regular expression: the first `H:MM` (optionally `H:MM:SS`
//! or `H:MMSS`) token wins and anything around it is ignored, e.g.
//! `"Currently 6:30 (including holidays)"` reads as six and a half
//! hours.  A leading `-` on the hours makes the whole value negative.

use crate::error::{EngineError, Result};
use crate::format::{format_duration, serialize_duration};
use crate::models::Payslip;
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static OVERTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s).*?((-?\d+):(\d{2})(?::?(\d{2}))?).*").expect("static regex"));

/// Parse a payslip overtime string.  Absent or blank strings are zero.
pub fn parse_overtime(raw: Option<&str>) -> Result<Duration> {
    let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Duration::zero());
    };
    let unparseable = || EngineError::UnparseableOvertime(text.to_string());
    let caps = OVERTIME.captures(text).ok_or_else(unparseable)?;

    let hours_text = &caps[2];
    let hours: i64 = hours_text.trim_start_matches('-').parse().map_err(|_| unparseable())?;
    let minutes: i64 = caps[3].parse().map_err(|_| unparseable())?;
    let seconds: i64 = match caps.get(4) {
        Some(m) => m.as_str().parse().map_err(|_| unparseable())?,
        None => 0,
    };

    let total = hours
        .checked_mul(3600)
        .and_then(|s| s.checked_add(minutes * 60 + seconds))
        .ok_or_else(unparseable)?;
    let magnitude = Duration::try_seconds(total).ok_or_else(unparseable)?;
    Ok(if hours_text.starts_with('-') { -magnitude } else { magnitude })
}

/// Pick the payslip for the days `[first, last]`.
///
/// On-call ("Pikett") payslips are skipped; among the rest a "Salary"
/// payslip is preferred, otherwise the first match in input order.
pub fn select_payslip(payslips: &[Payslip], first: NaiveDate, last: NaiveDate) -> Option<&Payslip> {
    let mut candidates = payslips
        .iter()
        .filter(|p| p.overlaps(first, last) && !p.name.contains("Pikett"))
        .peekable();
    let fallback = *candidates.peek()?;
    Some(candidates.find(|p| p.name.contains("Salary")).unwrap_or(fallback))
}

/// An overtime balance, or the payslip text it could not be read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Balance {
    Known(#[serde(serialize_with = "serialize_duration")] Duration),
    Unparseable { unparseable: String },
}

impl Balance {
    pub fn zero() -> Self {
        Balance::Known(Duration::zero())
    }

    /// Read a payslip's overtime string.  A string that cannot be read
    /// becomes [`Balance::Unparseable`] instead of failing the report.
    pub fn from_payslip(payslip: &Payslip) -> Self {
        match parse_overtime(payslip.overtime_text()) {
            Ok(duration) => Balance::Known(duration),
            Err(err) => {
                tracing::warn!(payslip = payslip.id, error = %err, "payslip overtime ignored");
                Balance::Unparseable {
                    unparseable: payslip.overtime_text().unwrap_or_default().to_string(),
                }
            }
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Balance::Known(d) => Some(*d),
            Balance::Unparseable { .. } => None,
        }
    }

    /// Add `delta`.  A sum outside the representable range is unparseable.
    pub fn plus(&self, delta: Duration) -> Self {
        match self {
            Balance::Known(d) => match d.checked_add(&delta) {
                Some(sum) => Balance::Known(sum),
                None => Balance::Unparseable {
                    unparseable: format!("{} + {}", format_duration(d), format_duration(&delta)),
                },
            },
            other => other.clone(),
        }
    }

    /// The error this balance stands in for, if any.
    pub fn error(&self) -> Option<EngineError> {
        match self {
            Balance::Known(_) => None,
            Balance::Unparseable { unparseable } => Some(EngineError::UnparseableOvertime(unparseable.clone())),
        }
    }

    pub fn to_text(&self) -> Option<String> {
        self.duration().map(|d| format_duration(&d))
    }
}
