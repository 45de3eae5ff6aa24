//! Attendance and leave validation.
//!
//! Malformed sign-in / sign-out sequences and leaves that cannot be
//! counted do not abort a report.  The reducers and the checks in this
//! module record each problem as a [`ValidationError`]; the report is
//! computed from whatever could be used and the list is returned next
//! to it.

use crate::calendar::{DailySummary, Period};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// A sign-out with no sign-in before it.
    OrphanSignOut,
    /// A sign-out directly following another sign-out.
    DuplicateSignOut,
    /// A sign-in while a shift was already open; the open shift is
    /// discarded.
    MissingSignOut,
    /// A sign-in that was not closed on the same local day.
    UnclosedShift,
    /// A shift ending before it starts.
    NegativeShift,
    /// A validated leave that does not cover whole local days.
    FractionalLeave,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationKind::OrphanSignOut => "sign-out without sign-in",
            ValidationKind::DuplicateSignOut => "two sign-outs in a row",
            ValidationKind::MissingSignOut => "two sign-ins in a row",
            ValidationKind::UnclosedShift => "sign-in not closed on the same day",
            ValidationKind::NegativeShift => "shift ends before it starts",
            ValidationKind::FractionalLeave => "leave does not cover whole days",
        };
        f.write_str(text)
    }
}

/// A record on one local day that was left out of the calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("invalid record on {date}: {kind} ({detail})")]
pub struct ValidationError {
    pub date: NaiveDate,
    pub kind: ValidationKind,
    pub detail: String,
}

impl ValidationError {
    pub fn new(date: NaiveDate, kind: ValidationKind, detail: impl Into<String>) -> Self {
        Self {
            date,
            kind,
            detail: detail.into(),
        }
    }
}

/// Ordered list of validation errors reported with a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrorList(Vec<ValidationError>);

impl ValidationErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Errors dated `day`.
    pub fn on(&self, day: NaiveDate) -> impl Iterator<Item = &ValidationError> {
        self.0.iter().filter(move |e| e.date == day)
    }

    /// Drop errors outside `period` and order the rest by date.  The
    /// sort is stable, so errors of one day keep detection order.
    pub fn finish(mut self, period: &Period) -> Self {
        self.0.retain(|e| period.contains(e.date));
        self.0.sort_by_key(|e| e.date);
        self
    }
}

impl Extend<ValidationError> for ValidationErrorList {
    fn extend<I: IntoIterator<Item = ValidationError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ValidationErrorList {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrorList {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Check the shifts already attached to each day and remove the ones
/// that cannot be counted.
pub fn check_shifts(days: &mut [DailySummary], errors: &mut ValidationErrorList) {
    for day in days.iter_mut() {
        let date = day.date;
        day.shifts.retain(|shift| {
            if shift.end < shift.start {
                errors.push(ValidationError::new(
                    date,
                    ValidationKind::NegativeShift,
                    format!("{} to {}", shift.start.format("%H:%M:%S"), shift.end.format("%H:%M:%S")),
                ));
                false
            } else {
                true
            }
        });
    }
}
