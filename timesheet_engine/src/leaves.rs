//! Leave reduction.
//!
//! Validated leaves are split into one [`AbsenceBlock`] per local
//! calendar day.  The granularity is always a full day: a leave must
//! start at local midnight and end at local midnight or on the last
//! second of a day.  Any other leave is rejected with a
//! [`ValidationKind::FractionalLeave`] error and left out of the
//! calculation.  Weekend days and days outside the report range are
//! dropped.

use crate::calendar::{day_mut, is_weekend, DailySummary, Period};
use crate::models::{Leave, LeaveKind, LeaveState};
use crate::validation::{ValidationError, ValidationErrorList, ValidationKind};
use chrono::{NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

/// One full calendar day covered by an approved leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsenceBlock {
    pub date: NaiveDate,
    /// Leave type name as recorded in the ERP.
    pub reason: String,
    pub kind: LeaveKind,
}

fn is_end_of_day(t: NaiveTime) -> bool {
    (t.hour(), t.minute(), t.second()) == (23, 59, 59)
}

/// Whether `leave` is made of whole local days.
pub fn is_whole_day(leave: &Leave, tz: Tz) -> bool {
    let from = leave.date_from.with_timezone(&tz).time();
    let to = leave.date_to.with_timezone(&tz).time();
    from == NaiveTime::MIN && (to == NaiveTime::MIN || is_end_of_day(to))
}

/// Local calendar days covered by `leave`.
///
/// A leave starting and ending on the same day covers that day.  A
/// longer one covers `[from day, to day)`; an end on the last second
/// of a day counts as the following midnight.
pub fn split_by_day(leave: &Leave, tz: Tz) -> Vec<NaiveDate> {
    let first = leave.date_from.with_timezone(&tz).date_naive();
    let to = leave.date_to.with_timezone(&tz);
    let mut last = to.date_naive();
    if is_end_of_day(to.time()) {
        last = last.succ_opt().unwrap_or(last);
    }
    if first == last {
        return vec![first];
    }
    first.iter_days().take_while(|d| *d < last).collect()
}

/// Absence blocks of the validated whole-day leaves in `period`.
/// Fractional-day leaves touching `period` are recorded in `errors`.
pub fn reduce_leaves(
    leaves: &[Leave],
    period: &Period,
    tz: Tz,
    errors: &mut ValidationErrorList,
) -> Vec<AbsenceBlock> {
    let mut blocks = Vec::new();
    for leave in leaves.iter().filter(|leave| leave.state == LeaveState::Validate) {
        let days = split_by_day(leave, tz);
        if !is_whole_day(leave, tz) {
            if let Some(date) = days.iter().copied().find(|d| period.contains(*d)) {
                debug!(leave = leave.id, "fractional-day leave rejected");
                errors.push(ValidationError::new(
                    date,
                    ValidationKind::FractionalLeave,
                    format!(
                        "leave {} from {} to {}",
                        leave.id,
                        leave.date_from.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S"),
                        leave.date_to.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S"),
                    ),
                ));
            }
            continue;
        }
        let reason = leave.type_name().to_string();
        let kind = LeaveKind::from_name(&reason);
        blocks.extend(
            days.into_iter()
                .filter(|date| !is_weekend(*date) && period.contains(*date))
                .map(|date| AbsenceBlock {
                    date,
                    reason: reason.clone(),
                    kind,
                }),
        );
    }
    blocks
}

pub fn attach_absences(days: &mut [DailySummary], blocks: Vec<AbsenceBlock>) {
    for block in blocks {
        if let Some(day) = day_mut(days, block.date) {
            day.absences.push(block);
        }
    }
}
