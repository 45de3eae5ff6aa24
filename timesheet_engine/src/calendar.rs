//! Day bucketing.
//!
//! A report covers a half-open range of local calendar days.  The
//! bucketer turns that range into one [`DailySummary`] per day, each
//! carrying the FTE ratio of the contract active on that day.  Shifts
//! and absences are attached later by the reducers.

use crate::error::Result;
use crate::leaves::AbsenceBlock;
use crate::models::{fte_for, Contract};
use crate::shifts::Shift;
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

/// Half-open range `[from, to)` of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// The calendar month `month` of `year`.  Returns `None` for an
    /// invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)?;
        let to = from.checked_add_months(chrono::Months::new(1))?;
        Some(Self { from, to })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.from && day < self.to
    }

    /// Last day inside the period.
    pub fn last_day(&self) -> NaiveDate {
        self.to.pred_opt().unwrap_or(self.to)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d < to)
    }

    /// Cut the period so that it ends with today.  Future days are
    /// never reported.
    pub fn clamp_to(self, today: NaiveDate) -> Self {
        if self.to > today {
            let to = today.succ_opt().unwrap_or(today);
            Self { from: self.from, to }
        } else {
            self
        }
    }

    /// UTC instants of local midnight on `from - 1 day` and
    /// `to + 1 day`.  ERP timestamps are stored in UTC, so queries and
    /// filters use this widened window and re-bucket in local time.
    pub fn widened_window(&self, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.from.checked_sub_days(Days::new(1)).unwrap_or(self.from);
        let end = self.to.checked_add_days(Days::new(1)).unwrap_or(self.to);
        (local_midnight(tz, start), local_midnight(tz, end))
    }
}

/// Midnight of `day` in `tz`, as a UTC instant.  Zones whose midnight
/// is skipped by a DST jump resolve to the first valid instant.
pub fn local_midnight(tz: Tz, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| tz.from_utc_datetime(&naive).with_timezone(&Utc))
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The working day record of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub fte_ratio: f64,
    pub shifts: Vec<Shift>,
    pub absences: Vec<AbsenceBlock>,
}

impl DailySummary {
    pub fn new(date: NaiveDate, fte_ratio: f64) -> Self {
        Self {
            date,
            fte_ratio,
            shifts: Vec::new(),
            absences: Vec::new(),
        }
    }
}

/// Build one empty summary per day of `period`.
///
/// Fails with [`crate::error::EngineError::NoContractCoversDate`] as
/// soon as a day has no contract.
pub fn prepare_days(period: &Period, contracts: &[Contract]) -> Result<Vec<DailySummary>> {
    period
        .days()
        .map(|day| Ok(DailySummary::new(day, fte_for(contracts, day)?)))
        .collect()
}

/// Find the summary for `day` in a chronologically sorted slice.
pub fn day_mut(days: &mut [DailySummary], day: NaiveDate) -> Option<&mut DailySummary> {
    days.binary_search_by_key(&day, |d| d.date)
        .ok()
        .map(move |idx| &mut days[idx])
}
