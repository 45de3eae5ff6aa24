//! Overtime calculation.
//!
//! Each day's shifts are accumulated into time buckets by reason and
//! compared against the day's maximum, the contractual working time
//! after FTE and era adjustments.  The rules:
//!
//! * work outside office hours counts 1.5×;
//! * excused time (sickness, authorities, public service) only fills
//!   a day up to its maximum and is ignored once working time reaches
//!   it, so it never produces overtime;
//! * weekends have a maximum of zero;
//! * an absence other than unpaid leave displaces the day's obligation.

use crate::calendar::{is_weekend, DailySummary};
use crate::format::serialize_duration;
use crate::models::{ActionReason, LeaveKind};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use tracing::debug;

/// Full-time working hours per day before 2021.
pub const HOURS_PER_DAY_BEFORE_2021: f64 = 8.5;
/// Full-time working hours per day from 2021 on.
pub const HOURS_PER_DAY: f64 = 8.0;

/// Contractual working time of `date` before absences are applied.
pub fn nominal_daily_max(date: NaiveDate, fte_ratio: f64) -> Duration {
    if is_weekend(date) {
        return Duration::zero();
    }
    let hours = if date.year() < 2021 {
        HOURS_PER_DAY_BEFORE_2021
    } else {
        HOURS_PER_DAY
    };
    Duration::seconds((hours * 3600.0 * fte_ratio).round() as i64)
}

/// Time buckets and limits of one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OvertimeSummary {
    #[serde(serialize_with = "serialize_duration")]
    pub regular_working_time: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub out_of_office_time: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub sick_leave_time: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub authorities_time: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub public_service_time: Duration,
    /// Obligation of the day after absences.
    #[serde(serialize_with = "serialize_duration")]
    pub daily_max: Duration,
    /// Part of the nominal obligation displaced by absences.
    #[serde(serialize_with = "serialize_duration")]
    pub absence_equivalent: Duration,
}

impl OvertimeSummary {
    pub fn for_day(day: &DailySummary) -> Self {
        let nominal = nominal_daily_max(day.date, day.fte_ratio);
        let absence_equivalent = if day.absences.iter().any(|a| a.kind.displaces_obligation()) {
            nominal
        } else {
            Duration::zero()
        };

        let mut summary = Self {
            regular_working_time: Duration::zero(),
            out_of_office_time: Duration::zero(),
            sick_leave_time: Duration::zero(),
            authorities_time: Duration::zero(),
            public_service_time: Duration::zero(),
            daily_max: nominal - absence_equivalent,
            absence_equivalent,
        };

        for shift in &day.shifts {
            let bucket = match shift.reason {
                ActionReason::Regular => &mut summary.regular_working_time,
                ActionReason::OutsideOfficeHours => &mut summary.out_of_office_time,
                ActionReason::SickOrMedical => &mut summary.sick_leave_time,
                ActionReason::Authorities => &mut summary.authorities_time,
                ActionReason::PublicService => &mut summary.public_service_time,
                ActionReason::Other => {
                    debug!(date = %day.date, reason = %shift.reason_name, "discarding shift with unknown reason");
                    continue;
                }
            };
            *bucket = *bucket + shift.duration();
        }
        summary
    }

    /// Regular time plus 1.5× the time worked outside office hours.
    pub fn working_time(&self) -> Duration {
        self.regular_working_time + self.out_of_office_time + self.out_of_office_time / 2
    }

    /// Excused time, capped at the daily maximum.
    pub fn excused_time(&self) -> Duration {
        let raw = self.sick_leave_time + self.authorities_time + self.public_service_time;
        raw.min(self.daily_max)
    }

    /// Excused time actually credited: none once working time reaches
    /// the maximum, otherwise only up to the maximum.
    pub fn credited_excused_time(&self) -> Duration {
        let working = self.working_time();
        let excused = self.excused_time();
        if working >= self.daily_max {
            Duration::zero()
        } else if working + excused > self.daily_max {
            self.daily_max - working
        } else {
            excused
        }
    }

    /// Signed overtime of the day.
    pub fn overtime(&self) -> Duration {
        self.working_time() + self.credited_excused_time() - self.daily_max
    }
}

/// Totals over the days of one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlySummary {
    #[serde(serialize_with = "serialize_duration")]
    pub total_overtime: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub total_excused_time: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub total_worked_time: Duration,
    /// Days of legal leave (vacation) taken.
    pub total_leave: f64,
    /// Mean FTE ratio over the weekdays of the month.
    pub average_workload: f64,
}

impl MonthlySummary {
    pub fn from_days<'a, I>(days: I) -> Self
    where
        I: IntoIterator<Item = (&'a DailySummary, &'a OvertimeSummary)>,
    {
        let mut summary = MonthlySummary {
            total_overtime: Duration::zero(),
            total_excused_time: Duration::zero(),
            total_worked_time: Duration::zero(),
            total_leave: 0.0,
            average_workload: 0.0,
        };
        let mut workload = 0.0;
        let mut weekdays = 0u32;
        for (day, overtime) in days {
            summary.total_overtime = summary.total_overtime + overtime.overtime();
            summary.total_excused_time = summary.total_excused_time + overtime.credited_excused_time();
            summary.total_worked_time = summary.total_worked_time + overtime.working_time();
            summary.total_leave += day
                .absences
                .iter()
                .filter(|a| a.kind == LeaveKind::LegalLeaves)
                .count() as f64;
            if !is_weekend(day.date) {
                workload += day.fte_ratio;
                weekdays += 1;
            }
        }
        if weekdays > 0 {
            summary.average_workload = workload / f64::from(weekdays);
        }
        summary
    }
}
