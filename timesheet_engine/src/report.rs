//! Monthly and yearly reports.
//!
//! The monthly pipeline runs the reducers in order (days, shifts,
//! leaves, validation, overtime) and reconciles the result with the
//! employee's payslips.  The yearly report runs the monthly pipeline
//! for every reportable month of the year.  Previous balances are
//! re-read from the payslip of each prior month rather than chained
//! from computed months, since payslips are the source of truth.

use crate::calendar::{prepare_days, DailySummary, Period};
use crate::engine::CancellationToken;
use crate::error::{EngineError, Result};
use crate::format::serialize_duration;
use crate::leaves::{attach_absences, reduce_leaves};
use crate::models::{Employee, EmployeeRecords, Payslip};
use crate::overtime::{MonthlySummary, OvertimeSummary};
use crate::payslip::{select_payslip, Balance};
use crate::shifts::{attach_shifts, ShiftReducer};
use crate::validation::{check_shifts, ValidationErrorList};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

/// Clock, timezone and policy a report is computed under.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext {
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub live_close_shifts: bool,
    /// Stop reports at today instead of covering days still to come.
    pub clamp_to_now: bool,
}

impl ReportContext {
    pub fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }
}

/// One day of a report together with its overtime figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    #[serde(flatten)]
    pub day: DailySummary,
    pub overtime: OvertimeSummary,
    #[serde(serialize_with = "serialize_duration")]
    pub total_overtime: Duration,
}

/// Working-time report of one employee over a range of days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub employee: Employee,
    /// First reported day.
    pub from: NaiveDate,
    /// Exclusive end of the reported days.
    pub to: NaiveDate,
    /// IANA name of the zone days were bucketed in.
    pub timezone: String,
    /// One entry per reported day, in date order.
    pub daily_summaries: Vec<DayReport>,
    /// Totals over `daily_summaries`.
    pub summary: MonthlySummary,
}

/// A monthly report reconciled with the payslips around it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub report: Report,
    /// Overtime recorded on the previous month's payslip.
    pub previous_balance: Balance,
    /// Previous balance plus this month's overtime.
    pub calculated_balance: Balance,
    /// Overtime already recorded on this month's payslip.
    pub definitive_balance: Option<Balance>,
}

impl BalanceReport {
    /// Text to store in the current payslip's overtime field.
    pub fn payslip_overtime(&self) -> Option<String> {
        self.calculated_balance.to_text()
    }

    /// Payslip strings that could not be read.
    pub fn balance_errors(&self) -> Vec<EngineError> {
        [Some(&self.previous_balance), self.definitive_balance.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(Balance::error)
            .collect()
    }
}

/// Build the report of `period` for one employee.  With
/// `ctx.clamp_to_now` the days after today are left out.
pub fn build_report(
    records: &EmployeeRecords,
    period: Period,
    ctx: &ReportContext,
    cancel: &CancellationToken,
) -> Result<(Report, ValidationErrorList)> {
    let period = if ctx.clamp_to_now {
        period.clamp_to(ctx.today())
    } else {
        period
    };
    debug!(employee = records.employee.id, from = %period.from, to = %period.to, "building report");

    cancel.check()?;
    let mut days = prepare_days(&period, &records.contracts)?;

    cancel.check()?;
    let live_close_at = ctx.live_close_shifts.then_some(ctx.now);
    let (shifts, mut errors) = ShiftReducer::new(ctx.tz, live_close_at).reduce(&records.attendances, &period);
    attach_shifts(&mut days, shifts);

    cancel.check()?;
    let absences = reduce_leaves(&records.leaves, &period, ctx.tz, &mut errors);
    attach_absences(&mut days, absences);

    cancel.check()?;
    check_shifts(&mut days, &mut errors);
    let errors = errors.finish(&period);

    cancel.check()?;
    let daily_summaries: Vec<DayReport> = days
        .into_iter()
        .map(|day| {
            let overtime = OvertimeSummary::for_day(&day);
            DayReport {
                total_overtime: overtime.overtime(),
                day,
                overtime,
            }
        })
        .collect();
    let summary = MonthlySummary::from_days(daily_summaries.iter().map(|d| (&d.day, &d.overtime)));

    let report = Report {
        employee: records.employee.clone(),
        from: period.from,
        to: period.to,
        timezone: ctx.tz.name().to_string(),
        daily_summaries,
        summary,
    };
    Ok((report, errors))
}

/// Combine a month's report with the previous and current payslips.
pub fn reconcile(report: Report, month: Period, payslips: &[Payslip]) -> BalanceReport {
    let previous_month = month
        .from
        .checked_sub_months(Months::new(1))
        .map(|from| Period::new(from, month.from));

    let previous_balance = previous_month
        .and_then(|prev| select_payslip(payslips, prev.from, prev.last_day()))
        .map_or_else(Balance::zero, Balance::from_payslip);
    let calculated_balance = previous_balance.plus(report.summary.total_overtime);
    let definitive_balance = select_payslip(payslips, month.from, month.last_day())
        .filter(|p| p.overtime_text().is_some())
        .map(Balance::from_payslip);

    BalanceReport {
        report,
        previous_balance,
        calculated_balance,
        definitive_balance,
    }
}

/// The monthly pipeline: report plus payslip reconciliation.
pub fn build_monthly(
    records: &EmployeeRecords,
    year: i32,
    month: u32,
    ctx: &ReportContext,
    cancel: &CancellationToken,
) -> Result<(BalanceReport, ValidationErrorList)> {
    let period = Period::month(year, month)
        .ok_or_else(|| EngineError::InputDecode(format!("invalid month {year}-{month}")))?;
    let (report, errors) = build_report(records, period, ctx, cancel)?;
    cancel.check()?;
    Ok((reconcile(report, period, &records.payslips), errors))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearlySummary {
    #[serde(serialize_with = "serialize_duration")]
    pub total_overtime: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub total_excused: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub total_worked: Duration,
    pub total_leaves: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyReport {
    pub year: i32,
    pub employee: Employee,
    pub monthly_reports: Vec<BalanceReport>,
    pub summary: YearlySummary,
    pub validation_errors: ValidationErrorList,
}

/// Months of `year` to report on: from the first contract month (or
/// January) up to the current month (or December).  Future years have
/// none.
pub fn reportable_months(year: i32, first_contract_start: Option<NaiveDate>, today: NaiveDate) -> Vec<u32> {
    if year > today.year() {
        return Vec::new();
    }
    let lower = first_contract_start
        .filter(|start| start.year() == year)
        .map_or(1, |start| start.month());
    let upper = if year == today.year() { today.month() } else { 12 };
    (lower..=upper).collect()
}

pub fn build_yearly(
    records: &EmployeeRecords,
    year: i32,
    ctx: &ReportContext,
    cancel: &CancellationToken,
) -> Result<YearlyReport> {
    let months = reportable_months(year, records.first_contract_start(), ctx.today());
    let mut monthly_reports = Vec::with_capacity(months.len());
    let mut validation_errors = ValidationErrorList::new();
    let mut summary = YearlySummary {
        total_overtime: Duration::zero(),
        total_excused: Duration::zero(),
        total_worked: Duration::zero(),
        total_leaves: 0.0,
    };

    for month in months {
        let (balance, errors) = build_monthly(records, year, month, ctx, cancel)?;
        let totals = &balance.report.summary;
        summary.total_overtime = summary.total_overtime + totals.total_overtime;
        summary.total_excused = summary.total_excused + totals.total_excused_time;
        summary.total_worked = summary.total_worked + totals.total_worked_time;
        summary.total_leaves += totals.total_leave;
        validation_errors.extend(errors);
        monthly_reports.push(balance);
    }

    Ok(YearlyReport {
        year,
        employee: records.employee.clone(),
        monthly_reports,
        summary,
        validation_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, Attendance, Contract, Leave, LeaveState, Relation};
    use crate::validation::ValidationKind;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ctx(now: DateTime<Utc>) -> ReportContext {
        ReportContext {
            now,
            tz: chrono_tz::UTC,
            live_close_shifts: false,
            clamp_to_now: true,
        }
    }

    fn far_future() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn attendance(id: i64, at: (u32, u32, u32), action: Action, reason: Option<&str>) -> Attendance {
        Attendance {
            id,
            datetime: Utc.with_ymd_and_hms(2021, at.0, at.1, at.2, 0, 0).unwrap(),
            action,
            reason: reason.map(|name| Relation {
                id: 9,
                name: name.into(),
            }),
        }
    }

    fn payslip(id: i64, name: &str, month: u32, overtime: Option<&str>) -> Payslip {
        let period = Period::month(2021, month).unwrap();
        Payslip {
            id,
            name: name.into(),
            date_from: period.from,
            date_to: period.last_day(),
            overtime: overtime.map(String::from),
            timezone: None,
        }
    }

    fn records() -> EmployeeRecords {
        EmployeeRecords {
            employee: Employee {
                id: 1,
                name: "Jane".into(),
            },
            contracts: vec![Contract {
                start: day(2021, 1, 1),
                end: None,
                working_schedule: Some(Relation {
                    id: 1,
                    name: "Full 100%".into(),
                }),
            }],
            attendances: Vec::new(),
            leaves: Vec::new(),
            payslips: Vec::new(),
        }
    }

    /// Records where every weekday of February 2021 has exactly eight
    /// hours, plus one extra hour on the 3rd.
    fn february_records() -> EmployeeRecords {
        let mut r = records();
        let mut id = 0;
        for d in Period::month(2021, 2).unwrap().days() {
            if crate::calendar::is_weekend(d) {
                continue;
            }
            let end = if d.day() == 3 { 18 } else { 17 };
            id += 2;
            r.attendances.push(attendance(id, (2, d.day(), 9), Action::SignIn, None));
            r.attendances.push(attendance(id + 1, (2, d.day(), end), Action::SignOut, None));
        }
        r
    }

    #[test]
    fn month_without_anomalies() {
        let (report, errors) = build_report(
            &february_records(),
            Period::month(2021, 2).unwrap(),
            &ctx(far_future()),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(errors.is_empty());
        assert_eq!(report.daily_summaries.len(), 28);
        assert_eq!(report.summary.total_overtime, Duration::hours(1));
        assert_eq!(report.summary.total_worked_time, Duration::hours(20 * 8 + 1));
        assert_eq!(report.summary.average_workload, 1.0);
        let wed = &report.daily_summaries[2];
        assert_eq!(wed.day.date, day(2021, 2, 3));
        assert_eq!(wed.total_overtime, Duration::hours(1));
    }

    #[test]
    fn total_overtime_ignores_event_order() {
        let mut r = february_records();
        let period = Period::month(2021, 2).unwrap();
        let (a, _) = build_report(&r, period, &ctx(far_future()), &CancellationToken::new()).unwrap();
        r.attendances.reverse();
        let (b, _) = build_report(&r, period, &ctx(far_future()), &CancellationToken::new()).unwrap();
        assert_eq!(a.summary.total_overtime, b.summary.total_overtime);
    }

    #[test]
    fn leave_days_and_bad_sequences() {
        let mut r = february_records();
        // Drop the sign-out of the 4th and take a vacation on the 5th.
        r.attendances.retain(|a| !(a.datetime.day() == 4 && a.action == Action::SignOut));
        r.attendances.retain(|a| a.datetime.day() != 5);
        let vacation = Leave {
            id: 1,
            date_from: Utc.with_ymd_and_hms(2021, 2, 5, 0, 0, 0).unwrap(),
            date_to: Utc.with_ymd_and_hms(2021, 2, 6, 0, 0, 0).unwrap(),
            leave_type: Some(Relation {
                id: 3,
                name: "Legal Leaves 2021".into(),
            }),
            state: LeaveState::Validate,
        };
        // A morning off on Monday the 8th is not a whole day: rejected,
        // the 8th is still worked in full.
        let morning_off = Leave {
            id: 2,
            date_from: Utc.with_ymd_and_hms(2021, 2, 8, 8, 0, 0).unwrap(),
            date_to: Utc.with_ymd_and_hms(2021, 2, 8, 12, 0, 0).unwrap(),
            ..vacation.clone()
        };
        r.leaves.extend([vacation, morning_off]);
        let (report, errors) = build_report(
            &r,
            Period::month(2021, 2).unwrap(),
            &ctx(far_future()),
            &CancellationToken::new(),
        )
        .unwrap();
        let found: Vec<_> = errors.iter().map(|e| (e.date, e.kind)).collect();
        assert_eq!(
            found,
            vec![
                (day(2021, 2, 4), ValidationKind::UnclosedShift),
                (day(2021, 2, 8), ValidationKind::FractionalLeave),
            ]
        );
        // +1h on the 3rd, -8h for the 4th, the 5th is covered by leave.
        assert_eq!(report.summary.total_overtime, Duration::hours(-7));
        assert_eq!(report.summary.total_leave, 1.0);
    }

    #[test]
    fn report_stops_at_today() {
        let now = Utc.with_ymd_and_hms(2021, 2, 10, 12, 0, 0).unwrap();
        let (report, _) = build_report(
            &february_records(),
            Period::month(2021, 2).unwrap(),
            &ctx(now),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(report.to, day(2021, 2, 11));
        assert_eq!(report.daily_summaries.len(), 10);
    }

    #[test]
    fn unclamped_report_covers_the_whole_range() {
        let now = Utc.with_ymd_and_hms(2021, 2, 10, 12, 0, 0).unwrap();
        let unclamped = ReportContext {
            clamp_to_now: false,
            ..ctx(now)
        };
        let (report, _) = build_report(
            &february_records(),
            Period::month(2021, 2).unwrap(),
            &unclamped,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(report.to, day(2021, 3, 1));
        assert_eq!(report.daily_summaries.len(), 28);
    }

    #[test]
    fn balance_from_previous_payslip() {
        let mut r = records();
        r.payslips.push(payslip(1, "Salary January", 1, Some("Currently 6:30 (including holidays)")));
        r.payslips.push(payslip(2, "Salary February", 2, None));
        // Three weekdays of 9h50m each: 5h30m of overtime.
        for (i, d) in [1u32, 2, 3].into_iter().enumerate() {
            let id = i as i64 * 2;
            r.attendances.push(attendance(id, (2, d, 8), Action::SignIn, None));
            r.attendances.push(Attendance {
                id: id + 1,
                datetime: Utc.with_ymd_and_hms(2021, 2, d, 17, 50, 0).unwrap(),
                action: Action::SignOut,
                reason: None,
            });
        }
        let (report, _) = build_report(
            &r,
            Period::new(day(2021, 2, 1), day(2021, 2, 4)),
            &ctx(far_future()),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(report.summary.total_overtime, Duration::minutes(330));

        let balance = reconcile(report, Period::month(2021, 2).unwrap(), &r.payslips);
        assert_eq!(balance.previous_balance, Balance::Known(Duration::minutes(390)));
        assert_eq!(balance.calculated_balance, Balance::Known(Duration::hours(12)));
        assert_eq!(balance.definitive_balance, None);
        assert_eq!(balance.payslip_overtime().as_deref(), Some("12:00:00"));
        assert!(balance.balance_errors().is_empty());
    }

    #[test]
    fn definitive_and_unparseable_balances() {
        let mut r = records();
        r.payslips.push(payslip(1, "Salary January", 1, Some("a lot")));
        r.payslips.push(payslip(2, "Salary February", 2, Some("-2:15")));
        let (balance, _) = build_monthly(&r, 2021, 2, &ctx(far_future()), &CancellationToken::new()).unwrap();
        assert_eq!(
            balance.previous_balance,
            Balance::Unparseable {
                unparseable: "a lot".into()
            }
        );
        assert_eq!(balance.calculated_balance.duration(), None);
        assert_eq!(
            balance.definitive_balance,
            Some(Balance::Known(-(Duration::hours(2) + Duration::minutes(15))))
        );
        assert_eq!(
            balance.balance_errors(),
            vec![EngineError::UnparseableOvertime("a lot".into())]
        );
    }

    #[test]
    fn missing_contract_fails_month() {
        let r = records();
        let err = build_monthly(&r, 2020, 12, &ctx(far_future()), &CancellationToken::new()).unwrap_err();
        assert_eq!(err, EngineError::NoContractCoversDate(day(2020, 12, 1)));
    }

    #[test]
    fn cancelled_pipeline_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = build_monthly(&records(), 2021, 2, &ctx(far_future()), &cancel).unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    #[test]
    fn months_of_a_year() {
        let today = day(2021, 5, 17);
        assert_eq!(reportable_months(2021, Some(day(2021, 3, 15)), today), vec![3, 4, 5]);
        assert_eq!(reportable_months(2020, Some(day(2019, 3, 15)), today).len(), 12);
        assert_eq!(reportable_months(2021, Some(day(2020, 3, 15)), today), vec![1, 2, 3, 4, 5]);
        assert!(reportable_months(2022, None, today).is_empty());
    }

    #[test]
    fn yearly_sums_months() {
        let mut r = february_records();
        r.contracts[0].start = day(2021, 2, 1);
        let now = Utc.with_ymd_and_hms(2021, 3, 2, 12, 0, 0).unwrap();
        let report = build_yearly(&r, 2021, &ctx(now), &CancellationToken::new()).unwrap();
        assert_eq!(report.monthly_reports.len(), 2);
        // February: +1h.  March 1st and 2nd without attendance: -16h.
        assert_eq!(report.summary.total_overtime, Duration::hours(-15));
        assert_eq!(report.summary.total_worked, Duration::hours(161));
        assert!(report.validation_errors.is_empty());
    }
}
