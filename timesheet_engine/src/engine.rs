//! Timesheet computation engine.
//!
//! The `engine` module is the façade over the report pipeline.  An
//! [`Engine`] holds the clock value and the policies a run is computed
//! under; it turns [`EmployeeRecords`] into monthly or yearly reports.
//! Multi-employee runs use the [`rayon`] crate to compute each
//! employee on a fixed-size worker pool.  Employees never share state,
//! so the only synchronisation is collecting the results at the end.

use crate::error::{BatchError, EmployeeFailure, EngineError, Result};
use crate::models::{Employee, EmployeeRecords};
use crate::report::{build_monthly, build_yearly, BalanceReport, ReportContext, YearlyReport};
use crate::validation::ValidationErrorList;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Zurich;

/// Signalled by the caller (e.g. on client disconnect) to abort a run.
/// Every pipeline step checks it before starting.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a monthly run for one employee.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyEmployeeReport {
    pub balance: BalanceReport,
    pub validation_errors: ValidationErrorList,
}

/// Outcome of a multi-employee run: the reports that could be built,
/// in input order, and the employees that failed.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome<T> {
    pub reports: Vec<T>,
    pub failures: Vec<EmployeeFailure>,
}

impl<T> BatchOutcome<T> {
    /// The combined error of all failed employees, if any.
    pub fn error(&self) -> Option<BatchError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(BatchError {
                failures: self.failures.clone(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    now: DateTime<Utc>,
    live_close_shifts: bool,
    fallback_timezone: Tz,
    workers: usize,
}

impl Engine {
    /// An engine whose "now" is `now`.  Live-closing of open shifts is
    /// off and unknown timezones fall back to Europe/Zurich.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            live_close_shifts: false,
            fallback_timezone: DEFAULT_TIMEZONE,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Close a shift still open today at "now" instead of reporting it.
    pub fn with_live_close_shifts(mut self, enabled: bool) -> Self {
        self.live_close_shifts = enabled;
        self
    }

    pub fn with_fallback_timezone(mut self, tz: Tz) -> Self {
        self.fallback_timezone = tz;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Resolve an IANA zone name, falling back to the engine's default.
    pub fn resolve_timezone(&self, name: &str) -> Tz {
        match name.trim().parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                if !name.trim().is_empty() {
                    warn!(timezone = name, fallback = %self.fallback_timezone, "unknown timezone");
                }
                self.fallback_timezone
            }
        }
    }

    /// Timezone for `records`: the requested one, else the one recorded
    /// on the employee's latest payslip, else the fallback.
    pub fn timezone_for(&self, records: &EmployeeRecords, requested: Option<&str>) -> Tz {
        let name = requested
            .filter(|n| !n.trim().is_empty())
            .or_else(|| records.payslip_timezone())
            .unwrap_or("");
        self.resolve_timezone(name)
    }

    fn context(&self, tz: Tz) -> ReportContext {
        ReportContext {
            now: self.now,
            tz,
            live_close_shifts: self.live_close_shifts,
            clamp_to_now: true,
        }
    }

    pub fn build_monthly_report(
        &self,
        records: &EmployeeRecords,
        year: i32,
        month: u32,
        timezone: &str,
        cancel: &CancellationToken,
    ) -> Result<(BalanceReport, ValidationErrorList)> {
        let ctx = self.context(self.resolve_timezone(timezone));
        build_monthly(records, year, month, &ctx, cancel)
    }

    pub fn build_yearly_report(
        &self,
        records: &EmployeeRecords,
        year: i32,
        timezone: &str,
        cancel: &CancellationToken,
    ) -> Result<YearlyReport> {
        let ctx = self.context(self.resolve_timezone(timezone));
        build_yearly(records, year, &ctx, cancel)
    }

    /// Monthly reports for many employees.  `timezone` may be `None` to
    /// use each employee's payslip timezone.
    pub fn run_monthly_reports(
        &self,
        employees: &[EmployeeRecords],
        year: i32,
        month: u32,
        timezone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<MonthlyEmployeeReport>> {
        self.fan_out(employees, cancel, |records| {
            let ctx = self.context(self.timezone_for(records, timezone));
            let (balance, validation_errors) = build_monthly(records, year, month, &ctx, cancel)?;
            Ok(MonthlyEmployeeReport {
                balance,
                validation_errors,
            })
        })
    }

    pub fn run_yearly_reports(
        &self,
        employees: &[EmployeeRecords],
        year: i32,
        timezone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<YearlyReport>> {
        self.fan_out(employees, cancel, |records| {
            let ctx = self.context(self.timezone_for(records, timezone));
            build_yearly(records, year, &ctx, cancel)
        })
    }

    /// Run `job` for every employee on the worker pool.  Failures are
    /// isolated per employee; cancellation aborts the whole run.
    fn fan_out<T, F>(&self, employees: &[EmployeeRecords], cancel: &CancellationToken, job: F) -> Result<BatchOutcome<T>>
    where
        T: Send,
        F: Fn(&EmployeeRecords) -> Result<T> + Sync,
    {
        cancel.check()?;
        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.workers).build()?;
        let results: Vec<(Employee, Result<T>)> = pool.install(|| {
            employees
                .par_iter()
                .map(|records| (records.employee.clone(), job(records)))
                .collect()
        });

        let mut outcome = BatchOutcome {
            reports: Vec::with_capacity(results.len()),
            failures: Vec::new(),
        };
        for (employee, result) in results {
            match result {
                Ok(report) => outcome.reports.push(report),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(error) => {
                    warn!(employee = employee.id, %error, "employee report failed");
                    outcome.failures.push(EmployeeFailure { employee, error });
                }
            }
        }
        info!(
            completed = outcome.reports.len(),
            failed = outcome.failures.len(),
            "batch finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payslip::Balance;
    use chrono::{Duration, NaiveDate, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap()
    }

    fn records(id: i64, contract_start: &str, schedule: &str) -> EmployeeRecords {
        serde_json::from_value(json!({
            "employee": { "id": id, "name": format!("Employee {id}") },
            "contracts": [
                { "start": contract_start, "end": false, "working_schedule": [1, schedule] }
            ],
            "attendances": [
                { "id": 1, "datetime": "2021-02-03 09:00:00", "action": "sign_in", "reason": false },
                { "id": 2, "datetime": "2021-02-03 18:00:00", "action": "sign_out", "reason": false }
            ],
            "leaves": [],
            "payslips": [
                { "id": 10, "name": "Salary January", "date_from": "2021-01-01", "date_to": "2021-01-31",
                  "overtime": "Currently 6:30 (including holidays)" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn single_full_day_at_full_fte() {
        let engine = Engine::new(now());
        let mut r = records(1, "2021-02-03", "Full 100%");
        r.contracts[0].end = Some(NaiveDate::from_ymd_opt(2021, 2, 3).unwrap());
        let ctx = engine.context(chrono_tz::UTC);
        let period = crate::calendar::Period::new(
            NaiveDate::from_ymd_opt(2021, 2, 3).unwrap(),
            NaiveDate::from_ymd_opt(2021, 2, 4).unwrap(),
        );
        let (report, errors) = crate::report::build_report(&r, period, &ctx, &CancellationToken::new()).unwrap();
        assert!(errors.is_empty());
        let day = &report.daily_summaries[0];
        assert_eq!(day.overtime.regular_working_time, Duration::hours(9));
        assert_eq!(day.overtime.daily_max, Duration::hours(8));
        assert_eq!(day.total_overtime, Duration::hours(1));
    }

    #[test]
    fn monthly_report_through_facade() {
        let engine = Engine::new(now());
        let (balance, errors) = engine
            .build_monthly_report(&records(1, "2021-01-01", "Full 100%"), 2021, 2, "UTC", &CancellationToken::new())
            .unwrap();
        assert!(errors.is_empty());
        // 20 weekdays of 8h obligation, one day with 9h of work.
        let expected = Duration::hours(9 - 20 * 8);
        assert_eq!(balance.report.summary.total_overtime, expected);
        assert_eq!(balance.previous_balance, Balance::Known(Duration::minutes(390)));
        assert_eq!(
            balance.calculated_balance,
            Balance::Known(Duration::minutes(390) + expected)
        );
        assert_eq!(balance.report.timezone, "UTC");
    }

    #[test]
    fn unknown_timezone_falls_back() {
        let engine = Engine::new(now());
        assert_eq!(engine.resolve_timezone("Mars/Olympus"), chrono_tz::Europe::Zurich);
        assert_eq!(engine.resolve_timezone("Europe/Berlin"), chrono_tz::Europe::Berlin);
        let engine = engine.with_fallback_timezone(chrono_tz::UTC);
        assert_eq!(engine.resolve_timezone(""), chrono_tz::UTC);
    }

    #[test]
    fn payslip_timezone_used_when_none_requested() {
        let engine = Engine::new(now());
        let mut r = records(1, "2021-01-01", "Full 100%");
        r.payslips[0].timezone = Some("America/New_York".into());
        assert_eq!(engine.timezone_for(&r, None), chrono_tz::America::New_York);
        assert_eq!(engine.timezone_for(&r, Some("UTC")), chrono_tz::UTC);
    }

    #[test]
    fn yearly_report_is_clamped_to_now() {
        let engine = Engine::new(now());
        let report = engine
            .build_yearly_report(&records(1, "2021-02-01", "Full 100%"), 2021, "UTC", &CancellationToken::new())
            .unwrap();
        let months: Vec<u32> = report
            .monthly_reports
            .iter()
            .map(|m| chrono::Datelike::month(&m.report.from))
            .collect();
        assert_eq!(months, vec![2, 3, 4, 5, 6]);
        assert_eq!(report.monthly_reports.last().unwrap().report.to, NaiveDate::from_ymd_opt(2021, 6, 16).unwrap());
    }

    #[test]
    fn batch_isolates_failing_employees() {
        let engine = Engine::new(now()).with_workers(2);
        let employees = vec![
            records(1, "2021-01-01", "Full 100%"),
            records(2, "2021-02-10", "Full 100%"),
            records(3, "2021-01-01", "Flexible"),
            records(4, "2021-01-01", "Part 80%"),
        ];
        let outcome = engine
            .run_monthly_reports(&employees, 2021, 2, Some("UTC"), &CancellationToken::new())
            .unwrap();
        let ok: Vec<i64> = outcome.reports.iter().map(|r| r.balance.report.employee.id).collect();
        assert_eq!(ok, vec![1, 4]);
        let failed: Vec<(i64, EngineError)> = outcome
            .failures
            .iter()
            .map(|f| (f.employee.id, f.error.clone()))
            .collect();
        assert_eq!(
            failed,
            vec![
                (2, EngineError::NoContractCoversDate(NaiveDate::from_ymd_opt(2021, 2, 1).unwrap())),
                (3, EngineError::InvalidWorkingSchedule("Flexible".into())),
            ]
        );
        let error = outcome.error().unwrap();
        assert_eq!(error.failures.len(), 2);
        assert!(error.to_string().contains("Employee 3"));
    }

    #[test]
    fn cancelled_batch_aborts() {
        let engine = Engine::new(now());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .run_yearly_reports(&[records(1, "2021-01-01", "Full 100%")], 2021, None, &cancel)
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }
}
