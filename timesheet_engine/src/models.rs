//! Data models for the Timesheet Engine.
//!
//! The `models` module defines the ERP records consumed by the
//! engine: employees, contracts, attendance events, leaves and
//! payslips.  These types derive `Serialize` and `Deserialize` so they
//! can be decoded straight from the ERP's JSON (see [`crate::wire`]
//! for its quirks) and handed back out unchanged.  They form the input
//! side of the engine; the derived report values live in
//! [`crate::calendar`], [`crate::overtime`] and [`crate::report`].

use crate::error::{EngineError, Result};
use crate::wire;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PERCENTAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\s*%").expect("static regex"));

/// Represents an employee whose timesheet is being reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// The ERP record id of the employee.
    pub id: i64,
    /// The employee's display name.
    pub name: String,
}

/// A reference to another ERP record, encoded on the wire as an
/// `[id, name]` pair.  Unset references never reach this type; they
/// decode to `None` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// The ERP record id of the referenced record.
    pub id: i64,
    /// The referenced record's display name.
    pub name: String,
}

/// Whether an attendance event starts or ends a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SignIn,
    SignOut,
}

/// Classification of the reason attached to a sign-in.
///
/// The reason decides which time bucket a shift counts towards.  Only
/// a handful of names are meaningful to the calculation; every other
/// named reason is [`ActionReason::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReason {
    /// No reason given: ordinary working time.
    Regular,
    /// "Outside office hours", credited at 1.5×.
    OutsideOfficeHours,
    /// "Sick / Medical Consultation".
    SickOrMedical,
    /// "Authorities".
    Authorities,
    /// "Requested Public Service".
    PublicService,
    /// Any other named reason.
    Other,
}

impl ActionReason {
    pub fn from_name(name: &str) -> Self {
        match name {
            "" => ActionReason::Regular,
            "Outside office hours" => ActionReason::OutsideOfficeHours,
            "Sick / Medical Consultation" => ActionReason::SickOrMedical,
            "Authorities" => ActionReason::Authorities,
            "Requested Public Service" => ActionReason::PublicService,
            _ => ActionReason::Other,
        }
    }

    pub fn from_relation(relation: Option<&Relation>) -> Self {
        relation.map_or(ActionReason::Regular, |r| Self::from_name(&r.name))
    }

    /// Excused reasons are credited against the daily maximum but never
    /// produce overtime on their own.
    pub fn is_excused(self) -> bool {
        matches!(
            self,
            ActionReason::SickOrMedical | ActionReason::Authorities | ActionReason::PublicService
        )
    }
}

/// Classification of a leave type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveKind {
    PublicHoliday,
    /// Unpaid leave keeps the working obligation in place.
    Unpaid,
    MilitaryService,
    SpecialOccasions,
    /// Any type whose name starts with "Legal Leaves" (vacation).
    LegalLeaves,
    Other,
}

impl LeaveKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Public Holiday" => LeaveKind::PublicHoliday,
            "Unpaid" => LeaveKind::Unpaid,
            "Military Service" => LeaveKind::MilitaryService,
            "Special Occasions" => LeaveKind::SpecialOccasions,
            n if n.starts_with("Legal Leaves") => LeaveKind::LegalLeaves,
            _ => LeaveKind::Other,
        }
    }

    /// Whether an absence of this kind displaces one day of the
    /// working obligation.
    pub fn displaces_obligation(self) -> bool {
        self != LeaveKind::Unpaid
    }
}

/// Extract the FTE ratio from a working schedule name such as
/// `"Part time 80 %"`.  The first `\d+\s*%` token wins.
pub fn parse_fte_ratio(schedule_name: &str) -> Result<f64> {
    let token = PERCENTAGE
        .find(schedule_name)
        .ok_or_else(|| EngineError::InvalidWorkingSchedule(schedule_name.to_string()))?;
    let digits: String = token.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
    let percent: u32 = digits
        .parse()
        .map_err(|_| EngineError::InvalidWorkingSchedule(schedule_name.to_string()))?;
    Ok(f64::from(percent) / 100.0)
}

/// An employment contract.  Contracts of one employee cover disjoint
/// date ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// First day covered by the contract.
    #[serde(alias = "date_start", with = "wire::date")]
    pub start: NaiveDate,
    /// Last day covered by the contract; `None` for open-ended
    /// contracts.
    #[serde(default, alias = "date_end", with = "wire::optional_date")]
    pub end: Option<NaiveDate>,
    /// The working schedule whose name carries the FTE percentage.
    #[serde(default, alias = "resource_calendar_id", with = "wire::relation")]
    pub working_schedule: Option<Relation>,
}

impl Contract {
    /// Both boundary days are inclusive.
    pub fn covers(&self, day: NaiveDate) -> bool {
        day >= self.start && self.end.map_or(true, |end| day <= end)
    }

    pub fn fte_ratio(&self) -> Result<f64> {
        let name = self.working_schedule.as_ref().map_or("", |s| s.name.as_str());
        parse_fte_ratio(name)
    }
}

/// FTE ratio of the first contract covering `day`.
pub fn fte_for(contracts: &[Contract], day: NaiveDate) -> Result<f64> {
    contracts
        .iter()
        .find(|c| c.covers(day))
        .ok_or(EngineError::NoContractCoversDate(day))?
        .fte_ratio()
}

/// A sign-in or sign-out recorded by the ERP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    /// The ERP record id; breaks ties between events at the same instant.
    pub id: i64,
    /// When the event happened, in UTC.
    #[serde(alias = "name", with = "wire::timestamp")]
    pub datetime: DateTime<Utc>,
    /// Whether the event opens or closes a shift.
    pub action: Action,
    /// Optional reason attached to the event; only sign-ins' reasons
    /// are used.
    #[serde(default, alias = "action_desc", with = "wire::relation")]
    pub reason: Option<Relation>,
}

/// Approval state of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveState {
    Draft,
    Confirm,
    Validate,
    /// Refused, cancelled and any other ERP state.
    #[serde(other)]
    Other,
}

/// A leave request.  Only validated leaves take part in the calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leave {
    /// The ERP record id of the leave request.
    pub id: i64,
    /// Start of the leave, in UTC.
    #[serde(with = "wire::timestamp")]
    pub date_from: DateTime<Utc>,
    /// End of the leave, in UTC.
    #[serde(with = "wire::timestamp")]
    pub date_to: DateTime<Utc>,
    /// The leave type, e.g. `"Legal Leaves 2021"` or `"Unpaid"`.
    #[serde(default, rename = "type", alias = "holiday_status_id", with = "wire::relation")]
    pub leave_type: Option<Relation>,
    /// Approval state of the request.
    pub state: LeaveState,
}

impl Leave {
    pub fn type_name(&self) -> &str {
        self.leave_type.as_ref().map_or("", |t| t.name.as_str())
    }
}

/// A payslip as issued by the ERP.
///
/// The `overtime` field is a free-form, user-authored string such as
/// `"Currently 6:30 (including holidays)"`; see
/// [`crate::payslip::parse_overtime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payslip {
    /// The ERP record id of the payslip.
    pub id: i64,
    /// Payslip title; "Salary" and "Pikett" in it drive selection.
    pub name: String,
    /// First day the payslip covers.
    #[serde(with = "wire::date")]
    pub date_from: NaiveDate,
    /// Last day the payslip covers, inclusive.
    #[serde(with = "wire::date")]
    pub date_to: NaiveDate,
    /// Overtime balance as typed on the payslip.
    #[serde(default, with = "wire::optional_string")]
    pub overtime: Option<String>,
    /// IANA name of the employee's timezone, if the ERP recorded one.
    #[serde(default, with = "wire::optional_string")]
    pub timezone: Option<String>,
}

impl Payslip {
    /// Whether the payslip's date range shares at least one day with
    /// `[first, last]`.
    pub fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        self.date_from <= last && self.date_to >= first
    }

    /// The overtime string, or `None` when it is absent or blank.
    pub fn overtime_text(&self) -> Option<&str> {
        self.overtime.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Everything the engine needs to report on one employee.
///
/// The record lists are expected to be already fetched from the ERP;
/// attendances should cover the requested range widened by a day on
/// each side so that events near midnight land on the right local day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRecords {
    pub employee: Employee,
    #[serde(default)]
    pub contracts: Vec<Contract>,
    #[serde(default)]
    pub attendances: Vec<Attendance>,
    #[serde(default)]
    pub leaves: Vec<Leave>,
    #[serde(default)]
    pub payslips: Vec<Payslip>,
}

impl EmployeeRecords {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Start of the earliest contract, if any.
    pub fn first_contract_start(&self) -> Option<NaiveDate> {
        self.contracts.iter().map(|c| c.start).min()
    }

    /// Timezone recorded on the most recent payslip that has one.
    pub fn payslip_timezone(&self) -> Option<&str> {
        self.payslips
            .iter()
            .filter(|p| p.timezone.as_deref().is_some_and(|tz| !tz.trim().is_empty()))
            .max_by_key(|p| p.date_to)
            .and_then(|p| p.timezone.as_deref())
            .map(str::trim)
    }
}
