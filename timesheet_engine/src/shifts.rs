//! Shift assembly.
//!
//! Attendance events are folded into shifts by a two state machine:
//!
//! | State   | Event       | Action                                   | Next    |
//! |---------|-------------|------------------------------------------|---------|
//! | Idle    | sign_in     | open shift                               | InShift |
//! | Idle    | sign_out    | orphan (or duplicate) sign-out error     | Idle    |
//! | InShift | sign_out    | close and emit shift                     | Idle    |
//! | InShift | sign_in     | missing sign-out error, reopen           | InShift |
//! | InShift | end of day  | close at now when live-closing today,    | Idle    |
//! |         |             | otherwise unclosed shift error           |         |
//!
//! Events are restricted to the report range widened by one day on
//! each side, then sorted by time and record id before reduction.

use crate::calendar::{day_mut, DailySummary, Period};
use crate::format;
use crate::models::{Action, ActionReason, Attendance};
use crate::validation::{ValidationError, ValidationErrorList, ValidationKind};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

/// A closed interval between a matched sign-in and sign-out, in the
/// report's local timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shift {
    #[serde(serialize_with = "format::serialize_local")]
    pub start: DateTime<Tz>,
    #[serde(serialize_with = "format::serialize_local")]
    pub end: DateTime<Tz>,
    pub reason: ActionReason,
    /// The reason as named in the ERP, empty for regular work.
    pub reason_name: String,
}

impl Shift {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The local day the shift belongs to.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

struct OpenShift {
    start: DateTime<Tz>,
    reason: ActionReason,
    reason_name: String,
}

impl OpenShift {
    fn close(self, end: DateTime<Tz>) -> Shift {
        Shift {
            start: self.start,
            end,
            reason: self.reason,
            reason_name: self.reason_name,
        }
    }
}

enum State {
    Idle,
    InShift(OpenShift),
}

/// Folds attendance events into shifts for one report.
pub struct ShiftReducer {
    tz: Tz,
    /// When set, a shift still open on the local day of this instant
    /// is closed at it.
    live_close_at: Option<DateTime<Utc>>,
}

impl ShiftReducer {
    pub fn new(tz: Tz, live_close_at: Option<DateTime<Utc>>) -> Self {
        Self { tz, live_close_at }
    }

    pub fn reduce(&self, events: &[Attendance], period: &Period) -> (Vec<Shift>, ValidationErrorList) {
        let (window_start, window_end) = period.widened_window(self.tz);
        let mut sorted: Vec<&Attendance> = events
            .iter()
            .filter(|e| e.datetime >= window_start && e.datetime <= window_end)
            .collect();
        sorted.sort_by_key(|e| (e.datetime, e.id));

        let mut shifts = Vec::new();
        let mut errors = ValidationErrorList::new();
        let mut state = State::Idle;
        let mut last_action: Option<Action> = None;

        for event in sorted {
            let at = event.datetime.with_timezone(&self.tz);

            if let State::InShift(open) = &state {
                if at.date_naive() != open.start.date_naive() {
                    errors.push(unclosed(open));
                    state = State::Idle;
                }
            }

            state = match (state, event.action) {
                (State::Idle, Action::SignIn) => State::InShift(open_shift(event, at)),
                (State::Idle, Action::SignOut) => {
                    let kind = if last_action == Some(Action::SignOut) {
                        ValidationKind::DuplicateSignOut
                    } else {
                        ValidationKind::OrphanSignOut
                    };
                    errors.push(ValidationError::new(
                        at.date_naive(),
                        kind,
                        format!("sign-out #{} at {}", event.id, at.format("%H:%M:%S")),
                    ));
                    State::Idle
                }
                (State::InShift(open), Action::SignOut) => {
                    shifts.push(open.close(at));
                    State::Idle
                }
                (State::InShift(open), Action::SignIn) => {
                    errors.push(ValidationError::new(
                        open.start.date_naive(),
                        ValidationKind::MissingSignOut,
                        format!(
                            "sign-in at {} followed by sign-in #{} at {}",
                            open.start.format("%H:%M:%S"),
                            event.id,
                            at.format("%H:%M:%S")
                        ),
                    ));
                    State::InShift(open_shift(event, at))
                }
            };
            last_action = Some(event.action);
        }

        if let State::InShift(open) = state {
            match self.live_close(&open) {
                Some(now) => {
                    debug!(start = %open.start, "closing open shift at now");
                    shifts.push(open.close(now));
                }
                None => errors.push(unclosed(&open)),
            }
        }

        (shifts, errors)
    }

    fn live_close(&self, open: &OpenShift) -> Option<DateTime<Tz>> {
        let now = self.live_close_at?.with_timezone(&self.tz);
        (now.date_naive() == open.start.date_naive() && now >= open.start).then_some(now)
    }
}

fn open_shift(event: &Attendance, at: DateTime<Tz>) -> OpenShift {
    let reason_name = event.reason.as_ref().map(|r| r.name.clone()).unwrap_or_default();
    OpenShift {
        start: at,
        reason: ActionReason::from_name(&reason_name),
        reason_name,
    }
}

fn unclosed(open: &OpenShift) -> ValidationError {
    ValidationError::new(
        open.start.date_naive(),
        ValidationKind::UnclosedShift,
        format!("sign-in at {} never closed", open.start.format("%H:%M:%S")),
    )
}

/// Attach shifts to the day they start on.  Shifts starting outside
/// the prepared days are dropped.
pub fn attach_shifts(days: &mut [DailySummary], shifts: Vec<Shift>) {
    let mut dropped = 0usize;
    for shift in shifts {
        match day_mut(days, shift.date()) {
            Some(day) => day.shifts.push(shift),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, "shifts outside the report range");
    }
}
