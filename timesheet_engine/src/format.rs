//! Formatting helpers shared by reports and their consumers.
//!
//! Durations are shown as `[-]H:MM:SS`: hours are not padded, minutes
//! and seconds are padded to two digits and the value is rounded to the
//! nearest second.  The same text is what a payslip's overtime field
//! receives, and [`crate::payslip::parse_overtime`] reads it back.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serializer;

pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.num_milliseconds();
    let secs = (millis.unsigned_abs() + 500) / 1000;
    let sign = if millis < 0 && secs > 0 { "-" } else { "" };
    format!("{}{}:{:02}:{:02}", sign, secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Fixed-point rendering with `precision` decimals.
pub fn format_float(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

pub fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(duration))
}

pub fn serialize_local<S: Serializer>(at: &DateTime<Tz>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
}
