//! Timesheet Engine library crate.
//!
//! This crate computes monthly and yearly overtime balances from ERP
//! records: contracts, sign-in / sign-out attendances, leaves and
//! payslips.  External applications may depend on the
//! `timesheet_engine` crate and call [`engine::Engine`] directly or
//! embed the API via `api::build_router`.

pub mod error;
pub mod wire;
pub mod models;
pub mod format;
pub mod calendar;
pub mod shifts;
pub mod leaves;
pub mod validation;
pub mod overtime;
pub mod payslip;
pub mod report;
pub mod engine;
pub mod config;
pub mod api;

pub use engine::{CancellationToken, Engine};
pub use error::{EngineError, Result};
