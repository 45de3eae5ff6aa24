//! Error types shared by the engine.
//!
//! Fatal problems (a day without a contract, a working schedule
//! without a percentage, malformed wire data, cancellation) are
//! reported through [`EngineError`].  Malformed attendance sequences
//! are not errors in this sense: they are collected in a
//! [`crate::validation::ValidationErrorList`] next to the report.

use crate::models::Employee;
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no contract covers {0}")]
    NoContractCoversDate(NaiveDate),

    #[error("working schedule {0:?} does not state a percentage")]
    InvalidWorkingSchedule(String),

    #[error("unparseable overtime {0:?}")]
    UnparseableOvertime(String),

    #[error("report cancelled")]
    Cancelled,

    #[error("input decode error: {0}")]
    InputDecode(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InputDecode(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for EngineError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        EngineError::WorkerPool(err.to_string())
    }
}

impl Serialize for EngineError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A single employee whose report could not be built.
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeFailure {
    pub employee: Employee,
    pub error: EngineError,
}

/// Combined error of a multi-employee run.  Each failure keeps the
/// identity of the employee it belongs to.
#[derive(Debug, Clone, Error)]
#[error("{} employee report(s) failed: {}", .failures.len(), summary(.failures))]
pub struct BatchError {
    pub failures: Vec<EmployeeFailure>,
}

fn summary(failures: &[EmployeeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.employee.name, f.employee.id, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
