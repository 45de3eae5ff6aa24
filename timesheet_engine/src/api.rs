//! HTTP API for the Timesheet Engine.
//!
//! This module exposes a minimal REST API around the report engine
//! using the [`axum`](https://crates.io/crates/axum) framework.  Clients
//! post already-fetched ERP records for one or more employees and
//! receive the computed reports in JSON.  Fetching from and writing
//! back to the ERP are left to the caller.

use crate::config::Config;
use crate::engine::{BatchOutcome, CancellationToken, Engine, MonthlyEmployeeReport};
use crate::error::EngineError;
use crate::models::EmployeeRecords;
use crate::report::YearlyReport;
use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Application state shared across requests.  The engine is a
/// template; each request stamps it with the current time.
pub struct AppState {
    pub engine: Engine,
}

#[derive(Debug, Deserialize)]
pub struct MonthlyRequest {
    pub year: i32,
    pub month: u32,
    /// IANA zone; when absent each employee's payslip timezone is used.
    #[serde(default)]
    pub timezone: Option<String>,
    pub employees: Vec<EmployeeRecords>,
}

#[derive(Debug, Deserialize)]
pub struct YearlyRequest {
    pub year: i32,
    #[serde(default)]
    pub timezone: Option<String>,
    pub employees: Vec<EmployeeRecords>,
}

/// Response body of a monthly run, including the overtime text each
/// payslip would receive.
#[derive(Debug, Serialize)]
struct MonthlyResponse {
    #[serde(flatten)]
    outcome: BatchOutcome<MonthlyEmployeeReport>,
    payslip_overtime: Vec<Option<String>>,
}

/// Cancels the run when the request future is dropped, which is what
/// happens when the client disconnects.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Build the API router from a validated configuration.
pub fn build_router(config: &Config) -> Result<Router> {
    let state = Arc::new(AppState {
        engine: config.engine(Utc::now())?,
    });
    let router = Router::new()
        .route("/api/reports/monthly", post(monthly_handler))
        .route("/api/reports/yearly", post(yearly_handler))
        .with_state(state);
    Ok(router)
}

/// Run `job` on the blocking pool under a cancellation token tied to
/// the lifetime of the request.
async fn run_cancellable<T, F>(job: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T, EngineError> + Send + 'static,
{
    let token = CancellationToken::new();
    let _guard = CancelOnDrop(token.clone());
    tokio::task::spawn_blocking(move || job(token))
        .await
        .map_err(|e| EngineError::WorkerPool(e.to_string()))?
}

fn error_response(err: EngineError) -> axum::response::Response {
    let status = match err {
        EngineError::InputDecode(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(error = %err, "report request failed");
    let body = Json(serde_json::json!({ "error": err.to_string() }));
    (status, body).into_response()
}

/// Handler for POST /api/reports/monthly
async fn monthly_handler(State(app_state): State<Arc<AppState>>, Json(input): Json<MonthlyRequest>) -> impl IntoResponse {
    let engine = app_state.engine.clone().with_now(Utc::now());
    let result = run_cancellable(move |cancel| {
        engine.run_monthly_reports(
            &input.employees,
            input.year,
            input.month,
            input.timezone.as_deref(),
            &cancel,
        )
    })
    .await;
    match result {
        Ok(outcome) => {
            info!(reports = outcome.reports.len(), failures = outcome.failures.len(), "monthly reports built");
            let payslip_overtime = outcome
                .reports
                .iter()
                .map(|r| r.balance.payslip_overtime())
                .collect();
            (
                StatusCode::OK,
                Json(MonthlyResponse {
                    outcome,
                    payslip_overtime,
                }),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Handler for POST /api/reports/yearly
async fn yearly_handler(State(app_state): State<Arc<AppState>>, Json(input): Json<YearlyRequest>) -> impl IntoResponse {
    let engine = app_state.engine.clone().with_now(Utc::now());
    let result: Result<BatchOutcome<YearlyReport>, EngineError> = run_cancellable(move |cancel| {
        engine.run_yearly_reports(&input.employees, input.year, input.timezone.as_deref(), &cancel)
    })
    .await;
    match result {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Launch the API server.  This function builds the router from the
/// given configuration and binds to its address.  It blocks until the
/// server terminates (e.g. when interrupted).
pub async fn serve(config: Config) -> Result<()> {
    let router = build_router(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
