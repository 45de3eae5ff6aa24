//! Entry point for the Timesheet Engine binary.
//!
//! Running this binary will start an HTTP server that exposes a
//! minimal API for building timesheet reports.  Settings come from
//! `TIMESHEET_*` environment variables (see [`config`]); log output is
//! controlled with `RUST_LOG`.

use timesheet_engine::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timesheet_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid configuration: {:#}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = timesheet_engine::api::serve(config).await {
        tracing::error!("error running server: {:#}", err);
        std::process::exit(1);
    }
}

// Public re-exports so the binary has access to library modules
pub use timesheet_engine::{api, config, engine, models, report};
