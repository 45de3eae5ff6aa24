//! Runtime configuration.
//!
//! Settings are read from `TIMESHEET_*` environment variables, after an
//! optional `.env` file has been loaded:
//!
//! | Variable                      | Default          |
//! |-------------------------------|------------------|
//! | `TIMESHEET_BIND_ADDR`         | `127.0.0.1:3000` |
//! | `TIMESHEET_DEFAULT_TIMEZONE`  | `Europe/Zurich`  |
//! | `TIMESHEET_WORKERS`           | `4`              |
//! | `TIMESHEET_LIVE_CLOSE_SHIFTS` | `false`          |

use crate::engine::{Engine, DEFAULT_WORKERS};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub live_close_shifts: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_timezone() -> String {
    "Europe/Zurich".to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            default_timezone: default_timezone(),
            workers: default_workers(),
            live_close_shifts: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let config: Config = envy::prefixed("TIMESHEET_")
            .from_env()
            .context("reading TIMESHEET_* environment")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("TIMESHEET_WORKERS must be at least 1");
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        match self.default_timezone.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(_) => bail!("unknown timezone {:?}", self.default_timezone),
        }
    }

    /// An engine configured from these settings with `now` as its clock.
    pub fn engine(&self, now: DateTime<Utc>) -> Result<Engine> {
        Ok(Engine::new(now)
            .with_fallback_timezone(self.timezone()?)
            .with_workers(self.workers)
            .with_live_close_shifts(self.live_close_shifts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Zurich);
    }

    #[test]
    fn rejects_bad_values() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            default_timezone: "Nowhere/Town".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_prefixed_variables() {
        let vars = vec![
            ("TIMESHEET_WORKERS".to_string(), "8".to_string()),
            ("TIMESHEET_LIVE_CLOSE_SHIFTS".to_string(), "true".to_string()),
        ];
        let config: Config = envy::prefixed("TIMESHEET_").from_iter(vars).unwrap();
        assert_eq!(config.workers, 8);
        assert!(config.live_close_shifts);
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
    }
}
