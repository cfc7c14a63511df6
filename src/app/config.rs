use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::charger_http::{ChargerEndpoints, DEFAULT_INFO_URL, DEFAULT_STATUS_URL};
use crate::app::AppError;
use crate::domain::reconcile::UnmatchedPolicy;

pub const DEFAULT_PAGE_SIZE: u32 = 9000;
/// One week.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub output_dir: PathBuf,
    pub poll_interval_minutes: u64,
    pub info_page_size: u32,
    pub status_page_size: u32,
    pub endpoints: ChargerEndpoints,
    pub http_timeout_secs: u64,
    pub unmatched_policy: UnmatchedPolicy,
    pub replay_script: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // A missing .env file is normal in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let replay_script = non_empty(&lookup, "EV_REPLAY_SCRIPT").map(PathBuf::from);
        let api_key = non_empty(&lookup, "EV_API_KEY");
        if api_key.is_none() && replay_script.is_none() {
            return Err(AppError::config("EV_API_KEY is required"));
        }

        let output_dir = non_empty(&lookup, "EV_OUTPUT_DIR")
            .map(PathBuf::from)
            .ok_or_else(|| AppError::config("EV_OUTPUT_DIR is required"))?;

        let unmatched_policy = match non_empty(&lookup, "EV_UNMATCHED_POLICY") {
            Some(raw) => raw.parse::<UnmatchedPolicy>().map_err(|_| {
                AppError::config("EV_UNMATCHED_POLICY must be one of: skip, fail")
            })?,
            None => UnmatchedPolicy::default(),
        };

        let poll_interval_minutes = at_most(
            "EV_POLL_INTERVAL_MINUTES",
            parse_positive(&lookup, "EV_POLL_INTERVAL_MINUTES", 10_u64)?,
            MAX_POLL_INTERVAL_MINUTES,
        )?;
        let http_timeout_secs = at_most(
            "EV_HTTP_TIMEOUT_SECS",
            parse_positive(&lookup, "EV_HTTP_TIMEOUT_SECS", 30_u64)?,
            MAX_HTTP_TIMEOUT_SECS,
        )?;

        Ok(Self {
            api_key,
            output_dir,
            poll_interval_minutes,
            info_page_size: parse_positive(&lookup, "EV_INFO_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            status_page_size: parse_positive(&lookup, "EV_STATUS_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            endpoints: ChargerEndpoints {
                info_url: non_empty(&lookup, "EV_INFO_URL")
                    .unwrap_or_else(|| DEFAULT_INFO_URL.to_string()),
                status_url: non_empty(&lookup, "EV_STATUS_URL")
                    .unwrap_or_else(|| DEFAULT_STATUS_URL.to_string()),
            },
            http_timeout_secs,
            unmatched_policy,
            replay_script,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.saturating_mul(60))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy + PartialOrd + Default,
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number")))?,
        None => default,
    };

    if value <= T::default() {
        return Err(AppError::config(format!("{key} must be greater than zero")));
    }

    Ok(value)
}

fn at_most(key: &str, value: u64, max: u64) -> Result<u64, AppError> {
    if value > max {
        return Err(AppError::config(format!("{key} must be at most {max}")));
    }
    Ok(value)
}
