use std::{net::SocketAddr, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::tracker::{
    TrackerSettings,
    policy::{DEFAULT_MIN_DELTA, ThrottlePolicy},
};

#[derive(Debug, Clone)]
pub struct Config {
    pub lms_api_base_url: String,
    pub lms_access_token: String,
    pub bind_addr: SocketAddr,
    pub poll_interval_secs: u64,
    pub progress_min_delta: u8,
    pub monotonic_progress: bool,
    pub request_timeout_secs: u64,
    pub view_idle_timeout_secs: u64,
}

const DEFAULT_LMS_API_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_VIEW_IDLE_TIMEOUT_SECS: u64 = 300;

/// Optional YAML layer below the environment. Keys mirror the env names in lower case.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    lms_api_base_url: Option<String>,
    lms_access_token: Option<String>,
    bind_addr: Option<String>,
    poll_interval_secs: Option<u64>,
    progress_min_delta: Option<u8>,
    monotonic_progress: Option<bool>,
    request_timeout_secs: Option<u64>,
    view_idle_timeout_secs: Option<u64>,
}

impl Config {
    /// Defaults, then the YAML file named by `LMS_CONFIG_FILE`, then the environment.
    pub fn load() -> anyhow::Result<Self> {
        let file = match std::env::var("LMS_CONFIG_FILE") {
            Ok(path) if !path.is_empty() => Some(
                std::fs::read_to_string(Path::new(&path))
                    .with_context(|| format!("Failed to read config file {}", path))?,
            ),
            _ => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(
        yaml: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file: FileConfig = match yaml {
            Some(text) if !text.trim().is_empty() => {
                serde_yml::from_str(text).context("Invalid YAML config")?
            }
            _ => FileConfig::default(),
        };

        let lms_api_base_url = env("LMS_API_BASE_URL")
            .or(file.lms_api_base_url)
            .unwrap_or(DEFAULT_LMS_API_BASE_URL.into());
        let lms_access_token = env("LMS_ACCESS_TOKEN")
            .or(file.lms_access_token)
            .unwrap_or_default();
        let bind_addr = env("BIND_ADDR")
            .or(file.bind_addr)
            .unwrap_or(DEFAULT_BIND_ADDR.into());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid BIND_ADDR: {}", bind_addr))?;

        let poll_interval_secs = parse_env(&env, "POLL_INTERVAL_SECS")?
            .or(file.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let progress_min_delta = parse_env(&env, "PROGRESS_MIN_DELTA")?
            .or(file.progress_min_delta)
            .unwrap_or(DEFAULT_MIN_DELTA);
        let monotonic_progress = parse_env(&env, "MONOTONIC_PROGRESS")?
            .or(file.monotonic_progress)
            .unwrap_or(false);
        let request_timeout_secs = parse_env(&env, "REQUEST_TIMEOUT_SECS")?
            .or(file.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let view_idle_timeout_secs = parse_env(&env, "VIEW_IDLE_TIMEOUT_SECS")?
            .or(file.view_idle_timeout_secs)
            .unwrap_or(DEFAULT_VIEW_IDLE_TIMEOUT_SECS);

        Ok(Config {
            lms_api_base_url,
            lms_access_token,
            bind_addr,
            poll_interval_secs,
            progress_min_delta,
            monotonic_progress,
            request_timeout_secs,
            view_idle_timeout_secs,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lms_access_token.is_empty() {
            return Err("LMS_ACCESS_TOKEN is missing".into());
        }
        if self.lms_api_base_url.trim().is_empty() {
            return Err("LMS_API_BASE_URL is missing".into());
        }
        if self.poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be at least 1".into());
        }
        if !(1..=100).contains(&self.progress_min_delta) {
            return Err("PROGRESS_MIN_DELTA must be between 1 and 100".into());
        }
        if self.request_timeout_secs == 0 {
            return Err("REQUEST_TIMEOUT_SECS must be at least 1".into());
        }
        if self.view_idle_timeout_secs < self.poll_interval_secs {
            return Err("VIEW_IDLE_TIMEOUT_SECS must not be shorter than POLL_INTERVAL_SECS".into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn view_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.view_idle_timeout_secs)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            policy: ThrottlePolicy {
                min_delta: self.progress_min_delta,
                monotonic: self.monotonic_progress,
            },
            ..TrackerSettings::default()
        }
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}: {} ({})", key, raw, e)),
        _ => Ok(None),
    }
}
