use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct WorkerConfig {
    pub downstream_url: Url,   // e.g. http://tube.local/api/download/
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub health_path: String,   // e.g. /api/ping/
    pub request_timeout: Duration,
    pub cycle_budget: Duration,
    pub max_attempts: Option<u32>,
    pub liveness_gate: bool,
    pub notify_webhook_url: Option<Url>,
    pub store_path: PathBuf,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let downstream_url = parse_url("DOWNSTREAM_URL", require("DOWNSTREAM_URL")?)?;
        let poll_interval = Duration::from_millis(parse_positive(
            "POLL_INTERVAL_MS",
            require("POLL_INTERVAL_MS")?,
        )?);
        let health_path = require("HEALTH_PATH")?;
        if health_path.contains("://") {
            return Err(ConfigError::Invalid {
                key: "HEALTH_PATH",
                value: health_path,
                reason: "expected a path on the downstream host".to_string(),
            });
        }
        let health_path = if health_path.starts_with('/') {
            health_path
        } else {
            format!("/{health_path}")
        };

        let request_timeout = Duration::from_millis(
            get("REQUEST_TIMEOUT_MS")
                .map(|v| parse_positive("REQUEST_TIMEOUT_MS", v))
                .transpose()?
                .unwrap_or(15_000),
        );
        let cycle_budget = Duration::from_millis(
            get("CYCLE_BUDGET_MS")
                .map(|v| parse_positive("CYCLE_BUDGET_MS", v))
                .transpose()?
                .unwrap_or(60_000),
        );
        let max_attempts = get("MAX_ATTEMPTS")
            .map(|v| parse_num::<u32>("MAX_ATTEMPTS", v))
            .transpose()?;
        let liveness_gate = get("LIVENESS_GATE")
            .map(|v| parse_bool("LIVENESS_GATE", v))
            .transpose()?
            .unwrap_or(true);
        let notify_webhook_url = get("NOTIFY_WEBHOOK_URL")
            .map(|v| parse_url("NOTIFY_WEBHOOK_URL", v))
            .transpose()?;
        let store_path = get("STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("relay-queue.jsonl"));

        Ok(Self {
            downstream_url,
            api_token: get("API_TOKEN"),
            poll_interval,
            health_path,
            request_timeout,
            cycle_budget,
            max_attempts,
            liveness_gate,
            notify_webhook_url,
            store_path,
        })
    }

    /// Liveness probe target: the downstream origin plus the health path.
    pub fn health_url(&self) -> Url {
        let mut url = self.downstream_url.clone();
        url.set_path(&self.health_path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

fn parse_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|e| ConfigError::Invalid {
        key,
        value,
        reason: e.to_string(),
    })
}

fn parse_num<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_positive(key: &'static str, value: String) -> Result<u64, ConfigError> {
    match parse_num::<u64>(key, value)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        }),
        n => Ok(n),
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}
