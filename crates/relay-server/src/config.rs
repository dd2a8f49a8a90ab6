use std::net::SocketAddr;

use relay_worker::{ConfigError, WorkerConfig};

#[derive(Clone)]
pub struct Config {
    pub bind: SocketAddr,
    /// When set, `/v1/*` requires `Authorization: Bearer <token>`.
    pub api_token: Option<String>,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let worker = WorkerConfig::from_lookup(&lookup)?;

        let bind = lookup("BIND_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind: SocketAddr = bind.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
                value: bind.clone(),
            }
        })?;

        let api_token = lookup("RELAY_API_TOKEN").filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind,
            api_token,
            worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(key: &str) -> Option<String> {
        match key {
            "DOWNSTREAM_URL" => Some("http://tube.local/api/download/".into()),
            "POLL_INTERVAL_MS" => Some("1000".into()),
            "HEALTH_PATH" => Some("/api/ping/".into()),
            _ => None,
        }
    }

    #[test]
    fn defaults_bind_and_auth() {
        let cfg = Config::from_lookup(base).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.api_token, None);
    }

    #[test]
    fn rejects_bad_bind_addr() {
        let err = Config::from_lookup(|k| match k {
            "BIND_ADDR" => Some("nowhere".into()),
            other => base(other),
        })
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "BIND_ADDR", .. }));
    }

    #[test]
    fn worker_errors_surface() {
        let err = Config::from_lookup(|k| match k {
            "DOWNSTREAM_URL" => None,
            other => base(other),
        })
        .err()
        .unwrap();
        assert_eq!(err, ConfigError::Missing("DOWNSTREAM_URL"));
    }
}
