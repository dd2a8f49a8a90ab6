use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};

use crate::WorkerConfig;

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// 2xx.
    Success,
    /// 409: the downstream already has it. Counts as success.
    Duplicate,
    /// Anything else, including transport errors and timeouts.
    Retryable(String),
}

/// The ingestion API jobs are delivered to.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn deliver(&self, id: &str) -> Delivery;

    /// Whether the downstream answered at all.
    async fn probe(&self) -> bool;
}

#[derive(serde::Serialize)]
struct DownloadRequest<'a> {
    data: [DownloadItem<'a>; 1],
}

#[derive(serde::Serialize)]
struct DownloadItem<'a> {
    youtube_id: &'a str,
    status: &'static str,
}

#[derive(Clone)]
pub struct HttpDownstream {
    client: Client,
    endpoint: Url,
    health: Url,
    token: Option<String>,
}

impl HttpDownstream {
    pub fn new(
        endpoint: Url,
        health: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            health,
            token,
        })
    }

    pub fn from_config(cfg: &WorkerConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            cfg.downstream_url.clone(),
            cfg.health_url(),
            cfg.api_token.clone(),
            cfg.request_timeout,
        )
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn deliver(&self, id: &str) -> Delivery {
        let body = DownloadRequest {
            data: [DownloadItem {
                youtube_id: id,
                status: "pending",
            }],
        };

        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .json(&body);
        if let Some(token) = &self.token {
            req = req.header(header::AUTHORIZATION, format!("Token {token}"));
        }

        let started = Instant::now();
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "delivery request failed");
                return Delivery::Retryable(e.to_string());
            }
        };

        let status = resp.status();
        let ms = started.elapsed().as_millis() as u64;
        if status.is_success() {
            tracing::info!(job_id = %id, %status, ms, "delivery accepted");
            return Delivery::Success;
        }
        // Don't read the body of a 409, the request is already done.
        if status == StatusCode::CONFLICT {
            tracing::info!(job_id = %id, %status, ms, "downstream already has job");
            return Delivery::Duplicate;
        }

        let text = resp.text().await.unwrap_or_default();
        tracing::warn!(job_id = %id, %status, ms, body = %text, "delivery rejected");
        classify(status, &text)
    }

    async fn probe(&self) -> bool {
        match self.client.get(self.health.clone()).send().await {
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "downstream probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "downstream probe failed");
                false
            }
        }
    }
}

/// Map an HTTP answer onto a [`Delivery`].
pub fn classify(status: StatusCode, body: &str) -> Delivery {
    if status.is_success() {
        Delivery::Success
    } else if status == StatusCode::CONFLICT {
        Delivery::Duplicate
    } else if body.is_empty() {
        Delivery::Retryable(format!("HTTP {}", status.as_u16()))
    } else {
        Delivery::Retryable(format!("HTTP {}: {}", status.as_u16(), body))
    }
}
