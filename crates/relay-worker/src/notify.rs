use std::time::Duration;

use async_trait::async_trait;
use relay_core::{Notice, Notifier};
use reqwest::{Client, Url};

/// Writes notices to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, origin: &str, notice: Notice) {
        tracing::info!(origin, notice = ?notice, message = %notice, "notify");
    }
}

#[derive(serde::Serialize)]
struct WebhookBody {
    origin: String,
    message: String,
    notice: Notice,
}

/// POSTs `{origin, message, notice}` to a chat bridge. The request runs on
/// its own task, so `notify` returns without waiting for the bridge.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn post(self, body: WebhookBody) {
        let origin = body.origin.as_str();
        match self.client.post(self.url.clone()).json(&body).send().await {
            Ok(r) if r.status().is_success() => {
                tracing::debug!(origin, "notice delivered");
            }
            Ok(r) => {
                let status = r.status();
                let text = r.text().await.unwrap_or_default();
                tracing::warn!(origin, %status, body = %text, "notify webhook rejected notice");
            }
            Err(e) => {
                tracing::warn!(origin, error = %e, "notify webhook request error");
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, origin: &str, notice: Notice) {
        let body = WebhookBody {
            origin: origin.to_string(),
            message: notice.to_string(),
            notice,
        };
        tokio::spawn(self.clone().post(body));
    }
}
