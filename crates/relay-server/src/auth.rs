use axum::http::{HeaderMap, header::AUTHORIZATION};

/// Optional bearer auth for the `/v1` API.
#[derive(Clone, Default)]
pub struct ApiAuth {
    pub token: Option<String>,
}

impl ApiAuth {
    /// True when no token is configured or the request carries the right one.
    pub fn allows(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };

        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .is_some_and(|t| t == expected)
    }
}
