//! Shared HTTP transport for the OpenAI, Firecrawl and Zotero clients.

use crate::error::{ImportError, Result};
use crate::rate_limit::RateLimiter;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

const USER_AGENT: &str = concat!("zotero-import/", env!("CARGO_PKG_VERSION"));

/// How a service expects its API key.
#[derive(Clone)]
pub(crate) enum Auth {
    /// `Authorization: Bearer <key>` (OpenAI, Firecrawl).
    Bearer(String),
    /// A dedicated header (`Zotero-API-Key: <key>`).
    Header(&'static str, String),
}

/// Authenticated, rate-limited request sender for one service.
#[derive(Clone)]
pub(crate) struct HttpTransport {
    http: Client,
    service: &'static str,
    base_url: String,
    auth: Auth,
    headers: Vec<(&'static str, String)>,
    rate_limiter: RateLimiter,
}

impl HttpTransport {
    /// Build a transport for `service` rooted at `base_url`.
    pub(crate) fn new(
        service: &'static str,
        base_url: impl Into<String>,
        auth: Auth,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            service,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            headers: Vec::new(),
            rate_limiter: RateLimiter::new(5.0),
        })
    }

    /// Send an extra header with every request.
    pub(crate) fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Override the rate limit (requests per second).
    pub(crate) fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.rate_limiter = RateLimiter::new(per_second);
        self
    }

    pub(crate) fn service(&self) -> &'static str {
        self.service
    }

    /// Make an authenticated GET request.
    pub(crate) async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(service = self.service, %url, "GET");
        self.send(self.http.get(&url).query(params)).await
    }

    /// Make an authenticated POST request with a JSON body.
    pub(crate) async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(service = self.service, %url, "POST");
        self.send(self.http.post(&url).json(body)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        self.rate_limiter.acquire().await;

        let mut request = match &self.auth {
            Auth::Bearer(key) => request.bearer_auth(key),
            Auth::Header(name, key) => request.header(*name, key),
        };
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        self.rate_limiter
            .update_from_headers(response.headers())
            .await;
        handle_response(self.service, response).await
    }
}

/// Handle the HTTP response, mapping status codes to errors.
async fn handle_response(service: &'static str, response: reqwest::Response) -> Result<String> {
    let status = response.status().as_u16();

    match status {
        200..=299 => Ok(response.text().await?),
        401 | 403 => Err(ImportError::AuthRequired(service)),
        404 => Err(ImportError::NotFound(response.url().to_string())),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(ImportError::RateLimited { retry_after })
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(ImportError::Api {
                status,
                message: body,
            })
        }
    }
}
