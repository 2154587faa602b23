//! Firecrawl scrape client, used as the scraping oracle.

use crate::client::{Auth, HttpTransport};
use crate::error::{ImportError, Result};
use crate::oracle::{ScrapeOracle, ScrapeRequest, ScrapeResponse};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Async client for Firecrawl's `/v1/scrape` endpoint.
#[derive(Clone)]
pub struct FirecrawlClient {
    transport: HttpTransport,
}

#[derive(Debug, Deserialize)]
struct ScrapeEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    json: Option<serde_json::Value>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PageMetadata {
    #[serde(default)]
    language: Option<String>,
}

impl FirecrawlClient {
    /// Create a client for `api.firecrawl.dev` with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, "https://api.firecrawl.dev", Duration::from_secs(300))
    }

    /// Create a client against a different base URL (self-hosted, tests).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let transport =
            HttpTransport::new("Firecrawl", base_url, Auth::Bearer(api_key.into()), timeout)?;
        Ok(Self { transport })
    }

    /// Override the rate limit (requests per second).
    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.transport = self.transport.with_rate_limit(per_second);
        self
    }
}

#[async_trait]
impl ScrapeOracle for FirecrawlClient {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse> {
        let body = serde_json::json!({
            "url": request.url,
            "formats": ["markdown", "json"],
            "jsonOptions": { "prompt": request.extraction_prompt },
        });

        let response_body = self.transport.post_json("/v1/scrape", &body).await?;
        let envelope: ScrapeEnvelope = serde_json::from_str(&response_body)
            .map_err(|e| ImportError::Parse(format!("Invalid scrape response: {}", e)))?;

        if !envelope.success {
            return Err(ImportError::Api {
                status: 200,
                message: envelope
                    .error
                    .unwrap_or_else(|| "scrape reported failure".to_string()),
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| ImportError::Parse("Scrape response has no data".to_string()))?;
        let language = data
            .language
            .or_else(|| data.metadata.and_then(|m| m.language));

        Ok(ScrapeResponse {
            markdown: data.markdown,
            json: data.json,
            language,
        })
    }
}
