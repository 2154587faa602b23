//! Capabilities the pipeline needs from the outside world.
//!
//! Each external service is reached through a trait so the stages never
//! depend on how it is reached:
//! - [`CompletionOracle`]: text in, text out (OpenAI chat completions)
//! - [`ScrapeOracle`]: URL in, readable text + extracted JSON out (Firecrawl)
//! - [`Library`]: the destination library's schema and write endpoints (Zotero)
//!
//! Deterministic fakes for all three live in [`crate::testing`].

use crate::error::Result;
use crate::types::{ItemPayload, WriteResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A generative text-completion service.
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    /// Send `prompt` as a single user message to `model` and return the reply text.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}

/// What to scrape and how to extract from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    /// Natural-language instruction for the structured extraction.
    pub extraction_prompt: String,
}

/// A scraped page: readable text plus the structured extraction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScrapeResponse {
    /// Readable-text (markdown) rendering of the page.
    #[serde(default)]
    pub markdown: Option<String>,
    /// Extracted academic metadata.
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    /// Page language reported by the scraper, if any.
    #[serde(default)]
    pub language: Option<String>,
}

/// A web scraping and extraction service.
#[async_trait]
pub trait ScrapeOracle: Send + Sync {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse>;
}

/// The destination reference library.
#[async_trait]
pub trait Library: Send + Sync {
    /// All item type identifiers the library knows.
    async fn item_types(&self) -> Result<Vec<String>>;

    /// Field names valid for one item type.
    async fn item_type_fields(&self, item_type: &str) -> Result<Vec<String>>;

    /// An empty item of the given type, as the library would create it.
    async fn item_template(&self, item_type: &str) -> Result<ItemPayload>;

    /// Check that a batch conforms to the library schema before writing it.
    async fn check_items(&self, items: &[ItemPayload]) -> Result<()>;

    /// Create a batch of items.
    async fn create_items(&self, items: &[ItemPayload]) -> Result<WriteResponse>;
}
