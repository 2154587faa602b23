//! Enrichment: pick one source URL for the pasted text and scrape its metadata.
//!
//! One URL is derived per input text, not per citation; the merger fans the
//! resulting record out over every candidate.

use crate::error::{ImportError, Result};
use crate::oracle::{CompletionOracle, ScrapeOracle, ScrapeRequest, ScrapeResponse};
use crate::types::{Creator, EnrichmentRecord};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Instruction sent with every scrape for the structured extraction.
pub const EXTRACTION_PROMPT: &str = "Extract the academic metadata from this page, including: \
     title, authors, date, DOI, abstract, keywords and publication information.";

/// Derives the enrichment URL and fetches its metadata.
#[derive(Clone)]
pub struct EnrichmentLocator {
    oracle: Arc<dyn CompletionOracle>,
    scraper: Arc<dyn ScrapeOracle>,
    model: String,
}

impl EnrichmentLocator {
    pub fn new(
        oracle: Arc<dyn CompletionOracle>,
        scraper: Arc<dyn ScrapeOracle>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            scraper,
            model: model.into(),
        }
    }

    /// Derive a URL from `text`, then scrape it.
    pub async fn locate_and_fetch(&self, text: &str) -> Result<EnrichmentRecord> {
        let url = self.derive_url(text).await?;
        self.fetch_metadata(&url).await
    }

    /// Ask the oracle for the single most relevant academic URL.
    ///
    /// The trimmed reply is returned as is; a malformed URL surfaces when
    /// it is fetched.
    pub async fn derive_url(&self, text: &str) -> Result<String> {
        let reply = self
            .oracle
            .complete(&self.model, &build_url_prompt(text))
            .await
            .map_err(|e| ImportError::EnrichmentService {
                url: None,
                source: Box::new(e),
            })?;
        let url = reply.trim().to_string();

        match url::Url::parse(&url) {
            Ok(parsed) => {
                tracing::info!(%url, host = parsed.host_str().unwrap_or(""), "derived enrichment URL")
            }
            Err(e) => tracing::warn!(%url, error = %e, "derived enrichment URL does not parse"),
        }
        Ok(url)
    }

    /// Scrape `url` and normalize the result.
    pub async fn fetch_metadata(&self, url: &str) -> Result<EnrichmentRecord> {
        let request = ScrapeRequest {
            url: url.to_string(),
            extraction_prompt: EXTRACTION_PROMPT.to_string(),
        };
        let page = self
            .scraper
            .scrape(&request)
            .await
            .map_err(|e| ImportError::EnrichmentService {
                url: Some(url.to_string()),
                source: Box::new(e),
            })?;

        let record = normalize(url, page);
        tracing::info!(
            %url,
            creators = record.creators.len(),
            tags = record.tags.len(),
            has_notes = !record.notes.is_empty(),
            "fetched enrichment metadata"
        );
        Ok(record)
    }
}

/// The URL-derivation prompt.
pub fn build_url_prompt(text: &str) -> String {
    format!(
        "From the references below, identify and return the URL of the academic document.\n\
         If there are multiple references, return only the most relevant URL.\n\
         Prefer URLs from academic repositories (e.g. scielo.org, researchgate.net, academia.edu).\n\
         If no specific URL can be found, return the URL of the journal's or institution's main page.\n\n\
         References:\n{}\n\n\
         Return ONLY the URL, with no explanations or additional formatting.\n",
        text.trim()
    )
}

/// Normalize a scraped page into an [`EnrichmentRecord`].
pub fn normalize(url: &str, page: ScrapeResponse) -> EnrichmentRecord {
    let empty = Map::new();
    let json = page.json.as_ref().and_then(Value::as_object).unwrap_or(&empty);

    let mut record = EnrichmentRecord {
        url: url.to_string(),
        title: text_field(json, "title").unwrap_or_default(),
        abstract_note: text_field(json, "abstract").unwrap_or_default(),
        date: text_field(json, "date").unwrap_or_default(),
        language: text_field(json, "language")
            .or(page.language)
            .unwrap_or_default(),
        doi: text_field(json, "doi").or_else(|| text_field(json, "DOI")),
        creators: parse_authors(json.get("authors")),
        ..Default::default()
    };

    if let Some(info) = json.get("publication_info").and_then(Value::as_object) {
        record.publisher = text_field(info, "publisher");
        record.edition = text_field(info, "edition");
        if let Some(year) = text_field(info, "print_year") {
            record.date = year;
        }

        let mut extra = Vec::new();
        if let Some(online) = text_field(info, "online_version") {
            extra.push(format!("Online version: {}", online));
        }
        if let Some(available) = text_field(info, "available_from") {
            extra.push(format!("Available from: {}", available));
        }
        record.extra = extra.join("\n");
    }

    record.tags = match json.get("keywords") {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(Value::String(list)) => list
            .split([',', ';'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect(),
        _ => Default::default(),
    };

    if let Some(markdown) = page.markdown.filter(|m| !m.trim().is_empty()) {
        record.notes.push(markdown);
    }

    record
}

/// Authors as `[{"name": ...}]` or `["..."]`, split into first/last name.
fn parse_authors(value: Option<&Value>) -> Vec<Creator> {
    let Some(Value::Array(authors)) = value else {
        return Vec::new();
    };
    authors
        .iter()
        .filter_map(|author| match author {
            Value::Object(obj) => obj.get("name").and_then(value_text),
            other => value_text(other),
        })
        .filter_map(|name| Creator::from_display_name(&name))
        .collect()
}

/// A non-empty string or number field, as text.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
