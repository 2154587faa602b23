//! Error types for the import pipeline.

use std::time::Duration;

/// Errors that can occur while resolving, enriching, merging or committing references.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// HTTP request failed (network, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A service returned an error status code.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Credentials rejected by a service (HTTP 401/403).
    #[error("Authentication failed for {0}: check the API key")]
    AuthRequired(&'static str),

    /// Rate limited by a service (HTTP 429).
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse a service response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required credential is empty.
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    /// Reading or writing the credential file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No citation text was supplied.
    #[error("No reference text to import")]
    EmptyInput,

    /// The completion oracle answered, but not with usable records.
    #[error("Could not parse resolved references: {diagnostic}")]
    ResolutionParse { raw: String, diagnostic: String },

    /// The completion oracle could not be reached while resolving references.
    #[error("Reference resolution failed: {0}")]
    ResolutionService(#[source] Box<ImportError>),

    /// Deriving the source URL or scraping it failed.
    #[error("Enrichment failed{}: {source}", .url.as_deref().map(|u| format!(" for {}", u)).unwrap_or_default())]
    EnrichmentService {
        url: Option<String>,
        #[source]
        source: Box<ImportError>,
    },

    /// The merge oracle answered, but not with usable records.
    #[error("Could not parse merged references: {diagnostic}")]
    MergeParse { raw: String, diagnostic: String },

    /// The completion oracle could not be reached while merging.
    #[error("Merging reference data failed: {0}")]
    MergeService(#[source] Box<ImportError>),

    /// Nothing was handed to the committer.
    #[error("No valid items to create in the library")]
    EmptyBatch,

    /// The library's item types or fields could not be fetched.
    #[error("Failed to fetch the library field schema: {0}")]
    SchemaFetch(#[source] Box<ImportError>),

    /// A check or create call for one batch failed.
    #[error("Batch {batch} could not be committed: {source}")]
    BatchCommit {
        batch: usize,
        #[source]
        source: Box<ImportError>,
    },
}

/// Convenience alias for Results using [`ImportError`].
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_error_mentions_url() {
        let err = ImportError::EnrichmentService {
            url: Some("https://scielo.org/x".to_string()),
            source: Box::new(ImportError::NotFound("page".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("for https://scielo.org/x"));
        assert!(msg.contains("Not found: page"));
    }

    #[test]
    fn test_enrichment_error_without_url() {
        let err = ImportError::EnrichmentService {
            url: None,
            source: Box::new(ImportError::AuthRequired("OpenAI")),
        };
        assert_eq!(
            err.to_string(),
            "Enrichment failed: Authentication failed for OpenAI: check the API key"
        );
    }

    #[test]
    fn test_stage_errors_keep_source() {
        use std::error::Error;
        let err = ImportError::SchemaFetch(Box::new(ImportError::Api {
            status: 500,
            message: "boom".to_string(),
        }));
        let source = err.source().expect("source is kept");
        assert_eq!(source.to_string(), "API error (HTTP 500): boom");
    }
}
