//! Credentials and run settings.
//!
//! Credentials are an explicit value handed to the pipeline; nothing reads
//! them from ambient state once a run has started.

use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// API keys for the three services, stored on disk as a flat JSON object.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Zotero library (user or group) ID.
    #[serde(default)]
    pub library_id: String,
    /// Zotero API key.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub openai_key: String,
    #[serde(default)]
    pub firecrawl_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("library_id", &self.library_id)
            .field("api_key", &mask(&self.api_key))
            .field("openai_key", &mask(&self.openai_key))
            .field("firecrawl_key", &mask(&self.firecrawl_key))
            .finish()
    }
}

impl Credentials {
    /// Load credentials from a JSON file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let creds = serde_json::from_str(&content).map_err(|e| {
            ImportError::Config(format!("Invalid credential file {}: {}", path.display(), e))
        })?;
        Ok(Some(creds))
    }

    /// Write credentials as 4-space indented JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, buf)?;
        Ok(())
    }

    /// Read credentials from `ZOTERO_LIBRARY_ID`, `ZOTERO_API_KEY`,
    /// `OPENAI_API_KEY` and `FIRECRAWL_API_KEY`. Unset variables stay empty.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            library_id: var("ZOTERO_LIBRARY_ID"),
            api_key: var("ZOTERO_API_KEY"),
            openai_key: var("OPENAI_API_KEY"),
            firecrawl_key: var("FIRECRAWL_API_KEY"),
        }
    }

    /// Fill every empty field of `self` from `other`.
    pub fn or(mut self, other: Credentials) -> Self {
        let fill = |mine: &mut String, theirs: String| {
            if mine.trim().is_empty() {
                *mine = theirs;
            }
        };
        fill(&mut self.library_id, other.library_id);
        fill(&mut self.api_key, other.api_key);
        fill(&mut self.openai_key, other.openai_key);
        fill(&mut self.firecrawl_key, other.firecrawl_key);
        self
    }

    /// Check that all four credentials are present.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("library_id", &self.library_id),
            ("api_key", &self.api_key),
            ("openai_key", &self.openai_key),
            ("firecrawl_key", &self.firecrawl_key),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ImportError::MissingCredential(name));
            }
        }
        Ok(())
    }
}

/// Show only the last four characters of a secret.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

/// Default credential file location: `<config dir>/zotero-import/credentials.json`.
#[cfg(feature = "cli")]
pub fn default_credentials_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("zotero-import")
        .join("credentials.json")
}

/// Which kind of Zotero library the library ID refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LibraryKind {
    #[default]
    User,
    Group,
}

impl LibraryKind {
    /// URL prefix segment for this library kind.
    pub fn path_segment(&self) -> &'static str {
        match self {
            LibraryKind::User => "users",
            LibraryKind::Group => "groups",
        }
    }
}

/// What to do when the enrichment stage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnrichmentPolicy {
    /// Stop the run.
    #[default]
    Required,
    /// Log the failure and import the resolver's records as they are.
    Optional,
}

/// Largest batch the Zotero write API accepts.
pub const MAX_BATCH_SIZE: usize = 50;

/// Tunables for one import run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Model used to turn text into records.
    pub resolve_model: String,
    /// Model used to pick the enrichment URL.
    pub locate_model: String,
    /// Model used to merge records with enrichment data.
    pub merge_model: String,
    pub openai_base_url: String,
    pub firecrawl_base_url: String,
    pub zotero_base_url: String,
    pub library_kind: LibraryKind,
    pub batch_size: usize,
    /// Timeout for language-model and scraping calls.
    pub oracle_timeout: Duration,
    /// Timeout for library calls.
    pub library_timeout: Duration,
    pub enrichment: EnrichmentPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolve_model: "o3-mini".to_string(),
            locate_model: "o3-mini".to_string(),
            merge_model: "o1".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            firecrawl_base_url: "https://api.firecrawl.dev".to_string(),
            zotero_base_url: "https://api.zotero.org".to_string(),
            library_kind: LibraryKind::User,
            batch_size: MAX_BATCH_SIZE,
            oracle_timeout: Duration::from_secs(300),
            library_timeout: Duration::from_secs(60),
            enrichment: EnrichmentPolicy::Required,
        }
    }
}

impl Settings {
    /// Override the batch size; clamped to `1..=50`.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_enrichment(mut self, policy: EnrichmentPolicy) -> Self {
        self.enrichment = policy;
        self
    }

    pub fn with_library_kind(mut self, kind: LibraryKind) -> Self {
        self.library_kind = kind;
        self
    }

    /// Use the same model for all three oracle stages.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.resolve_model = model.clone();
        self.locate_model = model.clone();
        self.merge_model = model;
        self
    }
}
