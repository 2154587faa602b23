//! One import run: resolve, enrich, merge, commit.

use crate::commit::LibraryCommitter;
use crate::config::{Credentials, EnrichmentPolicy, Settings};
use crate::enrichment::EnrichmentLocator;
use crate::error::Result;
use crate::firecrawl::FirecrawlClient;
use crate::merge::RecordMerger;
use crate::openai::OpenAiClient;
use crate::oracle::{CompletionOracle, Library, ScrapeOracle};
use crate::resolver::TextResolver;
use crate::types::{CandidateRecord, EnrichmentRecord, FieldSchema, ImportReport};
use crate::zotero::ZoteroClient;
use std::sync::Arc;

/// Sequences the four stages against one set of services.
#[derive(Clone)]
pub struct ImportPipeline {
    oracle: Arc<dyn CompletionOracle>,
    scraper: Arc<dyn ScrapeOracle>,
    library: Arc<dyn Library>,
    settings: Settings,
}

impl ImportPipeline {
    /// Build a pipeline from explicit service capabilities.
    pub fn new(
        oracle: Arc<dyn CompletionOracle>,
        scraper: Arc<dyn ScrapeOracle>,
        library: Arc<dyn Library>,
        settings: Settings,
    ) -> Self {
        Self {
            oracle,
            scraper,
            library,
            settings,
        }
    }

    /// Build a pipeline talking to OpenAI, Firecrawl and Zotero.
    ///
    /// Fails with `MissingCredential` before any client is built.
    pub fn from_credentials(credentials: &Credentials, settings: Settings) -> Result<Self> {
        credentials.validate()?;

        let oracle = OpenAiClient::with_base_url(
            &credentials.openai_key,
            &settings.openai_base_url,
            settings.oracle_timeout,
        )?;
        let scraper = FirecrawlClient::with_base_url(
            &credentials.firecrawl_key,
            &settings.firecrawl_base_url,
            settings.oracle_timeout,
        )?;
        let library = ZoteroClient::with_base_url(
            &settings.zotero_base_url,
            settings.library_kind,
            &credentials.library_id,
            &credentials.api_key,
            settings.library_timeout,
        )?;

        Ok(Self::new(
            Arc::new(oracle),
            Arc::new(scraper),
            Arc::new(library),
            settings,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> TextResolver {
        TextResolver::new(self.oracle.clone(), &self.settings.resolve_model)
    }

    pub fn locator(&self) -> EnrichmentLocator {
        EnrichmentLocator::new(
            self.oracle.clone(),
            self.scraper.clone(),
            &self.settings.locate_model,
        )
    }

    pub fn merger(&self) -> RecordMerger {
        RecordMerger::new(self.oracle.clone(), &self.settings.merge_model)
    }

    /// A fresh committer, with its own schema cache.
    pub fn committer(&self) -> LibraryCommitter {
        LibraryCommitter::new(self.library.clone()).with_batch_size(self.settings.batch_size)
    }

    /// Resolve text into candidates without touching the library.
    pub async fn resolve(&self, text: &str) -> Result<Vec<CandidateRecord>> {
        self.resolver().resolve(text).await
    }

    /// Scrape and normalize one URL.
    pub async fn enrich(&self, url: &str) -> Result<EnrichmentRecord> {
        self.locator().fetch_metadata(url).await
    }

    /// Fetch the library's current field schema.
    pub async fn schema(&self) -> Result<FieldSchema> {
        self.committer().schema().await.cloned()
    }

    /// Run the whole import for `text`.
    pub async fn run(&self, text: &str) -> Result<ImportReport> {
        let candidates = self.resolver().resolve(text).await?;

        let enrichment = match self.locator().locate_and_fetch(text).await {
            Ok(record) => Some(record),
            Err(e) if self.settings.enrichment == EnrichmentPolicy::Optional => {
                tracing::warn!(error = %e, "enrichment failed; importing resolved records as they are");
                None
            }
            Err(e) => return Err(e),
        };

        let merger = self.merger();
        let merged = match &enrichment {
            Some(record) => merger.merge(&candidates, record).await?,
            None => merger.merge_without_enrichment(&candidates)?,
        };

        let commit = self.committer().commit(&merged).await?;

        Ok(ImportReport {
            candidates: candidates.len(),
            enrichment_url: enrichment.map(|e| e.url),
            merged: merged.len(),
            commit,
        })
    }
}
