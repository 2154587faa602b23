//! # zotero-import
//!
//! Turn pasted, free-text citations into items in a Zotero library.
//!
//! A run has four stages:
//! - **Resolve**: a language model turns the text into candidate records
//! - **Enrich**: one source URL is derived and scraped for extra metadata
//! - **Merge**: the candidates and the scraped record are combined
//! - **Commit**: records are filtered against the live Zotero schema and
//!   written in batches of up to 50
//!
//! The external services sit behind the traits in [`oracle`], so every stage
//! runs against the fakes in [`testing`] as well as the real clients.
//!
//! ## Quick Start
//!
//! ```no_run
//! # async fn example() -> zotero_import::error::Result<()> {
//! use zotero_import::{Credentials, ImportPipeline, Settings};
//!
//! let credentials = Credentials::from_env();
//! let pipeline = ImportPipeline::from_credentials(&credentials, Settings::default())?;
//!
//! let report = pipeline
//!     .run("Curie, M. (1904). Radioactive Substances. London: Chemical News.")
//!     .await?;
//! println!(
//!     "{} created, {} failed, {} skipped",
//!     report.commit.committed_count(),
//!     report.commit.failed_count(),
//!     report.commit.skipped_count()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages on their own
//!
//! ```
//! # async fn example() -> zotero_import::error::Result<()> {
//! use std::sync::Arc;
//! use zotero_import::testing::ScriptedOracle;
//! use zotero_import::TextResolver;
//!
//! let oracle = Arc::new(ScriptedOracle::new().reply(r#"{"itemType": "book", "title": "Cosmos"}"#));
//! let records = TextResolver::new(oracle, "o3-mini").resolve("Sagan, C. Cosmos. 1980.").await?;
//! assert_eq!(records[0].title(), Some("Cosmos"));
//! # Ok(())
//! # }
//! ```

mod client;
pub mod commit;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod firecrawl;
pub mod merge;
pub mod openai;
pub mod oracle;
pub mod parse;
pub mod pipeline;
pub mod rate_limit;
pub mod resolver;
pub mod testing;
pub mod types;
pub mod zotero;

#[cfg(feature = "cli")]
pub mod setup;

pub use commit::LibraryCommitter;
pub use config::{Credentials, EnrichmentPolicy, LibraryKind, Settings};
pub use enrichment::EnrichmentLocator;
pub use error::{ImportError, Result};
pub use firecrawl::FirecrawlClient;
pub use merge::RecordMerger;
pub use openai::OpenAiClient;
pub use oracle::{CompletionOracle, Library, ScrapeOracle, ScrapeRequest, ScrapeResponse};
pub use pipeline::ImportPipeline;
pub use resolver::TextResolver;
pub use types::*;
pub use zotero::ZoteroClient;
