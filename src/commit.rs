//! Committing merged records to the library in schema-filtered batches.
//!
//! A record that cannot be turned into a payload is skipped; a batch whose
//! check or create call fails is reported as failed. Neither stops the
//! commit. Only a missing field schema does.

use crate::config::MAX_BATCH_SIZE;
use crate::error::{ImportError, Result};
use crate::oracle::Library;
use crate::types::{
    BatchOutcome, BatchResult, CommitReport, FieldSchema, ItemPayload, MergedRecord, RecordSkipped,
    WriteResponse, CREATORS_KEY,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Writes records to one library. The field schema is fetched on first use
/// and cached for the committer's lifetime.
pub struct LibraryCommitter {
    library: Arc<dyn Library>,
    batch_size: usize,
    schema: OnceCell<FieldSchema>,
}

impl LibraryCommitter {
    pub fn new(library: Arc<dyn Library>) -> Self {
        Self {
            library,
            batch_size: MAX_BATCH_SIZE,
            schema: OnceCell::new(),
        }
    }

    /// Override the batch size; clamped to `1..=50`.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// The library's field schema: every item type with its valid fields.
    pub async fn schema(&self) -> Result<&FieldSchema> {
        self.schema
            .get_or_try_init(|| async {
                let fetch = async {
                    let mut schema = FieldSchema::new();
                    for item_type in self.library.item_types().await? {
                        let fields = self.library.item_type_fields(&item_type).await?;
                        schema.insert(item_type, fields);
                    }
                    Ok::<_, ImportError>(schema)
                };
                let schema = fetch
                    .await
                    .map_err(|e| ImportError::SchemaFetch(Box::new(e)))?;
                tracing::info!(item_types = schema.item_types().len(), "fetched field schema");
                Ok(schema)
            })
            .await
    }

    /// Commit `records` in input order.
    pub async fn commit(&self, records: &[MergedRecord]) -> Result<CommitReport> {
        if records.is_empty() {
            return Err(ImportError::EmptyBatch);
        }
        let schema = self.schema().await?;

        let mut report = CommitReport::default();
        let mut pending: Vec<ItemPayload> = Vec::with_capacity(self.batch_size);

        for (index, record) in records.iter().enumerate() {
            let item_type = record.resolved_item_type();
            match self.prepare(schema, record).await {
                Ok(payload) => pending.push(payload),
                Err(reason) => {
                    tracing::warn!(index, item_type, %reason, "skipping record");
                    report.skipped.push(RecordSkipped {
                        index,
                        item_type: item_type.to_string(),
                        reason,
                    });
                }
            }

            if pending.len() >= self.batch_size {
                let batch = std::mem::take(&mut pending);
                report.batches.push(self.submit(report.batches.len(), batch).await);
            }
        }
        if !pending.is_empty() {
            report.batches.push(self.submit(report.batches.len(), pending).await);
        }

        tracing::info!(
            committed = report.committed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            batches = report.batch_count(),
            "commit finished"
        );
        Ok(report)
    }

    /// Build the payload for one record: filter, instantiate template, fill.
    async fn prepare(
        &self,
        schema: &FieldSchema,
        record: &MergedRecord,
    ) -> std::result::Result<ItemPayload, String> {
        let item_type = record.resolved_item_type();
        let filtered = schema
            .filter(record)
            .ok_or_else(|| format!("item type {:?} is not in the library schema", item_type))?;

        let mut payload = self
            .library
            .item_template(item_type)
            .await
            .map_err(|e| format!("template for {:?} unavailable: {}", item_type, e))?;

        for (key, value) in filtered.fields {
            payload.insert(key, value);
        }
        let creators = serde_json::to_value(&filtered.creators).map_err(|e| e.to_string())?;
        payload.insert(CREATORS_KEY.to_string(), creators);
        payload.insert("itemType".to_string(), Value::String(item_type.to_string()));
        Ok(payload)
    }

    /// Check then create one batch; failures become a `Failed` outcome.
    async fn submit(&self, index: usize, records: Vec<ItemPayload>) -> BatchResult {
        let outcome = match self.write(&records).await {
            Ok(response) => {
                tracing::info!(
                    batch = index,
                    created = response.success.len(),
                    rejected = response.failed.len(),
                    "batch committed"
                );
                BatchOutcome::Committed { response }
            }
            Err(source) => {
                let err = ImportError::BatchCommit {
                    batch: index,
                    source: Box::new(source),
                };
                tracing::warn!(batch = index, size = records.len(), error = %err, "batch failed");
                BatchOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        BatchResult {
            index,
            records,
            outcome,
        }
    }

    async fn write(&self, records: &[ItemPayload]) -> Result<WriteResponse> {
        self.library.check_items(records).await?;
        self.library.create_items(records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLibrary;
    use crate::types::{Creator, Record};
    use serde_json::json;

    const BOOK: &[&str] = &["title", "creators", "date", "publisher", "place"];
    const ARTICLE: &[&str] = &["title", "date", "publicationTitle", "volume", "pages"];

    fn library() -> FakeLibrary {
        FakeLibrary::new()
            .with_type("book", BOOK)
            .with_type("journalArticle", ARTICLE)
    }

    fn articles(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new("journalArticle").with_field("title", format!("Paper {}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_input_is_an_error() {
        let committer = LibraryCommitter::new(Arc::new(library()));
        assert!(matches!(committer.commit(&[]).await, Err(ImportError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_book_schema_filters_fields() {
        let lib = Arc::new(library());
        let committer = LibraryCommitter::new(lib.clone());
        let record = Record::new("book")
            .with_field("title", "Cosmos")
            .with_field("volume", "1")
            .with_field("publisher", "Random House")
            .with_creator(Creator::author("Carl", "Sagan"));

        let report = committer.commit(&[record]).await.unwrap();
        assert_eq!(report.committed_count(), 1);

        let calls = lib.create_calls();
        let sent = &calls[0][0];
        assert_eq!(sent["itemType"], "book");
        assert_eq!(sent["title"], "Cosmos");
        assert_eq!(sent["publisher"], "Random House");
        assert_eq!(sent["place"], "");
        assert!(!sent.contains_key("volume"));
        assert_eq!(
            sent["creators"],
            json!([{"creatorType": "author", "firstName": "Carl", "lastName": "Sagan"}])
        );
    }

    #[tokio::test]
    async fn test_missing_item_type_defaults_to_journal_article() {
        let lib = Arc::new(library());
        let record = Record::default().with_field("title", "Untyped").with_field("volume", "7");
        LibraryCommitter::new(lib.clone()).commit(&[record]).await.unwrap();

        let calls = lib.create_calls();
        let sent = &calls[0][0];
        assert_eq!(sent["itemType"], "journalArticle");
        assert_eq!(sent["volume"], "7");
        assert_eq!(sent["creators"], json!([]));
    }

    #[tokio::test]
    async fn test_fifty_one_records_two_calls_second_fails() {
        let lib = Arc::new(library().failing_create(1));
        let report = LibraryCommitter::new(lib.clone())
            .commit(&articles(51))
            .await
            .unwrap();

        let calls = lib.create_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), 50);
        assert_eq!(calls[1].len(), 1);

        assert!(report.batches[0].is_committed());
        assert_eq!(report.batches[0].success_count(), 50);
        assert!(!report.batches[1].is_committed());
        assert_eq!(report.committed_count(), 50);
        assert_eq!(report.failed_count(), 1);
        match &report.batches[1].outcome {
            BatchOutcome::Failed { error } => assert!(error.starts_with("Batch 1 could not be committed")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batches_preserve_input_order() {
        let lib = Arc::new(library());
        let report = LibraryCommitter::new(lib.clone())
            .commit(&articles(120))
            .await
            .unwrap();
        assert_eq!(report.batch_count(), 3);

        let sizes: Vec<usize> = lib.create_calls().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);

        let titles: Vec<String> = report
            .batches
            .iter()
            .flat_map(|b| b.records.iter())
            .map(|p| p["title"].as_str().unwrap_or_default().to_string())
            .collect();
        let expected: Vec<String> = (0..120).map(|i| format!("Paper {}", i)).collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn test_check_failure_isolated_to_batch() {
        let lib = Arc::new(library().failing_check(0));
        let report = LibraryCommitter::new(lib.clone())
            .with_batch_size(2)
            .commit(&articles(3))
            .await
            .unwrap();
        assert!(!report.batches[0].is_committed());
        assert!(report.batches[1].is_committed());
        // The rejected batch never reached the create call but still counts.
        assert_eq!(lib.create_calls().len(), 1);
        assert_eq!(report.batch_count(), 2);
        assert_eq!(report.failed_count(), 2);
    }

    #[tokio::test]
    async fn test_records_skipped_not_raised() {
        let lib = Arc::new(library().failing_template("book"));
        let records = vec![
            Record::new("podcast").with_field("title", "Unknown type"),
            Record::new("book").with_field("title", "No template"),
            Record::new("journalArticle").with_field("title", "Fine"),
        ];
        let report = LibraryCommitter::new(lib.clone()).commit(&records).await.unwrap();

        assert_eq!(report.skipped_count(), 2);
        assert_eq!(report.skipped[0].index, 0);
        assert_eq!(report.skipped[0].item_type, "podcast");
        assert_eq!(report.skipped[1].index, 1);
        assert!(report.skipped[1].reason.contains("template"));
        assert_eq!(report.committed_count(), 1);
    }

    #[tokio::test]
    async fn test_trailing_skip_still_flushes() {
        let lib = Arc::new(library());
        let mut records = articles(2);
        records.push(Record::new("podcast"));
        let report = LibraryCommitter::new(lib.clone()).commit(&records).await.unwrap();
        assert_eq!(lib.create_calls().len(), 1);
        assert_eq!(report.committed_count(), 2);
        assert_eq!(report.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_all_skipped_makes_no_calls() {
        let lib = Arc::new(library());
        let report = LibraryCommitter::new(lib.clone())
            .commit(&[Record::new("podcast")])
            .await
            .unwrap();
        assert_eq!(report.batch_count(), 0);
        assert!(lib.create_calls().is_empty());
    }

    #[tokio::test]
    async fn test_schema_fetched_once() {
        let lib = Arc::new(library());
        let committer = LibraryCommitter::new(lib.clone());
        committer.commit(&articles(1)).await.unwrap();
        committer.commit(&articles(1)).await.unwrap();
        assert_eq!(lib.schema_calls(), 1);
        assert!(committer.schema().await.unwrap().allows("book", "place"));
    }

    #[tokio::test]
    async fn test_schema_failure_is_fatal() {
        let lib = Arc::new(library().failing_schema());
        let result = LibraryCommitter::new(lib.clone()).commit(&articles(1)).await;
        assert!(matches!(result, Err(ImportError::SchemaFetch(_))));
        assert!(lib.create_calls().is_empty());
    }
}
