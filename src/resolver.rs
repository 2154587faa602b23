//! Free-text citation resolution.
//!
//! Turns pasted references into candidate records with one completion call.

use crate::error::{ImportError, Result};
use crate::oracle::CompletionOracle;
use crate::parse::parse_records;
use crate::types::{CandidateRecord, ItemType};
use std::fmt::Write;
use std::sync::Arc;

/// Resolves raw citation text into [`CandidateRecord`]s.
#[derive(Clone)]
pub struct TextResolver {
    oracle: Arc<dyn CompletionOracle>,
    model: String,
}

impl TextResolver {
    pub fn new(oracle: Arc<dyn CompletionOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    /// Resolve `text` into one candidate per detected citation.
    ///
    /// Never returns an empty list: an empty reply is a parse error.
    pub async fn resolve(&self, text: &str) -> Result<Vec<CandidateRecord>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ImportError::EmptyInput);
        }

        let prompt = build_prompt(text);
        let raw = self
            .oracle
            .complete(&self.model, &prompt)
            .await
            .map_err(|e| ImportError::ResolutionService(Box::new(e)))?;
        tracing::debug!(model = %self.model, bytes = raw.len(), "resolver reply received");

        let records = parse_records(&raw)
            .map_err(|diagnostic| ImportError::ResolutionParse { raw, diagnostic })?;
        tracing::info!(count = records.len(), "resolved candidate records");
        Ok(records)
    }
}

/// The resolver prompt: item-type rules, creator shape, required fields and the text.
pub fn build_prompt(text: &str) -> String {
    let mut prompt = String::from(
        "Analyse the bibliographic references below and convert them into structured JSON for Zotero.\n\n\
         Important rules:\n\
         1. Determine the correct item type (itemType):\n",
    );
    for item_type in ItemType::ALL {
        let _ = writeln!(
            prompt,
            "   - \"{}\" for {}",
            item_type.as_str(),
            item_type.description()
        );
    }

    prompt.push_str(
        "\n2. For authors, ALWAYS use the format:\n   \
         \"creators\": [\n      \
         {\"creatorType\": \"author\", \"firstName\": \"First\", \"lastName\": \"Last\"}\n   \
         ]\n\n\
         3. Required fields per type:\n",
    );
    for item_type in ItemType::ALL {
        let fields = item_type
            .required_fields()
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(prompt, "   - For {}: {}", item_type.as_str(), fields);
    }

    prompt.push_str(
        "\n4. Additional rules:\n   \
         - Do not include empty fields\n   \
         - Use the \"language\" field only when certain\n   \
         - Extract the DOI if available\n   \
         - Keep dates as YYYY-MM-DD or YYYY\n   \
         - For pages, use \"1-10\", or just \"1\" for a single page\n\n\
         References to process:\n",
    );
    prompt.push_str(text);
    prompt.push_str("\n\nReturn ONLY the JSON, with no explanations or comments.\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedOracle;

    const TWO_REFS: &str = "Sagan, C. (1980). Cosmos. New York: Random House.\n\
                            Maxwell, J. C. (1861). On Physical Lines of Force. Philosophical Magazine, 21(139), 161-175.";

    #[test]
    fn test_prompt_lists_types_and_required_fields() {
        let prompt = build_prompt("Some citation");
        assert!(prompt.contains("\"conferencePaper\" for conference papers"));
        assert!(prompt.contains(
            "For thesis: \"title\", \"creators\", \"date\", \"university\", \"thesisType\""
        ));
        assert!(prompt.contains("References to process:\nSome citation\n"));
        assert!(prompt.ends_with("Return ONLY the JSON, with no explanations or comments.\n"));
    }

    #[tokio::test]
    async fn test_resolve_list() {
        let oracle = Arc::new(ScriptedOracle::new().reply(
            r#"[
                {"itemType": "book", "title": "Cosmos", "date": "1980", "publisher": "Random House", "place": "New York",
                 "creators": [{"creatorType": "author", "firstName": "Carl", "lastName": "Sagan"}]},
                {"itemType": "journalArticle", "title": "On Physical Lines of Force", "volume": "21",
                 "creators": [{"creatorType": "author", "firstName": "James Clerk", "lastName": "Maxwell"}]}
            ]"#,
        ));
        let resolver = TextResolver::new(oracle.clone(), "o3-mini");

        let records = resolver.resolve(TWO_REFS).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].resolved_item_type(), "book");
        assert_eq!(records[1].creators[0].first_name(), "James Clerk");

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, "o3-mini");
        assert!(prompts[0].1.contains("Philosophical Magazine"));
    }

    #[tokio::test]
    async fn test_resolve_single_object() {
        let oracle = Arc::new(ScriptedOracle::new().reply(r#"{"itemType": "thesis", "title": "T"}"#));
        let records = TextResolver::new(oracle, "m").resolve("x").await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_empty_text_skips_oracle() {
        let oracle = Arc::new(ScriptedOracle::new());
        let resolver = TextResolver::new(oracle.clone(), "m");
        assert!(matches!(
            resolver.resolve("  \n ").await,
            Err(ImportError::EmptyInput)
        ));
        assert!(oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_parse_error_keeps_raw() {
        let reply = "Sure! Here are your references: [...]";
        let oracle = Arc::new(ScriptedOracle::new().reply(reply));
        match TextResolver::new(oracle, "m").resolve(TWO_REFS).await {
            Err(ImportError::ResolutionParse { raw, diagnostic }) => {
                assert_eq!(raw, reply);
                assert!(!diagnostic.is_empty());
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_empty_list_is_an_error() {
        let oracle = Arc::new(ScriptedOracle::new().reply("[]"));
        assert!(matches!(
            TextResolver::new(oracle, "m").resolve(TWO_REFS).await,
            Err(ImportError::ResolutionParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_service_error() {
        let oracle = Arc::new(ScriptedOracle::new().fail("overloaded"));
        match TextResolver::new(oracle, "m").resolve(TWO_REFS).await {
            Err(ImportError::ResolutionService(source)) => {
                assert!(matches!(*source, ImportError::Api { status: 503, .. }))
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }
}
