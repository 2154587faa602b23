//! Public types for the import pipeline.
//!
//! Records stay close to the Zotero item JSON: a typed `itemType` and
//! `creators` list, with every other field kept as raw JSON so the live
//! library schema (not this crate) decides which fields are valid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// Item type used when a record does not name one.
pub const DEFAULT_ITEM_TYPE: &str = "journalArticle";

/// Reserved key that always survives schema filtering.
pub const CREATORS_KEY: &str = "creators";

/// A JSON object as sent to (or received from) the library.
pub type ItemPayload = Map<String, Value>;

/// Item types the resolver prompt describes, with their required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    JournalArticle,
    Book,
    BookSection,
    Thesis,
    ConferencePaper,
}

impl ItemType {
    pub const ALL: [ItemType; 5] = [
        ItemType::JournalArticle,
        ItemType::Book,
        ItemType::BookSection,
        ItemType::Thesis,
        ItemType::ConferencePaper,
    ];

    /// The Zotero `itemType` identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::JournalArticle => "journalArticle",
            ItemType::Book => "book",
            ItemType::BookSection => "bookSection",
            ItemType::Thesis => "thesis",
            ItemType::ConferencePaper => "conferencePaper",
        }
    }

    /// Human description used in the resolver prompt.
    pub fn description(&self) -> &'static str {
        match self {
            ItemType::JournalArticle => "journal articles",
            ItemType::Book => "books",
            ItemType::BookSection => "book chapters",
            ItemType::Thesis => "theses and dissertations",
            ItemType::ConferencePaper => "conference papers",
        }
    }

    /// Fields the resolver must fill for this type.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ItemType::JournalArticle => &[
                "title",
                "creators",
                "date",
                "publicationTitle",
                "volume",
                "issue",
                "pages",
            ],
            ItemType::Book => &["title", "creators", "date", "publisher", "place"],
            ItemType::BookSection => &["title", "creators", "bookTitle", "publisher", "date"],
            ItemType::Thesis => &["title", "creators", "date", "university", "thesisType"],
            ItemType::ConferencePaper => &["title", "creators", "date", "conferenceName", "place"],
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The name part of a creator: split first/last, or a single `name` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatorName {
    Single {
        name: String,
    },
    Split {
        #[serde(rename = "firstName", default, deserialize_with = "null_as_empty")]
        first_name: String,
        #[serde(rename = "lastName", default, deserialize_with = "null_as_empty")]
        last_name: String,
    },
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// A creator (author, editor, ...) in Zotero's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(rename = "creatorType", default = "default_creator_type")]
    pub creator_type: String,
    #[serde(flatten)]
    pub name: CreatorName,
}

fn default_creator_type() -> String {
    "author".to_string()
}

impl Creator {
    /// A two-field author.
    pub fn author(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            creator_type: default_creator_type(),
            name: CreatorName::Split {
                first_name: first_name.into(),
                last_name: last_name.into(),
            },
        }
    }

    /// Split a display name on whitespace: the final token is the last name,
    /// everything before it the first name.
    ///
    /// Returns `None` for a blank name.
    pub fn from_display_name(name: &str) -> Option<Self> {
        let mut parts: Vec<&str> = name.split_whitespace().collect();
        let last = parts.pop()?;
        Some(Self::author(parts.join(" "), last))
    }

    pub fn first_name(&self) -> &str {
        match &self.name {
            CreatorName::Split { first_name, .. } => first_name,
            CreatorName::Single { .. } => "",
        }
    }

    pub fn last_name(&self) -> &str {
        match &self.name {
            CreatorName::Split { last_name, .. } => last_name,
            CreatorName::Single { name } => name,
        }
    }

    /// Comparison key that ignores case, spacing and creator role.
    pub fn identity_key(&self) -> String {
        let full = format!("{} {}", self.first_name(), self.last_name());
        full.split_whitespace()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A reference record: a resolver candidate or a merged record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "itemType", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<Creator>,
    /// All remaining fields, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A record produced by the text resolver.
pub type CandidateRecord = Record;
/// A record produced by the merger.
pub type MergedRecord = Record;

impl Record {
    pub fn new(item_type: impl Into<String>) -> Self {
        Self {
            item_type: Some(item_type.into()),
            ..Default::default()
        }
    }

    /// Builder helper: set a flat field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder helper: append a creator.
    pub fn with_creator(mut self, creator: Creator) -> Self {
        self.creators.push(creator);
        self
    }

    /// The record's item type, falling back to [`DEFAULT_ITEM_TYPE`].
    pub fn resolved_item_type(&self) -> &str {
        self.item_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_ITEM_TYPE)
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }
}

/// Metadata scraped for the URL derived from the input text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentRecord {
    pub url: String,
    pub title: String,
    pub abstract_note: String,
    pub date: String,
    pub language: String,
    pub doi: Option<String>,
    pub creators: Vec<Creator>,
    pub publisher: Option<String>,
    pub edition: Option<String>,
    pub extra: String,
    pub tags: BTreeSet<String>,
    pub notes: Vec<String>,
}

impl EnrichmentRecord {
    /// Zotero-shaped JSON used in the merge prompt. Empty strings are omitted.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        let mut put = |key: &str, value: &str| {
            if !value.is_empty() {
                obj.insert(key.to_string(), Value::String(value.to_string()));
            }
        };
        put("title", &self.title);
        put("abstractNote", &self.abstract_note);
        put("url", &self.url);
        put("language", &self.language);
        put("date", &self.date);
        put("extra", &self.extra);
        put("DOI", self.doi.as_deref().unwrap_or_default());
        put("publisher", self.publisher.as_deref().unwrap_or_default());
        put("edition", self.edition.as_deref().unwrap_or_default());

        if !self.creators.is_empty() {
            obj.insert(
                CREATORS_KEY.to_string(),
                serde_json::to_value(&self.creators).unwrap_or(Value::Null),
            );
        }
        if !self.tags.is_empty() {
            let tags = self
                .tags
                .iter()
                .map(|t| serde_json::json!({ "tag": t }))
                .collect();
            obj.insert("tags".to_string(), Value::Array(tags));
        }
        if !self.notes.is_empty() {
            let notes = self
                .notes
                .iter()
                .map(|n| serde_json::json!({ "note": n }))
                .collect();
            obj.insert("notes".to_string(), Value::Array(notes));
        }
        Value::Object(obj)
    }
}

/// Per-item-type allow-list of field names, as reported by the library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    types: HashMap<String, HashSet<String>>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the fields valid for one item type.
    pub fn insert<I, S>(&mut self, item_type: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types
            .insert(item_type.into(), fields.into_iter().map(Into::into).collect());
    }

    /// Item type names, sorted.
    pub fn item_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.types.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn allows(&self, item_type: &str, field: &str) -> bool {
        self.types
            .get(item_type)
            .is_some_and(|fields| fields.contains(field))
    }

    /// Project a record onto the fields valid for its item type.
    ///
    /// `creators` are always kept. Returns `None` when the item type is not
    /// in the schema. Filtering a filtered record changes nothing.
    pub fn filter(&self, record: &Record) -> Option<Record> {
        let item_type = record.resolved_item_type();
        let valid = self.types.get(item_type)?;
        let fields = record
            .fields
            .iter()
            .filter(|(key, _)| valid.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Record {
            item_type: Some(item_type.to_string()),
            creators: record.creators.clone(),
            fields,
        })
    }
}

/// A per-position failure reported by the library's write endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Response of a multi-object create call, keyed by position in the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub successful: BTreeMap<String, Value>,
    #[serde(default)]
    pub success: BTreeMap<String, String>,
    #[serde(default)]
    pub unchanged: BTreeMap<String, String>,
    #[serde(default)]
    pub failed: BTreeMap<String, WriteFailure>,
}

impl WriteResponse {
    /// Item keys of the created objects.
    pub fn created_keys(&self) -> Vec<&str> {
        self.success.values().map(String::as_str).collect()
    }
}

/// What happened to one submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Committed { response: WriteResponse },
    Failed { error: String },
}

/// One batch of a commit: the payloads sent and the outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    /// Zero-based batch index.
    pub index: usize,
    pub records: Vec<ItemPayload>,
    pub outcome: BatchOutcome,
}

impl BatchResult {
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Committed { .. })
    }

    /// Items the library confirmed as created.
    pub fn success_count(&self) -> usize {
        match &self.outcome {
            BatchOutcome::Committed { response } => response.success.len(),
            BatchOutcome::Failed { .. } => 0,
        }
    }

    /// Items lost with this batch: all of them for a failed call, otherwise
    /// those the library rejected individually.
    pub fn failure_count(&self) -> usize {
        match &self.outcome {
            BatchOutcome::Committed { response } => response.failed.len(),
            BatchOutcome::Failed { .. } => self.records.len(),
        }
    }
}

/// A record dropped before it reached a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSkipped {
    /// Zero-based position in the committer input.
    pub index: usize,
    pub item_type: String,
    pub reason: String,
}

/// Outcome of committing one sequence of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitReport {
    pub batches: Vec<BatchResult>,
    pub skipped: Vec<RecordSkipped>,
}

impl CommitReport {
    pub fn committed_count(&self) -> usize {
        self.batches.iter().map(BatchResult::success_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.batches.iter().map(BatchResult::failure_count).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of batches submitted, whether they failed at check or create.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchResult> {
        self.batches.iter().filter(|b| !b.is_committed())
    }
}

/// Outcome of one full import run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub candidates: usize,
    /// URL the enrichment stage scraped, if it ran successfully.
    pub enrichment_url: Option<String>,
    pub merged: usize,
    pub commit: CommitReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_creator_from_display_name() {
        let c = Creator::from_display_name("Marie Curie").unwrap();
        assert_eq!(c.first_name(), "Marie");
        assert_eq!(c.last_name(), "Curie");
        assert_eq!(c.creator_type, "author");

        let c = Creator::from_display_name("Plato").unwrap();
        assert_eq!(c.first_name(), "");
        assert_eq!(c.last_name(), "Plato");

        let c = Creator::from_display_name("  Gabriel  García Márquez ").unwrap();
        assert_eq!(c.first_name(), "Gabriel García");
        assert_eq!(c.last_name(), "Márquez");

        assert!(Creator::from_display_name("   ").is_none());
    }

    #[test]
    fn test_creator_wire_shapes() {
        let split: Creator = serde_json::from_value(json!({
            "creatorType": "editor", "firstName": "Ada", "lastName": "Lovelace"
        }))
        .unwrap();
        assert_eq!(split.creator_type, "editor");
        assert_eq!(split.last_name(), "Lovelace");

        let single: Creator = serde_json::from_value(json!({"name": "CERN"})).unwrap();
        assert_eq!(single.creator_type, "author");
        assert_eq!(single.name, CreatorName::Single { name: "CERN".into() });
        assert_eq!(
            serde_json::to_value(&single).unwrap(),
            json!({"creatorType": "author", "name": "CERN"})
        );

        let plato = Creator::from_display_name("Plato").unwrap();
        assert_eq!(
            serde_json::to_value(&plato).unwrap(),
            json!({"creatorType": "author", "firstName": "", "lastName": "Plato"})
        );
    }

    #[test]
    fn test_null_name_parts_read_as_empty() {
        let creators: Vec<Creator> = serde_json::from_value(json!([
            {"creatorType": "author", "firstName": "Ada", "lastName": "Lovelace"},
            {"creatorType": "author", "firstName": null, "lastName": "Plato"},
            {"lastName": null}
        ]))
        .unwrap();
        assert_eq!(creators[1], Creator::author("", "Plato"));
        assert_eq!(creators[2].identity_key(), "");
    }

    #[test]
    fn test_record_keeps_unknown_fields() {
        let record: Record = serde_json::from_value(json!({
            "itemType": "book",
            "title": "Cosmos",
            "creators": [{"creatorType": "author", "firstName": "Carl", "lastName": "Sagan"}],
            "numPages": "396"
        }))
        .unwrap();
        assert_eq!(record.item_type.as_deref(), Some("book"));
        assert_eq!(record.title(), Some("Cosmos"));
        assert_eq!(record.creators.len(), 1);
        assert_eq!(record.fields.get("numPages"), Some(&json!("396")));
        assert!(!record.fields.contains_key("itemType"));
    }

    #[test]
    fn test_resolved_item_type_defaults() {
        assert_eq!(Record::default().resolved_item_type(), "journalArticle");
        assert_eq!(Record::new("  ").resolved_item_type(), "journalArticle");
        assert_eq!(Record::new("thesis").resolved_item_type(), "thesis");
    }

    fn book_schema() -> FieldSchema {
        let mut schema = FieldSchema::new();
        schema.insert("book", ["title", "creators", "date", "publisher", "place"]);
        schema
    }

    #[test]
    fn test_filter_drops_fields_outside_schema() {
        let record = Record::new("book")
            .with_field("title", "Cosmos")
            .with_field("volume", "2")
            .with_field("place", "New York")
            .with_creator(Creator::author("Carl", "Sagan"));

        let filtered = book_schema().filter(&record).unwrap();
        assert!(!filtered.fields.contains_key("volume"));
        assert_eq!(filtered.fields.get("place"), Some(&json!("New York")));
        assert_eq!(filtered.creators, record.creators);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let record = Record::new("book")
            .with_field("title", "Cosmos")
            .with_field("ISBN", "978-0")
            .with_creator(Creator::author("Carl", "Sagan"));
        let schema = book_schema();

        let once = schema.filter(&record).unwrap();
        let twice = schema.filter(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_filter_unknown_type() {
        assert!(book_schema().filter(&Record::new("podcast")).is_none());
        // No item type resolves to journalArticle, which this schema lacks.
        assert!(book_schema().filter(&Record::default()).is_none());
    }

    #[test]
    fn test_enrichment_to_value_zotero_shape() {
        let enrichment = EnrichmentRecord {
            url: "https://example.org/paper".into(),
            title: "Radioactive Substances".into(),
            creators: vec![Creator::author("Marie", "Curie")],
            tags: ["radium", "polonium"].into_iter().map(String::from).collect(),
            notes: vec!["# Full text".into()],
            ..Default::default()
        };
        let value = enrichment.to_value();
        assert_eq!(value["title"], "Radioactive Substances");
        assert_eq!(value["tags"], json!([{"tag": "polonium"}, {"tag": "radium"}]));
        assert_eq!(value["notes"], json!([{"note": "# Full text"}]));
        assert!(value.get("abstractNote").is_none());
        assert!(value.get("DOI").is_none());
    }

    #[test]
    fn test_write_response_counts() {
        let response: WriteResponse = serde_json::from_value(json!({
            "success": {"0": "ABCD2345", "2": "EFGH6789"},
            "unchanged": {},
            "failed": {"1": {"key": null, "code": 400, "message": "Invalid field"}}
        }))
        .unwrap();
        let batch = BatchResult {
            index: 0,
            records: vec![ItemPayload::new(); 3],
            outcome: BatchOutcome::Committed { response },
        };
        assert_eq!(batch.success_count(), 2);
        assert_eq!(batch.failure_count(), 1);

        let failed = BatchResult {
            index: 1,
            records: vec![ItemPayload::new(); 4],
            outcome: BatchOutcome::Failed { error: "boom".into() },
        };
        let report = CommitReport {
            batches: vec![batch, failed],
            skipped: vec![],
        };
        assert_eq!(report.committed_count(), 2);
        assert_eq!(report.failed_count(), 5);
        assert_eq!(report.failed_batches().count(), 1);
    }
}
