//! Deterministic fakes for the three external services.
//!
//! - [`ScriptedOracle`]: replays queued completion replies and records prompts
//! - [`FakeScraper`]: serves canned pages per URL
//! - [`FakeLibrary`]: an in-memory Zotero with a configurable schema and
//!   injectable check/create/template failures

use crate::error::{ImportError, Result};
use crate::oracle::{CompletionOracle, Library, ScrapeOracle, ScrapeRequest, ScrapeResponse};
use crate::types::{ItemPayload, WriteResponse, CREATORS_KEY};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Completion oracle that answers from a queue.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Ok(text.into()));
        self
    }

    /// Queue a failure; it surfaces as an HTTP 503 API error.
    pub fn fail(self, message: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Err(message.into()));
        self
    }

    /// `(model, prompt)` pairs received so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl CompletionOracle for ScriptedOracle {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        lock(&self.prompts).push((model.to_string(), prompt.to_string()));
        match lock(&self.replies).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ImportError::Api {
                status: 503,
                message,
            }),
            None => Err(ImportError::Config(
                "scripted oracle has no reply left".to_string(),
            )),
        }
    }
}

/// Scraping oracle with one canned page per URL.
#[derive(Default)]
pub struct FakeScraper {
    pages: HashMap<String, ScrapeResponse>,
    requests: Mutex<Vec<ScrapeRequest>>,
}

impl FakeScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, page: ScrapeResponse) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    pub fn requests(&self) -> Vec<ScrapeRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ScrapeOracle for FakeScraper {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse> {
        lock(&self.requests).push(request.clone());
        self.pages
            .get(&request.url)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(request.url.clone()))
    }
}

/// In-memory library.
///
/// Templates contain `itemType`, every schema field as `""`, and the
/// structural keys Zotero includes (`creators`, `tags`, `collections`,
/// `relations`). Created items get keys `ITEM0000`, `ITEM0001`, ...
#[derive(Default)]
pub struct FakeLibrary {
    schema: BTreeMap<String, Vec<String>>,
    fail_schema: bool,
    fail_templates: HashSet<String>,
    fail_checks: HashSet<usize>,
    fail_creates: HashSet<usize>,
    check_calls: Mutex<usize>,
    create_calls: Mutex<Vec<Vec<ItemPayload>>>,
    schema_calls: Mutex<usize>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an item type and its valid fields.
    pub fn with_type(mut self, item_type: &str, fields: &[&str]) -> Self {
        self.schema.insert(
            item_type.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    /// Make `item_types` fail.
    pub fn failing_schema(mut self) -> Self {
        self.fail_schema = true;
        self
    }

    /// Make template instantiation fail for one item type.
    pub fn failing_template(mut self, item_type: &str) -> Self {
        self.fail_templates.insert(item_type.to_string());
        self
    }

    /// Make the n-th (zero-based) check call fail.
    pub fn failing_check(mut self, call: usize) -> Self {
        self.fail_checks.insert(call);
        self
    }

    /// Make the n-th (zero-based) create call fail.
    pub fn failing_create(mut self, call: usize) -> Self {
        self.fail_creates.insert(call);
        self
    }

    /// Every batch passed to `create_items`, in call order.
    pub fn create_calls(&self) -> Vec<Vec<ItemPayload>> {
        lock(&self.create_calls).clone()
    }

    /// How many times `item_types` was called.
    pub fn schema_calls(&self) -> usize {
        *lock(&self.schema_calls)
    }
}

#[async_trait]
impl Library for FakeLibrary {
    async fn item_types(&self) -> Result<Vec<String>> {
        *lock(&self.schema_calls) += 1;
        if self.fail_schema {
            return Err(ImportError::Api {
                status: 500,
                message: "schema unavailable".to_string(),
            });
        }
        Ok(self.schema.keys().cloned().collect())
    }

    async fn item_type_fields(&self, item_type: &str) -> Result<Vec<String>> {
        self.schema
            .get(item_type)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(format!("itemTypeFields/{}", item_type)))
    }

    async fn item_template(&self, item_type: &str) -> Result<ItemPayload> {
        if self.fail_templates.contains(item_type) {
            return Err(ImportError::Api {
                status: 400,
                message: format!("Invalid item type '{}'", item_type),
            });
        }
        let fields = self
            .schema
            .get(item_type)
            .ok_or_else(|| ImportError::NotFound(format!("items/new?itemType={}", item_type)))?;

        let mut template = ItemPayload::new();
        template.insert("itemType".to_string(), json!(item_type));
        for field in fields {
            template.insert(field.clone(), json!(""));
        }
        template.insert(CREATORS_KEY.to_string(), json!([]));
        template.insert("tags".to_string(), json!([]));
        template.insert("collections".to_string(), json!([]));
        template.insert("relations".to_string(), json!({}));
        Ok(template)
    }

    async fn check_items(&self, _items: &[ItemPayload]) -> Result<()> {
        let call = {
            let mut calls = lock(&self.check_calls);
            *calls += 1;
            *calls - 1
        };
        if self.fail_checks.contains(&call) {
            return Err(ImportError::Api {
                status: 400,
                message: format!("check {} rejected the batch", call),
            });
        }
        Ok(())
    }

    async fn create_items(&self, items: &[ItemPayload]) -> Result<WriteResponse> {
        let (call, offset) = {
            let mut calls = lock(&self.create_calls);
            let offset: usize = calls.iter().map(Vec::len).sum();
            calls.push(items.to_vec());
            (calls.len() - 1, offset)
        };
        if self.fail_creates.contains(&call) {
            return Err(ImportError::Api {
                status: 413,
                message: format!("create {} failed", call),
            });
        }

        let mut response = WriteResponse::default();
        for position in 0..items.len() {
            let key = format!("ITEM{:04}", offset + position);
            response
                .successful
                .insert(position.to_string(), json!({ "key": key, "version": 1 }));
            response.success.insert(position.to_string(), key);
        }
        Ok(response)
    }
}

/// A structured-extraction payload shaped like Firecrawl's JSON output.
pub fn extraction(value: Value) -> ScrapeResponse {
    ScrapeResponse {
        markdown: None,
        json: Some(value),
        language: None,
    }
}
