//! Zotero Web API v3 client, used as the destination library.
//!
//! Schema endpoints (`/itemTypes`, `/itemTypeFields`, `/items/new`) are
//! global; writes go to `/users/{id}/items` or `/groups/{id}/items`.

use crate::client::{Auth, HttpTransport};
use crate::config::{LibraryKind, MAX_BATCH_SIZE};
use crate::error::{ImportError, Result};
use crate::oracle::Library;
use crate::types::{ItemPayload, WriteResponse, CREATORS_KEY};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Top-level keys of an item that are not fields in Zotero's sense.
const STRUCTURAL_KEYS: &[&str] = &[
    "itemType",
    CREATORS_KEY,
    "tags",
    "collections",
    "relations",
    "notes",
];

/// Async client for one Zotero library.
pub struct ZoteroClient {
    transport: HttpTransport,
    library_prefix: String,
    all_fields: OnceCell<HashSet<String>>,
}

#[derive(Debug, Deserialize)]
struct ItemTypeEntry {
    #[serde(rename = "itemType")]
    item_type: String,
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    field: String,
}

/// Owner of an API key, as reported by `GET /keys/current`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyInfo {
    #[serde(rename = "userID")]
    pub user_id: u64,
    #[serde(default)]
    pub username: String,
}

impl ZoteroClient {
    /// Create a client for a user library on `api.zotero.org`.
    pub fn new(library_id: &str, api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(
            "https://api.zotero.org",
            LibraryKind::User,
            library_id,
            api_key,
            Duration::from_secs(60),
        )
    }

    /// Create a client against any base URL and library kind.
    pub fn with_base_url(
        base_url: impl Into<String>,
        kind: LibraryKind,
        library_id: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let library_id = library_id.trim();
        if library_id.is_empty() || !library_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ImportError::Config(format!(
                "Zotero library ID must be numeric, got {:?}",
                library_id
            )));
        }

        let transport = HttpTransport::new(
            "Zotero",
            base_url,
            Auth::Header("Zotero-API-Key", api_key.into()),
            timeout,
        )?
        .with_header("Zotero-API-Version", "3");

        Ok(Self {
            transport,
            library_prefix: format!("/{}/{}", kind.path_segment(), library_id),
            all_fields: OnceCell::new(),
        })
    }

    /// Override the rate limit (requests per second).
    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.transport = self.transport.with_rate_limit(per_second);
        self
    }

    /// Look up the user that owns the client's API key.
    pub async fn current_key(&self) -> Result<KeyInfo> {
        let body = self.transport.get("/keys/current", &[]).await?;
        serde_json::from_str(&body)
            .map_err(|e| ImportError::Parse(format!("Invalid key response: {}", e)))
    }

    /// Every field name the library knows, across all item types.
    pub async fn item_fields(&self) -> Result<&HashSet<String>> {
        self.all_fields
            .get_or_try_init(|| async {
                let body = self.transport.get("/itemFields", &[]).await?;
                let entries: Vec<FieldEntry> = serde_json::from_str(&body)
                    .map_err(|e| ImportError::Parse(format!("Invalid itemFields response: {}", e)))?;
                Ok(entries.into_iter().map(|f| f.field).collect())
            })
            .await
    }
}

#[async_trait]
impl Library for ZoteroClient {
    async fn item_types(&self) -> Result<Vec<String>> {
        let body = self.transport.get("/itemTypes", &[]).await?;
        let entries: Vec<ItemTypeEntry> = serde_json::from_str(&body)
            .map_err(|e| ImportError::Parse(format!("Invalid itemTypes response: {}", e)))?;
        Ok(entries.into_iter().map(|t| t.item_type).collect())
    }

    async fn item_type_fields(&self, item_type: &str) -> Result<Vec<String>> {
        let body = self
            .transport
            .get("/itemTypeFields", &[("itemType", item_type)])
            .await?;
        let entries: Vec<FieldEntry> = serde_json::from_str(&body)
            .map_err(|e| ImportError::Parse(format!("Invalid itemTypeFields response: {}", e)))?;
        Ok(entries.into_iter().map(|f| f.field).collect())
    }

    async fn item_template(&self, item_type: &str) -> Result<ItemPayload> {
        let body = self
            .transport
            .get("/items/new", &[("itemType", item_type)])
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| ImportError::Parse(format!("Invalid item template for {}: {}", item_type, e)))
    }

    async fn check_items(&self, items: &[ItemPayload]) -> Result<()> {
        if items.len() > MAX_BATCH_SIZE {
            return Err(ImportError::Config(format!(
                "Zotero accepts at most {} items per write, got {}",
                MAX_BATCH_SIZE,
                items.len()
            )));
        }

        let known = self.item_fields().await?;
        for (position, item) in items.iter().enumerate() {
            if let Some(bad) = item
                .keys()
                .find(|key| !known.contains(key.as_str()) && !STRUCTURAL_KEYS.contains(&key.as_str()))
            {
                return Err(ImportError::Api {
                    status: 400,
                    message: format!("Item {} has invalid field {:?}", position, bad),
                });
            }
        }
        Ok(())
    }

    async fn create_items(&self, items: &[ItemPayload]) -> Result<WriteResponse> {
        let body = serde_json::to_value(items)?;
        let path = format!("{}/items", self.library_prefix);
        let response_body = self.transport.post_json(&path, &body).await?;
        serde_json::from_str(&response_body)
            .map_err(|e| ImportError::Parse(format!("Invalid write response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(url: String) -> ZoteroClient {
        ZoteroClient::with_base_url(url, LibraryKind::User, "475425", "zkey", Duration::from_secs(5))
            .unwrap()
            .with_rate_limit(1000.0)
    }

    #[test]
    fn test_rejects_non_numeric_library_id() {
        assert!(matches!(
            ZoteroClient::new("my-library", "key"),
            Err(ImportError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_endpoints() {
        let mut server = Server::new_async().await;
        let _types = server
            .mock("GET", "/itemTypes")
            .match_header("zotero-api-version", "3")
            .with_status(200)
            .with_body(r#"[{"itemType": "book", "localized": "Book"}, {"itemType": "thesis", "localized": "Thesis"}]"#)
            .create_async()
            .await;
        let _fields = server
            .mock("GET", "/itemTypeFields")
            .match_query(Matcher::UrlEncoded("itemType".into(), "book".into()))
            .with_status(200)
            .with_body(r#"[{"field": "title", "localized": "Title"}, {"field": "publisher", "localized": "Publisher"}]"#)
            .create_async()
            .await;
        let _template = server
            .mock("GET", "/items/new")
            .match_query(Matcher::UrlEncoded("itemType".into(), "book".into()))
            .with_status(200)
            .with_body(r#"{"itemType": "book", "title": "", "creators": [{"creatorType": "author", "firstName": "", "lastName": ""}], "tags": [], "collections": [], "relations": {}}"#)
            .create_async()
            .await;

        let zotero = client(server.url());
        assert_eq!(zotero.item_types().await.unwrap(), vec!["book", "thesis"]);
        assert_eq!(
            zotero.item_type_fields("book").await.unwrap(),
            vec!["title", "publisher"]
        );
        let template = zotero.item_template("book").await.unwrap();
        assert_eq!(template["itemType"], "book");
        assert!(template.contains_key("collections"));
    }

    #[tokio::test]
    async fn test_check_items_against_global_fields() {
        let mut server = Server::new_async().await;
        let fields = server
            .mock("GET", "/itemFields")
            .with_status(200)
            .with_body(r#"[{"field": "title"}, {"field": "date"}]"#)
            .expect(1)
            .create_async()
            .await;

        let zotero = client(server.url());
        let good: ItemPayload = serde_json::from_value(json!({
            "itemType": "book", "title": "Cosmos", "creators": [], "tags": []
        }))
        .unwrap();
        let bad: ItemPayload = serde_json::from_value(json!({"itemType": "book", "colour": "red"})).unwrap();

        zotero.check_items(&[good.clone()]).await.unwrap();
        let err = zotero.check_items(&[good, bad]).await.unwrap_err();
        assert!(matches!(err, ImportError::Api { status: 400, .. }));
        assert!(err.to_string().contains("Item 1 has invalid field \"colour\""));
        // Global field list fetched once and cached.
        fields.assert_async().await;
    }

    #[tokio::test]
    async fn test_current_key() {
        let mut server = Server::new_async().await;
        let _key = server
            .mock("GET", "/keys/current")
            .match_header("zotero-api-key", "zkey")
            .with_status(200)
            .with_body(r#"{"key": "zkey", "userID": 475425, "username": "mcurie", "access": {"user": {"library": true, "write": true}}}"#)
            .create_async()
            .await;

        let info = client(server.url()).current_key().await.unwrap();
        assert_eq!(info.user_id, 475425);
        assert_eq!(info.username, "mcurie");
    }

    #[tokio::test]
    async fn test_check_items_rejects_oversized_batch() {
        let zotero = client("http://127.0.0.1:9".to_string());
        let items = vec![ItemPayload::new(); 51];
        assert!(matches!(
            zotero.check_items(&items).await,
            Err(ImportError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_create_items_posts_to_library() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/users/475425/items")
            .match_header("zotero-api-key", "zkey")
            .match_body(Matcher::Json(json!([{"itemType": "book", "title": "Cosmos"}])))
            .with_status(200)
            .with_body(
                r#"{
                    "successful": {"0": {"key": "ABCD2345", "version": 1}},
                    "success": {"0": "ABCD2345"},
                    "unchanged": {},
                    "failed": {}
                }"#,
            )
            .create_async()
            .await;

        let item: ItemPayload = serde_json::from_value(json!({"itemType": "book", "title": "Cosmos"})).unwrap();
        let response = client(server.url()).create_items(&[item]).await.unwrap();
        assert_eq!(response.created_keys(), vec!["ABCD2345"]);
        assert!(response.failed.is_empty());
        mock.assert_async().await;
    }
}
