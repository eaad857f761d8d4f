//! Firestore connector over the REST API.
//!
//! Documents are listed page by page through
//! `projects/{project}/databases/{database}/documents/{collection}` and
//! their typed values are flattened into untyped JSON.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::connectors::common::{create_http_client, handle_http_error, retry_after_secs, validate_url};
use crate::connectors::DocumentSource;
use crate::error::{Error, Result};
use crate::snapshot::RawDocument;

/// Public Firestore REST endpoint.
pub const FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";

/// Configuration for the Firestore source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    #[serde(default)]
    pub project_id: String,
    /// Database id.
    #[serde(default = "default_database")]
    pub database: String,
    /// OAuth2 bearer token sent with every request.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Emulator `host:port`; requests go to plain HTTP without credentials.
    #[serde(default)]
    pub emulator_host: Option<String>,
    /// Explicit API base URL, overriding both defaults.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Documents requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: default_database(),
            access_token: None,
            emulator_host: None,
            base_url: None,
            page_size: default_page_size(),
        }
    }
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_page_size() -> u32 {
    300
}

/// A Firestore document as returned by the REST API.
#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Response of a `documents.list` call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Firestore REST document source.
pub struct FirestoreSource {
    config: FirestoreConfig,
    client: Client,
    base_url: String,
}

impl FirestoreSource {
    /// Creates a new Firestore source with a configured HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is not a valid URL.
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        let base_url = match (&config.base_url, &config.emulator_host) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}/v1", host.trim_end_matches('/')),
            (None, None) => FIRESTORE_API_URL.to_string(),
        };
        validate_url(&base_url)?;

        Ok(Self {
            config,
            client: create_http_client(),
            base_url,
        })
    }

    /// Builds the URL of a collection or document path.
    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.base_url, self.config.project_id, self.config.database, path
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.config.access_token, &self.config.emulator_host) {
            (Some(token), None) => request.bearer_auth(token),
            // The emulator accepts any caller; "owner" bypasses security rules.
            (_, Some(_)) => request.bearer_auth("owner"),
            (None, None) => request,
        }
    }

    /// Sends a GET and decodes the body.
    ///
    /// A 404 is `Ok(None)` only when `missing_ok` is set; otherwise it is a
    /// source error like any other failed status.
    async fn get_json<R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
        missing_ok: bool,
    ) -> Result<Option<R>> {
        let response = self
            .authorize(self.client.get(url).query(query))
            .send()
            .await
            .map_err(|e| Error::SourceConnection(format!("Firestore request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && missing_ok {
            return Ok(None);
        }
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(handle_http_error(status.as_u16(), &body, "Firestore", retry_after));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::SourceConnection(format!("Failed to read Firestore response: {}", e)))?;
        Ok(Some(serde_json::from_str(&body)?))
    }
}

#[async_trait]
impl DocumentSource for FirestoreSource {
    fn source_type(&self) -> &'static str {
        "firestore"
    }

    async fn list(&self, collection: &str) -> Result<Vec<RawDocument>> {
        let url = self.build_url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", self.config.page_size.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            // A missing collection lists as 200 with no documents, so a 404
            // here means the project or database does not exist.
            let Some(page) = self.get_json::<ListDocumentsResponse>(&url, &query, false).await? else {
                break;
            };
            documents.extend(page.documents.into_iter().map(to_raw_document));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Fetched {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>> {
        let url = self.build_url(&format!("{collection}/{id}"));
        let document = self.get_json::<FirestoreDocument>(&url, &[], true).await?;
        Ok(document.map(to_raw_document))
    }
}

fn to_raw_document(doc: FirestoreDocument) -> RawDocument {
    RawDocument::new(document_id(&doc.name), decode_fields(doc.fields))
}

/// Last path segment of a document resource name.
fn document_id(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

fn decode_fields(fields: Map<String, Value>) -> BTreeMap<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| (key, decode_value(value)))
        .collect()
}

/// Flattens a typed Firestore value into plain JSON.
///
/// Timestamps stay RFC3339 strings; unknown shapes become null.
pub fn decode_value(value: Value) -> Value {
    let Value::Object(mut typed) = value else {
        return Value::Null;
    };

    if let Some(v) = typed.remove("stringValue") {
        return v;
    }
    if let Some(v) = typed.remove("booleanValue") {
        return v;
    }
    if let Some(v) = typed.remove("timestampValue") {
        return v;
    }
    if let Some(v) = typed.remove("integerValue") {
        return match &v {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(v),
            _ => v,
        };
    }
    if let Some(v) = typed.remove("doubleValue") {
        return match v {
            Value::Number(_) => v,
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Value::Null, Value::Number),
            _ => Value::Null,
        };
    }
    if let Some(v) = typed
        .remove("referenceValue")
        .or_else(|| typed.remove("bytesValue"))
    {
        return v;
    }
    if let Some(v) = typed.remove("geoPointValue") {
        return v;
    }
    if let Some(v) = typed.remove("arrayValue") {
        let values = match v {
            Value::Object(mut array) => match array.remove("values") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        return Value::Array(values.into_iter().map(decode_value).collect());
    }
    if let Some(v) = typed.remove("mapValue") {
        let fields = match v {
            Value::Object(mut map) => match map.remove("fields") {
                Some(Value::Object(fields)) => fields,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
        return Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, decode_value(value)))
                .collect(),
        );
    }
    Value::Null
}

#[cfg(test)]
#[path = "firestore_tests.rs"]
mod tests;
