//! services/api/src/adapters/firestore.rs
//!
//! This module contains the Firestore adapter, the concrete implementation of
//! the `DocumentStore` port. It talks to the Firestore REST API (v1) and
//! translates between the core `FieldValue` model and Firestore's typed JSON
//! value encoding.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use velgo_core::ports::{
    Direction, DocumentStore, PortError, PortResult, Query, StoredDocument,
};
use velgo_core::value::{Document, FieldValue};

use super::google_auth::GoogleTokenSource;

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

//=========================================================================================
// Wire format
//=========================================================================================

/// A Firestore `Value`, externally tagged the way the REST API encodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum WireValue {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(WireLatLng),
    ArrayValue(WireArray),
    MapValue(WireMap),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireLatLng {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct WireArray {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<WireValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct WireMap {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, WireValue>,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, WireValue>,
}

#[derive(Serialize)]
struct WriteBody {
    fields: BTreeMap<String, WireValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryItem {
    #[serde(default)]
    document: Option<WireDocument>,
}

fn encode_value(value: &FieldValue) -> WireValue {
    match value {
        FieldValue::Null => WireValue::NullValue(()),
        FieldValue::Boolean(b) => WireValue::BooleanValue(*b),
        FieldValue::Integer(i) => WireValue::IntegerValue(i.to_string()),
        FieldValue::Double(d) => WireValue::DoubleValue(*d),
        FieldValue::String(s) => WireValue::StringValue(s.clone()),
        FieldValue::Timestamp(ts) => {
            WireValue::TimestampValue(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
        }
        FieldValue::Array(values) => WireValue::ArrayValue(WireArray {
            values: values.iter().map(encode_value).collect(),
        }),
        FieldValue::Map(fields) => WireValue::MapValue(WireMap {
            fields: encode_fields(fields),
        }),
    }
}

fn encode_fields(document: &Document) -> BTreeMap<String, WireValue> {
    document
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

fn decode_value(value: WireValue) -> FieldValue {
    match value {
        WireValue::NullValue(()) => FieldValue::Null,
        WireValue::BooleanValue(b) => FieldValue::Boolean(b),
        WireValue::IntegerValue(s) => match s.parse::<i64>() {
            Ok(i) => FieldValue::Integer(i),
            Err(_) => FieldValue::String(s),
        },
        WireValue::DoubleValue(d) => FieldValue::Double(d),
        WireValue::TimestampValue(s) => match DateTime::parse_from_rfc3339(&s) {
            Ok(ts) => FieldValue::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => FieldValue::String(s),
        },
        WireValue::StringValue(s) | WireValue::BytesValue(s) | WireValue::ReferenceValue(s) => {
            FieldValue::String(s)
        }
        WireValue::GeoPointValue(point) => FieldValue::Map(Document::from([
            ("latitude".to_string(), FieldValue::Double(point.latitude)),
            ("longitude".to_string(), FieldValue::Double(point.longitude)),
        ])),
        WireValue::ArrayValue(array) => {
            FieldValue::Array(array.values.into_iter().map(decode_value).collect())
        }
        WireValue::MapValue(map) => FieldValue::Map(decode_fields(map.fields)),
    }
}

fn decode_fields(fields: BTreeMap<String, WireValue>) -> Document {
    fields
        .into_iter()
        .map(|(k, v)| (k, decode_value(v)))
        .collect()
}

fn decode_document(document: WireDocument) -> StoredDocument {
    let id = document
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    StoredDocument {
        id,
        fields: decode_fields(document.fields),
    }
}

/// Field paths that are not plain identifiers must be backtick-quoted.
fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn structured_query(collection: &str, query: &Query) -> Value {
    let mut structured = json!({ "from": [{ "collectionId": collection }] });

    if let Some(filter) = &query.filter {
        structured["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": quote_field_path(&filter.field) },
                "op": "EQUAL",
                "value": encode_value(&filter.value),
            }
        });
    }
    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured["orderBy"] = json!([{
            "field": { "fieldPath": quote_field_path(&order.field) },
            "direction": direction,
        }]);
    }

    json!({ "structuredQuery": structured })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store adapter backed by Cloud Firestore.
#[derive(Clone)]
pub struct FirestoreAdapter {
    http: reqwest::Client,
    tokens: Arc<GoogleTokenSource>,
    documents_url: String,
}

impl FirestoreAdapter {
    /// Creates a new `FirestoreAdapter` for the project's default database.
    pub fn new(http: reqwest::Client, tokens: Arc<GoogleTokenSource>, project_id: &str) -> Self {
        Self {
            http,
            tokens,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_URL, project_id
            ),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.documents_url, urlencoding::encode(collection))
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), urlencoding::encode(id))
    }

    /// Attaches credentials, sends the request, and turns error statuses into
    /// port errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> PortResult<Response> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| PortError::Unavailable(format!("Firestore unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => PortError::NotFound(what.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
            _ => PortError::Unexpected(format!("Firestore returned {} for {}: {}", status, what, body)),
        })
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for FirestoreAdapter {
    async fn insert(&self, collection: &str, document: Document) -> PortResult<String> {
        let body = WriteBody {
            fields: encode_fields(&document),
        };
        let response = self
            .send(self.http.post(self.collection_url(collection)).json(&body), collection)
            .await?;

        let created: WireDocument = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed Firestore response: {}", e)))?;
        let stored = decode_document(created);
        debug!("Created {}/{}", collection, stored.id);
        Ok(stored.id)
    }

    async fn update(&self, collection: &str, id: &str, changes: Document) -> PortResult<()> {
        let mut params: Vec<(&str, String)> = changes
            .keys()
            .map(|field| ("updateMask.fieldPaths", quote_field_path(field)))
            .collect();
        params.push(("currentDocument.exists", "true".to_string()));

        let body = WriteBody {
            fields: encode_fields(&changes),
        };
        let what = format!("{}/{}", collection, id);
        self.send(
            self.http
                .patch(self.document_url(collection, id))
                .query(&params)
                .json(&body),
            &what,
        )
        .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        let what = format!("{}/{}", collection, id);
        let response = match self.send(self.http.get(self.document_url(collection, id)), &what).await {
            Ok(response) => response,
            Err(PortError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let document: WireDocument = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed Firestore response: {}", e)))?;
        Ok(Some(decode_fields(document.fields)))
    }

    async fn query(&self, collection: &str, query: &Query) -> PortResult<Vec<StoredDocument>> {
        let url = format!("{}:runQuery", self.documents_url);
        let response = self
            .send(
                self.http.post(url).json(&structured_query(collection, query)),
                collection,
            )
            .await?;

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed Firestore response: {}", e)))?;
        Ok(items
            .into_iter()
            .filter_map(|item| item.document)
            .map(decode_document)
            .collect())
    }
}
