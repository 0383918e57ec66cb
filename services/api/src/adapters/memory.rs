//! services/api/src/adapters/memory.rs
//!
//! An in-process `DocumentStore` used for local development
//! (`STORE_BACKEND=memory`) and by the handler tests. Query semantics follow
//! Firestore: equality filters compare whole values, and documents missing the
//! ordering field are left out.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;
use velgo_core::ports::{Direction, DocumentStore, PortError, PortResult, Query, StoredDocument};
use velgo_core::value::Document;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document under a caller-chosen id, replacing any previous one.
    pub async fn put(&self, collection: &str, id: &str, document: Document) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    /// Every document in a collection, in id order.
    pub async fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| StoredDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, document: Document) -> PortResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.put(collection, &id, document).await;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, changes: Document) -> PortResult<()> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", collection, id)))?;
        document.extend(changes);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> PortResult<Vec<StoredDocument>> {
        let mut matches: Vec<StoredDocument> = self
            .documents(collection)
            .await
            .into_iter()
            .filter(|doc| {
                query
                    .filter
                    .as_ref()
                    .map_or(true, |f| doc.fields.get(&f.field) == Some(&f.value))
            })
            .collect();

        if let Some(order) = &query.order_by {
            matches.retain(|doc| doc.fields.contains_key(&order.field));
            matches.sort_by(|a, b| {
                let ordering = match (a.fields.get(&order.field), b.fields.get(&order.field)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        Ok(matches)
    }
}
