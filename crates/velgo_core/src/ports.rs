//! crates/velgo_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the two external collaborators:
//! the identity provider and the document store. These traits form the
//! boundary of the hexagonal architecture, so the request handlers never
//! depend on Firebase or Firestore directly.

use async_trait::async_trait;

use crate::domain::VerifiedIdentity;
use crate::value::{Document, FieldValue};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Document queries
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A collection query: at most one equality filter and one ordering.
/// Documents lacking the ordering field are not returned, as in Firestore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<FieldFilter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }
}

/// A document together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Document,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies an ID token and returns the identity it was issued for.
    /// A token that fails verification yields `PortError::InvalidToken`.
    async fn verify_id_token(&self, token: &str) -> PortResult<VerifiedIdentity>;

    /// Invalidates every refresh token issued to `uid`, signing the user out
    /// of all clients.
    async fn revoke_refresh_tokens(&self, uid: &str) -> PortResult<()>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Adds a document under a store-assigned id and returns that id.
    async fn insert(&self, collection: &str, document: Document) -> PortResult<String>;

    /// Overwrites the given fields of an existing document. Fails with
    /// `PortError::NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, changes: Document) -> PortResult<()>;

    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>>;

    async fn query(&self, collection: &str, query: &Query) -> PortResult<Vec<StoredDocument>>;
}
