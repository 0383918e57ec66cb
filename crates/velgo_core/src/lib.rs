pub mod domain;
pub mod ports;
pub mod value;

pub use domain::{
    AdminAuthorization, AdminIdentity, AdminView, StatusUpdate, SubmissionKind,
    SubmissionStatus, VerifiedIdentity,
};
pub use ports::{
    Direction, DocumentStore, IdentityVerifier, PortError, PortResult, Query, StoredDocument,
};
pub use value::{Document, FieldValue};
