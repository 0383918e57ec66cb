pub mod firebase_auth;
pub mod firestore;
pub mod google_auth;
pub mod memory;

pub use firebase_auth::{FirebaseAuthAdapter, UnconfiguredIdentity};
pub use firestore::FirestoreAdapter;
pub use google_auth::{GoogleTokenSource, ServiceAccount};
pub use memory::InMemoryDocumentStore;
