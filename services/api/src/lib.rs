//! services/api/src/lib.rs
//!
//! The HTTP service for the booking backend: configuration, error handling,
//! the Firebase/Firestore adapters and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
