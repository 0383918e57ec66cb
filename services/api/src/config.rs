//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// Minimum length of the session signing secret, in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 64;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which document store adapter backs the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub session_secret: SecretString,
    pub secure_cookies: bool,
    pub store_backend: StoreBackend,
    pub credentials_path: PathBuf,
    pub firebase_project_id: Option<String>,
    pub firebase_web_api_key: Option<String>,
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Session Settings ---
        let session_secret = lookup("SESSION_SECRET")
            .ok_or_else(|| ConfigError::MissingVar("SESSION_SECRET".to_string()))?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "SESSION_SECRET".to_string(),
                format!("must be at least {} bytes long", MIN_SESSION_SECRET_LEN),
            ));
        }

        let secure_cookies = match lookup("SESSION_SECURE_COOKIE").as_deref() {
            None => false,
            Some(value) => value.parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(
                    "SESSION_SECURE_COOKIE".to_string(),
                    format!("'{}' is not true or false", value),
                )
            })?,
        };

        // --- Firebase Settings ---
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("firestore") => StoreBackend::Firestore,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("'{}' is not one of firestore, memory", other),
                ))
            }
        };

        let credentials_path = lookup("GOOGLE_APPLICATION_CREDENTIALS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("firebase-admin-sdk.json"));

        let firebase_project_id = lookup("FIREBASE_PROJECT_ID").filter(|v| !v.is_empty());
        let firebase_web_api_key = lookup("FIREBASE_WEB_API_KEY").filter(|v| !v.is_empty());
        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.is_empty());

        Ok(Self {
            bind_address,
            log_level,
            session_secret: SecretString::from(session_secret),
            secure_cookies,
            store_backend,
            credentials_path,
            firebase_project_id,
            firebase_web_api_key,
            cors_allowed_origin,
        })
    }
}
