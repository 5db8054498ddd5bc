//! Configuration module for the AnimeFlow API
//!
//! Handles loading environment variables and application configuration.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::constants::defaults;

/// Errors raised while reading configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret key for token signing
    pub jwt_secret: String,
    /// Usernames granted catalog write access
    pub admin_usernames: Vec<String>,
    /// Remote document backend
    pub store: StoreConfig,
    /// Path of the catalog document within the backend
    pub document_path: String,
    /// Background refresh interval in seconds, 0 disables it
    pub sync_interval_secs: u64,
    /// Host embedding the player, required by Twitch as `parent`
    pub public_host: String,
    /// Request timeout for backend HTTP calls
    pub http_timeout_secs: u64,
}

/// Remote document backend selection
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    GitHub {
        owner: String,
        repo: String,
        branch: String,
        token: Option<String>,
        api_base: String,
    },
    JsonBin {
        bin_id: String,
        master_key: String,
        api_base: String,
    },
    Memory,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match var(name) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid { name, value }),
                None => Ok(default),
            }
        };

        let backend = var("STORE_BACKEND").unwrap_or_else(|| "github".to_string());
        let store = match backend.trim().to_lowercase().as_str() {
            "github" => StoreConfig::GitHub {
                owner: required("GITHUB_OWNER")?,
                repo: required("GITHUB_REPO")?,
                branch: var("GITHUB_BRANCH").unwrap_or_else(|| defaults::GITHUB_BRANCH.to_string()),
                token: var("GITHUB_TOKEN"),
                api_base: var("GITHUB_API_BASE")
                    .unwrap_or_else(|| defaults::GITHUB_API_BASE.to_string()),
            },
            "jsonbin" => StoreConfig::JsonBin {
                bin_id: required("JSONBIN_BIN_ID")?,
                master_key: required("JSONBIN_MASTER_KEY")?,
                api_base: var("JSONBIN_API_BASE")
                    .unwrap_or_else(|| defaults::JSONBIN_API_BASE.to_string()),
            },
            "memory" => StoreConfig::Memory,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: backend,
                })
            }
        };

        // A JSONBin bin *is* the document
        let document_path = match &store {
            StoreConfig::JsonBin { bin_id, .. } => bin_id.clone(),
            _ => var("DOCUMENT_PATH").unwrap_or_else(|| defaults::DOCUMENT_PATH.to_string()),
        };

        let port = match var("PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => 8080,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            jwt_secret: required("JWT_SECRET")?,
            admin_usernames: var("ADMIN_USERNAMES")
                .map(|list| {
                    list.split(',')
                        .map(|name| name.trim().to_string())
                        .filter(|name| !name.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            store,
            document_path,
            sync_interval_secs: number("SYNC_INTERVAL_SECS", defaults::SYNC_INTERVAL_SECS)?,
            public_host: var("PUBLIC_HOST").unwrap_or_else(|| defaults::PUBLIC_HOST.to_string()),
            http_timeout_secs: number("HTTP_TIMEOUT_SECS", defaults::HTTP_TIMEOUT_SECS)?,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Background refresh interval, `None` when disabled
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admin_usernames
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(username))
    }
}
