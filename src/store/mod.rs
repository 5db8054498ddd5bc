//! Remote document store for the AnimeFlow API
//!
//! The catalog lives in a single JSON document hosted by a content-addressed
//! backend (a GitHub repository or a JSONBin bin). Every revision of the
//! document is identified by an opaque [`VersionToken`]:
//!
//! - reads send the last known token so unchanged documents are not re-parsed
//! - writes carry the token they last observed and are rejected with
//!   [`StoreError::Conflict`] when the remote revision has moved on
//!
//! There is no partial update: every save ships the whole document.

pub mod document;
pub mod github;
pub mod jsonbin;
pub mod memory;

pub use document::{Freshness, RemoteDocument};
pub use github::GitHubStore;
pub use jsonbin::JsonBinStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::StoreConfig;

/// Opaque identifier of one revision of a remote document
/// (blob SHA, content digest or revision counter depending on the backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a conditional read
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// The remote revision matches the token the caller already holds
    NotModified(VersionToken),
    /// The remote revision differs (or the caller had none)
    Modified {
        content: Vec<u8>,
        token: VersionToken,
    },
}

impl Fetched {
    pub fn token(&self) -> &VersionToken {
        match self {
            Fetched::NotModified(token) => token,
            Fetched::Modified { token, .. } => token,
        }
    }
}

/// Errors that can occur while talking to a remote document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document does not exist on the backend
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The remote revision no longer matches the token supplied with a write
    #[error("Version conflict on {path}: expected {expected:?}, remote is {actual:?}")]
    Conflict {
        path: String,
        expected: Option<VersionToken>,
        actual: Option<VersionToken>,
    },

    /// Network-level failure (DNS, connect, timeout)
    #[error("Failed to reach document store: {0}")]
    Transport(String),

    /// Backend answered with an unexpected HTTP status
    #[error("Document store returned status {status}: {body}")]
    Http { status: u16, body: String },

    /// Response or document body could not be decoded
    #[error("Malformed document: {0}")]
    Parse(String),
}

impl StoreError {
    /// Whether the caller may sensibly retry the same operation unchanged.
    /// The store itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Transport("Connection timeout".to_string())
        } else if err.is_connect() {
            StoreError::Transport("Failed to connect to server".to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Content-addressed document backend.
///
/// Implementations must never overwrite a document when the supplied token
/// does not match the current remote revision. `expected = None` means the
/// caller believes the document does not exist yet.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name, used for logging and the status endpoint
    fn name(&self) -> &str;

    /// Conditional read. `known` is the token of the revision the caller
    /// already has cached.
    async fn fetch(&self, path: &str, known: Option<&VersionToken>) -> StoreResult<Fetched>;

    /// Write the whole document, returning the token of the new revision.
    async fn save(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        message: &str,
    ) -> StoreResult<VersionToken>;

    /// Token of the current remote revision, `None` if the document is absent.
    async fn current_token(&self, path: &str) -> StoreResult<Option<VersionToken>> {
        match self.fetch(path, None).await {
            Ok(fetched) => Ok(Some(fetched.token().clone())),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Build the configured backend
pub fn from_config(config: &StoreConfig, timeout: Duration) -> StoreResult<Arc<dyn RemoteStore>> {
    let store: Arc<dyn RemoteStore> = match config {
        StoreConfig::GitHub {
            owner,
            repo,
            branch,
            token,
            api_base,
        } => Arc::new(GitHubStore::new(
            api_base,
            owner,
            repo,
            branch,
            token.clone(),
            timeout,
        )?),
        StoreConfig::JsonBin {
            master_key,
            api_base,
            ..
        } => Arc::new(JsonBinStore::new(api_base, master_key, timeout)?),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

pub(crate) fn http_client(timeout: Duration) -> StoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("anime-flow/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| StoreError::Transport(format!("Failed to build HTTP client: {}", e)))
}
