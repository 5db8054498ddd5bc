//! Typed view of one remote document with its last observed version token.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Fetched, RemoteStore, StoreError, StoreResult, VersionToken};

/// What a [`RemoteDocument::fetch`] did with the local copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Remote revision unchanged; the cached value was kept as-is
    Cached,
    /// A new revision was downloaded and parsed
    Refreshed,
}

/// Working copy of a remote document.
///
/// The value is the local, possibly unsaved state. The token is the revision
/// the value was last loaded from or saved as. A failed save leaves the value
/// untouched (including the caller's pending mutation) and keeps the old
/// token, so the next save attempt is checked against the same revision.
///
/// Writes always carry exactly that token. Without one the write is
/// create-only, so a document that was never loaded successfully can not be
/// overwritten by this copy.
pub struct RemoteDocument<T> {
    store: Arc<dyn RemoteStore>,
    path: String,
    value: T,
    token: Option<VersionToken>,
}

/// Backend handle pinned to the token the local copy was based on when it was
/// taken. Lets callers run the network round trip without borrowing the
/// document.
#[derive(Clone)]
pub struct Remote {
    store: Arc<dyn RemoteStore>,
    path: String,
    token: Option<VersionToken>,
}

impl Remote {
    /// Conditional read against the pinned token
    pub async fn fetch(&self) -> StoreResult<Fetched> {
        self.store.fetch(&self.path, self.token.as_ref()).await
    }

    /// Write `content` expecting the pinned token on the remote
    pub async fn save(&self, content: &[u8], message: &str) -> StoreResult<VersionToken> {
        let token = self
            .store
            .save(&self.path, content, self.token.as_ref(), message)
            .await?;
        info!("Saved {} as {} ({} bytes)", self.path, token, content.len());
        Ok(token)
    }
}

impl<T> RemoteDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(store: Arc<dyn RemoteStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            value: T::default(),
            token: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Token of the revision the local value is based on
    pub fn token(&self) -> Option<&VersionToken> {
        self.token.as_ref()
    }

    pub fn remote(&self) -> Remote {
        Remote {
            store: self.store.clone(),
            path: self.path.clone(),
            token: self.token.clone(),
        }
    }

    /// The whole value as it will be written
    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.value)?)
    }

    /// Take in the result of a conditional read.
    ///
    /// On [`StoreError::Parse`] the local value and token are left as they
    /// were; the caller decides whether to fall back.
    pub fn apply(&mut self, fetched: Fetched) -> StoreResult<Freshness> {
        match fetched {
            Fetched::NotModified(token) => {
                debug!("{} not modified at {}", self.path, token);
                Ok(Freshness::Cached)
            }
            Fetched::Modified { content, token } => {
                let value: T = serde_json::from_slice(&content).map_err(|e| {
                    warn!("Failed to parse {} at {}: {}", self.path, token, e);
                    StoreError::Parse(e.to_string())
                })?;
                self.value = value;
                self.token = Some(token);
                Ok(Freshness::Refreshed)
            }
        }
    }

    /// Record the token returned by a successful write of the local value
    pub fn saved(&mut self, token: VersionToken) {
        self.token = Some(token);
    }

    /// Conditional refresh from the backend
    pub async fn fetch(&mut self) -> StoreResult<Freshness> {
        let fetched = self.remote().fetch().await?;
        self.apply(fetched)
    }

    /// Serialize and write the whole value against the last observed token
    pub async fn save(&mut self, message: &str) -> StoreResult<VersionToken> {
        let content = self.serialize()?;
        let token = self.remote().save(&content, message).await?;
        self.saved(token.clone());
        Ok(token)
    }
}
