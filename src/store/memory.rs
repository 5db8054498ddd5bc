//! In-memory document store.
//!
//! Used for local development (`STORE_BACKEND=memory`) and tests. Tokens are
//! revision counters, so two saves of identical content still produce
//! different tokens. Token checks are strict: a stale or missing token is
//! always a [`StoreError::Conflict`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{Fetched, RemoteStore, StoreError, StoreResult, VersionToken};

pub struct MemoryStore {
    documents: RwLock<HashMap<String, (Vec<u8>, VersionToken)>>,
    revision: AtomicU64,
    failing_saves: AtomicUsize,
    fetches: AtomicUsize,
    save_delay_ms: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            revision: AtomicU64::new(0),
            failing_saves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            save_delay_ms: AtomicU64::new(0),
        }
    }

    /// Create a store pre-populated with documents.
    pub fn with_documents(
        documents: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let mut store = Self::new();
        let mut map = HashMap::new();
        for (path, content) in documents {
            map.insert(path.into(), (content.into(), store.next_token()));
        }
        store.documents = RwLock::new(map);
        store
    }

    /// Make the next `count` saves fail with a transport error.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Make every save take at least `delay`, like a slow network would
    pub fn delay_saves(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.save_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of fetches served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Replace a document out-of-band, as another writer would.
    pub async fn put_external(&self, path: &str, content: impl Into<Vec<u8>>) -> VersionToken {
        let token = self.next_token();
        self.documents
            .write()
            .await
            .insert(path.to_string(), (content.into(), token.clone()));
        token
    }

    /// Raw content of a document, if present
    pub async fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.documents
            .read()
            .await
            .get(path)
            .map(|(content, _)| content.clone())
    }

    fn next_token(&self) -> VersionToken {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        VersionToken::new(format!("rev-{}", revision))
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, path: &str, known: Option<&VersionToken>) -> StoreResult<Fetched> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let documents = self.documents.read().await;
        let (content, token) = documents
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        if known == Some(token) {
            return Ok(Fetched::NotModified(token.clone()));
        }
        Ok(Fetched::Modified {
            content: content.clone(),
            token: token.clone(),
        })
    }

    async fn save(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        _message: &str,
    ) -> StoreResult<VersionToken> {
        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.take_injected_failure() {
            return Err(StoreError::Transport("Injected failure".to_string()));
        }

        let mut documents = self.documents.write().await;
        let actual = documents.get(path).map(|(_, token)| token.clone());
        if actual.as_ref() != expected {
            return Err(StoreError::Conflict {
                path: path.to_string(),
                expected: expected.cloned(),
                actual,
            });
        }

        let token = self.next_token();
        documents.insert(path.to_string(), (content.to_vec(), token.clone()));
        Ok(token)
    }
}
