//! JSONBin v3 backend
//!
//! A bin holds one JSON record; the document path is the bin id. JSONBin has
//! no notion of a revision id that it checks on write, so the version token
//! is the SHA-256 of the canonical record bytes and `save` enforces it
//! itself: it reads the current digest and refuses to write on mismatch.
//!
//! The digest is always taken over the record as JSONBin returns it, never
//! over the bytes sent: the service re-encodes numbers (`9.0` comes back as
//! `9`), so a digest of the sent bytes would not match the next read.
//!
//! That check-then-write is two requests, not one atomic call. Two writers
//! that both pass the check before either `PUT` lands will still race, and
//! the later `PUT` wins. Only backends with server-side token checks (see
//! [`GitHubStore`](super::GitHubStore)) close that window.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{http_client, Fetched, RemoteStore, StoreError, StoreResult, VersionToken};
use crate::constants::endpoints;

#[derive(Debug, Deserialize)]
struct LatestRecord {
    record: serde_json::Value,
}

pub struct JsonBinStore {
    client: Client,
    api_base: String,
    master_key: String,
}

impl JsonBinStore {
    pub fn new(api_base: &str, master_key: &str, timeout: Duration) -> StoreResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            master_key: master_key.to_string(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("X-Master-Key", &self.master_key)
            .header("Content-Type", "application/json")
    }

    async fn latest(&self, bin_id: &str) -> StoreResult<Vec<u8>> {
        let url = endpoints::jsonbin_latest(&self.api_base, bin_id);
        debug!(%url, "GET latest record");

        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(StoreError::transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(bin_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(StoreError::transport)?;
        let latest: LatestRecord = serde_json::from_str(&body)?;
        Ok(serde_json::to_vec(&sort_keys(latest.record))?)
    }
}

/// Re-serialize a JSON payload so that equal documents hash equally
pub(crate) fn canonicalize(content: &[u8]) -> StoreResult<Vec<u8>> {
    let value: serde_json::Value = serde_json::from_slice(content)?;
    Ok(serde_json::to_vec(&sort_keys(value))?)
}

// Object key order must not depend on serde_json's `preserve_order` feature.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

pub(crate) fn digest(canonical: &[u8]) -> VersionToken {
    VersionToken::new(hex::encode(Sha256::digest(canonical)))
}

#[async_trait]
impl RemoteStore for JsonBinStore {
    fn name(&self) -> &str {
        "jsonbin"
    }

    #[tracing::instrument(level = "debug", skip(self, known))]
    async fn fetch(&self, path: &str, known: Option<&VersionToken>) -> StoreResult<Fetched> {
        let content = self.latest(path).await?;
        let token = digest(&content);
        if known == Some(&token) {
            debug!(%token, "bin {} unchanged", path);
            return Ok(Fetched::NotModified(token));
        }
        info!(%token, bytes = content.len(), "bin {} changed", path);
        Ok(Fetched::Modified { content, token })
    }

    #[tracing::instrument(level = "debug", skip(self, content, expected))]
    async fn save(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        _message: &str,
    ) -> StoreResult<VersionToken> {
        let canonical = canonicalize(content)?;

        let actual = self.current_token(path).await?;
        if actual.as_ref() != expected {
            warn!(
                "Refusing to write bin {}: expected {:?}, remote is {:?}",
                path, expected, actual
            );
            return Err(StoreError::Conflict {
                path: path.to_string(),
                expected: expected.cloned(),
                actual,
            });
        }

        let url = endpoints::jsonbin_bin(&self.api_base, path);
        let response = self
            .request(Method::PUT, &url)
            .body(canonical)
            .send()
            .await
            .map_err(StoreError::transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(StoreError::transport)?;
        let token = match serde_json::from_str::<LatestRecord>(&body) {
            Ok(stored) => digest(&serde_json::to_vec(&sort_keys(stored.record))?),
            Err(e) => {
                debug!("PUT response for bin {} has no record ({}), reading it back", path, e);
                digest(&self.latest(path).await?)
            }
        };
        info!(%token, "Saved bin {}", path);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_ignores_formatting() {
        let pretty = b"{\n  \"anime\": [],\n  \"comments\": []\n}";
        let compact = br#"{"comments":[],"anime":[]}"#;
        assert_eq!(
            digest(&canonicalize(pretty).unwrap()),
            digest(&canonicalize(compact).unwrap())
        );
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = digest(&canonicalize(br#"{"anime":[]}"#).unwrap());
        let b = digest(&canonicalize(br#"{"anime":[{"id":1}]}"#).unwrap());
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_reencoded_numbers_change_the_digest() {
        let sent = digest(&canonicalize(br#"{"rating":9.0}"#).unwrap());
        let echoed = digest(&canonicalize(br#"{"rating":9}"#).unwrap());
        assert_ne!(sent, echoed);
    }

    #[test]
    fn test_canonicalize_rejects_malformed_json() {
        let result = canonicalize(b"{not json");
        assert!(matches!(result, Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_latest_record_deserialization() {
        let json = r#"{
            "record": {"anime": [{"id": 1, "title": "Frieren"}]},
            "metadata": {"id": "68d5bd79", "private": true, "createdAt": "2024-01-01T00:00:00Z"}
        }"#;
        let latest: LatestRecord = serde_json::from_str(json).unwrap();
        assert_eq!(latest.record["anime"][0]["title"], "Frieren");
    }
}
