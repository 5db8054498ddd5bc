//! GitHub contents API backend
//!
//! The document is a file in a repository. The blob SHA returned by the
//! contents API is the version token, and GitHub itself enforces it on
//! writes: a `PUT` carrying a stale SHA is answered with `409`, and a `PUT`
//! without a SHA for an existing file with `422`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{http_client, Fetched, RemoteStore, StoreError, StoreResult, VersionToken};
use crate::constants::endpoints;

/// Metadata returned by `GET /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

/// Body of `PUT /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: CommittedFile,
}

#[derive(Debug, Deserialize)]
struct CommittedFile {
    sha: String,
}

pub struct GitHubStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
}

impl GitHubStore {
    pub fn new(
        api_base: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        if token.is_none() {
            warn!("GITHUB_TOKEN not set, writes to {}/{} will be rejected", owner, repo);
        }
        Ok(Self {
            client: http_client(timeout)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        endpoints::github_contents(&self.api_base, &self.owner, &self.repo, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Fetch file metadata (including inline base64 content for small files)
    async fn metadata(&self, path: &str) -> StoreResult<Option<ContentsResponse>> {
        let url = self.contents_url(path);
        debug!(%url, "GET contents metadata");

        let response = self
            .request(Method::GET, &url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(StoreError::transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(StoreError::transport)?;
        let metadata: ContentsResponse = serde_json::from_str(&body)?;
        Ok(Some(metadata))
    }

    /// Files above the inline size limit come back with `encoding: "none"`;
    /// their bytes are fetched from `download_url` instead.
    async fn download_raw(&self, url: &str) -> StoreResult<Vec<u8>> {
        debug!(%url, "GET raw file");
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(StoreError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await.map_err(StoreError::transport)?;
        Ok(bytes.to_vec())
    }
}

/// Decode the contents API base64 payload, which is wrapped at 60 columns
pub(crate) fn decode_content(encoded: &str) -> StoreResult<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Parse(format!("Invalid base64 content: {}", e)))
}

/// Map a failed `PUT` response to a store error
fn save_error(
    status: StatusCode,
    body: String,
    path: &str,
    expected: Option<&VersionToken>,
    actual: Option<VersionToken>,
) -> StoreError {
    match status {
        StatusCode::CONFLICT => StoreError::Conflict {
            path: path.to_string(),
            expected: expected.cloned(),
            actual,
        },
        // "sha" wasn't supplied for an existing file
        StatusCode::UNPROCESSABLE_ENTITY if expected.is_none() => StoreError::Conflict {
            path: path.to_string(),
            expected: None,
            actual,
        },
        StatusCode::NOT_FOUND => StoreError::NotFound(path.to_string()),
        _ => StoreError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl RemoteStore for GitHubStore {
    fn name(&self) -> &str {
        "github"
    }

    #[tracing::instrument(level = "debug", skip(self, known), fields(repo = %self.repo))]
    async fn fetch(&self, path: &str, known: Option<&VersionToken>) -> StoreResult<Fetched> {
        let metadata = self
            .metadata(path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        let token = VersionToken::new(metadata.sha);

        if known == Some(&token) {
            debug!(%token, "{} unchanged", path);
            return Ok(Fetched::NotModified(token));
        }

        let inline = metadata
            .content
            .as_deref()
            .filter(|c| !c.is_empty() && metadata.encoding.as_deref() == Some("base64"));

        let content = match (inline, metadata.download_url.as_deref()) {
            (Some(encoded), _) => decode_content(encoded)?,
            (None, Some(url)) => self.download_raw(url).await?,
            (None, None) => {
                return Err(StoreError::Parse(format!(
                    "No content or download URL for {}",
                    path
                )))
            }
        };

        info!(%token, bytes = content.len(), "{} changed, downloaded new revision", path);
        Ok(Fetched::Modified { content, token })
    }

    #[tracing::instrument(level = "debug", skip(self, content, expected), fields(repo = %self.repo))]
    async fn save(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
        message: &str,
    ) -> StoreResult<VersionToken> {
        let url = self.contents_url(path);
        let body = PutContentsRequest {
            message,
            content: STANDARD.encode(content),
            sha: expected.map(VersionToken::as_str),
            branch: &self.branch,
        };

        let response = self
            .request(Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .map_err(StoreError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let actual = if matches!(status, StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY) {
                self.current_token(path).await.ok().flatten()
            } else {
                None
            };
            let err = save_error(status, text, path, expected, actual);
            warn!("Failed to save {}: {}", path, err);
            return Err(err);
        }

        let text = response.text().await.map_err(StoreError::transport)?;
        let committed: PutContentsResponse = serde_json::from_str(&text)?;
        let token = VersionToken::new(committed.content.sha);
        info!(%token, "Saved {}", path);
        Ok(token)
    }

    async fn current_token(&self, path: &str) -> StoreResult<Option<VersionToken>> {
        Ok(self
            .metadata(path)
            .await?
            .map(|metadata| VersionToken::new(metadata.sha)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GitHubStore {
        GitHubStore::new(
            "https://api.github.com/",
            "owner",
            "anime-db",
            "main",
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_contents_url() {
        assert_eq!(
            store().contents_url("database.json"),
            "https://api.github.com/repos/owner/anime-db/contents/database.json"
        );
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let encoded = "eyJhbmltZSI6\nW119\n";
        let decoded = decode_content(encoded).unwrap();
        assert_eq!(decoded, br#"{"anime":[]}"#.to_vec());
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = decode_content("not base64 !!");
        assert!(matches!(result, Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_contents_response_deserialization() {
        let json = r#"{
            "name": "database.json",
            "sha": "3d21ec53a331a6f037a91c368710b99387d012c1",
            "content": "W10=\n",
            "encoding": "base64",
            "download_url": "https://raw.githubusercontent.com/owner/anime-db/main/database.json"
        }"#;
        let metadata: ContentsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.sha, "3d21ec53a331a6f037a91c368710b99387d012c1");
        assert_eq!(metadata.encoding.as_deref(), Some("base64"));
        assert_eq!(decode_content(metadata.content.as_deref().unwrap()).unwrap(), b"[]");
    }

    #[test]
    fn test_put_request_omits_missing_sha() {
        let body = PutContentsRequest {
            message: "create",
            content: STANDARD.encode(b"[]"),
            sha: None,
            branch: "main",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("\"sha\""));
        assert!(json.contains("\"content\":\"W10=\""));
        assert!(json.contains("\"branch\":\"main\""));

        let body = PutContentsRequest {
            sha: Some("abc"),
            ..body
        };
        assert!(serde_json::to_string(&body).unwrap().contains("\"sha\":\"abc\""));
    }

    #[test]
    fn test_save_error_mapping() {
        let stale = VersionToken::new("old");
        let conflict = save_error(
            StatusCode::CONFLICT,
            String::new(),
            "database.json",
            Some(&stale),
            Some(VersionToken::new("new")),
        );
        assert!(matches!(conflict, StoreError::Conflict { expected: Some(_), .. }));

        let missing_sha = save_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            String::new(),
            "database.json",
            None,
            None,
        );
        assert!(matches!(missing_sha, StoreError::Conflict { .. }));

        let invalid = save_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "bad".to_string(),
            "database.json",
            Some(&stale),
            None,
        );
        assert!(matches!(invalid, StoreError::Http { status: 422, .. }));

        let unauthorized = save_error(
            StatusCode::UNAUTHORIZED,
            "Bad credentials".to_string(),
            "database.json",
            Some(&stale),
            None,
        );
        assert!(matches!(unauthorized, StoreError::Http { status: 401, .. }));
    }
}
