//! Data models for the AnimeFlow API
//!
//! This module contains the catalog document schema as stored remotely,
//! the request bodies accepted by the API and the response wrappers.
//!
//! Documents written by older clients are accepted as-is: a bare anime array
//! instead of the full object, `judul`/`videoUrl` field names and ids stored
//! as strings. Missing fields default here, once, at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::resolver::{Playback, VideoSource};

// ============================================================================
// Document schema
// ============================================================================

/// The whole remote document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "RawDocument")]
pub struct CatalogDocument {
    pub anime: Vec<Anime>,
    pub comments: Vec<Comment>,
    pub users: Vec<User>,
    pub interactions: Vec<UserInteractions>,
    pub settings: Settings,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDocument {
    Flat(Vec<Anime>),
    Full(DocumentFields),
}

#[derive(Deserialize)]
struct DocumentFields {
    #[serde(default)]
    anime: Vec<Anime>,
    #[serde(default)]
    comments: Vec<Comment>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    interactions: Vec<UserInteractions>,
    #[serde(default)]
    settings: Settings,
}

impl From<RawDocument> for CatalogDocument {
    fn from(raw: RawDocument) -> Self {
        match raw {
            RawDocument::Flat(anime) => CatalogDocument {
                anime,
                ..Default::default()
            },
            RawDocument::Full(fields) => CatalogDocument {
                anime: fields.anime,
                comments: fields.comments,
                users: fields.users,
                interactions: fields.interactions,
                settings: fields.settings,
            },
        }
    }
}

/// Document-level bookkeeping, stamped on every save
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub last_updated: Option<String>,
    pub version: String,
    pub total_anime: usize,
    pub total_comments: usize,
}

/// A catalog entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Anime {
    #[serde(deserialize_with = "flexible::i64")]
    pub id: i64,
    #[serde(alias = "judul", default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "flexible::f64")]
    pub rating: f64,
    #[serde(default, deserialize_with = "flexible::opt_i64")]
    pub year: Option<i64>,
    /// Comma-separated genre list
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Anime {
    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.genre
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(deserialize_with = "flexible::i64")]
    pub id: i64,
    /// Episode number as shown to users
    #[serde(default, deserialize_with = "flexible::opt_i64")]
    pub ep: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "videoUrl", default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub release_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(deserialize_with = "flexible::i64")]
    pub anime_id: i64,
    #[serde(default, deserialize_with = "flexible::opt_i64")]
    pub episode_num: Option<i64>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub user_avatar: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    #[schema(no_recursion)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Comment {
    /// This comment plus all nested replies
    pub fn thread_len(&self) -> usize {
        1 + self.replies.iter().map(Comment::thread_len).sum::<usize>()
    }
}

/// Stored account. Never returned by the API as-is, see [`PublicUser`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub profile_picture: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub profile_picture: String,
    pub created_at: String,
    pub is_admin: bool,
}

impl PublicUser {
    pub fn from_user(user: &User, is_admin: bool) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            profile_picture: user.profile_picture.clone(),
            created_at: user.created_at.clone(),
            is_admin,
        }
    }
}

/// Per-user likes, dislikes and favorites
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInteractions {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub likes: Vec<Reaction>,
    #[serde(default)]
    pub dislikes: Vec<Reaction>,
    #[serde(default)]
    pub favorites: Vec<Favorite>,
    #[serde(default)]
    pub created_at: String,
}

/// A like or dislike on an anime, or on one of its episodes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    #[serde(deserialize_with = "flexible::i64")]
    pub anime_id: i64,
    #[serde(default, deserialize_with = "flexible::opt_i64")]
    pub episode_num: Option<i64>,
    #[serde(default)]
    pub timestamp: String,
}

impl Reaction {
    pub fn targets(&self, anime_id: i64, episode_num: Option<i64>) -> bool {
        self.anime_id == anime_id && self.episode_num == episode_num
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    #[serde(deserialize_with = "flexible::i64")]
    pub anime_id: i64,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Dislike,
    Favorite,
}

/// Interaction counters for one anime or episode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct InteractionStats {
    pub likes: u64,
    pub dislikes: u64,
    pub favorites: u64,
}

/// Lenient number parsing for fields older documents stored as strings
mod flexible {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Int(n) => Ok(n),
            NumberOrString::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            NumberOrString::Float(f) => Err(D::Error::custom(format!("expected an integer, got {}", f))),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("expected an integer, got {:?}", s))),
        }
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(NumberOrString::Int(n)) => Ok(Some(n)),
            Some(NumberOrString::Float(f)) => Ok(Some(f as i64)),
            Some(NumberOrString::Text(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected an integer, got {:?}", s))),
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(0.0),
            Some(NumberOrString::Int(n)) => Ok(n as f64),
            Some(NumberOrString::Float(f)) => Ok(f),
            Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(0.0),
            Some(NumberOrString::Text(s)) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("expected a number, got {:?}", s))),
        }
    }
}

/// Query-string helper: `?episodeNum=` (empty) means "not set"
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Title,
    /// Best match for the search query first
    Relevance,
    Year,
    Rating,
    Episodes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Catalog filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimeFilter {
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub status: Option<String>,
    pub min_rating: Option<f64>,
    /// Episode count range, inclusive
    pub min_episodes: Option<usize>,
    pub max_episodes: Option<usize>,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Request body for creating an anime
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnimeInput {
    #[serde(alias = "judul")]
    pub title: String,
    pub thumbnail: Option<String>,
    pub rating: Option<f64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeInput>,
}

/// Partial update of an anime; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnimePatch {
    #[serde(alias = "judul")]
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub rating: Option<f64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
}

/// Episode fields, used both to create and to patch an episode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInput {
    pub ep: Option<i64>,
    pub title: Option<String>,
    #[serde(alias = "videoUrl")]
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    pub anime_id: i64,
    pub episode_num: Option<i64>,
    pub content: String,
    pub parent_id: Option<String>,
}

/// Request body for user registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Optional avatar URL
    pub profile_picture: Option<String>,
}

/// Request body for user login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub anime_id: i64,
    pub episode_num: Option<i64>,
}

// ============================================================================
// Responses
// ============================================================================

/// Generic API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the operation was successful (always true for this type)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// ISO timestamp of the response
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Create a new successful API response with the current timestamp
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Create a new successful API response with a custom timestamp
    pub fn with_timestamp(data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data,
            timestamp: timestamp.to_rfc3339(),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Whether the operation was successful (always false for errors)
    pub success: bool,
    /// Error message describing what went wrong
    pub error: String,
    /// ISO timestamp of when the error occurred
    pub timestamp: String,
}

impl ApiError {
    /// Create a new API error response with the current timestamp
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Authentication data containing user info and JWT token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user: PublicUser,
    /// JWT access token
    pub token: String,
}

/// Anime with the number of comments posted on it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrendingAnime {
    #[serde(flatten)]
    pub anime: Anime,
    pub comment_count: usize,
}

/// Episode hit of a catalog-wide search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMatch {
    #[serde(flatten)]
    pub episode: Episode,
    pub anime_id: i64,
    pub anime_title: String,
}

/// Anime, episodes and comments matching one query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Ranked by relevance
    pub anime: Vec<Anime>,
    pub episodes: Vec<EpisodeMatch>,
    /// Matching comments and replies, each with its own replies
    pub comments: Vec<Comment>,
}

/// Resolved episode source and how to embed it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    pub anime_id: i64,
    pub episode_id: i64,
    pub source: VideoSource,
    pub playback: Playback,
}

/// Result of toggling a like, dislike or favorite
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InteractionOutcome {
    /// Whether the interaction is set after the toggle
    pub active: bool,
    pub interactions: UserInteractions,
}

/// Where the catalog lives and how fresh the local copy is
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatus {
    pub backend: String,
    pub document_path: String,
    pub version_token: Option<String>,
    pub last_sync: Option<String>,
    /// True while the remote document is unreadable and changes are refused
    pub read_only: bool,
    pub total_anime: usize,
    pub total_comments: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total_anime: usize,
    pub total_episodes: usize,
    pub total_comments: usize,
    pub total_users: usize,
    /// Anime count per release year
    pub by_year: BTreeMap<String, usize>,
    /// Anime count per genre
    pub by_genre: BTreeMap<String, usize>,
}
