//! Catalog façade over the remote document
//!
//! [`Catalog`] owns the single in-memory copy of the catalog document. Reads
//! are plain scans over that copy. Every mutation goes through
//! [`Catalog::mutate`]: take the write lock, change the document in memory,
//! stamp the settings, save the whole document, then notify subscribers.
//!
//! A failed save does not roll the in-memory change back. The local copy and
//! the remote document then differ until the next successful save, or until
//! a fetch replaces the local copy.
//!
//! When the remote document exists but can not be parsed at startup, the
//! catalog serves an empty document and refuses every mutation until a sync
//! loads a valid revision. The unreadable remote document is never written
//! over.

mod comments;
mod interactions;

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::constants::catalog::DOCUMENT_VERSION;
use crate::models::{
    Anime, AnimeFilter, AnimeInput, AnimePatch, CatalogDocument, CatalogStats, CatalogStatus,
    Episode, EpisodeInput, PlaybackInfo, SortKey, SortOrder, TrendingAnime,
};
use crate::resolver::{self, PlayerEnvironment};
use crate::store::{Freshness, RemoteDocument, RemoteStore, StoreError};

mod search;

const EVENT_CAPACITY: usize = 64;

/// Errors returned by catalog operations
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Missing or invalid input, never retried
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The actor may not perform this operation
    #[error("{0}")]
    Forbidden(String),

    /// Mutations are refused while the remote document is unreadable
    #[error("Catalog is read-only: {0}")]
    ReadOnly(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Who is performing a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub username: String,
    pub is_admin: bool,
}

/// Change notifications published after a successful save (or refresh)
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    /// The document was replaced by a newer remote revision
    Synced,
    AnimeAdded { anime_id: i64 },
    AnimeUpdated { anime_id: i64 },
    AnimeDeleted { anime_id: i64, comments_removed: usize },
    EpisodesChanged { anime_id: i64 },
    CommentAdded { anime_id: i64, comment_id: String },
    CommentDeleted { comment_id: String },
    CommentLiked { comment_id: String },
    UserRegistered { username: String },
    InteractionsChanged { user_id: String },
    Imported,
}

struct CatalogState {
    document: RemoteDocument<CatalogDocument>,
    last_sync: Option<DateTime<Utc>>,
    /// Set while the document in memory is a fallback for an unreadable remote
    read_only: Option<String>,
}

pub struct Catalog {
    state: RwLock<CatalogState>,
    /// Held by mutations and syncs for their whole duration, network calls
    /// included. The state lock is only taken around in-memory work.
    writer: Mutex<()>,
    events: broadcast::Sender<CatalogEvent>,
}

impl Catalog {
    /// Load the catalog document from the store.
    ///
    /// A missing document starts an empty catalog that is created on the
    /// first save. A malformed document is logged and an empty, read-only
    /// catalog is served instead. Transport and HTTP failures are returned.
    pub async fn open(store: Arc<dyn RemoteStore>, path: &str) -> CatalogResult<Self> {
        let mut document: RemoteDocument<CatalogDocument> = RemoteDocument::new(store, path);
        let backend = document.store().name().to_string();
        let mut read_only = None;

        match document.fetch().await {
            Ok(_) => info!(
                "Loaded {} from {} ({} anime, {} comments)",
                path,
                backend,
                document.value().anime.len(),
                document.value().comments.len()
            ),
            Err(StoreError::NotFound(_)) => {
                info!("{} not found on {}, starting with an empty catalog", path, backend)
            }
            Err(StoreError::Parse(e)) => {
                warn!(
                    "{} on {} is malformed, serving an empty read-only catalog: {}",
                    path, backend, e
                );
                read_only = Some(format!("{} on {} is malformed: {}", path, backend, e));
            }
            Err(e) => return Err(e.into()),
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            state: RwLock::new(CatalogState {
                document,
                last_sync: Some(Utc::now()),
                read_only,
            }),
            writer: Mutex::new(()),
            events,
        })
    }

    /// Receive change notifications. Slow receivers may miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    async fn read<R>(&self, f: impl FnOnce(&CatalogDocument) -> R) -> R {
        let state = self.state.read().await;
        f(state.document.value())
    }

    /// The single mutation entry point.
    ///
    /// `change` must validate before it modifies anything: an `Err` from it
    /// aborts without saving. Once it succeeds the change stays in memory
    /// whether or not the save does. On a version conflict the document is
    /// reloaded from the store, dropping the change, and the conflict is
    /// returned so the caller can redo it.
    ///
    /// Readers see the change as soon as it is applied, while the save is
    /// still in flight.
    async fn mutate<R, F>(&self, message: String, change: F) -> CatalogResult<R>
    where
        F: FnOnce(&mut CatalogDocument) -> CatalogResult<(R, CatalogEvent)>,
    {
        let _writer = self.writer.lock().await;

        let (result, event, content, remote) = {
            let mut state = self.state.write().await;
            if let Some(reason) = &state.read_only {
                return Err(CatalogError::ReadOnly(reason.clone()));
            }
            let (result, event) = change(state.document.value_mut())?;
            stamp_settings(state.document.value_mut());
            let content = state.document.serialize()?;
            (result, event, content, state.document.remote())
        };

        match remote.save(&content, &message).await {
            Ok(token) => {
                debug!(%token, "{}", message);
                self.state.write().await.document.saved(token);
                let _ = self.events.send(event);
                Ok(result)
            }
            Err(err @ StoreError::Conflict { .. }) => {
                warn!("{} rejected: {}", message, err);
                if let Err(e) = self.refresh().await {
                    warn!("Reload after conflict failed: {}", e);
                }
                Err(err.into())
            }
            Err(err) => {
                error!("Failed to save ({}), local change kept: {}", message, err);
                Err(err.into())
            }
        }
    }

    /// Fetch outside the state lock, then apply. Callers hold `writer`.
    async fn refresh(&self) -> CatalogResult<Freshness> {
        let remote = self.state.read().await.document.remote();
        let fetched = remote.fetch().await?;

        let mut state = self.state.write().await;
        let freshness = state.document.apply(fetched)?;
        state.last_sync = Some(Utc::now());
        if state.read_only.take().is_some() {
            info!("Catalog document is readable again, accepting changes");
        }
        if freshness == Freshness::Refreshed {
            info!("Catalog refreshed to {:?}", state.document.token());
            let _ = self.events.send(CatalogEvent::Synced);
        }
        Ok(freshness)
    }

    // ========================================================================
    // Sync, export and import
    // ========================================================================

    /// Refresh from the store. A malformed remote document is reported and
    /// the current in-memory copy is kept.
    pub async fn sync(&self) -> CatalogResult<Freshness> {
        let _writer = self.writer.lock().await;
        self.refresh().await
    }

    /// Snapshot of the whole document
    pub async fn export(&self) -> CatalogDocument {
        self.read(|doc| doc.clone()).await
    }

    /// Replace the catalog with an imported document.
    ///
    /// The import must carry an `anime` array. Users and interactions are
    /// kept when the import does not include them.
    pub async fn import(&self, value: serde_json::Value) -> CatalogResult<CatalogStats> {
        if !value.get("anime").is_some_and(|anime| anime.is_array()) {
            return Err(CatalogError::Validation(
                "Import must contain an \"anime\" array".to_string(),
            ));
        }
        let keep_users = value.get("users").is_none();
        let keep_interactions = value.get("interactions").is_none();
        let imported: CatalogDocument = serde_json::from_value(value)
            .map_err(|e| CatalogError::Validation(format!("Invalid catalog document: {}", e)))?;

        let message = format!("Import catalog ({} anime)", imported.anime.len());
        self.mutate(message, move |doc| {
            let mut next = imported;
            if keep_users {
                next.users = std::mem::take(&mut doc.users);
            }
            if keep_interactions {
                next.interactions = std::mem::take(&mut doc.interactions);
            }
            *doc = next;
            Ok((compute_stats(doc), CatalogEvent::Imported))
        })
        .await
    }

    pub async fn stats(&self) -> CatalogStats {
        self.read(compute_stats).await
    }

    pub async fn status(&self) -> CatalogStatus {
        let state = self.state.read().await;
        let doc = state.document.value();
        CatalogStatus {
            backend: state.document.store().name().to_string(),
            document_path: state.document.path().to_string(),
            version_token: state.document.token().map(ToString::to_string),
            last_sync: state.last_sync.map(|t| t.to_rfc3339()),
            read_only: state.read_only.is_some(),
            total_anime: doc.anime.len(),
            total_comments: doc.comments.iter().map(|c| c.thread_len()).sum(),
        }
    }

    // ========================================================================
    // Anime
    // ========================================================================

    pub async fn all(&self) -> Vec<Anime> {
        self.read(|doc| doc.anime.clone()).await
    }

    pub async fn by_id(&self, id: i64) -> CatalogResult<Anime> {
        self.read(|doc| find_anime(doc, id).cloned()).await
    }

    /// Case-insensitive match on title, genre and description.
    /// A blank query matches nothing.
    pub async fn search(&self, query: &str) -> Vec<Anime> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.read(|doc| {
            doc.anime
                .iter()
                .filter(|anime| matches_query(anime, &needle))
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn filter(&self, filter: &AnimeFilter) -> Vec<Anime> {
        self.read(|doc| {
            doc.anime
                .iter()
                .filter(|anime| matches_filter(anime, filter))
                .cloned()
                .collect()
        })
        .await
    }

    /// Search (when `query` is given), filter and sort in one pass.
    /// Without an explicit sort, query results are ranked by relevance.
    pub async fn list(
        &self,
        query: Option<&str>,
        filter: &AnimeFilter,
        sort: Option<(SortKey, SortOrder)>,
    ) -> Vec<Anime> {
        let needle = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        let mut anime: Vec<Anime> = self
            .read(|doc| {
                doc.anime
                    .iter()
                    .filter(|a| needle.as_deref().map_or(true, |n| matches_query(a, n)))
                    .filter(|a| matches_filter(a, filter))
                    .cloned()
                    .collect()
            })
            .await;
        let sort = sort.or_else(|| {
            needle
                .as_ref()
                .map(|_| (SortKey::Relevance, SortOrder::Desc))
        });
        if let Some((key, order)) = sort {
            sort_by_key(&mut anime, key, order, needle.as_deref().unwrap_or_default());
        }
        anime
    }

    /// Most commented anime first
    pub async fn trending(&self, limit: usize) -> Vec<TrendingAnime> {
        self.read(|doc| {
            let mut trending: Vec<TrendingAnime> = doc
                .anime
                .iter()
                .map(|anime| TrendingAnime {
                    comment_count: doc
                        .comments
                        .iter()
                        .filter(|c| c.anime_id == anime.id)
                        .map(|c| c.thread_len())
                        .sum(),
                    anime: anime.clone(),
                })
                .collect();
            trending.sort_by(|a, b| {
                b.comment_count
                    .cmp(&a.comment_count)
                    .then_with(|| b.anime.rating.total_cmp(&a.anime.rating))
            });
            trending.truncate(limit);
            trending
        })
        .await
    }

    /// Most recently added anime first
    pub async fn recent(&self, limit: usize) -> Vec<Anime> {
        let mut anime = self.all().await;
        sort_anime(&mut anime, SortKey::CreatedAt, SortOrder::Desc);
        anime.truncate(limit);
        anime
    }

    pub async fn add_anime(&self, input: AnimeInput) -> CatalogResult<Anime> {
        let title = required_text(&input.title, "Title")?;
        validate_rating(input.rating)?;

        self.mutate(format!("Add anime: {}", title), move |doc| {
            let now = timestamp();
            let mut anime = Anime {
                id: next_id(doc.anime.iter().map(|a| a.id))?,
                title,
                thumbnail: input.thumbnail.unwrap_or_default(),
                rating: input.rating.unwrap_or_default(),
                year: input.year,
                genre: input.genre.unwrap_or_default(),
                status: input.status.unwrap_or_default(),
                description: input.description.unwrap_or_default(),
                episodes: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            };
            for episode in input.episodes {
                let episode = new_episode(&anime.episodes, episode)?;
                anime.episodes.push(episode);
            }
            doc.anime.push(anime.clone());
            let event = CatalogEvent::AnimeAdded { anime_id: anime.id };
            Ok((anime, event))
        })
        .await
    }

    /// Apply a partial update; the id never changes
    pub async fn update_anime(&self, id: i64, patch: AnimePatch) -> CatalogResult<Anime> {
        let title = match &patch.title {
            Some(title) => Some(required_text(title, "Title")?),
            None => None,
        };
        validate_rating(patch.rating)?;

        self.mutate(format!("Update anime {}", id), move |doc| {
            let anime = find_anime_mut(doc, id)?;
            if let Some(title) = title {
                anime.title = title;
            }
            if let Some(thumbnail) = patch.thumbnail {
                anime.thumbnail = thumbnail;
            }
            if let Some(rating) = patch.rating {
                anime.rating = rating;
            }
            if patch.year.is_some() {
                anime.year = patch.year;
            }
            if let Some(genre) = patch.genre {
                anime.genre = genre;
            }
            if let Some(status) = patch.status {
                anime.status = status;
            }
            if let Some(description) = patch.description {
                anime.description = description;
            }
            anime.updated_at = timestamp();
            Ok((anime.clone(), CatalogEvent::AnimeUpdated { anime_id: id }))
        })
        .await
    }

    /// Delete an anime together with its comments
    pub async fn delete_anime(&self, id: i64) -> CatalogResult<Anime> {
        self.mutate(format!("Delete anime {}", id), move |doc| {
            let index = doc
                .anime
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| anime_not_found(id))?;
            let removed = doc.anime.remove(index);
            let before = doc.comments.len();
            doc.comments.retain(|c| c.anime_id != id);
            let comments_removed = before - doc.comments.len();
            Ok((
                removed,
                CatalogEvent::AnimeDeleted {
                    anime_id: id,
                    comments_removed,
                },
            ))
        })
        .await
    }

    // ========================================================================
    // Episodes
    // ========================================================================

    pub async fn episodes(&self, anime_id: i64) -> CatalogResult<Vec<Episode>> {
        self.read(|doc| find_anime(doc, anime_id).map(|a| a.episodes.clone()))
            .await
    }

    pub async fn episode(&self, anime_id: i64, episode_id: i64) -> CatalogResult<Episode> {
        self.read(|doc| find_episode(find_anime(doc, anime_id)?, episode_id).cloned())
            .await
    }

    pub async fn add_episode(&self, anime_id: i64, input: EpisodeInput) -> CatalogResult<Episode> {
        self.mutate(format!("Add episode to anime {}", anime_id), move |doc| {
            let anime = find_anime_mut(doc, anime_id)?;
            let episode = new_episode(&anime.episodes, input)?;
            anime.episodes.push(episode.clone());
            anime.updated_at = timestamp();
            Ok((episode, CatalogEvent::EpisodesChanged { anime_id }))
        })
        .await
    }

    pub async fn update_episode(
        &self,
        anime_id: i64,
        episode_id: i64,
        input: EpisodeInput,
    ) -> CatalogResult<Episode> {
        let message = format!("Update episode {} of anime {}", episode_id, anime_id);
        self.mutate(message, move |doc| {
            let anime = find_anime_mut(doc, anime_id)?;
            let episode = anime
                .episodes
                .iter_mut()
                .find(|e| e.id == episode_id)
                .ok_or_else(|| episode_not_found(episode_id))?;
            if input.ep.is_some() {
                episode.ep = input.ep;
            }
            if let Some(title) = input.title {
                episode.title = title;
            }
            if let Some(url) = input.url {
                let url = url.trim().to_string();
                episode.url = (!url.is_empty()).then_some(url);
            }
            if let Some(thumbnail) = input.thumbnail {
                episode.thumbnail = thumbnail;
            }
            if let Some(duration) = input.duration {
                episode.duration = duration;
            }
            if let Some(release_date) = input.release_date {
                episode.release_date = release_date;
            }
            let updated = episode.clone();
            anime.updated_at = timestamp();
            Ok((updated, CatalogEvent::EpisodesChanged { anime_id }))
        })
        .await
    }

    pub async fn delete_episode(&self, anime_id: i64, episode_id: i64) -> CatalogResult<Episode> {
        let message = format!("Delete episode {} of anime {}", episode_id, anime_id);
        self.mutate(message, move |doc| {
            let anime = find_anime_mut(doc, anime_id)?;
            let index = anime
                .episodes
                .iter()
                .position(|e| e.id == episode_id)
                .ok_or_else(|| episode_not_found(episode_id))?;
            let removed = anime.episodes.remove(index);
            anime.updated_at = timestamp();
            Ok((removed, CatalogEvent::EpisodesChanged { anime_id }))
        })
        .await
    }

    /// Resolve an episode's URL and pick its embedding
    pub async fn playback(
        &self,
        anime_id: i64,
        episode_id: i64,
        env: &PlayerEnvironment,
    ) -> CatalogResult<PlaybackInfo> {
        let episode = self.episode(anime_id, episode_id).await?;
        let source = resolver::resolve(episode.url.as_deref());
        let playback = resolver::embed(&source, env);
        Ok(PlaybackInfo {
            anime_id,
            episode_id,
            source,
            playback,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// JavaScript-style ISO timestamp, e.g. `2024-05-01T12:00:00.000Z`
pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Millisecond clock, bumped past the largest existing id
pub(crate) fn next_id(existing: impl Iterator<Item = i64>) -> CatalogResult<i64> {
    let max = existing.max().unwrap_or(0);
    let after = successor(max, "id")?;
    Ok(Utc::now().timestamp_millis().max(after))
}

fn successor(value: i64, what: &str) -> CatalogResult<i64> {
    value.checked_add(1).ok_or_else(|| {
        CatalogError::Validation(format!("No {} left after {}", what, value))
    })
}

fn stamp_settings(doc: &mut CatalogDocument) {
    doc.settings.last_updated = Some(timestamp());
    doc.settings.version = DOCUMENT_VERSION.to_string();
    doc.settings.total_anime = doc.anime.len();
    doc.settings.total_comments = doc.comments.iter().map(|c| c.thread_len()).sum();
}

fn required_text(value: &str, field: &str) -> CatalogResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CatalogError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn validate_rating(rating: Option<f64>) -> CatalogResult<()> {
    match rating {
        Some(r) if !(0.0..=10.0).contains(&r) => Err(CatalogError::Validation(
            "Rating must be between 0 and 10".to_string(),
        )),
        _ => Ok(()),
    }
}

fn anime_not_found(id: i64) -> CatalogError {
    CatalogError::NotFound(format!("Anime {}", id))
}

fn episode_not_found(id: i64) -> CatalogError {
    CatalogError::NotFound(format!("Episode {}", id))
}

fn find_anime(doc: &CatalogDocument, id: i64) -> CatalogResult<&Anime> {
    doc.anime
        .iter()
        .find(|a| a.id == id)
        .ok_or_else(|| anime_not_found(id))
}

fn find_anime_mut(doc: &mut CatalogDocument, id: i64) -> CatalogResult<&mut Anime> {
    doc.anime
        .iter_mut()
        .find(|a| a.id == id)
        .ok_or_else(|| anime_not_found(id))
}

fn find_episode(anime: &Anime, id: i64) -> CatalogResult<&Episode> {
    anime
        .episodes
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| episode_not_found(id))
}

fn new_episode(existing: &[Episode], input: EpisodeInput) -> CatalogResult<Episode> {
    let number = match input.ep {
        Some(number) => number,
        None => successor(
            existing.iter().filter_map(|e| e.ep).max().unwrap_or(0),
            "episode number",
        )?,
    };
    Ok(Episode {
        id: next_id(existing.iter().map(|e| e.id))?,
        ep: Some(number),
        title: input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Episode {}", number)),
        url: input
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty()),
        thumbnail: input.thumbnail.unwrap_or_default(),
        duration: input.duration.unwrap_or_default(),
        release_date: input.release_date.unwrap_or_default(),
    })
}

fn matches_query(anime: &Anime, needle: &str) -> bool {
    anime.title.to_lowercase().contains(needle)
        || anime.genre.to_lowercase().contains(needle)
        || anime.description.to_lowercase().contains(needle)
}

fn matches_filter(anime: &Anime, filter: &AnimeFilter) -> bool {
    if filter.year.is_some() && anime.year != filter.year {
        return false;
    }
    if let Some(genre) = &filter.genre {
        if !anime.genres().any(|g| g.eq_ignore_ascii_case(genre.trim())) {
            return false;
        }
    }
    if let Some(status) = &filter.status {
        if !anime.status.eq_ignore_ascii_case(status.trim()) {
            return false;
        }
    }
    if let Some(min) = filter.min_rating {
        if anime.rating < min {
            return false;
        }
    }
    let count = anime.episodes.len();
    if filter.min_episodes.is_some_and(|min| count < min)
        || filter.max_episodes.is_some_and(|max| count > max)
    {
        return false;
    }
    true
}

/// Stable sort; strings compare case-insensitively. Relevance without a
/// query only weighs rating and episode count.
pub fn sort_anime(anime: &mut [Anime], key: SortKey, order: SortOrder) {
    sort_by_key(anime, key, order, "");
}

fn sort_by_key(anime: &mut [Anime], key: SortKey, order: SortOrder, needle: &str) {
    anime.sort_by(|a, b| {
        let ordering = match key {
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::Relevance => search::relevance_score(a, needle)
                .total_cmp(&search::relevance_score(b, needle)),
            SortKey::Year => a.year.cmp(&b.year),
            SortKey::Rating => a.rating.total_cmp(&b.rating),
            SortKey::Episodes => a.episodes.len().cmp(&b.episodes.len()),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compute_stats(doc: &CatalogDocument) -> CatalogStats {
    let mut by_year = BTreeMap::new();
    let mut by_genre = BTreeMap::new();
    for anime in &doc.anime {
        let year = anime
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        *by_year.entry(year).or_insert(0) += 1;
        for genre in anime.genres() {
            *by_genre.entry(genre.to_string()).or_insert(0) += 1;
        }
    }
    CatalogStats {
        total_anime: doc.anime.len(),
        total_episodes: doc.anime.iter().map(|a| a.episodes.len()).sum(),
        total_comments: doc.comments.iter().map(|c| c.thread_len()).sum(),
        total_users: doc.users.len(),
        by_year,
        by_genre,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{PlayerCapabilities, VideoSource};
    use crate::store::MemoryStore;
    use std::cmp::Ordering;

    const PATH: &str = "database.json";

    fn seeded() -> Arc<MemoryStore> {
        let doc = serde_json::json!({
            "anime": [
                {"id": 1, "title": "Frieren", "rating": 9.1, "year": 2023,
                 "genre": "Adventure, Fantasy", "status": "Completed",
                 "description": "An elf mage outlives her party",
                 "createdAt": "2024-01-01T00:00:00.000Z",
                 "episodes": [{"id": 1, "ep": 1, "url": "https://youtu.be/dQw4w9WgXcQ"}]},
                {"id": 2, "title": "bocchi the rock", "rating": 8.8, "year": 2022,
                 "genre": "Music, Comedy", "status": "Completed",
                 "createdAt": "2024-03-01T00:00:00.000Z"},
                {"id": 3, "title": "Dungeon Meshi", "rating": 8.5, "year": 2024,
                 "genre": "Fantasy, Comedy", "status": "Ongoing",
                 "createdAt": "2024-02-01T00:00:00.000Z"}
            ],
            "comments": [
                {"id": "c1", "username": "aya", "animeId": 3, "content": "tasty"},
                {"id": "c2", "username": "ren", "animeId": 3, "content": "agreed"},
                {"id": "c3", "username": "ren", "animeId": 1, "content": "sad"}
            ]
        });
        Arc::new(MemoryStore::with_documents([(
            PATH,
            serde_json::to_vec(&doc).unwrap(),
        )]))
    }

    async fn open(store: &Arc<MemoryStore>) -> Catalog {
        Catalog::open(store.clone(), PATH).await.unwrap()
    }

    async fn saved(store: &MemoryStore) -> CatalogDocument {
        serde_json::from_slice(&store.content(PATH).await.unwrap()).unwrap()
    }

    fn input(title: &str) -> AnimeInput {
        AnimeInput {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_missing_document_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        let catalog = open(&store).await;
        assert!(catalog.all().await.is_empty());

        catalog.add_anime(input("Frieren")).await.unwrap();
        assert_eq!(saved(&store).await.anime.len(), 1);
    }

    #[tokio::test]
    async fn test_open_malformed_document_falls_back_to_default() {
        let store = Arc::new(MemoryStore::with_documents([(PATH, b"{oops".to_vec())]));
        let catalog = open(&store).await;
        assert!(catalog.all().await.is_empty());
        let status = catalog.status().await;
        assert_eq!(status.version_token, None);
        assert!(status.read_only);
    }

    #[tokio::test]
    async fn test_unreadable_remote_is_never_written_over() {
        // the second entry has no id, so the whole document fails to parse
        let remote = serde_json::to_vec(&serde_json::json!({"anime": [
            {"id": 1, "title": "Frieren"},
            {"title": "Mushishi"}
        ]}))
        .unwrap();
        let store = Arc::new(MemoryStore::with_documents([(PATH, remote.clone())]));
        let catalog = open(&store).await;

        let result = catalog.add_anime(input("New")).await;
        assert!(matches!(result, Err(CatalogError::ReadOnly(_))));
        let result = catalog
            .import(serde_json::json!({"anime": [{"id": 5, "title": "Imported"}]}))
            .await;
        assert!(matches!(result, Err(CatalogError::ReadOnly(_))));

        assert_eq!(store.content(PATH).await.unwrap(), remote);
        assert!(catalog.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_after_remote_repair_accepts_changes_again() {
        let store = Arc::new(MemoryStore::with_documents([(PATH, b"{oops".to_vec())]));
        let catalog = open(&store).await;

        // still broken: sync reports it and nothing changes
        assert!(matches!(
            catalog.sync().await,
            Err(CatalogError::Store(StoreError::Parse(_)))
        ));
        assert!(catalog.status().await.read_only);

        let repaired = serde_json::json!({"anime": [{"id": 1, "title": "Frieren"}]});
        store
            .put_external(PATH, serde_json::to_vec(&repaired).unwrap())
            .await;
        assert_eq!(catalog.sync().await.unwrap(), Freshness::Refreshed);
        assert!(!catalog.status().await.read_only);

        catalog.add_anime(input("Mushishi")).await.unwrap();
        let titles: Vec<_> = saved(&store).await.anime.into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Frieren", "Mushishi"]);
    }

    #[tokio::test]
    async fn test_reads_are_served_while_a_save_is_in_flight() {
        let store = seeded();
        let catalog = Arc::new(open(&store).await);
        store.delay_saves(std::time::Duration::from_millis(300));

        let writer = {
            let catalog = catalog.clone();
            tokio::spawn(async move { catalog.add_anime(input("Mushishi")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let read = tokio::time::timeout(std::time::Duration::from_millis(100), catalog.all()).await;
        let anime = read.expect("read blocked behind the save");
        assert!(anime.iter().any(|a| a.title == "Mushishi"));

        writer.await.unwrap().unwrap();
        assert_eq!(saved(&store).await.anime.len(), 4);
    }

    #[tokio::test]
    async fn test_search_and_filter() {
        let store = seeded();
        let catalog = open(&store).await;

        let found = catalog.search("FANTASY").await;
        assert_eq!(found.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 3]);
        assert!(catalog.search("   ").await.is_empty());
        assert_eq!(catalog.search("elf").await[0].id, 1);

        let comedy = catalog
            .filter(&AnimeFilter {
                genre: Some("comedy".to_string()),
                min_rating: Some(8.6),
                ..Default::default()
            })
            .await;
        assert_eq!(comedy.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2]);

        let ongoing = catalog
            .filter(&AnimeFilter {
                status: Some("ongoing".to_string()),
                year: Some(2024),
                ..Default::default()
            })
            .await;
        assert_eq!(ongoing.len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorts_case_insensitively() {
        let store = seeded();
        let catalog = open(&store).await;

        let by_title = catalog
            .list(None, &AnimeFilter::default(), Some((SortKey::Title, SortOrder::Asc)))
            .await;
        let titles: Vec<_> = by_title.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["bocchi the rock", "Dungeon Meshi", "Frieren"]);

        let by_rating = catalog
            .list(
                Some("comedy"),
                &AnimeFilter::default(),
                Some((SortKey::Rating, SortOrder::Desc)),
            )
            .await;
        assert_eq!(by_rating.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_trending_and_recent() {
        let store = seeded();
        let catalog = open(&store).await;

        let trending = catalog.trending(2).await;
        assert_eq!(trending[0].anime.id, 3);
        assert_eq!(trending[0].comment_count, 2);
        assert_eq!(trending[1].anime.id, 1);

        let recent = catalog.recent(10).await;
        assert_eq!(recent.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_add_anime_assigns_ids_and_persists() {
        let store = seeded();
        let catalog = open(&store).await;
        let mut events = catalog.subscribe();

        let anime = catalog
            .add_anime(AnimeInput {
                title: "  Mushishi ".to_string(),
                rating: Some(9.0),
                episodes: vec![EpisodeInput::default(), EpisodeInput::default()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(anime.title, "Mushishi");
        assert!(anime.id > 3);
        assert_eq!(anime.episodes[0].ep, Some(1));
        assert_eq!(anime.episodes[1].ep, Some(2));
        assert_ne!(anime.episodes[0].id, anime.episodes[1].id);
        assert_eq!(anime.episodes[1].title, "Episode 2");

        let doc = saved(&store).await;
        assert_eq!(doc.anime.len(), 4);
        assert_eq!(doc.settings.total_anime, 4);
        assert_eq!(doc.settings.version, DOCUMENT_VERSION);
        assert_eq!(
            events.recv().await.unwrap(),
            CatalogEvent::AnimeAdded { anime_id: anime.id }
        );
    }

    #[tokio::test]
    async fn test_add_anime_validation() {
        let store = seeded();
        let catalog = open(&store).await;

        let result = catalog.add_anime(input("  ")).await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));

        let result = catalog
            .add_anime(AnimeInput {
                rating: Some(11.0),
                ..input("Too good")
            })
            .await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));
        assert_eq!(catalog.all().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_local_change() {
        let store = seeded();
        let catalog = open(&store).await;

        store.fail_next_saves(1);
        let result = catalog.add_anime(input("Mushishi")).await;
        assert!(matches!(
            result,
            Err(CatalogError::Store(StoreError::Transport(_)))
        ));

        // not rolled back locally, not persisted remotely
        assert!(catalog.all().await.iter().any(|a| a.title == "Mushishi"));
        assert_eq!(saved(&store).await.anime.len(), 3);

        // the next successful save carries it along
        catalog.add_anime(input("Kaiba")).await.unwrap();
        let titles: Vec<_> = saved(&store).await.anime.into_iter().map(|a| a.title).collect();
        assert!(titles.contains(&"Mushishi".to_string()));
        assert!(titles.contains(&"Kaiba".to_string()));
    }

    #[tokio::test]
    async fn test_conflict_reloads_and_redo_succeeds() {
        let store = seeded();
        let catalog = open(&store).await;

        let external = serde_json::json!({"anime": [{"id": 9, "title": "Made elsewhere"}]});
        store
            .put_external(PATH, serde_json::to_vec(&external).unwrap())
            .await;

        let result = catalog.add_anime(input("Mushishi")).await;
        assert!(matches!(
            result,
            Err(CatalogError::Store(StoreError::Conflict { .. }))
        ));
        // reloaded: the remote revision replaced the unsaved change
        let titles: Vec<_> = catalog.all().await.into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Made elsewhere"]);

        catalog.add_anime(input("Mushishi")).await.unwrap();
        assert_eq!(saved(&store).await.anime.len(), 2);
    }

    #[tokio::test]
    async fn test_update_anime_merges_patch() {
        let store = seeded();
        let catalog = open(&store).await;

        let updated = catalog
            .update_anime(
                2,
                AnimePatch {
                    status: Some("Ongoing".to_string()),
                    rating: Some(9.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, 2);
        assert_eq!(updated.title, "bocchi the rock");
        assert_eq!(updated.status, "Ongoing");
        assert!(!updated.updated_at.is_empty());

        let missing = catalog.update_anime(42, AnimePatch::default()).await;
        assert!(matches!(missing, Err(CatalogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_anime_cascades_comments() {
        let store = seeded();
        let catalog = open(&store).await;

        catalog.delete_anime(3).await.unwrap();
        let doc = saved(&store).await;
        assert_eq!(doc.anime.len(), 2);
        assert_eq!(doc.comments.len(), 1);
        assert!(doc.comments.iter().all(|c| c.anime_id != 3));

        assert!(matches!(
            catalog.delete_anime(3).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_episode_crud() {
        let store = seeded();
        let catalog = open(&store).await;

        let episode = catalog
            .add_episode(
                2,
                EpisodeInput {
                    url: Some(" https://cdn.example.com/bocchi-1.mp4 ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(episode.ep, Some(1));
        assert_eq!(episode.url.as_deref(), Some("https://cdn.example.com/bocchi-1.mp4"));

        let updated = catalog
            .update_episode(
                2,
                episode.id,
                EpisodeInput {
                    title: Some("Lonely Rolling Bocchi".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Lonely Rolling Bocchi");
        assert_eq!(updated.url, episode.url);
        assert_eq!(catalog.episodes(2).await.unwrap().len(), 1);

        catalog.delete_episode(2, episode.id).await.unwrap();
        assert!(catalog.episodes(2).await.unwrap().is_empty());
        assert!(matches!(
            catalog.episode(2, episode.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_playback_resolves_episode_url() {
        let store = Arc::new(MemoryStore::with_documents([(
            PATH,
            br#"{"anime":[{"id":1,"episodes":[{"id":1,"url":"https://youtu.be/dQw4w9WgXcQ"}]}]}"#
                .to_vec(),
        )]));
        let catalog = open(&store).await;
        let env = PlayerEnvironment {
            capabilities: PlayerCapabilities::default(),
            parent_host: "localhost".to_string(),
        };

        let info = catalog.playback(1, 1, &env).await.unwrap();
        assert_eq!(
            info.source,
            VideoSource::Youtube {
                id: "dQw4w9WgXcQ".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_sync_picks_up_remote_changes() {
        let store = seeded();
        let catalog = open(&store).await;
        let mut events = catalog.subscribe();

        assert_eq!(catalog.sync().await.unwrap(), Freshness::Cached);

        store
            .put_external(PATH, br#"[{"id": 7, "judul": "Legacy"}]"#.to_vec())
            .await;
        assert_eq!(catalog.sync().await.unwrap(), Freshness::Refreshed);
        assert_eq!(catalog.all().await[0].title, "Legacy");
        assert_eq!(events.recv().await.unwrap(), CatalogEvent::Synced);
    }

    #[tokio::test]
    async fn test_sync_parse_error_keeps_current_document() {
        let store = seeded();
        let catalog = open(&store).await;

        store.put_external(PATH, b"not json".to_vec()).await;
        let result = catalog.sync().await;
        assert!(matches!(result, Err(CatalogError::Store(StoreError::Parse(_)))));
        assert_eq!(catalog.all().await.len(), 3);
    }

    #[tokio::test]
    async fn test_import_requires_anime_array() {
        let store = seeded();
        let catalog = open(&store).await;

        let result = catalog.import(serde_json::json!({"comments": []})).await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));
        let result = catalog.import(serde_json::json!({"anime": {}})).await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));

        let stats = catalog
            .import(serde_json::json!({"anime": [{"id": 1, "title": "Only"}]}))
            .await
            .unwrap();
        assert_eq!(stats.total_anime, 1);
        assert_eq!(stats.total_comments, 0);
        assert_eq!(saved(&store).await.anime[0].title, "Only");
    }

    #[tokio::test]
    async fn test_stats() {
        let store = seeded();
        let catalog = open(&store).await;

        let stats = catalog.stats().await;
        assert_eq!(stats.total_anime, 3);
        assert_eq!(stats.total_episodes, 1);
        assert_eq!(stats.total_comments, 3);
        assert_eq!(stats.by_year.get("2023"), Some(&1));
        assert_eq!(stats.by_genre.get("Comedy"), Some(&2));
        assert_eq!(stats.by_genre.get("Fantasy"), Some(&2));
    }

    #[test]
    fn test_next_id_is_monotonic() {
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        assert_eq!(next_id([1, far_future].into_iter()).unwrap(), far_future + 1);
        assert!(next_id(std::iter::empty()).unwrap() >= Utc::now().timestamp_millis() - 1000);
    }

    #[test]
    fn test_next_id_refuses_to_overflow() {
        let result = next_id([3, i64::MAX].into_iter());
        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    #[tokio::test]
    async fn test_add_after_imported_max_id_is_rejected() {
        let store = seeded();
        let catalog = open(&store).await;
        catalog
            .import(serde_json::json!({"anime": [
                {"id": i64::MAX, "title": "Last", "episodes": [{"id": 1, "ep": i64::MAX}]}
            ]}))
            .await
            .unwrap();

        let result = catalog.add_anime(input("One more")).await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));

        let result = catalog.add_episode(i64::MAX, EpisodeInput::default()).await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));

        // rejected before anything changed
        assert_eq!(catalog.all().await.len(), 1);
        assert_eq!(saved(&store).await.anime.len(), 1);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mut anime = vec![
            Anime {
                id: 1,
                year: Some(2020),
                ..Default::default()
            },
            Anime {
                id: 2,
                year: Some(2020),
                ..Default::default()
            },
        ];
        sort_anime(&mut anime, SortKey::Year, SortOrder::Desc);
        assert_eq!(anime[0].id, 1);
        assert_eq!(anime[0].year.cmp(&anime[1].year), Ordering::Equal);
    }
}
