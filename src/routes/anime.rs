//! Anime and episode routes for the AnimeFlow API
//!
//! - GET /api/anime - List, search, filter and sort
//! - GET /api/anime/trending, GET /api/anime/recent
//! - GET/PUT/DELETE /api/anime/{id}, POST /api/anime
//! - GET/POST /api/anime/{id}/episodes
//! - PUT/DELETE /api/anime/{id}/episodes/{episode_id}
//! - GET /api/anime/{id}/episodes/{episode_id}/playback
//! - GET /api/resolve
//! - GET /api/search - Anime, episodes and comments matching a query
//!
//! Writes require an admin token.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::constants::catalog::{MAX_LIMIT, RECENT_LIMIT, TRENDING_LIMIT};
use crate::error::{AppError, AppResult};
use crate::models::{
    empty_as_none, Anime, AnimeFilter, AnimeInput, AnimePatch, ApiError, ApiResponse, Episode,
    EpisodeInput, PlaybackInfo, SearchResults, SortKey, SortOrder, TrendingAnime,
};
use crate::resolver::{self, Playback, VideoSource};
use crate::routes::{AppState, PlayerQuery};

// ============================================================================
// Query Parameters
// ============================================================================

/// Query parameters for the anime list endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AnimeListQuery {
    /// Case-insensitive search over title, genre and description
    pub q: Option<String>,
    /// Release year
    #[serde(default, deserialize_with = "empty_as_none")]
    pub year: Option<i64>,
    /// Genre name, matched against the comma-separated genre list
    pub genre: Option<String>,
    pub status: Option<String>,
    /// Minimum rating, inclusive
    #[serde(default, deserialize_with = "empty_as_none")]
    pub min_rating: Option<f64>,
    /// Minimum episode count, inclusive
    #[serde(default, deserialize_with = "empty_as_none")]
    pub min_episodes: Option<usize>,
    /// Maximum episode count, inclusive
    #[serde(default, deserialize_with = "empty_as_none")]
    pub max_episodes: Option<usize>,
    /// Sort key (relevance, title, year, rating, episodes, createdAt,
    /// updatedAt). Defaults to relevance when `q` is given.
    pub sort: Option<SortKey>,
    /// Sort order (asc, desc; default: asc)
    pub order: Option<SortOrder>,
}

impl AnimeListQuery {
    fn filter(&self) -> AnimeFilter {
        let text = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        AnimeFilter {
            year: self.year,
            genre: text(&self.genre),
            status: text(&self.status),
            min_rating: self.min_rating,
            min_episodes: self.min_episodes,
            max_episodes: self.max_episodes,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LimitQuery {
    /// Number of entries (default: 10, max: 100)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Case-insensitive text to look for
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResolveQuery {
    /// Episode URL to classify
    pub url: Option<String>,
}

/// Resolved source for an arbitrary URL
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ResolvedUrl {
    pub source: VideoSource,
    pub playback: Playback,
}

// ============================================================================
// Anime
// ============================================================================

/// GET /api/anime - List anime with optional search, filters and sorting
#[utoipa::path(
    get,
    path = "/api/anime",
    tag = "anime",
    params(AnimeListQuery),
    responses(
        (status = 200, description = "Anime list retrieved successfully", body = Vec<Anime>),
        (status = 400, description = "Invalid query", body = ApiError)
    )
)]
pub async fn list_anime(
    data: web::Data<AppState>,
    query: web::Query<AnimeListQuery>,
) -> AppResult<HttpResponse> {
    let sort = query
        .sort
        .map(|key| (key, query.order.unwrap_or_default()));
    let anime = data
        .catalog
        .list(query.q.as_deref(), &query.filter(), sort)
        .await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(anime)))
}

/// GET /api/anime/trending - Most commented anime
#[utoipa::path(
    get,
    path = "/api/anime/trending",
    tag = "anime",
    params(LimitQuery),
    responses(
        (status = 200, description = "Trending anime", body = Vec<TrendingAnime>)
    )
)]
pub async fn get_trending(
    data: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> AppResult<HttpResponse> {
    let trending = data.catalog.trending(query.limit_or(TRENDING_LIMIT)).await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(trending)))
}

/// GET /api/anime/recent - Newest anime first
#[utoipa::path(
    get,
    path = "/api/anime/recent",
    tag = "anime",
    params(LimitQuery),
    responses(
        (status = 200, description = "Recently added anime", body = Vec<Anime>)
    )
)]
pub async fn get_recent(
    data: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> AppResult<HttpResponse> {
    let recent = data.catalog.recent(query.limit_or(RECENT_LIMIT)).await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(recent)))
}

#[utoipa::path(
    get,
    path = "/api/anime/{id}",
    tag = "anime",
    params(
        ("id" = i64, Path, description = "Anime id")
    ),
    responses(
        (status = 200, description = "Anime retrieved successfully", body = Anime),
        (status = 404, description = "Anime not found", body = ApiError)
    )
)]
pub async fn get_anime(
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let anime = data.catalog.by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(anime)))
}

/// POST /api/anime - Add an anime (admin)
#[utoipa::path(
    post,
    path = "/api/anime",
    tag = "anime",
    request_body = AnimeInput,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "Anime created", body = Anime),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError),
        (status = 500, description = "Document store failure", body = ApiError)
    )
)]
pub async fn create_anime(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<AnimeInput>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let anime = data.catalog.add_anime(body.into_inner()).await?;
    info!("{} added anime {} ({})", auth.username, anime.id, anime.title);
    Ok(HttpResponse::Created().json(ApiResponse::new(anime)))
}

/// PUT /api/anime/{id} - Merge fields into an anime (admin)
#[utoipa::path(
    put,
    path = "/api/anime/{id}",
    tag = "anime",
    request_body = AnimePatch,
    params(
        ("id" = i64, Path, description = "Anime id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Anime updated", body = Anime),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn update_anime(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
    body: web::Json<AnimePatch>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let anime = data
        .catalog
        .update_anime(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(anime)))
}

/// DELETE /api/anime/{id} - Remove an anime and its comments (admin)
#[utoipa::path(
    delete,
    path = "/api/anime/{id}",
    tag = "anime",
    params(
        ("id" = i64, Path, description = "Anime id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Anime deleted", body = Anime),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn delete_anime(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let anime = data.catalog.delete_anime(path.into_inner()).await?;
    info!("{} deleted anime {} ({})", auth.username, anime.id, anime.title);
    Ok(HttpResponse::Ok().json(ApiResponse::new(anime)))
}

// ============================================================================
// Episodes
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/anime/{id}/episodes",
    tag = "anime",
    params(
        ("id" = i64, Path, description = "Anime id"),
        SearchQuery
    ),
    responses(
        (status = 200, description = "Episodes of the anime, filtered by title when q is given", body = Vec<Episode>),
        (status = 404, description = "Anime not found", body = ApiError)
    )
)]
pub async fn list_episodes(
    data: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let anime_id = path.into_inner();
    let episodes = match query.q.as_deref() {
        Some(q) => data.catalog.search_episodes(anime_id, q).await?,
        None => data.catalog.episodes(anime_id).await?,
    };
    Ok(HttpResponse::Ok().json(ApiResponse::new(episodes)))
}

/// POST /api/anime/{id}/episodes - Add an episode (admin)
#[utoipa::path(
    post,
    path = "/api/anime/{id}/episodes",
    tag = "anime",
    request_body = EpisodeInput,
    params(
        ("id" = i64, Path, description = "Anime id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "Episode created", body = Episode),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn create_episode(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<i64>,
    body: web::Json<EpisodeInput>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let episode = data
        .catalog
        .add_episode(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::new(episode)))
}

#[utoipa::path(
    put,
    path = "/api/anime/{id}/episodes/{episode_id}",
    tag = "anime",
    request_body = EpisodeInput,
    params(
        ("id" = i64, Path, description = "Anime id"),
        ("episode_id" = i64, Path, description = "Episode id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Episode updated", body = Episode),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 404, description = "Anime or episode not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn update_episode(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<(i64, i64)>,
    body: web::Json<EpisodeInput>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let (anime_id, episode_id) = path.into_inner();
    let episode = data
        .catalog
        .update_episode(anime_id, episode_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(episode)))
}

#[utoipa::path(
    delete,
    path = "/api/anime/{id}/episodes/{episode_id}",
    tag = "anime",
    params(
        ("id" = i64, Path, description = "Anime id"),
        ("episode_id" = i64, Path, description = "Episode id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Episode deleted", body = Episode),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 404, description = "Anime or episode not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn delete_episode(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<(i64, i64)>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let (anime_id, episode_id) = path.into_inner();
    let episode = data.catalog.delete_episode(anime_id, episode_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(episode)))
}

// ============================================================================
// Playback
// ============================================================================

/// GET /api/anime/{id}/episodes/{episode_id}/playback - Resolve an episode's
/// video URL and choose how the player should embed it
#[utoipa::path(
    get,
    path = "/api/anime/{id}/episodes/{episode_id}/playback",
    tag = "playback",
    params(
        ("id" = i64, Path, description = "Anime id"),
        ("episode_id" = i64, Path, description = "Episode id"),
        PlayerQuery
    ),
    responses(
        (status = 200, description = "Resolved source and embedding", body = PlaybackInfo),
        (status = 404, description = "Anime or episode not found", body = ApiError)
    )
)]
pub async fn get_playback(
    data: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
    query: web::Query<PlayerQuery>,
) -> AppResult<HttpResponse> {
    let (anime_id, episode_id) = path.into_inner();
    let env = data.player_environment(&query);
    let playback = data.catalog.playback(anime_id, episode_id, &env).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(playback)))
}

/// GET /api/resolve?url= - Classify any URL without touching the catalog
#[utoipa::path(
    get,
    path = "/api/resolve",
    tag = "playback",
    params(ResolveQuery, PlayerQuery),
    responses(
        (status = 200, description = "Resolved source and embedding", body = ResolvedUrl),
        (status = 400, description = "Missing url", body = ApiError)
    )
)]
pub async fn resolve_url(
    data: web::Data<AppState>,
    query: web::Query<ResolveQuery>,
    player: web::Query<PlayerQuery>,
) -> AppResult<HttpResponse> {
    let url = query
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::validation("url is required"))?;

    let source = resolver::resolve(Some(url));
    let playback = resolver::embed(&source, &data.player_environment(&player));
    Ok(HttpResponse::Ok().json(ApiResponse::new(ResolvedUrl { source, playback })))
}

/// GET /api/search?q= - Search anime, episodes and comments at once
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "anime",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matches grouped by kind; anime ranked by relevance", body = SearchResults)
    )
)]
pub async fn global_search(
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let results = data
        .catalog
        .global_search(query.q.as_deref().unwrap_or_default())
        .await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(results)))
}
