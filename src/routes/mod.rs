//! API Routes module for the AnimeFlow API
//!
//! Handlers are grouped by resource; this module holds the shared state,
//! the OpenAPI document and the route table.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    Anime, AnimeInput, AnimePatch, ApiError, ApiResponse, AuthData, CatalogStats, CatalogStatus,
    Comment, CommentInput, Episode, EpisodeInput, EpisodeMatch, Favorite, InteractionKind,
    InteractionOutcome, InteractionRequest, InteractionStats, LoginRequest, PlaybackInfo,
    PublicUser, Reaction, RegisterRequest, SearchResults, Settings, SortKey, SortOrder,
    TrendingAnime, UserInteractions,
};
use crate::resolver::{Playback, PlayerCapabilities, PlayerEngine, PlayerEnvironment, VideoSource};

pub mod admin;
pub mod anime;
pub mod auth;
pub mod comments;
pub mod interactions;

/// Application state shared across handlers
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub config: Config,
}

impl AppState {
    /// Player environment for a request, with the configured public host as
    /// the embedding parent
    pub fn player_environment(&self, query: &PlayerQuery) -> PlayerEnvironment {
        PlayerEnvironment {
            capabilities: query.capabilities(),
            parent_host: self.config.public_host.clone(),
        }
    }
}

/// What the requesting player supports; unset flags use the defaults
/// (MSE available, no native HLS or DASH)
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerQuery {
    /// Media Source Extensions available (default: true)
    pub mse: Option<bool>,
    /// Native HLS playback in `<video>` (default: false)
    pub native_hls: Option<bool>,
    /// Native DASH playback in `<video>` (default: false)
    pub native_dash: Option<bool>,
}

impl PlayerQuery {
    pub fn capabilities(&self) -> PlayerCapabilities {
        let defaults = PlayerCapabilities::default();
        PlayerCapabilities {
            media_source_extensions: self.mse.unwrap_or(defaults.media_source_extensions),
            native_hls: self.native_hls.unwrap_or(defaults.native_hls),
            native_dash: self.native_dash.unwrap_or(defaults.native_dash),
        }
    }
}

/// GET /api/stats - Catalog totals
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "catalog",
    responses(
        (status = 200, description = "Catalog statistics", body = CatalogStats)
    )
)]
pub async fn get_stats(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let stats = data.catalog.stats().await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(stats)))
}

/// GET /api/status - Backend, document revision and last sync time
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "catalog",
    responses(
        (status = 200, description = "Catalog status", body = CatalogStatus)
    )
)]
pub async fn get_status(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let status = data.catalog.status().await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(status)))
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AnimeFlow API",
        version = "0.1.0",
        description = "Anime catalog, comments and playback resolution backed by a remote JSON document",
        license(
            name = "MIT"
        )
    ),
    paths(
        anime::list_anime,
        anime::get_trending,
        anime::get_recent,
        anime::get_anime,
        anime::create_anime,
        anime::update_anime,
        anime::delete_anime,
        anime::list_episodes,
        anime::create_episode,
        anime::update_episode,
        anime::delete_episode,
        anime::get_playback,
        anime::resolve_url,
        anime::global_search,
        comments::list_comments,
        comments::create_comment,
        comments::delete_comment,
        comments::like_comment,
        auth::register,
        auth::login,
        auth::get_me,
        interactions::get_user_interactions,
        interactions::get_interaction_stats,
        interactions::toggle_interaction,
        interactions::remove_interaction,
        admin::sync_catalog,
        admin::export_catalog,
        admin::import_catalog,
        get_stats,
        get_status
    ),
    components(
        schemas(
            Anime,
            AnimeInput,
            AnimePatch,
            Episode,
            EpisodeInput,
            TrendingAnime,
            SearchResults,
            EpisodeMatch,
            Comment,
            CommentInput,
            PublicUser,
            RegisterRequest,
            LoginRequest,
            AuthData,
            UserInteractions,
            Reaction,
            Favorite,
            InteractionKind,
            InteractionRequest,
            InteractionOutcome,
            InteractionStats,
            CatalogStats,
            CatalogStatus,
            Settings,
            SortKey,
            SortOrder,
            VideoSource,
            Playback,
            PlayerEngine,
            PlayerCapabilities,
            PlaybackInfo,
            anime::ResolvedUrl,
            ApiError
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "anime", description = "Catalog and episode endpoints"),
        (name = "playback", description = "Video source resolution"),
        (name = "comments", description = "Threaded comments"),
        (name = "auth", description = "Registration and login"),
        (name = "interactions", description = "Likes, dislikes and favorites"),
        (name = "catalog", description = "Document status, sync, import and export")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Catalog imports can be large
const JSON_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Malformed bodies and query strings are rendered as `ApiError` with 400
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| AppError::validation(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::validation(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| AppError::not_found(err.to_string()).into())
}

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .app_data(query_config())
            .app_data(path_config())
            // fixed segments must come before /anime/{id}
            .route("/anime", web::get().to(anime::list_anime))
            .route("/anime", web::post().to(anime::create_anime))
            .route("/anime/trending", web::get().to(anime::get_trending))
            .route("/anime/recent", web::get().to(anime::get_recent))
            .route("/anime/{id}", web::get().to(anime::get_anime))
            .route("/anime/{id}", web::put().to(anime::update_anime))
            .route("/anime/{id}", web::delete().to(anime::delete_anime))
            .route("/anime/{id}/episodes", web::get().to(anime::list_episodes))
            .route("/anime/{id}/episodes", web::post().to(anime::create_episode))
            .route(
                "/anime/{id}/episodes/{episode_id}",
                web::put().to(anime::update_episode),
            )
            .route(
                "/anime/{id}/episodes/{episode_id}",
                web::delete().to(anime::delete_episode),
            )
            .route(
                "/anime/{id}/episodes/{episode_id}/playback",
                web::get().to(anime::get_playback),
            )
            .route("/resolve", web::get().to(anime::resolve_url))
            .route("/search", web::get().to(anime::global_search))
            .route("/comments", web::get().to(comments::list_comments))
            .route("/comments", web::post().to(comments::create_comment))
            .route("/comments/{id}", web::delete().to(comments::delete_comment))
            .route("/comments/{id}/like", web::post().to(comments::like_comment))
            .route("/auth/register", web::post().to(auth::register))
            .route("/auth/login", web::post().to(auth::login))
            .route("/auth/me", web::get().to(auth::get_me))
            .route(
                "/interactions/stats/{anime_id}",
                web::get().to(interactions::get_interaction_stats),
            )
            .route(
                "/interactions/{user_id}",
                web::get().to(interactions::get_user_interactions),
            )
            .route("/interactions", web::post().to(interactions::toggle_interaction))
            .route(
                "/interactions/{kind}/{anime_id}",
                web::delete().to(interactions::remove_interaction),
            )
            .route("/stats", web::get().to(get_stats))
            .route("/status", web::get().to(get_status))
            .route("/sync", web::post().to(admin::sync_catalog))
            .route("/export", web::get().to(admin::export_catalog))
            .route("/import", web::post().to(admin::import_catalog)),
    );
}
