//! Interaction routes for the AnimeFlow API
//!
//! - GET /api/interactions/{user_id} - A user's likes, dislikes and favorites
//! - GET /api/interactions/stats/{anime_id} - Counters for an anime
//! - POST /api/interactions - Toggle a like, dislike or favorite
//! - DELETE /api/interactions/{kind}/{anime_id} - Remove one

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::collections::BTreeMap;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::error::AppResult;
use crate::models::{
    empty_as_none, ApiError, ApiResponse, InteractionKind, InteractionOutcome, InteractionRequest,
    InteractionStats, UserInteractions,
};
use crate::routes::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeQuery {
    /// Only remove the reaction on this episode
    #[serde(default, deserialize_with = "empty_as_none")]
    pub episode_num: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/interactions/{user_id}",
    tag = "interactions",
    params(
        ("user_id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "The user's interactions", body = UserInteractions)
    )
)]
pub async fn get_user_interactions(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let interactions = data.catalog.interactions_for(&path.into_inner()).await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(interactions)))
}

/// GET /api/interactions/stats/{anime_id} - Counters keyed `"<animeId>"` and
/// `"<animeId>_<episodeNum>"`
#[utoipa::path(
    get,
    path = "/api/interactions/stats/{anime_id}",
    tag = "interactions",
    params(
        ("anime_id" = i64, Path, description = "Anime id")
    ),
    responses(
        (status = 200, description = "Interaction counters", body = BTreeMap<String, InteractionStats>)
    )
)]
pub async fn get_interaction_stats(
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let stats = data.catalog.interaction_stats(path.into_inner()).await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(stats)))
}

#[utoipa::path(
    post,
    path = "/api/interactions",
    tag = "interactions",
    request_body = InteractionRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Interaction toggled", body = InteractionOutcome),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn toggle_interaction(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<InteractionRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let outcome = data
        .catalog
        .toggle_interaction(&auth.actor(), request.kind, request.anime_id, request.episode_num)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(outcome)))
}

/// DELETE /api/interactions/{kind}/{anime_id} - Without `episodeNum` every
/// reaction of that kind on the anime is removed
#[utoipa::path(
    delete,
    path = "/api/interactions/{kind}/{anime_id}",
    tag = "interactions",
    params(
        ("kind" = InteractionKind, Path, description = "like, dislike or favorite"),
        ("anime_id" = i64, Path, description = "Anime id"),
        EpisodeQuery
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Remaining interactions", body = UserInteractions),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "No interactions recorded for the user", body = ApiError)
    )
)]
pub async fn remove_interaction(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<(InteractionKind, i64)>,
    query: web::Query<EpisodeQuery>,
) -> AppResult<HttpResponse> {
    let (kind, anime_id) = path.into_inner();
    let interactions = data
        .catalog
        .remove_interaction(&auth.actor(), kind, anime_id, query.episode_num)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(interactions)))
}
