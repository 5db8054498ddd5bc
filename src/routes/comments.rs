//! Comment routes for the AnimeFlow API
//!
//! - GET /api/comments - Comments on an anime or episode
//! - POST /api/comments - Post a comment or reply
//! - DELETE /api/comments/{id} - Delete a thread (author or admin)
//! - POST /api/comments/{id}/like - Like a comment

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::error::{AppError, AppResult};
use crate::models::{empty_as_none, ApiError, ApiResponse, Comment, CommentInput};
use crate::routes::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CommentsQuery {
    /// Anime the comments belong to (required)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub anime_id: Option<i64>,
    /// Restrict to one episode
    #[serde(default, deserialize_with = "empty_as_none")]
    pub episode_num: Option<i64>,
}

/// GET /api/comments - Top-level comments with nested replies, newest first
#[utoipa::path(
    get,
    path = "/api/comments",
    tag = "comments",
    params(CommentsQuery),
    responses(
        (status = 200, description = "Comments retrieved successfully", body = Vec<Comment>),
        (status = 400, description = "animeId is required", body = ApiError)
    )
)]
pub async fn list_comments(
    data: web::Data<AppState>,
    query: web::Query<CommentsQuery>,
) -> AppResult<HttpResponse> {
    let anime_id = query
        .anime_id
        .ok_or_else(|| AppError::validation("animeId is required"))?;
    let comments = data.catalog.comments_for(anime_id, query.episode_num).await;
    Ok(HttpResponse::Ok().json(ApiResponse::new(comments)))
}

/// POST /api/comments - Post a comment, or a reply when `parentId` is set
#[utoipa::path(
    post,
    path = "/api/comments",
    tag = "comments",
    request_body = CommentInput,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "Comment posted", body = Comment),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Anime not found", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn create_comment(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<CommentInput>,
) -> AppResult<HttpResponse> {
    let comment = data
        .catalog
        .add_comment(&auth.actor(), body.into_inner())
        .await?;
    info!("{} commented on anime {}", auth.username, comment.anime_id);
    Ok(HttpResponse::Created().json(ApiResponse::new(comment)))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    tag = "comments",
    params(
        ("id" = String, Path, description = "Comment id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Comment and its replies deleted", body = Comment),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not the author", body = ApiError),
        (status = 404, description = "Comment not found", body = ApiError)
    )
)]
pub async fn delete_comment(
    data: web::Data<AppState>,
    auth: Auth,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let removed = data
        .catalog
        .delete_comment(&auth.actor(), &path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(removed)))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/like",
    tag = "comments",
    params(
        ("id" = String, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment liked", body = Comment),
        (status = 404, description = "Comment not found", body = ApiError)
    )
)]
pub async fn like_comment(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let comment = data.catalog.like_comment(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(comment)))
}
