//! Catalog maintenance routes (admin only)
//!
//! - POST /api/sync - Refresh from the document store
//! - GET /api/export - Download the whole document
//! - POST /api/import - Replace the catalog with an uploaded document

use actix_web::{http::header, web, HttpResponse};
use tracing::info;

use crate::auth::Auth;
use crate::error::{AppError, AppResult};
use crate::models::{ApiError, ApiResponse, CatalogStats, CatalogStatus};
use crate::routes::AppState;
use crate::store::Freshness;

/// POST /api/sync - Pull the latest document revision now
#[utoipa::path(
    post,
    path = "/api/sync",
    tag = "catalog",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Catalog status after the refresh", body = CatalogStatus),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 500, description = "Document store failure", body = ApiError)
    )
)]
pub async fn sync_catalog(data: web::Data<AppState>, auth: Auth) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    match data.catalog.sync().await? {
        Freshness::Refreshed => info!("{} synced the catalog, new revision loaded", auth.username),
        Freshness::Cached => info!("{} synced the catalog, already up to date", auth.username),
    }
    Ok(HttpResponse::Ok().json(ApiResponse::new(data.catalog.status().await)))
}

/// GET /api/export - Pretty-printed catalog document as an attachment
#[utoipa::path(
    get,
    path = "/api/export",
    tag = "catalog",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "The catalog document", body = serde_json::Value),
        (status = 403, description = "Admin access required", body = ApiError)
    )
)]
pub async fn export_catalog(data: web::Data<AppState>, auth: Auth) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let document = data.catalog.export().await;
    let body = serde_json::to_string_pretty(&document)
        .map_err(|e| AppError::internal(format!("Failed to serialize catalog: {}", e)))?;

    let filename = format!(
        "anime-flow-{}.json",
        chrono::Utc::now().format("%Y-%m-%d")
    );
    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(body))
}

/// POST /api/import - Replace the catalog; the body must contain an `anime`
/// array. Users and interactions are kept unless the body includes them.
#[utoipa::path(
    post,
    path = "/api/import",
    tag = "catalog",
    request_body(content = serde_json::Value, description = "Catalog document", content_type = "application/json"),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Imported catalog statistics", body = CatalogStats),
        (status = 400, description = "Not a catalog document", body = ApiError),
        (status = 403, description = "Admin access required", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError)
    )
)]
pub async fn import_catalog(
    data: web::Data<AppState>,
    auth: Auth,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let stats = data.catalog.import(body.into_inner()).await?;
    info!("{} imported {} anime", auth.username, stats.total_anime);
    Ok(HttpResponse::Ok().json(ApiResponse::new(stats)))
}
