//! Authentication routes for the AnimeFlow API
//!
//! This module contains HTTP route handlers for authentication endpoints:
//! - POST /api/auth/register - Register with username/password
//! - POST /api/auth/login - Login with username/password
//! - GET /api/auth/me - Get current user info

use actix_web::{web, HttpResponse};
use tracing::{info, warn};

use crate::auth::{generate_token, hash_password, verify_password, Auth, AuthError};
use crate::constants::catalog::MIN_PASSWORD_LENGTH;
use crate::error::{AppError, AppResult};
use crate::models::{
    ApiError, ApiResponse, AuthData, LoginRequest, PublicUser, RegisterRequest, User,
};
use crate::routes::AppState;

fn auth_data(data: &AppState, user: &User) -> AppResult<AuthData> {
    let token = generate_token(&user.id, &user.username, &data.config.jwt_secret)?;
    Ok(AuthData {
        user: PublicUser::from_user(user, data.config.is_admin(&user.username)),
        token,
    })
}

/// POST /api/auth/register - Register a new user with username and password
///
/// # Request Body
/// - username: 3 to 32 letters, digits, '_', '-' or '.'
/// - password: at least 6 characters
/// - profilePicture: Optional avatar URL
///
/// # Responses
/// - 201: Registration successful, returns user info and JWT token
/// - 400: Invalid input or username taken
/// - 500: Document store failure
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthData),
        (status = 400, description = "Invalid request or username taken", body = ApiError),
        (status = 409, description = "Catalog changed concurrently, retry", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();

    if body.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let password_hash = hash_password(&body.password)?;
    let user = data
        .catalog
        .register(&body.username, password_hash, body.profile_picture)
        .await?;

    info!("User registered: {}", user.username);
    Ok(HttpResponse::Created().json(ApiResponse::new(auth_data(&data, &user)?)))
}

/// POST /api/auth/login - Login with username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthData),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError)
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    if body.username.trim().is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    if body.password.is_empty() {
        return Err(AppError::validation("Password is required"));
    }

    let user = data
        .catalog
        .find_by_username(&body.username)
        .await
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&body.password, &user.password_hash)? {
        warn!("Failed login for {}", user.username);
        return Err(AuthError::InvalidCredentials.into());
    }

    info!("User logged in: {}", user.username);
    Ok(HttpResponse::Ok().json(ApiResponse::new(auth_data(&data, &user)?)))
}

/// GET /api/auth/me - Get the current user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Current user", body = PublicUser),
        (status = 401, description = "Not authenticated", body = ApiError)
    )
)]
pub async fn get_me(data: web::Data<AppState>, auth: Auth) -> AppResult<HttpResponse> {
    let user = data
        .catalog
        .user_by_id(&auth.user_id)
        .await
        .ok_or(AuthError::UserNotFound)?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(PublicUser::from_user(
        &user,
        auth.is_admin,
    ))))
}
