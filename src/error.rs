//! Global error handling module for the AnimeFlow API
//!
//! This module provides a unified error type that handles all application errors
//! and converts them to appropriate HTTP responses with consistent JSON structure.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::auth::AuthError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::models::ApiError;
use crate::store::StoreError;

/// Application-wide error type that unifies all error sources
#[derive(Debug, Error)]
pub enum AppError {
    /// Catalog operation errors (validation, lookups, permissions, storage)
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Authentication-related errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (bad request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,

            AppError::Catalog(catalog_err) => match catalog_err {
                CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                CatalogError::Forbidden(_) => StatusCode::FORBIDDEN,
                CatalogError::ReadOnly(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CatalogError::Store(store_err) => store_status(store_err),
            },

            AppError::Store(store_err) => store_status(store_err),

            AppError::Auth(auth_err) => match auth_err {
                AuthError::InvalidCredentials
                | AuthError::TokenExpired
                | AuthError::MissingAuthHeader
                | AuthError::InvalidAuthHeaderFormat
                | AuthError::TokenVerificationError(_)
                | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
                AuthError::AdminRequired => StatusCode::FORBIDDEN,
                // Other auth errors are internal
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
            AppError::Config(_) => "Server is misconfigured".to_string(),

            AppError::Catalog(catalog_err) => match catalog_err {
                CatalogError::Store(store_err) => store_message(store_err),
                CatalogError::ReadOnly(_) => {
                    "The stored catalog document is malformed, changes are disabled until it is fixed"
                        .to_string()
                }
                other => other.to_string(),
            },

            AppError::Store(store_err) => store_message(store_err),

            AppError::Auth(auth_err) => match auth_err {
                AuthError::InvalidCredentials => "Invalid username or password".to_string(),
                AuthError::TokenExpired => "Token has expired, please login again".to_string(),
                AuthError::MissingAuthHeader => "Authorization header is required".to_string(),
                AuthError::InvalidAuthHeaderFormat => {
                    "Invalid authorization header format, expected 'Bearer <token>'".to_string()
                }
                AuthError::TokenVerificationError(_) => "Invalid authentication token".to_string(),
                AuthError::AdminRequired => "Admin access required".to_string(),
                AuthError::UserNotFound => "User not found".to_string(),
                AuthError::HashingError(_) => "Authentication processing error".to_string(),
                AuthError::TokenGenerationError(_) => {
                    "Failed to generate authentication token".to_string()
                }
            },
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Transport(_) | StoreError::Http { .. } | StoreError::Parse(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn store_message(err: &StoreError) -> String {
    match err {
        StoreError::Conflict { .. } => {
            "The catalog was changed by someone else, please retry".to_string()
        }
        StoreError::NotFound(path) => format!("Document {} not found", path),
        StoreError::Transport(_) => "Failed to reach the document store".to_string(),
        StoreError::Http { status, .. } => {
            format!("Document store returned error status: {}", status)
        }
        StoreError::Parse(_) => "The stored catalog document is malformed".to_string(),
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_response = ApiError::new(self.user_message());

        HttpResponse::build(status).json(error_response)
    }
}

/// Result type alias for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
