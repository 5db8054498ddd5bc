//! Authentication module for the AnimeFlow API
//!
//! This module provides authentication functionality including:
//! - Password hashing with bcrypt
//! - JWT token generation and verification
//! - The `Auth` extractor for protected routes

use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use thiserror::Error;

use crate::catalog::Actor;
use crate::models::ApiError;

/// Bcrypt cost factor, lowered in tests to keep them fast
#[cfg(not(test))]
const BCRYPT_COST: u32 = 12;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

/// JWT token expiry duration in days
const JWT_EXPIRY_DAYS: i64 = 7;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Token generation failed: {0}")]
    TokenGenerationError(String),

    #[error("Token verification failed: {0}")]
    TokenVerificationError(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthHeaderFormat,

    #[error("Admin access required")]
    AdminRequired,

    #[error("User not found")]
    UserNotFound,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AuthError::HashingError(e.to_string()))
}

/// Verify a password against a bcrypt hash.
///
/// A stored value that is not a bcrypt hash never matches.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    if !hash.starts_with("$2") {
        return Ok(false);
    }
    bcrypt::verify(password, hash).map_err(|e| AuthError::HashingError(e.to_string()))
}

/// Generate a JWT token for a user
///
/// # Example
/// ```ignore
/// let token = generate_token(&user.id, &user.username, &jwt_secret)?;
/// ```
pub fn generate_token(user_id: &str, username: &str, secret: &str) -> Result<String, AuthError> {
    let now = Utc::now();
    let expiry = now + Duration::days(JWT_EXPIRY_DAYS);

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: expiry.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
}

/// Verify and decode a JWT token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data: TokenData<Claims> = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenVerificationError(e.to_string()),
    })?;

    Ok(token_data.claims)
}

/// Extract JWT token from Authorization header
pub fn extract_token_from_header(auth_header: &str) -> Result<&str, AuthError> {
    if !auth_header.starts_with("Bearer ") {
        return Err(AuthError::InvalidAuthHeaderFormat);
    }

    let token = auth_header.trim_start_matches("Bearer ").trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeaderFormat);
    }

    Ok(token)
}

/// Validate an HTTP request's bearer token and return its claims
pub fn validate_http_request(req: &HttpRequest, secret: &str) -> Result<Claims, AuthError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = extract_token_from_header(auth_header)?;
    verify_token(token, secret)
}

/// Configuration for the auth extractor
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT secret key
    pub jwt_secret: String,
    /// Usernames granted admin rights, compared case-insensitively
    pub admin_usernames: Vec<String>,
}

impl AuthConfig {
    pub fn is_admin(&self, username: &str) -> bool {
        self.admin_usernames
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(username))
    }
}

/// Authenticated user extractor for Actix-web routes
///
/// # Example
/// ```ignore
/// async fn protected_route(user: Auth) -> impl Responder {
///     HttpResponse::Ok().json(format!("Hello, {}", user.username))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Auth {
    pub user_id: String,
    pub username: String,
    /// Resolved per request from the configured admin list
    pub is_admin: bool,
}

impl Auth {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AuthError::AdminRequired)
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

impl FromRequest for Auth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let config = req.app_data::<web::Data<AuthConfig>>();

        let result = match config {
            Some(config) => match validate_http_request(req, &config.jwt_secret) {
                Ok(claims) => Ok(Auth {
                    is_admin: config.is_admin(&claims.username),
                    user_id: claims.sub,
                    username: claims.username,
                }),
                Err(e) => {
                    let message = match &e {
                        AuthError::MissingAuthHeader => "Missing authorization header",
                        AuthError::InvalidAuthHeaderFormat => "Invalid authorization header format",
                        AuthError::TokenExpired => "Token expired",
                        AuthError::TokenVerificationError(_) => "Invalid token",
                        _ => "Authentication failed",
                    };
                    let error_response = HttpResponse::Unauthorized().json(ApiError::new(message));
                    Err(actix_web::error::InternalError::from_response(e, error_response).into())
                }
            },
            None => {
                let error_response = HttpResponse::InternalServerError()
                    .json(ApiError::new("Auth configuration not found"));
                Err(actix_web::error::InternalError::from_response(
                    AuthError::TokenVerificationError("Config not found".to_string()),
                    error_response,
                )
                .into())
            }
        };

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_hash_password_creates_valid_hash() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        assert!(hash.starts_with("$2"));
        assert_ne!(hash, password);
    }

    #[test]
    fn test_hash_password_different_hashes_for_same_password() {
        let hash1 = hash_password("same_password").unwrap();
        let hash2 = hash_password("same_password").unwrap();

        // Due to salt, hashes should be different
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password").unwrap();

        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_unicode_password() {
        let password = "пароль_密码_🔐";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash).unwrap());
    }

    #[test]
    fn test_verify_password_rejects_plaintext_record() {
        assert!(!verify_password("secret", "secret").unwrap());
    }

    #[test]
    fn test_token_contains_correct_claims() {
        let secret = "test_secret";

        let token = generate_token("u-42", "aya", secret).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = verify_token(&token, secret).unwrap();
        assert_eq!(claims.sub, "u-42");
        assert_eq!(claims.username, "aya");
        assert!(claims.exp > claims.iat);
        // Expiry should be approximately 7 days from now
        let expected_expiry = claims.iat + (7 * 24 * 60 * 60);
        assert!((claims.exp - expected_expiry).abs() < 60);
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let token = generate_token("u-1", "aya", "correct_secret").unwrap();
        let result = verify_token(&token, "wrong_secret");

        assert!(matches!(result, Err(AuthError::TokenVerificationError(_))));
    }

    #[test]
    fn test_verify_token_invalid_token() {
        assert!(verify_token("invalid.token.here", "test_secret").is_err());
    }

    #[test]
    fn test_extract_token_valid_header() {
        let header = "Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.test";
        let token = extract_token_from_header(header).unwrap();

        assert_eq!(token, "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.test");
    }

    #[test]
    fn test_extract_token_invalid_headers() {
        for header in ["token123", "Bearer ", "bearer token123"] {
            let result = extract_token_from_header(header);
            assert!(matches!(result, Err(AuthError::InvalidAuthHeaderFormat)));
        }
    }

    #[test]
    fn test_extract_token_with_extra_spaces() {
        let token = extract_token_from_header("Bearer   token123  ").unwrap();
        assert_eq!(token, "token123");
    }

    #[test]
    fn test_validate_http_request() {
        let token = generate_token("u-1", "aya", "secret").unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();
        let claims = validate_http_request(&req, "secret").unwrap();
        assert_eq!(claims.username, "aya");

        let req = TestRequest::default().to_http_request();
        let result = validate_http_request(&req, "secret");
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[test]
    fn test_admin_is_case_insensitive() {
        let config = AuthConfig {
            jwt_secret: "secret".to_string(),
            admin_usernames: vec!["Aya".to_string()],
        };
        assert!(config.is_admin("aya"));
        assert!(!config.is_admin("ren"));
    }

    #[test]
    fn test_require_admin() {
        let mut auth = Auth {
            user_id: "u-1".to_string(),
            username: "aya".to_string(),
            is_admin: false,
        };
        assert!(matches!(auth.require_admin(), Err(AuthError::AdminRequired)));

        auth.is_admin = true;
        assert!(auth.require_admin().is_ok());
        assert!(auth.actor().is_admin);
        assert_eq!(auth.actor().username, "aya");
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid credentials"
        );
        assert_eq!(AuthError::TokenExpired.to_string(), "Token expired");
        assert_eq!(AuthError::AdminRequired.to_string(), "Admin access required");
    }
}
