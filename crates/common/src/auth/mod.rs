//! Authentication utilities
//!
//! Provides:
//! - Role parsing from directory role names
//! - JWT token generation and validation
//! - Actor resolution from a bearer token, re-read from the directory on
//!   every request

use crate::errors::{AppError, Result};
use crate::store::Directory;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Closed set of roles the access policy knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Student,
    Advisor,
    Other,
}

impl Role {
    /// Map a directory role name, case-insensitively. Unknown names are `Other`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            "student" | "mahasiswa" => Role::Student,
            "advisor" | "lecturer" | "dosen wali" => Role::Advisor,
            _ => Role::Other,
        }
    }
}

/// The authenticated caller of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    /// Role name as stored, kept for logs
    pub role_name: String,
}

impl Actor {
    pub fn new(user_id: Uuid, role_name: impl Into<String>) -> Self {
        let role_name = role_name.into();
        Self {
            user_id,
            role: Role::from_name(&role_name),
            role_name,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token for a user
    pub fn generate_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }
}

/// Extract the token from an `Authorization: Bearer` header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Turns an opaque token into an actor
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_actor(&self, token: &str) -> Result<Actor>;
}

/// Resolves HS256 tokens, then reads the user's current role and status from
/// the directory
pub struct JwtIdentityResolver {
    jwt: JwtManager,
    directory: Arc<dyn Directory>,
}

impl JwtIdentityResolver {
    pub fn new(jwt: JwtManager, directory: Arc<dyn Directory>) -> Self {
        Self { jwt, directory }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve_actor(&self, token: &str) -> Result<Actor> {
        let claims = self.jwt.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

        let user = self
            .directory
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: "Unknown user".to_string(),
            })?;

        if !user.is_active {
            return Err(AppError::Unauthorized {
                message: "Account is inactive".to_string(),
            });
        }

        Ok(Actor::new(user.id, user.role_name))
    }
}

/// Axum extractor for Actor
impl<S> FromRequestParts<S> for Actor
where
    Arc<dyn IdentityResolver>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Expected a Bearer token".to_string(),
        })?;

        let resolver = <Arc<dyn IdentityResolver> as FromRef<S>>::from_ref(state);
        resolver.resolve_actor(token).await
    }
}
