//! Request authentication: staff carry an HS256 bearer token, customers carry
//! the opaque session token issued when they sat down.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::entities::customer_session;
use crate::errors::ServiceError;
use crate::AppState;

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StaffRole {
    Staff,
    Admin,
    Kitchen,
    Cashier,
}

/// Claim structure for staff JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    pub sub: String,           // Staff user id
    pub name: Option<String>,  // Display name
    pub role: String,          // One of StaffRole
    pub iat: i64,              // Issued at time
    pub exp: i64,              // Expiration time
}

/// Authenticated staff member
#[derive(Debug, Clone, Serialize)]
pub struct StaffUser {
    pub user_id: String,
    pub name: Option<String>,
    pub role: StaffRole,
}

/// Customer whose session token checked out
#[derive(Debug, Clone)]
pub struct CustomerSession(pub customer_session::Model);

/// Whoever is making a request that both audiences may call.
#[derive(Debug, Clone)]
pub enum Caller {
    Staff(StaffUser),
    Customer(customer_session::Model),
}

impl Caller {
    pub fn is_staff(&self) -> bool {
        matches!(self, Caller::Staff(_))
    }

    /// Staff may see every order; a customer only those of their session.
    pub fn can_access_session(&self, session_id: Uuid) -> bool {
        match self {
            Caller::Staff(_) => true,
            Caller::Customer(session) => session.id == session_id,
        }
    }
}

pub fn issue_staff_token(
    secret: &str,
    user_id: &str,
    name: Option<String>,
    role: StaffRole,
    ttl: Duration,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = StaffClaims {
        sub: user_id.to_string(),
        name,
        role: role.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

pub fn validate_staff_token(secret: &str, token: &str) -> Result<StaffUser, ServiceError> {
    let claims = decode::<StaffClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ServiceError::AuthError("token has expired".to_string())
        }
        _ => ServiceError::AuthError("invalid token".to_string()),
    })?
    .claims;

    let role = StaffRole::from_str(&claims.role)
        .map_err(|_| ServiceError::Forbidden(format!("role {} is not staff", claims.role)))?;

    Ok(StaffUser {
        user_id: claims.sub,
        name: claims.name,
        role,
    })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

fn session_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::AuthError("staff token required".to_string()))?;
        validate_staff_token(&state.config.jwt_secret, token).map_err(|e| {
            warn!(error = %e, "Rejected staff token");
            e
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CustomerSession {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(parts)
            .ok_or_else(|| ServiceError::AuthError("session token required".to_string()))?;
        let session = state.sessions.authenticate(token).await?;
        Ok(CustomerSession(session))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if bearer_token(parts).is_some() {
            return StaffUser::from_request_parts(parts, state).await.map(Caller::Staff);
        }
        CustomerSession::from_request_parts(parts, state)
            .await
            .map(|CustomerSession(session)| Caller::Customer(session))
    }
}
