// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    forum::permissions::can_moderate,
    models::user::{Role, Viewer},
    store::DynStore,
};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role at signing time (e.g., 'student', 'moderator').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    /// Identity carried by the token.
    pub fn viewer(&self) -> Result<Viewer, AppError> {
        let id = self
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;
        let role = self
            .role
            .parse::<Role>()
            .map_err(|_| AppError::AuthError("Invalid token role".to_string()))?;
        Ok(Viewer { id, role })
    }
}

/// Optional identity of the caller, set by [`viewer_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentViewer(pub Option<Viewer>);

/// Signs a new JWT for the user.
///
/// Arguments:
/// * `id`: User ID.
/// * `role`: User role.
pub fn sign_jwt(
    id: i64,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.as_str().to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// `Ok(None)` when there is no bearer token, `Err` when there is a bad one.
fn bearer_viewer(req: &Request<Body>, secret: &str) -> Result<Option<Viewer>, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        Some(_) => return Err(StatusCode::UNAUTHORIZED),
        None => return Ok(None),
    };

    verify_jwt(token, secret)
        .and_then(|claims| claims.viewer())
        .map(Some)
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects the `Viewer` into the request extensions for handlers to use.
/// If missing or invalid, returns 401 Unauthorized.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let viewer = bearer_viewer(&req, &config.jwt_secret)?.ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(viewer);
    Ok(next.run(req).await)
}

/// Axum Middleware: Optional authentication for public reads.
///
/// Anonymous requests pass through as `CurrentViewer(None)`; a malformed or
/// expired token is still rejected.
pub async fn viewer_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let viewer = bearer_viewer(&req, &config.jwt_secret)?;
    req.extensions_mut().insert(CurrentViewer(viewer));
    Ok(next.run(req).await)
}

/// Axum Middleware: Moderator Authorization.
///
/// Must be used AFTER `auth_middleware`. Re-reads the caller from the store so
/// demoted or banned staff lose access before their token expires.
pub async fn moderator_middleware(
    State(store): State<DynStore>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let viewer = req
        .extensions()
        .get::<Viewer>()
        .copied()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user = store
        .find_user(viewer.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load user {} for moderation check: {:?}", viewer.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !can_moderate(&user) {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
