//! Bearer/cookie JWT authentication.
//!
//! Tokens are issued elsewhere; this side only verifies HS256 signatures and
//! takes the user id from the `sub` claim.

use super::AppState;
use crate::domain::account::UserId;
use crate::error::{LoyaltyError, Result};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Name of the cookie that may carry the token instead of the header.
pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<UserId> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => LoyaltyError::Unauthorized("token expired".into()),
                _ => LoyaltyError::Unauthorized(format!("invalid token: {e}")),
            },
        )?;

        if data.claims.sub.is_empty() {
            return Err(LoyaltyError::Unauthorized("token has no subject".into()));
        }
        Ok(UserId::new(data.claims.sub))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value)
}

/// Rejects requests without a valid token and stores the caller's
/// [`UserId`] in the request extensions.
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(request.headers())
        .or_else(|| cookie_token(request.headers()))
        .ok_or_else(|| LoyaltyError::Unauthorized("missing token".into()))?;
    let user = state.jwt.verify(token)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
