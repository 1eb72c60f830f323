use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::claims::TokenKind;
use super::jwt::{JwtKeys, TokenError};
use super::repo_types::User;
use crate::{error::AppError, state::AppState};

/// Legacy header some clients send the raw token in.
pub const AUTH_TOKEN_HEADER: &str = "auth-token";

/// A verified user resolved from the request's access token.
pub struct AuthUser(pub User);

/// Pulls the raw token out of `Authorization: Bearer` or `auth-token`.
pub(crate) fn token_from_headers(headers: &HeaderMap) -> Result<&str, AppError> {
    if let Some(auth) = headers.get(AUTHORIZATION) {
        let auth = auth
            .to_str()
            .map_err(|_| AppError::unauthorized("Invalid Authorization header"))?;
        let (scheme, token) = auth
            .split_once(' ')
            .ok_or_else(|| AppError::unauthorized("Invalid Authorization header"))?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AppError::unauthorized("Invalid Authorization header"));
        }
        return Ok(token);
    }

    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("Access token is required"))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys
            .verify_kind(token, TokenKind::Access)
            .map_err(|e| {
                warn!(error = %e, "access token rejected");
                match e {
                    TokenError::Expired => AppError::unauthorized("Token expired"),
                    TokenError::Invalid | TokenError::WrongKind => {
                        AppError::unauthorized("Invalid token")
                    }
                }
            })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token subject not found");
                AppError::unauthorized("Invalid token - user not found")
            })?;

        if !user.is_verified {
            warn!(user_id = %user.id, "token subject not verified");
            return Err(AppError::unauthorized("Email not verified"));
        }

        Ok(AuthUser(user))
    }
}
