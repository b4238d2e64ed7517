//! Resolving a bearer token into an authenticated principal.

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Response,
};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::role::{authorize, Role};
use super::state::AuthState;
use super::storage::lookup_user_by_id;
use super::tokens::{self, TokenKind};
use super::types::{error_response, internal_error};

/// The authenticated caller of a protected endpoint.
#[derive(Clone, Copy, Debug)]
pub(super) struct Principal {
    pub(super) user_id: Uuid,
    pub(super) role: Role,
}

/// Validate the access token and load the caller's account.
///
/// The token must be a live, unrevoked access token; refresh tokens are
/// rejected here regardless of where they are presented.
///
/// # Errors
/// Returns a ready-to-send error response on any failure.
pub(super) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "INVALID_TOKEN",
            "Missing bearer token",
        ));
    };

    let claims = match tokens::validate(
        auth_state.kv(),
        auth_state.config().token_secret(),
        &token,
        TokenKind::Access,
    )
    .await
    {
        Ok(Some(claims)) => claims,
        Ok(None) => {
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Access token is invalid or expired",
            ));
        }
        Err(err) => {
            error!("Failed to validate access token: {err}");
            return Err(internal_error());
        }
    };

    let user = match lookup_user_by_id(pool, claims.sub).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup principal: {err}");
            return Err(internal_error());
        }
    };
    let Some(user) = user else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "USER_NOT_FOUND",
            "Account no longer exists",
        ));
    };
    if !user.is_active {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "ACCOUNT_DISABLED",
            "Account is disabled",
        ));
    }

    Ok(Principal {
        user_id: user.id,
        role: user.role,
    })
}

/// Enforce the minimum-seniority policy for a protected endpoint.
///
/// # Errors
/// Returns a 403 response when the caller's role is too junior.
pub(super) fn require_role(principal: Principal, allowed: &[Role]) -> Result<(), Response> {
    if authorize(principal.role, allowed) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Insufficient role",
        ))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
