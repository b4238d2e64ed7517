//! Password reset: request a link, then redeem the single-use token.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use crate::api::email::EmailMessage;
use crate::kv::Namespace;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{lookup_user_by_email, lookup_user_by_id, update_user_password};
use super::types::{
    error_response, internal_error, missing_payload, ErrorBody, MessageResponse,
    PasswordResetBody, PasswordResetRequestBody,
};
use super::utils::{
    build_reset_url, generate_reset_token, hash_reset_token, normalize_email, valid_email,
    valid_password,
};

/// The request endpoint answers identically whether or not the email is
/// registered, so it cannot be used to enumerate accounts.
fn generic_reset_response() -> Response {
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "If the email is registered, a reset link has been sent".to_string(),
        }),
    )
        .into_response()
}

/// Request a password reset link.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset-request",
    request_body = PasswordResetRequestBody,
    responses(
        (status = 200, description = "Accepted regardless of account existence", body = MessageResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn password_reset_request(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetRequestBody>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // A malformed address gets the generic answer too.
        return generic_reset_response();
    }

    let user = match lookup_user_by_email(&pool.0, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for password reset: {err}");
            return internal_error();
        }
    };

    if let Some(user) = user {
        let token = generate_reset_token();
        let ttl = Duration::from_secs(auth_state.config().password_reset_ttl_seconds());
        // The store keys on a hash; a raw token never leaves the email.
        if let Err(err) = auth_state
            .kv()
            .put(
                Namespace::PasswordReset,
                &hash_reset_token(&token),
                &user.id.to_string(),
                ttl,
            )
            .await
        {
            error!("Failed to store reset token: {err}");
            return internal_error();
        }

        let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
        auth_state
            .notifier()
            .dispatch(EmailMessage::password_reset(&email, &user.name, &reset_url));
    }

    generic_reset_response()
}

/// Redeem a reset token and set a new password.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = PasswordResetBody,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid payload or token", body = ErrorBody),
        (status = 404, description = "Account removed since the link was issued", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetBody>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    if !valid_password(&request.new_password) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Password must be between 8 and 100 characters",
        );
    }

    // Atomic take: of two concurrent redemptions, only one sees the value.
    let token_hash = hash_reset_token(request.token.trim());
    let stored = match auth_state
        .kv()
        .take(Namespace::PasswordReset, &token_hash)
        .await
    {
        Ok(stored) => stored,
        Err(err) => {
            error!("Failed to read reset token: {err}");
            return internal_error();
        }
    };

    // Expired, already used, and never-issued tokens are indistinguishable.
    let Some(stored) = stored else {
        return invalid_token();
    };
    let Ok(user_id) = stored.parse::<Uuid>() else {
        error!("Reset token resolved to a malformed user id");
        return invalid_token();
    };

    let user = match lookup_user_by_id(&pool.0, user_id).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for password reset: {err}");
            return restore_token_and_fail(&auth_state.0, &token_hash, &stored).await;
        }
    };
    if user.is_none() {
        return error_response(
            StatusCode::NOT_FOUND,
            "USER_NOT_FOUND",
            "Account no longer exists",
        );
    }

    let hashed = match hash_password(&request.new_password) {
        Ok(hashed) => hashed,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return restore_token_and_fail(&auth_state.0, &token_hash, &stored).await;
        }
    };

    match update_user_password(&pool.0, user_id, &hashed).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "USER_NOT_FOUND",
                "Account no longer exists",
            );
        }
        Err(err) => {
            error!("Failed to update password: {err}");
            return restore_token_and_fail(&auth_state.0, &token_hash, &stored).await;
        }
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password updated".to_string(),
        }),
    )
        .into_response()
}

/// Put a taken token back when the reset fails on our side, so the link
/// stays redeemable. Best effort; the TTL restarts from the configured
/// window.
async fn restore_token_and_fail(
    auth_state: &AuthState,
    token_hash: &str,
    stored: &str,
) -> Response {
    let ttl = Duration::from_secs(auth_state.config().password_reset_ttl_seconds());
    if let Err(err) = auth_state
        .kv()
        .put(Namespace::PasswordReset, token_hash, stored, ttl)
        .await
    {
        error!("Failed to restore reset token: {err}");
    }
    internal_error()
}

fn invalid_token() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "INVALID_TOKEN",
        "Reset token is invalid or expired",
    )
}
