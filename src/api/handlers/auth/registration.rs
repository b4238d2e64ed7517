//! Pre-registration email verification and request submission.
//!
//! The order is verify-then-register: the applicant proves control of the
//! mailbox first, then submits the form within the verified-email window.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::email::EmailMessage;
use crate::kv::Namespace;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{insert_register_request, lookup_user_by_email, SubmitOutcome};
use super::types::{
    error_response, internal_error, missing_payload, ErrorBody, MessageResponse,
    RegisterRequestBody, RegisterResponse, ResendCodeRequest, SendVerificationRequest,
    VerifyEmailRequest,
};
use super::utils::{
    generate_otp, normalize_email, valid_code_format, valid_email, valid_name, valid_password,
};

/// Generate a fresh code and queue the verification email. Shared by the
/// initial send and the resend endpoint; a resend overwrites the previous
/// code and restarts its TTL.
async fn issue_code(pool: &PgPool, auth_state: &AuthState, email: &str) -> axum::response::Response {
    match lookup_user_by_email(pool, email).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "EMAIL_ALREADY_EXISTS",
                "An account with this email already exists",
            );
        }
        Ok(None) => {}
        Err(err) => {
            error!("Failed to lookup user for verification: {err}");
            return internal_error();
        }
    }

    let code = generate_otp();
    let ttl = Duration::from_secs(auth_state.config().otp_ttl_seconds());
    if let Err(err) = auth_state.kv().put(Namespace::Otp, email, &code, ttl).await {
        error!("Failed to store verification code: {err}");
        return internal_error();
    }

    auth_state
        .notifier()
        .dispatch(EmailMessage::verification_code(email, &code));

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Verification code sent".to_string(),
        }),
    )
        .into_response()
}

/// Start email verification by sending a one-time code.
#[utoipa::path(
    post,
    path = "/v1/auth/send-verification",
    request_body = SendVerificationRequest,
    responses(
        (status = 200, description = "Verification code sent", body = MessageResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn send_verification(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SendVerificationRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Invalid email address",
        );
    }

    issue_code(&pool.0, &auth_state.0, &email).await
}

/// Resend the verification code, invalidating the previous one.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-code",
    request_body = ResendCodeRequest,
    responses(
        (status = 200, description = "Verification code sent", body = MessageResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn resend_code(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Invalid email address",
        );
    }

    issue_code(&pool.0, &auth_state.0, &email).await
}

/// Check a one-time code and mark the email verified for a bounded window.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Expired or wrong code", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || !valid_code_format(&request.code) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Invalid email or code format",
        );
    }

    let stored = match auth_state.kv().get(Namespace::Otp, &email).await {
        Ok(stored) => stored,
        Err(err) => {
            error!("Failed to read verification code: {err}");
            return internal_error();
        }
    };

    let Some(stored) = stored else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "CODE_EXPIRED",
            "Verification code expired; request a new one",
        );
    };

    if stored != request.code {
        // The code stays live until its TTL runs out; only a match consumes it.
        return error_response(StatusCode::BAD_REQUEST, "INVALID_CODE", "Wrong code");
    }

    if let Err(err) = auth_state.kv().delete(Namespace::Otp, &email).await {
        error!("Failed to consume verification code: {err}");
        return internal_error();
    }

    let ttl = Duration::from_secs(auth_state.config().email_verified_ttl_seconds());
    if let Err(err) = auth_state
        .kv()
        .put(Namespace::EmailVerified, &email, "1", ttl)
        .await
    {
        error!("Failed to mark email verified: {err}");
        return internal_error();
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Email verified".to_string(),
        }),
    )
        .into_response()
}

/// Submit a registration request for admin review.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequestBody,
    responses(
        (status = 201, description = "Request submitted for review", body = RegisterResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Email not verified", body = ErrorBody),
        (status = 409, description = "Duplicate email or pending request", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequestBody>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Invalid email address",
        );
    }
    if !valid_password(&request.password) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Password must be between 8 and 100 characters",
        );
    }
    if !valid_name(&request.name) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Name must be between 1 and 100 characters",
        );
    }
    if !request.requested_role.self_assignable() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "Requested role must be EDITOR or VIEWER",
        );
    }

    let verified = match auth_state.kv().get(Namespace::EmailVerified, &email).await {
        Ok(verified) => verified.is_some(),
        Err(err) => {
            error!("Failed to read email-verified marker: {err}");
            return internal_error();
        }
    };
    if !verified {
        return error_response(
            StatusCode::FORBIDDEN,
            "EMAIL_NOT_VERIFIED",
            "Verify your email before registering",
        );
    }

    match lookup_user_by_email(&pool.0, &email).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "EMAIL_ALREADY_EXISTS",
                "An account with this email already exists",
            );
        }
        Ok(None) => {}
        Err(err) => {
            error!("Failed to lookup user for registration: {err}");
            return internal_error();
        }
    }

    let hashed_password = match hash_password(&request.password) {
        Ok(hashed) => hashed,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return internal_error();
        }
    };

    let verified_at = time::OffsetDateTime::now_utc();
    match insert_register_request(
        &pool.0,
        &email,
        request.name.trim(),
        &hashed_password,
        request.requested_role,
        verified_at,
    )
    .await
    {
        Ok(SubmitOutcome::Created) => {}
        Ok(SubmitOutcome::Conflict) => {
            return error_response(
                StatusCode::CONFLICT,
                "REGISTER_REQUEST_PENDING",
                "A registration request for this email is already pending",
            );
        }
        Err(err) => {
            error!("Failed to insert register request: {err}");
            return internal_error();
        }
    }

    // The verified-email marker is single-use; consume it on submission.
    if let Err(err) = auth_state.kv().delete(Namespace::EmailVerified, &email).await {
        error!("Failed to consume email-verified marker: {err}");
    }

    (
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration request submitted for review".to_string(),
            email,
        }),
    )
        .into_response()
}
