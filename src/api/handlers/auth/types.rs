//! Request/response types for the identity endpoints.
//!
//! Errors share one body shape: a stable machine-readable `code` plus a
//! human-readable `message`. Clients branch on the code, never the message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::role::Role;

/// Lifecycle of a registration request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendVerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendCodeRequest {
    pub email: String,
}

const fn default_requested_role() -> Role {
    Role::Viewer
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequestBody {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_requested_role")]
    pub requested_role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequestItem {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub requested_role: Role,
    pub status: ApprovalStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub email_verified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Stable pagination envelope for admin listings.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PaginatedRequests {
    pub items: Vec<RegisterRequestItem>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl PaginatedRequests {
    #[must_use]
    pub fn new(items: Vec<RegisterRequestItem>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

const fn default_page() -> i64 {
    1
}

const fn default_limit() -> i64 {
    20
}

const fn default_status() -> ApprovalStatus {
    ApprovalStatus::Pending
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct ListRequestsQuery {
    #[serde(default = "default_status")]
    pub status: ApprovalStatus,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProcessRegisterRequestBody {
    pub status: ApprovalStatus,
    /// Required when approving; must be EDITOR or VIEWER.
    pub assigned_role: Option<Role>,
    pub reject_reason: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProcessRegisterResponse {
    pub user_id: Option<Uuid>,
    pub status: ApprovalStatus,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequestBody {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetBody {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Build an error response with the shared `{code, message}` body.
pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Missing or undeserializable JSON payload.
pub(super) fn missing_payload() -> Response {
    error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "Missing payload")
}

/// Opaque response for infrastructure failures; details go to the log only.
pub(crate) fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal server error",
    )
}

#[cfg(test)]
mod tests {
    use super::{ApprovalStatus, PaginatedRequests, RegisterRequestBody};
    use crate::api::handlers::auth::role::Role;

    #[test]
    fn pagination_rounds_up() {
        let envelope = PaginatedRequests::new(Vec::new(), 41, 1, 20);
        assert_eq!(envelope.total_pages, 3);
        let empty = PaginatedRequests::new(Vec::new(), 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn requested_role_defaults_to_viewer() {
        let body: RegisterRequestBody = serde_json::from_str(
            r#"{"email":"a@x.com","password":"longenough","name":"Ada"}"#,
        )
        .unwrap();
        assert_eq!(body.requested_role, Role::Viewer);
    }

    #[test]
    fn approval_status_round_trips() {
        for status in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(ApprovalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ApprovalStatus::parse("DONE"), None);
    }
}
