//! Admin review of registration requests.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::api::email::EmailMessage;

use super::principal::{require_auth, require_role};
use super::role::Role;
use super::state::AuthState;
use super::storage::{
    list_register_requests, process_register_request, ProcessDecision, ProcessOutcome,
};
use super::types::{
    error_response, internal_error, missing_payload, ApprovalStatus, ErrorBody, ListRequestsQuery,
    PaginatedRequests, ProcessRegisterRequestBody, ProcessRegisterResponse, RegisterRequestItem,
};

const REVIEWER_ROLES: &[Role] = &[Role::Admin, Role::Owner];
const MAX_PAGE_SIZE: i64 = 100;

/// List registration requests in one status, newest first.
#[utoipa::path(
    get,
    path = "/v1/auth/register-requests",
    params(ListRequestsQuery),
    responses(
        (status = 200, description = "One page of requests", body = PaginatedRequests),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn list_requests(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    query: Query<ListRequestsQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool.0, &auth_state.0).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if let Err(response) = require_role(principal, REVIEWER_ROLES) {
        return response;
    }

    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

    let (rows, total) = match list_register_requests(&pool.0, query.status, page, limit).await {
        Ok(listing) => listing,
        Err(err) => {
            error!("Failed to list register requests: {err}");
            return internal_error();
        }
    };

    let items = rows
        .into_iter()
        .map(|row| RegisterRequestItem {
            id: row.id,
            email: row.email,
            name: row.name,
            requested_role: row.requested_role,
            status: row.status,
            email_verified_at: row.email_verified_at,
            created_at: row.created_at,
        })
        .collect();

    (
        StatusCode::OK,
        Json(PaginatedRequests::new(items, total, page, limit)),
    )
        .into_response()
}

/// Approve or reject a pending registration request.
#[utoipa::path(
    patch,
    path = "/v1/auth/register-requests/{id}",
    request_body = ProcessRegisterRequestBody,
    params(
        ("id" = Uuid, Path, description = "Registration request id")
    ),
    responses(
        (status = 200, description = "Decision applied", body = ProcessRegisterResponse),
        (status = 400, description = "Invalid decision payload", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 404, description = "No such request", body = ErrorBody),
        (status = 409, description = "Already processed or email taken", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn process_request(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(request_id): Path<Uuid>,
    payload: Option<Json<ProcessRegisterRequestBody>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool.0, &auth_state.0).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if let Err(response) = require_role(principal, REVIEWER_ROLES) {
        return response;
    }

    let Some(Json(body)) = payload else {
        return missing_payload();
    };

    let decision = match body.status {
        ApprovalStatus::Approved => {
            let Some(assigned_role) = body.assigned_role else {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "assigned_role is required when approving",
                );
            };
            if !assigned_role.self_assignable() {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "Assigned role must be EDITOR or VIEWER",
                );
            }
            ProcessDecision::Approve { assigned_role }
        }
        ApprovalStatus::Rejected => ProcessDecision::Reject {
            reason: body.reject_reason.clone(),
        },
        ApprovalStatus::Pending => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Decision must be APPROVED or REJECTED",
            );
        }
    };

    match process_register_request(&pool.0, request_id, decision, principal.user_id).await {
        Ok(ProcessOutcome::Approved {
            user_id,
            email,
            name,
        }) => {
            auth_state
                .notifier()
                .dispatch(EmailMessage::registration_result(&email, &name, true, None));
            (
                StatusCode::OK,
                Json(ProcessRegisterResponse {
                    user_id: Some(user_id),
                    status: ApprovalStatus::Approved,
                }),
            )
                .into_response()
        }
        Ok(ProcessOutcome::Rejected { email, name }) => {
            auth_state.notifier().dispatch(EmailMessage::registration_result(
                &email,
                &name,
                false,
                body.reject_reason.as_deref(),
            ));
            (
                StatusCode::OK,
                Json(ProcessRegisterResponse {
                    user_id: None,
                    status: ApprovalStatus::Rejected,
                }),
            )
                .into_response()
        }
        Ok(ProcessOutcome::NotFound) => error_response(
            StatusCode::NOT_FOUND,
            "REQUEST_NOT_FOUND",
            "No such registration request",
        ),
        Ok(ProcessOutcome::AlreadyProcessed) => error_response(
            StatusCode::CONFLICT,
            "ALREADY_PROCESSED",
            "Request has already been processed",
        ),
        Ok(ProcessOutcome::EmailTaken) => error_response(
            StatusCode::CONFLICT,
            "EMAIL_ALREADY_EXISTS",
            "An account with this email already exists; request left pending",
        ),
        Err(err) => {
            error!("Failed to process register request: {err}");
            internal_error()
        }
    }
}
