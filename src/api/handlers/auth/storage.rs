//! Database helpers for users and registration requests.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

use super::role::Role;
use super::types::ApprovalStatus;
use super::utils::is_unique_violation;

/// A provisioned account row.
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) name: String,
    pub(super) hashed_password: String,
    pub(super) role: Role,
    pub(super) is_active: bool,
    pub(super) email_verified_at: Option<OffsetDateTime>,
}

/// Outcome when submitting a registration request.
#[derive(Debug)]
pub(super) enum SubmitOutcome {
    Created,
    /// A pending request for this email already exists.
    Conflict,
}

/// Admin decision applied to a pending request.
#[derive(Debug)]
pub(super) enum ProcessDecision {
    Approve { assigned_role: Role },
    Reject { reason: Option<String> },
}

/// Outcome of processing a registration request.
#[derive(Debug)]
pub(super) enum ProcessOutcome {
    Approved {
        user_id: Uuid,
        email: String,
        name: String,
    },
    Rejected {
        email: String,
        name: String,
    },
    NotFound,
    AlreadyProcessed,
    /// The email was provisioned between submission and approval.
    EmailTaken,
}

/// One row of the admin listing.
pub(super) struct RegisterRequestRow {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) name: String,
    pub(super) requested_role: Role,
    pub(super) status: ApprovalStatus,
    pub(super) email_verified_at: Option<OffsetDateTime>,
    pub(super) created_at: OffsetDateTime,
}

fn parse_role(value: &str) -> Result<Role> {
    Role::parse(value).ok_or_else(|| anyhow!("unexpected role value in database: {value}"))
}

fn parse_status(value: &str) -> Result<ApprovalStatus> {
    ApprovalStatus::parse(value)
        .ok_or_else(|| anyhow!("unexpected request status in database: {value}"))
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        hashed_password: row.get("hashed_password"),
        role: parse_role(&role)?,
        is_active: row.get("is_active"),
        email_verified_at: row.get("email_verified_at"),
    })
}

pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, name, hashed_password, role, is_active, email_verified_at \
                 FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    row.as_ref().map(user_from_row).transpose()
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, name, hashed_password, role, is_active, email_verified_at \
                 FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    row.as_ref().map(user_from_row).transpose()
}

/// Insert a new registration request. A partial unique index on pending
/// emails turns concurrent duplicate submissions into `Conflict` instead of
/// double rows.
pub(super) async fn insert_register_request(
    pool: &PgPool,
    email: &str,
    name: &str,
    hashed_password: &str,
    requested_role: Role,
    email_verified_at: OffsetDateTime,
) -> Result<SubmitOutcome> {
    let query = r"
        INSERT INTO register_requests
            (email, name, hashed_password, requested_role, email_verified_at)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(name)
        .bind(hashed_password)
        .bind(requested_role.as_str())
        .bind(email_verified_at)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(SubmitOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(SubmitOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert register request"),
    }
}

/// Page through registration requests in one status, newest first.
pub(super) async fn list_register_requests(
    pool: &PgPool,
    status: ApprovalStatus,
    page: i64,
    limit: i64,
) -> Result<(Vec<RegisterRequestRow>, i64)> {
    let count_query = "SELECT COUNT(*) AS total FROM register_requests WHERE status = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = count_query
    );
    let total: i64 = sqlx::query(count_query)
        .bind(status.as_str())
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count register requests")?
        .get("total");

    let query = r"
        SELECT id, email, name, requested_role, status, email_verified_at, created_at
        FROM register_requests
        WHERE status = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(status.as_str())
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list register requests")?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let requested_role: String = row.get("requested_role");
        let status_value: String = row.get("status");
        items.push(RegisterRequestRow {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            requested_role: parse_role(&requested_role)?,
            status: parse_status(&status_value)?,
            email_verified_at: row.get("email_verified_at"),
            created_at: row.get("created_at"),
        });
    }

    Ok((items, total))
}

/// Apply an admin decision to a pending request.
///
/// The status flip uses a compare-and-set on `status = 'PENDING'`, so two
/// admins racing on the same request resolve to exactly one winner. Approval
/// creates the user inside the same transaction; if the email was taken in
/// the meantime, the whole transaction rolls back and the request stays
/// pending.
pub(super) async fn process_register_request(
    pool: &PgPool,
    request_id: Uuid,
    decision: ProcessDecision,
    processed_by: Uuid,
) -> Result<ProcessOutcome> {
    let mut tx = pool.begin().await.context("begin process transaction")?;

    let (new_status, reject_reason) = match &decision {
        ProcessDecision::Approve { .. } => (ApprovalStatus::Approved, None),
        ProcessDecision::Reject { reason } => (ApprovalStatus::Rejected, reason.as_deref()),
    };

    let query = r"
        UPDATE register_requests
        SET status = $2, processed_by = $3, processed_at = NOW(), reject_reason = $4
        WHERE id = $1 AND status = 'PENDING'
        RETURNING email, name, hashed_password, email_verified_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let claimed = sqlx::query(query)
        .bind(request_id)
        .bind(new_status.as_str())
        .bind(processed_by)
        .bind(reject_reason)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to claim register request")?;

    let Some(claimed) = claimed else {
        // Lost the compare-and-set; find out whether the request exists.
        let _ = tx.rollback().await;
        let query = "SELECT status FROM register_requests WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(request_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to check register request status")?;
        return Ok(if row.is_some() {
            ProcessOutcome::AlreadyProcessed
        } else {
            ProcessOutcome::NotFound
        });
    };

    let email: String = claimed.get("email");
    let name: String = claimed.get("name");

    match decision {
        ProcessDecision::Approve { assigned_role } => {
            let hashed_password: String = claimed.get("hashed_password");
            let email_verified_at: Option<OffsetDateTime> = claimed.get("email_verified_at");

            let query = r"
                INSERT INTO users (email, name, hashed_password, role, email_verified_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let inserted = sqlx::query(query)
                .bind(&email)
                .bind(&name)
                .bind(&hashed_password)
                .bind(assigned_role.as_str())
                .bind(email_verified_at)
                .fetch_one(&mut *tx)
                .instrument(span)
                .await;

            match inserted {
                Ok(row) => {
                    tx.commit().await.context("commit approval transaction")?;
                    Ok(ProcessOutcome::Approved {
                        user_id: row.get("id"),
                        email,
                        name,
                    })
                }
                Err(err) if is_unique_violation(&err) => {
                    // Rollback leaves the request pending for a later decision.
                    let _ = tx.rollback().await;
                    Ok(ProcessOutcome::EmailTaken)
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    Err(err).context("failed to provision user from request")
                }
            }
        }
        ProcessDecision::Reject { .. } => {
            tx.commit().await.context("commit rejection transaction")?;
            Ok(ProcessOutcome::Rejected { email, name })
        }
    }
}

/// Replace a user's password hash. Returns false when the user is gone.
pub(super) async fn update_user_password(
    pool: &PgPool,
    user_id: Uuid,
    hashed_password: &str,
) -> Result<bool> {
    let query = "UPDATE users SET hashed_password = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(hashed_password)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update user password")?;

    Ok(result.rows_affected() == 1)
}
