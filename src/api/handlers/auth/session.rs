//! Login, refresh, and logout.
//!
//! The access token travels in response bodies and `Authorization` headers;
//! the refresh token lives only in an `HttpOnly` cookie scoped to the
//! refresh path. The two are never interchangeable.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password::verify_password;
use super::state::{AuthConfig, AuthState};
use super::storage::lookup_user_by_id;
use super::tokens::{self, TokenKind};
use super::types::{
    error_response, internal_error, missing_payload, ErrorBody, LoginRequest, TokenResponse,
};
use super::utils::{normalize_email, valid_email};

const REFRESH_COOKIE_NAME: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/v1/auth/refresh";

/// Exchange credentials for an access token plus a refresh cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 401, description = "Unknown email or wrong password", body = ErrorBody),
        (status = 403, description = "Unverified or disabled account", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return invalid_credentials();
    }

    let user = match super::storage::lookup_user_by_email(&pool.0, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for login: {err}");
            return internal_error();
        }
    };

    // Unknown email and wrong password are indistinguishable on purpose.
    let Some(user) = user else {
        return invalid_credentials();
    };
    if !verify_password(&request.password, &user.hashed_password) {
        return invalid_credentials();
    }

    if user.email_verified_at.is_none() {
        return error_response(
            StatusCode::FORBIDDEN,
            "EMAIL_NOT_VERIFIED",
            "Email address has not been verified",
        );
    }
    if !user.is_active {
        return error_response(
            StatusCode::FORBIDDEN,
            "ACCOUNT_DISABLED",
            "Account is disabled",
        );
    }

    let config = auth_state.config();
    let secret = config.token_secret();
    let access = tokens::issue(
        secret,
        user.id,
        TokenKind::Access,
        config.access_token_ttl_seconds(),
    );
    let refresh = tokens::issue(
        secret,
        user.id,
        TokenKind::Refresh,
        config.refresh_token_ttl_seconds(),
    );
    let (access, refresh) = match (access, refresh) {
        (Ok(access), Ok(refresh)) => (access, refresh),
        (Err(err), _) | (_, Err(err)) => {
            error!("Failed to sign tokens: {err}");
            return internal_error();
        }
    };

    let mut headers = HeaderMap::new();
    match refresh_cookie(config, &refresh) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return internal_error();
        }
    }

    (
        StatusCode::OK,
        headers,
        Json(TokenResponse {
            access_token: access,
            token_type: "Bearer".to_string(),
            expires_in: config.access_token_ttl_seconds(),
        }),
    )
        .into_response()
}

/// Mint a fresh access token from the refresh cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "New access token", body = TokenResponse),
        (status = 401, description = "Missing, invalid, or revoked refresh token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_refresh_token(&headers) else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "NO_REFRESH_TOKEN",
            "Refresh token cookie is missing",
        );
    };

    let config = auth_state.config();
    let claims = match tokens::validate(
        auth_state.kv(),
        config.token_secret(),
        &token,
        TokenKind::Refresh,
    )
    .await
    {
        Ok(Some(claims)) => claims,
        Ok(None) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Refresh token is invalid or revoked",
            );
        }
        Err(err) => {
            error!("Failed to validate refresh token: {err}");
            return internal_error();
        }
    };

    // Re-check the account on every refresh; deactivation cuts sessions
    // short within one access-token lifetime.
    let user = match lookup_user_by_id(&pool.0, claims.sub).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for refresh: {err}");
            return internal_error();
        }
    };
    let active = user.as_ref().is_some_and(|user| user.is_active);
    if !active {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "USER_NOT_FOUND",
            "Account no longer exists or is disabled",
        );
    }

    let access = match tokens::issue(
        config.token_secret(),
        claims.sub,
        TokenKind::Access,
        config.access_token_ttl_seconds(),
    ) {
        Ok(access) => access,
        Err(err) => {
            error!("Failed to sign access token: {err}");
            return internal_error();
        }
    };

    (
        StatusCode::OK,
        Json(TokenResponse {
            access_token: access,
            token_type: "Bearer".to_string(),
            expires_in: config.access_token_ttl_seconds(),
        }),
    )
        .into_response()
}

/// Revoke the presented refresh token and clear its cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let config = auth_state.config();
    if let Some(token) = extract_refresh_token(&headers) {
        if let Some(claims) = tokens::decode_token(config.token_secret(), &token, TokenKind::Refresh)
        {
            if let Err(err) = tokens::revoke(auth_state.kv(), &claims).await {
                error!("Failed to revoke refresh token: {err}");
            }
        }
    }

    // Always clear the cookie, even when no valid token was presented.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

fn invalid_credentials() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "INVALID_CREDENTIALS",
        "Invalid email or password",
    )
}

/// Build the `HttpOnly` refresh cookie, scoped to the refresh endpoint so
/// the browser never attaches it elsewhere.
fn refresh_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.refresh_token_ttl_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    );
    if config.refresh_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age=0"
    );
    if config.refresh_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read the refresh token from the cookie header only. A bearer header is
/// never accepted here; the two credentials stay in separate channels.
fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        // Segments without an `=` (flag-style cookies) are skipped, not fatal.
        let mut parts = pair.trim().splitn(2, '=');
        let Some(key) = parts.next() else {
            continue;
        };
        let Some(val) = parts.next() else {
            continue;
        };
        if key.trim() == REFRESH_COOKIE_NAME {
            return Some(val.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{clear_refresh_cookie, extract_refresh_token, refresh_cookie};
    use crate::api::handlers::auth::state::AuthConfig;
    use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
    use secrecy::SecretString;

    fn config(frontend: &str) -> AuthConfig {
        AuthConfig::new(
            frontend.to_string(),
            SecretString::from("sikreta".to_string()),
        )
    }

    #[test]
    fn refresh_cookie_is_scoped_and_httponly() {
        let cookie = refresh_cookie(&config("http://localhost:3000"), "tok").unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("refresh_token=tok"));
        assert!(value.contains("Path=/v1/auth/refresh"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn https_frontend_marks_cookie_secure() {
        let cookie = refresh_cookie(&config("https://app.aliro.dev"), "tok").unwrap();
        assert!(cookie.to_str().unwrap().contains("; Secure"));
    }

    #[test]
    fn clearing_sets_zero_max_age() {
        let cookie = clear_refresh_cookie(&config("http://localhost:3000")).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.contains("Max-Age=0"));
        assert!(value.starts_with("refresh_token=;"));
    }

    #[test]
    fn extracts_token_from_cookie_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc123; lang=eo"),
        );
        assert_eq!(extract_refresh_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn flag_cookies_do_not_abort_the_scan() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("foo; refresh_token=abc123"),
        );
        assert_eq!(extract_refresh_token(&headers), Some("abc123".to_string()));

        headers.insert(COOKIE, HeaderValue::from_static("foo; bar"));
        assert_eq!(extract_refresh_token(&headers), None);
    }

    #[test]
    fn bearer_header_is_not_a_refresh_source() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(extract_refresh_token(&headers), None);
    }
}
