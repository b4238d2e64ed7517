use crate::api::{self, handlers::auth::AuthConfig};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
    pub token_secret: String,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub frontend_base_url: String,
    pub otp_ttl_seconds: u64,
    pub email_verified_ttl_seconds: u64,
    pub password_reset_ttl_seconds: u64,
    pub email_queue_capacity: usize,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the database, Redis, or listener cannot be set up.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(
        args.frontend_base_url,
        SecretString::from(args.token_secret),
    )
    .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
    .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
    .with_otp_ttl_seconds(args.otp_ttl_seconds)
    .with_email_verified_ttl_seconds(args.email_verified_ttl_seconds)
    .with_password_reset_ttl_seconds(args.password_reset_ttl_seconds);

    api::new(
        args.port,
        args.dsn,
        args.redis_url,
        config,
        args.email_queue_capacity,
    )
    .await
}
