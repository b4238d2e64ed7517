//! Shared configuration and per-process state for the identity endpoints.

use secrecy::SecretString;

use crate::api::email::Notifier;
use crate::kv::KvStore;

/// Auth configuration resolved at startup from CLI flags and env vars.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token_secret: SecretString,
    access_token_ttl_seconds: u64,
    refresh_token_ttl_seconds: u64,
    otp_ttl_seconds: u64,
    email_verified_ttl_seconds: u64,
    password_reset_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, token_secret: SecretString) -> Self {
        Self {
            frontend_base_url,
            token_secret,
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604_800,
            otp_ttl_seconds: 600,
            email_verified_ttl_seconds: 1800,
            password_reset_ttl_seconds: 3600,
        }
    }

    #[must_use]
    pub const fn with_access_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_refresh_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_otp_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_email_verified_ttl_seconds(mut self, seconds: u64) -> Self {
        self.email_verified_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_password_reset_ttl_seconds(mut self, seconds: u64) -> Self {
        self.password_reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    #[must_use]
    pub const fn access_token_ttl_seconds(&self) -> u64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_token_ttl_seconds(&self) -> u64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub const fn otp_ttl_seconds(&self) -> u64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub const fn email_verified_ttl_seconds(&self) -> u64 {
        self.email_verified_ttl_seconds
    }

    #[must_use]
    pub const fn password_reset_ttl_seconds(&self) -> u64 {
        self.password_reset_ttl_seconds
    }

    /// Mark the refresh cookie Secure when the deployment fronts HTTPS.
    #[must_use]
    pub fn refresh_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Per-process auth state shared across handlers via `Extension`.
#[derive(Clone)]
pub struct AuthState {
    config: AuthConfig,
    kv: KvStore,
    notifier: Notifier,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, kv: KvStore, notifier: Notifier) -> Self {
        Self {
            config,
            kv,
            notifier,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn kv(&self) -> &KvStore {
        &self.kv
    }

    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;
    use secrecy::SecretString;

    #[test]
    fn builder_overrides_defaults() {
        let config = AuthConfig::new(
            "https://app.aliro.dev".to_string(),
            SecretString::from("sikreta".to_string()),
        )
        .with_access_token_ttl_seconds(60)
        .with_otp_ttl_seconds(120);

        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 604_800);
        assert_eq!(config.otp_ttl_seconds(), 120);
        assert!(config.refresh_cookie_secure());
    }

    #[test]
    fn plain_http_frontend_keeps_cookie_insecure() {
        let config = AuthConfig::new(
            "http://localhost:3000".to_string(),
            SecretString::from("sikreta".to_string()),
        );
        assert!(!config.refresh_cookie_secure());
    }
}
