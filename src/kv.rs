//! Ephemeral key-value state with mandatory per-entry TTLs.
//!
//! Holds one-time codes, email-verified markers, password reset tokens, and
//! revoked token identifiers. Nothing here is a durability boundary: losing
//! the store only forces a workflow step to restart (request a new code),
//! never the loss of an approved account.
//!
//! Expiry and explicit deletion are indistinguishable to callers; both read
//! back as `None`.

use anyhow::{Context, Result};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Key namespaces used by the identity flows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Namespace {
    /// email -> 6-digit verification code
    Otp,
    /// email -> "1" marker set after a successful code check
    EmailVerified,
    /// reset token hash -> user id
    PasswordReset,
    /// token jti -> revoked marker
    TokenDenylist,
}

impl Namespace {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Otp => "otp",
            Self::EmailVerified => "email-verified",
            Self::PasswordReset => "pw-reset",
            Self::TokenDenylist => "token-denylist",
        }
    }
}

fn full_key(namespace: Namespace, key: &str) -> String {
    format!("{}:{key}", namespace.as_str())
}

/// Ephemeral store handle, constructed once at startup and passed into the
/// components that need it.
#[derive(Clone)]
pub enum KvStore {
    Redis(ConnectionManager),
    Memory(MemoryKv),
}

impl KvStore {
    /// Connect to Redis and return a managed (auto-reconnecting) handle.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid Redis URL")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        Ok(Self::Redis(manager))
    }

    /// In-process store with the same contract, for tests and local runs.
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(MemoryKv::default())
    }

    /// Write a value, overwriting unconditionally and resetting the TTL.
    ///
    /// # Errors
    /// Returns an error only on store I/O failure.
    pub async fn put(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = full_key(namespace, key);
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                // SETEX rejects a zero TTL; clamp up to one second.
                let seconds = ttl.as_secs().max(1);
                let _: () = conn
                    .set_ex(&key, value, seconds)
                    .await
                    .with_context(|| format!("failed to write {key}"))?;
                Ok(())
            }
            Self::Memory(memory) => {
                memory.put(key, value.to_string(), ttl).await;
                Ok(())
            }
        }
    }

    /// Read a value; expired entries read as absent.
    ///
    /// # Errors
    /// Returns an error only on store I/O failure.
    pub async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let key = full_key(namespace, key);
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let value: Option<String> = conn
                    .get(&key)
                    .await
                    .with_context(|| format!("failed to read {key}"))?;
                Ok(value)
            }
            Self::Memory(memory) => Ok(memory.get(&key).await),
        }
    }

    /// Read and delete a key in one step. Two concurrent takers see at most
    /// one value between them, which is what makes single-use tokens
    /// single-use.
    ///
    /// # Errors
    /// Returns an error only on store I/O failure.
    pub async fn take(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let key = full_key(namespace, key);
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let value: Option<String> = conn
                    .get_del(&key)
                    .await
                    .with_context(|| format!("failed to take {key}"))?;
                Ok(value)
            }
            Self::Memory(memory) => Ok(memory.take(&key).await),
        }
    }

    /// Delete a key. Deleting an absent key is not an error.
    ///
    /// # Errors
    /// Returns an error only on store I/O failure.
    pub async fn delete(&self, namespace: Namespace, key: &str) -> Result<()> {
        let key = full_key(namespace, key);
        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let _: () = conn
                    .del(&key)
                    .await
                    .with_context(|| format!("failed to delete {key}"))?;
                Ok(())
            }
            Self::Memory(memory) => {
                memory.delete(&key).await;
                Ok(())
            }
        }
    }
}

/// In-memory TTL map with lazy expiry.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryKv {
    async fn put(&self, key: String, value: String, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expiry)| *expiry > Instant::now());
        entries.insert(key, (value, deadline));
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expiry)) if *expiry > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn take(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let (value, expiry) = entries.remove(key)?;
        (expiry > Instant::now()).then_some(value)
    }

    async fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }
}
