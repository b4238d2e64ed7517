//! Signed bearer tokens: a short-lived access token returned in response
//! bodies and a long-lived refresh token held in an HttpOnly cookie.
//!
//! Validation failures are deliberately indistinguishable to callers: a
//! forged signature, a malformed payload, the wrong token kind, and an
//! expired claim all come back as `None`.

use anyhow::Result;
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::kv::{KvStore, Namespace};

/// Bounded allowance for clock skew between issuer and validator.
const CLOCK_SKEW_LEEWAY_SECONDS: u64 = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TokenClaims {
    /// Subject: the user id.
    pub(super) sub: Uuid,
    /// Expiry as seconds since the Unix epoch.
    pub(super) exp: u64,
    /// Token kind, so the two credentials are never interchangeable.
    pub(super) typ: String,
    /// Unique id, keyed by the revocation deny-list.
    pub(super) jti: Uuid,
}

/// Sign a new token for `subject`.
///
/// # Errors
/// Returns an error if serialization or signing fails.
pub(super) fn issue(
    secret: &SecretString,
    subject: Uuid,
    kind: TokenKind,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = TokenClaims {
        sub: subject,
        exp: get_current_timestamp() + ttl_seconds,
        typ: kind.as_str().to_string(),
        jti: Uuid::new_v4(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
}

/// Check signature, expiry, and kind. All failures collapse to `None`.
pub(super) fn decode_token(
    secret: &SecretString,
    token: &str,
    expected: TokenKind,
) -> Option<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY_SECONDS;
    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .ok()?;
    (data.claims.typ == expected.as_str()).then_some(data.claims)
}

/// Seconds until the claim expires, if it has not already.
fn remaining_ttl(claims: &TokenClaims) -> Option<Duration> {
    let now = get_current_timestamp();
    (claims.exp > now).then(|| Duration::from_secs(claims.exp - now))
}

/// Put the token's id on the deny-list for its remaining lifetime. An
/// already-expired token needs no entry.
///
/// # Errors
/// Returns an error on store I/O failure.
pub(super) async fn revoke(kv: &KvStore, claims: &TokenClaims) -> Result<()> {
    if let Some(ttl) = remaining_ttl(claims) {
        kv.put(
            Namespace::TokenDenylist,
            &claims.jti.to_string(),
            "revoked",
            ttl,
        )
        .await?;
    }
    Ok(())
}

/// Full validation: signature, expiry, kind, then the deny-list.
///
/// # Errors
/// Returns an error only when the deny-list cannot be consulted; an
/// unreachable store must fail closed, not admit revoked tokens.
pub(super) async fn validate(
    kv: &KvStore,
    secret: &SecretString,
    token: &str,
    expected: TokenKind,
) -> Result<Option<TokenClaims>> {
    let Some(claims) = decode_token(secret, token, expected) else {
        return Ok(None);
    };
    let revoked = kv
        .get(Namespace::TokenDenylist, &claims.jti.to_string())
        .await?
        .is_some();
    Ok((!revoked).then_some(claims))
}

#[cfg(test)]
mod tests {
    use super::{decode_token, issue, revoke, validate, TokenClaims, TokenKind};
    use crate::kv::KvStore;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use secrecy::SecretString;
    use uuid::Uuid;

    fn secret() -> SecretString {
        SecretString::from("sikreta".to_string())
    }

    #[test]
    fn issue_then_decode() {
        let user_id = Uuid::new_v4();
        let token = issue(&secret(), user_id, TokenKind::Access, 60).unwrap();
        let claims = decode_token(&secret(), &token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.typ, "access");
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let token = issue(&secret(), Uuid::new_v4(), TokenKind::Refresh, 60).unwrap();
        assert!(decode_token(&secret(), &token, TokenKind::Access).is_none());
        assert!(decode_token(&secret(), &token, TokenKind::Refresh).is_some());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue(&secret(), Uuid::new_v4(), TokenKind::Access, 60).unwrap();
        let other = SecretString::from("malsama".to_string());
        assert!(decode_token(&other, &token, TokenKind::Access).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_token(&secret(), "", TokenKind::Access).is_none());
        assert!(decode_token(&secret(), "not.a.token", TokenKind::Access).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            exp: get_current_timestamp() - 60,
            typ: "access".to_string(),
            jti: Uuid::new_v4(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"sikreta"),
        )
        .unwrap();
        assert!(decode_token(&secret(), &token, TokenKind::Access).is_none());
    }

    #[tokio::test]
    async fn revoked_token_fails_validation() {
        let kv = KvStore::memory();
        let token = issue(&secret(), Uuid::new_v4(), TokenKind::Refresh, 60).unwrap();
        let claims = decode_token(&secret(), &token, TokenKind::Refresh).unwrap();

        assert!(validate(&kv, &secret(), &token, TokenKind::Refresh)
            .await
            .unwrap()
            .is_some());

        revoke(&kv, &claims).await.unwrap();
        assert!(validate(&kv, &secret(), &token, TokenKind::Refresh)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn revoking_one_token_leaves_others_valid() {
        let kv = KvStore::memory();
        let user_id = Uuid::new_v4();
        let first = issue(&secret(), user_id, TokenKind::Refresh, 60).unwrap();
        let second = issue(&secret(), user_id, TokenKind::Refresh, 60).unwrap();
        let first_claims = decode_token(&secret(), &first, TokenKind::Refresh).unwrap();

        revoke(&kv, &first_claims).await.unwrap();

        assert!(validate(&kv, &secret(), &first, TokenKind::Refresh)
            .await
            .unwrap()
            .is_none());
        assert!(validate(&kv, &secret(), &second, TokenKind::Refresh)
            .await
            .unwrap()
            .is_some());
    }
}
