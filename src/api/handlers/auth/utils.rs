//! Small helpers for input validation, one-time codes, and reset tokens.

use base64::Engine;
use rand::{rngs::OsRng, Rng};
use regex::Regex;
use sha2::{Digest, Sha256};

pub(super) const MIN_PASSWORD_LEN: usize = 8;
pub(super) const MAX_PASSWORD_LEN: usize = 100;
pub(super) const MAX_NAME_LEN: usize = 100;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(super) fn valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len)
}

pub(super) fn valid_name(name: &str) -> bool {
    let len = name.trim().chars().count();
    (1..=MAX_NAME_LEN).contains(&len)
}

/// Create a 6-digit verification code, left-padded with zeros.
pub(super) fn generate_otp() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Code format check before comparison; codes are exactly six ASCII digits.
pub(super) fn valid_code_format(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|byte| byte.is_ascii_digit())
}

/// Create a new password reset token for email links.
///
/// Returned token is only sent to the user; the store keys on a hash.
pub(super) fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a reset token so raw values never touch the store.
pub(super) fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Build the frontend reset link included in outbound emails.
pub(super) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password?token={token}")
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        build_reset_url, generate_otp, generate_reset_token, hash_reset_token, normalize_email,
        valid_code_format, valid_email, valid_name, valid_password,
    };

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn email_format_checks() {
        assert!(valid_email("user@example.com"));
        assert!(!valid_email("user@example"));
        assert!(!valid_email("userexample.com"));
        assert!(!valid_email("user @example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn password_length_bounds() {
        assert!(!valid_password("short"));
        assert!(valid_password("eight-ch"));
        assert!(!valid_password(&"x".repeat(101)));
    }

    #[test]
    fn name_must_not_be_blank() {
        assert!(valid_name("Ada"));
        assert!(!valid_name("   "));
        assert!(!valid_name(&"n".repeat(101)));
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..32 {
            let code = generate_otp();
            assert!(valid_code_format(&code), "bad code: {code}");
        }
    }

    #[test]
    fn code_format_rejects_non_digits() {
        assert!(valid_code_format("012345"));
        assert!(!valid_code_format("12345"));
        assert!(!valid_code_format("1234567"));
        assert!(!valid_code_format("12a456"));
    }

    #[test]
    fn reset_tokens_are_unique_and_url_safe() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn reset_token_hash_is_stable_and_distinct() {
        let token = generate_reset_token();
        assert_eq!(hash_reset_token(&token), hash_reset_token(&token));
        assert_ne!(hash_reset_token(&token), token);
    }

    #[test]
    fn reset_url_handles_trailing_slash() {
        assert_eq!(
            build_reset_url("https://app.aliro.dev/", "tok"),
            "https://app.aliro.dev/reset-password?token=tok"
        );
    }
}
