//! Opaque API tokens with expiration.
//!
//! Tokens are 24 random bytes, URL-safe base64 encoded, paired with an
//! absolute expiration instant. They carry no claims; the user store maps a
//! token back to its owner.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes per token (32 base64 characters).
const TOKEN_BYTES: usize = 24;

/// How long a freshly issued token stays valid.
const TOKEN_TTL_SECS: i64 = 3600;

/// A token that would expire within this window is reissued instead of reused.
const REISSUE_GRACE_SECS: i64 = 60;

/// An opaque bearer token plus its expiration.
///
/// Invariant: a token value never exists without an expiration; readers must
/// treat an expired token exactly like an absent one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl ApiToken {
    /// Mint a fresh token valid for one hour from `now`.
    pub fn issue(now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
            expires_at: now + Duration::seconds(TOKEN_TTL_SECS),
        }
    }

    /// Whether the token is still usable at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether the token is worth handing out again instead of reissuing.
    ///
    /// Matches the issue path: an existing token is reused only while it has
    /// more than a minute of life left.
    pub fn outlives_grace(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::seconds(REISSUE_GRACE_SECS)
    }

    /// Force the token into the past so every reader sees it as absent.
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.expires_at = now - Duration::seconds(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_is_valid_for_an_hour() {
        let now = Utc::now();
        let token = ApiToken::issue(now);
        assert!(token.is_valid(now));
        assert!(token.is_valid(now + Duration::seconds(3599)));
        assert!(!token.is_valid(now + Duration::seconds(3600)));
    }

    #[test]
    fn issued_tokens_are_unique_and_url_safe() {
        let now = Utc::now();
        let a = ApiToken::issue(now);
        let b = ApiToken::issue(now);
        assert_ne!(a.value, b.value);
        assert_eq!(a.value.len(), 32);
        assert!(a.value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn grace_window_forces_reissue_near_expiry() {
        let now = Utc::now();
        let token = ApiToken {
            value: "x".repeat(32),
            expires_at: now + Duration::seconds(30),
        };
        assert!(token.is_valid(now));
        assert!(!token.outlives_grace(now));
    }

    #[test]
    fn revoked_token_reads_as_absent() {
        let now = Utc::now();
        let mut token = ApiToken::issue(now);
        token.revoke(now);
        assert!(!token.is_valid(now));
    }
}
