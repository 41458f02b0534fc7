//! User entity: identity, credentials, profile, token lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ripple_auth::{hash_password, verify_password, ApiToken};
use ripple_core::{DomainError, UserId};

const MAX_USERNAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 120;
const MAX_ABOUT_ME_LEN: usize = 140;

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A registered account.
///
/// # Invariants
/// - `username` and `email` are unique across the store (enforced on insert).
/// - `token` is either absent or carries an expiration; every reader treats an
///   expired token as absent.
/// - Users are never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub about_me: Option<String>,
    pub token: Option<ApiToken>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Allow-listed profile update.
///
/// Only the fields named here can ever change through the update path; each
/// one is validated against the same rules as registration before assignment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub about_me: Option<String>,
}

impl User {
    /// Validate registration input and create the account.
    pub fn register(new: NewUser, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let username = validate_username(&new.username)?;
        let email = validate_email(&new.email)?;
        if new.password.is_empty() {
            return Err(DomainError::validation("password cannot be empty"));
        }

        let password_hash =
            hash_password(&new.password).map_err(|e| DomainError::validation(e.to_string()))?;

        Ok(Self {
            id: UserId::new(),
            username,
            email,
            password_hash,
            about_me: None,
            token: None,
            last_seen: None,
            created_at: now,
        })
    }

    /// Check a login password against the stored hash.
    pub fn check_password(&self, password: &str) -> bool {
        verify_password(password, &self.password_hash)
    }

    /// Apply a profile update, validating every field before assignment.
    pub fn apply_update(&mut self, update: UserUpdate) -> Result<(), DomainError> {
        if let Some(username) = update.username {
            self.username = validate_username(&username)?;
        }
        if let Some(email) = update.email {
            self.email = validate_email(&email)?;
        }
        if let Some(about_me) = update.about_me {
            if about_me.chars().count() > MAX_ABOUT_ME_LEN {
                return Err(DomainError::validation("about_me too long"));
            }
            self.about_me = Some(about_me);
        }
        Ok(())
    }

    /// The current token, if it is still usable at `now`.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&ApiToken> {
        self.token.as_ref().filter(|t| t.is_valid(now))
    }

    /// Hand out an API token, reusing the current one while it has more than
    /// a minute of life left, otherwise minting a fresh one.
    pub fn issue_token(&mut self, now: DateTime<Utc>) -> ApiToken {
        if let Some(token) = self.token.as_ref().filter(|t| t.outlives_grace(now)) {
            return token.clone();
        }
        let token = ApiToken::issue(now);
        self.token = Some(token.clone());
        token
    }

    /// Expire the current token immediately. No-op when none is set.
    pub fn revoke_token(&mut self, now: DateTime<Utc>) {
        if let Some(token) = self.token.as_mut() {
            token.revoke(now);
        }
    }
}

fn validate_username(raw: &str) -> Result<String, DomainError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username cannot be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(DomainError::validation("username too long"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("username cannot contain whitespace"));
    }
    Ok(username.to_string())
}

fn validate_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("invalid email format"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(DomainError::validation("email too long"));
    }
    Ok(email)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
