//! User storage port and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ripple_core::{Page, PageRequest, UserId};

use crate::user::User;

/// User store abstraction.
///
/// Uniqueness of `username`/`email` is enforced by implementations on insert
/// and update. Token lookup is reader-side expiry-aware: an expired token
/// behaves exactly like an unknown one.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new account.
    async fn insert(&self, user: &User) -> Result<(), UserStoreError>;

    /// Persist changes to an existing account (profile, token, last_seen).
    async fn update(&self, user: &User) -> Result<(), UserStoreError>;

    /// Fetch by id.
    async fn get(&self, id: UserId) -> Result<Option<User>, UserStoreError>;

    /// Fetch by exact username.
    async fn by_username(&self, username: &str) -> Result<Option<User>, UserStoreError>;

    /// Resolve a bearer token to its owner. Expired tokens resolve to `None`.
    async fn by_token(&self, token: &str, now: DateTime<Utc>)
        -> Result<Option<User>, UserStoreError>;

    /// All users, paginated, oldest first.
    async fn list(&self, page: PageRequest) -> Result<Page<User>, UserStoreError>;

    /// Add a follow edge. Adding an existing edge is a no-op.
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), UserStoreError>;

    /// Remove a follow edge. Removing a missing edge is a no-op.
    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), UserStoreError>;

    async fn is_following(&self, follower: UserId, followed: UserId)
        -> Result<bool, UserStoreError>;

    /// Users who follow `of`, paginated.
    async fn followers(&self, of: UserId, page: PageRequest) -> Result<Page<User>, UserStoreError>;

    /// Users whom `of` follows, paginated.
    async fn following(&self, of: UserId, page: PageRequest) -> Result<Page<User>, UserStoreError>;

    /// Record request activity for the authenticated user.
    async fn touch_last_seen(&self, id: UserId, now: DateTime<Utc>) -> Result<(), UserStoreError>;
}

/// User store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UserStoreError {
    #[error("user not found: {0}")]
    NotFound(UserId),
    #[error("username already taken: {0}")]
    DuplicateUsername(String),
    #[error("email already registered: {0}")]
    DuplicateEmail(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory user store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
    // (follower, followed) edges
    follows: RwLock<HashSet<(UserId, UserId)>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(
        users: &HashMap<UserId, User>,
        candidate: &User,
    ) -> Result<(), UserStoreError> {
        for existing in users.values() {
            if existing.id == candidate.id {
                continue;
            }
            if existing.username == candidate.username {
                return Err(UserStoreError::DuplicateUsername(candidate.username.clone()));
            }
            if existing.email == candidate.email {
                return Err(UserStoreError::DuplicateEmail(candidate.email.clone()));
            }
        }
        Ok(())
    }

    fn paginate(mut users: Vec<User>, page: PageRequest) -> Page<User> {
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        let total = users.len() as u64;
        let items = users
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Page::new(items, page, total)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: &User) -> Result<(), UserStoreError> {
        let mut users = self.users.write().unwrap();
        Self::check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), UserStoreError> {
        let mut users = self.users.write().unwrap();
        if !users.contains_key(&user.id) {
            return Err(UserStoreError::NotFound(user.id));
        }
        Self::check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, UserStoreError> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    async fn by_username(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserStoreError> {
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|u| u.valid_token(now).is_some_and(|t| t.value == token))
            .cloned())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<User>, UserStoreError> {
        let users: Vec<User> = self.users.read().unwrap().values().cloned().collect();
        Ok(Self::paginate(users, page))
    }

    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), UserStoreError> {
        {
            let users = self.users.read().unwrap();
            for id in [follower, followed] {
                if !users.contains_key(&id) {
                    return Err(UserStoreError::NotFound(id));
                }
            }
        }
        self.follows.write().unwrap().insert((follower, followed));
        Ok(())
    }

    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), UserStoreError> {
        self.follows.write().unwrap().remove(&(follower, followed));
        Ok(())
    }

    async fn is_following(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> Result<bool, UserStoreError> {
        Ok(self.follows.read().unwrap().contains(&(follower, followed)))
    }

    async fn followers(
        &self,
        of: UserId,
        page: PageRequest,
    ) -> Result<Page<User>, UserStoreError> {
        let follower_ids: Vec<UserId> = self
            .follows
            .read()
            .unwrap()
            .iter()
            .filter(|(_, followed)| *followed == of)
            .map(|(follower, _)| *follower)
            .collect();
        let users = self.users.read().unwrap();
        let selected = follower_ids
            .into_iter()
            .filter_map(|id| users.get(&id).cloned())
            .collect();
        Ok(Self::paginate(selected, page))
    }

    async fn following(
        &self,
        of: UserId,
        page: PageRequest,
    ) -> Result<Page<User>, UserStoreError> {
        let followed_ids: Vec<UserId> = self
            .follows
            .read()
            .unwrap()
            .iter()
            .filter(|(follower, _)| *follower == of)
            .map(|(_, followed)| *followed)
            .collect();
        let users = self.users.read().unwrap();
        let selected = followed_ids
            .into_iter()
            .filter_map(|id| users.get(&id).cloned())
            .collect();
        Ok(Self::paginate(selected, page))
    }

    async fn touch_last_seen(&self, id: UserId, now: DateTime<Utc>) -> Result<(), UserStoreError> {
        let mut users = self.users.write().unwrap();
        let user = users.get_mut(&id).ok_or(UserStoreError::NotFound(id))?;
        user.last_seen = Some(now);
        Ok(())
    }
}
