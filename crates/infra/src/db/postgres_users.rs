//! Postgres-backed user store.
//!
//! Uniqueness of username/email is enforced by the database constraints named
//! in the schema; violations are mapped back to the typed duplicate errors so
//! the API can answer 409 without string matching.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use ripple_auth::ApiToken;
use ripple_core::{Page, PageRequest, UserId};
use ripple_users::{User, UserStore, UserStoreError};

/// Postgres implementation of the user store.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: sqlx::Error) -> UserStoreError {
    UserStoreError::Storage(e.to_string())
}

fn duplicate_err(user: &User, e: sqlx::Error) -> UserStoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => match db.constraint() {
            Some("users_username_key") => UserStoreError::DuplicateUsername(user.username.clone()),
            Some("users_email_key") => UserStoreError::DuplicateEmail(user.email.clone()),
            _ => storage_err(e),
        },
        _ => storage_err(e),
    }
}

fn row_to_user(row: &PgRow) -> Result<User, UserStoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(storage_err)?;
    let token_value: Option<String> = row.try_get("token").map_err(storage_err)?;
    let token_expiration: Option<DateTime<Utc>> =
        row.try_get("token_expiration").map_err(storage_err)?;

    // Invariant: a token value never exists without its expiration.
    let token = match (token_value, token_expiration) {
        (Some(value), Some(expires_at)) => Some(ApiToken { value, expires_at }),
        _ => None,
    };

    Ok(User {
        id: UserId::from_uuid(id),
        username: row.try_get("username").map_err(storage_err)?,
        email: row.try_get("email").map_err(storage_err)?,
        password_hash: row.try_get("password_hash").map_err(storage_err)?,
        about_me: row.try_get("about_me").map_err(storage_err)?,
        token,
        last_seen: row.try_get("last_seen").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
    })
}

const SELECT_USER: &str = "SELECT id, username, email, password_hash, about_me, token, \
                           token_expiration, last_seen, created_at FROM users";

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn insert(&self, user: &User) -> Result<(), UserStoreError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, username, email, password_hash, about_me, token, token_expiration, last_seen, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.about_me)
        .bind(user.token.as_ref().map(|t| t.value.clone()))
        .bind(user.token.as_ref().map(|t| t.expires_at))
        .bind(user.last_seen)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_err(user, e))?;
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), UserStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                password_hash = $4,
                about_me = $5,
                token = $6,
                token_expiration = $7,
                last_seen = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.about_me)
        .bind(user.token.as_ref().map(|t| t.value.clone()))
        .bind(user.token.as_ref().map(|t| t.expires_at))
        .bind(user.last_seen)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_err(user, e))?;

        if result.rows_affected() == 0 {
            return Err(UserStoreError::NotFound(user.id));
        }
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, UserStoreError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn by_username(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserStoreError> {
        // Expiry is enforced in the query: an expired token never resolves.
        let row = sqlx::query(&format!(
            "{SELECT_USER} WHERE token = $1 AND token_expiration > $2"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn list(&self, page: PageRequest) -> Result<Page<User>, UserStoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let rows = sqlx::query(&format!(
            "{SELECT_USER} ORDER BY created_at, username LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let items = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn follow(&self, follower: UserId, followed: UserId) -> Result<(), UserStoreError> {
        sqlx::query(
            "INSERT INTO followers (follower_id, followed_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(follower.as_uuid())
        .bind(followed.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_foreign_key_violation() => UserStoreError::NotFound(followed),
            _ => storage_err(e),
        })?;
        Ok(())
    }

    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<(), UserStoreError> {
        sqlx::query("DELETE FROM followers WHERE follower_id = $1 AND followed_id = $2")
            .bind(follower.as_uuid())
            .bind(followed.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn is_following(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> Result<bool, UserStoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM followers WHERE follower_id = $1 AND followed_id = $2)",
        )
        .bind(follower.as_uuid())
        .bind(followed.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(exists)
    }

    async fn followers(
        &self,
        of: UserId,
        page: PageRequest,
    ) -> Result<Page<User>, UserStoreError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM followers WHERE followed_id = $1")
                .bind(of.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err)?;

        let rows = sqlx::query(&format!(
            "{SELECT_USER} u JOIN followers f ON f.follower_id = u.id \
             WHERE f.followed_id = $1 ORDER BY u.created_at, u.username LIMIT $2 OFFSET $3"
        ))
        .bind(of.as_uuid())
        .bind(i64::from(page.per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let items = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn following(
        &self,
        of: UserId,
        page: PageRequest,
    ) -> Result<Page<User>, UserStoreError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM followers WHERE follower_id = $1")
                .bind(of.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err)?;

        let rows = sqlx::query(&format!(
            "{SELECT_USER} u JOIN followers f ON f.followed_id = u.id \
             WHERE f.follower_id = $1 ORDER BY u.created_at, u.username LIMIT $2 OFFSET $3"
        ))
        .bind(of.as_uuid())
        .bind(i64::from(page.per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let items = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn touch_last_seen(&self, id: UserId, now: DateTime<Utc>) -> Result<(), UserStoreError> {
        let result = sqlx::query("UPDATE users SET last_seen = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(UserStoreError::NotFound(id));
        }
        Ok(())
    }
}
