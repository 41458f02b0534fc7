//! Schema bootstrap.
//!
//! Statements are idempotent (`IF NOT EXISTS`) so both the api and worker
//! binaries can call this at startup in any order. Proper migration tooling is
//! deliberately out of scope; the schema is small enough to own inline.

use sqlx::PgPool;

/// The `tasks.id` column holds a broker-assigned UUID string.
const JOB_ID_LEN: u16 = 36;

/// Create the tables this application needs if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            username VARCHAR(64) NOT NULL,
            email VARCHAR(120) NOT NULL,
            password_hash VARCHAR(128) NOT NULL,
            about_me VARCHAR(140),
            token VARCHAR(32),
            token_expiration TIMESTAMPTZ,
            last_seen TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            CONSTRAINT users_username_key UNIQUE (username),
            CONSTRAINT users_email_key UNIQUE (email)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS users_token_idx ON users (token)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS followers (
            follower_id UUID NOT NULL REFERENCES users (id),
            followed_id UUID NOT NULL REFERENCES users (id),
            PRIMARY KEY (follower_id, followed_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id VARCHAR({JOB_ID_LEN}) PRIMARY KEY,
            name VARCHAR(128) NOT NULL,
            description VARCHAR(128) NOT NULL,
            user_id UUID NOT NULL REFERENCES users (id),
            complete BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS tasks_owner_incomplete_idx ON tasks (user_id) WHERE NOT complete",
    )
    .execute(pool)
    .await?;

    Ok(())
}
