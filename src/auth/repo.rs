use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, User},
    error::ApiError,
};

#[derive(Debug, Error)]
pub enum InsertUserError {
    /// A unique column (`username` or `email`) already holds this value.
    #[error("duplicate {0}")]
    DuplicateKey(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<InsertUserError> for ApiError {
    fn from(e: InsertUserError) -> Self {
        match e {
            InsertUserError::DuplicateKey(field) => ApiError::DuplicateKey(field),
            InsertUserError::Backend(e) => ApiError::Internal(e),
        }
    }
}

/// Credential store. Implementations must enforce uniqueness of `username`
/// and `email` themselves.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn insert(&self, user: NewUser) -> Result<User, InsertUserError>;
    async fn update_timezone(&self, id: Uuid, timezone: &str) -> anyhow::Result<Option<User>>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, timezone, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, timezone, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, InsertUserError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, timezone)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, timezone, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.timezone)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let field = match db_err.constraint() {
                    Some(c) if c.contains("email") => "email",
                    _ => "username",
                };
                Err(InsertUserError::DuplicateKey(field))
            }
            Err(e) => Err(InsertUserError::Backend(
                anyhow::Error::new(e).context("insert user"),
            )),
        }
    }

    async fn update_timezone(&self, id: Uuid, timezone: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET timezone = $2
            WHERE id = $1
            RETURNING id, username, email, password_hash, timezone, created_at
            "#,
        )
        .bind(id)
        .bind(timezone)
        .fetch_optional(&self.db)
        .await
        .context("update timezone")?;
        Ok(user)
    }
}
