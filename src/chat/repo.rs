use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Append-only log of chat turns per user.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, user_id: Uuid, role: Role, content: &str) -> anyhow::Result<()>;
}

pub struct PgConversationStore {
    db: PgPool,
}

impl PgConversationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn append(&self, user_id: Uuid, role: Role, content: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO conversations (user_id, role, content) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(role.as_str())
            .bind(content)
            .execute(&self.db)
            .await
            .with_context(|| format!("append {} message", role.as_str()))?;
        Ok(())
    }
}
