use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Event, EventFields};

/// Calendar storage. Every call is scoped to the owning user; another
/// user's event id behaves as if it did not exist.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Event>>;
    async fn insert(&self, user_id: Uuid, fields: EventFields) -> anyhow::Result<Event>;
    async fn update(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        fields: EventFields,
    ) -> anyhow::Result<Option<Event>>;
    async fn delete(&self, user_id: Uuid, event_id: Uuid) -> anyhow::Result<bool>;
}

pub struct PgEventStore {
    db: PgPool,
}

impl PgEventStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, user_id, title, start_time, end_time, created_at
            FROM events
            WHERE user_id = $1
            ORDER BY start_time ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list events")?;
        Ok(rows)
    }

    async fn insert(&self, user_id: Uuid, fields: EventFields) -> anyhow::Result<Event> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (user_id, title, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, start_time, end_time, created_at
            "#,
        )
        .bind(user_id)
        .bind(&fields.title)
        .bind(fields.start_time)
        .bind(fields.end_time)
        .fetch_one(&self.db)
        .await
        .context("insert event")?;
        Ok(event)
    }

    async fn update(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        fields: EventFields,
    ) -> anyhow::Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
               SET title = $3, start_time = $4, end_time = $5
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, start_time, end_time, created_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(&fields.title)
        .bind(fields.start_time)
        .bind(fields.end_time)
        .fetch_optional(&self.db)
        .await
        .context("update event")?;
        Ok(event)
    }

    async fn delete(&self, user_id: Uuid, event_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete event")?;
        Ok(res.rows_affected() > 0)
    }
}
