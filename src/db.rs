use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    auth::{repo::UserStore, services::register_user},
    error::ApiError,
};

pub const DEMO_USERNAME: &str = "demo";
const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo123";

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

pub async fn migrate(db: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(db).await {
        warn!(error = %e, "migration failed; continuing");
    }
}

/// Creates the demo account unless it already exists.
pub async fn seed_demo_user(users: &dyn UserStore) -> anyhow::Result<()> {
    if users.find_by_username(DEMO_USERNAME).await?.is_some() {
        info!("demo user already exists");
        return Ok(());
    }
    match register_user(users, DEMO_USERNAME, DEMO_EMAIL, DEMO_PASSWORD).await {
        Ok(user) => {
            info!(user_id = %user.id, "demo user created");
            Ok(())
        }
        // Lost a race with another instance seeding at the same time.
        Err(ApiError::DuplicateKey(_)) => Ok(()),
        Err(ApiError::Internal(e)) => Err(e.context("seed demo user")),
        Err(e) => Err(anyhow::anyhow!("seed demo user: {e}")),
    }
}
