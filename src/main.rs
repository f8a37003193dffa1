mod app;
mod auth;
mod chat;
mod config;
mod db;
mod error;
mod extract;
mod events;
mod gate;
mod state;
#[cfg(test)]
mod testing;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "planner=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await;

    let state = AppState::postgres(config, pool);
    if state.config.seed_demo_user {
        db::seed_demo_user(state.users.as_ref()).await?;
    }
    if state.config.cohere.api_key.is_none() {
        tracing::warn!("COHERE_API_KEY not set; chat will answer with the fallback message");
    }
    state.spawn_maintenance();

    app::serve(app::build_app(state)).await
}
