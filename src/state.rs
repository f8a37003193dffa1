use std::{sync::Arc, time::Instant};

use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{PgUserStore, UserStore},
    },
    chat::{
        provider::{ChatProvider, CohereProvider},
        repo::{ConversationStore, PgConversationStore},
    },
    config::AppConfig,
    events::repo::{EventStore, PgEventStore},
    gate::AuthGate,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub events: Arc<dyn EventStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub chat: Arc<dyn ChatProvider>,
    pub sessions: Arc<JwtKeys>,
    pub gate: Arc<AuthGate>,
}

impl AppState {
    pub fn postgres(config: AppConfig, db: PgPool) -> Self {
        let chat = Arc::new(CohereProvider::new(&config.cohere)) as Arc<dyn ChatProvider>;
        Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgEventStore::new(db.clone())),
            Arc::new(PgConversationStore::new(db)),
            chat,
        )
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        events: Arc<dyn EventStore>,
        conversations: Arc<dyn ConversationStore>,
        chat: Arc<dyn ChatProvider>,
    ) -> Self {
        let sessions = Arc::new(JwtKeys::new(&config.jwt));
        let gate = Arc::new(AuthGate::new(config.rate_limit.clone()));
        Self {
            config: Arc::new(config),
            users,
            events,
            conversations,
            chat,
            sessions,
            gate,
        }
    }

    /// Sweeps idle rate windows and expired revocations on a fixed period.
    pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self.gate.limiter());
        let sessions = Arc::clone(&self.sessions);
        let every = self.config.rate_limit.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let windows = limiter.sweep(Instant::now());
                let revocations = sessions.prune_revoked(OffsetDateTime::now_utc());
                debug!(
                    windows,
                    revocations,
                    live_windows = limiter.len(),
                    "maintenance sweep"
                );
            }
        })
    }
}
