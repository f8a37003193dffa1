use std::{str::FromStr, time::Duration};

use serde::Deserialize;

use crate::gate::LimitClass;

const DEV_ORIGINS: [&str; 3] = [
    "http://localhost:8080",
    "http://localhost:5173",
    "http://localhost:3000",
];

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CohereConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: Option<String>,
    pub max_tokens: u32,
}

/// Admission budget for one class of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub default: RateLimit,
    pub auth: RateLimit,
    pub chat: RateLimit,
    /// Upper bound on distinct (principal, operation) windows kept in memory.
    pub max_keys: usize,
    pub sweep_interval: Duration,
}

impl RateLimitConfig {
    pub fn for_class(&self, class: LimitClass) -> RateLimit {
        match class {
            LimitClass::Default => self.default,
            LimitClass::Auth => self.auth,
            LimitClass::Chat => self.chat,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: RateLimit::new(20, 60),
            auth: RateLimit::new(10, 60),
            chat: RateLimit::new(20, 60),
            max_keys: 10_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub cohere: CohereConfig,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub seed_demo_user: bool,
}

/// The maintenance ticker must stay within `Instant` range.
const MAX_SWEEP_SECS: u64 = 24 * 60 * 60;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect();
    if origins.is_empty() {
        DEV_ORIGINS.iter().map(|o| o.to_string()).collect()
    } else {
        origins
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "planner".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "planner-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let cohere = CohereConfig {
            api_key: env_opt("COHERE_API_KEY"),
            base_url: env_opt("COHERE_BASE_URL")
                .unwrap_or_else(|| "https://api.cohere.ai/v1".into()),
            model: env_opt("COHERE_MODEL"),
            max_tokens: env_or("COHERE_MAX_TOKENS", 300),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            default: RateLimit::new(
                env_or("RATE_LIMIT_MAX_REQUESTS", defaults.default.max_requests),
                env_or("RATE_LIMIT_WINDOW_SECS", defaults.default.window.as_secs()),
            ),
            auth: RateLimit::new(
                env_or("RATE_LIMIT_AUTH_MAX_REQUESTS", defaults.auth.max_requests),
                env_or("RATE_LIMIT_AUTH_WINDOW_SECS", defaults.auth.window.as_secs()),
            ),
            chat: RateLimit::new(
                env_or("RATE_LIMIT_CHAT_MAX_REQUESTS", defaults.chat.max_requests),
                env_or("RATE_LIMIT_CHAT_WINDOW_SECS", defaults.chat.window.as_secs()),
            ),
            max_keys: env_or("RATE_LIMIT_MAX_KEYS", defaults.max_keys).max(1),
            sweep_interval: Duration::from_secs(
                env_or("RATE_LIMIT_SWEEP_SECS", defaults.sweep_interval.as_secs())
                    .clamp(1, MAX_SWEEP_SECS),
            ),
        };

        Ok(Self {
            database_url,
            jwt,
            cohere,
            cors_allowed_origins: parse_origins(
                &std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default(),
            ),
            rate_limit,
            seed_demo_user: env_or("SEED_DEMO_USER", false),
        })
    }
}
