mod commands;
pub mod handlers;
pub mod provider;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::chat_routes()
}
