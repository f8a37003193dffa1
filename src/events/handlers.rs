use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{DeleteResponse, EventItem, EventList, EventMutation, EventRequest},
    repo_types::EventFields,
};
use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/:id", put(update_event).delete(delete_event))
}

#[instrument(skip(state))]
pub async fn list_events(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<EventList>, ApiError> {
    let events = state.events.list_for_user(user_id).await?;
    Ok(Json(EventList {
        events: events.into_iter().map(EventItem::from).collect(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<EventRequest>,
) -> Result<(StatusCode, Json<EventMutation>), ApiError> {
    let fields = EventFields::try_from(payload)?;
    let event = state.events.insert(user_id, fields).await?;
    info!(%user_id, event_id = %event.id, "event created");
    Ok((
        StatusCode::CREATED,
        Json(EventMutation {
            success: true,
            event: event.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<EventRequest>,
) -> Result<Json<EventMutation>, ApiError> {
    let fields = EventFields::try_from(payload)?;
    let event = state
        .events
        .update(user_id, id, fields)
        .await?
        .ok_or(ApiError::NotFound("Event"))?;
    info!(%user_id, event_id = %id, "event updated");
    Ok(Json(EventMutation {
        success: true,
        event: event.into(),
    }))
}

#[instrument(skip(state))]
pub async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.events.delete(user_id, id).await? {
        return Err(ApiError::NotFound("Event"));
    }
    info!(%user_id, event_id = %id, "event deleted");
    Ok(Json(DeleteResponse { success: true }))
}
