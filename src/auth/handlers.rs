use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, LogoutRequest, PublicUser, RefreshRequest,
            RegisterRequest, SuccessResponse, TimezoneRequest,
        },
        extractors::AuthUser,
        repo_types::User,
        services::{authenticate, is_valid_timezone, present, register_user, required},
    },
    error::ApiError,
    extract::ApiJson,
    gate::principal::bearer_token,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/logout", get(logout).post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/api/user", get(get_me))
        .route("/api/user/timezone", put(update_timezone))
}

fn session_for(state: &AppState, user: User) -> Result<Json<AuthResponse>, ApiError> {
    let pair = state.sessions.issue(user.id)?;
    Ok(Json(AuthResponse {
        success: true,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let username = required(payload.username, "username")?;
    let email = required(payload.email, "email")?;
    let password = present(payload.password, "password")?;

    let user = register_user(state.users.as_ref(), &username, &email, &password).await?;
    session_for(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let username = required(payload.username, "username")?;
    let password = present(payload.password, "password")?;

    let user = authenticate(state.users.as_ref(), &username, &password).await?;
    info!(user_id = %user.id, username = %user.username, "user logged in");
    session_for(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // Claimed before any await: concurrent replays of one token all fail but one.
    let claims = state.sessions.consume_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        ApiError::Unauthenticated
    })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    session_for(&state, user)
}

/// Always succeeds; revokes whatever tokens were presented.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> Json<SuccessResponse> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token);
    }
    if let Some(token) = body.and_then(|Json(b)| b.refresh_token) {
        state.sessions.revoke(&token);
    }
    Json(SuccessResponse { success: true })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "token for unknown user");
        ApiError::Unauthenticated
    })?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_timezone(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<TimezoneRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let timezone = required(payload.timezone, "timezone")?;
    if !is_valid_timezone(&timezone) {
        return Err(ApiError::validation("Invalid timezone"));
    }

    let user = state
        .users
        .update_timezone(user_id, &timezone)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    info!(user_id = %user.id, timezone = %user.timezone, "timezone updated");
    Ok(Json(user.into()))
}
