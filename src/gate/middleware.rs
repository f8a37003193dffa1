use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::{principal, Decision, Denial, Operation};
use crate::{error::ApiError, state::AppState};

/// Router-wide gate stage. Every matched route passes through here before its
/// handler. Unmatched paths fall through to the 404 fallback; a matched path
/// with a method the gate does not know is refused.
pub async fn enforce(
    State(state): State<AppState>,
    matched: Option<MatchedPath>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(matched) = matched else {
        return Ok(next.run(req).await);
    };
    let Some(operation) = Operation::classify(req.method(), matched.as_str()) else {
        warn!(method = %req.method(), route = matched.as_str(), "gate refused unclassified method");
        return Err(ApiError::MethodNotAllowed);
    };

    let principal = principal::resolve(&req, &state.sessions);
    match state.gate.authorize(principal, operation, Instant::now()) {
        Decision::Allow(pass) => {
            debug!(principal = %principal, operation = operation.name(), "gate allowed");
            req.extensions_mut().insert(pass);
            Ok(next.run(req).await)
        }
        Decision::Deny(Denial::Unauthenticated) => Err(ApiError::Unauthenticated),
        Decision::Deny(Denial::RateLimited { retry_after }) => Err(ApiError::RateLimited {
            retry_after_secs: retry_after.as_secs_f64().ceil().max(1.0) as u64,
        }),
    }
}
