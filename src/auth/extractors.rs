use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::{error::ApiError, gate::Pass};

/// The authenticated user the gate admitted. Handlers never look at tokens
/// themselves.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pass = parts
            .extensions
            .get::<Pass>()
            .ok_or(ApiError::Unauthenticated)?;
        pass.principal.user_id().map(AuthUser).ok_or_else(|| {
            warn!(
                operation = pass.operation.name(),
                "handler needs a user but the operation is public"
            );
            ApiError::Unauthenticated
        })
    }
}
