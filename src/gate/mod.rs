//! Request admission: who is calling, may they call this, and have they
//! called it too often.

pub mod limiter;
mod middleware;
mod operation;
pub mod principal;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::warn;

pub use limiter::{Admission, RateLimiter};
pub use middleware::enforce;
pub use operation::{LimitClass, Operation};
pub use principal::Principal;

use crate::config::RateLimitConfig;

/// Proof that a request went through the gate. Inserted into request
/// extensions so handlers read identity instead of re-deriving it.
#[derive(Debug, Clone, Copy)]
pub struct Pass {
    pub principal: Principal,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    RateLimited { retry_after: Duration },
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::Unauthenticated => "unauthenticated",
            Denial::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Allow(Pass),
    Deny(Denial),
}

pub struct AuthGate {
    limiter: Arc<RateLimiter>,
    limits: RateLimitConfig,
}

impl AuthGate {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(limits.max_keys)),
            limits,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Evaluates both the authentication requirement and the rate limit.
    /// Neither check is skipped when the other fails; an unauthenticated
    /// caller is reported as such even when also over quota.
    pub fn authorize(&self, principal: Principal, operation: Operation, now: Instant) -> Decision {
        let admission = operation.limit_class().map(|class| {
            self.limiter
                .admit(principal, operation, now, self.limits.for_class(class))
        });
        let authenticated = !operation.requires_auth() || principal.user_id().is_some();

        if !authenticated {
            warn!(
                principal = %principal,
                kind = principal.kind(),
                operation = operation.name(),
                reason = Denial::Unauthenticated.reason(),
                "gate denied"
            );
        }
        let rejected = match admission {
            Some(Admission::Reject { retry_after }) => {
                warn!(
                    principal = %principal,
                    kind = principal.kind(),
                    operation = operation.name(),
                    retry_after_secs = retry_after.as_secs(),
                    reason = "rate_limited",
                    "gate denied"
                );
                Some(retry_after)
            }
            _ => None,
        };

        match (authenticated, rejected) {
            (false, _) => Decision::Deny(Denial::Unauthenticated),
            (true, Some(retry_after)) => Decision::Deny(Denial::RateLimited { retry_after }),
            (true, None) => Decision::Allow(Pass {
                principal,
                operation,
            }),
        }
    }
}
