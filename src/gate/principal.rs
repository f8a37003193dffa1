use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
};
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;

/// The actor behind a request. Used only as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principal {
    Authenticated { user_id: Uuid },
    Anonymous { addr: IpAddr },
}

impl Principal {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::Authenticated { user_id } => Some(*user_id),
            Principal::Anonymous { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Principal::Authenticated { .. } => "authenticated",
            Principal::Anonymous { .. } => "anonymous",
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Authenticated { user_id } => write!(f, "user:{user_id}"),
            Principal::Anonymous { addr } => write!(f, "addr:{addr}"),
        }
    }
}

/// Returns the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the acting principal. Never fails: a missing, malformed, expired
/// or revoked token degrades to the peer address.
pub fn resolve(req: &Request, sessions: &JwtKeys) -> Principal {
    if let Some(user_id) = bearer_token(req.headers()).and_then(|t| sessions.verify(t)) {
        return Principal::Authenticated { user_id };
    }

    let addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| peer.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    Principal::Anonymous { addr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use axum::{body::Body, http};

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "principal-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn request(auth: Option<&str>, peer: Option<SocketAddr>) -> Request {
        let mut builder = http::Request::builder().uri("/api/user");
        if let Some(a) = auth {
            builder = builder.header(header::AUTHORIZATION, a);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(p) = peer {
            req.extensions_mut().insert(ConnectInfo(p));
        }
        req
    }

    #[test]
    fn valid_access_token_resolves_to_user() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let pair = keys.issue(user_id).unwrap();
        let req = request(Some(&format!("Bearer {}", pair.access_token)), None);
        assert_eq!(resolve(&req, &keys), Principal::Authenticated { user_id });
    }

    #[test]
    fn garbage_token_degrades_to_peer_address() {
        let peer: SocketAddr = "203.0.113.7:5555".parse().unwrap();
        let req = request(Some("Bearer not-a-jwt"), Some(peer));
        assert_eq!(
            resolve(&req, &keys()),
            Principal::Anonymous { addr: peer.ip() }
        );
    }

    #[test]
    fn refresh_token_is_not_a_session() {
        let keys = keys();
        let pair = keys.issue(Uuid::new_v4()).unwrap();
        let req = request(Some(&format!("Bearer {}", pair.refresh_token)), None);
        assert!(resolve(&req, &keys).user_id().is_none());
    }

    #[test]
    fn missing_connect_info_uses_unspecified_address() {
        let req = request(None, None);
        assert_eq!(
            resolve(&req, &keys()),
            Principal::Anonymous {
                addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }
        );
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
