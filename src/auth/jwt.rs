use std::time::Duration;

use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::JwtConfig;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
    pub jti: Uuid,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs, verifies and revokes session tokens.
///
/// Revoked token ids are remembered until the token would have expired
/// anyway; `prune_revoked` forgets them after that.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revoked: DashMap<Uuid, usize>,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64).saturating_mul(60)),
            refresh_ttl: Duration::from_secs(
                (cfg.refresh_ttl_minutes.max(0) as u64).saturating_mul(60),
            ),
            revoked: DashMap::new(),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let ttl = TimeDuration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("token lifetime out of range"))?;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign_with_kind(user_id, TokenKind::Access)?,
            refresh_token: self.sign_with_kind(user_id, TokenKind::Refresh)?,
        })
    }

    fn decode_claims(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if self.revoked.contains_key(&data.claims.jti) {
            anyhow::bail!("token revoked");
        }
        Ok(data.claims)
    }

    /// Returns the user bound to a live access token.
    pub fn verify(&self, token: &str) -> Option<Uuid> {
        match self.decode_claims(token) {
            Ok(claims) if claims.kind == TokenKind::Access => Some(claims.sub),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "access token rejected");
                None
            }
        }
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.decode_claims(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }

    /// Verifies a refresh token and marks it used in one step. Of several
    /// concurrent callers presenting the same token, exactly one succeeds.
    pub fn consume_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify_refresh(token)?;
        if self.revoked.insert(claims.jti, claims.exp).is_some() {
            anyhow::bail!("refresh token already used");
        }
        debug!(user_id = %claims.sub, "refresh token consumed");
        Ok(claims)
    }

    /// Revokes a token of either kind. Returns false when the token was
    /// already invalid.
    pub fn revoke(&self, token: &str) -> bool {
        match self.decode_claims(token) {
            Ok(claims) => {
                self.revoked.insert(claims.jti, claims.exp);
                debug!(user_id = %claims.sub, kind = ?claims.kind, "jwt revoked");
                true
            }
            Err(e) => {
                warn!(error = %e, "revoke ignored invalid token");
                false
            }
        }
    }

    pub fn prune_revoked(&self, now: OffsetDateTime) -> usize {
        let now = now.unix_timestamp().max(0) as usize;
        let before = self.revoked.len();
        self.revoked.retain(|_, exp| *exp > now);
        before.saturating_sub(self.revoked.len())
    }
}
