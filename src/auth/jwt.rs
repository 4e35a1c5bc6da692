use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, Subject, WireClaims};
use crate::{config::JwtConfig, state::AppState};

const STATE_PURPOSE: &str = "oauth-state";
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token carries no user id")]
    MissingIdentity,
}

impl TokenError {
    fn from_decode(e: jsonwebtoken::errors::Error) -> Self {
        if matches!(e.kind(), ErrorKind::ExpiredSignature) {
            TokenError::Expired
        } else {
            TokenError::Invalid(e)
        }
    }
}

/// Payload of the OAuth `state` parameter.
#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    purpose: String,
    nonce: String,
    exp: usize,
    iss: String,
    aud: String,
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    fn expiry(&self, now: OffsetDateTime, ttl: Duration) -> usize {
        (now + TimeDuration::seconds(ttl.as_secs() as i64)).unix_timestamp() as usize
    }

    /// Sign a session token for a verified user.
    pub fn issue(&self, subject: &Subject) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            id: subject.id,
            email: subject.email.clone(),
            name: subject.name.clone(),
            role: subject.role,
            iat: now.unix_timestamp() as usize,
            exp: self.expiry(now, self.ttl),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %subject.id, role = %subject.role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<WireClaims>(token, &self.decoding, &self.validation())
            .map_err(TokenError::from_decode)?;
        let claims = data.claims.normalize().ok_or(TokenError::MissingIdentity)?;
        debug!(user_id = %claims.id, role = %claims.role, "jwt verified");
        Ok(claims)
    }

    /// Short-lived value for the OAuth `state` parameter. Lets the callback check the
    /// round trip started here without keeping a server-side session.
    pub fn issue_state(&self) -> anyhow::Result<String> {
        let claims = StateClaims {
            purpose: STATE_PURPOSE.into(),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            exp: self.expiry(OffsetDateTime::now_utc(), STATE_TTL),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_state(&self, state: &str) -> Result<(), TokenError> {
        let data = decode::<StateClaims>(state, &self.decoding, &self.validation())
            .map_err(TokenError::from_decode)?;
        if data.claims.purpose != STATE_PURPOSE {
            return Err(TokenError::Invalid(ErrorKind::InvalidToken.into()));
        }
        Ok(())
    }
}
