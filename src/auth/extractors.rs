use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::claims::Claims;
use super::guards;
use super::jwt::{JwtKeys, TokenError};
use crate::error::AppError;

/// Verified bearer-token identity. The decoded claims are also stored in the request
/// extensions so later extractors on the same request reuse them.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

/// Caller whose token carries the seller role.
#[derive(Debug, Clone)]
pub struct SellerUser(pub Claims);

/// Caller whose token carries the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

pub(crate) fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header.ok_or_else(|| {
        warn!("missing Authorization header");
        AppError::Unauthenticated
    })?;
    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("invalid auth scheme");
        AppError::Unauthenticated
    })?;
    let token = token.trim();
    if token.is_empty() {
        warn!("empty bearer token");
        return Err(AppError::Unauthenticated);
    }
    Ok(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(AuthUser(claims.clone()));
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = bearer_token(header)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            match &e {
                TokenError::Expired => warn!("expired token"),
                TokenError::Invalid(err) => warn!(error = %err, "invalid token"),
                TokenError::MissingIdentity => warn!("token without user id"),
            }
            AppError::Unauthenticated
        })?;

        parts.extensions.insert(claims.clone());
        Ok(AuthUser(claims))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SellerUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        guards::ensure_seller(&claims)?;
        Ok(SellerUser(claims))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        guards::ensure_admin(&claims)?;
        Ok(AdminUser(claims))
    }
}
