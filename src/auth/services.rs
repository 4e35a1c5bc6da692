use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use super::claims::Subject;
use super::dto::{AuthResponse, CallbackQuery, LoginRequest, RegisterRequest, SetPasswordRequest};
use super::oauth::ExternalProfile;
use super::password::{
    hash_password, is_acceptable_password, is_valid_email, normalize_email, verify_password,
    verify_without_hash, MIN_PASSWORD_LEN,
};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::model::{NewCredential, NewUser, User};
use crate::users::repo::StoreError;

const EMAIL_TAKEN: &str = "User already exists with this email";

pub fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    Ok(state
        .keys
        .issue(&Subject::from(user))
        .context("sign session token")?)
}

fn password_rule() -> AppError {
    AppError::Validation(format!(
        "Password must be at least {MIN_PASSWORD_LEN} characters long"
    ))
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<AuthResponse, AppError> {
    let name = req.name.trim();
    let email = normalize_email(&req.email);

    if name.is_empty() {
        return Err(AppError::Validation("Name is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("A valid email is required".into()));
    }
    if !is_acceptable_password(&req.password) {
        warn!("password too short");
        return Err(password_rule());
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict(EMAIL_TAKEN.into()));
    }

    let hash = hash_password(&req.password)?;
    let user = state
        .users
        .create(NewUser {
            email,
            name: name.to_owned(),
            credential: NewCredential::Password { hash },
        })
        .await
        .map_err(|e| match e {
            // lost the race against a concurrent registration
            StoreError::Conflict("email") => AppError::Conflict(EMAIL_TAKEN.into()),
            other => other.into(),
        })?;

    let token = issue_token(state, &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(AuthResponse::new(token, &user))
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&req.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        verify_without_hash(&req.password);
        return Err(AppError::InvalidCredentials);
    };
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "login on account without password");
        verify_without_hash(&req.password);
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(&req.password, hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = issue_token(state, &user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(AuthResponse::new(token, &user))
}

pub async fn load_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn set_password(
    state: &AppState,
    user_id: Uuid,
    req: SetPasswordRequest,
) -> Result<User, AppError> {
    if !is_acceptable_password(&req.new_password) {
        return Err(password_rule());
    }

    let user = load_user(state, user_id).await?;
    if let Some(existing) = user.password_hash.as_deref() {
        let current = req.current_password.as_deref().unwrap_or_default();
        if !verify_password(current, existing)? {
            warn!(%user_id, "password change with wrong current password");
            return Err(AppError::InvalidCredentials);
        }
    }

    let hash = hash_password(&req.new_password)?;
    let user = state
        .users
        .set_password_hash(user_id, &hash)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(%user_id, "password set");
    Ok(user)
}

/// Map a provider profile onto a stored user: reuse a linked record, link an
/// email match, or create a new buyer.
pub async fn resolve_external(
    state: &AppState,
    profile: ExternalProfile,
) -> Result<User, AppError> {
    if profile.sub.trim().is_empty() {
        return Err(AppError::Upstream("profile has no subject id".into()));
    }
    if profile.email_verified == Some(false) {
        warn!(sub = %profile.sub, "provider email not verified");
        return Err(AppError::Validation("Google account email is not verified".into()));
    }
    let email = profile
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| AppError::Validation("No email found in Google profile".into()))?;

    let users = state.users.as_ref();
    let existing = state
        .retry
        .run("find user for external login", || {
            users.find_for_external(&profile.sub, &email)
        })
        .await?;

    match existing {
        Some(user) if user.external_id.is_some() => {
            info!(user_id = %user.id, "existing google user");
            Ok(user)
        }
        Some(user) => {
            let linked = users
                .link_external_id(user.id, &profile.sub, profile.picture.as_deref())
                .await?;
            match linked {
                Some(linked) => {
                    info!(user_id = %linked.id, "linked google identity to existing user");
                    Ok(linked)
                }
                // linked concurrently by another callback
                None => load_user(state, user.id).await,
            }
        }
        None => {
            let name = profile
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_owned());
            let user = users
                .create(NewUser {
                    email,
                    name,
                    credential: NewCredential::External {
                        id: profile.sub.clone(),
                        picture: profile.picture.clone(),
                    },
                })
                .await?;
            info!(user_id = %user.id, "created user from google profile");
            Ok(user)
        }
    }
}

/// Everything between the provider redirect and the session token.
pub async fn complete_external_login(
    state: &AppState,
    query: CallbackQuery,
) -> Result<String, AppError> {
    if let Some(err) = query.error {
        return Err(AppError::Upstream(err));
    }

    let login_state = query
        .state
        .ok_or_else(|| AppError::Validation("Missing login state".into()))?;
    state.keys.verify_state(&login_state).map_err(|e| {
        warn!(error = %e, "rejected oauth state");
        AppError::Validation("Invalid or expired login state".into())
    })?;

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".into()))?;

    let profile = state.identity.exchange(&code).await?;
    let user = resolve_external(state, profile).await?;
    issue_token(state, &user)
}
