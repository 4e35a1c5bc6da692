use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use url::form_urlencoded;

use super::dto::{
    AuthResponse, CallbackQuery, LoginRequest, ProfileResponse, RegisterRequest,
    SetPasswordRequest,
};
use super::extractors::AuthUser;
use super::services;
use crate::{error::AppError, extract::AppJson, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/password", post(set_password))
        .route("/auth/me", get(get_me))
}

pub fn google_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", get(google_callback))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let resp = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(services::login(&state, payload).await?))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.id))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    AppJson(payload): AppJson<SetPasswordRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = services::set_password(&state, claims.id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, claims), fields(user_id = %claims.id))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = services::load_user(&state, claims.id).await?;
    Ok(Json(user.into()))
}

/// `<frontend>/login?<key>=<value>`
fn login_redirect(frontend_url: &str, key: &str, value: &str) -> Redirect {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    Redirect::to(&format!(
        "{}/login?{query}",
        frontend_url.trim_end_matches('/')
    ))
}

#[instrument(skip(state))]
pub async fn google_login(State(state): State<AppState>) -> Redirect {
    let url = state
        .keys
        .issue_state()
        .and_then(|login_state| state.identity.authorize_url(&login_state));
    match url {
        Ok(url) => Redirect::to(&url),
        Err(e) => {
            let err = AppError::Internal(e.context("start google login"));
            warn!(error = ?err, "google login could not start");
            login_redirect(&state.config.oauth.frontend_url, "error", &err.redirect_message())
        }
    }
}

#[instrument(skip(state, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let frontend = &state.config.oauth.frontend_url;
    match services::complete_external_login(&state, query).await {
        Ok(token) => {
            info!("google login complete");
            login_redirect(frontend, "token", &token)
        }
        Err(err) => {
            warn!(kind = err.kind(), error = ?err, "google login failed");
            login_redirect(frontend, "error", &err.redirect_message())
        }
    }
}
