use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    ApprovalRequest, BecomeSellerResponse, Pagination, SellerInfoRequest, UpdateProfileRequest,
    UserListResponse,
};
use super::services;
use crate::{
    auth::{
        dto::{ProfileResponse, PublicUser},
        extractors::{AdminUser, AuthUser, SellerUser},
        services::load_user,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users/become-seller", put(become_seller))
        .route("/users/seller-info", put(update_seller_info))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/sellers/:id/approval", put(set_seller_approval))
}

#[instrument(skip(state, claims), fields(user_id = %claims.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    Ok(Json(load_user(&state, claims.id).await?.into()))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = services::update_profile(&state, claims.id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, claims), fields(user_id = %claims.id))]
pub async fn become_seller(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<BecomeSellerResponse>, AppError> {
    Ok(Json(services::become_seller(&state, claims.id).await?))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.id))]
pub async fn update_seller_info(
    State(state): State<AppState>,
    SellerUser(claims): SellerUser,
    AppJson(payload): AppJson<SellerInfoRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = services::update_seller_info(&state, claims.id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(page): Query<Pagination>,
) -> Result<Json<UserListResponse>, AppError> {
    let (limit, offset) = page.clamped();
    let users = services::list_users(&state, &page).await?;
    Ok(Json(UserListResponse {
        success: true,
        users: users.iter().map(PublicUser::from).collect(),
        limit,
        offset,
    }))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.0.id))]
pub async fn set_seller_approval(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ApprovalRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = services::set_seller_approval(&state, id, payload.approved).await?;
    Ok(Json(user.into()))
}
