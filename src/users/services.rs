use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::dto::{BecomeSellerResponse, Pagination, SellerInfoRequest, UpdateProfileRequest};
use super::model::{ProfileUpdate, Role, SellerDetails, SellerInfo, User};
use crate::auth::services::{issue_token, load_user};
use crate::error::AppError;
use crate::state::AppState;

fn not_found() -> AppError {
    AppError::NotFound("User not found".into())
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> Result<User, AppError> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::Validation("Name cannot be empty".into()))
        }
        Some(name) => Some(name.trim().to_owned()),
        None => None,
    };
    let update = ProfileUpdate {
        name,
        profile_picture: req.profile_picture.filter(|p| !p.trim().is_empty()),
    };
    state
        .users
        .update_profile(user_id, &update)
        .await?
        .ok_or_else(not_found)
}

/// Upgrade a buyer to seller. Sellers and admins keep their role.
pub async fn become_seller(
    state: &AppState,
    user_id: Uuid,
) -> Result<BecomeSellerResponse, AppError> {
    let user = load_user(state, user_id).await?;

    let promoted = if user.role == Role::Buyer {
        let info = SellerInfo {
            approved: true,
            created_at: Some(OffsetDateTime::now_utc()),
            ..SellerInfo::default()
        };
        state.users.promote_to_seller(user_id, &info).await?
    } else {
        None
    };

    let (user, message) = match promoted {
        Some(user) => {
            info!(%user_id, "user became a seller");
            (user, "You are now a seller")
        }
        // already a seller or admin, possibly promoted by a concurrent request
        None => (load_user(state, user_id).await?, "Account already has seller access"),
    };

    let token = issue_token(state, &user)?;
    Ok(BecomeSellerResponse {
        success: true,
        message: message.into(),
        token,
        user,
    })
}

pub async fn update_seller_info(
    state: &AppState,
    user_id: Uuid,
    req: SellerInfoRequest,
) -> Result<User, AppError> {
    let details = SellerDetails {
        business_name: req.business_name,
        business_address: req.business_address,
        phone_number: req.phone_number,
        description: req.description,
    };
    state
        .users
        .merge_seller_details(user_id, &details)
        .await?
        .ok_or_else(not_found)
}

pub async fn list_users(state: &AppState, page: &Pagination) -> Result<Vec<User>, AppError> {
    let (limit, offset) = page.clamped();
    Ok(state.users.list(limit, offset).await?)
}

pub async fn set_seller_approval(
    state: &AppState,
    seller_id: Uuid,
    approved: bool,
) -> Result<User, AppError> {
    match state.users.set_seller_approval(seller_id, approved).await? {
        Some(user) => {
            info!(%seller_id, approved, "seller approval changed");
            Ok(user)
        }
        None => {
            load_user(state, seller_id).await?;
            Err(AppError::Validation("User is not a seller".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::MemoryUserRepository;
    use crate::users::model::{NewCredential, NewUser};
    use crate::users::repo::UserRepository;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryUserRepository>, AppState, User) {
        let repo = Arc::new(MemoryUserRepository::new());
        let state = AppState::fake(repo.clone());
        let user = repo
            .create(NewUser {
                email: "a@x.com".into(),
                name: "A".into(),
                credential: NewCredential::Password { hash: "h".into() },
            })
            .await
            .unwrap();
        (repo, state, user)
    }

    #[tokio::test]
    async fn become_seller_is_idempotent() {
        let (repo, state, user) = setup().await;
        let first = become_seller(&state, user.id).await.unwrap();
        assert_eq!(first.user.role, Role::Seller);
        assert_eq!(state.keys.verify(&first.token).unwrap().role, Role::Seller);
        let info = first.user.seller_info.clone().unwrap();
        assert!(info.approved);

        let writes = repo.write_count();
        let second = become_seller(&state, user.id).await.unwrap();
        assert_eq!(second.user.role, Role::Seller);
        assert_eq!(second.user.seller_info, Some(info));
        assert_eq!(repo.write_count(), writes);
    }

    #[tokio::test]
    async fn admin_is_never_downgraded() {
        let (repo, state, user) = setup().await;
        repo.set_role(user.id, Role::Admin);
        let resp = become_seller(&state, user.id).await.unwrap();
        assert_eq!(resp.user.role, Role::Admin);
    }

    #[tokio::test]
    async fn profile_update_rejects_blank_name() {
        let (_, state, user) = setup().await;
        let err = update_profile(
            &state,
            user.id,
            UpdateProfileRequest {
                name: Some("   ".into()),
                profile_picture: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let updated = update_profile(
            &state,
            user.id,
            UpdateProfileRequest {
                name: Some(" Bea ".into()),
                profile_picture: Some("https://img/p.png".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Bea");
        assert_eq!(updated.profile_picture.as_deref(), Some("https://img/p.png"));
    }

    #[tokio::test]
    async fn seller_info_merges_fields() {
        let (_, state, user) = setup().await;
        become_seller(&state, user.id).await.unwrap();
        update_seller_info(
            &state,
            user.id,
            SellerInfoRequest {
                business_name: Some("Thrifty".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let updated = update_seller_info(
            &state,
            user.id,
            SellerInfoRequest {
                phone_number: Some("555-0100".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let info = updated.seller_info.unwrap();
        assert_eq!(info.business_name, "Thrifty");
        assert_eq!(info.phone_number, "555-0100");
        assert!(info.approved);
        assert_eq!(updated.role, Role::Seller);
    }

    #[tokio::test]
    async fn approval_requires_a_seller() {
        let (_, state, user) = setup().await;
        let err = set_seller_approval(&state, user.id, true).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = set_seller_approval(&state, Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        become_seller(&state, user.id).await.unwrap();
        let revoked = set_seller_approval(&state, user.id, false).await.unwrap();
        assert!(!revoked.seller_info.unwrap().approved);
    }

    #[tokio::test]
    async fn details_update_keeps_concurrent_revocation() {
        let (repo, state, user) = setup().await;
        become_seller(&state, user.id).await.unwrap();

        let id = user.id;
        repo.interleave_next_update(move |users| {
            let seller = users.iter_mut().find(|u| u.id == id).unwrap();
            seller.seller_info.as_mut().unwrap().approved = false;
        });
        let updated = update_seller_info(
            &state,
            user.id,
            SellerInfoRequest {
                business_name: Some("Thrifty".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let info = updated.seller_info.unwrap();
        assert_eq!(info.business_name, "Thrifty");
        assert!(!info.approved);
        assert_eq!(updated.role, Role::Seller);
    }

    #[tokio::test]
    async fn approval_change_keeps_business_fields() {
        let (_, state, user) = setup().await;
        become_seller(&state, user.id).await.unwrap();
        update_seller_info(
            &state,
            user.id,
            SellerInfoRequest {
                description: Some("vintage coats".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let revoked = set_seller_approval(&state, user.id, false).await.unwrap();
        let info = revoked.seller_info.unwrap();
        assert!(!info.approved);
        assert_eq!(info.description, "vintage coats");
        assert!(info.created_at.is_some());
    }
}
