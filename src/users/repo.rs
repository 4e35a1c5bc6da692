use async_trait::async_trait;
use uuid::Uuid;

use super::model::{NewUser, ProfileUpdate, SellerDetails, SellerInfo, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the offending field.
    #[error("{0} already in use")]
    Conflict(&'static str),
    /// The store was reachable but the call failed in a way worth retrying.
    #[error(transparent)]
    Transient(anyhow::Error),
    #[error(transparent)]
    Other(anyhow::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Credential store for user records. Emails are expected to be normalized by the caller.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Record matching either the external id or the email; an external-id match wins.
    async fn find_for_external(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Insert a new record with role buyer. Fails with `Conflict` on a duplicate email
    /// or external id.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Attach an external id to a record that has none. The profile picture is only
    /// filled in when the record has no picture yet.
    async fn link_external_id(
        &self,
        id: Uuid,
        external_id: &str,
        picture: Option<&str>,
    ) -> Result<Option<User>, StoreError>;

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<Option<User>, StoreError>;

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, StoreError>;

    /// Turn a buyer into a seller, keeping any stored seller info and otherwise storing
    /// `info`. Matches nothing unless the record is currently a buyer.
    async fn promote_to_seller(
        &self,
        id: Uuid,
        info: &SellerInfo,
    ) -> Result<Option<User>, StoreError>;

    /// Merge the given business fields into the stored seller info. Role and approval
    /// are left alone.
    async fn merge_seller_details(
        &self,
        id: Uuid,
        details: &SellerDetails,
    ) -> Result<Option<User>, StoreError>;

    /// Set only the approval flag. Matches nothing unless the record is a seller.
    async fn set_seller_approval(
        &self,
        id: Uuid,
        approved: bool,
    ) -> Result<Option<User>, StoreError>;

    /// Page of users, newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError>;
}
