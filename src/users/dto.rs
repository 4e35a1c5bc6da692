use serde::{Deserialize, Serialize};

use super::model::User;
use crate::auth::dto::PublicUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub profile_picture: Option<String>,
}

/// Business fields a seller may edit. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SellerInfoRequest {
    pub business_name: Option<String>,
    pub business_address: Option<String>,
    pub phone_number: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalRequest {
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// `(limit, offset)` with the limit clamped to `1..=MAX_LIMIT`.
    pub fn clamped(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

/// Role change response; the old token still carries the previous role.
#[derive(Debug, Serialize)]
pub struct BecomeSellerResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<PublicUser>,
    pub limit: i64,
    pub offset: i64,
}
