use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{SellerInfo, User};

/// Column list matching [`UserRow`].
pub const USER_COLUMNS: &str =
    "id, email, name, password_hash, external_id, profile_picture, role, seller_info, created_at";

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub profile_picture: Option<String>,
    pub role: String,                        // buyer | seller | admin
    pub seller_info: Option<Json<SellerInfo>>, // jsonb
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            name: r.name,
            password_hash: r.password_hash,
            external_id: r.external_id,
            profile_picture: r.profile_picture,
            role: r.role.parse()?,
            seller_info: r.seller_info.map(|Json(info)| info),
            created_at: r.created_at,
        })
    }
}
