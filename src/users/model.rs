use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Coarse permission tier carried by every user and every issued token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Buyer,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerInfo {
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub business_address: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub created_at: Option<OffsetDateTime>,
}

/// Partial update of the business fields of [`SellerInfo`]. Serializes only the fields
/// that are set, so it can be merged over the stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SellerDetails {
    pub fn apply_to(&self, info: &mut SellerInfo) {
        if let Some(v) = &self.business_name {
            info.business_name = v.clone();
        }
        if let Some(v) = &self.business_address {
            info.business_address = v.clone();
        }
        if let Some(v) = &self.phone_number {
            info.phone_number = v.clone();
        }
        if let Some(v) = &self.description {
            info.description = v.clone();
        }
    }
}

/// User record as held by the credential store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 PHC string
    #[serde(skip_serializing)]
    pub external_id: Option<String>, // Google subject id
    pub profile_picture: Option<String>,
    pub role: Role,
    pub seller_info: Option<SellerInfo>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The credential a record is created with. A user cannot exist without one.
#[derive(Debug, Clone)]
pub enum NewCredential {
    Password { hash: String },
    External { id: String, picture: Option<String> },
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub credential: NewCredential,
}

impl NewUser {
    pub fn password_hash(&self) -> Option<&str> {
        match &self.credential {
            NewCredential::Password { hash } => Some(hash),
            NewCredential::External { .. } => None,
        }
    }

    pub fn external_id(&self) -> Option<&str> {
        match &self.credential {
            NewCredential::External { id, .. } => Some(id),
            NewCredential::Password { .. } => None,
        }
    }

    pub fn profile_picture(&self) -> Option<&str> {
        match &self.credential {
            NewCredential::External { picture, .. } => picture.as_deref(),
            NewCredential::Password { .. } => None,
        }
    }
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub profile_picture: Option<String>,
}
