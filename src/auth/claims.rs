use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::model::{Role, User};

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: Uuid,       // user ID
    pub email: String,
    pub name: String,
    pub role: Role,
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
}

/// Identity fields a token is issued for.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<&User> for Subject {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
        }
    }
}

/// Payload as it arrives on the wire. Older tokens carry `userId` instead of `id`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireClaims {
    pub id: Option<Uuid>,
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub iat: usize,
    pub exp: usize,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: String,
}

impl WireClaims {
    /// Collapse the two identity spellings into the canonical `id`.
    pub fn normalize(self) -> Option<Claims> {
        let id = self.id.or(self.user_id)?;
        Some(Claims {
            id,
            email: self.email,
            name: self.name,
            role: self.role,
            iat: self.iat,
            exp: self.exp,
            iss: self.iss,
            aud: self.aud,
        })
    }
}
