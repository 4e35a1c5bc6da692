use super::claims::Claims;
use crate::error::AppError;
use crate::users::model::Role;

pub fn ensure_role(claims: &Claims, role: Role) -> Result<(), AppError> {
    if claims.role == role {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %claims.id,
            have = %claims.role,
            need = %role,
            "role check failed"
        );
        Err(AppError::Forbidden(format!(
            "Access denied - {role} privileges required"
        )))
    }
}

pub fn ensure_seller(claims: &Claims) -> Result<(), AppError> {
    ensure_role(claims, Role::Seller)
}

pub fn ensure_admin(claims: &Claims) -> Result<(), AppError> {
    ensure_role(claims, Role::Admin)
}
