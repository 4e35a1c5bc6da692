use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{NewUser, ProfileUpdate, Role, SellerDetails, SellerInfo, User};
use super::repo::{StoreError, UserRepository};
use super::repo_types::{UserRow, USER_COLUMNS};
use crate::db::Database;

const EXTERNAL_ID_INDEX: &str = "users_external_id_key";

/// Postgres-backed credential store.
#[derive(Clone)]
pub struct PgUserRepository {
    db: Arc<Database>,
}

impl PgUserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The pool is established on first use. Failing to connect is not retried.
    async fn pool(&self) -> Result<&PgPool, StoreError> {
        self.db
            .pool()
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("connect to database")))
    }
}

fn classify(e: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(EXTERNAL_ID_INDEX) => StoreError::Conflict("external identity"),
                _ => StoreError::Conflict("email"),
            };
        }
    }
    let transient = matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed
    );
    let err = anyhow::Error::new(e).context(what);
    if transient {
        StoreError::Transient(err)
    } else {
        StoreError::Other(err)
    }
}

fn into_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row)
        .context("decode user row")
        .map_err(StoreError::Other)
}

fn into_opt_user(row: Option<UserRow>) -> Result<Option<User>, StoreError> {
    row.map(into_user).transpose()
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(self.pool().await?)
            .await
            .map_err(|e| classify(e, "ping database"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "find user by id"))?;
        into_opt_user(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "find user by email"))?;
        into_opt_user(row)
    }

    async fn find_for_external(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE external_id = $1 OR email = $2
            ORDER BY CASE WHEN external_id = $1 THEN 0 ELSE 1 END
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(external_id)
            .bind(email)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "find user for external login"))?;
        into_opt_user(row)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, external_id, profile_picture, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.password_hash())
            .bind(user.external_id())
            .bind(user.profile_picture())
            .bind(Role::Buyer.as_str())
            .fetch_one(self.pool().await?)
            .await
            .map_err(|e| classify(e, "create user"))?;
        into_user(row)
    }

    async fn link_external_id(
        &self,
        id: Uuid,
        external_id: &str,
        picture: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET external_id = $2,
                   profile_picture = COALESCE(profile_picture, $3)
             WHERE id = $1 AND external_id IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(external_id)
            .bind(picture)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "link external identity"))?;
        into_opt_user(row)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<Option<User>, StoreError> {
        let sql =
            format!("UPDATE users SET password_hash = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(hash)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "set password"))?;
        into_opt_user(row)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   profile_picture = COALESCE($3, profile_picture)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(update.name.as_deref())
            .bind(update.profile_picture.as_deref())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "update profile"))?;
        into_opt_user(row)
    }

    async fn promote_to_seller(
        &self,
        id: Uuid,
        info: &SellerInfo,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET role = $2,
                   seller_info = COALESCE(seller_info, $3)
             WHERE id = $1 AND role = $4
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(Role::Seller.as_str())
            .bind(Json(info))
            .bind(Role::Buyer.as_str())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "promote to seller"))?;
        into_opt_user(row)
    }

    async fn merge_seller_details(
        &self,
        id: Uuid,
        details: &SellerDetails,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET seller_info = COALESCE(seller_info, '{{}}'::jsonb) || $2
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(Json(details))
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "update seller details"))?;
        into_opt_user(row)
    }

    async fn set_seller_approval(
        &self,
        id: Uuid,
        approved: bool,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET seller_info = jsonb_set(
                       COALESCE(seller_info, '{{}}'::jsonb),
                       '{{approved}}',
                       to_jsonb($2::boolean)
                   )
             WHERE id = $1 AND role = $3
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(approved)
            .bind(Role::Seller.as_str())
            .fetch_optional(self.pool().await?)
            .await
            .map_err(|e| classify(e, "set seller approval"))?;
        into_opt_user(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool().await?)
            .await
            .map_err(|e| classify(e, "list users"))?;
        rows.into_iter().map(into_user).collect()
    }
}
