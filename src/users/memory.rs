use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewUser, ProfileUpdate, Role, SellerDetails, SellerInfo, User};
use super::repo::{StoreError, UserRepository};

type Interleaved = Box<dyn FnOnce(&mut Vec<User>) + Send>;

/// In-process store enforcing the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
    failing_lookups: AtomicU32,
    blind_email_lookups: AtomicBool,
    interleaved: Mutex<Option<Interleaved>>,
    lookups: AtomicU32,
    writes: AtomicU32,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` email lookups fail with a transient error.
    pub fn fail_next_lookups(&self, n: u32) {
        self.failing_lookups.store(n, Ordering::SeqCst);
    }

    /// Make email lookups miss, as if another request inserted the record right after
    /// the lookup ran.
    pub fn blind_email_lookups(&self, on: bool) {
        self.blind_email_lookups.store(on, Ordering::SeqCst);
    }

    /// Run `f` against the stored records inside the next field update, just before the
    /// update applies. Stands in for a concurrent request committing first.
    pub fn interleave_next_update<F>(&self, f: F)
    where
        F: FnOnce(&mut Vec<User>) + Send + 'static,
    {
        *self.interleaved.lock().unwrap() = Some(Box::new(f));
    }

    pub fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn set_role(&self, id: Uuid, role: Role) {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            u.role = role;
        }
    }

    fn lookup(&self) -> Result<(), StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_lookups.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_lookups.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Transient(anyhow::anyhow!("connection reset")));
        }
        Ok(())
    }

    fn update<F>(&self, id: Uuid, f: F) -> Result<Option<User>, StoreError>
    where
        F: FnOnce(&mut User),
    {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock().unwrap();
        if let Some(other) = self.interleaved.lock().unwrap().take() {
            other(&mut *users);
        }
        Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
            f(u);
            u.clone()
        }))
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.lookup()?;
        if self.blind_email_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_for_external(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        self.lookup()?;
        let users = self.users.lock().unwrap();
        let by_external = users
            .iter()
            .find(|u| u.external_id.as_deref() == Some(external_id));
        Ok(by_external
            .or_else(|| users.iter().find(|u| u.email == email))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email"));
        }
        if let Some(ext) = user.external_id() {
            if users.iter().any(|u| u.external_id.as_deref() == Some(ext)) {
                return Err(StoreError::Conflict("external identity"));
            }
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            name: user.name.clone(),
            password_hash: user.password_hash().map(str::to_owned),
            external_id: user.external_id().map(str::to_owned),
            profile_picture: user.profile_picture().map(str::to_owned),
            role: Role::Buyer,
            seller_info: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn link_external_id(
        &self,
        id: Uuid,
        external_id: &str,
        picture: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.id != id && u.external_id.as_deref() == Some(external_id))
        {
            return Err(StoreError::Conflict("external identity"));
        }
        Ok(users
            .iter_mut()
            .find(|u| u.id == id && u.external_id.is_none())
            .map(|u| {
                u.external_id = Some(external_id.to_owned());
                if u.profile_picture.is_none() {
                    u.profile_picture = picture.map(str::to_owned);
                }
                u.clone()
            }))
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<Option<User>, StoreError> {
        self.update(id, |u| u.password_hash = Some(hash.to_owned()))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        self.update(id, |u| {
            if let Some(name) = &update.name {
                u.name = name.clone();
            }
            if let Some(pic) = &update.profile_picture {
                u.profile_picture = Some(pic.clone());
            }
        })
    }

    async fn promote_to_seller(
        &self,
        id: Uuid,
        info: &SellerInfo,
    ) -> Result<Option<User>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock().unwrap();
        Ok(users
            .iter_mut()
            .find(|u| u.id == id && u.role == Role::Buyer)
            .map(|u| {
                u.role = Role::Seller;
                u.seller_info.get_or_insert_with(|| info.clone());
                u.clone()
            }))
    }

    async fn merge_seller_details(
        &self,
        id: Uuid,
        details: &SellerDetails,
    ) -> Result<Option<User>, StoreError> {
        self.update(id, |u| {
            details.apply_to(u.seller_info.get_or_insert_with(SellerInfo::default));
        })
    }

    async fn set_seller_approval(
        &self,
        id: Uuid,
        approved: bool,
    ) -> Result<Option<User>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock().unwrap();
        Ok(users
            .iter_mut()
            .find(|u| u.id == id && u.role == Role::Seller)
            .map(|u| {
                u.seller_info.get_or_insert_with(SellerInfo::default).approved = approved;
                u.clone()
            }))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
