use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::Store;

use super::{BookingError, Engine, access};

impl<S: Store> Engine<S> {
    /// Create an active account. Credential checking happens outside the core;
    /// only the hash is stored.
    pub async fn register_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, BookingError> {
        let username = username.trim();
        if username.is_empty() || username.len() > MAX_NAME_LEN {
            return Err(BookingError::InvalidInput("username must be 1 to 256 characters"));
        }
        if password_hash.is_empty() || password_hash.len() > MAX_PASSWORD_HASH_LEN {
            return Err(BookingError::InvalidInput("password hash missing or too long"));
        }

        let _registration = self.registration.lock().await;
        if self.store.find_user_by_username(username).await?.is_some() {
            return Err(BookingError::DuplicateName(username.to_string()));
        }
        let user = User {
            id: Ulid::new(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            active: true,
        };
        self.store.save_user(user.clone()).await?;
        info!("user {} registered as {:?}", user.id, role);
        Ok(user)
    }

    /// Enable or disable an account. Admin only.
    pub async fn set_user_active(
        &self,
        ctx: &RequesterContext,
        user_id: Ulid,
        active: bool,
    ) -> Result<User, BookingError> {
        self.requester(ctx).await?;
        access::require_admin(ctx)?;
        let mut user = self.load_user(user_id).await?;
        user.active = active;
        self.store.save_user(user.clone()).await?;
        info!("user {user_id} active={active}");
        Ok(user)
    }

    pub async fn get_user(&self, ctx: &RequesterContext, user_id: Ulid) -> Result<User, BookingError> {
        self.authenticate(ctx).await?;
        access::require_self_or_admin(ctx, user_id)?;
        self.load_user(user_id).await
    }
}
