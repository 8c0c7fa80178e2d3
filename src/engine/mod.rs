//! The booking core: overlap checking, capacity tracking, lifecycle state
//! machines and the orchestrators that combine them.
//!
//! Every check-then-write sequence runs under a per-entity lock from
//! [`LockTable`], so two requests racing for the same slot, provider calendar
//! or service never both pass validation. Locks are taken provider first,
//! then service, then slot.

pub mod access;
mod capacity;
mod catalog;
mod error;
mod lifecycle;
mod locks;
mod overlap;
mod reservations;
mod slots;
mod users;

pub use capacity::{count_active, is_full, status_for_count};
pub use error::{BookingError, Entity, ErrorKind};
pub use lifecycle::{ensure_not_started, ensure_reservation_deletable};
pub use overlap::{find_overlapping_reservations, find_overlapping_slots, now_ms, validate_span};

use std::sync::Arc;

use tokio::sync::Mutex;
use ulid::Ulid;

use crate::model::*;
use crate::store::Store;

use locks::LockTable;

pub struct Engine<S> {
    store: Arc<S>,
    locks: LockTable,
    /// Serializes username uniqueness checks.
    registration: Mutex<()>,
}

impl<S: Store> Engine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: LockTable::new(),
            registration: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The requesting user, who must exist and hold every role the context
    /// claims. Read paths stop here so disabled accounts can still see their
    /// own records.
    pub(super) async fn authenticate(&self, ctx: &RequesterContext) -> Result<User, BookingError> {
        let user = self.load_user(ctx.user_id).await?;
        access::require_roles_match(ctx, &user)?;
        Ok(user)
    }

    /// An authenticated requester whose account is active.
    pub(super) async fn requester(&self, ctx: &RequesterContext) -> Result<User, BookingError> {
        let user = self.authenticate(ctx).await?;
        access::require_active(&user)?;
        Ok(user)
    }

    pub(super) async fn load_user(&self, id: Ulid) -> Result<User, BookingError> {
        self.store
            .find_user_by_id(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::User, id))
    }

    pub(super) async fn load_service(&self, id: Ulid) -> Result<OfferedService, BookingError> {
        self.store
            .find_service_by_id(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Service, id))
    }

    pub(super) async fn load_slot(&self, id: Ulid) -> Result<TimeSlot, BookingError> {
        self.store
            .find_time_slot_by_id(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Slot, id))
    }

    pub(super) async fn load_booking(&self, id: Ulid) -> Result<Booking, BookingError> {
        self.store
            .find_booking_by_id(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Booking, id))
    }

    pub(super) async fn load_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.store
            .find_reservation_by_id(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Reservation, id))
    }
}

/// Parse an externally supplied identifier.
pub fn parse_id(raw: &str) -> Result<Ulid, BookingError> {
    Ulid::from_string(raw.trim()).map_err(|_| BookingError::InvalidInput("malformed identifier"))
}
