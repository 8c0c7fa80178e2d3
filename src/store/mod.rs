//! Persistence ports consumed by the engine, plus the adapters shipped with
//! the crate.
//!
//! Ports never enforce business rules. They answer queries and persist whole
//! entities; every invariant lives in the engine, which serializes the
//! check-then-write sequences that need atomicity.

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::BookingError;
use crate::model::*;

pub type StoreResult<T> = Result<T, BookingError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Ulid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn save_user(&self, user: User) -> StoreResult<()>;
}

#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn find_service_by_id(&self, id: Ulid) -> StoreResult<Option<OfferedService>>;
    async fn find_service_by_public_id(&self, public_id: Ulid) -> StoreResult<Option<OfferedService>>;
    async fn find_service_by_owner_and_name(
        &self,
        owner_id: Ulid,
        name: &str,
    ) -> StoreResult<Option<OfferedService>>;
    async fn list_services_for_owner(&self, owner_id: Ulid) -> StoreResult<Vec<OfferedService>>;
    async fn save_service(&self, service: OfferedService) -> StoreResult<()>;
    /// Removes the service together with its time slots and their bookings.
    async fn delete_service(&self, id: Ulid) -> StoreResult<()>;
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn find_time_slot_by_id(&self, id: Ulid) -> StoreResult<Option<TimeSlot>>;
    async fn find_time_slot_by_public_id(&self, public_id: Ulid) -> StoreResult<Option<TimeSlot>>;
    async fn save_time_slot(&self, slot: TimeSlot) -> StoreResult<()>;
    /// Non-cancelled slots of any of the provider's services that overlap `span`.
    async fn find_overlapping_slots_for_provider(
        &self,
        provider_id: Ulid,
        span: Span,
        exclude_slot_id: Option<Ulid>,
    ) -> StoreResult<Vec<TimeSlot>>;
    /// Whether the service has a slot starting after `now`.
    async fn has_future_time_slots(&self, service_id: Ulid, now: Ms) -> StoreResult<bool>;
    async fn list_slots_for_service(&self, service_id: Ulid) -> StoreResult<Vec<TimeSlot>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_booking_by_id(&self, id: Ulid) -> StoreResult<Option<Booking>>;
    async fn save_booking(&self, booking: Booking) -> StoreResult<()>;
    /// Number of seat-holding bookings on the slot.
    async fn count_bookings_for_slot(&self, slot_id: Ulid) -> StoreResult<u32>;
    /// Whether the client holds a seat-holding booking on the slot.
    async fn exists_booking_for_client_and_slot(&self, client_id: Ulid, slot_id: Ulid)
    -> StoreResult<bool>;
    async fn list_bookings_for_slot(&self, slot_id: Ulid) -> StoreResult<Vec<Booking>>;
    async fn list_bookings_for_client(&self, client_id: Ulid) -> StoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn find_reservation_by_id(&self, id: Ulid) -> StoreResult<Option<Reservation>>;
    async fn save_reservation(&self, reservation: Reservation) -> StoreResult<()>;
    async fn delete_reservation(&self, id: Ulid) -> StoreResult<()>;
    /// Pending or confirmed reservations on the service that overlap `span`.
    async fn find_overlapping_reservations(
        &self,
        service_id: Ulid,
        span: Span,
        exclude_reservation_id: Option<Ulid>,
    ) -> StoreResult<Vec<Reservation>>;
    async fn count_active_reservations_in_window(&self, service_id: Ulid, span: Span)
    -> StoreResult<usize>;
    async fn list_reservations_for_user(&self, user_id: Ulid) -> StoreResult<Vec<Reservation>>;
}

/// Everything the engine needs from persistence.
pub trait Store: UserStore + ServiceStore + SlotStore + BookingStore + ReservationStore {}

impl<T> Store for T where T: UserStore + ServiceStore + SlotStore + BookingStore + ReservationStore {}
