use ulid::Ulid;

use crate::model::*;
use crate::store::BookingStore;

use super::BookingError;

/// Seat-holding bookings on the slot, read fresh from the store. Callers that
/// act on the count must hold the slot lock.
pub async fn count_active<S: BookingStore + ?Sized>(
    store: &S,
    slot_id: Ulid,
) -> Result<u32, BookingError> {
    store.count_bookings_for_slot(slot_id).await
}

pub async fn is_full<S: BookingStore + ?Sized>(
    store: &S,
    slot: &TimeSlot,
) -> Result<bool, BookingError> {
    Ok(count_active(store, slot.id).await? >= slot.capacity)
}

/// AVAILABLE/FULL for a live slot with `active` seats taken.
pub fn status_for_count(capacity: u32, active: u32) -> SlotStatus {
    if active >= capacity {
        SlotStatus::Full
    } else {
        SlotStatus::Available
    }
}
