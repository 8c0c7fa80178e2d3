use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{ReservationStore, SlotStore};

use super::BookingError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Build the half-open interval for a request, rejecting empty, inverted,
/// out-of-range and over-long windows.
pub fn validate_span(start: Ms, end: Ms) -> Result<Span, BookingError> {
    let span = Span::checked(start, end)
        .ok_or(BookingError::InvalidInput("end time must be after start time"))?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::InvalidInput("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(BookingError::InvalidInput("time window too long"));
    }
    Ok(span)
}

/// Slots anywhere in the provider's calendar that share an instant with `span`.
/// The predicate is re-applied here so an adapter that over-fetches is harmless.
pub async fn find_overlapping_slots<S: SlotStore + ?Sized>(
    store: &S,
    provider_id: Ulid,
    span: Span,
    exclude_slot_id: Option<Ulid>,
) -> Result<Vec<TimeSlot>, BookingError> {
    let mut hits = store
        .find_overlapping_slots_for_provider(provider_id, span, exclude_slot_id)
        .await?;
    hits.retain(|s| {
        s.status != SlotStatus::Cancelled && Some(s.id) != exclude_slot_id && s.span.overlaps(&span)
    });
    Ok(hits)
}

pub(super) async fn ensure_no_slot_clash<S: SlotStore + ?Sized>(
    store: &S,
    provider_id: Ulid,
    span: Span,
    exclude_slot_id: Option<Ulid>,
) -> Result<(), BookingError> {
    let clashing = find_overlapping_slots(store, provider_id, span, exclude_slot_id).await?;
    if clashing.is_empty() {
        Ok(())
    } else {
        Err(BookingError::TimeSlotClash {
            clashing: clashing.iter().map(|s| s.id).collect(),
        })
    }
}

/// Live reservations on the service that share an instant with `span`.
pub async fn find_overlapping_reservations<S: ReservationStore + ?Sized>(
    store: &S,
    service_id: Ulid,
    span: Span,
    exclude_reservation_id: Option<Ulid>,
) -> Result<Vec<Reservation>, BookingError> {
    let mut hits = store
        .find_overlapping_reservations(service_id, span, exclude_reservation_id)
        .await?;
    hits.retain(|r| {
        r.status.is_active() && Some(r.id) != exclude_reservation_id && r.span.overlaps(&span)
    });
    Ok(hits)
}

pub(super) async fn ensure_no_reservation_clash<S: ReservationStore + ?Sized>(
    store: &S,
    service_id: Ulid,
    span: Span,
    exclude_reservation_id: Option<Ulid>,
) -> Result<(), BookingError> {
    let clashing =
        find_overlapping_reservations(store, service_id, span, exclude_reservation_id).await?;
    if clashing.is_empty() {
        Ok(())
    } else {
        Err(BookingError::ReservationClash {
            clashing: clashing.iter().map(|r| r.id).collect(),
        })
    }
}
