//! Status state machines for bookings and reservations.
//!
//! Booking: PENDING_PAYMENT / AWAITING_CONFIRMATION → CONFIRMED; CONFIRMED or
//! PENDING_PAYMENT → CANCELLED_BY_CLIENT; any active status →
//! CANCELLED_BY_PROVIDER when the slot is withdrawn. Cancelled, COMPLETED and
//! NO_SHOW are terminal.
//!
//! Reservation: PENDING → CONFIRMED; PENDING or CONFIRMED → CANCELLED.

use std::fmt;

use crate::model::*;

use super::BookingError;

impl BookingStatus {
    pub fn confirm(self) -> Result<BookingStatus, BookingError> {
        match self {
            BookingStatus::PendingPayment | BookingStatus::AwaitingConfirmation => {
                Ok(BookingStatus::Confirmed)
            }
            other => Err(BookingError::IllegalState(format!(
                "Booking cannot be confirmed from status: {other}"
            ))),
        }
    }

    pub fn cancel(self) -> Result<BookingStatus, BookingError> {
        match self {
            BookingStatus::Confirmed | BookingStatus::PendingPayment => {
                Ok(BookingStatus::CancelledByClient)
            }
            other => Err(BookingError::IllegalState(format!(
                "Booking cannot be cancelled from status: {other}"
            ))),
        }
    }

    pub fn cancel_by_provider(self) -> Result<BookingStatus, BookingError> {
        if self.is_active() {
            Ok(BookingStatus::CancelledByProvider)
        } else {
            Err(BookingError::IllegalState(format!(
                "Booking cannot be cancelled by provider from status: {self}"
            )))
        }
    }
}

impl ReservationStatus {
    pub fn confirm(self) -> Result<ReservationStatus, BookingError> {
        match self {
            ReservationStatus::Pending => Ok(ReservationStatus::Confirmed),
            other => Err(BookingError::IllegalState(format!(
                "Reservation cannot be confirmed from status: {other}"
            ))),
        }
    }

    pub fn cancel(self) -> Result<ReservationStatus, BookingError> {
        match self {
            ReservationStatus::Pending | ReservationStatus::Confirmed => {
                Ok(ReservationStatus::Cancelled)
            }
            other => Err(BookingError::IllegalState(format!(
                "Reservation cannot be cancelled from status: {other}"
            ))),
        }
    }
}

/// Cancellation is refused once the event has started, whatever the status.
pub fn ensure_not_started(starts_at: Ms, now: Ms) -> Result<(), BookingError> {
    if starts_at < now {
        Err(BookingError::EventAlreadyOccurred { starts_at })
    } else {
        Ok(())
    }
}

/// Hard deletion is allowed for past reservations and for ones that no longer
/// hold the service.
pub fn ensure_reservation_deletable(reservation: &Reservation, now: Ms) -> Result<(), BookingError> {
    if reservation.span.start > now && reservation.status.is_active() {
        Err(BookingError::IllegalState(format!(
            "Reservation {} is upcoming and {}; cancel it before deleting",
            reservation.id, reservation.status
        )))
    } else {
        Ok(())
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::CancelledByClient => "CANCELLED_BY_CLIENT",
            BookingStatus::CancelledByProvider => "CANCELLED_BY_PROVIDER",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::NoShow => "NO_SHOW",
        })
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Completed => "COMPLETED",
        })
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotStatus::Available => "AVAILABLE",
            SlotStatus::Full => "FULL",
            SlotStatus::Cancelled => "CANCELLED",
        })
    }
}
