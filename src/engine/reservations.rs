use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::RESERVATIONS_TOTAL;
use crate::store::Store;

use super::lifecycle::ensure_reservation_deletable;
use super::overlap::{ensure_no_reservation_clash, now_ms, validate_span};
use super::{BookingError, Engine, access};

fn record_reservation(outcome: &'static str) {
    metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
}

fn validate_details(details: &ReservationDetails) -> Result<Span, BookingError> {
    if details.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(BookingError::InvalidInput("notes too long"));
    }
    if details.price.is_some_and(|p| p < 0) {
        return Err(BookingError::InvalidInput("price must not be negative"));
    }
    validate_span(details.start, details.end)
}

impl<S: Store> Engine<S> {
    /// Reserve a service outright for an arbitrary window. The service is a
    /// single exclusive resource here: no other live reservation on it may
    /// overlap.
    pub async fn create_reservation(
        &self,
        ctx: &RequesterContext,
        details: ReservationDetails,
        owner_id: Ulid,
        service_id: Ulid,
    ) -> Result<Reservation, BookingError> {
        self.requester(ctx).await?;
        access::require_self_or_admin(ctx, owner_id)?;
        let owner = self.load_user(owner_id).await?;
        access::require_active(&owner)?;
        let span = validate_details(&details)?;

        let _service = self.locks.acquire(service_id).await;
        let service = self.load_service(service_id).await?;
        if !service.active {
            return Err(BookingError::ServiceNotAvailable(format!(
                "service {service_id} is inactive"
            )));
        }
        if let Err(e) = ensure_no_reservation_clash(self.store.as_ref(), service_id, span, None).await {
            debug!("reservation on service {service_id} rejected: {e}");
            record_reservation("rejected");
            return Err(e);
        }

        let reservation = Reservation {
            id: Ulid::new(),
            owner_id,
            service_id,
            span,
            price: details.price.unwrap_or(service.default_price),
            notes: details.notes,
            status: ReservationStatus::Pending,
        };
        self.store.save_reservation(reservation.clone()).await?;
        record_reservation("created");
        info!("reservation {} pending on service {service_id}", reservation.id);
        Ok(reservation)
    }

    /// Change window, price or notes. The overlap check re-runs only when the
    /// window moved.
    pub async fn update_reservation(
        &self,
        ctx: &RequesterContext,
        reservation_id: Ulid,
        details: ReservationDetails,
    ) -> Result<Reservation, BookingError> {
        self.requester(ctx).await?;
        let service_id = self.load_reservation(reservation_id).await?.service_id;

        let _service = self.locks.acquire(service_id).await;
        let mut reservation = self.load_reservation(reservation_id).await?;
        access::require_self_or_admin(ctx, reservation.owner_id)?;
        if !reservation.status.is_active() {
            return Err(BookingError::IllegalState(format!(
                "Reservation cannot be updated from status: {}",
                reservation.status
            )));
        }

        let span = validate_details(&details)?;
        if span != reservation.span {
            ensure_no_reservation_clash(self.store.as_ref(), service_id, span, Some(reservation_id))
                .await?;
            reservation.span = span;
        }
        if let Some(price) = details.price {
            reservation.price = price;
        }
        if details.notes.is_some() {
            reservation.notes = details.notes;
        }
        self.store.save_reservation(reservation.clone()).await?;
        info!("reservation {reservation_id} updated");
        Ok(reservation)
    }

    /// Hard delete. Upcoming reservations that still hold the service must be
    /// cancelled first.
    pub async fn delete_reservation(
        &self,
        ctx: &RequesterContext,
        reservation_id: Ulid,
    ) -> Result<(), BookingError> {
        self.requester(ctx).await?;
        let service_id = self.load_reservation(reservation_id).await?.service_id;

        let _service = self.locks.acquire(service_id).await;
        let reservation = self.load_reservation(reservation_id).await?;
        access::require_self_or_admin(ctx, reservation.owner_id)?;
        ensure_reservation_deletable(&reservation, now_ms())?;
        self.store.delete_reservation(reservation_id).await?;
        info!("reservation {reservation_id} deleted");
        Ok(())
    }

    /// PENDING → CONFIRMED, by the service's owner or an admin.
    pub async fn confirm_reservation(
        &self,
        ctx: &RequesterContext,
        reservation_id: Ulid,
    ) -> Result<Reservation, BookingError> {
        self.requester(ctx).await?;
        let service_id = self.load_reservation(reservation_id).await?.service_id;
        let owner_id = self.load_service(service_id).await?.owner_id;
        access::require_owner_or_admin(ctx, owner_id)?;

        let _service = self.locks.acquire(service_id).await;
        let mut reservation = self.load_reservation(reservation_id).await?;
        reservation.status = reservation.status.confirm()?;
        self.store.save_reservation(reservation.clone()).await?;
        record_reservation("confirmed");
        info!("reservation {reservation_id} confirmed");
        Ok(reservation)
    }

    /// By the reservation holder, the service's owner or an admin.
    pub async fn cancel_reservation(
        &self,
        ctx: &RequesterContext,
        reservation_id: Ulid,
    ) -> Result<Reservation, BookingError> {
        self.requester(ctx).await?;
        let service_id = self.load_reservation(reservation_id).await?.service_id;

        let _service = self.locks.acquire(service_id).await;
        let mut reservation = self.load_reservation(reservation_id).await?;
        if reservation.owner_id != ctx.user_id {
            let service_owner = self.load_service(service_id).await?.owner_id;
            access::require_owner_or_admin(ctx, service_owner)?;
        }
        reservation.status = reservation.status.cancel()?;
        self.store.save_reservation(reservation.clone()).await?;
        record_reservation("cancelled");
        info!("reservation {reservation_id} cancelled");
        Ok(reservation)
    }

    pub async fn get_reservation(
        &self,
        ctx: &RequesterContext,
        reservation_id: Ulid,
    ) -> Result<Reservation, BookingError> {
        self.authenticate(ctx).await?;
        let reservation = self.load_reservation(reservation_id).await?;
        if reservation.owner_id != ctx.user_id {
            let service_owner = self.load_service(reservation.service_id).await?.owner_id;
            access::require_owner_or_admin(ctx, service_owner)?;
        }
        Ok(reservation)
    }

    pub async fn list_reservations(
        &self,
        ctx: &RequesterContext,
        user_id: Ulid,
    ) -> Result<Vec<Reservation>, BookingError> {
        self.authenticate(ctx).await?;
        access::require_self_or_admin(ctx, user_id)?;
        self.store.list_reservations_for_user(user_id).await
    }

    /// Whether no live reservation on the service touches `[start, end)`.
    pub async fn is_service_free(
        &self,
        service_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<bool, BookingError> {
        let span = validate_span(start, end)?;
        self.load_service(service_id).await?;
        Ok(self
            .store
            .count_active_reservations_in_window(service_id, span)
            .await?
            == 0)
    }
}
