use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, SLOT_STATUS_CHANGES_TOTAL};
use crate::store::Store;

use super::capacity::{count_active, is_full, status_for_count};
use super::lifecycle::ensure_not_started;
use super::overlap::{ensure_no_slot_clash, now_ms, validate_span};
use super::{BookingError, Engine, Entity, access};

fn record_booking(outcome: &'static str) {
    metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
}

fn record_slot_status(status: SlotStatus) {
    let label = match status {
        SlotStatus::Available => "available",
        SlotStatus::Full => "full",
        SlotStatus::Cancelled => "cancelled",
    };
    metrics::counter!(SLOT_STATUS_CHANGES_TOTAL, "status" => label).increment(1);
}

fn validate_overrides(capacity: Option<u32>, price: Option<Cents>) -> Result<(), BookingError> {
    if let Some(c) = capacity
        && (c == 0 || c > MAX_CAPACITY)
    {
        return Err(BookingError::InvalidInput("capacity must be between 1 and the maximum"));
    }
    if price.is_some_and(|p| p < 0) {
        return Err(BookingError::InvalidInput("price must not be negative"));
    }
    Ok(())
}

impl<S: Store> Engine<S> {
    // ── Time slots ───────────────────────────────────────────

    /// Publish a slot on a service. The provider's whole calendar, across all
    /// of their services, must be free for the window. Capacity and price fall
    /// back to the service defaults.
    pub async fn create_time_slot(
        &self,
        ctx: &RequesterContext,
        service_id: Ulid,
        start: Ms,
        end: Ms,
        capacity: Option<u32>,
        price: Option<Cents>,
    ) -> Result<TimeSlot, BookingError> {
        self.requester(ctx).await?;
        access::require_role_any(ctx, &[Role::Provider, Role::Admin])?;
        let span = validate_span(start, end)?;
        validate_overrides(capacity, price)?;
        let service = self.load_service(service_id).await?;
        access::require_owner_or_admin(ctx, service.owner_id)?;

        let _provider = self.locks.acquire(service.owner_id).await;
        let service = self.load_service(service_id).await?;
        if let Err(e) = ensure_no_slot_clash(self.store.as_ref(), service.owner_id, span, None).await {
            debug!("slot on service {service_id} rejected: {e}");
            return Err(e);
        }

        let slot = TimeSlot {
            id: Ulid::new(),
            public_id: Ulid::new(),
            service_id,
            provider_id: service.owner_id,
            span,
            capacity: capacity.unwrap_or(service.default_capacity),
            price: price.unwrap_or(service.default_price),
            status: SlotStatus::Available,
        };
        self.store.save_time_slot(slot.clone()).await?;
        info!("time slot {} created on service {service_id} [{}, {})", slot.id, span.start, span.end);
        Ok(slot)
    }

    /// Move or resize a slot. The overlap check skips the slot itself and the
    /// status is recomputed from the fresh booking count.
    pub async fn update_time_slot(
        &self,
        ctx: &RequesterContext,
        slot_id: Ulid,
        start: Ms,
        end: Ms,
        capacity: Option<u32>,
        price: Option<Cents>,
    ) -> Result<TimeSlot, BookingError> {
        self.requester(ctx).await?;
        let span = validate_span(start, end)?;
        validate_overrides(capacity, price)?;
        let provider_id = self.load_slot(slot_id).await?.provider_id;
        access::require_owner_or_admin(ctx, provider_id)?;

        let _provider = self.locks.acquire(provider_id).await;
        let _slot = self.locks.acquire(slot_id).await;
        let mut slot = self.load_slot(slot_id).await?;
        if slot.status == SlotStatus::Cancelled {
            return Err(BookingError::IllegalState(format!(
                "Time slot {slot_id} is cancelled and cannot be updated"
            )));
        }
        if span != slot.span {
            ensure_no_slot_clash(self.store.as_ref(), provider_id, span, Some(slot_id)).await?;
        }

        let active = count_active(self.store.as_ref(), slot_id).await?;
        let new_capacity = capacity.unwrap_or(slot.capacity);
        if new_capacity < active {
            return Err(BookingError::InvalidInput("capacity below current number of bookings"));
        }

        let previous = slot.status;
        slot.span = span;
        slot.capacity = new_capacity;
        slot.price = price.unwrap_or(slot.price);
        slot.status = status_for_count(new_capacity, active);
        self.store.save_time_slot(slot.clone()).await?;
        if slot.status != previous {
            record_slot_status(slot.status);
        }
        info!("time slot {slot_id} updated [{}, {}) capacity {new_capacity}", span.start, span.end);
        Ok(slot)
    }

    /// Withdraw a slot. Every booking still holding a seat moves to
    /// CANCELLED_BY_PROVIDER under the same slot lock.
    pub async fn cancel_time_slot(
        &self,
        ctx: &RequesterContext,
        slot_id: Ulid,
    ) -> Result<TimeSlot, BookingError> {
        self.requester(ctx).await?;
        let provider_id = self.load_slot(slot_id).await?.provider_id;
        access::require_owner_or_admin(ctx, provider_id)?;

        let _slot = self.locks.acquire(slot_id).await;
        let mut slot = self.load_slot(slot_id).await?;
        if slot.status == SlotStatus::Cancelled {
            return Err(BookingError::IllegalState(format!(
                "Time slot {slot_id} is already cancelled"
            )));
        }
        slot.status = SlotStatus::Cancelled;
        self.store.save_time_slot(slot.clone()).await?;
        record_slot_status(SlotStatus::Cancelled);

        let mut cascaded = 0usize;
        for mut booking in self.store.list_bookings_for_slot(slot_id).await? {
            if !booking.status.is_active() {
                continue;
            }
            booking.status = booking.status.cancel_by_provider()?;
            self.store.save_booking(booking).await?;
            cascaded += 1;
        }
        info!("time slot {slot_id} cancelled, {cascaded} bookings cancelled by provider");
        Ok(slot)
    }

    pub async fn get_time_slot(&self, slot_id: Ulid) -> Result<TimeSlot, BookingError> {
        self.load_slot(slot_id).await
    }

    pub async fn get_time_slot_by_public_id(&self, public_id: Ulid) -> Result<TimeSlot, BookingError> {
        self.store
            .find_time_slot_by_public_id(public_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Slot, public_id))
    }

    pub async fn list_time_slots(&self, service_id: Ulid) -> Result<Vec<TimeSlot>, BookingError> {
        self.load_service(service_id).await?;
        self.store.list_slots_for_service(service_id).await
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Take one seat on a slot for `client_id`.
    ///
    /// Status, capacity and duplicate checks, the insert and the FULL flip all
    /// happen while the slot lock is held, so the last seat is sold once.
    pub async fn create_booking(
        &self,
        ctx: &RequesterContext,
        slot_id: Ulid,
        client_id: Ulid,
        notes: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.requester(ctx).await?;
        access::require_self_or_admin(ctx, client_id)?;
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(BookingError::InvalidInput("notes too long"));
        }
        let client = self.load_user(client_id).await?;
        access::require_active(&client)?;

        let _slot = self.locks.acquire(slot_id).await;
        let mut slot = self.load_slot(slot_id).await?;
        let result = self.book_locked(&mut slot, client_id, notes).await;
        match &result {
            Ok(_) => record_booking("created"),
            Err(e) => {
                debug!("booking on slot {slot_id} for {client_id} rejected: {e}");
                record_booking("rejected");
            }
        }
        result
    }

    async fn book_locked(
        &self,
        slot: &mut TimeSlot,
        client_id: Ulid,
        notes: Option<String>,
    ) -> Result<Booking, BookingError> {
        if slot.status != SlotStatus::Available {
            return Err(BookingError::ServiceNotAvailable(format!(
                "time slot {} is {}",
                slot.id, slot.status
            )));
        }
        if is_full(self.store.as_ref(), slot).await? {
            return Err(BookingError::ServiceNotAvailable(format!(
                "time slot {} is full",
                slot.id
            )));
        }
        if self
            .store
            .exists_booking_for_client_and_slot(client_id, slot.id)
            .await?
        {
            return Err(BookingError::DuplicateBooking {
                client_id,
                slot_id: slot.id,
            });
        }

        let booking = Booking {
            id: Ulid::new(),
            slot_id: slot.id,
            client_id,
            status: BookingStatus::Confirmed,
            price: slot.price,
            notes,
            created_at: now_ms(),
        };
        self.store.save_booking(booking.clone()).await?;

        if is_full(self.store.as_ref(), slot).await? {
            slot.status = SlotStatus::Full;
            self.store.save_time_slot(slot.clone()).await?;
            record_slot_status(SlotStatus::Full);
            info!("time slot {} is now full", slot.id);
        }
        info!("booking {} confirmed for client {client_id} on slot {}", booking.id, slot.id);
        Ok(booking)
    }

    /// Client-side cancellation. Refused once the slot has started; a FULL
    /// slot reopens.
    pub async fn cancel_booking(
        &self,
        ctx: &RequesterContext,
        booking_id: Ulid,
    ) -> Result<Booking, BookingError> {
        self.requester(ctx).await?;
        let slot_id = self.load_booking(booking_id).await?.slot_id;

        let _slot = self.locks.acquire(slot_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        access::require_self_or_admin(ctx, booking.client_id)?;
        let mut slot = self.load_slot(slot_id).await?;

        ensure_not_started(slot.span.start, now_ms())?;
        booking.status = booking.status.cancel()?;
        self.store.save_booking(booking.clone()).await?;
        record_booking("cancelled");

        if slot.status == SlotStatus::Full {
            slot.status = SlotStatus::Available;
            self.store.save_time_slot(slot).await?;
            record_slot_status(SlotStatus::Available);
            info!("time slot {slot_id} reopened");
        }
        info!("booking {booking_id} cancelled by client");
        Ok(booking)
    }

    /// Move a pending booking to CONFIRMED. Provider of the slot or admin.
    pub async fn confirm_booking(
        &self,
        ctx: &RequesterContext,
        booking_id: Ulid,
    ) -> Result<Booking, BookingError> {
        self.requester(ctx).await?;
        access::require_role_any(ctx, &[Role::Provider, Role::Admin])?;
        let slot_id = self.load_booking(booking_id).await?.slot_id;
        let provider_id = self.load_slot(slot_id).await?.provider_id;
        access::require_owner_or_admin(ctx, provider_id)?;

        let _slot = self.locks.acquire(slot_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        booking.status = booking.status.confirm()?;
        self.store.save_booking(booking.clone()).await?;
        info!("booking {booking_id} confirmed");
        Ok(booking)
    }

    /// Visible to the client, the slot's provider and admins.
    pub async fn get_booking(
        &self,
        ctx: &RequesterContext,
        booking_id: Ulid,
    ) -> Result<Booking, BookingError> {
        self.authenticate(ctx).await?;
        let booking = self.load_booking(booking_id).await?;
        if booking.client_id != ctx.user_id {
            let provider_id = self.load_slot(booking.slot_id).await?.provider_id;
            access::require_owner_or_admin(ctx, provider_id)?;
        }
        Ok(booking)
    }

    pub async fn list_bookings_for_slot(
        &self,
        ctx: &RequesterContext,
        slot_id: Ulid,
    ) -> Result<Vec<Booking>, BookingError> {
        self.authenticate(ctx).await?;
        let slot = self.load_slot(slot_id).await?;
        access::require_owner_or_admin(ctx, slot.provider_id)?;
        self.store.list_bookings_for_slot(slot_id).await
    }

    pub async fn list_my_bookings(&self, ctx: &RequesterContext) -> Result<Vec<Booking>, BookingError> {
        self.authenticate(ctx).await?;
        let mut bookings = self.store.list_bookings_for_client(ctx.user_id).await?;
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }
}
