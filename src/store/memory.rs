use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::{BookingStore, ReservationStore, ServiceStore, SlotStore, StoreResult, UserStore};

/// Arena-style tables keyed by id, with secondary indexes for the
/// parent → children walks the ports need.
pub struct InMemoryStore {
    users: DashMap<Ulid, User>,
    usernames: DashMap<String, Ulid>,
    services: DashMap<Ulid, OfferedService>,
    service_public_ids: DashMap<Ulid, Ulid>,
    services_by_owner: DashMap<Ulid, Vec<Ulid>>,
    slots: DashMap<Ulid, TimeSlot>,
    slot_public_ids: DashMap<Ulid, Ulid>,
    slots_by_service: DashMap<Ulid, Vec<Ulid>>,
    bookings: DashMap<Ulid, Booking>,
    bookings_by_slot: DashMap<Ulid, Vec<Ulid>>,
    bookings_by_client: DashMap<Ulid, Vec<Ulid>>,
    reservations: DashMap<Ulid, Reservation>,
    reservations_by_service: DashMap<Ulid, Vec<Ulid>>,
    reservations_by_user: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn index_push(index: &DashMap<Ulid, Vec<Ulid>>, parent: Ulid, child: Ulid) {
    index.entry(parent).or_default().push(child);
}

fn index_remove(index: &DashMap<Ulid, Vec<Ulid>>, parent: &Ulid, child: &Ulid) {
    if let Some(mut kids) = index.get_mut(parent) {
        kids.retain(|c| c != child);
    }
}

fn index_get(index: &DashMap<Ulid, Vec<Ulid>>, parent: &Ulid) -> Vec<Ulid> {
    index
        .get(parent)
        .map(|e| e.value().clone())
        .unwrap_or_default()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
            services: DashMap::new(),
            service_public_ids: DashMap::new(),
            services_by_owner: DashMap::new(),
            slots: DashMap::new(),
            slot_public_ids: DashMap::new(),
            slots_by_service: DashMap::new(),
            bookings: DashMap::new(),
            bookings_by_slot: DashMap::new(),
            bookings_by_client: DashMap::new(),
            reservations: DashMap::new(),
            reservations_by_service: DashMap::new(),
            reservations_by_user: DashMap::new(),
        }
    }

    // ── Writes ───────────────────────────────────────────────

    pub fn put_user(&self, user: User) {
        if let Some(old) = self.users.get(&user.id).map(|e| e.username.clone())
            && old != user.username
        {
            self.usernames.remove(&old);
        }
        self.usernames.insert(user.username.clone(), user.id);
        self.users.insert(user.id, user);
    }

    pub fn put_service(&self, service: OfferedService) {
        let (id, owner_id, public_id) = (service.id, service.owner_id, service.public_id);
        if self.services.insert(id, service).is_none() {
            index_push(&self.services_by_owner, owner_id, id);
            self.service_public_ids.insert(public_id, id);
        }
    }

    /// Cascades to the service's slots and their bookings.
    pub fn remove_service(&self, id: &Ulid) {
        let Some((_, service)) = self.services.remove(id) else {
            return;
        };
        index_remove(&self.services_by_owner, &service.owner_id, id);
        self.service_public_ids.remove(&service.public_id);

        let slot_ids = self
            .slots_by_service
            .remove(id)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        for slot_id in slot_ids {
            if let Some((_, slot)) = self.slots.remove(&slot_id) {
                self.slot_public_ids.remove(&slot.public_id);
            }
            let booking_ids = self
                .bookings_by_slot
                .remove(&slot_id)
                .map(|(_, ids)| ids)
                .unwrap_or_default();
            for booking_id in booking_ids {
                if let Some((_, booking)) = self.bookings.remove(&booking_id) {
                    index_remove(&self.bookings_by_client, &booking.client_id, &booking_id);
                }
            }
        }
    }

    pub fn put_slot(&self, slot: TimeSlot) {
        let (id, service_id, public_id) = (slot.id, slot.service_id, slot.public_id);
        if self.slots.insert(id, slot).is_none() {
            index_push(&self.slots_by_service, service_id, id);
            self.slot_public_ids.insert(public_id, id);
        }
    }

    pub fn put_booking(&self, booking: Booking) {
        let (id, slot_id, client_id) = (booking.id, booking.slot_id, booking.client_id);
        if self.bookings.insert(id, booking).is_none() {
            index_push(&self.bookings_by_slot, slot_id, id);
            index_push(&self.bookings_by_client, client_id, id);
        }
    }

    pub fn put_reservation(&self, reservation: Reservation) {
        let (id, service_id, owner_id) = (reservation.id, reservation.service_id, reservation.owner_id);
        if self.reservations.insert(id, reservation).is_none() {
            index_push(&self.reservations_by_service, service_id, id);
            index_push(&self.reservations_by_user, owner_id, id);
        }
    }

    pub fn remove_reservation(&self, id: &Ulid) {
        if let Some((_, r)) = self.reservations.remove(id) {
            index_remove(&self.reservations_by_service, &r.service_id, id);
            index_remove(&self.reservations_by_user, &r.owner_id, id);
        }
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::UserSaved(user) => self.put_user(user.clone()),
            Event::ServiceSaved(service) => self.put_service(service.clone()),
            Event::ServiceDeleted { id } => self.remove_service(id),
            Event::SlotSaved(slot) => self.put_slot(slot.clone()),
            Event::BookingSaved(booking) => self.put_booking(booking.clone()),
            Event::ReservationSaved(reservation) => self.put_reservation(reservation.clone()),
            Event::ReservationDeleted { id } => self.remove_reservation(id),
        }
    }

    /// One save event per live entity, parents before children.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(self.users.iter().map(|e| Event::UserSaved(e.value().clone())));
        events.extend(self.services.iter().map(|e| Event::ServiceSaved(e.value().clone())));
        events.extend(self.slots.iter().map(|e| Event::SlotSaved(e.value().clone())));
        events.extend(self.bookings.iter().map(|e| Event::BookingSaved(e.value().clone())));
        events.extend(
            self.reservations
                .iter()
                .map(|e| Event::ReservationSaved(e.value().clone())),
        );
        events
    }

    // ── Reads ────────────────────────────────────────────────

    fn slots_of(&self, service_id: &Ulid) -> Vec<TimeSlot> {
        index_get(&self.slots_by_service, service_id)
            .iter()
            .filter_map(|id| self.slots.get(id).map(|e| e.value().clone()))
            .collect()
    }

    fn bookings_of(&self, index: &DashMap<Ulid, Vec<Ulid>>, parent: &Ulid) -> Vec<Booking> {
        index_get(index, parent)
            .iter()
            .filter_map(|id| self.bookings.get(id).map(|e| e.value().clone()))
            .collect()
    }

    fn reservations_of(&self, index: &DashMap<Ulid, Vec<Ulid>>, parent: &Ulid) -> Vec<Reservation> {
        index_get(index, parent)
            .iter()
            .filter_map(|id| self.reservations.get(id).map(|e| e.value().clone()))
            .collect()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user_by_id(&self, id: Ulid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let id = self.usernames.get(username).map(|e| *e.value());
        Ok(id.and_then(|id| self.users.get(&id).map(|e| e.value().clone())))
    }

    async fn save_user(&self, user: User) -> StoreResult<()> {
        self.put_user(user);
        Ok(())
    }
}

#[async_trait]
impl ServiceStore for InMemoryStore {
    async fn find_service_by_id(&self, id: Ulid) -> StoreResult<Option<OfferedService>> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }

    async fn find_service_by_public_id(&self, public_id: Ulid) -> StoreResult<Option<OfferedService>> {
        let id = self.service_public_ids.get(&public_id).map(|e| *e.value());
        Ok(id.and_then(|id| self.services.get(&id).map(|e| e.value().clone())))
    }

    async fn find_service_by_owner_and_name(
        &self,
        owner_id: Ulid,
        name: &str,
    ) -> StoreResult<Option<OfferedService>> {
        Ok(index_get(&self.services_by_owner, &owner_id)
            .iter()
            .filter_map(|id| self.services.get(id).map(|e| e.value().clone()))
            .find(|s| s.name == name))
    }

    async fn list_services_for_owner(&self, owner_id: Ulid) -> StoreResult<Vec<OfferedService>> {
        Ok(index_get(&self.services_by_owner, &owner_id)
            .iter()
            .filter_map(|id| self.services.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn save_service(&self, service: OfferedService) -> StoreResult<()> {
        self.put_service(service);
        Ok(())
    }

    async fn delete_service(&self, id: Ulid) -> StoreResult<()> {
        self.remove_service(&id);
        Ok(())
    }
}

#[async_trait]
impl SlotStore for InMemoryStore {
    async fn find_time_slot_by_id(&self, id: Ulid) -> StoreResult<Option<TimeSlot>> {
        Ok(self.slots.get(&id).map(|e| e.value().clone()))
    }

    async fn find_time_slot_by_public_id(&self, public_id: Ulid) -> StoreResult<Option<TimeSlot>> {
        let id = self.slot_public_ids.get(&public_id).map(|e| *e.value());
        Ok(id.and_then(|id| self.slots.get(&id).map(|e| e.value().clone())))
    }

    async fn save_time_slot(&self, slot: TimeSlot) -> StoreResult<()> {
        self.put_slot(slot);
        Ok(())
    }

    async fn find_overlapping_slots_for_provider(
        &self,
        provider_id: Ulid,
        span: Span,
        exclude_slot_id: Option<Ulid>,
    ) -> StoreResult<Vec<TimeSlot>> {
        let mut hits = Vec::new();
        for service_id in index_get(&self.services_by_owner, &provider_id) {
            hits.extend(self.slots_of(&service_id).into_iter().filter(|slot| {
                slot.status != SlotStatus::Cancelled
                    && Some(slot.id) != exclude_slot_id
                    && slot.span.overlaps(&span)
            }));
        }
        hits.sort_by_key(|s| s.span.start);
        Ok(hits)
    }

    async fn has_future_time_slots(&self, service_id: Ulid, now: Ms) -> StoreResult<bool> {
        Ok(self.slots_of(&service_id).iter().any(|s| s.span.start > now))
    }

    async fn list_slots_for_service(&self, service_id: Ulid) -> StoreResult<Vec<TimeSlot>> {
        let mut slots = self.slots_of(&service_id);
        slots.sort_by_key(|s| s.span.start);
        Ok(slots)
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn find_booking_by_id(&self, id: Ulid) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn save_booking(&self, booking: Booking) -> StoreResult<()> {
        self.put_booking(booking);
        Ok(())
    }

    async fn count_bookings_for_slot(&self, slot_id: Ulid) -> StoreResult<u32> {
        let active = self
            .bookings_of(&self.bookings_by_slot, &slot_id)
            .iter()
            .filter(|b| b.status.is_active())
            .count();
        Ok(active as u32)
    }

    async fn exists_booking_for_client_and_slot(
        &self,
        client_id: Ulid,
        slot_id: Ulid,
    ) -> StoreResult<bool> {
        Ok(self
            .bookings_of(&self.bookings_by_slot, &slot_id)
            .iter()
            .any(|b| b.client_id == client_id && b.status.is_active()))
    }

    async fn list_bookings_for_slot(&self, slot_id: Ulid) -> StoreResult<Vec<Booking>> {
        Ok(self.bookings_of(&self.bookings_by_slot, &slot_id))
    }

    async fn list_bookings_for_client(&self, client_id: Ulid) -> StoreResult<Vec<Booking>> {
        Ok(self.bookings_of(&self.bookings_by_client, &client_id))
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn find_reservation_by_id(&self, id: Ulid) -> StoreResult<Option<Reservation>> {
        Ok(self.reservations.get(&id).map(|e| e.value().clone()))
    }

    async fn save_reservation(&self, reservation: Reservation) -> StoreResult<()> {
        self.put_reservation(reservation);
        Ok(())
    }

    async fn delete_reservation(&self, id: Ulid) -> StoreResult<()> {
        self.remove_reservation(&id);
        Ok(())
    }

    async fn find_overlapping_reservations(
        &self,
        service_id: Ulid,
        span: Span,
        exclude_reservation_id: Option<Ulid>,
    ) -> StoreResult<Vec<Reservation>> {
        let mut hits: Vec<Reservation> = self
            .reservations_of(&self.reservations_by_service, &service_id)
            .into_iter()
            .filter(|r| {
                r.status.is_active()
                    && Some(r.id) != exclude_reservation_id
                    && r.span.overlaps(&span)
            })
            .collect();
        hits.sort_by_key(|r| r.span.start);
        Ok(hits)
    }

    async fn count_active_reservations_in_window(
        &self,
        service_id: Ulid,
        span: Span,
    ) -> StoreResult<usize> {
        Ok(self
            .reservations_of(&self.reservations_by_service, &service_id)
            .iter()
            .filter(|r| r.status.is_active() && r.span.overlaps(&span))
            .count())
    }

    async fn list_reservations_for_user(&self, user_id: Ulid) -> StoreResult<Vec<Reservation>> {
        let mut list = self.reservations_of(&self.reservations_by_user, &user_id);
        list.sort_by_key(|r| r.span.start);
        Ok(list)
    }
}
