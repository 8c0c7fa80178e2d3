use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::Store;

use super::overlap::now_ms;
use super::{BookingError, Engine, Entity, access};

fn validate_name(name: &str) -> Result<(), BookingError> {
    if name.trim().is_empty() {
        return Err(BookingError::InvalidInput("service name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BookingError::InvalidInput("service name too long"));
    }
    Ok(())
}

fn validate_defaults(duration_ms: Ms, price: Cents, capacity: u32) -> Result<(), BookingError> {
    if duration_ms <= 0 || duration_ms > MAX_SPAN_DURATION_MS {
        return Err(BookingError::InvalidInput("default duration out of range"));
    }
    if price < 0 {
        return Err(BookingError::InvalidInput("price must not be negative"));
    }
    if capacity == 0 || capacity > MAX_CAPACITY {
        return Err(BookingError::InvalidInput("capacity must be between 1 and the maximum"));
    }
    Ok(())
}

impl<S: Store> Engine<S> {
    /// Name uniqueness is per owner and checked under the owner lock.
    pub async fn create_service(
        &self,
        ctx: &RequesterContext,
        owner_id: Ulid,
        draft: ServiceDraft,
    ) -> Result<OfferedService, BookingError> {
        self.requester(ctx).await?;
        access::require_self_or_admin(ctx, owner_id)?;
        validate_name(&draft.name)?;
        validate_defaults(draft.default_duration_ms, draft.default_price, draft.default_capacity)?;
        let owner = self.load_user(owner_id).await?;
        if owner.role == Role::Client {
            return Err(BookingError::AccessDenied("only providers can offer services"));
        }

        let _owner = self.locks.acquire(owner_id).await;
        if self
            .store
            .find_service_by_owner_and_name(owner_id, &draft.name)
            .await?
            .is_some()
        {
            return Err(BookingError::DuplicateName(draft.name));
        }

        let service = OfferedService {
            id: Ulid::new(),
            public_id: Ulid::new(),
            owner_id,
            name: draft.name,
            default_duration_ms: draft.default_duration_ms,
            default_price: draft.default_price,
            default_capacity: draft.default_capacity,
            active: true,
        };
        self.store.save_service(service.clone()).await?;
        info!("service {} '{}' created for {owner_id}", service.id, service.name);
        Ok(service)
    }

    pub async fn update_service(
        &self,
        ctx: &RequesterContext,
        service_id: Ulid,
        patch: ServicePatch,
    ) -> Result<OfferedService, BookingError> {
        self.requester(ctx).await?;
        let owner_id = self.load_service(service_id).await?.owner_id;
        access::require_owner_or_admin(ctx, owner_id)?;

        let _owner = self.locks.acquire(owner_id).await;
        let mut service = self.load_service(service_id).await?;
        if let Some(name) = patch.name
            && name != service.name
        {
            validate_name(&name)?;
            if self
                .store
                .find_service_by_owner_and_name(owner_id, &name)
                .await?
                .is_some_and(|other| other.id != service_id)
            {
                return Err(BookingError::DuplicateName(name));
            }
            service.name = name;
        }
        if let Some(d) = patch.default_duration_ms {
            service.default_duration_ms = d;
        }
        if let Some(p) = patch.default_price {
            service.default_price = p;
        }
        if let Some(c) = patch.default_capacity {
            service.default_capacity = c;
        }
        if let Some(a) = patch.active {
            service.active = a;
        }
        validate_defaults(
            service.default_duration_ms,
            service.default_price,
            service.default_capacity,
        )?;

        self.store.save_service(service.clone()).await?;
        info!("service {service_id} updated");
        Ok(service)
    }

    /// Refused while any slot of the service is still upcoming or an active
    /// reservation has not yet ended; otherwise the service goes together
    /// with its past slots and their bookings.
    pub async fn delete_service(
        &self,
        ctx: &RequesterContext,
        service_id: Ulid,
    ) -> Result<(), BookingError> {
        self.requester(ctx).await?;
        let owner_id = self.load_service(service_id).await?.owner_id;
        access::require_owner_or_admin(ctx, owner_id)?;

        let _owner = self.locks.acquire(owner_id).await;
        let _service = self.locks.acquire(service_id).await;
        let mut slot_guards = Vec::new();
        for slot in self.store.list_slots_for_service(service_id).await? {
            slot_guards.push(self.locks.acquire(slot.id).await);
        }
        self.load_service(service_id).await?;

        let now = now_ms();
        if self.store.has_future_time_slots(service_id, now).await? {
            return Err(BookingError::ServiceInUse(service_id));
        }
        let ahead = Span::new(now, MAX_VALID_TIMESTAMP_MS);
        if self.store.count_active_reservations_in_window(service_id, ahead).await? > 0 {
            return Err(BookingError::ServiceInUse(service_id));
        }
        self.store.delete_service(service_id).await?;
        info!("service {service_id} deleted");
        Ok(())
    }

    pub async fn get_service(&self, service_id: Ulid) -> Result<OfferedService, BookingError> {
        self.load_service(service_id).await
    }

    pub async fn get_service_by_public_id(
        &self,
        public_id: Ulid,
    ) -> Result<OfferedService, BookingError> {
        self.store
            .find_service_by_public_id(public_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Service, public_id))
    }

    pub async fn list_services(&self, owner_id: Ulid) -> Result<Vec<OfferedService>, BookingError> {
        let mut services = self.store.list_services_for_owner(owner_id).await?;
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }
}
