use ulid::Ulid;

use crate::model::Ms;

/// Entity named by a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Service,
    Slot,
    Booking,
    Reservation,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Service => "service",
            Entity::Slot => "time slot",
            Entity::Booking => "booking",
            Entity::Reservation => "reservation",
        };
        f.write_str(name)
    }
}

/// Coarse classification for callers that translate failures into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    IllegalState,
    AccessDenied,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    NotFound(Entity, Ulid),
    TimeSlotClash { clashing: Vec<Ulid> },
    ReservationClash { clashing: Vec<Ulid> },
    DuplicateBooking { client_id: Ulid, slot_id: Ulid },
    ServiceNotAvailable(String),
    DuplicateName(String),
    ServiceInUse(Ulid),
    InvalidInput(&'static str),
    IllegalState(String),
    EventAlreadyOccurred { starts_at: Ms },
    AccessDenied(&'static str),
    Storage(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::NotFound(..) => ErrorKind::NotFound,
            BookingError::TimeSlotClash { .. }
            | BookingError::ReservationClash { .. }
            | BookingError::DuplicateBooking { .. }
            | BookingError::ServiceNotAvailable(_)
            | BookingError::DuplicateName(_)
            | BookingError::ServiceInUse(_) => ErrorKind::Conflict,
            BookingError::InvalidInput(_) => ErrorKind::InvalidInput,
            BookingError::IllegalState(_) | BookingError::EventAlreadyOccurred { .. } => {
                ErrorKind::IllegalState
            }
            BookingError::AccessDenied(_) => ErrorKind::AccessDenied,
            BookingError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            BookingError::TimeSlotClash { clashing } => {
                write!(f, "time slot clashes with existing slots: {clashing:?}")
            }
            BookingError::ReservationClash { clashing } => {
                write!(f, "reservation overlaps existing reservations: {clashing:?}")
            }
            BookingError::DuplicateBooking { client_id, slot_id } => {
                write!(f, "client {client_id} already holds a booking on slot {slot_id}")
            }
            BookingError::ServiceNotAvailable(reason) => write!(f, "service not available: {reason}"),
            BookingError::DuplicateName(name) => write!(f, "name already in use: {name}"),
            BookingError::ServiceInUse(id) => {
                write!(f, "service {id} still has upcoming time slots")
            }
            BookingError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            BookingError::IllegalState(msg) => f.write_str(msg),
            BookingError::EventAlreadyOccurred { starts_at } => {
                write!(f, "cannot cancel: event already occurred (started at {starts_at})")
            }
            BookingError::AccessDenied(msg) => write!(f, "access denied: {msg}"),
            BookingError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}
