use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Money in minor units (cents).
pub type Cents = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Like `new`, but returns `None` instead of asserting when `end <= start`.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Client,
    Provider,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
}

/// Who is asking. Passed explicitly into every engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterContext {
    pub user_id: Ulid,
    pub roles: Vec<Role>,
}

impl RequesterContext {
    pub fn new(user_id: Ulid, roles: impl Into<Vec<Role>>) -> Self {
        Self {
            user_id,
            roles: roles.into(),
        }
    }

    pub fn for_user(user: &User) -> Self {
        Self::new(user.id, vec![user.role])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

// ── Offered services ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedService {
    pub id: Ulid,
    pub public_id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
    pub default_duration_ms: Ms,
    pub default_price: Cents,
    pub default_capacity: u32,
    pub active: bool,
}

/// Input for creating a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDraft {
    pub name: String,
    pub default_duration_ms: Ms,
    pub default_price: Cents,
    pub default_capacity: u32,
}

/// Partial update: only `Some` fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub default_duration_ms: Option<Ms>,
    pub default_price: Option<Cents>,
    pub default_capacity: Option<u32>,
    pub active: Option<bool>,
}

// ── Time slots and bookings ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Full,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Ulid,
    pub public_id: Ulid,
    pub service_id: Ulid,
    /// Denormalized from the service so provider-wide overlap queries need no join.
    pub provider_id: Ulid,
    pub span: Span,
    pub capacity: u32,
    pub price: Cents,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    PendingPayment,
    AwaitingConfirmation,
    Confirmed,
    CancelledByClient,
    CancelledByProvider,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Whether a booking in this status still occupies a seat.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            BookingStatus::PendingPayment
                | BookingStatus::AwaitingConfirmation
                | BookingStatus::Confirmed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::CancelledByClient
                | BookingStatus::CancelledByProvider
                | BookingStatus::Completed
                | BookingStatus::NoShow
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub client_id: Ulid,
    pub status: BookingStatus,
    pub price: Cents,
    pub notes: Option<String>,
    pub created_at: Ms,
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Pending and confirmed reservations hold the service.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub service_id: Ulid,
    pub span: Span,
    pub price: Cents,
    pub notes: Option<String>,
    pub status: ReservationStatus,
}

/// Requested window and optional overrides for a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDetails {
    pub start: Ms,
    pub end: Ms,
    pub price: Option<Cents>,
    pub notes: Option<String>,
}

// ── WAL records ──────────────────────────────────────────────────

/// WAL record format. Flat, no nesting.
/// Saves are upserts carrying the full entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserSaved(User),
    ServiceSaved(OfferedService),
    ServiceDeleted { id: Ulid },
    SlotSaved(TimeSlot),
    BookingSaved(Booking),
    ReservationSaved(Reservation),
    ReservationDeleted { id: Ulid },
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.overlaps(&Span::new(199, 300)));
    }

    #[test]
    fn adjacent_hours_do_not_overlap() {
        let ten = Span::new(10 * H, 11 * H);
        let eleven = Span::new(11 * H, 12 * H);
        assert!(!ten.overlaps(&eleven));
        assert!(!eleven.overlaps(&ten));
    }

    #[test]
    fn one_minute_overlap_is_detected() {
        let ten = Span::new(10 * H, 11 * H);
        let late = Span::new(10 * H + 59 * 60_000, 11 * H + 30 * 60_000);
        assert!(ten.overlaps(&late));
        assert!(late.overlaps(&ten));
    }

    #[test]
    fn overlap_matches_predicate_exhaustively() {
        // Every pair of intervals on a small grid.
        for s1 in 0..6 {
            for e1 in (s1 + 1)..7 {
                for s2 in 0..6 {
                    for e2 in (s2 + 1)..7 {
                        let a = Span::new(s1, e1);
                        let b = Span::new(s2, e2);
                        assert_eq!(a.overlaps(&b), s1 < e2 && s2 < e1, "{a:?} vs {b:?}");
                        assert_eq!(a.overlaps(&b), b.overlaps(&a));
                    }
                }
            }
        }
    }

    #[test]
    fn checked_rejects_empty_and_inverted() {
        assert!(Span::checked(5, 5).is_none());
        assert!(Span::checked(6, 5).is_none());
        assert_eq!(Span::checked(5, 6), Some(Span::new(5, 6)));
    }

    #[test]
    fn booking_status_classes() {
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::PendingPayment.is_active());
        assert!(!BookingStatus::CancelledByClient.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(BookingStatus::NoShow.is_terminal());
        assert!(!BookingStatus::AwaitingConfirmation.is_terminal());
    }

    #[test]
    fn requester_roles() {
        let ctx = RequesterContext::new(Ulid::new(), vec![Role::Provider]);
        assert!(ctx.has_role(Role::Provider));
        assert!(!ctx.is_admin());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::SlotSaved(TimeSlot {
            id: Ulid::new(),
            public_id: Ulid::new(),
            service_id: Ulid::new(),
            provider_id: Ulid::new(),
            span: Span::new(9 * H, 10 * H),
            capacity: 2,
            price: 1000,
            status: SlotStatus::Available,
        });
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
