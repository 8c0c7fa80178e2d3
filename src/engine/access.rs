//! Authorization guards, called at the top of each engine operation.

use ulid::Ulid;

use crate::model::{RequesterContext, Role, User};

use super::BookingError;

pub fn require_admin(ctx: &RequesterContext) -> Result<(), BookingError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(BookingError::AccessDenied("administrator role required"))
    }
}

/// The requester acts on their own behalf, or is an admin.
pub fn require_self_or_admin(ctx: &RequesterContext, user_id: Ulid) -> Result<(), BookingError> {
    if ctx.user_id == user_id || ctx.is_admin() {
        Ok(())
    } else {
        Err(BookingError::AccessDenied("requester may only act on their own behalf"))
    }
}

/// The requester owns the service or slot in question, or is an admin.
pub fn require_owner_or_admin(ctx: &RequesterContext, owner_id: Ulid) -> Result<(), BookingError> {
    if ctx.user_id == owner_id || ctx.is_admin() {
        Ok(())
    } else {
        Err(BookingError::AccessDenied("requester does not own this resource"))
    }
}

pub fn require_role_any(ctx: &RequesterContext, roles: &[Role]) -> Result<(), BookingError> {
    if roles.iter().any(|r| ctx.has_role(*r)) {
        Ok(())
    } else {
        Err(BookingError::AccessDenied("requester lacks the required role"))
    }
}

/// Every role the context claims must be the account's stored role.
pub fn require_roles_match(ctx: &RequesterContext, user: &User) -> Result<(), BookingError> {
    if ctx.roles.iter().all(|r| *r == user.role) {
        Ok(())
    } else {
        Err(BookingError::AccessDenied("requester claims a role the account does not hold"))
    }
}

pub fn require_active(user: &User) -> Result<(), BookingError> {
    if user.active {
        Ok(())
    } else {
        Err(BookingError::AccessDenied("account is disabled"))
    }
}
