//! Circle error types.

use thiserror::Error;

use super::CircleRole;
use crate::error::OsikatuError;

/// Errors that can occur during circle operations.
#[derive(Debug, Error)]
pub enum CircleError {
    #[error("Circle not found: {circle_id}")]
    NotFound { circle_id: String },

    #[error("You are not a member of this circle")]
    NotMember,

    #[error("User {user_id} is not a member of this circle")]
    MemberNotFound { user_id: String },

    #[error("Insufficient permissions: requires {required} role")]
    InsufficientRole { required: CircleRole },

    #[error("Already a member of this circle")]
    AlreadyMember,

    #[error("No circle matches this invite code")]
    InvalidInviteCode,

    /// Uses the owner's plan.
    #[error("This circle has reached its member limit ({limit})")]
    MemberLimitReached { limit: u64 },

    #[error("The owner cannot leave the circle")]
    OwnerCannotLeave,

    #[error("Cannot change the owner's role")]
    CannotChangeOwnerRole,

    #[error("Ownership cannot be assigned")]
    CannotAssignOwner,

    #[error("Cannot remove the circle owner")]
    CannotRemoveOwner,

    #[error("Admins cannot remove other admins")]
    CannotRemovePeer,

    #[error(transparent)]
    Storage(#[from] OsikatuError),
}

impl From<CircleError> for OsikatuError {
    fn from(err: CircleError) -> Self {
        match err {
            CircleError::NotFound { .. }
            | CircleError::MemberNotFound { .. }
            | CircleError::InvalidInviteCode => OsikatuError::NotFound(err.to_string()),
            CircleError::NotMember | CircleError::InsufficientRole { .. } => {
                OsikatuError::Forbidden(err.to_string())
            }
            CircleError::AlreadyMember => OsikatuError::Conflict(err.to_string()),
            CircleError::MemberLimitReached { .. } => OsikatuError::PaymentRequired(err.to_string()),
            CircleError::OwnerCannotLeave
            | CircleError::CannotChangeOwnerRole
            | CircleError::CannotAssignOwner
            | CircleError::CannotRemoveOwner => OsikatuError::BadRequest(err.to_string()),
            CircleError::CannotRemovePeer => OsikatuError::Forbidden(err.to_string()),
            CircleError::Storage(inner) => inner,
        }
    }
}
