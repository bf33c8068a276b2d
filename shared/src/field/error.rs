use thiserror::Error;

use crate::{authority::error::AuthorityError, codec::CodecError};

/// Errors that can occur while reading, writing or syncing a replicated field
#[derive(Debug, Error)]
pub enum FieldError {
    /// A write was attempted by a participant that does not hold authority.
    /// Recoverable: request authority first, then retry.
    #[error("Must hold authority over object {object} before {operation} on field '{field}'. Current status: {status}")]
    NotAuthority {
        object: String,
        field: &'static str,
        operation: &'static str,
        status: &'static str,
    },

    /// A bounded write could not be accommodated, even after eviction. The
    /// write is dropped.
    #[error("Field '{field}' is at capacity ({capacity}), write dropped")]
    CapacityExceeded {
        field: &'static str,
        capacity: usize,
    },

    /// The log ran out of entry ids
    #[error("Field '{field}' exhausted its entry ids")]
    IdsExhausted { field: &'static str },

    /// Field state lock is poisoned (a panic occurred while it was held)
    #[error("Lock on field '{field}' is poisoned")]
    LockPoisoned { field: &'static str },

    /// Field state could not be encoded or decoded
    #[error("Field '{field}' could not be synced: {source}")]
    Codec {
        field: &'static str,
        source: CodecError,
    },

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

impl FieldError {
    pub fn is_not_authority(&self) -> bool {
        matches!(self, FieldError::NotAuthority { .. })
    }

    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, FieldError::CapacityExceeded { .. })
    }
}
