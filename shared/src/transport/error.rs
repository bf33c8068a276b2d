use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur while moving messages between a participant and
/// the host
#[derive(Debug, Error)]
pub enum TransportError {
    /// The other side closed the link
    #[error("Link closed by the {side}, cannot {operation}")]
    LinkClosed {
        side: &'static str,
        operation: &'static str,
    },

    /// Link queues are poisoned (a panic occurred while they were held)
    #[error("Link queue lock is poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::LinkClosed { .. })
    }
}
