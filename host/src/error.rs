use thiserror::Error;

use replicast_shared::{ParticipantId, TransportError};

/// Errors that can occur while running a session host
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Participant {participant} is not connected, cannot {operation}")]
    UnknownParticipant {
        participant: ParticipantId,
        operation: &'static str,
    },

    /// Every participant id has been handed out
    #[error("Participant ids exhausted")]
    ParticipantIdsExhausted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
