use thiserror::Error;

use replicast_shared::{
    AuthorityError, FieldError, ObjectError, ObjectId, ParticipantId, TransportError,
};

use crate::registry::RegistryError;

/// Errors that can occur while driving a participant
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// The link to the host is closed, or was never welcomed
    #[error("Participant is not connected, cannot {operation}")]
    NotConnected { operation: &'static str },

    #[error("Object {object} is not attached to this participant")]
    UnknownObject { object: ObjectId },

    #[error("Object {object} is already attached to this participant")]
    AlreadyAttached { object: ObjectId },

    /// A holder-only operation (despawn) was attempted without authority
    #[error("Must hold authority over object {object} to {operation}, held by {holder:?}")]
    NotAuthority {
        object: ObjectId,
        operation: &'static str,
        holder: Option<ParticipantId>,
    },

    /// The task executor refused a future (it is shutting down)
    #[error("Could not spawn task: {0}")]
    Spawn(#[from] futures::task::SpawnError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
