use thiserror::Error;

use replicast_host::HostError;
use replicast_participant::{ParticipantError, RegistryError};
use replicast_shared::{FieldError, ObjectError};

#[derive(Debug, Error)]
pub enum SpacesError {
    #[error("Light {index} is not registered on this board")]
    UnknownLight { index: u8 },

    #[error("Board already drives {capacity} lights")]
    TooManyLights { capacity: usize },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Participant(#[from] ParticipantError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Field(#[from] FieldError),
}
