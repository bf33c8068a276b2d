use log::warn;

use replicast_participant::{Participant, ParticipantError};
use replicast_shared::{FieldError, ObjectId, Transport};

/// Waits for authority over `object`, then runs `write`. Nothing is written
/// if the request is denied, cancelled or times out.
pub(crate) fn write_with_authority<T, F>(
    participant: &Participant<T>,
    object: ObjectId,
    write: F,
) -> Result<(), ParticipantError>
where
    T: Transport,
    F: FnOnce() -> Result<(), FieldError> + 'static,
{
    let request = participant.request_authority(object)?;
    participant.spawn(async move {
        let outcome = request.await;
        if !outcome.is_granted() {
            warn!("no authority over {}: {}", object, outcome.name());
            return;
        }
        if let Err(error) = write() {
            warn!("write to {} failed: {}", object, error);
        }
    })
}
