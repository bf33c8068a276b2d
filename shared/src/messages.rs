use serde::{Deserialize, Serialize};

use crate::{
    types::{AuthorityEpoch, FieldId, ObjectId, ParticipantId, Tick},
    version::FieldVersion,
};

/// Full state of one field, stamped by the authority that wrote it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub object: ObjectId,
    pub field: FieldId,
    pub version: FieldVersion,
    /// Authority's fixed tick at flush time
    pub tick: Tick,
    pub payload: Vec<u8>,
}

/// Messages a participant sends to the session host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantMessage {
    /// Announce that this participant has (a copy of) the object
    Attach { object: ObjectId },
    /// New state of a field this participant holds authority over
    Broadcast(FieldUpdate),
    RequestAuthority { object: ObjectId },
    /// Give authority back. Sent after the final updates of the object.
    ReleaseAuthority { object: ObjectId },
    Despawn { object: ObjectId },
    Leave,
}

impl ParticipantMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ParticipantMessage::Attach { .. } => "Attach",
            ParticipantMessage::Broadcast(_) => "Broadcast",
            ParticipantMessage::RequestAuthority { .. } => "RequestAuthority",
            ParticipantMessage::ReleaseAuthority { .. } => "ReleaseAuthority",
            ParticipantMessage::Despawn { .. } => "Despawn",
            ParticipantMessage::Leave => "Leave",
        }
    }
}

/// Messages the session host sends to a participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostMessage {
    /// First message on every link: the id assigned to the receiver and the
    /// participants already in the session
    Welcome {
        participant: ParticipantId,
        participants: Vec<ParticipantId>,
    },
    FieldChanged(FieldUpdate),
    /// The object's holder changed (or is announced to a new attacher)
    AuthorityChanged {
        object: ObjectId,
        holder: Option<ParticipantId>,
        epoch: AuthorityEpoch,
    },
    /// Answer to this participant's `RequestAuthority`
    AuthorityResolved { object: ObjectId, granted: bool },
    /// Another participant wants the object: flush and release it
    ReleaseRequested {
        object: ObjectId,
        requester: ParticipantId,
    },
    Despawned { object: ObjectId },
    ParticipantJoined { participant: ParticipantId },
    ParticipantLeft { participant: ParticipantId },
}

impl HostMessage {
    pub fn name(&self) -> &'static str {
        match self {
            HostMessage::Welcome { .. } => "Welcome",
            HostMessage::FieldChanged(_) => "FieldChanged",
            HostMessage::AuthorityChanged { .. } => "AuthorityChanged",
            HostMessage::AuthorityResolved { .. } => "AuthorityResolved",
            HostMessage::ReleaseRequested { .. } => "ReleaseRequested",
            HostMessage::Despawned { .. } => "Despawned",
            HostMessage::ParticipantJoined { .. } => "ParticipantJoined",
            HostMessage::ParticipantLeft { .. } => "ParticipantLeft",
        }
    }
}
