use crate::types::{AuthorityEpoch, ParticipantId};

/// The local participant's view of its write access to one object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorityStatus {
    /// Nobody holds authority
    Available,
    /// We asked the host and are waiting for an answer
    Requested,
    /// We hold authority: writes are accepted
    Granted,
    /// The host asked us to hand authority over; writes are refused while we
    /// flush and release
    Releasing,
    /// Another participant holds authority
    Denied,
}

impl AuthorityStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthorityStatus::Granted)
    }

    pub fn is_requested(&self) -> bool {
        matches!(self, AuthorityStatus::Requested)
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self, AuthorityStatus::Releasing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthorityStatus::Available => "Available",
            AuthorityStatus::Requested => "Requested",
            AuthorityStatus::Granted => "Granted",
            AuthorityStatus::Releasing => "Releasing",
            AuthorityStatus::Denied => "Denied",
        }
    }
}

/// Snapshot of everything a participant knows about an object's authority
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthorityState {
    pub local: Option<ParticipantId>,
    pub holder: Option<ParticipantId>,
    /// `None` until the host has told us who holds the object
    pub epoch: Option<AuthorityEpoch>,
    pub status: AuthorityStatus,
}

impl AuthorityState {
    pub(crate) fn new() -> Self {
        Self {
            local: None,
            holder: None,
            epoch: None,
            status: AuthorityStatus::Available,
        }
    }

    pub fn is_local_authority(&self) -> bool {
        self.status.is_granted()
    }
}

/// What changed when a new holder was recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthorityTransition {
    pub previous_holder: Option<ParticipantId>,
    pub previous_epoch: Option<AuthorityEpoch>,
    pub holder: Option<ParticipantId>,
    pub epoch: AuthorityEpoch,
}

impl AuthorityTransition {
    /// True when authority moved from one known epoch to another. The very
    /// first holder notification an object receives is not a migration.
    pub fn is_migration(&self) -> bool {
        match self.previous_epoch {
            Some(previous) => previous != self.epoch,
            None => false,
        }
    }
}
