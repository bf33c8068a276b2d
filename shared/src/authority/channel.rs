use std::sync::{Arc, PoisonError, RwLock};

use crate::{
    authority::{
        error::AuthorityError,
        status::{AuthorityState, AuthorityStatus, AuthorityTransition},
    },
    types::{AuthorityEpoch, ObjectId, ParticipantId},
};

// AuthorityChannel
#[derive(Clone)]
struct AuthorityChannel {
    object: ObjectId,
    data: Arc<RwLock<AuthorityState>>,
}

impl AuthorityChannel {
    fn new_channel(object: ObjectId) -> (AuthorityMutator, AuthorityAccessor) {
        let channel = Self {
            object,
            data: Arc::new(RwLock::new(AuthorityState::new())),
        };

        let mutator = AuthorityMutator {
            channel: channel.clone(),
        };
        let accessor = AuthorityAccessor { channel };

        (mutator, accessor)
    }

    fn try_state(&self) -> Result<AuthorityState, AuthorityError> {
        let data = self
            .data
            .read()
            .map_err(|_| AuthorityError::LockPoisoned)?;
        Ok(*data)
    }

    /// Never fails: a poisoned lock still holds the last written state
    fn state(&self) -> AuthorityState {
        *self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(
        &self,
        f: impl FnOnce(&mut AuthorityState) -> Result<R, AuthorityError>,
    ) -> Result<R, AuthorityError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| AuthorityError::LockPoisoned)?;
        f(&mut data)
    }

    fn invalid(&self, from: AuthorityStatus, to: AuthorityStatus, operation: &'static str) -> AuthorityError {
        AuthorityError::InvalidTransition {
            object: self.object.to_string(),
            from_state: from.name(),
            to_state: to.name(),
            operation,
        }
    }
}

fn settled_status(state: &AuthorityState) -> AuthorityStatus {
    match (state.holder, state.local) {
        (Some(holder), Some(local)) if holder == local => AuthorityStatus::Granted,
        (Some(_), _) => AuthorityStatus::Denied,
        (None, _) => AuthorityStatus::Available,
    }
}

// AuthorityAccessor
/// Read-only view of an object's authority, shared by every field handle of
/// the object so writes can be gated without going through the participant.
#[derive(Clone)]
pub struct AuthorityAccessor {
    channel: AuthorityChannel,
}

impl AuthorityAccessor {
    pub fn object(&self) -> ObjectId {
        self.channel.object
    }

    pub fn state(&self) -> AuthorityState {
        self.channel.state()
    }

    pub fn try_state(&self) -> Result<AuthorityState, AuthorityError> {
        self.channel.try_state()
    }

    pub fn status(&self) -> AuthorityStatus {
        self.state().status
    }

    pub fn holder(&self) -> Option<ParticipantId> {
        self.state().holder
    }

    pub fn epoch(&self) -> Option<AuthorityEpoch> {
        self.state().epoch
    }

    pub fn local(&self) -> Option<ParticipantId> {
        self.state().local
    }

    pub fn is_granted(&self) -> bool {
        self.status().is_granted()
    }
}

// AuthorityMutator
// no Clone necessary
/// Write side of an object's authority view. Owned by the object; only the
/// participant runtime drives it, in response to host messages.
pub struct AuthorityMutator {
    channel: AuthorityChannel,
}

impl AuthorityMutator {
    pub fn accessor(&self) -> AuthorityAccessor {
        AuthorityAccessor {
            channel: self.channel.clone(),
        }
    }

    pub fn set_local(&self, local: ParticipantId) -> Result<(), AuthorityError> {
        self.channel.update(|state| {
            state.local = Some(local);
            state.status = if state.status.is_requested() {
                AuthorityStatus::Requested
            } else {
                settled_status(state)
            };
            Ok(())
        })
    }

    /// Records the holder announced by the host. Keeps a pending request
    /// pending unless the announcement grants it.
    pub fn record_holder(
        &self,
        holder: Option<ParticipantId>,
        epoch: AuthorityEpoch,
    ) -> Result<AuthorityTransition, AuthorityError> {
        self.channel.update(|state| {
            let transition = AuthorityTransition {
                previous_holder: state.holder,
                previous_epoch: state.epoch,
                holder,
                epoch,
            };
            state.holder = holder;
            state.epoch = Some(epoch);
            let settled = settled_status(state);
            state.status = if state.status.is_requested() && !settled.is_granted() {
                AuthorityStatus::Requested
            } else {
                settled
            };
            Ok(transition)
        })
    }

    pub fn mark_requested(&self) -> Result<(), AuthorityError> {
        self.channel.update(|state| match state.status {
            AuthorityStatus::Available | AuthorityStatus::Denied | AuthorityStatus::Requested => {
                state.status = AuthorityStatus::Requested;
                Ok(())
            }
            from => Err(self
                .channel
                .invalid(from, AuthorityStatus::Requested, "request authority")),
        })
    }

    /// Called when the host answers a request. A grant is only trusted once
    /// the matching holder announcement arrived.
    pub fn resolve_request(&self) -> Result<AuthorityStatus, AuthorityError> {
        self.channel.update(|state| {
            if state.status.is_requested() {
                state.status = settled_status(state);
            }
            Ok(state.status)
        })
    }

    pub fn mark_releasing(&self) -> Result<(), AuthorityError> {
        self.channel.update(|state| match state.status {
            AuthorityStatus::Granted => {
                state.status = AuthorityStatus::Releasing;
                Ok(())
            }
            from => Err(self
                .channel
                .invalid(from, AuthorityStatus::Releasing, "release authority")),
        })
    }

    /// Forget everything about the object's authority (despawn / disconnect)
    pub fn reset(&self) -> Result<(), AuthorityError> {
        self.channel.update(|state| {
            state.holder = None;
            state.epoch = None;
            state.status = AuthorityStatus::Available;
            Ok(())
        })
    }
}

pub fn new_authority_channel(object: ObjectId) -> (AuthorityMutator, AuthorityAccessor) {
    AuthorityChannel::new_channel(object)
}
