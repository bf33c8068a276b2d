use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    mem,
    rc::Rc,
    task::Waker,
};

use log::debug;

use replicast_shared::{AuthorityError, ObjectId, ParticipantMessage, ReplicatedObject};

use crate::authority::{
    outcome::AuthorityOutcome,
    request::{AuthorityRequest, Waiting},
};

pub(crate) fn register_waker(wakers: &mut Vec<Waker>, waker: &Waker) {
    if !wakers.iter().any(|registered| registered.will_wake(waker)) {
        wakers.push(waker.clone());
    }
}

/// One transport request, shared by every caller waiting on the same object
pub(crate) struct RequestSlot {
    pub(crate) outcome: Option<AuthorityOutcome>,
    pub(crate) wakers: Vec<Waker>,
}

pub(crate) type SharedSlot = Rc<RefCell<RequestSlot>>;

pub(crate) struct NegotiatorState {
    in_flight: HashMap<ObjectId, SharedSlot>,
    outbox: VecDeque<ParticipantMessage>,
    pub(crate) ticks: u64,
    pub(crate) tick_wakers: Vec<Waker>,
}

/// Arbitrates write access to replicated objects on behalf of the local
/// participant.
///
/// Requests are futures: they suspend until the host answers and resume on
/// a later tick. Concurrent requests for the same object share a single
/// message to the host and resolve together. The negotiator only decides
/// *who* may write; staging the value to write once authority arrives is
/// left to the caller (see [`LatestRequest`](crate::LatestRequest)).
///
/// Handles are cheap clones over the same state and are meant to be used
/// from the participant's own thread only.
#[derive(Clone)]
pub struct AuthorityNegotiator {
    state: Rc<RefCell<NegotiatorState>>,
}

impl AuthorityNegotiator {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(NegotiatorState {
                in_flight: HashMap::new(),
                outbox: VecDeque::new(),
                ticks: 0,
                tick_wakers: Vec::new(),
            })),
        }
    }

    /// Asks for authority over `object`.
    ///
    /// Resolves `Granted` at once if the local participant already holds
    /// it. A despawned object resolves `Cancelled`, never an error.
    pub fn request_authority(&self, object: &ReplicatedObject) -> AuthorityRequest {
        self.request(object, None)
    }

    /// Like [`request_authority`](Self::request_authority), but gives up
    /// with `TimedOut` once `ticks` fixed ticks passed without a grant.
    ///
    /// Timing out only abandons this caller's wait: the request to the host
    /// stays in flight and other callers may still be granted.
    pub fn request_authority_within(&self, object: &ReplicatedObject, ticks: u64) -> AuthorityRequest {
        let deadline = self.state.borrow().ticks.saturating_add(ticks);
        self.request(object, Some(deadline))
    }

    fn request(&self, object: &ReplicatedObject, deadline: Option<u64>) -> AuthorityRequest {
        let waiting = if !object.is_alive() {
            Waiting::Ready(AuthorityOutcome::Cancelled)
        } else if object.is_local_authority() {
            Waiting::Ready(AuthorityOutcome::Granted)
        } else {
            self.join_or_send(object)
        };
        AuthorityRequest::new(
            object.id(),
            object.liveness(),
            waiting,
            deadline,
            self.state.clone(),
        )
    }

    fn join_or_send(&self, object: &ReplicatedObject) -> Waiting {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.in_flight.get(&object.id()) {
            debug!("joining in-flight authority request for {}", object.id());
            return Waiting::Slot(slot.clone());
        }

        if let Err(error) = object.authority_mutator().mark_requested() {
            debug!("cannot request authority over {}: {}", object.id(), error);
            return Waiting::Ready(AuthorityOutcome::Denied);
        }
        let slot = Rc::new(RefCell::new(RequestSlot {
            outcome: None,
            wakers: Vec::new(),
        }));
        state.in_flight.insert(object.id(), slot.clone());
        state.outbox.push_back(ParticipantMessage::RequestAuthority {
            object: object.id(),
        });
        debug!("requesting authority over {}", object.id());
        Waiting::Slot(slot)
    }

    /// Gives authority over `object` back to the host. Writes are refused
    /// from now on; updates already made still go out before the release.
    pub fn release_authority(&self, object: &ReplicatedObject) -> Result<(), AuthorityError> {
        object.authority_mutator().mark_releasing()?;
        self.state
            .borrow_mut()
            .outbox
            .push_back(ParticipantMessage::ReleaseAuthority {
                object: object.id(),
            });
        debug!("releasing authority over {}", object.id());
        Ok(())
    }

    pub fn is_pending(&self, object: ObjectId) -> bool {
        self.state.borrow().in_flight.contains_key(&object)
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    /// Fixed ticks elapsed since the participant started
    pub fn ticks(&self) -> u64 {
        self.state.borrow().ticks
    }

    // Driven by the participant

    /// Settles the in-flight request for `object`, waking every waiter.
    /// Returns false if nothing was waiting.
    pub(crate) fn resolve(&self, object: ObjectId, outcome: AuthorityOutcome) -> bool {
        let Some(slot) = self.state.borrow_mut().in_flight.remove(&object) else {
            return false;
        };
        let wakers = {
            let mut slot = slot.borrow_mut();
            slot.outcome = Some(outcome);
            mem::take(&mut slot.wakers)
        };
        debug!("authority request for {} resolved {}", object, outcome.name());
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub(crate) fn cancel(&self, object: ObjectId) -> bool {
        self.resolve(object, AuthorityOutcome::Cancelled)
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let objects: Vec<ObjectId> = self.state.borrow().in_flight.keys().copied().collect();
        objects
            .into_iter()
            .filter(|object| self.cancel(*object))
            .count()
    }

    pub(crate) fn advance_tick(&self) {
        let wakers = {
            let mut state = self.state.borrow_mut();
            state.ticks += 1;
            mem::take(&mut state.tick_wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    pub(crate) fn take_outbox(&self) -> Vec<ParticipantMessage> {
        self.state.borrow_mut().outbox.drain(..).collect()
    }
}
