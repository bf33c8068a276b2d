use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use log::debug;

use replicast_shared::{Liveness, ObjectId};

use crate::authority::{
    negotiator::{register_waker, NegotiatorState, SharedSlot},
    outcome::AuthorityOutcome,
};

pub(crate) enum Waiting {
    /// Settled before anything was sent
    Ready(AuthorityOutcome),
    Slot(SharedSlot),
}

/// A pending authority request. Resolves on a later participant tick.
///
/// Every poll checks the object's liveness first: once the object is
/// despawned the request resolves `Cancelled`, whatever the host answered.
#[must_use = "futures do nothing unless polled"]
pub struct AuthorityRequest {
    object: ObjectId,
    liveness: Liveness,
    waiting: Waiting,
    deadline: Option<u64>,
    negotiator: Rc<RefCell<NegotiatorState>>,
}

impl AuthorityRequest {
    pub(crate) fn new(
        object: ObjectId,
        liveness: Liveness,
        waiting: Waiting,
        deadline: Option<u64>,
        negotiator: Rc<RefCell<NegotiatorState>>,
    ) -> Self {
        Self {
            object,
            liveness,
            waiting,
            deadline,
            negotiator,
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }
}

impl Future for AuthorityRequest {
    type Output = AuthorityOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.liveness.is_alive() {
            return Poll::Ready(AuthorityOutcome::Cancelled);
        }

        let slot = match &this.waiting {
            Waiting::Ready(outcome) => return Poll::Ready(*outcome),
            Waiting::Slot(slot) => slot,
        };
        if let Some(outcome) = slot.borrow().outcome {
            return Poll::Ready(outcome);
        }

        if let Some(deadline) = this.deadline {
            let mut negotiator = this.negotiator.borrow_mut();
            if negotiator.ticks >= deadline {
                debug!("authority request for {} timed out", this.object);
                return Poll::Ready(AuthorityOutcome::TimedOut);
            }
            register_waker(&mut negotiator.tick_wakers, cx.waker());
        }

        register_waker(&mut slot.borrow_mut().wakers, cx.waker());
        Poll::Pending
    }
}
