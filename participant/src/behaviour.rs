use std::{cell::RefCell, future::Future, rc::Rc, sync::Arc, time::Duration};

use futures::{executor::LocalSpawner, task::LocalSpawnExt};

use replicast_shared::{AuthorityTransition, ChangedFields, Clock, ParticipantId, ReplicatedObject, Tick};

use crate::{
    authority::negotiator::AuthorityNegotiator, error::ParticipantError,
    registry::ServiceRegistry,
};

/// What a behaviour may reach while one of its hooks runs
pub struct BehaviourContext<'a> {
    local: Option<ParticipantId>,
    tick: Tick,
    delta: Duration,
    negotiator: &'a AuthorityNegotiator,
    spawner: &'a LocalSpawner,
    services: &'a ServiceRegistry,
    clock: &'a Arc<dyn Clock>,
}

impl<'a> BehaviourContext<'a> {
    pub(crate) fn new(
        local: Option<ParticipantId>,
        tick: Tick,
        delta: Duration,
        negotiator: &'a AuthorityNegotiator,
        spawner: &'a LocalSpawner,
        services: &'a ServiceRegistry,
        clock: &'a Arc<dyn Clock>,
    ) -> Self {
        Self {
            local,
            tick,
            delta,
            negotiator,
            spawner,
            services,
            clock,
        }
    }

    /// Id of the local participant, once welcomed by the host
    pub fn local(&self) -> Option<ParticipantId> {
        self.local
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Time covered by this hook: the tick interval for fixed hooks, the
    /// frame time for observation hooks
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn negotiator(&self) -> &AuthorityNegotiator {
        self.negotiator
    }

    pub fn services(&self) -> &ServiceRegistry {
        self.services
    }

    /// Runs `future` on the participant's executor. It makes progress every
    /// time the participant drives its tasks.
    pub fn spawn<F>(&self, future: F) -> Result<(), ParticipantError>
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawner.spawn_local(future)?;
        Ok(())
    }
}

/// Per-object logic driven by a [`Participant`](crate::Participant).
///
/// Every hook runs on the participant's thread. Errors are logged and do
/// not stop the tick.
pub trait Behaviour {
    /// The replicated object this behaviour belongs to
    fn object(&self) -> ReplicatedObject;

    fn on_attach(&mut self, _context: &BehaviourContext<'_>) -> Result<(), ParticipantError> {
        Ok(())
    }

    /// Runs once per fixed tick, after host messages were applied and
    /// before dirty fields are flushed
    fn on_fixed_tick(&mut self, _context: &BehaviourContext<'_>) -> Result<(), ParticipantError> {
        Ok(())
    }

    /// Runs once per frame with the fields changed since the previous frame
    fn on_observation_tick(
        &mut self,
        _context: &BehaviourContext<'_>,
        _changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        Ok(())
    }

    fn on_authority_changed(
        &mut self,
        _context: &BehaviourContext<'_>,
        _transition: &AuthorityTransition,
    ) -> Result<(), ParticipantError> {
        Ok(())
    }

    fn on_detach(&mut self, _context: &BehaviourContext<'_>) {}
}

/// Lets application code keep a handle on a behaviour it attached
impl<B: Behaviour + ?Sized> Behaviour for Rc<RefCell<B>> {
    fn object(&self) -> ReplicatedObject {
        self.borrow().object()
    }

    fn on_attach(&mut self, context: &BehaviourContext<'_>) -> Result<(), ParticipantError> {
        self.borrow_mut().on_attach(context)
    }

    fn on_fixed_tick(&mut self, context: &BehaviourContext<'_>) -> Result<(), ParticipantError> {
        self.borrow_mut().on_fixed_tick(context)
    }

    fn on_observation_tick(
        &mut self,
        context: &BehaviourContext<'_>,
        changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        self.borrow_mut().on_observation_tick(context, changed)
    }

    fn on_authority_changed(
        &mut self,
        context: &BehaviourContext<'_>,
        transition: &AuthorityTransition,
    ) -> Result<(), ParticipantError> {
        self.borrow_mut().on_authority_changed(context, transition)
    }

    fn on_detach(&mut self, context: &BehaviourContext<'_>) {
        self.borrow_mut().on_detach(context)
    }
}
