use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::Arc,
    time::Duration,
};

use futures::{
    executor::{LocalPool, LocalSpawner},
    task::LocalSpawnExt,
};
use log::{debug, info, warn};

use replicast_shared::{
    AuthorityEpoch, ChangeDetector, Clock, HostMessage, ObjectBuilder, ObjectId, ParticipantId,
    ParticipantMessage, ReplicatedObject, Tick, Transport, TransportError,
};

use crate::{
    authority::{negotiator::AuthorityNegotiator, outcome::AuthorityOutcome, request::AuthorityRequest},
    behaviour::{Behaviour, BehaviourContext},
    error::ParticipantError,
    events::{ParticipantEvent, ParticipantEvents},
    registry::ServiceRegistry,
    tick::FixedTimestep,
    ParticipantConfig,
};

struct AttachedObject {
    object: ReplicatedObject,
    detector: ChangeDetector,
    behaviour: Option<Box<dyn Behaviour>>,
}

/// State handed to behaviour hooks
struct Runtime {
    local: Option<ParticipantId>,
    tick: Tick,
    negotiator: AuthorityNegotiator,
    spawner: LocalSpawner,
    services: ServiceRegistry,
    clock: Arc<dyn Clock>,
}

impl Runtime {
    fn context(&self, delta: Duration) -> BehaviourContext<'_> {
        BehaviourContext::new(
            self.local,
            self.tick,
            delta,
            &self.negotiator,
            &self.spawner,
            &self.services,
            &self.clock,
        )
    }
}

/// A session member: owns the link to the host, the attached replicated
/// objects and their behaviours, and drives them tick by tick.
///
/// A fixed tick ingests host messages, resumes waiting tasks, runs the
/// behaviours' fixed hooks, prunes logs the participant holds, then
/// broadcasts every dirty field and sends queued authority messages. An
/// observation tick runs change detection and the behaviours' observation
/// hooks. [`frame`](Self::frame) runs as many fixed ticks as the elapsed
/// time calls for, then one observation tick.
pub struct Participant<T: Transport> {
    config: ParticipantConfig,
    transport: T,
    closed: bool,
    peers: BTreeSet<ParticipantId>,
    objects: BTreeMap<ObjectId, AttachedObject>,
    pool: LocalPool,
    timestep: FixedTimestep,
    events: ParticipantEvents,
    runtime: Runtime,
}

impl<T: Transport> Participant<T> {
    /// Create a new Participant
    pub fn new(config: ParticipantConfig, transport: T, clock: Arc<dyn Clock>) -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let timestep = FixedTimestep::new(config.tick_interval)
            .with_max_ticks_per_frame(config.max_fixed_ticks_per_frame);
        Self {
            transport,
            closed: false,
            peers: BTreeSet::new(),
            objects: BTreeMap::new(),
            pool,
            timestep,
            events: ParticipantEvents::new(config.event_capacity),
            runtime: Runtime {
                local: None,
                tick: 0,
                negotiator: AuthorityNegotiator::new(),
                spawner,
                services: ServiceRegistry::new(),
                clock,
            },
            config,
        }
    }

    // Connection

    /// Id assigned by the host, once welcomed
    pub fn local(&self) -> Option<ParticipantId> {
        self.runtime.local
    }

    pub fn is_connected(&self) -> bool {
        !self.closed && self.runtime.local.is_some()
    }

    /// Other participants currently in the session
    pub fn peers(&self) -> Vec<ParticipantId> {
        self.peers.iter().copied().collect()
    }

    /// The session member with the lowest id
    pub fn master(&self) -> Option<ParticipantId> {
        let first_peer = self.peers.iter().next().copied();
        match (self.runtime.local, first_peer) {
            (Some(local), Some(peer)) => Some(local.min(peer)),
            (local, peer) => local.or(peer),
        }
    }

    pub fn is_master(&self) -> bool {
        self.runtime.local.is_some() && self.master() == self.runtime.local
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    /// Leaves the session. Pending authority requests resolve `Cancelled`.
    pub fn leave(&mut self) -> Result<(), ParticipantError> {
        self.send(ParticipantMessage::Leave)?;
        info!("{:?} leaving", self.runtime.local);
        self.on_disconnected();
        Ok(())
    }

    // Objects

    /// Starts declaring a replicated object stamped by this participant's
    /// clock
    pub fn builder(&self, id: ObjectId) -> ObjectBuilder {
        ReplicatedObject::builder(id, self.runtime.clock.clone())
    }

    /// Attaches the object of `behaviour` and lets it run
    pub fn attach<B: Behaviour + 'static>(&mut self, behaviour: B) -> Result<(), ParticipantError> {
        let object = behaviour.object();
        self.attach_entry(object, Some(Box::new(behaviour)))
    }

    /// Attaches an object that has no behaviour of its own
    pub fn attach_object(&mut self, object: ReplicatedObject) -> Result<(), ParticipantError> {
        self.attach_entry(object, None)
    }

    fn attach_entry(
        &mut self,
        object: ReplicatedObject,
        mut behaviour: Option<Box<dyn Behaviour>>,
    ) -> Result<(), ParticipantError> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(ParticipantError::AlreadyAttached { object: id });
        }
        if self.closed {
            return Err(ParticipantError::NotConnected { operation: "attach" });
        }
        if let Some(local) = self.runtime.local {
            object.authority_mutator().set_local(local)?;
        }
        if let Some(behaviour) = behaviour.as_mut() {
            behaviour.on_attach(&self.runtime.context(self.config.tick_interval))?;
        }

        self.send(ParticipantMessage::Attach { object: id })?;
        debug!("attached {}", id);
        self.objects.insert(
            id,
            AttachedObject {
                detector: ChangeDetector::new_reporting_initial(&object),
                object,
                behaviour,
            },
        );
        Ok(())
    }

    /// Stops driving an object locally. The host is not told: release
    /// authority first if others should take over.
    pub fn detach(&mut self, object: ObjectId) -> Result<ReplicatedObject, ParticipantError> {
        let Some(mut entry) = self.objects.remove(&object) else {
            return Err(ParticipantError::UnknownObject { object });
        };
        self.runtime.negotiator.cancel(object);
        if let Some(behaviour) = entry.behaviour.as_mut() {
            behaviour.on_detach(&self.runtime.context(self.config.tick_interval));
        }
        Ok(entry.object)
    }

    /// Destroys an object for everyone. Allowed for the holder, or for any
    /// participant while nobody holds it.
    pub fn despawn(&mut self, object: ObjectId) -> Result<(), ParticipantError> {
        let Some(entry) = self.objects.get(&object) else {
            return Err(ParticipantError::UnknownObject { object });
        };
        let holder = entry.object.holder();
        if holder.is_some() && !entry.object.is_local_authority() {
            return Err(ParticipantError::NotAuthority {
                object,
                operation: "despawn",
                holder,
            });
        }

        self.send(ParticipantMessage::Despawn { object })?;
        self.remove_despawned(object);
        Ok(())
    }

    fn remove_despawned(&mut self, object: ObjectId) {
        let Some(mut entry) = self.objects.remove(&object) else {
            return;
        };
        if let Err(error) = entry.object.despawn() {
            warn!("could not reset authority of despawned {}: {}", object, error);
        }
        self.runtime.negotiator.cancel(object);
        if let Some(behaviour) = entry.behaviour.as_mut() {
            behaviour.on_detach(&self.runtime.context(self.config.tick_interval));
        }
        info!("{} despawned", object);
        self.events.push(ParticipantEvent::Despawned { object });
    }

    pub fn object(&self, object: ObjectId) -> Option<&ReplicatedObject> {
        self.objects.get(&object).map(|entry| &entry.object)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ReplicatedObject> {
        self.objects.values().map(|entry| &entry.object)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // Authority

    pub fn negotiator(&self) -> &AuthorityNegotiator {
        &self.runtime.negotiator
    }

    pub fn request_authority(&self, object: ObjectId) -> Result<AuthorityRequest, ParticipantError> {
        let entry = self
            .objects
            .get(&object)
            .ok_or(ParticipantError::UnknownObject { object })?;
        Ok(self.runtime.negotiator.request_authority(&entry.object))
    }

    pub fn release_authority(&self, object: ObjectId) -> Result<(), ParticipantError> {
        let entry = self
            .objects
            .get(&object)
            .ok_or(ParticipantError::UnknownObject { object })?;
        self.runtime.negotiator.release_authority(&entry.object)?;
        Ok(())
    }

    // Tasks

    /// Runs `future` on the participant's executor
    pub fn spawn<F>(&self, future: F) -> Result<(), ParticipantError>
    where
        F: Future<Output = ()> + 'static,
    {
        self.runtime.spawner.spawn_local(future)?;
        Ok(())
    }

    pub fn spawner(&self) -> LocalSpawner {
        self.runtime.spawner.clone()
    }

    /// Polls every task that can make progress
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    // Services

    pub fn services(&self) -> &ServiceRegistry {
        &self.runtime.services
    }

    pub fn services_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.runtime.services
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.runtime.clock.clone()
    }

    // Events

    /// Events since the previous call, at most
    /// [`event_capacity`](ParticipantConfig::event_capacity) of the newest
    pub fn take_events(&mut self) -> ParticipantEvents {
        self.events.take()
    }

    // Ticks

    pub fn tick(&self) -> Tick {
        self.runtime.tick
    }

    /// Runs the fixed ticks due after `elapsed`, then one observation tick.
    /// Returns the number of fixed ticks run.
    pub fn frame(&mut self, elapsed: Duration) -> Result<u32, ParticipantError> {
        let due = self.timestep.advance(elapsed);
        for _ in 0..due {
            self.fixed_tick()?;
        }
        self.observation_tick(elapsed)?;
        Ok(due)
    }

    pub fn fixed_tick(&mut self) -> Result<(), ParticipantError> {
        self.ingest()?;
        self.pool.run_until_stalled();

        let context = self.runtime.context(self.config.tick_interval);
        for entry in self.objects.values_mut() {
            let Some(behaviour) = entry.behaviour.as_mut() else {
                continue;
            };
            if let Err(error) = behaviour.on_fixed_tick(&context) {
                warn!("fixed tick of {} failed: {}", entry.object.id(), error);
            }
        }

        for entry in self.objects.values() {
            match entry.object.prune_logs() {
                Ok(0) => {}
                Ok(removed) => debug!("pruned {} log entries of {}", removed, entry.object.id()),
                Err(error) => warn!("could not prune logs of {}: {}", entry.object.id(), error),
            }
        }

        self.flush()?;
        self.runtime.negotiator.advance_tick();
        self.runtime.tick = self.runtime.tick.wrapping_add(1);
        Ok(())
    }

    pub fn observation_tick(&mut self, elapsed: Duration) -> Result<(), ParticipantError> {
        let context = self.runtime.context(elapsed);
        for entry in self.objects.values_mut() {
            let changed = entry.detector.detect_changes(&entry.object);
            if !changed.is_empty() {
                self.events.push(ParticipantEvent::FieldsChanged {
                    object: entry.object.id(),
                    fields: changed.clone().collect(),
                });
            }
            let Some(behaviour) = entry.behaviour.as_mut() else {
                continue;
            };
            if let Err(error) = behaviour.on_observation_tick(&context, &changed) {
                warn!("observation tick of {} failed: {}", entry.object.id(), error);
            }
        }
        self.pool.run_until_stalled();
        Ok(())
    }

    // Ingest

    fn ingest(&mut self) -> Result<(), ParticipantError> {
        if self.closed {
            return Ok(());
        }
        loop {
            match self.transport.receive() {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) => {
                    if !self.transport.is_open() {
                        info!("link of {:?} closed by the host", self.runtime.local);
                        self.on_disconnected();
                    }
                    return Ok(());
                }
                Err(error) if error.is_closed() => {
                    self.on_disconnected();
                    return Ok(());
                }
                Err(TransportError::Codec(error)) => {
                    warn!("dropping unreadable host message: {}", error);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn handle_message(&mut self, message: HostMessage) {
        debug!("host -> {:?}: {}", self.runtime.local, message.name());
        match message {
            HostMessage::Welcome {
                participant,
                participants,
            } => {
                info!("welcomed as {}", participant);
                self.runtime.local = Some(participant);
                self.peers = participants.into_iter().collect();
                for entry in self.objects.values() {
                    if let Err(error) = entry.object.authority_mutator().set_local(participant) {
                        warn!("could not set local participant on {}: {}", entry.object.id(), error);
                    }
                }
                self.events.push(ParticipantEvent::Connected { participant });
            }
            HostMessage::FieldChanged(update) => {
                let Some(entry) = self.objects.get(&update.object) else {
                    debug!("update for unattached {}", update.object);
                    return;
                };
                if let Err(error) = entry.object.apply_update(&update) {
                    warn!("could not apply update to {}: {}", update.object, error);
                }
            }
            HostMessage::AuthorityChanged {
                object,
                holder,
                epoch,
            } => self.on_authority_changed(object, holder, epoch),
            HostMessage::AuthorityResolved { object, granted } => {
                self.on_authority_resolved(object, granted)
            }
            HostMessage::ReleaseRequested { object, requester } => {
                let Some(entry) = self.objects.get(&object) else {
                    return;
                };
                if !entry.object.status().is_granted() {
                    debug!("ignoring release request for {} not held", object);
                    return;
                }
                debug!("{} wants {}, releasing", requester, object);
                if let Err(error) = self.runtime.negotiator.release_authority(&entry.object) {
                    warn!("could not release {}: {}", object, error);
                }
            }
            HostMessage::Despawned { object } => self.remove_despawned(object),
            HostMessage::ParticipantJoined { participant } => {
                self.peers.insert(participant);
                self.events
                    .push(ParticipantEvent::ParticipantJoined { participant });
            }
            HostMessage::ParticipantLeft { participant } => {
                self.peers.remove(&participant);
                self.events.push(ParticipantEvent::ParticipantLeft { participant });
            }
        }
    }

    fn on_authority_changed(
        &mut self,
        object: ObjectId,
        holder: Option<ParticipantId>,
        epoch: AuthorityEpoch,
    ) {
        let Some(entry) = self.objects.get_mut(&object) else {
            return;
        };
        let transition = match entry.object.record_authority(holder, epoch) {
            Ok(Some(transition)) => transition,
            Ok(None) => return,
            Err(error) => {
                warn!("could not record authority of {}: {}", object, error);
                return;
            }
        };
        if entry.object.is_local_authority() {
            self.runtime
                .negotiator
                .resolve(object, AuthorityOutcome::Granted);
        }

        if let Some(behaviour) = entry.behaviour.as_mut() {
            let context = self.runtime.context(self.config.tick_interval);
            if let Err(error) = behaviour.on_authority_changed(&context, &transition) {
                warn!("authority hook of {} failed: {}", object, error);
            }
        }
        self.events.push(ParticipantEvent::AuthorityChanged {
            object,
            holder,
            epoch,
            migrated: transition.is_migration(),
        });
    }

    fn on_authority_resolved(&mut self, object: ObjectId, granted: bool) {
        let Some(entry) = self.objects.get(&object) else {
            self.runtime.negotiator.cancel(object);
            return;
        };
        let status = match entry.object.authority_mutator().resolve_request() {
            Ok(status) => status,
            Err(error) => {
                warn!("could not resolve request for {}: {}", object, error);
                return;
            }
        };
        let outcome = if granted && status.is_granted() {
            AuthorityOutcome::Granted
        } else {
            AuthorityOutcome::Denied
        };
        self.runtime.negotiator.resolve(object, outcome);
    }

    fn on_disconnected(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let cancelled = self.runtime.negotiator.cancel_all();
        for entry in self.objects.values() {
            if let Err(error) = entry.object.authority_mutator().reset() {
                warn!("could not reset authority of {}: {}", entry.object.id(), error);
            }
        }
        info!(
            "{:?} disconnected, {} authority requests cancelled",
            self.runtime.local, cancelled
        );
        self.events.push(ParticipantEvent::Disconnected);
    }

    // Flush

    fn flush(&mut self) -> Result<(), ParticipantError> {
        if self.closed {
            let dropped = self.runtime.negotiator.take_outbox();
            if !dropped.is_empty() {
                debug!("dropping {} messages queued after disconnect", dropped.len());
            }
            return Ok(());
        }

        let mut outgoing = Vec::new();
        for entry in self.objects.values() {
            if !entry.object.has_dirty_fields() {
                continue;
            }
            match entry.object.collect_dirty(self.runtime.tick) {
                Ok(updates) => outgoing.extend(updates.into_iter().map(ParticipantMessage::Broadcast)),
                Err(error) => warn!("could not flush {}: {}", entry.object.id(), error),
            }
        }
        // releases go out after the final updates
        outgoing.extend(self.runtime.negotiator.take_outbox());

        for message in outgoing {
            match self.send(message) {
                Ok(()) => {}
                Err(ParticipantError::NotConnected { .. }) => return Ok(()),
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn send(&mut self, message: ParticipantMessage) -> Result<(), ParticipantError> {
        if self.closed {
            return Err(ParticipantError::NotConnected {
                operation: message.name(),
            });
        }
        match self.transport.send(message) {
            Ok(()) => Ok(()),
            Err(error) if error.is_closed() => {
                self.on_disconnected();
                Err(ParticipantError::NotConnected {
                    operation: "send",
                })
            }
            Err(error) => Err(error.into()),
        }
    }
}
