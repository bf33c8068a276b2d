//! A paint gun. Shots and impacts are short-lived replicated events: every
//! participant spawns a projectile for each new shot, and impacts are
//! forwarded to the wall they hit.

use std::{cell::RefCell, collections::HashMap, rc::Rc, sync::Arc, time::Duration};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use replicast_participant::{Behaviour, BehaviourContext, Participant, ParticipantError};
use replicast_shared::{
    AuthorityTransition, ChangedFields, Clock, FieldError, LogConfig, LogCursor, LogEntry, LogId,
    ObjectId, ReplicatedBoundedLog, ReplicatedObject, Transport,
};

use crate::{
    error::SpacesError,
    paint_wall::{Paint, PaintTarget},
};

pub const MAX_SHOTS: usize = 50;
pub const MAX_IMPACTS: usize = 50;
/// Shots and impacts older than this are pruned by the authority
pub const EVENT_TTL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    /// Projectile variant, `None` for the default one
    pub projectile: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub target: ObjectId,
    pub paint: Paint,
}

/// Spawns the local, purely visual projectile of a shot
pub trait ProjectileSpawner {
    fn spawn_projectile(&mut self, shot: &LogEntry<Shot>);
}

pub struct PaintBlaster<S> {
    object: ReplicatedObject,
    shots: ReplicatedBoundedLog<Shot>,
    impacts: ReplicatedBoundedLog<Impact>,
    spawner: S,
    targets: HashMap<ObjectId, Rc<RefCell<dyn PaintTarget>>>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    last_shot: Option<Duration>,
    shot_cursor: LogCursor,
    impact_cursor: LogCursor,
}

impl<S: ProjectileSpawner> PaintBlaster<S> {
    pub fn new<T: Transport>(
        participant: &Participant<T>,
        id: ObjectId,
        spawner: S,
        cooldown: Duration,
    ) -> Result<Self, SpacesError> {
        let mut builder = participant.builder(id);
        let shots = builder.log::<Shot>("shots", LogConfig::event_log(MAX_SHOTS, EVENT_TTL));
        let impacts = builder.log::<Impact>("impacts", LogConfig::event_log(MAX_IMPACTS, EVENT_TTL));
        let object = builder.build()?;
        Ok(Self {
            object,
            shots,
            impacts,
            spawner,
            targets: HashMap::new(),
            clock: participant.clock(),
            cooldown,
            last_shot: None,
            shot_cursor: LogCursor::new(),
            impact_cursor: LogCursor::new(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn has_authority(&self) -> bool {
        self.shots.has_authority()
    }

    pub fn shot_count(&self) -> usize {
        self.shots.len()
    }

    pub fn impact_count(&self) -> usize {
        self.impacts.len()
    }

    /// Registers a wall impacts on `object` are forwarded to
    pub fn add_target(&mut self, object: ObjectId, target: Rc<RefCell<dyn PaintTarget>>) {
        self.targets.insert(object, target);
    }

    /// Fires, unless the gun is cooling down. Only the authority can shoot.
    pub fn shoot(&mut self, shot: Shot) -> Result<Option<LogId>, FieldError> {
        let now = self.clock.now();
        if let Some(last) = self.last_shot {
            if now < last + self.cooldown {
                return Ok(None);
            }
        }
        let id = self.shots.append(shot)?;
        self.last_shot = Some(now);
        Ok(Some(id))
    }

    /// Records where a projectile of this gun hit
    pub fn record_impact(&self, impact: Impact) -> Result<LogId, FieldError> {
        self.impacts.append(impact)
    }

    fn spawn_new_projectiles(&mut self) {
        let holder = self.object.holder();
        for entry in self.shots.consume(&mut self.shot_cursor) {
            if Some(entry.source) == holder {
                self.spawner.spawn_projectile(&entry);
            }
        }
    }

    fn forward_new_impacts(&mut self) -> Result<(), FieldError> {
        let holder = self.object.holder();
        let gun_authority = self.impacts.has_authority();
        for entry in self.impacts.consume(&mut self.impact_cursor) {
            if Some(entry.source) != holder {
                continue;
            }
            let Some(target) = self.targets.get(&entry.payload.target) else {
                debug!("impact on unknown target {}", entry.payload.target);
                continue;
            };
            let mut target = target.borrow_mut();
            // the wall's authority paints; the gun's authority previews at once
            if target.has_authority() || gun_authority {
                target.paint_at(entry.payload.paint)?;
            }
        }
        Ok(())
    }
}

impl<S: ProjectileSpawner + 'static> Behaviour for PaintBlaster<S> {
    fn object(&self) -> ReplicatedObject {
        self.object.clone()
    }

    fn on_observation_tick(
        &mut self,
        _context: &BehaviourContext<'_>,
        changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        if changed.contains(self.shots.id()) {
            self.spawn_new_projectiles();
        }
        if changed.contains(self.impacts.id()) {
            self.forward_new_impacts()?;
        }
        Ok(())
    }

    fn on_authority_changed(
        &mut self,
        _context: &BehaviourContext<'_>,
        transition: &AuthorityTransition,
    ) -> Result<(), ParticipantError> {
        if transition.is_migration() {
            warn!(
                "{} moved from {:?} to {:?}, shot history dropped",
                self.id(),
                transition.previous_holder,
                transition.holder
            );
            self.last_shot = None;
        }
        Ok(())
    }
}
