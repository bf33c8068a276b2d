//! Shared stage lights: each light can be switched, set moving and dimmed
//! by anyone in the space.

use std::collections::BTreeMap;

use log::debug;

use replicast_participant::{
    Behaviour, BehaviourContext, LatestRequest, Participant, ParticipantError,
};
use replicast_shared::{ChangedFields, ObjectId, ReplicatedMap, ReplicatedObject, Transport};

use crate::{error::SpacesError, tasks::write_with_authority};

pub const MAX_LIGHTS: usize = 10;

/// Parameters of one light
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightState {
    pub enabled: bool,
    pub moving: bool,
    pub intensity: f32,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            enabled: false,
            moving: false,
            intensity: 1.0,
        }
    }
}

/// Whatever renders a light locally
pub trait LightEffect {
    fn change_state(&mut self, state: LightState);
}

pub trait LightBoardListener {
    fn on_light_status_changed(&mut self, light: u8, state: LightState);
}

pub struct LightBoard<L> {
    object: ReplicatedObject,
    enabled: ReplicatedMap<u8, bool>,
    moving: ReplicatedMap<u8, bool>,
    intensity: ReplicatedMap<u8, f32>,
    lights: BTreeMap<u8, L>,
    // one per registered light
    intensity_requests: BTreeMap<u8, LatestRequest<f32>>,
    listener: Option<Box<dyn LightBoardListener>>,
}

impl<L: LightEffect> LightBoard<L> {
    pub fn new<T: Transport>(participant: &Participant<T>, id: ObjectId) -> Result<Self, SpacesError> {
        let mut builder = participant.builder(id);
        let enabled = builder.map::<u8, bool>("enabled", MAX_LIGHTS);
        let moving = builder.map::<u8, bool>("moving", MAX_LIGHTS);
        let intensity = builder.map::<u8, f32>("intensity", MAX_LIGHTS);
        let object = builder.build()?;
        Ok(Self {
            object,
            enabled,
            moving,
            intensity,
            lights: BTreeMap::new(),
            intensity_requests: BTreeMap::new(),
            listener: None,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn register_light(&mut self, index: u8, light: L) -> Result<(), SpacesError> {
        if self.lights.len() >= MAX_LIGHTS && !self.lights.contains_key(&index) {
            return Err(SpacesError::TooManyLights {
                capacity: MAX_LIGHTS,
            });
        }
        self.lights.insert(index, light);
        self.intensity_requests.entry(index).or_default();
        Ok(())
    }

    pub fn light(&self, index: u8) -> Option<&L> {
        self.lights.get(&index)
    }

    pub fn set_listener(&mut self, listener: impl LightBoardListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Replicated parameters of `index`, defaulting to off, still and full
    /// intensity
    pub fn light_state(&self, index: u8) -> LightState {
        let defaults = LightState::default();
        LightState {
            enabled: self.enabled.get_or(index, defaults.enabled),
            moving: self.moving.get_or(index, defaults.moving),
            intensity: self.intensity.get_or(index, defaults.intensity),
        }
    }

    /// Switching a light off also stops its movement
    pub fn change_light_state<T: Transport>(
        &self,
        participant: &Participant<T>,
        index: u8,
        enabled: bool,
    ) -> Result<(), SpacesError> {
        self.check_known(index)?;
        let on = self.enabled.clone();
        let moving = self.moving.clone();
        write_with_authority(participant, self.id(), move || {
            on.set(index, enabled)?;
            if !enabled {
                moving.set(index, false)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn change_movement_state<T: Transport>(
        &self,
        participant: &Participant<T>,
        index: u8,
        moving: bool,
    ) -> Result<(), SpacesError> {
        self.check_known(index)?;
        let movement = self.moving.clone();
        write_with_authority(participant, self.id(), move || movement.set(index, moving))?;
        Ok(())
    }

    /// Dims a light. While authority is pending only the latest request
    /// for each light is kept.
    pub fn change_intensity<T: Transport>(
        &self,
        participant: &Participant<T>,
        index: u8,
        intensity: f32,
    ) -> Result<(), SpacesError> {
        let Some(staged) = self.intensity_requests.get(&index).cloned() else {
            return Err(SpacesError::UnknownLight { index });
        };
        staged.stage(intensity);
        let intensities = self.intensity.clone();
        write_with_authority(participant, self.id(), move || match staged.take() {
            Some(intensity) => intensities.set(index, intensity),
            None => Ok(()),
        })?;
        Ok(())
    }

    /// Pushes the replicated parameters to every registered light
    pub fn refresh(&mut self) {
        let states: Vec<(u8, LightState)> = self
            .lights
            .keys()
            .map(|index| (*index, self.light_state(*index)))
            .collect();
        for (index, state) in states {
            if let Some(light) = self.lights.get_mut(&index) {
                light.change_state(state);
            }
            if let Some(listener) = self.listener.as_mut() {
                listener.on_light_status_changed(index, state);
            }
        }
    }

    fn check_known(&self, index: u8) -> Result<(), SpacesError> {
        if self.lights.contains_key(&index) {
            Ok(())
        } else {
            Err(SpacesError::UnknownLight { index })
        }
    }
}

impl<L: LightEffect + 'static> Behaviour for LightBoard<L> {
    fn object(&self) -> ReplicatedObject {
        self.object.clone()
    }

    fn on_attach(&mut self, _context: &BehaviourContext<'_>) -> Result<(), ParticipantError> {
        self.refresh();
        Ok(())
    }

    fn on_observation_tick(
        &mut self,
        _context: &BehaviourContext<'_>,
        changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        if !changed.is_empty() {
            debug!("lights of {} changed", self.id());
            self.refresh();
        }
        Ok(())
    }
}
