//! A shared DJ pad: pads toggle sounds for everyone, a master volume slider
//! is shared too.

use replicast_participant::{
    Behaviour, BehaviourContext, LatestRequest, LocalEffect, Participant, ParticipantError,
    Reconciler, Tempo,
};
use replicast_shared::{
    ChangedFields, ObjectId, ReplicatedMap, ReplicatedObject, ReplicatedValue, Transport,
};

use crate::{error::SpacesError, tasks::write_with_authority};

pub const MAX_PADS: usize = 50;

/// The space's audio mixer. Looked up through the participant's
/// services as `dyn AudioSettings`.
pub trait AudioSettings {
    fn set_music_volume(&self, volume: f32);
}

/// UI side of a pad board
pub trait PadBoardListener {
    fn on_pad_status_changed(&mut self, _pad: u8, _active: bool) {}

    fn on_volume_changed(&mut self, _volume: f32) {}
}

pub struct PadBoard<E> {
    object: ReplicatedObject,
    master_volume: ReplicatedValue<f32>,
    pads: ReplicatedMap<u8, bool>,
    reconciler: Reconciler<u8, E>,
    local_volume: f32,
    volume_request: LatestRequest<f32>,
    listener: Option<Box<dyn PadBoardListener>>,
}

impl<E: LocalEffect> PadBoard<E> {
    pub fn new<T: Transport>(
        participant: &Participant<T>,
        id: ObjectId,
        tempo: Tempo,
    ) -> Result<Self, SpacesError> {
        let mut builder = participant.builder(id);
        let master_volume = builder.value("master_volume", 1.0f32);
        let pads = builder.map::<u8, bool>("pads", MAX_PADS);
        let object = builder.build()?;
        Ok(Self {
            object,
            master_volume,
            reconciler: Reconciler::new(pads.clone(), tempo),
            pads,
            local_volume: 1.0,
            volume_request: LatestRequest::new(),
            listener: None,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn register_pad(&mut self, pad: u8, effect: E) {
        self.reconciler.register_effect(pad, effect);
    }

    pub fn pad_effect(&self, pad: u8) -> Option<&E> {
        self.reconciler.effect(pad)
    }

    pub fn pad_effect_mut(&mut self, pad: u8) -> Option<&mut E> {
        self.reconciler.effect_mut(pad)
    }

    pub fn set_listener(&mut self, listener: impl PadBoardListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Replicated on/off command of `pad`
    pub fn pad_state(&self, pad: u8) -> bool {
        self.pads.get_or(pad, false)
    }

    /// Whether the local effect of `pad` was running after the last check
    pub fn is_pad_active(&self, pad: u8) -> bool {
        self.reconciler.is_active(pad)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.read()
    }

    pub fn local_volume(&self) -> f32 {
        self.local_volume
    }

    /// Local attenuation, never replicated
    pub fn set_local_volume(&mut self, volume: f32) {
        self.local_volume = volume.clamp(0.0, 1.0);
    }

    pub fn effective_volume(&self) -> f32 {
        self.master_volume.read() * self.local_volume
    }

    /// Switches `pad` on or off for everyone once authority is ours
    pub fn change_pad_state<T: Transport>(
        &self,
        participant: &Participant<T>,
        pad: u8,
        active: bool,
    ) -> Result<(), SpacesError> {
        let pads = self.pads.clone();
        write_with_authority(participant, self.id(), move || pads.set(pad, active))?;
        Ok(())
    }

    /// Sets the shared volume. Only the latest volume requested while
    /// authority is pending gets written.
    pub fn change_volume<T: Transport>(
        &self,
        participant: &Participant<T>,
        volume: f32,
    ) -> Result<(), SpacesError> {
        self.volume_request.stage(volume);
        let staged = self.volume_request.clone();
        let master_volume = self.master_volume.clone();
        write_with_authority(participant, self.id(), move || match staged.take() {
            Some(volume) => master_volume.write(volume),
            None => Ok(()),
        })?;
        Ok(())
    }

    fn notify_volume(&mut self) {
        let volume = self.master_volume.read();
        if let Some(listener) = self.listener.as_mut() {
            listener.on_volume_changed(volume);
        }
    }
}

impl<E: LocalEffect + 'static> Behaviour for PadBoard<E> {
    fn object(&self) -> ReplicatedObject {
        self.object.clone()
    }

    fn on_attach(&mut self, _context: &BehaviourContext<'_>) -> Result<(), ParticipantError> {
        self.notify_volume();
        Ok(())
    }

    fn on_observation_tick(
        &mut self,
        context: &BehaviourContext<'_>,
        changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        if changed.contains(self.master_volume.id()) {
            self.notify_volume();
        }

        let gain = self.effective_volume();
        if let Some(settings) = context.services().get::<dyn AudioSettings>() {
            settings.set_music_volume(gain);
        }
        let changes = self.reconciler.update(context.delta(), gain)?;
        if let Some(listener) = self.listener.as_mut() {
            for change in changes {
                listener.on_pad_status_changed(change.key, change.active);
            }
        }
        Ok(())
    }
}
