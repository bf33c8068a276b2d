//! Proximity voice chat. Each participant speaks in its own group and
//! listens to the groups of the members standing close to it.

use std::collections::BTreeSet;

use log::{debug, info};

use replicast_participant::{Behaviour, BehaviourContext, Participant, ParticipantError};
use replicast_shared::{
    AuthorityTransition, ChangedFields, ObjectId, ParticipantId, ReplicatedObject,
    ReplicatedValue, Transport,
};

use crate::error::SpacesError;

/// A filter value that never matches, not even itself
pub const NEVER_MATCHING_FILTER: i32 = -1;

/// The local voice client
pub trait VoiceClient {
    fn speak_and_listen_only_to(&mut self, group: u8);

    fn listen_to(&mut self, group: u8);

    fn stop_listening_to(&mut self, group: u8);

    fn set_transmitting(&mut self, transmitting: bool);

    fn is_transmitting(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MuteMode {
    /// Stop transmitting while nobody is listened to
    #[default]
    MuteWhenListeningToNoOne,
    /// Leave transmission alone
    NoAutomaticMute,
}

/// Contains config properties which will be used by a [`VoiceGroupMember`]
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceConfig {
    /// Below this distance a member starts being listened to
    pub proximity: f32,
    /// At or above this distance a member stops being listened to. Kept
    /// above `proximity` so members on the edge don't flicker.
    pub leaving: f32,
    pub min_group: u8,
    pub max_group: u8,
    pub mute_mode: MuteMode,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            proximity: 15.0,
            leaving: 16.0,
            min_group: 5,
            max_group: 255,
            mute_mode: MuteMode::default(),
        }
    }
}

/// What a member knows about another one during a proximity check
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoicePeer {
    pub member: ObjectId,
    pub group: u8,
    pub position: [f32; 3],
    pub filter: i32,
    pub listenable: bool,
}

/// Voice group a participant speaks in
pub fn group_for(participant: ParticipantId, min_group: u8, max_group: u8) -> u8 {
    let span = u32::from(max_group.saturating_sub(min_group)).max(1);
    let offset = participant.value() % span;
    min_group.saturating_add(offset as u8)
}

pub struct VoiceGroupMember<V> {
    object: ReplicatedObject,
    group: ReplicatedValue<u8>,
    config: VoiceConfig,
    client: V,
    filter: i32,
    always_listened: BTreeSet<ObjectId>,
    listened: Vec<(ObjectId, u8)>,
    speaking_set_up: bool,
}

impl<V: VoiceClient> VoiceGroupMember<V> {
    pub fn new<T: Transport>(
        participant: &Participant<T>,
        id: ObjectId,
        mut config: VoiceConfig,
        client: V,
    ) -> Result<Self, SpacesError> {
        if config.leaving < config.proximity {
            config.leaving = config.proximity + 1.0;
        }
        let mut builder = participant.builder(id);
        let group = builder.value("group_id", 0u8);
        let object = builder.build()?;
        Ok(Self {
            object,
            group,
            config,
            client,
            filter: 0,
            always_listened: BTreeSet::new(),
            listened: Vec::new(),
            speaking_set_up: false,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn client(&self) -> &V {
        &self.client
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn group(&self) -> u8 {
        self.group.read()
    }

    pub fn filter(&self) -> i32 {
        self.filter
    }

    pub fn set_filter(&mut self, filter: i32) {
        self.filter = filter;
    }

    pub fn always_listen_to(&mut self, member: ObjectId) {
        self.always_listened.insert(member);
    }

    pub fn is_always_listening_to(&self, member: ObjectId) -> bool {
        self.always_listened.contains(&member)
    }

    pub fn is_listening_to(&self, member: ObjectId) -> bool {
        self.listened.iter().any(|(listened, _)| *listened == member)
    }

    pub fn listened_count(&self) -> usize {
        self.listened.len()
    }

    /// How other members see this one
    pub fn as_peer(&self, position: [f32; 3]) -> VoicePeer {
        VoicePeer {
            member: self.id(),
            group: self.group.read(),
            position,
            filter: self.filter,
            listenable: true,
        }
    }

    /// Updates who is listened to. Only the member's own participant (the
    /// authority) does this; `whitelisted` tells whether some other member
    /// always listens to this one.
    pub fn check_proximity(&mut self, position: [f32; 3], peers: &[VoicePeer], whitelisted: bool) {
        if !self.object.is_local_authority() {
            return;
        }
        let proximity = self.config.proximity * self.config.proximity;
        let leaving = self.config.leaving * self.config.leaving;

        for peer in peers {
            if peer.member == self.id() {
                continue;
            }
            if self.always_listened.contains(&peer.member) {
                self.listen(peer);
            } else if self.filter == NEVER_MATCHING_FILTER || self.filter != peer.filter {
                self.stop_listening(peer.member);
            } else {
                let distance = distance_squared(position, peer.position);
                if distance < proximity {
                    self.listen(peer);
                } else if distance >= leaving {
                    self.stop_listening(peer.member);
                }
            }
        }

        if self.config.mute_mode == MuteMode::MuteWhenListeningToNoOne {
            let should_speak = whitelisted || !self.listened.is_empty();
            if should_speak != self.client.is_transmitting() {
                debug!("{} transmitting: {}", self.id(), should_speak);
                self.client.set_transmitting(should_speak);
            }
        }
    }

    /// Forgets a member that left the space
    pub fn remove_member(&mut self, member: ObjectId) {
        self.always_listened.remove(&member);
        self.stop_listening(member);
    }

    fn listen(&mut self, peer: &VoicePeer) {
        if !peer.listenable || self.is_listening_to(peer.member) {
            return;
        }
        self.listened.push((peer.member, peer.group));
        self.client.listen_to(peer.group);
    }

    fn stop_listening(&mut self, member: ObjectId) {
        let Some(index) = self.listened.iter().position(|(listened, _)| *listened == member) else {
            return;
        };
        // the group heard last, the member may already be gone
        let (_, group) = self.listened.remove(index);
        self.client.stop_listening_to(group);
    }

    fn set_up_speaking(&mut self, local: ParticipantId) -> Result<(), ParticipantError> {
        if self.speaking_set_up {
            return Ok(());
        }
        let group = group_for(local, self.config.min_group, self.config.max_group);
        self.group.write(group)?;
        self.client.speak_and_listen_only_to(group);
        self.client.set_transmitting(false);
        self.speaking_set_up = true;
        info!("{} speaks in group {}", local, group);
        Ok(())
    }
}

fn distance_squared(a: [f32; 3], b: [f32; 3]) -> f32 {
    a.iter().zip(b.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

impl<V: VoiceClient + 'static> Behaviour for VoiceGroupMember<V> {
    fn object(&self) -> ReplicatedObject {
        self.object.clone()
    }

    fn on_authority_changed(
        &mut self,
        context: &BehaviourContext<'_>,
        transition: &AuthorityTransition,
    ) -> Result<(), ParticipantError> {
        match context.local() {
            Some(local) if transition.holder == Some(local) => self.set_up_speaking(local),
            _ => Ok(()),
        }
    }

    fn on_observation_tick(
        &mut self,
        _context: &BehaviourContext<'_>,
        changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        if changed.contains(self.group.id()) {
            debug!("{} now speaks in group {}", self.id(), self.group.read());
        }
        Ok(())
    }
}
