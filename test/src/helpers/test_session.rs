use std::{sync::Arc, time::Duration};

use log::trace;

use replicast_host::{HostConfig, SessionHost};
use replicast_participant::{Participant, ParticipantConfig};
use replicast_shared::{ManualClock, ObjectId, ParticipantId, ParticipantLink};

use crate::helpers::test_object::TestObject;

pub type TestParticipant = Participant<ParticipantLink>;

/// An in-process session: one host and any number of participants, each with
/// its own manual clock, stepped tick by tick from the test.
pub struct TestSession {
    host: SessionHost,
    participants: Vec<TestParticipant>,
    clocks: Vec<ManualClock>,
    tick_interval: Duration,
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl TestSession {
    pub fn new(config: HostConfig) -> Self {
        Self {
            host: SessionHost::new(config),
            participants: Vec::new(),
            clocks: Vec::new(),
            tick_interval: ParticipantConfig::default().tick_interval,
        }
    }

    /// A session with `count` participants, all welcomed
    pub fn with_participants(count: usize) -> Self {
        let mut session = Self::default();
        for _ in 0..count {
            session.connect();
        }
        session
    }

    /// Connects a new participant and lets it process its welcome. Returns
    /// its index in the session.
    pub fn connect(&mut self) -> usize {
        let link = self.host.connect().expect("host accepts participant");
        let clock = ManualClock::new();
        let participant = Participant::new(ParticipantConfig::default(), link, Arc::new(clock.clone()));
        self.participants.push(participant);
        self.clocks.push(clock);
        let index = self.participants.len() - 1;
        self.participants[index].fixed_tick().expect("welcome tick");
        index
    }

    // Accessors

    pub fn host(&self) -> &SessionHost {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut SessionHost {
        &mut self.host
    }

    pub fn participant(&self, index: usize) -> &TestParticipant {
        &self.participants[index]
    }

    pub fn participant_mut(&mut self, index: usize) -> &mut TestParticipant {
        &mut self.participants[index]
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn id(&self, index: usize) -> ParticipantId {
        self.participants[index]
            .local()
            .expect("participant was welcomed")
    }

    pub fn clock(&self, index: usize) -> &ManualClock {
        &self.clocks[index]
    }

    // Objects

    /// Declares the test object on participant `index` and attaches it
    pub fn spawn(&mut self, index: usize, object: ObjectId) -> TestObject {
        let test_object = TestObject::build(&self.participants[index], object);
        self.participants[index]
            .attach_object(test_object.object.clone())
            .expect("attach");
        test_object
    }

    /// Declares the same object on every participant, in index order, and
    /// exchanges until every copy knows its holder
    pub fn spawn_everywhere(&mut self, object: ObjectId) -> Vec<TestObject> {
        let copies = (0..self.participants.len())
            .map(|index| self.spawn(index, object))
            .collect();
        self.exchange(2);
        copies
    }

    /// Participants that currently believe they hold `object`
    pub fn authority_holders(&self, object: ObjectId) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|participant| {
                participant
                    .object(object)
                    .is_some_and(|object| object.is_local_authority())
            })
            .filter_map(|participant| participant.local())
            .collect()
    }

    // Exchange

    /// One round: the host relays everything sent so far, then every
    /// participant runs a fixed tick
    pub fn tick(&mut self) {
        self.tick_only(&(0..self.participants.len()).collect::<Vec<_>>());
    }

    /// Like [`tick`](Self::tick), but only the listed participants run; the
    /// others are stalled
    pub fn tick_only(&mut self, indices: &[usize]) {
        let relayed = self.host.update();
        trace!("host handled {} messages", relayed);
        for index in indices {
            self.clocks[*index].advance(self.tick_interval);
            if let Err(error) = self.participants[*index].fixed_tick() {
                panic!("fixed tick of participant {} failed: {}", index, error);
            }
        }
    }

    pub fn exchange(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.tick();
        }
    }

    /// Runs the observation tick of every participant
    pub fn observe(&mut self) {
        for participant in &mut self.participants {
            participant
                .observation_tick(Duration::ZERO)
                .expect("observation tick");
        }
    }
}
