use std::time::Duration;

use replicast_participant::Participant;
use replicast_shared::{
    LogConfig, ObjectId, ReplicatedBoundedLog, ReplicatedMap, ReplicatedObject, ReplicatedValue,
    Transport,
};

pub const EVENTS_CAPACITY: usize = 3;
pub const EVENTS_TTL: Duration = Duration::from_secs(5);
pub const HISTORY_CAPACITY: usize = 8;
pub const PADS_CAPACITY: usize = 4;

/// An object declaring one field of every kind
#[derive(Clone)]
pub struct TestObject {
    pub object: ReplicatedObject,
    pub score: ReplicatedValue<u32>,
    pub pads: ReplicatedMap<u8, bool>,
    /// Time-relative: cleared whenever authority moves
    pub events: ReplicatedBoundedLog<u32>,
    /// Survives authority changes
    pub history: ReplicatedBoundedLog<u32>,
}

impl TestObject {
    pub fn build<T: Transport>(participant: &Participant<T>, id: ObjectId) -> Self {
        let mut builder = participant.builder(id);
        let score = builder.value("score", 0u32);
        let pads = builder.map::<u8, bool>("pads", PADS_CAPACITY);
        let events = builder.log::<u32>("events", LogConfig::event_log(EVENTS_CAPACITY, EVENTS_TTL));
        let history = builder.log::<u32>("history", LogConfig::history(HISTORY_CAPACITY));
        let object = builder.build().expect("test object declares valid fields");
        Self {
            object,
            score,
            pads,
            events,
            history,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }
}
