use std::collections::{vec_deque::IntoIter, VecDeque};

use log::warn;

use replicast_shared::{AuthorityEpoch, FieldId, ObjectId, ParticipantId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParticipantEvent {
    /// The host welcomed us
    Connected { participant: ParticipantId },
    Disconnected,
    ParticipantJoined { participant: ParticipantId },
    ParticipantLeft { participant: ParticipantId },
    AuthorityChanged {
        object: ObjectId,
        holder: Option<ParticipantId>,
        epoch: AuthorityEpoch,
        /// False for the first announcement an object receives
        migrated: bool,
    },
    /// Reported by the observation tick, in declaration order
    FieldsChanged {
        object: ObjectId,
        fields: Vec<FieldId>,
    },
    Despawned { object: ObjectId },
}

/// Events buffered until the application takes them. Holds at most
/// `capacity` events; older ones are dropped first.
pub struct ParticipantEvents {
    events: VecDeque<ParticipantEvent>,
    capacity: usize,
    dropped: usize,
}

impl ParticipantEvents {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    /// A drained buffer with the same capacity
    pub(crate) fn take(&mut self) -> Self {
        let taken = Self {
            events: std::mem::take(&mut self.events),
            capacity: self.capacity,
            dropped: self.dropped,
        };
        self.dropped = 0;
        taken
    }

    /// Events discarded because nobody took them in time
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, ParticipantEvent> {
        self.events.iter()
    }

    pub(crate) fn push(&mut self, event: ParticipantEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() >= self.capacity {
            if self.dropped == 0 {
                warn!(
                    "event buffer full ({} events), dropping the oldest until taken",
                    self.capacity
                );
            }
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }
}

impl IntoIterator for ParticipantEvents {
    type Item = ParticipantEvent;
    type IntoIter = IntoIter<ParticipantEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
