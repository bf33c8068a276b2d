use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{AuthorityEpoch, FlushSequence};

/// Stamp attached to every broadcast field state.
///
/// Ordered by authority epoch first, then by the flush sequence of the
/// object on the authority that produced it. The sequence only grows, so a
/// write after any amount of idle time still orders after the previous one.
/// A remote copy only accepts a state that is strictly newer than the one it
/// holds, which makes redundant deliveries of the same snapshot idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldVersion {
    pub epoch: AuthorityEpoch,
    pub sequence: FlushSequence,
}

impl FieldVersion {
    /// Version of a field nobody has broadcast yet
    pub const INITIAL: FieldVersion = FieldVersion {
        epoch: 0,
        sequence: 0,
    };

    pub const fn new(epoch: AuthorityEpoch, sequence: FlushSequence) -> Self {
        Self { epoch, sequence }
    }

    pub fn is_newer_than(&self, other: &FieldVersion) -> bool {
        self.compare(other) == Ordering::Greater
    }

    pub fn compare(&self, other: &FieldVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl Default for FieldVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}
