use std::fmt;

use serde::{Deserialize, Serialize};

/// Local fixed-tick counter. Wraps around.
pub type Tick = u16;

/// Per-object counter of flushes on the authority. Never wraps in practice.
pub type FlushSequence = u64;

/// Incremented by the host every time the holder of an object changes.
pub type AuthorityEpoch = u32;

/// Identifier of a replicated log entry. `0` means "nothing processed yet".
pub type LogId = u32;

/// Watermark value meaning no log entry has been processed.
pub const NO_LOG_ENTRY: LogId = 0;

/// A session member, assigned by the host on connect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(u32);

impl ParticipantId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Stable identity of a replicated object. Every participant attaches the
/// same id for the same object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Index of a field inside its object, in declaration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(u8);

impl FieldId {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
