//! Message transport between participants and the session host.
//!
//! Delivery is at-least-once and FIFO per sender. Field versions make
//! redundant deliveries harmless.

pub mod error;
pub mod loopback;

use crate::{
    messages::{HostMessage, ParticipantMessage},
    transport::error::TransportError,
    types::ParticipantId,
};

/// A participant's connection to the session host
pub trait Transport {
    /// Id assigned by the host, once the welcome message arrived
    fn local_participant(&self) -> Option<ParticipantId>;

    /// False once either side closed the connection
    fn is_open(&self) -> bool;

    fn send(&mut self, message: ParticipantMessage) -> Result<(), TransportError>;

    /// Next message from the host, if one is waiting
    fn receive(&mut self) -> Result<Option<HostMessage>, TransportError>;
}

/// Settings for deliberately degrading a link in tests
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkConditionerConfig {
    /// Probability in `[0, 1]` that a message is delivered twice
    pub duplicate_chance: f32,
    pub seed: u64,
}

impl LinkConditionerConfig {
    pub fn new(duplicate_chance: f32, seed: u64) -> Self {
        Self {
            duplicate_chance,
            seed,
        }
    }

    /// Every message is delivered twice
    pub fn always_duplicate() -> Self {
        Self::new(1.0, 0)
    }

    pub fn lossless() -> Self {
        Self::new(0.0, 0)
    }
}

impl Default for LinkConditionerConfig {
    fn default() -> Self {
        Self::lossless()
    }
}
