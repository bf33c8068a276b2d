use std::time::Duration;

/// Contains Config properties which will be used by a Participant
#[derive(Clone, Debug)]
pub struct ParticipantConfig {
    /// Length of one fixed tick. Dirty fields are flushed once per tick.
    pub tick_interval: Duration,
    /// Most fixed ticks a single frame may run. Frame time beyond that is
    /// dropped.
    pub max_fixed_ticks_per_frame: u32,
    /// Most events buffered between two calls to `take_events`. Zero turns
    /// event buffering off.
    pub event_capacity: usize,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            max_fixed_ticks_per_frame: 8,
            event_capacity: 256,
        }
    }
}
