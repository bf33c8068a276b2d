use std::time::Duration;

/// What an append does when the log is already at capacity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Evict the oldest entry to make room
    #[default]
    EvictOldest,
    /// Refuse the append with `CapacityExceeded`
    Reject,
}

/// Contains config properties which will be used by a
/// [`ReplicatedBoundedLog`](crate::ReplicatedBoundedLog)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Maximum number of entries kept
    pub capacity: usize,
    /// Entries older than this (by the authority's clock) are pruned every
    /// fixed tick. `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
    pub overflow: Overflow,
    /// Empty the log whenever authority migrates. Required for logs whose
    /// timestamps come from the authority's clock.
    pub clear_on_authority_change: bool,
    /// Prune entries whose source is not the current authority
    pub prune_foreign_sources: bool,
}

impl LogConfig {
    /// A short-lived event stream: entries expire after `ttl`, the log is
    /// rebuilt from scratch by every new authority
    pub fn event_log(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl: Some(ttl),
            overflow: Overflow::Reject,
            clear_on_authority_change: true,
            prune_foreign_sources: true,
        }
    }

    /// A persistent history that survives authority changes and keeps the
    /// newest `capacity` entries
    pub fn history(capacity: usize) -> Self {
        Self {
            capacity,
            ttl: None,
            overflow: Overflow::EvictOldest,
            clear_on_authority_change: false,
            prune_foreign_sources: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            ttl: None,
            overflow: Overflow::EvictOldest,
            clear_on_authority_change: true,
            prune_foreign_sources: false,
        }
    }
}
