use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    codec,
    field::{
        binding::FieldBinding, error::FieldError, log_config::LogConfig, log_config::Overflow,
        FieldKind, ReplicatedField,
    },
    types::{AuthorityEpoch, FieldId, LogId, ParticipantId, NO_LOG_ENTRY},
    version::FieldVersion,
};

/// One record of a bounded log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry<T> {
    pub id: LogId,
    /// Participant that held authority when the entry was appended
    pub source: ParticipantId,
    /// Authority's local clock at append time
    pub timestamp: Duration,
    pub payload: T,
}

/// A consumer's position in a log: the highest id already processed, plus
/// the clear-generation it was taken in. A cursor from an older generation
/// restarts from [`NO_LOG_ENTRY`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogCursor {
    generation: u32,
    last_processed: LogId,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_processed(&self) -> LogId {
        self.last_processed
    }
}

#[derive(Serialize)]
struct LogSnapshotRef<'a, T> {
    last_id: LogId,
    entries: &'a VecDeque<LogEntry<T>>,
}

#[derive(Deserialize)]
struct LogSnapshot<T> {
    last_id: LogId,
    entries: VecDeque<LogEntry<T>>,
}

struct LogCell<T> {
    entries: VecDeque<LogEntry<T>>,
    // highest id ever observed, survives clears so ids never repeat locally
    last_id: LogId,
    generation: u32,
    version: FieldVersion,
    revision: u64,
}

impl<T> LogCell<T> {
    fn clear(&mut self) {
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
        self.revision += 1;
    }

    fn collect_after(&self, last_processed: LogId) -> Vec<&LogEntry<T>> {
        let mut batch: Vec<&LogEntry<T>> = self
            .entries
            .iter()
            .rev()
            .take_while(|entry| entry.id > last_processed)
            .collect();
        batch.reverse();
        batch
    }
}

/// An append-only, capacity-bounded sequence of timestamped entries.
///
/// The authority appends and prunes; every participant consumes new entries
/// exactly once, in ascending id order, by tracking a watermark (or a
/// [`LogCursor`]).
pub struct ReplicatedBoundedLog<T> {
    cell: Arc<RwLock<LogCell<T>>>,
    config: LogConfig,
    binding: FieldBinding,
}

impl<T> Clone for ReplicatedBoundedLog<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            config: self.config.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<T> ReplicatedBoundedLog<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(config: LogConfig, binding: FieldBinding) -> Self {
        Self {
            cell: Arc::new(RwLock::new(LogCell {
                entries: VecDeque::with_capacity(config.capacity),
                last_id: NO_LOG_ENTRY,
                generation: 0,
                version: FieldVersion::INITIAL,
                revision: 0,
            })),
            config,
            binding,
        }
    }

    pub fn id(&self) -> FieldId {
        self.binding.id
    }

    pub fn name(&self) -> &'static str {
        self.binding.name
    }

    /// Whether writes to this field are currently accepted
    pub fn has_authority(&self) -> bool {
        self.binding.authority.is_granted()
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Appends `payload`, stamped with the local clock
    pub fn append(&self, payload: T) -> Result<LogId, FieldError> {
        self.append_at(payload, self.binding.clock.now())
    }

    /// Appends `payload` with an explicit timestamp
    pub fn append_at(&self, payload: T, now: Duration) -> Result<LogId, FieldError> {
        let state = self.binding.require_authority("append")?;
        let Some(source) = state.local else {
            return Err(FieldError::NotAuthority {
                object: self.binding.authority.object().to_string(),
                field: self.binding.name,
                operation: "append",
                status: state.status.name(),
            });
        };

        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;

        if cell.entries.len() >= self.config.capacity {
            if self.config.overflow == Overflow::EvictOldest {
                cell.entries.pop_front();
            }
            if cell.entries.len() >= self.config.capacity {
                warn!(
                    "log '{}' of object {} is full ({} entries), dropping append",
                    self.binding.name,
                    self.binding.authority.object(),
                    self.config.capacity
                );
                return Err(FieldError::CapacityExceeded {
                    field: self.binding.name,
                    capacity: self.config.capacity,
                });
            }
        }

        let id = cell.last_id.checked_add(1).ok_or(FieldError::IdsExhausted {
            field: self.binding.name,
        })?;
        cell.last_id = id;
        cell.entries.push_back(LogEntry {
            id,
            source,
            timestamp: now,
            payload,
        });
        cell.revision += 1;
        self.binding.mark_dirty();
        Ok(id)
    }

    /// Removes expired entries and, when configured, entries from other
    /// sources than the current authority. Authority-only.
    pub fn prune_at(&self, now: Duration) -> Result<usize, FieldError> {
        let state = self.binding.require_authority("prune")?;
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        let before = cell.entries.len();

        if let Some(ttl) = self.config.ttl {
            cell.entries
                .retain(|entry| now.saturating_sub(entry.timestamp) < ttl);
        }
        if self.config.prune_foreign_sources {
            if let Some(holder) = state.holder {
                cell.entries.retain(|entry| entry.source == holder);
            }
        }

        let removed = before - cell.entries.len();
        if removed > 0 {
            cell.revision += 1;
            self.binding.mark_dirty();
        }
        Ok(removed)
    }

    /// Entries with an id above `last_processed` in ascending id order, and
    /// the new watermark (unchanged when nothing is new)
    pub fn consume_new(&self, last_processed: LogId) -> (Vec<LogEntry<T>>, LogId) {
        let cell = self.cell.read().unwrap_or_else(PoisonError::into_inner);
        let batch: Vec<LogEntry<T>> = cell
            .collect_after(last_processed)
            .into_iter()
            .cloned()
            .collect();
        let watermark = batch.last().map_or(last_processed, |entry| entry.id);
        (batch, watermark)
    }

    /// Like [`consume_new`](Self::consume_new), advancing `cursor` in place
    pub fn consume(&self, cursor: &mut LogCursor) -> Vec<LogEntry<T>> {
        let generation = self
            .cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation;
        if cursor.generation != generation {
            debug!(
                "log '{}' was cleared, resetting consumer cursor",
                self.binding.name
            );
            cursor.generation = generation;
            cursor.last_processed = NO_LOG_ENTRY;
        }
        let (batch, watermark) = self.consume_new(cursor.last_processed);
        cursor.last_processed = watermark;
        batch
    }

    /// A cursor positioned after every entry currently in the log
    pub fn cursor_at_end(&self) -> LogCursor {
        let cell = self.cell.read().unwrap_or_else(PoisonError::into_inner);
        LogCursor {
            generation: cell.generation,
            last_processed: cell.entries.back().map_or(NO_LOG_ENTRY, |entry| entry.id),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry<T>> {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<LogEntry<T>> {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .back()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest id this copy has seen. The next append uses the id after it.
    pub fn last_id(&self) -> LogId {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_id
    }

    /// Number of times this copy was cleared
    pub fn generation(&self) -> u32 {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }
}

impl<T> ReplicatedField for ReplicatedBoundedLog<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn id(&self) -> FieldId {
        self.binding.id
    }

    fn name(&self) -> &'static str {
        self.binding.name
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Log
    }

    fn revision(&self) -> u64 {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    fn version(&self) -> FieldVersion {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    fn encode_state(&self, version: FieldVersion) -> Result<Vec<u8>, FieldError> {
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        cell.version = version;
        let snapshot = LogSnapshotRef {
            last_id: cell.last_id,
            entries: &cell.entries,
        };
        codec::encode(self.binding.name, &snapshot).map_err(|source| FieldError::Codec {
            field: self.binding.name,
            source,
        })
    }

    fn apply_state(
        &self,
        version: FieldVersion,
        payload: &[u8],
        authority_epoch: Option<AuthorityEpoch>,
    ) -> Result<bool, FieldError> {
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        if !version.is_newer_than(&cell.version) {
            debug!(
                "ignoring stale state {:?} for log '{}' (have {:?})",
                version, self.binding.name, cell.version
            );
            return Ok(false);
        }
        if self.config.clear_on_authority_change {
            if let Some(epoch) = authority_epoch {
                if version.epoch < epoch {
                    debug!(
                        "ignoring log '{}' written under epoch {} (current epoch {})",
                        self.binding.name, version.epoch, epoch
                    );
                    return Ok(false);
                }
            }
        }

        let mut snapshot: LogSnapshot<T> =
            codec::decode(self.binding.name, payload).map_err(|source| FieldError::Codec {
                field: self.binding.name,
                source,
            })?;
        while snapshot.entries.len() > self.config.capacity {
            snapshot.entries.pop_front();
        }

        cell.version = version;
        let changed = cell.entries.len() != snapshot.entries.len()
            || !cell
                .entries
                .iter()
                .map(|entry| entry.id)
                .eq(snapshot.entries.iter().map(|entry| entry.id));
        if !changed {
            cell.last_id = cell.last_id.max(snapshot.last_id);
            return Ok(false);
        }

        if snapshot.last_id < cell.last_id {
            // the writer restarted its sequence below ours: consumers must
            // start over or they would skip the new entries
            debug!(
                "log '{}' restarted at id {} (had seen {}), resetting consumers",
                self.binding.name, snapshot.last_id, cell.last_id
            );
            cell.generation = cell.generation.wrapping_add(1);
        }
        cell.last_id = cell.last_id.max(snapshot.last_id);
        cell.entries = snapshot.entries;
        cell.revision += 1;
        Ok(true)
    }

    fn on_authority_changed(&self) -> Result<bool, FieldError> {
        if !self.config.clear_on_authority_change {
            return Ok(false);
        }
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        cell.clear();
        debug!(
            "cleared log '{}' of object {} after authority change",
            self.binding.name,
            self.binding.authority.object()
        );
        if self.binding.authority.is_granted() {
            self.binding.mark_dirty();
        }
        Ok(true)
    }

    fn prune(&self) -> Result<usize, FieldError> {
        if !self.binding.authority.is_granted() {
            return Ok(0);
        }
        self.prune_at(self.binding.clock.now())
    }
}

impl<T: fmt::Debug> fmt::Debug for ReplicatedBoundedLog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ReplicatedBoundedLog")
            .field("name", &self.binding.name)
            .field("config", &self.config)
            .field("entries", &cell.entries)
            .field("last_id", &cell.last_id)
            .field("generation", &cell.generation)
            .finish()
    }
}
