use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec,
    field::{binding::FieldBinding, error::FieldError, FieldKind, ReplicatedField},
    types::{AuthorityEpoch, FieldId},
    version::FieldVersion,
};

struct MapCell<K, V> {
    // insertion order; capacities are small enough for a linear scan
    entries: Vec<(K, V)>,
    version: FieldVersion,
    revision: u64,
}

impl<K: PartialEq, V> MapCell<K, V> {
    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

/// A capacity-bounded keyed collection of small stable keys.
///
/// Each key reflects the last accepted write. Enumeration follows insertion
/// order. Only the authority mutates; the whole map is broadcast when any key
/// changed during a fixed tick.
pub struct ReplicatedMap<K, V> {
    cell: Arc<RwLock<MapCell<K, V>>>,
    capacity: usize,
    binding: FieldBinding,
}

impl<K, V> Clone for ReplicatedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            capacity: self.capacity,
            binding: self.binding.clone(),
        }
    }
}

impl<K, V> ReplicatedMap<K, V>
where
    K: Copy + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(capacity: usize, binding: FieldBinding) -> Self {
        Self {
            cell: Arc::new(RwLock::new(MapCell {
                entries: Vec::with_capacity(capacity),
                version: FieldVersion::INITIAL,
                revision: 0,
            })),
            capacity,
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

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sets `key` to `value`. Setting a key to its current value is a no-op.
    pub fn set(&self, key: K, value: V) -> Result<(), FieldError> {
        self.binding.require_authority("set")?;
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        match cell.position(&key) {
            Some(index) => {
                if cell.entries[index].1 == value {
                    return Ok(());
                }
                cell.entries[index].1 = value;
            }
            None => {
                if cell.entries.len() >= self.capacity {
                    warn!(
                        "map '{}' of object {} is full ({} keys), dropping new key",
                        self.binding.name,
                        self.binding.authority.object(),
                        self.capacity
                    );
                    return Err(FieldError::CapacityExceeded {
                        field: self.binding.name,
                        capacity: self.capacity,
                    });
                }
                cell.entries.push((key, value));
            }
        }
        cell.revision += 1;
        self.binding.mark_dirty();
        Ok(())
    }

    /// Removes `key`, returning its last value
    pub fn remove(&self, key: K) -> Result<Option<V>, FieldError> {
        self.binding.require_authority("remove")?;
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        let Some(index) = cell.position(&key) else {
            return Ok(None);
        };
        let (_, value) = cell.entries.remove(index);
        cell.revision += 1;
        self.binding.mark_dirty();
        Ok(Some(value))
    }

    pub fn get(&self, key: K) -> Option<V> {
        let cell = self.cell.read().unwrap_or_else(PoisonError::into_inner);
        cell.position(&key).map(|index| cell.entries[index].1.clone())
    }

    /// Value of `key`, or `default` when the key was never written
    pub fn get_or(&self, key: K, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .position(&key)
            .is_some()
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

    /// Snapshot of every entry, in insertion order
    pub fn entries(&self) -> Vec<(K, V)> {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    pub fn keys(&self) -> Vec<K> {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<(K, V)> {
        self.entries().into_iter()
    }
}

impl<K, V> ReplicatedField for ReplicatedMap<K, V>
where
    K: Copy + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn id(&self) -> FieldId {
        self.binding.id
    }

    fn name(&self) -> &'static str {
        self.binding.name
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Map
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
        codec::encode(self.binding.name, &cell.entries).map_err(|source| FieldError::Codec {
            field: self.binding.name,
            source,
        })
    }

    fn apply_state(
        &self,
        version: FieldVersion,
        payload: &[u8],
        _authority_epoch: Option<AuthorityEpoch>,
    ) -> Result<bool, FieldError> {
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        if !version.is_newer_than(&cell.version) {
            debug!(
                "ignoring stale state {:?} for map '{}' (have {:?})",
                version, self.binding.name, cell.version
            );
            return Ok(false);
        }
        let mut entries: Vec<(K, V)> =
            codec::decode(self.binding.name, payload).map_err(|source| FieldError::Codec {
                field: self.binding.name,
                source,
            })?;
        if entries.len() > self.capacity {
            warn!(
                "map '{}' received {} keys but holds {}, truncating",
                self.binding.name,
                entries.len(),
                self.capacity
            );
            entries.truncate(self.capacity);
        }
        cell.version = version;
        if cell.entries == entries {
            return Ok(false);
        }
        cell.entries = entries;
        cell.revision += 1;
        Ok(true)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ReplicatedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ReplicatedMap")
            .field("name", &self.binding.name)
            .field("capacity", &self.capacity)
            .field("entries", &cell.entries)
            .field("version", &cell.version)
            .finish()
    }
}
