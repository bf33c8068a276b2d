use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec,
    field::{binding::FieldBinding, error::FieldError, FieldKind, ReplicatedField},
    types::{AuthorityEpoch, FieldId},
    version::FieldVersion,
};

struct ValueCell<T> {
    value: T,
    version: FieldVersion,
    revision: u64,
}

/// A single synchronized scalar/struct with last-writer-wins semantics.
///
/// Only the authority writes. Every other participant sees the value change
/// when a newer broadcast is ingested, and learns about it through a
/// [`ChangeDetector`](crate::ChangeDetector).
pub struct ReplicatedValue<T> {
    cell: Arc<RwLock<ValueCell<T>>>,
    binding: FieldBinding,
}

impl<T> Clone for ReplicatedValue<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<T> ReplicatedValue<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(value: T, binding: FieldBinding) -> Self {
        Self {
            cell: Arc::new(RwLock::new(ValueCell {
                value,
                version: FieldVersion::INITIAL,
                revision: 0,
            })),
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

    /// Last broadcast (or, on the authority, last written) value. Always
    /// succeeds.
    pub fn read(&self) -> T {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .clone()
    }

    /// Writes a new value, queued for broadcast at the end of the fixed tick.
    /// Fails with [`FieldError::NotAuthority`] unless the local participant
    /// holds authority. Writing the current value is a no-op.
    pub fn write(&self, value: T) -> Result<(), FieldError> {
        self.binding.require_authority("write")?;
        let mut cell = self.cell.write().map_err(|_| self.binding.poisoned())?;
        if cell.value == value {
            return Ok(());
        }
        cell.value = value;
        cell.revision += 1;
        self.binding.mark_dirty();
        Ok(())
    }
}

impl<T> ReplicatedField for ReplicatedValue<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn id(&self) -> FieldId {
        self.binding.id
    }

    fn name(&self) -> &'static str {
        self.binding.name
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Value
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
        codec::encode(self.binding.name, &cell.value).map_err(|source| FieldError::Codec {
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
                "ignoring stale state {:?} for field '{}' (have {:?})",
                version, self.binding.name, cell.version
            );
            return Ok(false);
        }
        let value: T = codec::decode(self.binding.name, payload).map_err(|source| {
            FieldError::Codec {
                field: self.binding.name,
                source,
            }
        })?;
        cell.version = version;
        if cell.value == value {
            return Ok(false);
        }
        cell.value = value;
        cell.revision += 1;
        Ok(true)
    }
}

impl<T: fmt::Debug> fmt::Debug for ReplicatedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ReplicatedValue")
            .field("name", &self.binding.name)
            .field("value", &cell.value)
            .field("version", &cell.version)
            .finish()
    }
}
