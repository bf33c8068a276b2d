use std::{collections::HashSet, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    authority::channel::{new_authority_channel, AuthorityAccessor, AuthorityMutator},
    clock::Clock,
    field::{
        binding::{DirtyMask, FieldBinding},
        log::ReplicatedBoundedLog,
        log_config::LogConfig,
        map::ReplicatedMap,
        value::ReplicatedValue,
        ReplicatedField,
    },
    object::{error::ObjectError, ReplicatedObject, MAX_FIELDS},
    types::{FieldId, ObjectId},
};

/// Declares the fields of a [`ReplicatedObject`].
///
/// Field ids follow declaration order, so every participant must declare
/// the same fields in the same order. Each declaration returns the typed
/// handle application code uses to read and write the field.
pub struct ObjectBuilder {
    id: ObjectId,
    clock: Arc<dyn Clock>,
    mutator: AuthorityMutator,
    accessor: AuthorityAccessor,
    dirty: DirtyMask,
    fields: Vec<Arc<dyn ReplicatedField>>,
    names: HashSet<&'static str>,
    error: Option<ObjectError>,
}

impl ObjectBuilder {
    pub fn new(id: ObjectId, clock: Arc<dyn Clock>) -> Self {
        let (mutator, accessor) = new_authority_channel(id);
        Self {
            id,
            clock,
            mutator,
            accessor,
            dirty: DirtyMask::new(MAX_FIELDS),
            fields: Vec::new(),
            names: HashSet::new(),
            error: None,
        }
    }

    pub fn value<T>(&mut self, name: &'static str, initial: T) -> ReplicatedValue<T>
    where
        T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let value = ReplicatedValue::new(initial, self.next_binding(name));
        self.fields.push(Arc::new(value.clone()));
        value
    }

    pub fn map<K, V>(&mut self, name: &'static str, capacity: usize) -> ReplicatedMap<K, V>
    where
        K: Copy + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
        V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let map = ReplicatedMap::new(capacity, self.next_binding(name));
        self.fields.push(Arc::new(map.clone()));
        map
    }

    pub fn log<T>(&mut self, name: &'static str, config: LogConfig) -> ReplicatedBoundedLog<T>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let log = ReplicatedBoundedLog::new(config, self.next_binding(name));
        self.fields.push(Arc::new(log.clone()));
        log
    }

    /// Finishes the declaration. Fails if too many fields were declared or
    /// a name was used twice.
    pub fn build(self) -> Result<ReplicatedObject, ObjectError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.dirty.resize(self.fields.len());
        Ok(ReplicatedObject::from_parts(
            self.id,
            self.fields,
            self.mutator,
            self.dirty,
        ))
    }

    fn next_binding(&mut self, name: &'static str) -> FieldBinding {
        let count = self.fields.len();
        if count >= MAX_FIELDS && self.error.is_none() {
            self.error = Some(ObjectError::TooManyFields {
                object: self.id.to_string(),
                count: count + 1,
                max: MAX_FIELDS,
            });
        }
        if !self.names.insert(name) && self.error.is_none() {
            self.error = Some(ObjectError::DuplicateFieldName {
                object: self.id.to_string(),
                name,
            });
        }
        // ids past the limit are never used: build() fails
        let id = FieldId::new(u8::try_from(count).unwrap_or(u8::MAX));
        FieldBinding {
            id,
            name,
            authority: self.accessor.clone(),
            dirty: self.dirty.clone(),
            clock: self.clock.clone(),
        }
    }
}
