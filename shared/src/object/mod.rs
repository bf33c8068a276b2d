//! Replicated objects: a declared set of fields plus the local view of who
//! may write them.

pub mod builder;
pub mod change_detector;
pub mod error;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::{debug, warn};

use crate::{
    authority::{
        channel::{AuthorityAccessor, AuthorityMutator},
        liveness::Liveness,
        status::{AuthorityStatus, AuthorityTransition},
    },
    clock::Clock,
    field::{binding::DirtyMask, ReplicatedField},
    messages::FieldUpdate,
    object::{builder::ObjectBuilder, error::ObjectError},
    types::{AuthorityEpoch, FieldId, FlushSequence, ObjectId, ParticipantId, Tick},
    version::FieldVersion,
};

/// Most fields a single object may declare
pub const MAX_FIELDS: usize = 64;

struct ObjectShared {
    id: ObjectId,
    fields: Vec<Arc<dyn ReplicatedField>>,
    authority: AuthorityMutator,
    dirty: DirtyMask,
    liveness: Liveness,
    // highest flush sequence stamped or seen for this object
    sequence: AtomicU64,
}

/// An object owning replicated fields.
///
/// Cheap to clone: every clone refers to the same fields and authority view.
/// Application code keeps the typed field handles returned by the
/// [`ObjectBuilder`]; the participant runtime drives authority, flushing and
/// ingestion through this type.
#[derive(Clone)]
pub struct ReplicatedObject {
    shared: Arc<ObjectShared>,
}

impl ReplicatedObject {
    pub fn builder(id: ObjectId, clock: Arc<dyn Clock>) -> ObjectBuilder {
        ObjectBuilder::new(id, clock)
    }

    pub(crate) fn from_parts(
        id: ObjectId,
        fields: Vec<Arc<dyn ReplicatedField>>,
        authority: AuthorityMutator,
        dirty: DirtyMask,
    ) -> Self {
        Self {
            shared: Arc::new(ObjectShared {
                id,
                fields,
                authority,
                dirty,
                liveness: Liveness::new(),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.shared.id
    }

    pub fn field_count(&self) -> usize {
        self.shared.fields.len()
    }

    pub fn field_name(&self, field: FieldId) -> Option<&'static str> {
        self.field(field).map(|field| field.name())
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.shared
            .fields
            .iter()
            .find(|field| field.name() == name)
            .map(|field| field.id())
    }

    pub(crate) fn fields(&self) -> &[Arc<dyn ReplicatedField>] {
        &self.shared.fields
    }

    fn field(&self, field: FieldId) -> Option<&Arc<dyn ReplicatedField>> {
        self.shared.fields.get(field.index())
    }

    // Authority

    pub fn authority(&self) -> AuthorityAccessor {
        self.shared.authority.accessor()
    }

    /// Write side of the authority view. Only the participant runtime should
    /// drive it, in response to host messages.
    pub fn authority_mutator(&self) -> &AuthorityMutator {
        &self.shared.authority
    }

    pub fn status(&self) -> AuthorityStatus {
        self.authority().status()
    }

    pub fn is_local_authority(&self) -> bool {
        self.authority().is_granted()
    }

    pub fn holder(&self) -> Option<ParticipantId> {
        self.authority().holder()
    }

    pub fn epoch(&self) -> Option<AuthorityEpoch> {
        self.authority().epoch()
    }

    /// Records the holder announced by the host. Announcements older than
    /// the known epoch are ignored (`Ok(None)`). When authority migrated,
    /// every field holding time-relative data is reset.
    pub fn record_authority(
        &self,
        holder: Option<ParticipantId>,
        epoch: AuthorityEpoch,
    ) -> Result<Option<AuthorityTransition>, ObjectError> {
        if let Some(current) = self.epoch() {
            if epoch < current {
                debug!(
                    "ignoring authority announcement for {} at epoch {} (current {})",
                    self.id(),
                    epoch,
                    current
                );
                return Ok(None);
            }
            if epoch == current && holder == self.holder() {
                // redelivered announcement
                return Ok(None);
            }
        }

        let transition = self.shared.authority.record_holder(holder, epoch)?;
        if transition.is_migration() {
            for field in &self.shared.fields {
                field.on_authority_changed()?;
            }
        }
        Ok(Some(transition))
    }

    // Liveness

    pub fn liveness(&self) -> Liveness {
        self.shared.liveness.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.shared.liveness.is_alive()
    }

    /// Marks the object destroyed and forgets its authority. Pending work
    /// holding the liveness token resolves as cancelled.
    pub fn despawn(&self) -> Result<(), ObjectError> {
        self.shared.liveness.kill();
        self.shared.authority.reset()?;
        Ok(())
    }

    // Sync

    pub fn has_dirty_fields(&self) -> bool {
        !self.shared.dirty.is_clear()
    }

    /// Highest flush sequence this copy stamped or received
    pub fn sequence(&self) -> FlushSequence {
        self.shared.sequence.load(Ordering::Acquire)
    }

    /// Stamps and encodes every field written since the last call, in
    /// declaration order. Each non-empty flush takes the next sequence.
    pub fn collect_dirty(&self, tick: Tick) -> Result<Vec<FieldUpdate>, ObjectError> {
        if self.shared.dirty.is_clear() {
            return Ok(Vec::new());
        }
        let Some(epoch) = self.epoch() else {
            return Err(ObjectError::NoAuthorityEpoch {
                object: self.id().to_string(),
            });
        };

        let dirty = self.shared.dirty.take();
        let sequence = self.shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let version = FieldVersion::new(epoch, sequence);
        let mut updates = Vec::new();
        for field_id in dirty.iter() {
            let Some(field) = self.field(field_id) else {
                warn!("dirty bit {} set on {} without a field", field_id, self.id());
                continue;
            };
            updates.push(FieldUpdate {
                object: self.id(),
                field: field_id,
                version,
                tick,
                payload: field.encode_state(version)?,
            });
        }
        Ok(updates)
    }

    /// Applies a broadcast field state. Returns whether the local copy
    /// changed; stale and duplicate updates are ignored.
    pub fn apply_update(&self, update: &FieldUpdate) -> Result<bool, ObjectError> {
        let Some(field) = self.field(update.field) else {
            return Err(ObjectError::UnknownField {
                object: self.id().to_string(),
                field: update.field.to_string(),
            });
        };
        // a copy that later holds authority must stamp above every
        // sequence already in circulation
        self.shared
            .sequence
            .fetch_max(update.version.sequence, Ordering::AcqRel);
        if self.is_local_authority() {
            // our own copy is the truth while we hold authority
            debug!(
                "ignoring remote state for field '{}' of {} held locally",
                field.name(),
                self.id()
            );
            return Ok(false);
        }
        Ok(field.apply_state(update.version, &update.payload, self.epoch())?)
    }

    /// Runs log housekeeping. Only does anything on the authority.
    pub fn prune_logs(&self) -> Result<usize, ObjectError> {
        let mut removed = 0;
        for field in &self.shared.fields {
            removed += field.prune()?;
        }
        Ok(removed)
    }

    /// Local revision of every field, in declaration order
    pub(crate) fn revisions(&self) -> impl Iterator<Item = (FieldId, u64)> + '_ {
        self.shared
            .fields
            .iter()
            .map(|field| (field.id(), field.revision()))
    }
}

impl fmt::Debug for ReplicatedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.shared.fields.iter().map(|field| field.name()).collect();
        f.debug_struct("ReplicatedObject")
            .field("id", &self.shared.id)
            .field("fields", &names)
            .field("authority", &self.authority().state())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl PartialEq for ReplicatedObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
