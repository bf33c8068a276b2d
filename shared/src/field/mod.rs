//! Replicated fields.
//!
//! Every field handle is a cheap clone over shared state. The object keeps a
//! type-erased copy of each handle (as a [`ReplicatedField`]) so it can flush,
//! apply and reset fields without knowing their payload types, while
//! application code keeps the typed handle returned by the
//! [`ObjectBuilder`](crate::ObjectBuilder).

pub(crate) mod binding;
pub mod error;
pub mod log;
pub mod log_config;
pub mod map;
pub mod value;

use crate::{
    field::error::FieldError,
    types::{AuthorityEpoch, FieldId},
    version::FieldVersion,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Value,
    Map,
    Log,
}

/// Type-erased access to a replicated field, used by the owning object
pub trait ReplicatedField: Send + Sync {
    fn id(&self) -> FieldId;

    fn name(&self) -> &'static str;

    fn kind(&self) -> FieldKind;

    /// Local change counter: bumps on every local write, accepted remote
    /// state, or reset. Change detection compares revisions.
    fn revision(&self) -> u64;

    /// Version of the last state this copy broadcast or accepted
    fn version(&self) -> FieldVersion;

    /// Stamps the field with `version` and encodes its full state for
    /// broadcast
    fn encode_state(&self, version: FieldVersion) -> Result<Vec<u8>, FieldError>;

    /// Applies a broadcast state if it is newer than the local one. Returns
    /// whether the local copy changed.
    fn apply_state(
        &self,
        version: FieldVersion,
        payload: &[u8],
        authority_epoch: Option<AuthorityEpoch>,
    ) -> Result<bool, FieldError>;

    /// Called after authority moved to another participant. Returns whether
    /// the field reset itself.
    fn on_authority_changed(&self) -> Result<bool, FieldError> {
        Ok(false)
    }

    /// Authority-side housekeeping run every fixed tick. Returns the number
    /// of entries removed.
    fn prune(&self) -> Result<usize, FieldError> {
        Ok(0)
    }
}
