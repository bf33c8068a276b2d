//! # Replicast Shared
//! Common functionality shared between the replicast-host &
//! replicast-participant crates: replicated fields, authority status, change
//! detection and the wire protocol.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod authority;
mod clock;
mod codec;
mod diff_mask;
mod field;
mod messages;
mod object;
mod transport;
mod types;
mod version;

pub use authority::{
    channel::{new_authority_channel, AuthorityAccessor, AuthorityMutator},
    error::AuthorityError,
    liveness::Liveness,
    status::{AuthorityState, AuthorityStatus, AuthorityTransition},
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{decode, encode, CodecError};
pub use diff_mask::{DiffMask, DiffMaskIter};
pub use field::{
    binding::DirtyMask,
    error::FieldError,
    log::{LogCursor, LogEntry, ReplicatedBoundedLog},
    log_config::{LogConfig, Overflow},
    map::ReplicatedMap,
    value::ReplicatedValue,
    FieldKind, ReplicatedField,
};
pub use messages::{FieldUpdate, HostMessage, ParticipantMessage};
pub use object::{
    builder::ObjectBuilder,
    change_detector::{ChangeDetector, ChangedFields},
    error::ObjectError,
    ReplicatedObject, MAX_FIELDS,
};
pub use transport::{
    error::TransportError,
    loopback::{loopback_link, HostLink, ParticipantLink},
    LinkConditionerConfig, Transport,
};
pub use types::{
    AuthorityEpoch, FieldId, FlushSequence, LogId, ObjectId, ParticipantId, Tick, NO_LOG_ENTRY,
};
pub use version::FieldVersion;
