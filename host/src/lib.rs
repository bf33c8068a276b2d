//! # Replicast Host
//! A session host that relays replicated field updates between participants
//! and arbitrates state authority over replicated objects.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

mod conditioner;
mod error;
mod host;
mod object;

pub use conditioner::LinkConditioner;
pub use error::HostError;
pub use host::{
    host_config::{AuthorityPolicy, HostConfig},
    session_host::SessionHost,
};
pub use object::object_record::{ObjectRecord, Outbound};
