//! # Replicast Participant
//! A session member's runtime: attaches replicated objects, negotiates
//! authority over them with the host, and drives fixed and observation
//! ticks, behaviours and async tasks on a single thread.

#![deny(trivial_casts, trivial_numeric_casts, unstable_features, unused_import_braces)]

mod authority;
mod behaviour;
mod error;
mod events;
mod participant;
mod reconcile;
mod registry;
mod staging;
mod tick;

pub use authority::{
    negotiator::AuthorityNegotiator, outcome::AuthorityOutcome, request::AuthorityRequest,
};
pub use behaviour::{Behaviour, BehaviourContext};
pub use error::ParticipantError;
pub use events::{ParticipantEvent, ParticipantEvents};
pub use participant::{participant::Participant, participant_config::ParticipantConfig};
pub use reconcile::{sync_effect, LocalEffect, Reconciler, StatusChange, Tempo};
pub use registry::{RegistryError, ServiceRegistry};
pub use staging::LatestRequest;
pub use tick::FixedTimestep;
