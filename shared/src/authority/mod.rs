pub mod channel;
pub mod error;
pub mod liveness;
pub mod status;
