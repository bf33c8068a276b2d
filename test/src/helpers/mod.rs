pub mod assertions;
pub mod test_object;
pub mod test_session;

pub use test_object::{TestObject, EVENTS_CAPACITY, EVENTS_TTL, HISTORY_CAPACITY, PADS_CAPACITY};
pub use test_session::{TestParticipant, TestSession};
