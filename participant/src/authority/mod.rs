pub mod negotiator;
pub mod outcome;
pub mod request;
