pub mod participant;
pub mod participant_config;
