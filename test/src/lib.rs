//! Harness for driving a host and several participants in one process.

pub mod helpers;

pub use helpers::*;

/// Installs the test logger once per process
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
