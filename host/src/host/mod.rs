pub mod host_config;
pub mod session_host;
