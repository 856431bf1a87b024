//! Responder basic library
//!
//! Provides functions shared by the workspace binaries:
//! - logging initialization
//! - layered configuration loading
//! - shutdown signal handling
//! - service startup banner

pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use config_loader::{load_config, ConfigSource};
pub use logging::{LogConfig, LoggingConfig};
pub use service_bootstrap::ServiceInfo;
pub use shutdown::{wait_for_shutdown, ShutdownSignal};
