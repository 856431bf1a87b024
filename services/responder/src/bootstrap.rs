//! Command line and process bootstrap

use std::path::PathBuf;

use clap::Parser;
use common::logging::{self, LogConfig};
use common::ServiceInfo;
use errors::ResponderResult;

use crate::config::{ResponderConfig, SERVICE_NAME};

/// Command-line arguments for responder
#[derive(Parser, Debug, Clone)]
#[command(
    name = "responder",
    version = env!("CARGO_PKG_VERSION"),
    about = "Emergency alert delivery for response facilities",
    long_about = None
)]
pub struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, env = "RESPONDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Facility to select at startup; defaults to the last selected one
    #[arg(short = 'f', long)]
    pub facility: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Opt in to push notifications right after selecting a facility
    #[arg(long)]
    pub enable_push: bool,

    /// Print the default configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo::new(
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        "Emergency Alert Delivery - Push/Poll Reconciliation",
    )
}

/// Initialize logging from configuration, with the CLI level taking priority
///
/// Log root directory priority:
/// 1. RESPONDER_LOG_DIR environment variable
/// 2. logging.dir from configuration
/// 3. Default "logs"
pub fn initialize_logging(args: &Args, config: &ResponderConfig) -> ResponderResult<()> {
    let mut logging_config = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging_config.level = level.clone();
    }

    logging::init_with_config(LogConfig::from_config(
        SERVICE_NAME,
        &logging_config,
        !args.no_color,
    ))
}
