//! crewlink-utils: Common utilities shared across crewlink crates
//!
//! This crate provides:
//! - Unified error types ([`CrewlinkError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{CrewlinkError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};

// Re-export commonly used path functions
pub use paths::{config_dir, config_file, data_dir, local_store_file, log_dir, sync_store_file};
