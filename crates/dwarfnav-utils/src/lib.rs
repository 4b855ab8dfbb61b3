//! # dwarfnav Utilities
//!
//! Logging setup shared by the dwarfnav binaries, built on `tracing`.

pub mod logging;

pub use logging::{init_logging, init_logging_with, init_logging_with_level, LogConfig, LogFormat, LogGuard, LogLevel};
pub use tracing::{debug, error, info, trace, warn};
