//! # symtrace Utilities
//!
//! Logging setup and stack-trace reporting for programs built on
//! `symtrace-core`.
//!
//! - [`logging`]: `tracing-subscriber` initialization (pretty or JSON, optional rolling file)
//! - [`report`]: log a resolved stacktrace on demand or from a panic hook

pub mod logging;
pub mod report;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_with, init_logging_with_level, LogFormat, LogLevel, LoggingConfig, LoggingError,
    LoggingGuard,
};
pub use report::{install_panic_hook, log_stacktrace, log_trace};
pub use tracing::{debug, error, info, trace, warn};
