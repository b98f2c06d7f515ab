//! Manages the `/etc/cake_stats.conf` file.
//!
//! The file is optional: with no file present the daemon runs on
//! defaults. Command-line flags are layered over whatever is loaded
//! here by the daemon itself.

#![warn(missing_docs)]
mod config;

pub use config::{Config, ConfigError, CONFIG_PATH, MIN_HISTORY_CAPACITY};
