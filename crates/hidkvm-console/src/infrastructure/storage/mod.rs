//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory, fills in defaults on first run and writes
//! it back when asked.  Nothing else in the console touches the file system.

pub mod config;
