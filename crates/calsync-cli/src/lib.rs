//! The `calsync` command-line tool.
//!
//! Loads `config.toml`, builds the configured source and target calendars
//! and runs the sync engine over them.

pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod run;
pub mod secret;
pub mod update;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
