// Deny unused code to catch dead code early (like knip for TS)
#![deny(unused)]
// Warn on unused dependencies to catch platform-specific cfg mismatches
#![warn(unused_crate_dependencies)]
// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod bulk;
pub mod config;
mod error;
pub mod history;
pub mod http;
mod ignore_poison;
mod integrity;
pub mod path_safety;
mod search;
mod single_file;
pub mod task_manager;
mod volume;

pub use error::ApiError;
