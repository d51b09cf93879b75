//! CLI front-end: argument parsing and TOML run configuration
//!
//! A thin collaborator around the core entry point; everything here maps a
//! configuration file onto `whitebox_tools(...)` unchanged.

pub mod args;
pub mod config;

pub use args::Args;
pub use config::{RunConfig, ToolEntry};
