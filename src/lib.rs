//! wbt-runner - WhiteboxTools execution orchestrator
//!
//! Supervises the external WhiteboxTools geospatial toolset: provisions the
//! platform-specific executable bundle (download once, verify, cache),
//! stages inputs into an ephemeral workspace, runs tools sequentially in
//! caller order, and collects the requested outputs.
//!
//! # Architecture
//!
//! - `provision`: download/extract/verify the executable, cross-process lock
//! - `workspace`: scoped scratch directory with guaranteed cleanup
//! - `runner`: ordered invocation state machine with abort-on-first-failure
//! - `collect`: selective output persistence with sidecar grouping

pub mod errors;
pub mod platform;
pub mod provision;
pub mod workspace;
pub mod runner;
pub mod collect;
pub mod orchestrator;
pub mod cli;

// Re-export commonly used types
pub use collect::collect;
pub use errors::{Result, WbtError};
pub use orchestrator::{list_tools, tool_parameters, whitebox_tools, RunOptions};
pub use platform::PlatformDescriptor;
pub use provision::{ExecutableBundle, ProvisionOptions};
pub use runner::{RunState, ToolInvocation, ToolRunner};
pub use workspace::WorkspaceSession;
