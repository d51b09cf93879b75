//! Sequential tool invocation against the WhiteboxTools executable
//!
//! Drives an explicit state machine over the caller-ordered invocation
//! list: `Pending -> Running(i) -> {Running(i+1) | Failed(i) | Completed}`.
//! The first non-success exit aborts everything after it; the runner never
//! interprets tool-specific flags.

use crate::errors::{Result, WbtError};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One named tool run with its raw argument list.
///
/// Arguments must be bare filenames and flags, never directory paths; all
/// I/O happens relative to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Execution progress over an invocation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running(usize),
    Completed,
    Failed(usize),
}

/// Runs invocation sequences against one provisioned executable
pub struct ToolRunner {
    exe: PathBuf,
    compress_rasters: bool,
    max_procs: i32,
}

impl ToolRunner {
    pub fn new(exe: PathBuf, compress_rasters: bool, max_procs: i32) -> Self {
        Self {
            exe,
            compress_rasters,
            max_procs,
        }
    }

    /// Run every invocation in order inside `workspace`, stopping at the
    /// first failure. Later invocations may depend on earlier outputs, so
    /// ordering is a correctness requirement.
    pub async fn run(&self, invocations: &[ToolInvocation], workspace: &Path) -> Result<RunState> {
        let mut state = RunState::Pending;
        debug!(?state, total = invocations.len(), "invocation sequence starting");

        for (index, invocation) in invocations.iter().enumerate() {
            state = RunState::Running(index);
            debug!(?state, tool = %invocation.name, "starting invocation");

            if let Err(e) = self.invoke(index, invocation, workspace).await {
                state = RunState::Failed(index);
                debug!(?state, tool = %invocation.name, "aborting remaining invocations");
                return Err(e);
            }
        }

        state = RunState::Completed;
        debug!(?state, count = invocations.len(), "all invocations succeeded");
        Ok(state)
    }

    async fn invoke(
        &self,
        index: usize,
        invocation: &ToolInvocation,
        workspace: &Path,
    ) -> Result<()> {
        let mut max_procs = self.max_procs;
        if is_breach_least_cost(&invocation.name) {
            // Unstable in WBT v2.4.0 when parallelized; see
            // whitebox-tools issues #407, #416 and #418.
            warn!("forcing BreachDepressionsLeastCost to use a single process");
            max_procs = 1;
        }

        let mut command = Command::new(&self.exe);
        command
            .arg(format!("--run={}", invocation.name))
            .arg(format!("--compress_rasters={}", self.compress_rasters))
            .arg(format!("--max_procs={}", max_procs))
            .args(&invocation.args)
            .current_dir(workspace);

        info!(tool = %invocation.name, index, "running WhiteboxTools");

        let output = command.output().await.map_err(|e| WbtError::Launch {
            exe: self.exe.clone(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(tool = %invocation.name, index, %stderr, "tool invocation failed");
            return Err(WbtError::Invocation {
                tool: invocation.name.clone(),
                index,
                code: output.status.code(),
                stderr,
            });
        }

        debug!(tool = %invocation.name, output = %stdout.trim(), "invocation output");
        Ok(())
    }
}

fn is_breach_least_cost(name: &str) -> bool {
    name == "BreachDepressionsLeastCost" || name == "breach_depressions_least_cost"
}
