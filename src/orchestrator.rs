//! Top-level orchestration of WhiteboxTools pipelines
//!
//! `whitebox_tools` is the library entry point: provision the executable,
//! stage inputs into a fresh workspace, run every invocation in order,
//! collect the requested outputs and tear the workspace down on every exit
//! path. Also exposes `list_tools` / `tool_parameters` introspection over
//! the provisioned executable.

use crate::collect::collect;
use crate::errors::{Result, WbtError};
use crate::provision::{ExecutableBundle, ProvisionOptions};
use crate::runner::{ToolInvocation, ToolRunner};
use crate::workspace::WorkspaceSession;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// Options for one orchestration call
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Where selected outputs land; defaults to `src_dir`
    pub save_dir: Option<PathBuf>,
    /// Bare output filenames to keep; `None` keeps everything produced
    pub files_to_save: Option<Vec<String>>,
    /// Directory the executable bundle is installed under
    pub wbt_root: PathBuf,
    /// Passed to every tool as `--compress_rasters=`
    pub compress_rasters: bool,
    /// Passed to every tool as `--max_procs=`; -1 means all cores
    pub max_procs: i32,
    /// Force a fresh bundle download even when one is installed
    pub refresh_download: bool,
    /// Keep the downloaded archive at this path for reuse
    pub zip_path: Option<PathBuf>,
    /// Provisioning attempts before giving up
    pub max_attempts: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            save_dir: None,
            files_to_save: None,
            wbt_root: PathBuf::from("WBT"),
            compress_rasters: false,
            max_procs: -1,
            refresh_download: false,
            zip_path: None,
            max_attempts: 2,
        }
    }
}

impl RunOptions {
    fn provision_options(&self) -> ProvisionOptions {
        ProvisionOptions {
            refresh_download: self.refresh_download,
            zip_path: self.zip_path.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

/// Run a WhiteboxTools pipeline and return the persisted output paths.
///
/// Invocations run strictly in the order given; the first failure aborts
/// the rest. If the executable itself fails to launch (a corrupted
/// installation rather than a tool error), the bundle is re-provisioned
/// with a forced download and the whole sequence retried exactly once in a
/// fresh workspace. The workspace is removed on every exit path.
pub async fn whitebox_tools(
    src_dir: impl AsRef<Path>,
    invocations: &[ToolInvocation],
    options: &RunOptions,
) -> Result<Vec<PathBuf>> {
    let src_dir = src_dir.as_ref();
    if !src_dir.is_dir() {
        return Err(WbtError::Config(format!(
            "source directory does not exist: {}",
            src_dir.display()
        )));
    }
    let save_dir = options
        .save_dir
        .clone()
        .unwrap_or_else(|| src_dir.to_path_buf());

    let mut provision_opts = options.provision_options();
    let mut bundle = ExecutableBundle::ensure(&options.wbt_root, &provision_opts).await?;

    let mut retried = false;
    loop {
        let workspace = WorkspaceSession::create(src_dir, None)?;
        info!(
            src_dir = %src_dir.display(),
            version = %bundle.version,
            tools = invocations.len(),
            "starting WhiteboxTools session"
        );

        let runner = ToolRunner::new(
            bundle.exe.clone(),
            options.compress_rasters,
            options.max_procs,
        );
        match runner.run(invocations, workspace.path()).await {
            Ok(_) => {
                let persisted = collect(
                    workspace.path(),
                    options.files_to_save.as_deref(),
                    &save_dir,
                    workspace.staged(),
                )?;
                info!(
                    save_dir = %save_dir.display(),
                    outputs = persisted.len(),
                    "WhiteboxTools session completed"
                );
                return Ok(persisted);
            }
            Err(e) if e.is_launch_failure() && !retried => {
                // Installation-corruption heuristic: only spawn-level
                // failures warrant a re-download, never tool exits.
                warn!("executable failed to launch, re-provisioning once: {}", e);
                retried = true;
                drop(workspace);
                provision_opts.refresh_download = true;
                bundle = ExecutableBundle::ensure(&options.wbt_root, &provision_opts).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Available tool names mapped to their one-line descriptions, in the
/// order the executable reports them.
pub async fn list_tools(wbt_root: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let stdout = run_wbt_command(wbt_root.as_ref(), "--listtools").await?;
    let tools = stdout
        .lines()
        .skip(1) // header line with the tool count
        .filter_map(|line| {
            let (name, description) = line.split_once(':')?;
            Some((name.trim().to_string(), description.trim().to_string()))
        })
        .collect();
    Ok(tools)
}

/// Parameter descriptors for one tool, as reported by the executable.
pub async fn tool_parameters(
    tool_name: &str,
    wbt_root: impl AsRef<Path>,
) -> Result<Vec<serde_json::Value>> {
    let stdout = run_wbt_command(
        wbt_root.as_ref(),
        &format!("--toolparameters={}", tool_name),
    )
    .await?;
    let parsed: serde_json::Value = serde_json::from_str(&stdout)?;
    let parameters = parsed
        .get("parameters")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();
    Ok(parameters)
}

async fn run_wbt_command(wbt_root: &Path, arg: &str) -> Result<String> {
    let bundle = ExecutableBundle::ensure(wbt_root, &ProvisionOptions::default()).await?;
    let output = Command::new(&bundle.exe)
        .arg(arg)
        .output()
        .await
        .map_err(|e| WbtError::Launch {
            exe: bundle.exe.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(WbtError::Invocation {
            tool: arg.to_string(),
            index: 0,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert_eq!(options.wbt_root, PathBuf::from("WBT"));
        assert_eq!(options.max_procs, -1);
        assert!(!options.compress_rasters);
        assert!(options.files_to_save.is_none());
    }

    #[tokio::test]
    async fn test_missing_src_dir_is_config_error() {
        let err = whitebox_tools(
            "/definitely/not/a/real/dir",
            &[ToolInvocation::new("D8Pointer", ["-o=fdir.tif"])],
            &RunOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WbtError::Config(_)));
    }
}
