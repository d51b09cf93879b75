//! TOML run configuration for the CLI front-end
//!
//! Maps a configuration file onto the core entry point's inputs. Tools are
//! an array of tables so their order in the file is their execution order:
//!
//! ```toml
//! src_dir = "input"
//! save_dir = "results"
//! files_to_save = ["fdir.tif"]
//!
//! [[tools]]
//! name = "BreachDepressions"
//! args = ["-i=dem.tif", "--fill_pits", "-o=dem_corr.tif"]
//!
//! [[tools]]
//! name = "D8Pointer"
//! args = ["-i=dem_corr.tif", "-o=fdir.tif"]
//! ```

use crate::errors::{Result, WbtError};
use crate::orchestrator::RunOptions;
use crate::runner::ToolInvocation;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One `[[tools]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub src_dir: PathBuf,
    pub tools: Vec<ToolEntry>,
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default)]
    pub files_to_save: Option<Vec<String>>,
    #[serde(default = "default_wbt_root")]
    pub wbt_root: PathBuf,
    #[serde(default)]
    pub compress_rasters: bool,
    #[serde(default = "default_max_procs")]
    pub max_procs: i32,
    #[serde(default)]
    pub refresh_download: bool,
    #[serde(default)]
    pub zip_path: Option<PathBuf>,
    #[serde(default)]
    pub verbose: bool,
}

fn default_wbt_root() -> PathBuf {
    PathBuf::from("WBT")
}

fn default_max_procs() -> i32 {
    -1
}

impl RunConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WbtError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: RunConfig = toml::from_str(&raw)
            .map_err(|e| WbtError::Config(format!("invalid TOML in {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tools.is_empty() {
            return Err(WbtError::Config(
                "the configuration must define at least one [[tools]] entry".to_string(),
            ));
        }
        if self.src_dir.as_os_str().is_empty() {
            return Err(WbtError::Config("`src_dir` must not be empty".to_string()));
        }
        Ok(())
    }

    /// Ordered invocation list for the tool runner
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.tools
            .iter()
            .map(|entry| ToolInvocation::new(entry.name.clone(), entry.args.clone()))
            .collect()
    }

    /// Core run options derived from this configuration
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            save_dir: self.save_dir.clone(),
            files_to_save: self.files_to_save.clone(),
            wbt_root: self.wbt_root.clone(),
            compress_rasters: self.compress_rasters,
            max_procs: self.max_procs,
            refresh_download: self.refresh_download,
            zip_path: self.zip_path.clone(),
            ..RunOptions::default()
        }
    }
}
