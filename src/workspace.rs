//! Ephemeral workspace management
//!
//! Each orchestration call runs inside its own uniquely named scratch
//! directory created under the current working directory (shared cluster
//! temp filesystems are unreliable, so the OS temp root is avoided).
//! Inputs are staged in, tools run with the workspace as their working
//! directory, and the whole tree is removed when the session drops, on
//! success, failure and panic alike.

use crate::errors::{Result, WbtError};
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

/// Auxiliary extensions that travel with a `.shp` vector dataset
pub const SHAPEFILE_SIDECARS: [&str; 3] = ["dbf", "prj", "shx"];

/// Sidecar filenames implied by `name`, or empty for formats without
/// companion files. Does not include `name` itself.
pub fn sidecar_names(name: &str) -> Vec<String> {
    match name.strip_suffix(".shp") {
        Some(stem) => SHAPEFILE_SIDECARS
            .iter()
            .map(|ext| format!("{}.{}", stem, ext))
            .collect(),
        None => Vec::new(),
    }
}

/// Expand a list of filenames with their sidecars, preserving order and
/// dropping duplicates.
pub fn expand_selection(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut expanded = Vec::new();
    for name in names {
        for member in std::iter::once(name.clone()).chain(sidecar_names(name)) {
            if seen.insert(member.clone()) {
                expanded.push(member);
            }
        }
    }
    expanded
}

/// One call's private scratch directory plus the record of what was
/// staged into it.
#[derive(Debug)]
pub struct WorkspaceSession {
    dir: TempDir,
    staged: HashSet<String>,
}

impl WorkspaceSession {
    /// Create a workspace under the current directory and stage inputs
    /// from `src_dir`.
    ///
    /// With an explicit input list, exactly those files (plus any existing
    /// shapefile siblings) are copied; every named file must exist or the
    /// whole staging step fails with [`WbtError::Staging`]. With no list,
    /// every regular file in `src_dir` is staged.
    pub fn create(src_dir: &Path, inputs: Option<&[String]>) -> Result<Self> {
        Self::create_in(Path::new("."), src_dir, inputs)
    }

    pub(crate) fn create_in(
        parent: &Path,
        src_dir: &Path,
        inputs: Option<&[String]>,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("wbt_ws_")
            .tempdir_in(parent)?;
        let mut session = Self {
            dir,
            staged: HashSet::new(),
        };

        match inputs {
            Some(names) => session.stage_named(src_dir, names)?,
            None => session.stage_all(src_dir)?,
        }

        info!(
            workspace = %session.path().display(),
            staged = session.staged.len(),
            "workspace ready"
        );
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Filenames staged as inputs; the collector uses this to tell
    /// produced outputs apart from inputs.
    pub fn staged(&self) -> &HashSet<String> {
        &self.staged
    }

    fn stage_named(&mut self, src_dir: &Path, names: &[String]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !src_dir.join(name.as_str()).is_file())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(WbtError::Staging { missing });
        }

        for name in expand_selection(names) {
            let source = src_dir.join(&name);
            // Sidecars implied by a .shp entry are staged opportunistically;
            // only explicitly named files were checked above.
            if source.is_file() {
                self.stage_file(&source, &name)?;
            }
        }
        Ok(())
    }

    fn stage_all(&mut self, src_dir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(src_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            self.stage_file(&entry.path(), &name)?;
        }
        Ok(())
    }

    fn stage_file(&mut self, source: &Path, name: &str) -> Result<()> {
        let dest = self.dir.path().join(name);
        // A source already inside the workspace would copy onto itself.
        if same_file(source, &dest) {
            self.staged.insert(name.to_string());
            return Ok(());
        }
        std::fs::copy(source, &dest)?;
        debug!(file = name, "staged input");
        self.staged.insert(name.to_string());
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
