//! Output collection from a finished workspace
//!
//! Moves the outputs a caller asked for (or everything produced, when no
//! selection was given) out of the workspace into a durable destination,
//! expanding shapefile sidecar groups and overwriting any same-named file
//! already at the destination. Whatever is left behind disappears with the
//! workspace itself.

use crate::errors::{Result, WbtError};
use crate::workspace::expand_selection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persist selected workspace files into `save_dir`.
///
/// `staged` is the set of filenames that were staged as inputs; with no
/// selection, the produced set is every workspace file outside it. With a
/// selection, every expanded name must exist in the workspace or the call
/// fails with [`WbtError::Collection`] before anything is moved.
pub fn collect(
    workspace: &Path,
    selection: Option<&[String]>,
    save_dir: &Path,
    staged: &HashSet<String>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(save_dir)?;

    let names = match selection {
        Some(names) => {
            let expanded = expand_selection(names);
            let missing: Vec<String> = expanded
                .iter()
                .filter(|name| !workspace.join(name.as_str()).is_file())
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(WbtError::Collection { missing });
            }
            expanded
        }
        None => {
            let mut produced = Vec::new();
            for entry in std::fs::read_dir(workspace)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if !staged.contains(&name) {
                    produced.push(name);
                }
            }
            produced.sort();
            produced
        }
    };

    let mut persisted = Vec::with_capacity(names.len());
    for name in &names {
        let source = workspace.join(name);
        let dest = save_dir.join(name);
        // Forced overwrite: a stale file at the destination must not make
        // the move fail.
        if dest.exists() {
            let _ = std::fs::remove_file(&dest);
        }
        move_file(&source, &dest)?;
        debug!(file = %name, dest = %dest.display(), "persisted output");
        persisted.push(dest);
    }

    info!(count = persisted.len(), save_dir = %save_dir.display(), "outputs collected");
    Ok(persisted)
}

/// Rename when possible, falling back to copy+delete for cross-device
/// moves (workspace and save_dir may live on different filesystems).
fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if std::fs::rename(source, dest).is_err() {
        std::fs::copy(source, dest)?;
        std::fs::remove_file(source)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), file).unwrap();
        }
        dir
    }

    fn staged(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_selection_moves_exactly_named_files() {
        let ws = workspace_with(&["dem.tif", "dem_corr.tif", "fdir.tif"]);
        let save = tempfile::tempdir().unwrap();

        let selection = vec!["fdir.tif".to_string()];
        let persisted = collect(
            ws.path(),
            Some(&selection),
            save.path(),
            &staged(&["dem.tif"]),
        )
        .unwrap();

        assert_eq!(persisted, vec![save.path().join("fdir.tif")]);
        assert!(save.path().join("fdir.tif").is_file());
        assert!(!save.path().join("dem_corr.tif").exists());
        assert!(!ws.path().join("fdir.tif").exists(), "moved, not copied");
    }

    #[test]
    fn test_default_selection_excludes_staged_inputs() {
        let ws = workspace_with(&["dem.tif", "dem_corr.tif", "fdir.tif"]);
        let save = tempfile::tempdir().unwrap();

        let persisted = collect(ws.path(), None, save.path(), &staged(&["dem.tif"])).unwrap();

        assert_eq!(persisted.len(), 2);
        assert!(save.path().join("dem_corr.tif").is_file());
        assert!(save.path().join("fdir.tif").is_file());
        assert!(!save.path().join("dem.tif").exists());
    }

    #[test]
    fn test_shapefile_selection_brings_sidecars() {
        let ws = workspace_with(&["basins.shp", "basins.dbf", "basins.prj", "basins.shx"]);
        let save = tempfile::tempdir().unwrap();

        let selection = vec!["basins.shp".to_string()];
        let persisted = collect(ws.path(), Some(&selection), save.path(), &staged(&[])).unwrap();

        assert_eq!(persisted.len(), 4);
        for ext in ["shp", "dbf", "prj", "shx"] {
            assert!(save.path().join(format!("basins.{}", ext)).is_file());
        }
    }

    #[test]
    fn test_missing_output_is_fatal_before_any_move() {
        let ws = workspace_with(&["fdir.tif"]);
        let save = tempfile::tempdir().unwrap();

        let selection = vec!["fdir.tif".to_string(), "never.tif".to_string()];
        let err = collect(ws.path(), Some(&selection), save.path(), &staged(&[])).unwrap_err();

        match err {
            WbtError::Collection { missing } => assert_eq!(missing, vec!["never.tif"]),
            other => panic!("expected collection error, got {:?}", other),
        }
        // Nothing was moved.
        assert!(ws.path().join("fdir.tif").is_file());
        assert!(!save.path().join("fdir.tif").exists());
    }

    #[test]
    fn test_overwrites_existing_destination() {
        let ws = workspace_with(&["fdir.tif"]);
        let save = tempfile::tempdir().unwrap();
        std::fs::write(save.path().join("fdir.tif"), "stale").unwrap();

        let selection = vec!["fdir.tif".to_string()];
        collect(ws.path(), Some(&selection), save.path(), &staged(&[])).unwrap();

        let contents = std::fs::read_to_string(save.path().join("fdir.tif")).unwrap();
        assert_eq!(contents, "fdir.tif");
    }
}
