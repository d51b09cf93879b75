//! Executable provisioning for WhiteboxTools
//!
//! Ensures the platform-specific WhiteboxTools bundle is installed under a
//! caller-chosen root:
//! - idempotent fast path when a verified executable already exists
//! - soft lock file so concurrent processes download at most once
//! - download -> extract -> verify cycle with retry on corruption
//!
//! Network failures propagate immediately; only corruption (bad archive,
//! executable that will not run) is retried.

use crate::errors::{Result, WbtError};
use crate::platform::PlatformDescriptor;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Soft lock filename guarding provisioning under a bundle root
pub const LOCK_FILE: &str = ".wbt_lock";

/// How long to wait between lock acquisition attempts
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options controlling the provisioning cycle
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Re-download even when a working executable is already installed
    pub refresh_download: bool,
    /// Keep the downloaded archive at this path instead of a scratch file
    /// that is deleted after extraction
    pub zip_path: Option<PathBuf>,
    /// Total attempts for the download-extract-verify cycle
    pub max_attempts: u32,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            refresh_download: false,
            zip_path: None,
            max_attempts: 2,
        }
    }
}

/// A provisioned WhiteboxTools installation
#[derive(Debug, Clone)]
pub struct ExecutableBundle {
    /// Directory the bundle was extracted into
    pub root: PathBuf,
    /// Full path to the `whitebox_tools` executable
    pub exe: PathBuf,
    /// Version string reported by `--version` ("unknown" if unparseable)
    pub version: String,
}

impl ExecutableBundle {
    /// Ensure the bundle is present and runnable under `root`.
    ///
    /// Returns without touching the network when a verified executable is
    /// already installed and no refresh was requested.
    pub async fn ensure(root: impl AsRef<Path>, opts: &ProvisionOptions) -> Result<Self> {
        let platform = PlatformDescriptor::current()?;
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        let exe = root.join(platform.exe_name);

        // Fast path: no lock, no network.
        if exe.exists() && !opts.refresh_download {
            match wbt_version(&exe).await {
                Ok(version) => {
                    debug!(exe = %exe.display(), %version, "using existing WhiteboxTools executable");
                    return Ok(Self { root, exe, version });
                }
                Err(e) => warn!("existing executable is invalid: {}", e),
            }
        }

        // Only one process provisions at a time.
        let _lock = ProvisionLock::acquire(root.join(LOCK_FILE)).await?;

        let client = reqwest::Client::new();
        let max_attempts = opts.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match Self::attempt(&client, &root, &exe, platform, opts).await? {
                Some(version) => return Ok(Self { root, exe, version }),
                None => warn!(
                    "provisioning attempt {}/{} failed, retrying",
                    attempt, max_attempts
                ),
            }
        }

        Err(WbtError::Provisioning {
            attempts: max_attempts,
        })
    }

    /// One download-extract-verify cycle. `Ok(None)` marks a retryable
    /// corruption failure; hard failures (network, unsupported platform)
    /// propagate as errors.
    async fn attempt(
        client: &reqwest::Client,
        root: &Path,
        exe: &Path,
        platform: &PlatformDescriptor,
        opts: &ProvisionOptions,
    ) -> Result<Option<String>> {
        // Another process may have finished while we waited on the lock.
        if exe.exists() && !opts.refresh_download {
            match wbt_version(exe).await {
                Ok(version) => return Ok(Some(version)),
                Err(e) => warn!("existing executable is invalid: {}", e),
            }
        }

        // Start from a clean root; the lock file stays.
        clear_dir_except(root, LOCK_FILE)?;

        let url = platform.download_url();
        let scratch = tempfile::Builder::new().prefix("wbt_").tempdir_in(".")?;

        let archive_name = url.rsplit('/').next().unwrap_or("WhiteboxTools.zip");
        let archive_path = match &opts.zip_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                path.with_extension("zip")
            }
            None => scratch.path().join(archive_name),
        };
        if opts.refresh_download && archive_path.exists() {
            std::fs::remove_file(&archive_path)?;
        }

        if !archive_path.exists() {
            info!("downloading WhiteboxTools from {}", url);
            download(client, &url, &archive_path).await?;
        }

        let installed = extract_bundle(&archive_path, root, scratch.path(), platform.exe_name);
        if let Err(e) = installed {
            warn!("extraction failed: {}", e);
            let _ = std::fs::remove_file(&archive_path);
            clear_dir_except(root, LOCK_FILE)?;
            return Ok(None);
        }

        match wbt_version(exe).await {
            Ok(version) => {
                info!(%version, root = %root.display(), "WhiteboxTools ready");
                Ok(Some(version))
            }
            Err(e) => {
                warn!("verification failed: {}", e);
                let _ = std::fs::remove_file(&archive_path);
                clear_dir_except(root, LOCK_FILE)?;
                Ok(None)
            }
        }
    }
}

/// Scoped soft lock: an exclusively created file removed on drop.
///
/// Matches the semantics of a soft file lock rather than an OS advisory
/// lock, so it also works on filesystems without flock support (NFS,
/// cluster scratch space).
pub struct ProvisionLock {
    path: PathBuf,
}

impl ProvisionLock {
    /// Block (polling) until the lock file can be created exclusively.
    pub async fn acquire(path: PathBuf) -> Result<Self> {
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    let _ = write!(file, "{}", std::process::id());
                    debug!(lock = %path.display(), "provisioning lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Stream the bundle archive to disk, with a progress bar when the size
/// is known up front.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let wrap = |source: reqwest::Error| WbtError::Download {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(wrap)?;
    let response = response.error_for_status().map_err(wrap)?;

    let progress = match response.content_length() {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template("{bytes}/{total_bytes} [{bar:40}] {bytes_per_sec}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(wrap)?;
        file.write_all(&chunk).await?;
        progress.inc(chunk.len() as u64);
    }
    file.flush().await?;
    progress.finish_and_clear();

    Ok(())
}

/// Unpack the archive into a scratch directory, locate the payload
/// directory containing the executable and install its contents under
/// `root`, flattening any `WhiteboxTools*/WBT` nesting.
fn extract_bundle(archive_path: &Path, root: &Path, scratch: &Path, exe_name: &str) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| WbtError::Archive(e.to_string()))?;

    let unpacked = scratch.join("unpacked");
    archive
        .extract(&unpacked)
        .map_err(|e| WbtError::Archive(e.to_string()))?;

    let payload = find_payload(&unpacked, exe_name, 3).ok_or_else(|| {
        WbtError::Archive(format!("archive does not contain `{}`", exe_name))
    })?;
    copy_tree(&payload, root)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let exe = root.join(exe_name);
        let mut perms = std::fs::metadata(&exe)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(&exe, perms)?;
    }

    info!("extracted WhiteboxTools to {}", root.display());
    Ok(())
}

/// Breadth-limited search for the directory holding the executable.
fn find_payload(dir: &Path, exe_name: &str, depth: u32) -> Option<PathBuf> {
    if dir.join(exe_name).is_file() {
        return Some(dir.to_path_buf());
    }
    if depth == 0 {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_payload(&path, exe_name, depth - 1) {
                return Some(found);
            }
        }
    }
    None
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn remove_path(path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Remove everything under `dir` except the named entry (the lock file).
fn clear_dir_except(dir: &Path, keep: &str) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy() == keep {
            continue;
        }
        remove_path(&entry.path(), entry.file_type()?.is_dir())?;
    }
    Ok(())
}

/// Run `<exe> --version` and parse the reported version.
///
/// A spawn failure or non-zero exit means the installation is unusable;
/// an unparseable banner from a successful run yields "unknown".
pub async fn wbt_version(exe: &Path) -> Result<String> {
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .await
        .map_err(|e| WbtError::Launch {
            exe: exe.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(WbtError::Launch {
            exe: exe.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_version(&stdout).unwrap_or_else(|| "unknown".to_string()))
}

fn parse_version(banner: &str) -> Option<String> {
    let rest = banner.split("WhiteboxTools v").nth(1)?;
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if version.is_empty() {
        None
    } else {
        Some(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("WhiteboxTools v2.4.0 by Dr. John B. Lindsay (c)"),
            Some("2.4.0".to_string())
        );
        assert_eq!(parse_version("whitebox?"), None);
        assert_eq!(parse_version("WhiteboxTools vNaN"), None);
    }

    #[test]
    fn test_clear_dir_except_keeps_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "1234").unwrap();
        std::fs::write(dir.path().join("whitebox_tools"), "bin").unwrap();
        std::fs::create_dir(dir.path().join("plugins")).unwrap();

        clear_dir_except(dir.path(), LOCK_FILE).unwrap();

        assert!(dir.path().join(LOCK_FILE).exists());
        assert!(!dir.path().join("whitebox_tools").exists());
        assert!(!dir.path().join("plugins").exists());
    }

    #[test]
    fn test_find_payload_nested() {
        let dir = tempfile::tempdir().unwrap();
        let wbt = dir.path().join("WhiteboxTools_linux_amd64").join("WBT");
        std::fs::create_dir_all(&wbt).unwrap();
        std::fs::write(wbt.join("whitebox_tools"), "bin").unwrap();

        let payload = find_payload(dir.path(), "whitebox_tools", 3).unwrap();
        assert_eq!(payload, wbt);
    }

    #[test]
    fn test_find_payload_flat() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whitebox_tools"), "bin").unwrap();

        let payload = find_payload(dir.path(), "whitebox_tools", 3).unwrap();
        assert_eq!(payload, dir.path());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(LOCK_FILE);

        let guard = ProvisionLock::acquire(lock_path.clone()).await.unwrap();
        assert!(lock_path.exists());

        // A second acquisition must not proceed while the guard is alive.
        let contender = tokio::spawn(ProvisionLock::acquire(lock_path.clone()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!contender.is_finished());

        drop(guard);
        let second = contender.await.unwrap().unwrap();
        assert!(lock_path.exists());
        drop(second);
        assert!(!lock_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_fast_path_uses_existing_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let platform = PlatformDescriptor::current().unwrap();
        let root = dir.path().join("WBT");
        std::fs::create_dir_all(&root).unwrap();
        let exe = root.join(platform.exe_name);
        std::fs::write(&exe, "#!/bin/sh\necho 'WhiteboxTools v2.4.0'\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        // No network is reachable from this fake root; an existing verified
        // executable must short-circuit the download entirely.
        let bundle = ExecutableBundle::ensure(&root, &ProvisionOptions::default())
            .await
            .unwrap();
        assert_eq!(bundle.version, "2.4.0");
        assert_eq!(bundle.exe, exe);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wbt_version_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("whitebox_tools");
        let err = wbt_version(&missing).await.unwrap_err();
        assert!(err.is_launch_failure());
    }
}
