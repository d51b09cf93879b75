//! Platform detection for WhiteboxTools bundle selection
//!
//! Resolves the operating system family and architecture once per process
//! and caches the result; everything downstream (download URL, executable
//! name) derives from the cached descriptor.

use crate::errors::{Result, WbtError};
use once_cell::sync::OnceCell;

/// Download URL template: `WBT_<System>/WhiteboxTools_<suffix>.zip`
pub const BASE_URL: &str = "https://www.whiteboxgeo.com/WBT_{}/WhiteboxTools_{}.zip";

/// Operating system family as spelled in the upstream download URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum System {
    Windows,
    Darwin,
    Linux,
}

impl System {
    pub fn as_str(&self) -> &'static str {
        match self {
            System::Windows => "Windows",
            System::Darwin => "Darwin",
            System::Linux => "Linux",
        }
    }
}

/// Resolved platform descriptor, cached for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub system: System,
    /// Bundle variant suffix in the download URL
    pub suffix: &'static str,
    /// Executable filename inside the extracted bundle
    pub exe_name: &'static str,
}

impl PlatformDescriptor {
    /// Resolve the descriptor for the current platform. The first call
    /// performs detection; later calls return the cached value.
    pub fn current() -> Result<&'static PlatformDescriptor> {
        static PLATFORM: OnceCell<PlatformDescriptor> = OnceCell::new();
        PLATFORM.get_or_try_init(detect)
    }

    /// Full download URL for this platform's bundle
    pub fn download_url(&self) -> String {
        BASE_URL
            .replacen("{}", self.system.as_str(), 1)
            .replacen("{}", self.suffix, 1)
    }
}

fn detect() -> Result<PlatformDescriptor> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    let (system, suffix) = match os {
        "windows" => (System::Windows, "win_amd64"),
        "macos" => {
            if arch == "aarch64" {
                (System::Darwin, "darwin_m_series")
            } else {
                (System::Darwin, "darwin_amd64")
            }
        }
        "linux" => {
            if cfg!(target_env = "musl") {
                (System::Linux, "linux_musl")
            } else {
                (System::Linux, "linux_amd64")
            }
        }
        _ => {
            return Err(WbtError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
    };

    let exe_name = match system {
        System::Windows => "whitebox_tools.exe",
        _ => "whitebox_tools",
    };

    Ok(PlatformDescriptor {
        system,
        suffix,
        exe_name,
    })
}
