//! Ambient device context captured with every logged error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

/// Snapshot of the environment at the moment an error was handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub app_version: String,
    pub platform_version: String,
    pub device_class: String,
    pub available_memory_bytes: u64,
    pub available_storage_bytes: u64,
}

/// Source of ambient context. Swapped for a fixed source in tests.
pub trait ContextSource: Send + Sync {
    fn snapshot(&self) -> ErrorContext;
}

/// Reads live values from the operating system
pub struct SystemContext {
    storage_root: PathBuf,
}

impl SystemContext {
    /// `storage_root` selects the volume whose free space is reported
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    fn available_storage(&self) -> u64 {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| self.storage_root.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .unwrap_or(0)
    }
}

impl ContextSource for SystemContext {
    fn snapshot(&self) -> ErrorContext {
        let mut sys = System::new();
        sys.refresh_memory();

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());

        ErrorContext {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform_version: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            device_class: format!("{}/{}", std::env::consts::ARCH, host),
            available_memory_bytes: sys.available_memory(),
            available_storage_bytes: self.available_storage(),
        }
    }
}

/// Available memory in whole megabytes
pub fn available_memory_mb() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory() / (1024 * 1024)
}

/// Free space in bytes on the volume holding `path`
pub fn available_space_at(path: &Path) -> u64 {
    SystemContext::new(path).available_storage()
}

#[cfg(test)]
pub(crate) struct FixedContext;

#[cfg(test)]
impl ContextSource for FixedContext {
    fn snapshot(&self) -> ErrorContext {
        ErrorContext {
            app_version: "0.0.0-test".to_string(),
            platform_version: "TestOS 1.0".to_string(),
            device_class: "test".to_string(),
            available_memory_bytes: 8 * 1024 * 1024 * 1024,
            available_storage_bytes: 64 * 1024 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_context_reports_version() {
        let ctx = SystemContext::new(std::env::temp_dir()).snapshot();
        assert_eq!(ctx.app_version, env!("CARGO_PKG_VERSION"));
        assert!(ctx.device_class.starts_with(std::env::consts::ARCH));
    }
}
