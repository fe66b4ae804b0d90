//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::PlatformError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of the engine's data directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn root(&self) -> Dir {
        Dir::new(self.base_dir.clone())
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        self.root().file("settings.json")
    }

    /// Get the metadata snapshot path
    pub fn metadata_file(&self) -> File {
        self.root().file("metadata.json")
    }

    /// Create the data directory
    pub async fn setup(&self) -> Result<(), PlatformError> {
        self.root().create().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/launchpad");

        #[cfg(not(target_os = "linux"))]
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".launchpad");

        Self::new(base_dir)
    }
}

#[cfg(not(target_os = "linux"))]
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}
