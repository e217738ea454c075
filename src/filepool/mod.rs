//! File Pool
//!
//! Interface to the local file cache that stores downloaded site files, plus
//! the progress model shared by every download.

pub mod memory;
pub mod progress;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ServiceResult;

pub use memory::InMemoryFilePool;
pub use progress::{DownloadPhase, DownloadProgress, ProgressDisplay};

/// Progress callback function type
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Local state of a pooled file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    NotDownloaded,
    Outdated,
    Downloading,
    Downloaded,
}

impl FileState {
    /// All states, in lifecycle order
    pub const ALL: [FileState; 4] = [
        FileState::NotDownloaded,
        FileState::Outdated,
        FileState::Downloading,
        FileState::Downloaded,
    ];

    /// Whether the local copy is missing or stale
    pub fn needs_download(self) -> bool {
        matches!(self, FileState::NotDownloaded | FileState::Outdated)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::NotDownloaded => "not_downloaded",
            FileState::Outdated => "outdated",
            FileState::Downloading => "downloading",
            FileState::Downloaded => "downloaded",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FileState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_downloaded" => Ok(FileState::NotDownloaded),
            "outdated" => Ok(FileState::Outdated),
            "downloading" => Ok(FileState::Downloading),
            "downloaded" => Ok(FileState::Downloaded),
            other => Err(format!("Unknown file state: {}", other)),
        }
    }
}

/// Everything the pool needs to fetch and store a site file
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub site_id: String,
    pub url: String,
    /// Component that owns the file, used to link it for later cleanup
    pub component: String,
    pub component_id: u64,
    /// Remote modification time, used to detect stale copies
    pub timemodified: i64,
}

/// Local cache of site files
#[async_trait]
pub trait FileCacheService: Send + Sync {
    /// Get the local state of the file at `url`
    async fn get_file_state(&self, site_id: &str, url: &str, timemodified: i64)
        -> ServiceResult<FileState>;

    /// Download (or join an ongoing download of) a file, reporting progress
    async fn download_url(&self, request: DownloadRequest, on_progress: ProgressCallback)
        -> ServiceResult<()>;

    /// Whether a file of `size` bytes is small enough to download unprompted
    fn should_auto_download(&self, size: u64) -> bool;

    /// Event fired on the bus whenever the file state changes
    fn file_event_name(&self, site_id: &str, url: &str) -> String {
        crate::events::file_event_name(site_id, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        for state in FileState::ALL {
            assert_eq!(state.to_string().parse::<FileState>().unwrap(), state);
        }
        assert!("partial".parse::<FileState>().is_err());
    }

    #[test]
    fn test_needs_download() {
        assert!(FileState::NotDownloaded.needs_download());
        assert!(FileState::Outdated.needs_download());
        assert!(!FileState::Downloading.needs_download());
        assert!(!FileState::Downloaded.needs_download());
    }
}
