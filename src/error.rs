// Collaborator Error Types

use thiserror::Error;

/// Result type returned by every collaborator service
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors reported by the services the activity and shell components talk to
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The device has no connectivity or the request could not reach the site
    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    /// The user dismissed a prompt
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The site answered with an error
    #[error("Site error [{code}]: {message}")]
    RemoteError { code: String, message: String },

    /// Requested record is not known to the service
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Local storage (file pool, offline queue) failed
    #[error("Storage error: {operation} - {reason}")]
    StorageError { operation: String, reason: String },

    /// Download or extraction of a file failed
    #[error("Download failed for {url}: {reason}")]
    DownloadError { url: String, reason: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ServiceError {
    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
        }
    }

    /// Create a remote (site) error
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a storage error
    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DownloadError {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Check if the user cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }

    /// Check if the error is caused by missing connectivity
    pub fn is_network(&self) -> bool {
        matches!(self, ServiceError::NetworkError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ServiceError::Cancelled.is_cancelled());
        assert!(!ServiceError::Cancelled.is_network());
        assert!(ServiceError::network("offline").is_network());
        assert!(!ServiceError::remote("invalidrecord", "Invalid record").is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let error = ServiceError::download("https://school.test/file.h5p", "unzip failed");
        assert_eq!(
            error.to_string(),
            "Download failed for https://school.test/file.h5p: unzip failed"
        );
    }
}
