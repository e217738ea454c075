// H5P Activity Error Types

use thiserror::Error;

use crate::error::ServiceError;

pub type ActivityResult<T> = std::result::Result<T, ActivityError>;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("No activity loaded")]
    NotLoaded,

    #[error("The package is already being downloaded")]
    DownloadInProgress,

    #[error("Cannot serialize statements: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActivityError {
    /// Check if the user cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ActivityError::Service(error) if error.is_cancelled())
    }
}
