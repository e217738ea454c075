// Application Shell Error Types

use thiserror::Error;

use crate::error::ServiceError;

pub type ShellResult<T> = std::result::Result<T, ShellError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShellError {
    /// A page tried to hand a login token to an external app scheme
    #[error("Invalid URL scheme: {scheme}")]
    InvalidUrlScheme { scheme: String },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ShellError {
    pub fn invalid_url_scheme(scheme: impl Into<String>) -> Self {
        Self::InvalidUrlScheme { scheme: scheme.into() }
    }

    pub fn is_invalid_url_scheme(&self) -> bool {
        matches!(self, ShellError::InvalidUrlScheme { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ShellError::invalid_url_scheme("otherapp");
        assert_eq!(error.to_string(), "Invalid URL scheme: otherapp");
        assert!(error.is_invalid_url_scheme());

        let error: ShellError = ServiceError::network("offline").into();
        assert!(!error.is_invalid_url_scheme());
    }
}
