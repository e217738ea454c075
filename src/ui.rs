// User-facing collaborators
//
// Modals and navigation are owned by the hosting view layer; components only
// talk to them through these traits.

use async_trait::async_trait;

use crate::error::ServiceResult;

/// Non-blocking user feedback
#[async_trait]
pub trait Feedback: Send + Sync {
    /// Show an error message (or message key) in a modal
    fn show_error(&self, message: &str);

    /// Show `error`, or `default_message` when the error carries no text
    fn show_error_default(&self, error: &(dyn std::error::Error + Send + Sync), default_message: &str) {
        let text = error.to_string();
        if text.is_empty() {
            self.show_error(default_message);
        } else {
            self.show_error(&text);
        }
    }

    /// Ask the user to confirm a download of `size` bytes.
    ///
    /// Resolves to `Err(ServiceError::Cancelled)` when the user declines.
    async fn confirm_download(&self, size: u64) -> ServiceResult<()>;
}

/// Route navigation
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to an absolute app path, optionally resetting the history
    async fn navigate(&self, path: &str, reset: bool) -> ServiceResult<()>;

    /// Navigate to a path relative to the current site's main menu
    async fn navigate_to_site_path(&self, path: &str) -> ServiceResult<()>;

    /// Path currently displayed
    fn current_path(&self) -> String;
}
