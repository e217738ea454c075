//! Application shell
//!
//! Root wiring of the app: reacts to session and site events, handles URLs
//! the app is launched with, watches pages loaded in the in-app browser,
//! shows the connectivity notice and decides when the back button closes
//! the app. Platform and login services stay behind the traits below.

pub mod app;
pub mod connectivity;
pub mod error;
pub mod urls;

use async_trait::async_trait;

use crate::error::{ServiceError, ServiceResult};

pub use app::{AppShell, ShellServices};
pub use connectivity::{ConnectivityNotice, ConnectivityTracker};
pub use error::{ShellError, ShellResult};
pub use urls::{InAppUrlAction, classify_in_app_url, get_url_protocol};

/// Path prefix of the main menu, which handles back navigation on its own
pub const MAIN_MENU_PATH: &str = "/main/";
/// Page listing the stored sites
pub const SITES_PATH: &str = "/login/sites";
/// Profile edition page opened when the user isn't fully set up
pub const USER_EDIT_PATH: &str = "/user/edit.php";

/// Native platform operations
pub trait Platform: Send + Sync {
    fn is_android(&self) -> bool;

    fn close_app(&self);

    /// Open a URL in the system browser
    fn open_in_browser(&self, url: &str);

    /// Load a URL in the in-app browser
    fn open_in_app(&self, url: &str);

    fn close_in_app_browser(&self);
}

/// Handler of the app's own URL scheme
#[async_trait]
pub trait CustomUrlSchemes: Send + Sync {
    fn is_custom_url(&self, url: &str) -> bool;

    async fn handle_custom_url(&self, url: &str) -> ServiceResult<()>;

    /// Report an error raised while handling a custom URL
    fn treat_handle_error(&self, error: &ServiceError);
}

/// Login flows triggered by session events
#[async_trait]
pub trait LoginHelper: Send + Sync {
    async fn session_expired(&self, site_id: Option<&str>) -> ServiceResult<()>;

    async fn password_change_forced(&self, site_id: &str) -> ServiceResult<()>;

    /// Open a site page in the in-app browser so the user can fix their account
    async fn open_in_app_for_edit(&self, site_id: &str, path: &str, alert_key: &str) -> ServiceResult<()>;

    async fn site_policy_not_agreed(&self, site_id: Option<&str>) -> ServiceResult<()>;

    /// Whether a login started in the browser is still pending
    fn is_waiting_for_browser(&self) -> bool;

    fn stop_waiting_for_browser(&self);

    /// Log out if the pending browser login left the session unusable
    async fn check_logout(&self) -> ServiceResult<()>;
}

/// Site-provided language strings
pub trait LangService: Send + Sync {
    fn clear_custom_strings(&self);

    /// Load the custom strings of the current site
    fn load_custom_strings(&self);
}

/// Stored sites
pub trait Sites: Send + Sync {
    fn current_site_id(&self) -> Option<String>;
}
