//! Application event bus
//!
//! Named, in-process publish/subscribe used by the activity controller and the
//! application shell. Subscriptions are explicit handles so every component can
//! release exactly what it registered.

pub mod bus;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub use bus::InMemoryEventBus;

/// Unique identifier for a registered listener
pub type SubscriptionId = Uuid;

/// Listener invoked synchronously for every event triggered under its name
pub type EventListener = Arc<dyn Fn(&AppEvent) + Send + Sync>;

/// Well-known event names
pub mod names {
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const SITE_UPDATED: &str = "site_updated";
    pub const SITE_ADDED: &str = "site_added";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const PASSWORD_CHANGE_FORCED: &str = "password_change_forced";
    pub const USER_NOT_FULLY_SETUP: &str = "user_not_fully_setup";
    pub const SITE_POLICY_NOT_AGREED: &str = "site_policy_not_agreed";
    pub const IAB_LOAD_START: &str = "inappbrowser_load_start";
    pub const IAB_EXIT: &str = "inappbrowser_exit";
    pub const APP_RESUMED: &str = "app_resumed";
    pub const APP_LAUNCHED_URL: &str = "app_launched_url";
    pub const NETWORK_CHANGED: &str = "network_changed";
    /// Cross-frame `postMessage` deliveries
    pub const FRAME_MESSAGE: &str = "frame_message";
    pub const H5P_ACTIVITY_AUTO_SYNCED: &str = "addon_mod_h5pactivity_autom_synced";
    pub const H5P_ACTIVITY_FINISHED: &str = "addon_mod_h5pactivity_finished";
}

/// Payloads carried by the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    FileStateChanged { site_id: String, url: String },
    Login { site_id: Option<String> },
    Logout,
    SiteUpdated { site_id: String, release: Option<String> },
    SiteAdded { site_id: String, release: Option<String> },
    SessionExpired { site_id: Option<String> },
    PasswordChangeForced { site_id: String },
    UserNotFullySetup { site_id: String },
    SitePolicyNotAgreed { site_id: Option<String> },
    InAppBrowserLoadStart { url: String },
    InAppBrowserExit,
    AppResumed,
    AppLaunchedUrl { url: String },
    NetworkChanged { online: bool },
    FrameMessage(serde_json::Value),
    ActivityAutoSynced { context_id: u64, warnings: Vec<String> },
    ActivityFinished { activity_id: u64 },
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
}

/// Named publish/subscribe bus
pub trait EventBus: Send + Sync {
    /// Register a listener for an event name
    fn on(&self, name: &str, listener: EventListener) -> Subscription;

    /// Release a listener. Returns false when it was already released.
    fn off(&self, subscription: &Subscription) -> bool;

    /// Deliver an event to every listener registered under `name`
    fn trigger(&self, name: &str, event: AppEvent);
}

/// Name of the event fired when the state of a pooled file changes
pub fn file_event_name(site_id: &str, url: &str) -> String {
    format!("filepool_file_state:{}:{}", site_id, url)
}
