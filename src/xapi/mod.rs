//! xAPI tracking
//!
//! Statements produced by embedded H5P packages are delivered to the app with
//! `postMessage`, authenticated against the activity being displayed and sent
//! to the site, or queued locally while offline.

pub mod auth;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;
use crate::site::SiteContext;

pub use auth::{authenticate_post, has_ended, statement_object_id};
pub use memory::InMemoryTrackingService;

/// `environment` tag set by the app's H5P embed script
pub const MESSAGE_ENVIRONMENT: &str = "moodleapp";
/// `context` tag for H5P messages
pub const MESSAGE_CONTEXT: &str = "h5p";
/// `action` tag for statement submissions
pub const MESSAGE_ACTION: &str = "xapi_post_statement";

/// Statement submission message posted by an embedded package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XapiPostMessage {
    pub environment: String,
    pub context: String,
    pub action: String,
    #[serde(default)]
    pub component: String,
    pub statements: Vec<serde_json::Value>,
}

/// Options for [`TrackingService::post_statements`]
#[derive(Debug, Clone, PartialEq)]
pub struct PostStatementsOptions {
    /// Store the statements locally instead of sending them
    pub offline: bool,
    pub course_id: u64,
    /// Extra info stored with offline statements, usually the activity name
    pub extra: Option<String>,
    pub site_id: String,
}

/// Remote xAPI endpoint with an offline queue
#[async_trait]
pub trait TrackingService: Send + Sync {
    /// Whether the site accepts statements at all
    fn can_post_statements_in_site(&self, site: &SiteContext) -> bool {
        site.can_post_statements
    }

    /// Send statements. Resolves to `true` when they reached the site and
    /// `false` when they were queued for a later sync.
    async fn post_statements(
        &self,
        context_id: u64,
        component: &str,
        statements_json: &str,
        options: PostStatementsOptions,
    ) -> ServiceResult<bool>;

    /// Whether statements for this context are waiting to be synced
    async fn offline_statements_exist(&self, context_id: u64, site_id: &str) -> ServiceResult<bool>;
}
