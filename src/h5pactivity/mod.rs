//! H5P Activity
//!
//! Entry page logic for H5P activities: fetches the activity, keeps its
//! deployed package in the file pool, plays it and forwards the xAPI
//! statements the package emits.

pub mod controller;
pub mod display;
pub mod error;
pub mod memory;
pub mod policy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

pub use controller::{ActivityLifecycle, ActivityServices, ActivityViewState, H5PActivityController};
pub use display::{DisplayOptions, online_player_url};
pub use error::{ActivityError, ActivityResult};
pub use policy::{ContentAction, DecisionInput, FileStatePosture, StateMessage, decide_content_action};

/// Component name used for files and logs
pub const COMPONENT: &str = "mod_h5pactivity";
/// Component name sent with tracked statements
pub const TRACK_COMPONENT: &str = "mod_h5pactivity";
/// Route prefix of the activity pages
pub const PAGE_NAME: &str = "mod_h5pactivity";

/// File attached to the activity (the uploaded package)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFile {
    pub filename: String,
    pub fileurl: String,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub timemodified: i64,
}

/// Activity instance as returned by the site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub course: u64,
    /// Course module id
    pub coursemodule: u64,
    pub name: String,
    #[serde(rename = "intro", default)]
    pub description: String,
    /// Tracking context id, used to match xAPI statements
    pub context: u64,
    /// Disabled display options, see [`DisplayOptions::decode`]
    #[serde(rename = "displayoptions", default)]
    pub display_options: u32,
    #[serde(rename = "enabletracking", default)]
    pub enable_tracking: bool,
    #[serde(default)]
    pub package: Vec<PackageFile>,
}

/// Capabilities of the current user in the activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessInfo {
    #[serde(rename = "cansubmit")]
    pub can_submit: bool,
    #[serde(rename = "canreviewattempts")]
    pub can_review_attempts: bool,
}

/// Package compiled by the site and ready to be played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedFile {
    pub filename: Option<String>,
    pub fileurl: String,
    pub filesize: Option<u64>,
    pub timemodified: i64,
}

impl DeployedFile {
    /// URL used to download and identify the file in the pool
    pub fn file_url(&self) -> &str {
        &self.fileurl
    }
}

/// Result of reconciling offline statements with the site
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub updated: bool,
    pub warnings: Vec<String>,
}

/// Site web services for H5P activities
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    /// Get the activity shown by a course module
    async fn get_activity(&self, course_id: u64, module_id: u64, site_id: &str)
        -> ServiceResult<ActivityRecord>;

    /// Get what the current user can do in the activity
    async fn get_access_information(&self, activity_id: u64, module_id: u64, site_id: &str)
        -> ServiceResult<AccessInfo>;

    /// Get the deployed package for the given display options
    async fn get_deployed_file(
        &self,
        activity: &ActivityRecord,
        display_options: &DisplayOptions,
        site_id: &str,
    ) -> ServiceResult<DeployedFile>;

    /// Drop cached activity data of a course
    async fn invalidate_activity_data(&self, course_id: u64, site_id: &str) -> ServiceResult<()>;

    /// Drop cached attempts of a user (all users when `None`)
    async fn invalidate_user_attempts(&self, activity_id: u64, user_id: Option<u64>, site_id: &str)
        -> ServiceResult<()>;

    /// Record that the activity was viewed
    async fn log_view(&self, activity_id: u64, name: &str, site_id: &str) -> ServiceResult<()>;
}

/// Reconciles statements queued offline with the site
#[async_trait]
pub trait ActivitySync: Send + Sync {
    async fn sync_activity(&self, context_id: u64, site_id: &str) -> ServiceResult<SyncResult>;
}

/// Course completion bookkeeping
pub trait CompletionTracker: Send + Sync {
    /// Re-evaluate the completion status of a module after user activity
    fn check_completion(&self, course_id: u64, module_id: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_from_site_payload() {
        let payload = serde_json::json!({
            "id": 7,
            "course": 2,
            "coursemodule": 31,
            "name": "Drag the words",
            "intro": "<p>Practice</p>",
            "context": 120,
            "displayoptions": 15,
            "enabletracking": true,
            "package": [{
                "filename": "words.h5p",
                "fileurl": "https://school.test/pluginfile.php/120/mod_h5pactivity/package/0/words.h5p",
                "filesize": 2048,
                "timemodified": 1700000000
            }]
        });

        let activity: ActivityRecord = serde_json::from_value(payload).unwrap();
        assert_eq!(activity.description, "<p>Practice</p>");
        assert_eq!(activity.display_options, 15);
        assert!(activity.enable_tracking);
        assert_eq!(activity.package[0].filesize, Some(2048));
    }

    #[test]
    fn test_access_info_from_site_payload() {
        let access: AccessInfo =
            serde_json::from_str(r#"{"cansubmit": true, "canreviewattempts": false}"#).unwrap();
        assert!(access.can_submit);
        assert!(!access.can_review_attempts);
    }
}
