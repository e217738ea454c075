// In-memory H5P activity services

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ServiceError, ServiceResult};
use crate::events::{AppEvent, EventBus, names};
use crate::h5pactivity::{
    AccessInfo, ActivityProvider, ActivityRecord, ActivitySync, DeployedFile, DisplayOptions,
    SyncResult,
};
use crate::xapi::InMemoryTrackingService;

#[derive(Default)]
struct Catalog {
    activities: HashMap<(u64, u64), ActivityRecord>,
    access: HashMap<u64, AccessInfo>,
    deployed: HashMap<u64, DeployedFile>,
    views: Vec<u64>,
    next_activity_error: Option<ServiceError>,
}

/// Activity web services answered from a fixed catalog
#[derive(Default)]
pub struct StaticActivityProvider {
    catalog: Mutex<Catalog>,
    data_invalidations: AtomicUsize,
    attempt_invalidations: AtomicUsize,
    fail_attempt_invalidation: AtomicBool,
}

impl StaticActivityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an activity with the user's capabilities and its deployed package
    pub fn add_activity(&self, activity: ActivityRecord, access: AccessInfo, deployed: Option<DeployedFile>) {
        let mut catalog = self.lock();
        catalog.access.insert(activity.id, access);
        if let Some(deployed) = deployed {
            catalog.deployed.insert(activity.id, deployed);
        }
        catalog
            .activities
            .insert((activity.course, activity.coursemodule), activity);
    }

    /// Make the next activity fetch fail
    pub fn fail_next_activity_fetch(&self, error: ServiceError) {
        self.lock().next_activity_error = Some(error);
    }

    /// Make attempt invalidation fail
    pub fn fail_attempt_invalidation(&self, fail: bool) {
        self.fail_attempt_invalidation.store(fail, Ordering::SeqCst);
    }

    /// Activity ids whose view was logged, in order
    pub fn views(&self) -> Vec<u64> {
        self.lock().views.clone()
    }

    pub fn data_invalidations(&self) -> usize {
        self.data_invalidations.load(Ordering::SeqCst)
    }

    pub fn attempt_invalidations(&self) -> usize {
        self.attempt_invalidations.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ActivityProvider for StaticActivityProvider {
    async fn get_activity(&self, course_id: u64, module_id: u64, _site_id: &str) -> ServiceResult<ActivityRecord> {
        let mut catalog = self.lock();
        if let Some(error) = catalog.next_activity_error.take() {
            return Err(error);
        }

        catalog
            .activities
            .get(&(course_id, module_id))
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("H5P activity in module {}", module_id)))
    }

    async fn get_access_information(
        &self,
        activity_id: u64,
        _module_id: u64,
        _site_id: &str,
    ) -> ServiceResult<AccessInfo> {
        Ok(self.lock().access.get(&activity_id).copied().unwrap_or_default())
    }

    async fn get_deployed_file(
        &self,
        activity: &ActivityRecord,
        _display_options: &DisplayOptions,
        _site_id: &str,
    ) -> ServiceResult<DeployedFile> {
        self.lock()
            .deployed
            .get(&activity.id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("Deployed file of activity {}", activity.id)))
    }

    async fn invalidate_activity_data(&self, _course_id: u64, _site_id: &str) -> ServiceResult<()> {
        self.data_invalidations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn invalidate_user_attempts(
        &self,
        _activity_id: u64,
        _user_id: Option<u64>,
        _site_id: &str,
    ) -> ServiceResult<()> {
        if self.fail_attempt_invalidation.load(Ordering::SeqCst) {
            return Err(ServiceError::storage("invalidate attempts", "cache locked"));
        }
        self.attempt_invalidations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn log_view(&self, activity_id: u64, _name: &str, _site_id: &str) -> ServiceResult<()> {
        self.lock().views.push(activity_id);
        Ok(())
    }
}

/// Sync that sends the statements queued in an [`InMemoryTrackingService`]
pub struct OfflineStatementSync {
    tracking: Arc<InMemoryTrackingService>,
    events: Option<Arc<dyn EventBus>>,
}

impl OfflineStatementSync {
    pub fn new(tracking: Arc<InMemoryTrackingService>) -> Self {
        Self { tracking, events: None }
    }

    /// Announce background syncs on an event bus
    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Background sync: flush the context and announce the result
    pub async fn auto_sync(&self, context_id: u64, site_id: &str) -> ServiceResult<SyncResult> {
        let result = self.sync_activity(context_id, site_id).await?;

        if let Some(events) = &self.events {
            events.trigger(
                names::H5P_ACTIVITY_AUTO_SYNCED,
                AppEvent::ActivityAutoSynced {
                    context_id,
                    warnings: result.warnings.clone(),
                },
            );
        }

        Ok(result)
    }
}

#[async_trait]
impl ActivitySync for OfflineStatementSync {
    async fn sync_activity(&self, context_id: u64, site_id: &str) -> ServiceResult<SyncResult> {
        let sent = self.tracking.flush_context(context_id, site_id)?;
        log::debug!("Synchronized {} statement batch(es) for context {}", sent, context_id);

        Ok(SyncResult {
            updated: sent > 0,
            warnings: Vec::new(),
        })
    }
}
