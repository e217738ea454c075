// In-memory xAPI endpoint with offline queue

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ServiceError, ServiceResult};
use crate::network::NetworkStatus;
use crate::xapi::{PostStatementsOptions, TrackingService};

/// Statements stored locally until the next sync
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineStatements {
    pub context_id: u64,
    pub component: String,
    pub statements: String,
    pub course_id: u64,
    pub extra: Option<String>,
    pub site_id: String,
    pub queued_at: DateTime<Utc>,
}

/// Statements accepted by the "site"
#[derive(Debug, Clone, PartialEq)]
pub struct SentStatements {
    pub context_id: u64,
    pub component: String,
    pub statements: String,
    pub site_id: String,
}

#[derive(Default)]
struct TrackingState {
    queue: Vec<OfflineStatements>,
    sent: Vec<SentStatements>,
    next_error: Option<ServiceError>,
}

/// Tracking endpoint held in memory
pub struct InMemoryTrackingService {
    network: Arc<dyn NetworkStatus>,
    state: Mutex<TrackingState>,
}

impl InMemoryTrackingService {
    pub fn new(network: Arc<dyn NetworkStatus>) -> Self {
        Self {
            network,
            state: Mutex::new(TrackingState::default()),
        }
    }

    /// Make the next online submission fail with `error`
    pub fn fail_next_post(&self, error: ServiceError) {
        self.lock().next_error = Some(error);
    }

    /// Statements that reached the site
    pub fn sent(&self) -> Vec<SentStatements> {
        self.lock().sent.clone()
    }

    /// Statements waiting for a sync
    pub fn queued(&self) -> Vec<OfflineStatements> {
        self.lock().queue.clone()
    }

    /// Send every queued statement of a context. Returns how many batches were sent.
    pub fn flush_context(&self, context_id: u64, site_id: &str) -> ServiceResult<usize> {
        if !self.network.is_online() {
            return Err(ServiceError::network("Device is offline"));
        }

        let mut state = self.lock();
        let (flushed, kept): (Vec<_>, Vec<_>) = state
            .queue
            .drain(..)
            .partition(|entry| entry.context_id == context_id && entry.site_id == site_id);
        state.queue = kept;

        let count = flushed.len();
        state.sent.extend(flushed.into_iter().map(|entry| SentStatements {
            context_id: entry.context_id,
            component: entry.component,
            statements: entry.statements,
            site_id: entry.site_id,
        }));

        Ok(count)
    }

    fn lock(&self) -> MutexGuard<'_, TrackingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, context_id: u64, component: &str, statements: &str, options: PostStatementsOptions) {
        log::debug!("Storing xAPI statements for context {} offline", context_id);

        self.lock().queue.push(OfflineStatements {
            context_id,
            component: component.to_string(),
            statements: statements.to_string(),
            course_id: options.course_id,
            extra: options.extra,
            site_id: options.site_id,
            queued_at: Utc::now(),
        });
    }
}

#[async_trait]
impl TrackingService for InMemoryTrackingService {
    async fn post_statements(
        &self,
        context_id: u64,
        component: &str,
        statements_json: &str,
        options: PostStatementsOptions,
    ) -> ServiceResult<bool> {
        if options.offline || !self.network.is_online() {
            self.enqueue(context_id, component, statements_json, options);
            return Ok(false);
        }

        let next_error = self.lock().next_error.take();
        match next_error {
            // Connection problems keep the statements for later, site errors are final
            Some(error) if error.is_network() => {
                self.enqueue(context_id, component, statements_json, options);
                Ok(false)
            }
            Some(error) => Err(error),
            None => {
                self.lock().sent.push(SentStatements {
                    context_id,
                    component: component.to_string(),
                    statements: statements_json.to_string(),
                    site_id: options.site_id,
                });
                Ok(true)
            }
        }
    }

    async fn offline_statements_exist(&self, context_id: u64, site_id: &str) -> ServiceResult<bool> {
        Ok(self
            .lock()
            .queue
            .iter()
            .any(|entry| entry.context_id == context_id && entry.site_id == site_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SharedNetworkStatus;

    fn options(offline: bool) -> PostStatementsOptions {
        PostStatementsOptions {
            offline,
            course_id: 2,
            extra: Some("Quiz".into()),
            site_id: "s1".into(),
        }
    }

    #[tokio::test]
    async fn test_online_post_is_sent() {
        let tracking = InMemoryTrackingService::new(Arc::new(SharedNetworkStatus::new(true, true)));

        let sent = tracking.post_statements(42, "mod_h5pactivity", "[]", options(false)).await.unwrap();
        assert!(sent);
        assert_eq!(tracking.sent().len(), 1);
        assert!(!tracking.offline_statements_exist(42, "s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_hint_queues_statements() {
        let tracking = InMemoryTrackingService::new(Arc::new(SharedNetworkStatus::new(true, true)));

        let sent = tracking.post_statements(42, "mod_h5pactivity", "[]", options(true)).await.unwrap();
        assert!(!sent);
        assert!(tracking.offline_statements_exist(42, "s1").await.unwrap());
        assert!(!tracking.offline_statements_exist(43, "s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_network_failure_queues_and_site_error_fails() {
        let tracking = InMemoryTrackingService::new(Arc::new(SharedNetworkStatus::new(true, true)));

        tracking.fail_next_post(ServiceError::network("timeout"));
        assert!(!tracking.post_statements(42, "c", "[]", options(false)).await.unwrap());
        assert_eq!(tracking.queued().len(), 1);

        tracking.fail_next_post(ServiceError::remote("invalidxapi", "Invalid statement"));
        assert!(tracking.post_statements(42, "c", "[]", options(false)).await.is_err());
        assert_eq!(tracking.queued().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_context() {
        let network = Arc::new(SharedNetworkStatus::new(false, false));
        let tracking = InMemoryTrackingService::new(network.clone());

        tracking.post_statements(42, "c", "[1]", options(false)).await.unwrap();
        tracking.post_statements(7, "c", "[2]", options(false)).await.unwrap();
        assert!(tracking.flush_context(42, "s1").is_err());

        network.set_online(true);
        assert_eq!(tracking.flush_context(42, "s1").unwrap(), 1);
        assert_eq!(tracking.queued().len(), 1);
        assert_eq!(tracking.sent()[0].statements, "[1]");
    }
}
