// In-memory File Pool
//
// Keeps track of "remote" files and their local copies without touching disk.
// Used by the simulator binary and by tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DownloadThresholds;
use crate::error::{ServiceError, ServiceResult};
use crate::events::{AppEvent, EventBus};
use crate::filepool::{
    DownloadPhase, DownloadProgress, DownloadRequest, FileCacheService, FileState,
    ProgressCallback,
};
use crate::network::NetworkStatus;

type FileKey = (String, String);

/// File as published by the site
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub size: u64,
    /// Number of entries unpacked after download, `None` for plain files
    pub extracted_entries: Option<u64>,
}

#[derive(Default)]
struct PoolState {
    remote: HashMap<String, RemoteFile>,
    /// Local copies and the modification time they were fetched for
    stored: HashMap<FileKey, i64>,
    downloading: HashSet<FileKey>,
    failures: HashMap<String, String>,
}

/// File pool held entirely in memory
pub struct InMemoryFilePool {
    state: Mutex<PoolState>,
    download_calls: AtomicUsize,
    chunk_size: u64,
    thresholds: DownloadThresholds,
    network: Arc<dyn NetworkStatus>,
    events: Option<Arc<dyn EventBus>>,
}

impl InMemoryFilePool {
    pub fn new(thresholds: DownloadThresholds, network: Arc<dyn NetworkStatus>) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            download_calls: AtomicUsize::new(0),
            chunk_size: 64 * 1024,
            thresholds,
            network,
            events: None,
        }
    }

    /// Announce state changes on an event bus
    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Size of each progress step while "downloading"
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Publish a file that can be downloaded
    pub fn add_remote_file(&self, url: impl Into<String>, file: RemoteFile) {
        self.lock().remote.insert(url.into(), file);
    }

    /// Pretend a copy fetched for `timemodified` is already stored
    pub fn store_file(&self, site_id: &str, url: &str, timemodified: i64) {
        self.lock()
            .stored
            .insert((site_id.to_string(), url.to_string()), timemodified);
    }

    /// Pretend another component started downloading the file
    pub fn mark_downloading(&self, site_id: &str, url: &str) {
        self.lock()
            .downloading
            .insert((site_id.to_string(), url.to_string()));
    }

    /// Make the next download of `url` fail
    pub fn fail_next_download(&self, url: &str, reason: impl Into<String>) {
        self.lock().failures.insert(url.to_string(), reason.into());
    }

    /// Number of times `download_url` was called
    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, site_id: &str, url: &str) {
        if let Some(events) = &self.events {
            events.trigger(
                &self.file_event_name(site_id, url),
                AppEvent::FileStateChanged {
                    site_id: site_id.to_string(),
                    url: url.to_string(),
                },
            );
        }
    }
}

#[async_trait]
impl FileCacheService for InMemoryFilePool {
    async fn get_file_state(
        &self,
        site_id: &str,
        url: &str,
        timemodified: i64,
    ) -> ServiceResult<FileState> {
        let key = (site_id.to_string(), url.to_string());
        let state = self.lock();

        if state.downloading.contains(&key) {
            return Ok(FileState::Downloading);
        }

        Ok(match state.stored.get(&key) {
            None => FileState::NotDownloaded,
            Some(stored) if *stored < timemodified => FileState::Outdated,
            Some(_) => FileState::Downloaded,
        })
    }

    async fn download_url(
        &self,
        request: DownloadRequest,
        on_progress: ProgressCallback,
    ) -> ServiceResult<()> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);

        if !self.network.is_online() {
            return Err(ServiceError::network("Device is offline"));
        }

        let key = (request.site_id.clone(), request.url.clone());
        let (remote, failure) = {
            let mut state = self.lock();
            let remote = state
                .remote
                .get(&request.url)
                .cloned()
                .ok_or_else(|| ServiceError::not_found(request.url.clone()))?;
            state.downloading.insert(key.clone());
            (remote, state.failures.remove(&request.url))
        };
        self.notify(&request.site_id, &request.url);

        log::debug!("Downloading {} ({} bytes)", request.url, remote.size);
        on_progress(DownloadProgress::Stage(DownloadPhase::Download));

        let mut loaded = 0;
        while loaded < remote.size {
            loaded = (loaded + self.chunk_size).min(remote.size);
            on_progress(DownloadProgress::Progress {
                loaded,
                total: Some(remote.size),
            });
            tokio::task::yield_now().await;
        }

        if let Some(reason) = failure {
            self.lock().downloading.remove(&key);
            self.notify(&request.site_id, &request.url);
            return Err(ServiceError::download(request.url, reason));
        }

        if let Some(entries) = remote.extracted_entries {
            on_progress(DownloadProgress::Stage(DownloadPhase::Extract));
            for done in 1..=entries {
                on_progress(DownloadProgress::Progress {
                    loaded: done,
                    total: Some(entries),
                });
                tokio::task::yield_now().await;
            }
        }

        {
            let mut state = self.lock();
            state.downloading.remove(&key);
            state.stored.insert(key, request.timemodified);
        }
        self.notify(&request.site_id, &request.url);

        Ok(())
    }

    fn should_auto_download(&self, size: u64) -> bool {
        self.thresholds.should_auto_download(size, self.network.is_wifi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventBus;
    use crate::network::SharedNetworkStatus;

    const URL: &str = "https://school.test/pluginfile.php/5/mod_h5pactivity/package/0/quiz.h5p";

    fn pool() -> InMemoryFilePool {
        let network = Arc::new(SharedNetworkStatus::new(true, false));
        let pool = InMemoryFilePool::new(DownloadThresholds::default(), network).with_chunk_size(400);
        pool.add_remote_file(URL, RemoteFile { size: 1000, extracted_entries: Some(2) });
        pool
    }

    fn request(timemodified: i64) -> DownloadRequest {
        DownloadRequest {
            site_id: "site".into(),
            url: URL.into(),
            component: "mod_h5pactivity".into(),
            component_id: 5,
            timemodified,
        }
    }

    #[tokio::test]
    async fn test_state_follows_stored_copy() {
        let pool = pool();
        assert_eq!(pool.get_file_state("site", URL, 10).await.unwrap(), FileState::NotDownloaded);

        pool.store_file("site", URL, 10);
        assert_eq!(pool.get_file_state("site", URL, 10).await.unwrap(), FileState::Downloaded);
        assert_eq!(pool.get_file_state("site", URL, 20).await.unwrap(), FileState::Outdated);

        pool.mark_downloading("site", URL);
        assert_eq!(pool.get_file_state("site", URL, 20).await.unwrap(), FileState::Downloading);
    }

    #[tokio::test]
    async fn test_download_reports_frames_and_stores_file() {
        let pool = pool();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();

        pool.download_url(request(10), Arc::new(move |frame| sink.lock().unwrap().push(frame)))
            .await
            .unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames[0], DownloadProgress::Stage(DownloadPhase::Download));
        assert_eq!(frames[1], DownloadProgress::Progress { loaded: 400, total: Some(1000) });
        assert_eq!(frames[3], DownloadProgress::Progress { loaded: 1000, total: Some(1000) });
        assert_eq!(frames[4], DownloadProgress::Stage(DownloadPhase::Extract));
        assert_eq!(frames.len(), 7);
        assert_eq!(pool.get_file_state("site", URL, 10).await.unwrap(), FileState::Downloaded);
    }

    #[tokio::test]
    async fn test_download_failure_leaves_file_missing() {
        let bus = Arc::new(InMemoryEventBus::new());
        let network = Arc::new(SharedNetworkStatus::new(true, false));
        let pool = InMemoryFilePool::new(DownloadThresholds::default(), network)
            .with_events(bus.clone());
        pool.add_remote_file(URL, RemoteFile { size: 10, extracted_entries: None });
        pool.fail_next_download(URL, "connection reset");

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        bus.on(&pool.file_event_name("site", URL), Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let result = pool.download_url(request(10), Arc::new(|_| {})).await;
        assert!(matches!(result, Err(ServiceError::DownloadError { .. })));
        assert_eq!(pool.get_file_state("site", URL, 10).await.unwrap(), FileState::NotDownloaded);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_download_requires_network() {
        let network = Arc::new(SharedNetworkStatus::new(false, false));
        let pool = InMemoryFilePool::new(DownloadThresholds::default(), network);
        pool.add_remote_file(URL, RemoteFile { size: 10, extracted_entries: None });

        let result = pool.download_url(request(10), Arc::new(|_| {})).await;
        assert!(result.unwrap_err().is_network());
        assert_eq!(pool.download_calls(), 1);
    }
}
