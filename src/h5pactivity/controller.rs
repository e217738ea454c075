// H5P Activity Controller
//
// Drives the activity entry page: fetches the activity, decides whether the
// package plays, downloads or waits, follows the package file state and
// forwards the statements posted by the embedded player.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio_util::sync::CancellationToken;

use crate::config::DownloadThresholds;
use crate::events::{AppEvent, EventBus, Subscription, names};
use crate::filepool::{DownloadRequest, FileCacheService, FileState, ProgressCallback, ProgressDisplay};
use crate::h5pactivity::{
    AccessInfo, ActivityError, ActivityProvider, ActivityRecord, ActivityResult, ActivitySync,
    COMPONENT, CompletionTracker, ContentAction, DecisionInput, DeployedFile, DisplayOptions,
    FileStatePosture, PAGE_NAME, StateMessage, TRACK_COMPONENT, decide_content_action,
    online_player_url,
};
use crate::network::NetworkStatus;
use crate::site::SiteContext;
use crate::tasks::BackgroundTasks;
use crate::ui::{Feedback, Navigator};
use crate::xapi::{PostStatementsOptions, TrackingService, authenticate_post, has_ended};

const FETCH_ERROR: &str = "addon.mod_h5pactivity.errorgetactivity";
const DOWNLOAD_ERROR: &str = "core.errordownloading";
const SYNC_ERROR: &str = "core.errorsync";
const NETWORK_ERROR: &str = "core.networkerrormsg";
const TRACKING_ERROR: &str = "Error sending tracking data.";

/// Lifecycle driven by the hosting view
#[async_trait]
pub trait ActivityLifecycle: Send + Sync {
    /// First load of the content
    async fn load(&self) -> ActivityResult<()>;

    /// Invalidate cached data and fetch everything again
    async fn refresh(&self, sync: bool, show_errors: bool) -> ActivityResult<()>;

    /// Release listeners and stop applying late results. Safe to call twice.
    fn teardown(&self);
}

/// Collaborators of the controller
#[derive(Clone)]
pub struct ActivityServices {
    pub site: SiteContext,
    pub activities: Arc<dyn ActivityProvider>,
    pub sync: Arc<dyn ActivitySync>,
    pub files: Arc<dyn FileCacheService>,
    pub tracking: Arc<dyn TrackingService>,
    pub network: Arc<dyn NetworkStatus>,
    pub events: Arc<dyn EventBus>,
    pub feedback: Arc<dyn Feedback>,
    pub navigator: Arc<dyn Navigator>,
    pub completion: Arc<dyn CompletionTracker>,
    pub thresholds: DownloadThresholds,
}

/// Everything the page displays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityViewState {
    pub activity: Option<ActivityRecord>,
    pub access_info: Option<AccessInfo>,
    pub deployed_file: Option<DeployedFile>,
    pub display_options: Option<DisplayOptions>,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub file_state: Option<FileState>,
    pub state_message: Option<StateMessage>,
    pub needs_download: bool,
    pub downloading: bool,
    pub progress_message: Option<String>,
    /// Download/unzip percentage, present only while it can be shown
    pub percentage: Option<f64>,
    pub playing: bool,
    pub online_player_url: Option<String>,
    /// Empty unless the user may submit statements
    pub track_component: String,
    pub has_offline: bool,
    pub can_view_all_attempts: bool,
    pub is_opening_page: bool,
}

/// Deployed file data fetched together with the activity
struct DeployedFileData {
    file: DeployedFile,
    url: String,
    state: FileState,
}

pub struct H5PActivityController {
    services: ActivityServices,
    course_id: u64,
    module_id: u64,
    state: Mutex<ActivityViewState>,
    /// Message, auto-sync and network listeners
    subscriptions: Mutex<Vec<Subscription>>,
    /// Listener for the deployed file state
    file_subscription: Mutex<Option<Subscription>>,
    tasks: BackgroundTasks,
    was_online: AtomicBool,
    cancel: CancellationToken,
    weak_self: Weak<Self>,
}

impl H5PActivityController {
    /// Create the controller for a course module and start listening for
    /// frame messages, auto-sync and network events
    pub fn new(services: ActivityServices, course_id: u64, module_id: u64) -> Arc<Self> {
        let online = services.network.is_online();

        let controller = Arc::new_cyclic(|weak_self| Self {
            services,
            course_id,
            module_id,
            state: Mutex::new(ActivityViewState::default()),
            subscriptions: Mutex::new(Vec::new()),
            file_subscription: Mutex::new(None),
            tasks: BackgroundTasks::new(),
            was_online: AtomicBool::new(online),
            cancel: CancellationToken::new(),
            weak_self: weak_self.clone(),
        });

        controller.register_listeners();
        controller
    }

    /// Copy of the current view state
    pub fn snapshot(&self) -> ActivityViewState {
        self.state().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn state(&self) -> MutexGuard<'_, ActivityViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `update` unless the view is gone
    fn update(&self, cancel: &CancellationToken, update: impl FnOnce(&mut ActivityViewState)) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        update(&mut self.state());
        true
    }

    fn site_id(&self) -> &str {
        &self.services.site.id
    }

    fn register_listeners(&self) {
        let mut subscriptions = Vec::with_capacity(3);

        let weak = self.weak_self.clone();
        subscriptions.push(self.services.events.on(
            names::FRAME_MESSAGE,
            Arc::new(move |event| {
                let (Some(this), AppEvent::FrameMessage(data)) = (weak.upgrade(), event) else {
                    return;
                };
                let data = data.clone();
                this.spawn(move |this| async move { this.on_iframe_message(&data).await });
            }),
        ));

        let weak = self.weak_self.clone();
        subscriptions.push(self.services.events.on(
            names::H5P_ACTIVITY_AUTO_SYNCED,
            Arc::new(move |event| {
                let (Some(this), AppEvent::ActivityAutoSynced { context_id, .. }) = (weak.upgrade(), event)
                else {
                    return;
                };
                let context_id = *context_id;
                this.spawn(move |this| async move { this.auto_sync_event_received(context_id).await });
            }),
        ));

        let weak = self.weak_self.clone();
        subscriptions.push(self.services.events.on(
            names::NETWORK_CHANGED,
            Arc::new(move |event| {
                let (Some(this), AppEvent::NetworkChanged { online }) = (weak.upgrade(), event) else {
                    return;
                };
                let was_online = this.was_online.swap(*online, Ordering::SeqCst);
                if *online && !was_online {
                    log::debug!("Connection restored, synchronizing activity {}", this.module_id);
                    this.spawn(|this| async move { this.refresh_in_background().await });
                }
            }),
        ));

        *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()) = subscriptions;
    }

    /// Run a task on the current runtime, tracked until it finishes
    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(this) = self.weak_self.upgrade() {
            self.tasks.spawn(task(this));
        }
    }

    /// Wait until every background task (auto download, event handling) is done
    pub async fn wait_for_background_tasks(&self) {
        self.tasks.wait().await;
    }

    /// Fetch the activity and everything the page needs, then play, download
    /// or wait depending on the package state.
    pub async fn fetch_content(&self, refresh: bool, sync: bool, show_errors: bool) -> ActivityResult<()> {
        let cancel = self.cancel.child_token();
        log::debug!(
            "Fetching H5P activity for module {} (refresh: {}, sync: {})",
            self.module_id,
            refresh,
            sync
        );

        let activity = self
            .services
            .activities
            .get_activity(self.course_id, self.module_id, self.site_id())
            .await?;
        let display_options = DisplayOptions::decode(activity.display_options);

        if sync {
            self.sync_activity(&activity, show_errors, &cancel).await;
        }

        let (has_offline, access_info, deployed) = futures::try_join!(
            self.check_has_offline(&activity),
            self.fetch_access_info(&activity),
            self.fetch_deployed_file_data(&activity, &display_options),
        )?;

        let site = &self.services.site;
        let track_component = if access_info.can_submit {
            TRACK_COMPONENT.to_string()
        } else {
            String::new()
        };
        let can_view_all_attempts =
            activity.enable_tracking && access_info.can_review_attempts && site.can_get_users_attempts;

        // The online player uses the original package, not the deployed one
        let player_url = activity.package.first().and_then(|package| {
            online_player_url(site, &package.fileurl, Some(&display_options), Some(&track_component))
        });

        let file_state = deployed.as_ref().map(|d| d.state);
        let file_size = deployed.as_ref().and_then(|d| d.file.filesize);

        let applied = self.update(&cancel, |state| {
            state.description = Some(activity.description.clone());
            state.display_options = Some(display_options);
            state.access_info = Some(access_info);
            state.has_offline = has_offline;
            state.track_component = track_component;
            state.can_view_all_attempts = can_view_all_attempts;
            state.online_player_url = player_url;
            match deployed {
                Some(data) => {
                    state.file_url = Some(data.url);
                    state.deployed_file = Some(data.file);
                    state.file_state = Some(data.state);
                }
                None => {
                    state.file_url = None;
                    state.deployed_file = None;
                    state.file_state = None;
                }
            }
            state.activity = Some(activity);
        });
        if !applied {
            return Ok(());
        }

        // A download owned by someone else is followed without holding up the fetch
        if file_state.is_some() && self.show_file_state(&cancel) {
            self.spawn(|this| async move { this.follow_download().await });
        }

        let action = decide_content_action(DecisionInput {
            downloads_enabled: site.can_download_packages(),
            state: file_state,
            online: self.services.network.is_online(),
            below_threshold: file_size
                .is_some_and(|size| size > 0 && self.services.files.should_auto_download(size)),
        });
        log::debug!("H5P activity {} content action: {:?}", self.module_id, action);

        match action {
            ContentAction::Play => self.play_with(&cancel).await,
            ContentAction::AutoDownload => {
                // Small package, don't block the page on it
                self.spawn(|this| async move { this.download_automatically().await });
            }
            ContentAction::AwaitUser => {}
        }

        Ok(())
    }

    async fn check_has_offline(&self, activity: &ActivityRecord) -> ActivityResult<bool> {
        Ok(self
            .services
            .tracking
            .offline_statements_exist(activity.context, self.site_id())
            .await?)
    }

    async fn fetch_access_info(&self, activity: &ActivityRecord) -> ActivityResult<AccessInfo> {
        Ok(self
            .services
            .activities
            .get_access_information(activity.id, self.module_id, self.site_id())
            .await?)
    }

    async fn fetch_deployed_file_data(
        &self,
        activity: &ActivityRecord,
        display_options: &DisplayOptions,
    ) -> ActivityResult<Option<DeployedFileData>> {
        if !self.services.site.can_download_packages() {
            return Ok(None);
        }

        let file = self
            .services
            .activities
            .get_deployed_file(activity, display_options, self.site_id())
            .await?;
        let url = file.file_url().to_string();

        self.watch_file(&url);

        let state = self
            .services
            .files
            .get_file_state(self.site_id(), &url, file.timemodified)
            .await?;

        Ok(Some(DeployedFileData { file, url, state }))
    }

    /// Keep exactly one file state listener, for the current deployed file
    fn watch_file(&self, url: &str) {
        if self.cancel.is_cancelled() {
            return;
        }

        let event_name = self.services.files.file_event_name(self.site_id(), url);
        let mut current = self.file_subscription.lock().unwrap_or_else(|e| e.into_inner());

        if current.as_ref().is_some_and(|sub| sub.name == event_name) {
            return;
        }
        if let Some(previous) = current.take() {
            self.services.events.off(&previous);
        }

        let weak = self.weak_self.clone();
        *current = Some(self.services.events.on(
            &event_name,
            Arc::new(move |_| {
                if let Some(this) = weak.upgrade() {
                    this.spawn(|this| async move { this.calculate_file_state().await });
                }
            }),
        ));
    }

    /// Query the pool for the deployed file state and update the page
    pub async fn calculate_file_state(&self) {
        let cancel = self.cancel.child_token();
        let (url, timemodified) = {
            let state = self.state();
            match (&state.file_url, &state.deployed_file) {
                (Some(url), Some(file)) => (url.clone(), file.timemodified),
                _ => return,
            }
        };

        let file_state = match self
            .services
            .files
            .get_file_state(self.site_id(), &url, timemodified)
            .await
        {
            Ok(file_state) => file_state,
            Err(e) => {
                log::warn!("Cannot get state of {}: {}", url, e);
                return;
            }
        };

        if self.update(&cancel, |state| state.file_state = Some(file_state))
            && self.show_file_state(&cancel)
        {
            self.follow_download().await;
        }
    }

    /// Derive the page messages from the last observed file state. Returns
    /// whether a download started elsewhere is running and should be followed.
    fn show_file_state(&self, cancel: &CancellationToken) -> bool {
        let Some(file_state) = self.state().file_state else {
            return false;
        };
        let posture = FileStatePosture::for_state(file_state);

        let mut restore_download = false;
        self.update(cancel, |state| {
            state.state_message = posture.state_message();
            state.needs_download = posture.needs_download();
            restore_download = posture == FileStatePosture::Downloading && !state.downloading;
        });
        restore_download
    }

    /// Join a download started elsewhere and play the package once it finishes
    async fn follow_download(&self) {
        let cancel = self.cancel.child_token();

        log::debug!("Following ongoing download of H5P package for module {}", self.module_id);
        match self.download_deployed_file(&cancel).await {
            Ok(()) => self.play_with(&cancel).await,
            Err(ActivityError::DownloadInProgress) => {}
            Err(e) if cancel.is_cancelled() => log::debug!("Download finished after teardown: {}", e),
            Err(e) => self.services.feedback.show_error_default(&e, DOWNLOAD_ERROR),
        }
    }

    /// Download the package after the user asked for it, then play it
    pub async fn download_and_play(&self) {
        let cancel = self.cancel.child_token();
        let Some(file) = self.state().deployed_file.clone() else {
            return;
        };

        if !self.services.network.is_online() {
            self.services.feedback.show_error(NETWORK_ERROR);
            return;
        }

        let result = async {
            let size = file.filesize.unwrap_or(0);
            if self
                .services
                .thresholds
                .needs_confirmation(size, true, self.services.network.is_wifi())
            {
                self.services.feedback.confirm_download(size).await?;
            }

            self.download_deployed_file(&cancel).await
        }
        .await;

        match result {
            Ok(()) => self.play_with(&cancel).await,
            Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                log::debug!("Package download stopped: {}", e);
            }
            Err(ActivityError::DownloadInProgress) => {
                log::debug!("Package download already running");
            }
            Err(e) => self.services.feedback.show_error_default(&e, DOWNLOAD_ERROR),
        }
    }

    async fn download_automatically(&self) {
        let cancel = self.cancel.child_token();

        match self.download_deployed_file(&cancel).await {
            Ok(()) => self.play_with(&cancel).await,
            Err(ActivityError::DownloadInProgress) => {}
            Err(e) if cancel.is_cancelled() => log::debug!("Download finished after teardown: {}", e),
            Err(e) => self.services.feedback.show_error_default(&e, DOWNLOAD_ERROR),
        }
    }

    /// Download the deployed file, reporting progress in the view state.
    ///
    /// Only one download runs per controller; a second call fails with
    /// [`ActivityError::DownloadInProgress`].
    pub async fn download_deployed_file(&self, cancel: &CancellationToken) -> ActivityResult<()> {
        let (file, url, display) = {
            let mut state = self.state();
            let (Some(file), Some(url)) = (state.deployed_file.clone(), state.file_url.clone()) else {
                return Ok(());
            };
            if state.downloading {
                return Err(ActivityError::DownloadInProgress);
            }

            let display = ProgressDisplay::new(file.filesize);
            state.downloading = true;
            state.progress_message = Some(display.phase().message().to_string());
            state.percentage = None;
            (file, url, display)
        };

        log::info!("Downloading H5P package {}", url);

        let display = Mutex::new(display);
        let weak = self.weak_self.clone();
        let token = cancel.clone();
        let on_progress: ProgressCallback = Arc::new(move |frame| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            let mut display = display.lock().unwrap_or_else(|e| e.into_inner());
            display.apply(&frame);

            this.update(&token, |state| {
                state.progress_message = Some(display.phase().message().to_string());
                state.percentage = display.percentage();
            });
        });

        let result = self
            .services
            .files
            .download_url(
                DownloadRequest {
                    site_id: self.site_id().to_string(),
                    url: url.clone(),
                    component: COMPONENT.to_string(),
                    component_id: self.module_id,
                    timemodified: file.timemodified,
                },
                on_progress,
            )
            .await;

        {
            let mut state = self.state();
            state.progress_message = None;
            state.percentage = None;
            state.downloading = false;
        }

        match &result {
            Ok(()) => log::info!("Downloaded H5P package {}", url),
            Err(e) => log::warn!("Failed to download H5P package {}: {}", url, e),
        }

        Ok(result?)
    }

    /// Play the package and mark the activity as viewed
    pub async fn play(&self) {
        let cancel = self.cancel.child_token();
        self.play_with(&cancel).await;
    }

    async fn play_with(&self, cancel: &CancellationToken) {
        let Some(activity) = self.state().activity.clone() else {
            return;
        };

        if !self.update(cancel, |state| state.playing = true) {
            return;
        }

        if let Err(e) = self
            .services
            .activities
            .log_view(activity.id, &activity.name, self.site_id())
            .await
        {
            log::warn!("Cannot log view of H5P activity {}: {}", activity.id, e);
        }

        if !cancel.is_cancelled() {
            self.services.completion.check_completion(self.course_id, self.module_id);
        }
    }

    /// Open the attempts of the current user
    pub async fn view_my_attempts(&self) -> ActivityResult<()> {
        let path = format!(
            "{}/{}/{}/userattempts/{}",
            PAGE_NAME, self.course_id, self.module_id, self.services.site.user_id
        );
        self.open_page(&path).await
    }

    /// Open the list of users with attempts
    pub async fn view_all_attempts(&self) -> ActivityResult<()> {
        let path = format!("{}/{}/{}/users", PAGE_NAME, self.course_id, self.module_id);
        self.open_page(&path).await
    }

    async fn open_page(&self, path: &str) -> ActivityResult<()> {
        self.state().is_opening_page = true;
        let result = self.services.navigator.navigate_to_site_path(path).await;
        self.state().is_opening_page = false;

        Ok(result?)
    }

    /// Handle a message posted by the embedded player.
    ///
    /// Anything that is not a statement submission for this activity is
    /// ignored. Failures are shown to the user and never returned.
    pub async fn on_iframe_message(&self, data: &serde_json::Value) {
        let cancel = self.cancel.child_token();
        if data.is_null() || cancel.is_cancelled() {
            return;
        }

        let (activity, has_offline) = {
            let state = self.state();
            match &state.activity {
                Some(activity) => (activity.clone(), state.has_offline),
                None => return,
            }
        };

        let site = &self.services.site;
        if !self.services.tracking.can_post_statements_in_site(site) {
            return;
        }

        let Some(message) = authenticate_post(data, site, activity.context) else {
            log::debug!("Ignoring frame message not meant for activity {}", activity.id);
            return;
        };

        let result: ActivityResult<()> = async {
            let statements = serde_json::to_string(&message.statements)?;
            let sent = self
                .services
                .tracking
                .post_statements(
                    activity.context,
                    &message.component,
                    &statements,
                    PostStatementsOptions {
                        offline: has_offline,
                        course_id: self.course_id,
                        extra: Some(activity.name.clone()),
                        site_id: site.id.clone(),
                    },
                )
                .await?;

            self.update(&cancel, |state| state.has_offline = !sent);

            if !sent {
                return Ok(());
            }

            if let Err(e) = self
                .services
                .activities
                .invalidate_user_attempts(activity.id, None, &site.id)
                .await
            {
                log::debug!("Ignoring attempts invalidation error: {}", e);
            }

            // Final statements don't belong to a sub-content
            if has_ended(&message.statements) && !cancel.is_cancelled() {
                log::info!("H5P activity {} finished", activity.id);
                self.services.events.trigger(
                    names::H5P_ACTIVITY_FINISHED,
                    AppEvent::ActivityFinished { activity_id: activity.id },
                );
                self.services.completion.check_completion(self.course_id, self.module_id);
            }

            Ok(())
        }
        .await;

        if let Err(e) = result {
            log::warn!("Error sending tracking data for activity {}: {}", activity.id, e);
            if !cancel.is_cancelled() {
                self.services.feedback.show_error_default(&e, TRACKING_ERROR);
            }
        }
    }

    /// Synchronize offline statements. Returns whether the site data changed.
    async fn sync_activity(
        &self,
        activity: &ActivityRecord,
        show_errors: bool,
        cancel: &CancellationToken,
    ) -> bool {
        match self
            .services
            .sync
            .sync_activity(activity.context, self.site_id())
            .await
        {
            Ok(result) => {
                if cancel.is_cancelled() {
                    return false;
                }
                if let Some(warning) = result.warnings.first() {
                    self.services.feedback.show_error(warning);
                }
                result.updated
            }
            Err(e) => {
                log::warn!("Cannot synchronize H5P activity {}: {}", activity.id, e);
                if show_errors && !cancel.is_cancelled() {
                    self.services.feedback.show_error_default(&e, SYNC_ERROR);
                }
                false
            }
        }
    }

    async fn auto_sync_event_received(&self, context_id: u64) {
        let cancel = self.cancel.child_token();
        let Some(activity) = self.state().activity.clone() else {
            return;
        };
        if activity.context != context_id {
            return;
        }

        match self.check_has_offline(&activity).await {
            Ok(has_offline) => {
                self.update(&cancel, |state| state.has_offline = has_offline);
            }
            Err(e) => log::warn!("Cannot check offline statements: {}", e),
        }
    }

    async fn refresh_in_background(&self) {
        if let Err(e) = self.refresh(true, false).await {
            log::warn!("Cannot refresh H5P activity {}: {}", self.module_id, e);
            if !self.cancel.is_cancelled() {
                self.services.feedback.show_error_default(&e, FETCH_ERROR);
            }
        }
    }

    async fn invalidate_content(&self) {
        if let Err(e) = self
            .services
            .activities
            .invalidate_activity_data(self.course_id, self.site_id())
            .await
        {
            log::debug!("Ignoring invalidation error: {}", e);
        }
    }
}

#[async_trait]
impl ActivityLifecycle for H5PActivityController {
    async fn load(&self) -> ActivityResult<()> {
        self.fetch_content(false, false, false).await
    }

    async fn refresh(&self, sync: bool, show_errors: bool) -> ActivityResult<()> {
        self.invalidate_content().await;
        self.fetch_content(true, sync, show_errors).await
    }

    fn teardown(&self) {
        self.cancel.cancel();

        let subscriptions =
            std::mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()));
        for subscription in subscriptions {
            self.services.events.off(&subscription);
        }

        let file_subscription = self.file_subscription.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(subscription) = file_subscription {
            self.services.events.off(&subscription);
        }
    }
}
