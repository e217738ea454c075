// Application Shell
//
// Global listeners registered once at startup. Each event is handled in a
// background task so slow login or navigation flows never block the bus.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ShellConfig;
use crate::error::ServiceError;
use crate::events::{AppEvent, EventBus, Subscription, names};
use crate::network::NetworkStatus;
use crate::shell::{
    ConnectivityNotice, ConnectivityTracker, CustomUrlSchemes, InAppUrlAction, LangService,
    LoginHelper, MAIN_MENU_PATH, Platform, SITES_PATH, ShellError, Sites, USER_EDIT_PATH,
    classify_in_app_url,
};
use crate::tasks::BackgroundTasks;
use crate::ui::{Feedback, Navigator};

const INVALID_SCHEME_ERROR: &str = "core.login.contactyouradministratorissue";
const NOT_FULLY_SETUP_ALERT: &str = "core.usernotfullysetup";

/// Collaborators of the shell
#[derive(Clone)]
pub struct ShellServices {
    pub events: Arc<dyn EventBus>,
    pub navigator: Arc<dyn Navigator>,
    pub platform: Arc<dyn Platform>,
    pub schemes: Arc<dyn CustomUrlSchemes>,
    pub login: Arc<dyn LoginHelper>,
    pub lang: Arc<dyn LangService>,
    pub sites: Arc<dyn Sites>,
    pub network: Arc<dyn NetworkStatus>,
    pub feedback: Arc<dyn Feedback>,
    pub config: ShellConfig,
}

pub struct AppShell {
    services: ShellServices,
    subscriptions: Mutex<Vec<Subscription>>,
    /// When each launch URL was last handled
    last_urls: Mutex<HashMap<String, Instant>>,
    /// Last page loaded in the in-app browser, to go back after leaving it
    last_in_app_url: Mutex<Option<String>>,
    connectivity: Mutex<ConnectivityTracker>,
    tasks: BackgroundTasks,
    cancel: CancellationToken,
    weak_self: Weak<Self>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl AppShell {
    pub fn new(services: ShellServices) -> Arc<Self> {
        let online = services.network.is_online();

        Arc::new_cyclic(|weak_self| Self {
            services,
            subscriptions: Mutex::new(Vec::new()),
            last_urls: Mutex::new(HashMap::new()),
            last_in_app_url: Mutex::new(None),
            connectivity: Mutex::new(ConnectivityTracker::new(online)),
            tasks: BackgroundTasks::new(),
            cancel: CancellationToken::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Register the global listeners. Calling it again does nothing.
    pub fn start(&self) {
        if self.cancel.is_cancelled() {
            return;
        }

        let mut subscriptions = lock(&self.subscriptions);
        if !subscriptions.is_empty() {
            return;
        }

        let handled = [
            names::LOGOUT,
            names::LOGIN,
            names::SITE_UPDATED,
            names::SITE_ADDED,
            names::SESSION_EXPIRED,
            names::PASSWORD_CHANGE_FORCED,
            names::USER_NOT_FULLY_SETUP,
            names::SITE_POLICY_NOT_AGREED,
            names::IAB_LOAD_START,
            names::IAB_EXIT,
            names::APP_RESUMED,
            names::NETWORK_CHANGED,
        ];

        for name in handled {
            let weak = self.weak_self.clone();
            subscriptions.push(self.services.events.on(
                name,
                Arc::new(move |event| {
                    let Some(this) = weak.upgrade() else {
                        return;
                    };
                    let event = event.clone();
                    this.spawn(move |this| async move { this.handle_event(event).await });
                }),
            ));
        }

        log::debug!("Application shell listening to {} events", subscriptions.len());
    }

    /// Release every listener. Safe to call twice.
    pub fn teardown(&self) {
        self.cancel.cancel();

        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        for subscription in subscriptions {
            self.services.events.off(&subscription);
        }
    }

    pub fn connectivity_notice(&self) -> ConnectivityNotice {
        lock(&self.connectivity).notice()
    }

    pub fn last_in_app_url(&self) -> Option<String> {
        lock(&self.last_in_app_url).clone()
    }

    pub async fn wait_for_background_tasks(&self) {
        self.tasks.wait().await;
    }

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

    async fn handle_event(&self, event: AppEvent) {
        let login = &self.services.login;

        let result = match event {
            AppEvent::Logout => {
                self.on_logout().await;
                Ok(())
            }
            AppEvent::Login { site_id } => {
                log::debug!("Logged in to site {:?}", site_id);
                self.services.lang.load_custom_strings();
                Ok(())
            }
            AppEvent::SiteUpdated { site_id, .. } | AppEvent::SiteAdded { site_id, .. } => {
                if self.services.sites.current_site_id().as_deref() == Some(site_id.as_str()) {
                    self.services.lang.load_custom_strings();
                }
                Ok(())
            }
            AppEvent::SessionExpired { site_id } => login.session_expired(site_id.as_deref()).await,
            AppEvent::PasswordChangeForced { site_id } => login.password_change_forced(&site_id).await,
            AppEvent::UserNotFullySetup { site_id } => {
                login
                    .open_in_app_for_edit(&site_id, USER_EDIT_PATH, NOT_FULLY_SETUP_ALERT)
                    .await
            }
            AppEvent::SitePolicyNotAgreed { site_id } => login.site_policy_not_agreed(site_id.as_deref()).await,
            AppEvent::InAppBrowserLoadStart { url } => {
                self.on_in_app_browser_load_start(&url).await;
                Ok(())
            }
            AppEvent::InAppBrowserExit => self.on_in_app_browser_exit().await,
            AppEvent::AppResumed => self.on_resume().await,
            AppEvent::NetworkChanged { online } => {
                self.on_network_change(online);
                Ok(())
            }
            other => {
                log::debug!("Application shell ignoring event {:?}", other);
                Ok(())
            }
        };

        if let Err(e) = result {
            log::warn!("Application shell event handling failed: {}", e);
        }
    }

    async fn on_logout(&self) {
        self.services.lang.clear_custom_strings();

        if let Err(e) = self.services.navigator.navigate(SITES_PATH, true).await {
            log::warn!("Cannot open the sites page after logout: {}", e);
        }
    }

    /// Handle a URL the app was launched with. Returns whether it was handled.
    ///
    /// Platforms may deliver the same launch more than once, so a URL seen
    /// within the dedup window is ignored.
    pub async fn handle_open_url(&self, url: &str) -> bool {
        let now = Instant::now();
        let window = self.services.config.url_dedup_window();

        {
            let mut last_urls = lock(&self.last_urls);
            if last_urls
                .get(url)
                .is_some_and(|handled_at| now.duration_since(*handled_at) < window)
            {
                log::debug!("Ignoring repeated launch URL {}", url);
                return false;
            }

            if !self.services.schemes.is_custom_url(url) {
                log::debug!("Ignoring launch URL without the app scheme: {}", url);
                return false;
            }

            last_urls.retain(|_, handled_at| now.duration_since(*handled_at) < window);
            last_urls.insert(url.to_string(), now);
        }

        self.services.events.trigger(
            names::APP_LAUNCHED_URL,
            AppEvent::AppLaunchedUrl { url: url.to_string() },
        );
        self.handle_custom_url(url).await;
        true
    }

    async fn handle_custom_url(&self, url: &str) {
        if let Err(e) = self.services.schemes.handle_custom_url(url).await {
            log::warn!("Cannot handle custom URL: {}", e);
            self.services.schemes.treat_handle_error(&e);
        }
    }

    /// React to a page starting to load in the in-app browser
    pub async fn on_in_app_browser_load_start(&self, url: &str) {
        let platform = &self.services.platform;
        let schemes = &self.services.schemes;
        let action = classify_in_app_url(url, |url| schemes.is_custom_url(url), platform.is_android());

        match action {
            InAppUrlAction::HandleCustomUrl(url) => {
                platform.close_in_app_browser();
                self.handle_custom_url(&url).await;
            }
            InAppUrlAction::RejectSsoToken { scheme } => {
                log::warn!("In-app browser loaded a login token for scheme {}", scheme);
                platform.close_in_app_browser();
                let error = ShellError::invalid_url_scheme(scheme);
                self.services.feedback.show_error_default(&error, INVALID_SCHEME_ERROR);
            }
            InAppUrlAction::OpenExternalApp(url) => {
                platform.open_in_browser(&url);

                // The in-app browser now shows an error page, go back or close it
                match self.last_in_app_url() {
                    Some(last) => platform.open_in_app(&last),
                    None => platform.close_in_app_browser(),
                }
            }
            InAppUrlAction::Remember(url) => {
                *lock(&self.last_in_app_url) = Some(url);
            }
            InAppUrlAction::Ignore => {}
        }
    }

    pub async fn on_in_app_browser_exit(&self) -> Result<(), ServiceError> {
        *lock(&self.last_in_app_url) = None;
        self.check_pending_browser_login().await
    }

    /// Pending WS calls may stay frozen right after resuming, so the browser
    /// login check waits a little
    pub async fn on_resume(&self) -> Result<(), ServiceError> {
        tokio::time::sleep(self.services.config.resume_grace()).await;
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.check_pending_browser_login().await
    }

    async fn check_pending_browser_login(&self) -> Result<(), ServiceError> {
        let login = &self.services.login;
        if !login.is_waiting_for_browser() {
            return Ok(());
        }

        login.stop_waiting_for_browser();
        login.check_logout().await
    }

    /// Update the connectivity notice, expiring "back online" after a while
    pub fn on_network_change(&self, online: bool) {
        let expiry = lock(&self.connectivity).on_change(online);
        log::info!("Connectivity changed, online: {}", online);

        let Some(generation) = expiry else {
            return;
        };

        let delay = self.services.config.online_notice();
        self.spawn(move |this| async move {
            tokio::time::sleep(delay).await;
            lock(&this.connectivity).expire(generation);
        });
    }

    /// Back button with nothing else to handle it. Returns whether the app
    /// was closed.
    pub async fn handle_back_button(&self) -> bool {
        let navigator = &self.services.navigator;
        let initial_path = navigator.current_path();

        // The main menu handles back on its own, reaching here means exit
        if initial_path.starts_with(MAIN_MENU_PATH) {
            self.services.platform.close_app();
            return true;
        }

        // Back navigation may be running at the same time, see if it moves
        tokio::time::sleep(self.services.config.back_button_grace()).await;
        if navigator.current_path() != initial_path {
            return false;
        }

        self.services.platform.close_app();
        true
    }
}
