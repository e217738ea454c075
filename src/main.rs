use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use moodleapp::config::{AppConfig, default_config_path};
use moodleapp::error::ServiceResult;
use moodleapp::events::{AppEvent, EventBus, InMemoryEventBus, names};
use moodleapp::filepool::FileState;
use moodleapp::filepool::memory::{InMemoryFilePool, RemoteFile};
use moodleapp::h5pactivity::memory::{OfflineStatementSync, StaticActivityProvider};
use moodleapp::h5pactivity::{
    AccessInfo, ActivityLifecycle, ActivityRecord, ActivityServices, CompletionTracker,
    DeployedFile, H5PActivityController, PackageFile,
};
use moodleapp::network::SharedNetworkStatus;
use moodleapp::site::SiteContext;
use moodleapp::ui::{Feedback, Navigator};
use moodleapp::xapi::InMemoryTrackingService;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let path = match parse_arg(&args, "--config") {
                Some(path) => PathBuf::from(path),
                None => default_config_path().map_err(|e| anyhow::anyhow!("{}", e))?,
            };

            match subcommand {
                "init" => {
                    let force = args.contains(&"--force".to_string());
                    if path.exists() && !force {
                        println!("Configuration already exists at {} (use --force to overwrite)", path.display());
                    } else {
                        AppConfig::default().save(&path).map_err(|e| anyhow::anyhow!("{}", e))?;
                        println!("Created configuration at {}", path.display());
                    }
                }
                "validate" => {
                    let config = AppConfig::load(&path).map_err(|e| anyhow::anyhow!("{}", e))?;
                    let validation = config.validate();
                    for warning in &validation.warnings {
                        println!("warning: {}", warning);
                    }
                    println!("Configuration at {} is valid", path.display());
                }
                "show" => {
                    if !path.exists() {
                        println!("Configuration file not found. Showing default configuration:");
                    }
                    let config = AppConfig::load_or_default(Some(&path)).map_err(|e| anyhow::anyhow!("{}", e))?;
                    println!("{}", config.to_toml_string().map_err(|e| anyhow::anyhow!("{}", e))?);
                }
                _ => {
                    println!("Unknown config subcommand. Available: init, validate, show");
                }
            }
        }
        "simulate" => {
            let state = match parse_arg(&args, "--state") {
                Some(state) => state
                    .parse::<FileState>()
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                None => FileState::NotDownloaded,
            };
            let size = match parse_arg(&args, "--size") {
                Some(size) => size.parse::<u64>().context("--size must be a number of bytes")?,
                None => 1000,
            };
            let offline = args.contains(&"--offline".to_string());
            let config_path = parse_arg(&args, "--config").map(PathBuf::from);
            let config = AppConfig::load_or_default(config_path.as_deref())
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            simulate(config, state, size, offline).await?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        _ => {
            println!("Unknown command: {}", command);
            println!();
            print_help();
        }
    }

    Ok(())
}

const SITE_URL: &str = "https://school.example.com";
const COURSE_ID: u64 = 2;
const MODULE_ID: u64 = 7;
const CONTEXT_ID: u64 = 42;

/// Load an activity against in-memory services and replay a finished attempt
async fn simulate(config: AppConfig, state: FileState, size: u64, offline: bool) -> Result<()> {
    let site = SiteContext::new("simulated", SITE_URL, 3);
    let network = Arc::new(SharedNetworkStatus::new(!offline, true));
    let events = Arc::new(InMemoryEventBus::new());

    let package_url = format!("{}/pluginfile.php/{}/mod_h5pactivity/package/0/game.h5p", SITE_URL, CONTEXT_ID);
    let deployed_url = format!("{}/pluginfile.php/{}/core_h5p/export/game.h5p", SITE_URL, CONTEXT_ID);
    let timemodified = 1_700_000_000;

    let files = Arc::new(
        InMemoryFilePool::new(config.downloads, network.clone()).with_events(events.clone()),
    );
    files.add_remote_file(
        &deployed_url,
        RemoteFile {
            size,
            extracted_entries: Some(12),
        },
    );
    match state {
        FileState::Downloaded => files.store_file(&site.id, &deployed_url, timemodified),
        FileState::Outdated => files.store_file(&site.id, &deployed_url, timemodified - 1),
        FileState::Downloading => files.mark_downloading(&site.id, &deployed_url),
        FileState::NotDownloaded => {}
    }

    let activities = Arc::new(StaticActivityProvider::new());
    activities.add_activity(
        ActivityRecord {
            id: 5,
            course: COURSE_ID,
            coursemodule: MODULE_ID,
            name: "Memory game".to_string(),
            description: "Match the pairs".to_string(),
            context: CONTEXT_ID,
            display_options: 0,
            enable_tracking: true,
            package: vec![PackageFile {
                filename: "game.h5p".to_string(),
                fileurl: package_url,
                filesize: Some(size),
                timemodified,
            }],
        },
        AccessInfo {
            can_submit: true,
            can_review_attempts: false,
        },
        Some(DeployedFile {
            filename: Some("game.h5p".to_string()),
            fileurl: deployed_url,
            filesize: Some(size),
            timemodified,
        }),
    );

    let tracking = Arc::new(InMemoryTrackingService::new(network.clone()));
    let sync = Arc::new(OfflineStatementSync::new(tracking.clone()).with_events(events.clone()));

    let services = ActivityServices {
        site,
        activities,
        sync,
        files: files.clone(),
        tracking: tracking.clone(),
        network: network.clone(),
        events: events.clone(),
        feedback: Arc::new(ConsoleFeedback),
        navigator: Arc::new(ConsoleNavigator::default()),
        completion: Arc::new(ConsoleCompletion),
        thresholds: config.downloads,
    };

    let controller = H5PActivityController::new(services, COURSE_ID, MODULE_ID);
    controller.load().await.map_err(|e| anyhow::anyhow!("{}", e))?;
    controller.wait_for_background_tasks().await;
    print_view(&controller, "after load");

    let view = controller.snapshot();
    if view.needs_download && !view.playing {
        println!("Package needs a download, user taps download");
        controller.download_and_play().await;
        controller.wait_for_background_tasks().await;
        print_view(&controller, "after download");
    }

    println!("Player posts the final statement");
    events.trigger(
        names::FRAME_MESSAGE,
        AppEvent::FrameMessage(json!({
            "environment": "moodleapp",
            "context": "h5p",
            "action": "xapi_post_statement",
            "component": "mod_h5pactivity",
            "statements": [{
                "object": { "id": format!("{}/xapi/activity/{}", SITE_URL, CONTEXT_ID) },
                "verb": { "id": "http://adlnet.gov/expapi/verbs/completed" },
            }],
        })),
    );
    controller.wait_for_background_tasks().await;

    println!(
        "Statements sent: {}, queued offline: {}",
        tracking.sent().len(),
        tracking.queued().len()
    );
    println!("Package downloads: {}", files.download_calls());

    controller.teardown();
    println!("Listeners left after teardown: {}", events.listener_count());

    Ok(())
}

fn print_view(controller: &H5PActivityController, label: &str) {
    let view = controller.snapshot();
    println!("View {}:", label);
    println!(
        "  file state:     {}",
        view.file_state.map_or("-".to_string(), |s| s.to_string())
    );
    println!("  needs download: {}", view.needs_download);
    println!("  playing:        {}", view.playing);
    println!("  has offline:    {}", view.has_offline);
    if let Some(url) = &view.online_player_url {
        println!("  player url:     {}", url);
    }
}

/// Prints modals instead of showing them, accepting every download
struct ConsoleFeedback;

#[async_trait]
impl Feedback for ConsoleFeedback {
    fn show_error(&self, message: &str) {
        println!("[error] {}", message);
    }

    async fn confirm_download(&self, size: u64) -> ServiceResult<()> {
        println!("[confirm] Download {} bytes? yes", size);
        Ok(())
    }
}

#[derive(Default)]
struct ConsoleNavigator {
    path: Mutex<String>,
}

#[async_trait]
impl Navigator for ConsoleNavigator {
    async fn navigate(&self, path: &str, reset: bool) -> ServiceResult<()> {
        println!("[navigate] {} (reset: {})", path, reset);
        *self.path.lock().unwrap_or_else(|e| e.into_inner()) = path.to_string();
        Ok(())
    }

    async fn navigate_to_site_path(&self, path: &str) -> ServiceResult<()> {
        self.navigate(&format!("/main/{}", path), false).await
    }

    fn current_path(&self) -> String {
        self.path.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct ConsoleCompletion;

impl CompletionTracker for ConsoleCompletion {
    fn check_completion(&self, course_id: u64, module_id: u64) {
        println!("[completion] Checking module {} in course {}", module_id, course_id);
    }
}

/// Parse command line argument value
fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|pos| args.get(pos + 1))
        .map(|s| s.as_str())
}

/// Print help information
fn print_help() {
    println!("Moodle App activity simulator");
    println!("Runs the H5P activity page against in-memory site services");
    println!();
    println!("USAGE:");
    println!("    moodleapp <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    config <SUBCOMMAND>     Configuration management");
    println!("    simulate                Load an H5P activity and replay an attempt");
    println!("    help                    Show this help message");
    println!();
    println!("CONFIG SUBCOMMANDS:");
    println!("    init [--force]          Create default configuration file");
    println!("    validate                Validate configuration file");
    println!("    show                    Show configuration");
    println!();
    println!("SIMULATE OPTIONS:");
    println!("    --state STATE           Initial package state: not_downloaded, outdated,");
    println!("                            downloading, downloaded (default: not_downloaded)");
    println!("    --size BYTES            Declared package size (default: 1000)");
    println!("    --offline               Start without connectivity");
    println!();
    println!("COMMON OPTIONS:");
    println!("    --config FILE           Configuration file (default: user config dir)");
    println!();
    println!("EXAMPLES:");
    println!("    moodleapp simulate --state outdated --size 20971520");
    println!("    moodleapp simulate --offline");
    println!("    moodleapp config init");
}
