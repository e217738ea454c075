pub mod config;
pub mod error;
pub mod events;
pub mod filepool;
pub mod h5pactivity;
pub mod network;
pub mod shell;
pub mod site;
pub mod tasks;
pub mod ui;
pub mod xapi;

pub use config::AppConfig;
pub use error::{ServiceError, ServiceResult};
pub use h5pactivity::{ActivityLifecycle, ActivityServices, H5PActivityController};
pub use shell::{AppShell, ShellServices};
