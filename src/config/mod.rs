//! Configuration management
//!
//! - **app**: the daemon's own config file (resource root, socket, log level)
//! - **runtime**: player settings, durable and live
//! - **store**: reactive store keeping the two in sync with the document store

pub mod app;
pub mod runtime;
pub mod store;

pub use app::AppConfig;
pub use runtime::{
    BackgroundPolicy, PersistedConfiguration, PlayMode, PlayStatus, RuntimeConfiguration,
    RuntimeField, UserSettings, WallpaperSettings,
};
pub use store::{ConfigStore, ConfigurationFeed};
