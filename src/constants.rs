//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Application configuration file location
pub mod config {
    /// Directory name under the platform config/data dirs
    pub const APP_DIR: &str = "wallpaper-player";

    /// App configuration filename
    pub const FILENAME: &str = "config.json";

    /// Resource root directory name under the data dir
    pub const RESOURCE_DIR: &str = "resources";

    /// Durable document directory name under the data dir
    pub const DB_DIR: &str = "db";

    /// Bundled resource archive extracted when the resource root is missing
    pub const BUNDLED_ARCHIVE: &str = "WallpaperResource.zip";
}

/// Durable document ids
pub mod documents {
    /// Durable user settings
    pub const CONFIGURATION: &str = "configuration";

    /// Runtime mirror, written only to obtain a change feed
    pub const RUNTIME_CONFIGURATION: &str = "rt-configuration";
}

/// Wallpaper package marker files
pub mod markers {
    /// Native package marker name
    pub const NATIVE_NAME: &str = "theme";

    /// Native package marker extension
    pub const NATIVE_EXT: &str = "lmw";

    /// UpUp package marker name
    pub const UPUP_NAME: &str = "theme";

    /// UpUp package marker extension
    pub const UPUP_EXT: &str = "upup";

    /// Lively package marker name
    pub const LIVELY_NAME: &str = "LivelyInfo";

    /// Lively package marker extension
    pub const LIVELY_EXT: &str = "json";
}

/// Load pipeline tuning
pub mod loader {
    /// Attempts of the whole pipeline before giving up
    pub const MAX_ATTEMPTS: usize = 3;

    /// Notification title for user-visible failures
    pub const NOTIFICATION_TITLE: &str = "Wallpaper Player";

    /// Shown when every load attempt failed
    pub const LOAD_FAILED_MESSAGE: &str =
        "Unable to load wallpaper resources, please check that the resource folder exists";

    /// Shown when the bundled archive could not be extracted
    pub const EXTRACT_FAILED_MESSAGE: &str = "Failed to extract bundled wallpaper resources";
}

/// Timings (milliseconds)
pub mod timing {
    /// Play-change events from the surface are coalesced over this window
    pub const PLAY_CHANGE_DEBOUNCE_MS: u64 = 100;

    /// Delay before playback is re-triggered after the playlist was replaced
    pub const REPLAY_DELAY_MS: u64 = 100;

    /// Default delay between watcher restart and reload on relocation
    pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
}

/// Control socket
pub mod ipc {
    /// Socket filename inside the runtime dir
    pub const SOCKET_FILE: &str = "control.sock";

    /// Maximum message size (10 MB) to prevent DoS via memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
}

/// Event hub sizing
pub mod events {
    /// Broadcast buffer per event stream
    pub const CHANNEL_CAPACITY: usize = 256;
}
