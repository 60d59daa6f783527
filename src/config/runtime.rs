//! Player configuration: the durable document and its live runtime superset

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::resource::WallpaperEntry;

/// End-of-content behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayMode {
    /// Stop after the current wallpaper
    Single,
    #[default]
    ListLoop,
    Order,
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "list-loop" => Ok(Self::ListLoop),
            "order" => Ok(Self::Order),
            other => Err(format!("unknown play mode '{other}'")),
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::ListLoop => "list-loop",
            Self::Order => "order",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    Playing,
    #[default]
    Paused,
}

/// What to do while another application has the foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundPolicy {
    #[default]
    Play,
    Pause,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub background: BackgroundPolicy,
    /// Settings owned by the UI, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WallpaperSettings {
    #[serde(default)]
    pub configuration: Option<WallpaperEntry>,
}

/// Durable user settings, the `configuration` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedConfiguration {
    pub mute: bool,
    pub volume: f64,
    pub mode: PlayMode,
    pub disabled: bool,
    pub user_settings: UserSettings,
    pub view_mode: bool,
    pub wallpaper: WallpaperSettings,
}

impl Default for PersistedConfiguration {
    fn default() -> Self {
        Self {
            mute: false,
            volume: 0.5,
            mode: PlayMode::default(),
            disabled: false,
            user_settings: UserSettings::default(),
            view_mode: false,
            wallpaper: WallpaperSettings::default(),
        }
    }
}

/// Live player state, a superset of [`PersistedConfiguration`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfiguration {
    pub mute: bool,
    pub volume: f64,
    pub mode: PlayMode,
    pub disabled: bool,
    pub user_settings: UserSettings,
    pub view_mode: bool,
    pub status: PlayStatus,
    pub view_visible: bool,
    pub wallpaper_configuration: Option<WallpaperEntry>,
}

impl Default for RuntimeConfiguration {
    fn default() -> Self {
        Self::seeded_from(&PersistedConfiguration::default())
    }
}

/// One field write on [`RuntimeConfiguration`]
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeField {
    Mute(bool),
    Volume(f64),
    Mode(PlayMode),
    Disabled(bool),
    UserSettings(UserSettings),
    ViewMode(bool),
    Status(PlayStatus),
    ViewVisible(bool),
    WallpaperConfiguration(Option<WallpaperEntry>),
}

impl RuntimeField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mute(_) => "mute",
            Self::Volume(_) => "volume",
            Self::Mode(_) => "mode",
            Self::Disabled(_) => "disabled",
            Self::UserSettings(_) => "userSettings",
            Self::ViewMode(_) => "viewMode",
            Self::Status(_) => "status",
            Self::ViewVisible(_) => "viewVisible",
            Self::WallpaperConfiguration(_) => "wallpaperConfiguration",
        }
    }
}

impl RuntimeConfiguration {
    /// Startup state: durable fields copied, ephemeral fields at defaults
    pub fn seeded_from(persisted: &PersistedConfiguration) -> Self {
        Self {
            mute: persisted.mute,
            volume: persisted.volume,
            mode: persisted.mode,
            disabled: persisted.disabled,
            user_settings: persisted.user_settings.clone(),
            view_mode: persisted.view_mode,
            status: PlayStatus::default(),
            view_visible: true,
            wallpaper_configuration: persisted.wallpaper.configuration.clone(),
        }
    }

    pub fn apply(&mut self, field: &RuntimeField) {
        match field {
            RuntimeField::Mute(v) => self.mute = *v,
            RuntimeField::Volume(v) => self.volume = *v,
            RuntimeField::Mode(v) => self.mode = *v,
            RuntimeField::Disabled(v) => self.disabled = *v,
            RuntimeField::UserSettings(v) => self.user_settings = v.clone(),
            RuntimeField::ViewMode(v) => self.view_mode = *v,
            RuntimeField::Status(v) => self.status = *v,
            RuntimeField::ViewVisible(v) => self.view_visible = *v,
            RuntimeField::WallpaperConfiguration(v) => self.wallpaper_configuration = v.clone(),
        }
    }
}

impl PersistedConfiguration {
    /// Mirror one runtime field write; returns false for ephemeral fields
    pub fn propagate(&mut self, field: &RuntimeField) -> bool {
        match field {
            RuntimeField::Mute(v) => self.mute = *v,
            RuntimeField::Volume(v) => self.volume = *v,
            RuntimeField::Mode(v) => self.mode = *v,
            RuntimeField::Disabled(v) => self.disabled = *v,
            RuntimeField::UserSettings(v) => self.user_settings = v.clone(),
            RuntimeField::ViewMode(v) => self.view_mode = *v,
            RuntimeField::WallpaperConfiguration(v) => self.wallpaper.configuration = v.clone(),
            RuntimeField::Status(_) | RuntimeField::ViewVisible(_) => return false,
        }
        true
    }

    /// Copy every durable field out of a whole runtime configuration
    pub fn absorb(&mut self, runtime: &RuntimeConfiguration) {
        self.mute = runtime.mute;
        self.volume = runtime.volume;
        self.mode = runtime.mode;
        self.disabled = runtime.disabled;
        self.user_settings = runtime.user_settings.clone();
        self.view_mode = runtime.view_mode;
        self.wallpaper.configuration = runtime.wallpaper_configuration.clone();
    }
}
