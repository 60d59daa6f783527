//! Player event streams

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::events::CHANNEL_CAPACITY;
use crate::resource::{PlaylistChange, WallpaperEntry};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_time: f64,
    pub duration: f64,
}

/// One named broadcast stream
pub struct Topic<T> {
    name: &'static str,
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Topic<T> {
    fn new(name: &'static str) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { name, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    pub(crate) fn fire(&self, value: T) {
        let receivers = self.tx.send(value).unwrap_or(0);
        trace!(topic = self.name, receivers, "Event fired");
    }
}

pub struct PlayerEvents {
    pub play: Topic<WallpaperEntry>,
    pub paused: Topic<()>,
    pub progress: Topic<Progress>,
    pub audio_mute: Topic<bool>,
    pub disabled: Topic<bool>,
    pub playlist: Topic<PlaylistChange>,
}

impl Default for PlayerEvents {
    fn default() -> Self {
        Self {
            play: Topic::new("play"),
            paused: Topic::new("paused"),
            progress: Topic::new("progress"),
            audio_mute: Topic::new("audio_mute"),
            disabled: Topic::new("disabled"),
            playlist: Topic::new("playlist"),
        }
    }
}
