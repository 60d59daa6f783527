//! Command dispatcher
//!
//! Maps the call and listen vocabularies, which arrive as plain strings, onto
//! the player controller. Unknown calls answer `false`; unknown listen topics
//! get a stream that never fires.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::config::{ConfigurationFeed, PlayMode, RuntimeConfiguration};
use crate::player::{PlayerController, Progress};
use crate::resource::{PlaylistChange, WallpaperEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    Mute,
    Sound,
    Next,
    Prev,
    Pause,
    Play,
    Disable,
    Enable,
    Volume,
    Seek,
    Toggle,
    Playlist,
    Mode,
    Configuration,
}

impl CallCommand {
    const TABLE: [(&'static str, CallCommand); 14] = [
        ("mute", CallCommand::Mute),
        ("sound", CallCommand::Sound),
        ("next", CallCommand::Next),
        ("prev", CallCommand::Prev),
        ("pause", CallCommand::Pause),
        ("play", CallCommand::Play),
        ("disable", CallCommand::Disable),
        ("enable", CallCommand::Enable),
        ("volume", CallCommand::Volume),
        ("seek", CallCommand::Seek),
        ("toggle", CallCommand::Toggle),
        ("playlist", CallCommand::Playlist),
        ("mode", CallCommand::Mode),
        ("configuration", CallCommand::Configuration),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, command)| *command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenTopic {
    PlayChanged,
    AudioMuteChange,
    Paused,
    DisableChange,
    Progress,
    PlaylistChange,
    Configuration,
}

impl ListenTopic {
    const TABLE: [(&'static str, ListenTopic); 10] = [
        ("play", ListenTopic::PlayChanged),
        ("next", ListenTopic::PlayChanged),
        ("prev", ListenTopic::PlayChanged),
        ("mute", ListenTopic::AudioMuteChange),
        ("sound", ListenTopic::AudioMuteChange),
        ("pause", ListenTopic::Paused),
        ("disable", ListenTopic::DisableChange),
        ("progress", ListenTopic::Progress),
        ("playlist", ListenTopic::PlaylistChange),
        ("configuration", ListenTopic::Configuration),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, topic)| *topic)
    }
}

/// Result of a call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallReply {
    Ack(bool),
    Playlist(Vec<WallpaperEntry>),
    Configuration(Box<RuntimeConfiguration>),
}

impl CallReply {
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Bool(false))
    }
}

/// A live listen stream, payloads already rendered to JSON
pub enum Subscription {
    PlayChanged(broadcast::Receiver<WallpaperEntry>),
    AudioMuteChange(broadcast::Receiver<bool>),
    Paused(broadcast::Receiver<()>),
    DisableChange(broadcast::Receiver<bool>),
    Progress(broadcast::Receiver<Progress>),
    PlaylistChange(broadcast::Receiver<PlaylistChange>),
    Configuration(ConfigurationFeed),
    Never,
}

impl Subscription {
    /// Next payload; `None` once the source is gone
    pub async fn recv(&mut self) -> Option<Value> {
        match self {
            Subscription::PlayChanged(rx) => recv_json(rx).await,
            Subscription::AudioMuteChange(rx) => recv_json(rx).await,
            Subscription::Paused(rx) => recv_json(rx).await,
            Subscription::DisableChange(rx) => recv_json(rx).await,
            Subscription::Progress(rx) => recv_json(rx).await,
            Subscription::PlaylistChange(rx) => recv_json(rx).await,
            Subscription::Configuration(feed) => feed.recv().await,
            Subscription::Never => std::future::pending().await,
        }
    }
}

async fn recv_json<T: Clone + Serialize>(rx: &mut broadcast::Receiver<T>) -> Option<Value> {
    loop {
        match rx.recv().await {
            Ok(value) => match serde_json::to_value(value) {
                Ok(json) => return Some(json),
                Err(e) => warn!(error = %e, "Failed to serialize event payload"),
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Listener lagged, events dropped"),
            Err(RecvError::Closed) => return None,
        }
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    player: Arc<PlayerController>,
}

impl CommandDispatcher {
    pub fn new(player: Arc<PlayerController>) -> Self {
        Self { player }
    }

    pub fn player(&self) -> &Arc<PlayerController> {
        &self.player
    }

    pub async fn call(&self, event: &str, arg: Option<Value>) -> CallReply {
        self.player.wait_ready().await;

        let Some(command) = CallCommand::from_name(event) else {
            debug!(event, "Unknown call");
            return CallReply::Ack(false);
        };
        debug!(?command, "Dispatching call");

        let player = &self.player;
        match command {
            CallCommand::Mute => player.mute().await,
            CallCommand::Sound => player.sound().await,
            CallCommand::Next => player.next().await,
            CallCommand::Prev => player.prev().await,
            CallCommand::Pause => player.pause().await,
            CallCommand::Play => match arg {
                Some(arg @ Value::Object(_)) => match serde_json::from_value(arg) {
                    Ok(entry) => player.play(Some(entry)).await,
                    Err(e) => {
                        warn!(error = %e, "Play argument is not a wallpaper");
                        return CallReply::Ack(false);
                    }
                },
                _ => player.play(None).await,
            },
            CallCommand::Disable => player.disable().await,
            CallCommand::Enable => player.enable().await,
            CallCommand::Volume => match arg.as_ref().and_then(Value::as_f64) {
                Some(volume) => player.set_volume(volume).await,
                None => return CallReply::Ack(false),
            },
            CallCommand::Seek => match arg.as_ref().and_then(Value::as_f64) {
                Some(seconds) => player.seek(seconds).await,
                None => return CallReply::Ack(false),
            },
            CallCommand::Toggle => player.toggle().await,
            CallCommand::Playlist => return CallReply::Playlist(player.playlist()),
            CallCommand::Mode => {
                let Some(mode) = arg
                    .as_ref()
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<PlayMode>().ok())
                else {
                    return CallReply::Ack(false);
                };
                player.mode(mode).await;
            }
            CallCommand::Configuration => match arg {
                Some(arg @ Value::Object(_)) => match serde_json::from_value(arg) {
                    Ok(runtime) => player.store().replace(runtime),
                    Err(e) => {
                        warn!(error = %e, "Rejected configuration payload");
                        return CallReply::Ack(false);
                    }
                },
                _ => return CallReply::Configuration(Box::new(player.store().runtime())),
            },
        }
        CallReply::Ack(true)
    }

    pub fn listen(&self, event: &str) -> Subscription {
        let Some(topic) = ListenTopic::from_name(event) else {
            debug!(event, "Unknown listen topic");
            return Subscription::Never;
        };

        let events = self.player.events();
        match topic {
            ListenTopic::PlayChanged => Subscription::PlayChanged(events.play.subscribe()),
            ListenTopic::AudioMuteChange => Subscription::AudioMuteChange(events.audio_mute.subscribe()),
            ListenTopic::Paused => Subscription::Paused(events.paused.subscribe()),
            ListenTopic::DisableChange => Subscription::DisableChange(events.disabled.subscribe()),
            ListenTopic::Progress => Subscription::Progress(events.progress.subscribe()),
            ListenTopic::PlaylistChange => Subscription::PlaylistChange(events.playlist.subscribe()),
            ListenTopic::Configuration => Subscription::Configuration(self.player.store().subscribe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, PlayStatus};
    use crate::persistence::MemoryStore;
    use crate::player::HeadlessSurface;
    use crate::resource::tests::entry_at;
    use serde_json::json;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    async fn setup() -> (CommandDispatcher, HeadlessSurface, JoinHandle<()>) {
        let store = ConfigStore::open(Arc::new(MemoryStore::new())).await.unwrap();
        let player = PlayerController::new(store);
        let (surface, rx) = HeadlessSurface::new(&[]);
        let pump = player
            .attach(
                Arc::new(surface.clone()),
                rx,
                vec![entry_at("/res", "a"), entry_at("/res", "b")],
            )
            .await;
        settle(&player).await;
        (CommandDispatcher::new(player), surface, pump)
    }

    async fn settle(player: &PlayerController) {
        tokio::time::sleep(Duration::from_millis(300)).await;
        player.store().settle().await;
    }

    #[test]
    fn test_vocabulary_lookup() {
        assert_eq!(CallCommand::from_name("toggle"), Some(CallCommand::Toggle));
        assert_eq!(CallCommand::from_name("shuffle"), None);
        assert_eq!(ListenTopic::from_name("sound"), Some(ListenTopic::AudioMuteChange));
        assert_eq!(ListenTopic::from_name("next"), Some(ListenTopic::PlayChanged));
        assert_eq!(ListenTopic::from_name("volume"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_call_is_false() {
        let (dispatcher, _surface, _pump) = setup().await;
        assert_eq!(dispatcher.call("shuffle", None).await, CallReply::Ack(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_and_seek_require_numbers() {
        let (dispatcher, surface, _pump) = setup().await;
        assert_eq!(dispatcher.call("volume", Some(json!("loud"))).await, CallReply::Ack(false));
        assert_eq!(dispatcher.call("seek", None).await, CallReply::Ack(false));

        assert_eq!(dispatcher.call("volume", Some(json!(0.25))).await, CallReply::Ack(true));
        assert_eq!(dispatcher.call("seek", Some(json!(42))).await, CallReply::Ack(true));
        settle(dispatcher.player()).await;

        assert_eq!(dispatcher.player().store().runtime().volume, 0.25);
        assert_eq!(surface.position(), 42.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_requires_known_string() {
        let (dispatcher, _surface, _pump) = setup().await;
        assert_eq!(dispatcher.call("mode", Some(json!(3))).await, CallReply::Ack(false));
        assert_eq!(dispatcher.call("mode", Some(json!("shuffle"))).await, CallReply::Ack(false));
        assert_eq!(dispatcher.call("mode", Some(json!("order"))).await, CallReply::Ack(true));
        assert_eq!(dispatcher.player().store().runtime().mode, PlayMode::Order);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_snapshot() {
        let (dispatcher, _surface, _pump) = setup().await;
        match dispatcher.call("playlist", None).await {
            CallReply::Playlist(entries) => {
                let names: Vec<_> = entries.iter().map(|e| e.dir_name.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_with_entry_and_with_garbage() {
        let (dispatcher, surface, _pump) = setup().await;
        let b = dispatcher.player().playlist()[1].clone();

        let reply = dispatcher
            .call("play", Some(serde_json::to_value(&b).unwrap()))
            .await;
        assert_eq!(reply, CallReply::Ack(true));
        assert_eq!(surface.current().map(|e| e.id), Some(b.id));

        let reply = dispatcher.call("play", Some(json!({ "name": 1 }))).await;
        assert_eq!(reply, CallReply::Ack(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_flips_status() {
        let (dispatcher, _surface, _pump) = setup().await;
        assert_eq!(dispatcher.call("toggle", None).await, CallReply::Ack(true));
        settle(dispatcher.player()).await;
        assert_eq!(dispatcher.player().store().runtime().status, PlayStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_get_and_replace() {
        let (dispatcher, _surface, _pump) = setup().await;

        let current = match dispatcher.call("configuration", None).await {
            CallReply::Configuration(runtime) => *runtime,
            other => panic!("unexpected reply: {other:?}"),
        };
        assert_eq!(current.status, PlayStatus::Playing);

        let mut replacement = serde_json::to_value(&current).unwrap();
        replacement["mute"] = json!(true);
        replacement["viewMode"] = json!(true);
        let reply = dispatcher.call("configuration", Some(replacement)).await;
        assert_eq!(reply, CallReply::Ack(true));
        dispatcher.player().store().settle().await;

        let persisted = dispatcher.player().store().persisted();
        assert!(persisted.mute);
        assert!(persisted.view_mode);

        let reply = dispatcher.call("configuration", Some(json!({ "volume": "max" }))).await;
        assert_eq!(reply, CallReply::Ack(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_mute_and_configuration() {
        let (dispatcher, _surface, _pump) = setup().await;
        let mut mute = dispatcher.listen("sound");
        let mut configuration = dispatcher.listen("configuration");

        dispatcher.call("mute", None).await;
        settle(dispatcher.player()).await;

        assert_eq!(mute.recv().await, Some(json!(true)));
        let snapshot = configuration.recv().await.unwrap();
        assert_eq!(snapshot["mute"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_listen_never_fires() {
        let (dispatcher, _surface, _pump) = setup().await;
        let mut never = dispatcher.listen("volume");
        assert!(matches!(never, Subscription::Never));

        dispatcher.call("mute", None).await;
        let waited = tokio::time::timeout(Duration::from_secs(1), never.recv()).await;
        assert!(waited.is_err());
    }
}
