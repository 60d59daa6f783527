//! Playback controller
//!
//! Owns the playlist and drives a single [`RenderSurface`]. Every control
//! operation waits for the surface to be attached, then turns the request into
//! surface commands; everything the surface reports back flows through
//! [`PlayerController::attach`]'s event pump into the configuration store and
//! the [`PlayerEvents`] streams.

pub mod events;
pub mod playlist;
pub mod surface;

pub use events::{PlayerEvents, Progress, Topic};
pub use playlist::Playlist;
pub use surface::{HeadlessSurface, PauseCancel, RenderSurface, SurfaceEvent};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BackgroundPolicy, ConfigStore, PlayMode, PlayStatus, RuntimeField};
use crate::constants::timing;
use crate::resource::{PlaylistChange, WallpaperEntry, validate_entry};

/// Resource root move in progress
struct Relocation {
    new_root: PathBuf,
    playing: Option<WallpaperEntry>,
    auto_disabled: bool,
}

#[derive(Default)]
struct ControllerState {
    playlist: Playlist,
    cancel_pause: Option<PauseCancel>,
    /// Disabled by the stored configuration at startup
    default_disabled: bool,
    /// Paused by the background policy
    background_pause: bool,
    relocation: Option<Relocation>,
}

pub struct PlayerController {
    store: Arc<ConfigStore>,
    events: PlayerEvents,
    ready: watch::Sender<Option<Arc<dyn RenderSurface>>>,
    state: Mutex<ControllerState>,
}

impl PlayerController {
    pub fn new(store: Arc<ConfigStore>) -> Arc<Self> {
        let (ready, _rx) = watch::channel(None);
        Arc::new(Self {
            store,
            events: PlayerEvents::default(),
            ready,
            state: Mutex::new(ControllerState::default()),
        })
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn events(&self) -> &PlayerEvents {
        &self.events
    }

    pub fn is_ready(&self) -> bool {
        self.ready.borrow().is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.store.read(|rt| rt.disabled)
    }

    pub fn playlist(&self) -> Vec<WallpaperEntry> {
        self.state.lock().unwrap().playlist.entries().to_vec()
    }

    pub async fn wait_ready(&self) {
        self.surface().await;
    }

    /// Resolves once a surface is attached
    async fn surface(&self) -> Arc<dyn RenderSurface> {
        let mut rx = self.ready.subscribe();
        loop {
            if let Some(surface) = rx.borrow_and_update().as_ref() {
                return Arc::clone(surface);
            }
            // The sender lives in `self`, so this only returns on a change
            let _ = rx.changed().await;
        }
    }

    /// Hand the initial playlist and the surface to the controller
    ///
    /// Fires the ready gate and applies the stored configuration. The returned
    /// handle is the surface event pump; it ends when the surface drops its
    /// event sender.
    pub async fn attach(
        self: &Arc<Self>,
        surface: Arc<dyn RenderSurface>,
        surface_events: UnboundedReceiver<SurfaceEvent>,
        playlist: Vec<WallpaperEntry>,
    ) -> JoinHandle<()> {
        let entries = {
            let mut state = self.state.lock().unwrap();
            state.playlist = Playlist::new(playlist);
            state.playlist.entries().to_vec()
        };
        surface.set_playlist(&entries);

        let pump = tokio::spawn(Arc::clone(self).pump(surface_events));
        if self.ready.send_replace(Some(Arc::clone(&surface))).is_some() {
            warn!("Surface replaced on an already attached player");
        }
        info!(entries = entries.len(), "Player ready");

        self.start(surface.as_ref()).await;
        pump
    }

    async fn start(&self, surface: &dyn RenderSurface) {
        let rt = self.store.runtime();
        surface.set_volume(rt.volume);
        surface.set_mute(rt.mute);
        surface.set_mode(rt.mode);

        let stored = match rt.wallpaper_configuration {
            Some(entry) => self.resolve_stored(entry).await,
            None => None,
        };

        if rt.disabled {
            if let Some(entry) = &stored {
                surface.set_current(entry);
            }
            surface.disable();
            self.state.lock().unwrap().default_disabled = true;
            info!("Player disabled by stored configuration");
            return;
        }

        self.play(stored).await;
    }

    /// Validate a stored entry and map it onto the current catalog
    async fn resolve_stored(&self, entry: WallpaperEntry) -> Option<WallpaperEntry> {
        if let Err(e) = validate_entry(&entry).await {
            warn!(path = %entry.play_path.display(), error = %e, "Stored wallpaper is no longer playable");
            return None;
        }
        let current = self
            .state
            .lock()
            .unwrap()
            .playlist
            .find_by_play_path(&entry.play_path)
            .cloned();
        Some(current.unwrap_or(entry))
    }

    pub async fn play(&self, entry: Option<WallpaperEntry>) {
        if self.is_disabled() {
            debug!("Play ignored while disabled");
            return;
        }
        let surface = self.surface().await;

        match entry {
            Some(entry) => surface.play(Some(&entry)),
            None => {
                let cancel = self.state.lock().unwrap().cancel_pause.take();
                match cancel {
                    Some(cancel) => cancel(),
                    None => surface.play(None),
                }
            }
        }
    }

    pub async fn pause(&self) {
        if self.is_disabled() {
            debug!("Pause ignored while disabled");
            return;
        }
        let surface = self.surface().await;

        let cancel = surface.pause();
        if self.state.lock().unwrap().cancel_pause.replace(cancel).is_some() {
            debug!("Pending pause overwritten, earlier pause can no longer be cancelled");
        }
        self.events.paused.fire(());
    }

    pub async fn next(&self) {
        let surface = self.surface().await;
        match surface.next() {
            Some(entry) => surface.play(Some(&entry)),
            None => surface.play(None),
        }
    }

    pub async fn prev(&self) {
        let surface = self.surface().await;
        match surface.prev() {
            Some(entry) => surface.play(Some(&entry)),
            None => surface.play(None),
        }
    }

    pub async fn mute(&self) {
        self.surface().await.set_mute(true);
    }

    pub async fn sound(&self) {
        self.surface().await.set_mute(false);
    }

    pub async fn set_volume(&self, volume: f64) {
        self.surface().await.set_volume(volume);
    }

    pub async fn seek(&self, seconds: f64) {
        self.surface().await.seek(seconds);
    }

    pub async fn disable(self: &Arc<Self>) {
        let surface = self.surface().await;
        surface.disable();
        self.set_if_changed(RuntimeField::Disabled(true));
    }

    pub async fn enable(self: &Arc<Self>) {
        let surface = self.surface().await;
        surface.enable();
        self.set_if_changed(RuntimeField::Disabled(false));

        let default_disabled = std::mem::take(&mut self.state.lock().unwrap().default_disabled);
        if default_disabled {
            info!("Starting playback held back by stored configuration");
            surface.play(None);
        }
    }

    pub async fn mode(self: &Arc<Self>, mode: PlayMode) {
        let surface = self.surface().await;
        self.set_if_changed(RuntimeField::Mode(mode));
        surface.set_mode(mode);
    }

    /// Pause when playing, play otherwise
    pub async fn toggle(&self) {
        if self.store.read(|rt| rt.status) == PlayStatus::Playing {
            self.pause().await;
        } else {
            self.play(None).await;
        }
    }

    /// Apply a catalog delta from discovery
    pub async fn apply_playlist_change(self: &Arc<Self>, change: PlaylistChange) {
        let surface = self.surface().await;

        match change {
            PlaylistChange::Added { configuration } => {
                let added = self.state.lock().unwrap().playlist.add(configuration.clone());
                if !added {
                    debug!(path = %configuration.play_path.display(), "Duplicate wallpaper ignored");
                    return;
                }
                surface.add_entry(&configuration);
                info!(name = %configuration.name, "Wallpaper added to playlist");
                self.events.playlist.fire(PlaylistChange::Added { configuration });
            }
            PlaylistChange::Deleted { id } => {
                let removed = self.state.lock().unwrap().playlist.remove(id);
                if removed.is_none() {
                    debug!(%id, "Deleted wallpaper was not in the playlist");
                    return;
                }
                surface.remove_entry(id);
                info!(%id, "Wallpaper removed from playlist");
                self.events.playlist.fire(PlaylistChange::Deleted { id });
            }
            PlaylistChange::All { configuration } => {
                self.replace_playlist(surface.as_ref(), configuration).await;
            }
        }
    }

    async fn replace_playlist(self: &Arc<Self>, surface: &dyn RenderSurface, entries: Vec<WallpaperEntry>) {
        let (entries, relocation) = {
            let mut state = self.state.lock().unwrap();
            state.playlist.replace(entries);
            (state.playlist.entries().to_vec(), state.relocation.take())
        };
        surface.set_playlist(&entries);
        info!(entries = entries.len(), "Playlist replaced");
        self.events.playlist.fire(PlaylistChange::All {
            configuration: entries,
        });

        let target = match &relocation {
            Some(relocation) => relocation.playing.as_ref().and_then(|entry| {
                self.state
                    .lock()
                    .unwrap()
                    .playlist
                    .translate(entry, &relocation.new_root)
            }),
            None => self.store.read(|rt| rt.wallpaper_configuration.clone()).and_then(|entry| {
                self.state
                    .lock()
                    .unwrap()
                    .playlist
                    .find_by_play_path(&entry.play_path)
                    .cloned()
            }),
        };

        if relocation.as_ref().is_some_and(|r| r.auto_disabled) {
            self.enable().await;
        }

        tokio::time::sleep(Duration::from_millis(timing::REPLAY_DELAY_MS)).await;
        self.play(target).await;
    }

    /// Suspend playback ahead of a resource root move
    ///
    /// The next `All` change is treated as the relocated catalog.
    pub async fn begin_relocation(self: &Arc<Self>, new_root: PathBuf) {
        let surface = self.surface().await;
        let (disabled, playing) = self
            .store
            .read(|rt| (rt.disabled, rt.wallpaper_configuration.clone()));

        surface.release();
        if !disabled {
            self.disable().await;
        }
        info!(root = %new_root.display(), "Relocating resource root");

        self.state.lock().unwrap().relocation = Some(Relocation {
            new_root,
            playing,
            auto_disabled: !disabled,
        });
    }

    /// Background policy: another application has (or lost) the foreground
    pub async fn on_session_busy(self: &Arc<Self>, busy: bool) {
        let (policy, disabled) = self.store.read(|rt| (rt.user_settings.background, rt.disabled));
        let (pause_pending, paused_by_us) = {
            let state = self.state.lock().unwrap();
            (state.cancel_pause.is_some(), state.background_pause)
        };

        if busy && policy == BackgroundPolicy::Pause && !pause_pending && !disabled {
            self.pause().await;
            self.state.lock().unwrap().background_pause = true;
            debug!("Paused for background session");
        } else if !busy && paused_by_us {
            self.play(None).await;
            self.state.lock().unwrap().background_pause = false;
            debug!("Resumed after background session");
        }
    }

    pub async fn on_screen_locked(self: &Arc<Self>, locked: bool) {
        if locked {
            self.disable().await;
        } else {
            self.enable().await;
        }
    }

    fn set_if_changed(self: &Arc<Self>, field: RuntimeField) {
        let current = self.store.runtime();
        let unchanged = match &field {
            RuntimeField::Disabled(v) => current.disabled == *v,
            RuntimeField::Mute(v) => current.mute == *v,
            RuntimeField::Volume(v) => current.volume == *v,
            RuntimeField::Mode(v) => current.mode == *v,
            RuntimeField::Status(v) => current.status == *v,
            _ => false,
        };
        if !unchanged {
            self.store.set(field);
        }
    }

    async fn pump(self: Arc<Self>, mut events: UnboundedReceiver<SurfaceEvent>) {
        let window = Duration::from_millis(timing::PLAY_CHANGE_DEBOUNCE_MS);
        let debounce = tokio::time::sleep(window);
        tokio::pin!(debounce);
        let mut pending: Option<WallpaperEntry> = None;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SurfaceEvent::PlayChange(entry)) => {
                        pending = Some(entry);
                        debounce.as_mut().reset(Instant::now() + window);
                    }
                    Some(event) => self.handle_surface_event(event).await,
                    None => break,
                },
                () = &mut debounce, if pending.is_some() => {
                    if let Some(entry) = pending.take() {
                        self.on_play_change(entry);
                    }
                }
            }
        }

        if let Some(entry) = pending.take() {
            self.on_play_change(entry);
        }
        debug!("Surface event stream closed");
    }

    fn on_play_change(self: &Arc<Self>, entry: WallpaperEntry) {
        let cancel = self.state.lock().unwrap().cancel_pause.take();
        if let Some(cancel) = cancel {
            cancel();
        }
        self.store
            .set(RuntimeField::WallpaperConfiguration(Some(entry.clone())));
        self.store.set(RuntimeField::Status(PlayStatus::Playing));
        debug!(name = %entry.name, "Now playing");
        self.events.play.fire(entry);
    }

    async fn handle_surface_event(self: &Arc<Self>, event: SurfaceEvent) {
        match event {
            SurfaceEvent::PlayRestore => self.set_if_changed(RuntimeField::Status(PlayStatus::Playing)),
            SurfaceEvent::PlayChange(entry) => self.on_play_change(entry),
            SurfaceEvent::Pause => self.set_if_changed(RuntimeField::Status(PlayStatus::Paused)),
            SurfaceEvent::DisabledChange { disabled } => {
                self.set_if_changed(RuntimeField::Disabled(disabled));
                self.events.disabled.fire(disabled);
            }
            SurfaceEvent::Progress {
                now_time,
                total_time,
            } => self.events.progress.fire(Progress {
                current_time: now_time,
                duration: total_time,
            }),
            SurfaceEvent::Ended => self.on_ended().await,
            SurfaceEvent::AudioMuteChange { mute } => {
                self.set_if_changed(RuntimeField::Mute(mute));
                self.events.audio_mute.fire(mute);
            }
            SurfaceEvent::VolumeChange { volume } => {
                self.set_if_changed(RuntimeField::Volume(volume));
            }
            SurfaceEvent::ModeChange { mode } => self.set_if_changed(RuntimeField::Mode(mode)),
        }
    }

    /// End-of-content policy
    async fn on_ended(self: &Arc<Self>) {
        match self.store.read(|rt| rt.mode) {
            PlayMode::Single => {
                debug!("Wallpaper ended, single mode stops");
                self.set_if_changed(RuntimeField::Status(PlayStatus::Paused));
            }
            PlayMode::ListLoop | PlayMode::Order => self.next().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserSettings;
    use crate::constants::documents;
    use crate::persistence::{Document, DocumentStore, MemoryStore};
    use crate::resource::tests::entry_at;
    use serde_json::{Value, json};
    use std::path::Path;
    use uuid::Uuid;

    /// Headless surface that records every command it receives
    struct RecordingSurface {
        inner: HeadlessSurface,
        calls: Arc<Mutex<Vec<String>>>,
        pauses: Mutex<usize>,
    }

    impl RecordingSurface {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn take_calls(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl RenderSurface for RecordingSurface {
        fn play(&self, entry: Option<&WallpaperEntry>) {
            match entry {
                Some(entry) => self.record(format!("play({})", entry.dir_name)),
                None => self.record("play"),
            }
            self.inner.play(entry);
        }

        fn pause(&self) -> PauseCancel {
            let n = {
                let mut pauses = self.pauses.lock().unwrap();
                *pauses += 1;
                *pauses
            };
            self.record("pause");
            let cancel = self.inner.pause();
            let calls = Arc::clone(&self.calls);
            Box::new(move || {
                calls.lock().unwrap().push(format!("cancel#{n}"));
                cancel();
            })
        }

        fn next(&self) -> Option<WallpaperEntry> {
            self.record("next");
            self.inner.next()
        }

        fn prev(&self) -> Option<WallpaperEntry> {
            self.record("prev");
            self.inner.prev()
        }

        fn set_volume(&self, volume: f64) {
            self.record(format!("volume({volume})"));
            self.inner.set_volume(volume);
        }

        fn set_mute(&self, mute: bool) {
            self.record(format!("mute({mute})"));
            self.inner.set_mute(mute);
        }

        fn seek(&self, seconds: f64) {
            self.record(format!("seek({seconds})"));
            self.inner.seek(seconds);
        }

        fn set_mode(&self, mode: PlayMode) {
            self.record(format!("mode({mode})"));
            self.inner.set_mode(mode);
        }

        fn disable(&self) {
            self.record("disable");
            self.inner.disable();
        }

        fn enable(&self) {
            self.record("enable");
            self.inner.enable();
        }

        fn set_current(&self, entry: &WallpaperEntry) {
            self.record(format!("current({})", entry.dir_name));
            self.inner.set_current(entry);
        }

        fn add_entry(&self, entry: &WallpaperEntry) {
            self.record(format!("add({})", entry.dir_name));
            self.inner.add_entry(entry);
        }

        fn remove_entry(&self, id: Uuid) {
            self.record("remove");
            self.inner.remove_entry(id);
        }

        fn set_playlist(&self, entries: &[WallpaperEntry]) {
            self.record(format!("playlist({})", entries.len()));
            self.inner.set_playlist(entries);
        }

        fn release(&self) {
            self.record("release");
            self.inner.release();
        }
    }

    struct Harness {
        controller: Arc<PlayerController>,
        surface: Arc<RecordingSurface>,
        _pump: JoinHandle<()>,
    }

    impl Harness {
        async fn start(entries: Vec<WallpaperEntry>, stored: Option<Value>) -> Self {
            let docs = Arc::new(MemoryStore::new());
            if let Some(data) = stored {
                docs.put(Document::new(documents::CONFIGURATION, data, None))
                    .await
                    .unwrap();
            }
            let store = ConfigStore::open(docs).await.unwrap();
            let controller = PlayerController::new(store);

            let (inner, rx) = HeadlessSurface::new(&[]);
            let surface = Arc::new(RecordingSurface {
                inner,
                calls: Arc::new(Mutex::new(Vec::new())),
                pauses: Mutex::new(0),
            });
            let pump = controller.attach(surface.clone(), rx, entries).await;
            let harness = Self {
                controller,
                surface,
                _pump: pump,
            };
            harness.settle().await;
            harness
        }

        /// Let the event pump drain and queued writes land
        async fn settle(&self) {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.controller.store().settle().await;
        }

        fn status(&self) -> PlayStatus {
            self.controller.store().read(|rt| rt.status)
        }
    }

    fn catalog(root: &str) -> Vec<WallpaperEntry> {
        vec![entry_at(root, "a"), entry_at(root, "b"), entry_at(root, "c")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_plays_first_entry() {
        let h = Harness::start(catalog("/res"), None).await;
        assert_eq!(
            h.surface.take_calls(),
            vec!["playlist(3)", "volume(0.5)", "mute(false)", "mode(list-loop)", "play"]
        );
        assert_eq!(h.status(), PlayStatus::Playing);
        let current = h.controller.store().read(|rt| rt.wallpaper_configuration.clone());
        assert_eq!(current.map(|e| e.dir_name), Some("a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_after_pause_resumes_via_cancel() {
        let h = Harness::start(catalog("/res"), None).await;
        h.surface.take_calls();

        h.controller.pause().await;
        h.settle().await;
        assert_eq!(h.status(), PlayStatus::Paused);

        h.controller.play(None).await;
        h.settle().await;
        assert_eq!(h.surface.take_calls(), vec!["pause", "cancel#1"]);
        assert_eq!(h.status(), PlayStatus::Playing);

        h.controller.play(None).await;
        assert_eq!(h.surface.take_calls(), vec!["play"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pause_drops_first_cancel() {
        let h = Harness::start(catalog("/res"), None).await;
        h.surface.take_calls();

        h.controller.pause().await;
        h.controller.pause().await;
        h.controller.play(None).await;
        h.settle().await;

        assert_eq!(h.surface.take_calls(), vec!["pause", "pause", "cancel#2"]);
        assert!(h.surface.inner.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_ignores_play_and_pause() {
        let h = Harness::start(catalog("/res"), None).await;
        h.controller.disable().await;
        h.settle().await;
        h.surface.take_calls();

        h.controller.play(None).await;
        h.controller.pause().await;
        h.controller.play(Some(entry_at("/res", "b"))).await;
        assert!(h.surface.take_calls().is_empty());
        assert!(h.controller.is_disabled());

        h.controller.enable().await;
        h.settle().await;
        assert_eq!(h.surface.take_calls(), vec!["enable"]);
        assert!(!h.controller.is_disabled());
        assert!(!h.controller.store().persisted().disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_mode_stops_at_end() {
        let h = Harness::start(catalog("/res"), None).await;
        h.controller.mode(PlayMode::Single).await;
        h.settle().await;
        h.surface.take_calls();

        h.surface.inner.finish();
        h.settle().await;

        assert!(h.surface.take_calls().is_empty());
        assert_eq!(h.status(), PlayStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_and_order_advance_at_end() {
        for mode in [PlayMode::ListLoop, PlayMode::Order] {
            let h = Harness::start(catalog("/res"), None).await;
            h.controller.mode(mode).await;
            h.settle().await;
            h.surface.take_calls();

            h.surface.inner.finish();
            h.settle().await;

            assert_eq!(h.surface.take_calls(), vec!["next", "play(b)"], "mode {mode}");
            assert_eq!(h.status(), PlayStatus::Playing);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_changes_are_debounced() {
        let entries = catalog("/res");
        let h = Harness::start(entries.clone(), None).await;
        let mut played = h.controller.events().play.subscribe();

        h.controller.play(Some(entries[1].clone())).await;
        h.controller.play(Some(entries[2].clone())).await;
        h.settle().await;

        assert_eq!(played.recv().await.unwrap().dir_name, "c");
        assert!(played.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_wait_for_ready() {
        let store = ConfigStore::open(Arc::new(MemoryStore::new())).await.unwrap();
        let controller = PlayerController::new(store);

        let early = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.mute().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!early.is_finished());
        assert!(!controller.is_ready());

        let (surface, rx) = HeadlessSurface::new(&[]);
        let _pump = controller.attach(Arc::new(surface), rx, catalog("/res")).await;
        early.await.unwrap();
        assert!(controller.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_disabled_holds_playback_until_enable() {
        let root = tempfile::tempdir().unwrap();
        let pkg = root.path().join("b");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(pkg.join("video.mp4"), b"media").unwrap();
        let root_str = root.path().to_str().unwrap();
        let stored = entry_at(root_str, "b");

        let h = Harness::start(
            catalog(root_str),
            Some(json!({
                "disabled": true,
                "wallpaper": { "configuration": stored },
            })),
        )
        .await;
        let calls = h.surface.take_calls();
        assert!(calls.contains(&"current(b)".to_string()));
        assert!(calls.contains(&"disable".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("play")));

        h.controller.play(None).await;
        assert!(h.surface.take_calls().is_empty());

        h.controller.enable().await;
        h.settle().await;
        assert_eq!(h.surface.take_calls(), vec!["enable", "play"]);
        assert_eq!(h.surface.inner.current().map(|e| e.dir_name), Some("b".to_string()));
        assert_eq!(h.status(), PlayStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_added_and_deleted_changes() {
        let h = Harness::start(catalog("/res"), None).await;
        let mut changes = h.controller.events().playlist.subscribe();
        h.surface.take_calls();

        h.controller
            .apply_playlist_change(PlaylistChange::Added {
                configuration: entry_at("/res", "a"),
            })
            .await;
        assert_eq!(h.controller.playlist().len(), 3);

        let d = entry_at("/res", "d");
        h.controller
            .apply_playlist_change(PlaylistChange::Added {
                configuration: d.clone(),
            })
            .await;
        h.controller
            .apply_playlist_change(PlaylistChange::Deleted { id: d.id })
            .await;
        h.controller
            .apply_playlist_change(PlaylistChange::Deleted { id: d.id })
            .await;

        assert_eq!(h.surface.take_calls(), vec!["add(d)", "remove"]);
        assert!(matches!(changes.recv().await.unwrap(), PlaylistChange::Added { .. }));
        assert_eq!(changes.recv().await.unwrap(), PlaylistChange::Deleted { id: d.id });
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relocation_resumes_translated_entry() {
        let h = Harness::start(catalog("/old"), None).await;
        h.controller.next().await;
        h.settle().await;
        h.surface.take_calls();

        h.controller.begin_relocation(PathBuf::from("/new")).await;
        h.settle().await;
        assert_eq!(h.surface.take_calls(), vec!["release", "disable"]);
        assert!(h.controller.is_disabled());

        let moved = vec![entry_at("/new", "c"), entry_at("/new", "b")];
        let expected = moved[1].id;
        h.controller
            .apply_playlist_change(PlaylistChange::All { configuration: moved })
            .await;
        h.settle().await;

        assert_eq!(h.surface.take_calls(), vec!["playlist(2)", "enable", "play(b)"]);
        assert!(!h.controller.is_disabled());
        let current = h.controller.store().read(|rt| rt.wallpaper_configuration.clone());
        assert_eq!(current.map(|e| e.id), Some(expected));
        assert_eq!(
            h.controller.playlist()[1].resource_path,
            Path::new("/new/b").to_path_buf()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_policy_pauses_and_resumes() {
        let h = Harness::start(catalog("/res"), None).await;
        h.controller.store().set(RuntimeField::UserSettings(UserSettings {
            background: BackgroundPolicy::Pause,
            ..Default::default()
        }));
        h.surface.take_calls();

        h.controller.on_session_busy(true).await;
        h.settle().await;
        assert_eq!(h.status(), PlayStatus::Paused);

        h.controller.on_session_busy(false).await;
        h.settle().await;
        assert_eq!(h.status(), PlayStatus::Playing);
        assert_eq!(h.surface.take_calls(), vec!["pause", "cancel#1"]);

        h.controller.on_session_busy(false).await;
        assert!(h.surface.take_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_policy_play_keeps_running() {
        let h = Harness::start(catalog("/res"), None).await;
        h.surface.take_calls();

        h.controller.on_session_busy(true).await;
        assert!(h.surface.take_calls().is_empty());
        assert_eq!(h.status(), PlayStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_screen_lock() {
        let h = Harness::start(catalog("/res"), None).await;
        h.surface.take_calls();

        h.controller.toggle().await;
        h.settle().await;
        assert_eq!(h.status(), PlayStatus::Paused);
        h.controller.toggle().await;
        h.settle().await;
        assert_eq!(h.status(), PlayStatus::Playing);

        h.controller.on_screen_locked(true).await;
        h.settle().await;
        assert!(h.controller.is_disabled());
        h.controller.on_screen_locked(false).await;
        h.settle().await;
        assert!(!h.controller.is_disabled());
    }
}
