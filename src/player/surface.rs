//! Rendering surface seam
//!
//! The surface paints wallpapers; the controller only tells it what to play.
//! [`HeadlessSurface`] tracks playback state without rendering anything and is
//! what the daemon drives when no renderer is attached.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PlayMode;
use crate::resource::WallpaperEntry;

/// Undoes an in-flight pause
pub type PauseCancel = Box<dyn FnOnce() + Send>;

pub trait RenderSurface: Send + Sync {
    /// Play `entry`, or resume whatever is current
    fn play(&self, entry: Option<&WallpaperEntry>);
    fn pause(&self) -> PauseCancel;
    fn next(&self) -> Option<WallpaperEntry>;
    fn prev(&self) -> Option<WallpaperEntry>;
    fn set_volume(&self, volume: f64);
    fn set_mute(&self, mute: bool);
    fn seek(&self, seconds: f64);
    fn set_mode(&self, mode: PlayMode);
    fn disable(&self);
    fn enable(&self);
    /// Select an entry without starting playback
    fn set_current(&self, entry: &WallpaperEntry);
    fn add_entry(&self, entry: &WallpaperEntry);
    fn remove_entry(&self, id: Uuid);
    fn set_playlist(&self, entries: &[WallpaperEntry]);
    /// Drop rendering resources ahead of a resource root move
    fn release(&self);
}

/// Notifications coming back from the surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SurfaceEvent {
    PlayRestore,
    PlayChange(WallpaperEntry),
    Pause,
    DisabledChange { disabled: bool },
    #[serde(rename_all = "camelCase")]
    Progress { now_time: f64, total_time: f64 },
    Ended,
    AudioMuteChange { mute: bool },
    VolumeChange { volume: f64 },
    ModeChange { mode: PlayMode },
}

#[derive(Debug, Default)]
struct HeadlessState {
    playlist: Vec<WallpaperEntry>,
    current: Option<WallpaperEntry>,
    playing: bool,
    disabled: bool,
    released: bool,
    mode: PlayMode,
    position: f64,
}

impl HeadlessState {
    fn current_index(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        self.playlist
            .iter()
            .position(|e| e.resource_path == current.resource_path)
    }

    fn step(&self, forward: bool) -> Option<WallpaperEntry> {
        let len = self.playlist.len();
        if len == 0 {
            return None;
        }
        let index = match self.current_index() {
            None => 0,
            Some(i) => {
                let wrap = self.mode == PlayMode::ListLoop;
                match (forward, i) {
                    (true, i) if i + 1 < len => i + 1,
                    (true, _) if wrap => 0,
                    (false, 0) if wrap => len - 1,
                    (false, i) if i > 0 => i - 1,
                    _ => return None,
                }
            }
        };
        self.playlist.get(index).cloned()
    }
}

/// Surface that keeps playback state in memory
#[derive(Clone)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
    events: UnboundedSender<SurfaceEvent>,
}

impl HeadlessSurface {
    pub fn new(playlist: &[WallpaperEntry]) -> (Self, UnboundedReceiver<SurfaceEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let state = HeadlessState {
            playlist: playlist.to_vec(),
            ..Default::default()
        };
        (
            Self {
                state: Arc::new(Mutex::new(state)),
                events,
            },
            rx,
        )
    }

    pub fn current(&self) -> Option<WallpaperEntry> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap().released
    }

    /// Last seek target in seconds
    pub fn position(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    /// Report the end of the current wallpaper
    pub fn finish(&self) {
        self.state.lock().unwrap().playing = false;
        self.emit(SurfaceEvent::Ended);
    }

    fn emit(&self, event: SurfaceEvent) {
        if self.events.send(event).is_err() {
            debug!("Surface event dropped, controller gone");
        }
    }
}

impl RenderSurface for HeadlessSurface {
    fn play(&self, entry: Option<&WallpaperEntry>) {
        let event = {
            let mut state = self.state.lock().unwrap();
            if state.disabled {
                return;
            }
            state.released = false;
            match entry {
                Some(entry) => {
                    state.current = Some(entry.clone());
                    state.playing = true;
                    state.position = 0.0;
                    Some(SurfaceEvent::PlayChange(entry.clone()))
                }
                None => match state.current.clone() {
                    Some(_) if state.playing => None,
                    Some(_) => {
                        state.playing = true;
                        Some(SurfaceEvent::PlayRestore)
                    }
                    None => state.playlist.first().cloned().map(|first| {
                        state.current = Some(first.clone());
                        state.playing = true;
                        SurfaceEvent::PlayChange(first)
                    }),
                },
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn pause(&self) -> PauseCancel {
        let was_playing = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut state.playing, false)
        };
        if was_playing {
            self.emit(SurfaceEvent::Pause);
        }

        let surface = self.clone();
        Box::new(move || {
            let resumed = {
                let mut state = surface.state.lock().unwrap();
                if state.disabled || state.playing || state.current.is_none() {
                    false
                } else {
                    state.playing = true;
                    true
                }
            };
            if resumed {
                surface.emit(SurfaceEvent::PlayRestore);
            }
        })
    }

    fn next(&self) -> Option<WallpaperEntry> {
        self.state.lock().unwrap().step(true)
    }

    fn prev(&self) -> Option<WallpaperEntry> {
        self.state.lock().unwrap().step(false)
    }

    fn set_volume(&self, volume: f64) {
        self.emit(SurfaceEvent::VolumeChange {
            volume: volume.clamp(0.0, 1.0),
        });
    }

    fn set_mute(&self, mute: bool) {
        self.emit(SurfaceEvent::AudioMuteChange { mute });
    }

    fn seek(&self, seconds: f64) {
        self.state.lock().unwrap().position = seconds.max(0.0);
    }

    fn set_mode(&self, mode: PlayMode) {
        self.state.lock().unwrap().mode = mode;
        self.emit(SurfaceEvent::ModeChange { mode });
    }

    fn disable(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.disabled = true;
            state.playing = false;
        }
        self.emit(SurfaceEvent::DisabledChange { disabled: true });
    }

    fn enable(&self) {
        self.state.lock().unwrap().disabled = false;
        self.emit(SurfaceEvent::DisabledChange { disabled: false });
    }

    fn set_current(&self, entry: &WallpaperEntry) {
        self.state.lock().unwrap().current = Some(entry.clone());
    }

    fn add_entry(&self, entry: &WallpaperEntry) {
        let mut state = self.state.lock().unwrap();
        if !state
            .playlist
            .iter()
            .any(|e| e.resource_path == entry.resource_path)
        {
            state.playlist.push(entry.clone());
        }
    }

    fn remove_entry(&self, id: Uuid) {
        self.state.lock().unwrap().playlist.retain(|e| e.id != id);
    }

    fn set_playlist(&self, entries: &[WallpaperEntry]) {
        self.state.lock().unwrap().playlist = entries.to_vec();
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.playing = false;
        state.released = true;
        info!("Surface released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::entry_at;

    fn playlist() -> Vec<WallpaperEntry> {
        vec![entry_at("/res", "a"), entry_at("/res", "b"), entry_at("/res", "c")]
    }

    #[test]
    fn test_bare_play_starts_first_entry() {
        let entries = playlist();
        let (surface, mut rx) = HeadlessSurface::new(&entries);
        surface.play(None);

        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::PlayChange(entries[0].clone()));
        assert!(surface.is_playing());
    }

    #[test]
    fn test_pause_cancel_resumes() {
        let entries = playlist();
        let (surface, mut rx) = HeadlessSurface::new(&entries);
        surface.play(Some(&entries[1]));
        let cancel = surface.pause();
        assert!(!surface.is_playing());

        cancel();
        assert!(surface.is_playing());
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                SurfaceEvent::PlayChange(entries[1].clone()),
                SurfaceEvent::Pause,
                SurfaceEvent::PlayRestore,
            ]
        );
    }

    #[test]
    fn test_next_wraps_only_in_list_loop() {
        let entries = playlist();
        let (surface, _rx) = HeadlessSurface::new(&entries);
        surface.set_current(&entries[2]);

        surface.set_mode(PlayMode::ListLoop);
        assert_eq!(surface.next().map(|e| e.id), Some(entries[0].id));

        surface.set_mode(PlayMode::Order);
        assert!(surface.next().is_none());
        assert_eq!(surface.prev().map(|e| e.id), Some(entries[1].id));
    }

    #[test]
    fn test_release_then_play_reacquires() {
        let entries = playlist();
        let (surface, _rx) = HeadlessSurface::new(&entries);
        surface.play(Some(&entries[0]));
        surface.seek(12.5);
        assert_eq!(surface.position(), 12.5);

        surface.release();
        assert!(surface.is_released());
        assert!(!surface.is_playing());

        surface.play(None);
        assert!(!surface.is_released());
        assert!(surface.is_playing());
    }

    #[test]
    fn test_disabled_surface_ignores_play() {
        let entries = playlist();
        let (surface, mut rx) = HeadlessSurface::new(&entries);
        surface.disable();
        surface.play(Some(&entries[0]));

        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::DisabledChange { disabled: true });
        assert!(rx.try_recv().is_err());
        assert!(surface.current().is_none());
    }
}
