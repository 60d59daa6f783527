//! Incremental catalog updates from filesystem notifications
//!
//! [`ResourceWatcher`] turns `notify` events on the resource root into
//! directory added/removed events; [`diff_dir_event`] turns those into
//! [`PlaylistChange`]s against the current catalog.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::resource::loader::validate_entry;
use crate::resource::parser::parse_resource;
use crate::resource::schema::SchemaRegistry;
use crate::resource::{PlaylistChange, WallpaperEntry};

/// Directory-level change directly under the resource root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEvent {
    Added(PathBuf),
    Removed(PathBuf),
}

pub struct ResourceWatcher {
    watcher: RecommendedWatcher,
    root: Arc<RwLock<PathBuf>>,
}

impl ResourceWatcher {
    /// Watch `root` non-recursively, forwarding directory events to `tx`
    pub fn start(root: &Path, tx: UnboundedSender<DirEvent>) -> notify::Result<Self> {
        let shared_root = Arc::new(RwLock::new(root.to_path_buf()));
        let callback_root = Arc::clone(&shared_root);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let root = match callback_root.read() {
                    Ok(root) => root.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                for dir_event in classify(&event, &root) {
                    let _ = tx.send(dir_event);
                }
            }
            Err(e) => error!(error = %e, "Resource watch error"),
        })?;

        watcher.watch(root, RecursiveMode::NonRecursive)?;
        info!(root = %root.display(), "Watching resource root");

        Ok(Self {
            watcher,
            root: shared_root,
        })
    }

    pub fn root(&self) -> PathBuf {
        match self.root.read() {
            Ok(root) => root.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Point the watcher at a new root
    pub fn restart(&mut self, new_root: &Path) -> notify::Result<()> {
        let old_root = self.root();
        if let Err(e) = self.watcher.unwatch(&old_root) {
            debug!(root = %old_root.display(), error = %e, "Old root was not being watched");
        }

        match self.root.write() {
            Ok(mut root) => *root = new_root.to_path_buf(),
            Err(poisoned) => *poisoned.into_inner() = new_root.to_path_buf(),
        }

        self.watcher.watch(new_root, RecursiveMode::NonRecursive)?;
        info!(old = %old_root.display(), new = %new_root.display(), "Resource watcher restarted");
        Ok(())
    }
}

fn is_direct_child(path: &Path, root: &Path) -> bool {
    path.parent() == Some(root)
}

/// Map a raw notification to directory events for direct children of `root`
pub fn classify(event: &Event, root: &Path) -> Vec<DirEvent> {
    let children = || event.paths.iter().filter(|p| is_direct_child(p, root));

    match &event.kind {
        EventKind::Create(CreateKind::Folder) => children().cloned().map(DirEvent::Added).collect(),
        EventKind::Create(CreateKind::Any) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            children()
                .filter(|p| p.is_dir())
                .cloned()
                .map(DirEvent::Added)
                .collect()
        }
        EventKind::Remove(RemoveKind::Folder | RemoveKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            children().cloned().map(DirEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::new();
            if let Some(from) = event.paths.first().filter(|p| is_direct_child(p, root)) {
                events.push(DirEvent::Removed(from.clone()));
            }
            if let Some(to) = event.paths.get(1).filter(|p| is_direct_child(p, root) && p.is_dir()) {
                events.push(DirEvent::Added(to.clone()));
            }
            events
        }
        EventKind::Modify(ModifyKind::Name(_)) => children()
            .map(|p| {
                if p.is_dir() {
                    DirEvent::Added(p.clone())
                } else {
                    DirEvent::Removed(p.clone())
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Diff one directory event against the current catalog
pub async fn diff_dir_event(
    registry: &SchemaRegistry,
    playlist: &[WallpaperEntry],
    event: DirEvent,
) -> Option<PlaylistChange> {
    match event {
        DirEvent::Added(path) => {
            let parsed = parse_resource(registry, &path).await?;
            let entry = WallpaperEntry::from_parsed(parsed);
            if let Err(e) = validate_entry(&entry).await {
                debug!(path = %path.display(), error = %e, "New package not playable yet");
                return None;
            }
            info!(path = %path.display(), name = %entry.name, "Wallpaper package added");
            Some(PlaylistChange::Added {
                configuration: entry,
            })
        }
        DirEvent::Removed(path) => {
            let entry = playlist.iter().find(|e| e.resource_path == path)?;
            info!(path = %path.display(), id = %entry.id, "Wallpaper package removed");
            Some(PlaylistChange::Deleted { id: entry.id })
        }
    }
}
