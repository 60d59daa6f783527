use std::path::Path;
use uuid::Uuid;

use crate::resource::WallpaperEntry;

/// Ordered catalog, unique by resource path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    entries: Vec<WallpaperEntry>,
}

impl Playlist {
    pub fn new(entries: Vec<WallpaperEntry>) -> Self {
        let mut playlist = Self::default();
        playlist.replace(entries);
        playlist
    }

    pub fn entries(&self) -> &[WallpaperEntry] {
        &self.entries
    }

    /// Append unless an entry with the same play or resource path exists
    pub fn add(&mut self, entry: WallpaperEntry) -> bool {
        let duplicate = self
            .entries
            .iter()
            .any(|e| e.play_path == entry.play_path || e.resource_path == entry.resource_path);
        if duplicate {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, id: Uuid) -> Option<WallpaperEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Swap in a new catalog, dropping repeated resource paths
    pub fn replace(&mut self, entries: Vec<WallpaperEntry>) {
        self.entries.clear();
        for entry in entries {
            self.add(entry);
        }
    }

    pub fn find_by_play_path(&self, path: &Path) -> Option<&WallpaperEntry> {
        self.entries.iter().find(|e| e.play_path == path)
    }

    /// Map an entry from an earlier catalog onto this one via `new_root`
    pub fn translate(&self, entry: &WallpaperEntry, new_root: &Path) -> Option<WallpaperEntry> {
        let moved = entry.relocated(new_root)?;
        self.find_by_play_path(&moved.play_path).cloned()
    }
}
