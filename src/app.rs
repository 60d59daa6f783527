//! Daemon wiring
//!
//! Opens the configuration store, loads the catalog, attaches the player to
//! a surface and then services filesystem changes, root relocations and the
//! control socket until shutdown.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ConfigStore};
use crate::dispatch::CommandDispatcher;
use crate::ipc::{ControlServer, spawn_ipc_listener};
use crate::native::{DesktopNative, NativeService};
use crate::persistence::{DocumentStore, JsonFileStore};
use crate::player::{HeadlessSurface, PlayerController};
use crate::resource::{
    DirEvent, PlaylistChange, ResourceWatcher, SchemaRegistry, WallpaperLoader, diff_dir_event,
};

pub struct Daemon {
    config: AppConfig,
    /// Where a relocated resource root is persisted
    config_path: Option<PathBuf>,
    documents: Arc<dyn DocumentStore>,
    native: Arc<dyn NativeService>,
}

impl Daemon {
    /// Daemon backed by the on-disk document store and the desktop services
    pub async fn open(config: AppConfig, config_path: PathBuf) -> Result<Self> {
        let db_dir = AppConfig::db_dir();
        let documents = JsonFileStore::open(&db_dir)
            .await
            .with_context(|| format!("Failed to open configuration store at {}", db_dir.display()))?;
        Ok(Self {
            config,
            config_path: Some(config_path),
            documents: Arc::new(documents),
            native: Arc::new(DesktopNative),
        })
    }

    pub fn with_services(
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        native: Arc<dyn NativeService>,
    ) -> Self {
        Self {
            config,
            config_path: None,
            documents,
            native,
        }
    }

    /// Run until `shutdown` is cancelled or the process receives Ctrl-C
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let store = ConfigStore::open(Arc::clone(&self.documents))
            .await
            .context("Failed to open configuration")?;
        let player = PlayerController::new(Arc::clone(&store));

        let registry = Arc::new(SchemaRegistry::with_builtin());
        let loader = WallpaperLoader::new(
            Arc::clone(&registry),
            Arc::clone(&self.native),
            self.config.bundled_archive(),
        );
        let playlist = loader.initialize(&self.config.resource_path).await;

        let (surface, surface_events) = HeadlessSurface::new(&playlist);
        let pump = player
            .attach(Arc::new(surface), surface_events, playlist)
            .await;

        let (dir_tx, mut dir_rx) = mpsc::unbounded_channel();
        let mut watcher = start_watcher(&self.config.resource_path, dir_tx.clone());

        let (relocate_tx, mut relocate_rx) = mpsc::unbounded_channel();
        let server = ControlServer::bind_to(self.config.socket_path()?)?;
        let listener = spawn_ipc_listener(
            server,
            CommandDispatcher::new(Arc::clone(&player)),
            relocate_tx,
            shutdown.clone(),
        );

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, shutting down");
                    signal_token.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });

        info!(root = %self.config.resource_path.display(), "Wallpaper daemon running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = dir_rx.recv() => {
                    let current = player.playlist();
                    if let Some(change) = diff_dir_event(&registry, &current, event).await {
                        player.apply_playlist_change(change).await;
                    }
                }
                Some(new_root) = relocate_rx.recv() => {
                    self.relocate(&player, &loader, &mut watcher, &dir_tx, new_root).await;
                }
            }
        }

        info!("Shutting down");
        if let Err(e) = listener.await {
            warn!(error = %e, "Control listener task failed");
        }
        pump.abort();
        store.settle().await;
        Ok(())
    }

    async fn relocate(
        &mut self,
        player: &Arc<PlayerController>,
        loader: &WallpaperLoader,
        watcher: &mut Option<ResourceWatcher>,
        dir_tx: &UnboundedSender<DirEvent>,
        new_root: PathBuf,
    ) {
        info!(
            from = %self.config.resource_path.display(),
            to = %new_root.display(),
            "Relocating resource root"
        );
        player.begin_relocation(new_root.clone()).await;

        match watcher {
            Some(watcher) => {
                if let Err(e) = watcher.restart(&new_root) {
                    warn!(root = %new_root.display(), error = %e, "Failed to watch new resource root");
                }
            }
            None => *watcher = start_watcher(&new_root, dir_tx.clone()),
        }

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let catalog = match loader.load_with_retry(&new_root).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(root = %new_root.display(), error = %e, "Relocated root could not be loaded");
                Vec::new()
            }
        };
        player
            .apply_playlist_change(PlaylistChange::All {
                configuration: catalog,
            })
            .await;

        self.config.resource_path = new_root;
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to(path) {
                warn!(error = ?e, "Failed to persist relocated resource root");
            }
        }
    }
}

fn start_watcher(root: &Path, tx: UnboundedSender<DirEvent>) -> Option<ResourceWatcher> {
    match ResourceWatcher::start(root, tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Resource watching disabled");
            None
        }
    }
}
