//! Control socket request handling

use anyhow::Result;
use std::path::PathBuf;
use tokio::net::UnixStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{CommandDispatcher, Subscription};
use crate::ipc::{ControlRequest, ControlResponse, ControlServer, read_message, write_message};

#[derive(Clone)]
struct HandlerContext {
    dispatcher: CommandDispatcher,
    relocate_tx: UnboundedSender<PathBuf>,
    shutdown: CancellationToken,
}

/// Accept control connections until `shutdown` is cancelled
pub fn spawn_ipc_listener(
    server: ControlServer,
    dispatcher: CommandDispatcher,
    relocate_tx: UnboundedSender<PathBuf>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let ctx = HandlerContext {
        dispatcher,
        relocate_tx,
        shutdown,
    };
    tokio::spawn(async move {
        if let Err(e) = run_ipc_loop(&server, &ctx).await {
            error!(error = ?e, "Control listener crashed");
        }
    })
}

async fn run_ipc_loop(server: &ControlServer, ctx: &HandlerContext) -> Result<()> {
    info!(socket = ?server.path(), "Control listener started");

    loop {
        let stream = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            accepted = server.accept() => accepted?,
        };

        debug!("Client connected");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, &ctx).await {
                warn!(error = ?e, "Control connection closed with error");
            }
            debug!("Client disconnected");
        });
    }

    info!("Control listener stopped");
    Ok(())
}

async fn handle_client(mut stream: UnixStream, ctx: &HandlerContext) -> Result<()> {
    loop {
        let request = match read_message::<_, ControlRequest>(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                debug!(error = ?e, "Connection closed");
                return Ok(());
            }
        };

        match request {
            ControlRequest::Call { event, arg } => {
                let reply = ctx.dispatcher.call(&event, arg).await;
                write_message(&mut stream, &ControlResponse::Reply(reply.into_value())).await?;
            }

            ControlRequest::Listen { event } => {
                info!(%event, "Client subscribed");
                let subscription = ctx.dispatcher.listen(&event);
                write_message(&mut stream, &ControlResponse::Ready).await?;
                return stream_events(stream, event, subscription, &ctx.shutdown).await;
            }

            ControlRequest::Relocate { path } => {
                info!(path = %path.display(), "Relocation requested");
                let response = match ctx.relocate_tx.send(path) {
                    Ok(()) => ControlResponse::Ready,
                    Err(_) => ControlResponse::Error("daemon is shutting down".to_string()),
                };
                write_message(&mut stream, &response).await?;
            }

            ControlRequest::Session { busy } => {
                ctx.dispatcher.player().on_session_busy(busy).await;
                write_message(&mut stream, &ControlResponse::Ready).await?;
            }

            ControlRequest::ScreenLock { locked } => {
                ctx.dispatcher.player().on_screen_locked(locked).await;
                write_message(&mut stream, &ControlResponse::Ready).await?;
            }

            ControlRequest::Ping => {
                write_message(&mut stream, &ControlResponse::Pong).await?;
            }

            ControlRequest::Shutdown => {
                info!("Received shutdown request via control socket");
                write_message(&mut stream, &ControlResponse::Ready).await?;
                ctx.shutdown.cancel();
                return Ok(());
            }
        }
    }
}

async fn stream_events(
    mut stream: UnixStream,
    event: String,
    mut subscription: Subscription,
    shutdown: &CancellationToken,
) -> Result<()> {
    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            payload = subscription.recv() => payload,
        };
        let Some(payload) = payload else {
            return Ok(());
        };
        let message = ControlResponse::Event {
            event: event.clone(),
            payload,
        };
        write_message(&mut stream, &message).await?;
    }
}
