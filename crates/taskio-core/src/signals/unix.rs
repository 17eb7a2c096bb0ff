use async_trait::async_trait;
use std::sync::Arc;
use taskio_protocol::WindowSize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{SignalEvent, SignalWatcher};
use crate::error::{TaskIoError, TerminalError};
use crate::terminal::Terminal;

/// Watcher backed by SIGWINCH, SIGINT and SIGTERM
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixSignalWatcher;

async fn emit(
    events: &mpsc::Sender<SignalEvent>,
    event: SignalEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

#[async_trait]
impl SignalWatcher for UnixSignalWatcher {
    async fn watch(
        &self,
        terminal: Arc<dyn Terminal>,
        events: mpsc::Sender<SignalEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TaskIoError> {
        let mut winch = signal(SignalKind::window_change())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        // Zero size first, so the remote always observes a change.
        if !emit(&events, SignalEvent::Resize(WindowSize::default()), &cancel).await {
            return Ok(());
        }
        let size = terminal.size().map_err(TerminalError::Size)?;
        if !emit(&events, SignalEvent::Resize(size), &cancel).await {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Signal watcher cancelled");
                    return Ok(());
                }
                _ = winch.recv() => {
                    match terminal.size() {
                        Ok(size) => {
                            tracing::trace!(rows = size.rows, columns = size.columns, "Window resized");
                            if !emit(&events, SignalEvent::Resize(size), &cancel).await {
                                return Ok(());
                            }
                        }
                        Err(e) => tracing::warn!("Failed to query window size: {}", e),
                    }
                }
                _ = interrupt.recv() => {
                    tracing::debug!("Received SIGINT");
                    emit(&events, SignalEvent::TerminationRequested, &cancel).await;
                    return Ok(());
                }
                _ = terminate.recv() => {
                    tracing::debug!("Received SIGTERM");
                    emit(&events, SignalEvent::TerminationRequested, &cancel).await;
                    return Ok(());
                }
            }
        }
    }
}
