//! OS signal handling for interactive sessions
//!
//! A [`SignalWatcher`] turns window-size changes and interrupt/terminate
//! signals into [`SignalEvent`]s for the input multiplexer. The platform
//! variant is picked at build time by [`default_signal_watcher`].

mod inert;
#[cfg(unix)]
mod unix;

use async_trait::async_trait;
use std::sync::Arc;
use taskio_protocol::WindowSize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TaskIoError;
use crate::terminal::Terminal;

pub use inert::InertSignalWatcher;
#[cfg(unix)]
pub use unix::UnixSignalWatcher;

/// Event produced by a signal watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// The local window changed size
    Resize(WindowSize),
    /// The user asked to stop the session (SIGINT/SIGTERM)
    TerminationRequested,
}

/// Source of signal events for one session
#[async_trait]
pub trait SignalWatcher: Send + Sync {
    /// Forward events to `events` until `cancel` fires or the receiver closes
    async fn watch(
        &self,
        terminal: Arc<dyn Terminal>,
        events: mpsc::Sender<SignalEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TaskIoError>;
}

/// The watcher for the current platform
pub fn default_signal_watcher() -> Arc<dyn SignalWatcher> {
    #[cfg(unix)]
    {
        Arc::new(UnixSignalWatcher)
    }
    #[cfg(not(unix))]
    {
        Arc::new(InertSignalWatcher)
    }
}
