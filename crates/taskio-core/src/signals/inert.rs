use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{SignalEvent, SignalWatcher};
use crate::error::TaskIoError;
use crate::terminal::Terminal;

/// Watcher for platforms without resize signals; emits nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct InertSignalWatcher;

#[async_trait]
impl SignalWatcher for InertSignalWatcher {
    async fn watch(
        &self,
        _terminal: Arc<dyn Terminal>,
        _events: mpsc::Sender<SignalEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TaskIoError> {
        cancel.cancelled().await;
        Ok(())
    }
}
