//! Input multiplexer
//!
//! Merges local input, signal events and heartbeat ticks into the single
//! ordered stream of `AttachContainerInput` calls that forms the body of
//! the input request. The handshake naming the container always goes first.

use std::time::Duration;
use taskio_protocol::{Call, ContainerId};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::TaskIoError;
use crate::escape::{InputChunk, InputReader};
use crate::signals::SignalEvent;

/// Why the input stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Local input closed; the end-of-input marker was sent
    Eof,
    /// The detach sequence was typed
    Escaped,
    /// A termination signal arrived
    TerminationRequested,
    /// The session lifetime ended first
    Cancelled,
    /// The request body was dropped by the transport
    Closed,
}

enum Step {
    Send(Call),
    Finish(Call, InputOutcome),
    Stop(InputOutcome),
    SignalsClosed,
}

enum Sent {
    Delivered,
    Cancelled,
    Closed,
}

async fn forward(out: &mpsc::Sender<Call>, call: Call, cancel: &CancellationToken) -> Sent {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Sent::Cancelled,
        sent = out.send(call) => match sent {
            Ok(()) => Sent::Delivered,
            Err(_) => Sent::Closed,
        },
    }
}

async fn next_signal(signals: &mut Option<mpsc::Receiver<SignalEvent>>) -> Option<SignalEvent> {
    match signals {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Produces the outbound message stream of an input call
pub struct InputMultiplexer {
    container_id: ContainerId,
    reader: InputReader,
    heartbeat_interval: Duration,
    signals: Option<mpsc::Receiver<SignalEvent>>,
}

impl InputMultiplexer {
    pub fn new(container_id: ContainerId, reader: InputReader, heartbeat_interval: Duration) -> Self {
        Self {
            container_id,
            reader,
            heartbeat_interval,
            signals: None,
        }
    }

    /// Forward resize and termination events from a signal watcher
    pub fn with_signals(mut self, signals: mpsc::Receiver<SignalEvent>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Emit calls into `out` until input ends, the user detaches or `cancel` fires
    ///
    /// Dropping `out` on return closes the request body.
    pub async fn run(
        mut self,
        out: mpsc::Sender<Call>,
        cancel: &CancellationToken,
    ) -> Result<InputOutcome, TaskIoError> {
        let handshake = Call::attach_container_input(self.container_id.clone());
        match forward(&out, handshake, cancel).await {
            Sent::Delivered => tracing::debug!(container = %self.container_id, "Input handshake sent"),
            Sent::Cancelled => return Ok(InputOutcome::Cancelled),
            Sent::Closed => return Ok(InputOutcome::Closed),
        }

        let interval = self.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Stop(InputOutcome::Cancelled),
                event = next_signal(&mut self.signals) => match event {
                    Some(SignalEvent::Resize(size)) => {
                        tracing::trace!(rows = size.rows, columns = size.columns, "Sending TTY info");
                        Step::Send(Call::input_tty(size))
                    }
                    Some(SignalEvent::TerminationRequested) => {
                        Step::Stop(InputOutcome::TerminationRequested)
                    }
                    None => Step::SignalsClosed,
                },
                _ = heartbeat.tick() => {
                    tracing::trace!("Sending heartbeat");
                    Step::Send(Call::input_heartbeat(interval))
                }
                chunk = self.reader.next() => match chunk? {
                    InputChunk::Data(data) => Step::Send(Call::input_data(data)),
                    InputChunk::Escape => Step::Stop(InputOutcome::Escaped),
                    InputChunk::Eof => Step::Finish(Call::input_data(bytes::Bytes::new()), InputOutcome::Eof),
                },
            };

            let (call, done) = match step {
                Step::Send(call) => (call, None),
                Step::Finish(call, outcome) => (call, Some(outcome)),
                Step::Stop(outcome) => {
                    tracing::debug!(?outcome, "Input stream stopped");
                    return Ok(outcome);
                }
                Step::SignalsClosed => {
                    self.signals = None;
                    continue;
                }
            };

            match forward(&out, call, cancel).await {
                Sent::Delivered => {}
                Sent::Cancelled => return Ok(InputOutcome::Cancelled),
                Sent::Closed => return Ok(InputOutcome::Closed),
            }

            if let Some(outcome) = done {
                tracing::debug!(?outcome, "Input stream finished");
                return Ok(outcome);
            }
        }
    }
}
