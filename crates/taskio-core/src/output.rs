//! Output demultiplexer
//!
//! Decodes the process I/O stream of an output call and writes each data
//! frame to the matching local sink, in arrival order.

use std::io::ErrorKind;
use taskio_protocol::{ProcessIo, Response, StreamKind};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::TaskIoError;

/// Local sink for remote output
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Routes remote stdout/stderr frames to local sinks
pub struct OutputDemultiplexer {
    stdout: OutputSink,
    stderr: OutputSink,
}

impl OutputDemultiplexer {
    /// Create a demultiplexer over the given sinks
    pub fn new(stdout: OutputSink, stderr: OutputSink) -> Self {
        Self { stdout, stderr }
    }

    /// Drain `response` until EOF, a decode error or cancellation
    pub async fn run(
        &mut self,
        mut response: Response,
        cancel: &CancellationToken,
    ) -> Result<(), TaskIoError> {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Output stream cancelled");
                    return Ok(());
                }
                frame = response.decode::<ProcessIo>() => frame?,
            };

            match frame {
                Some(ProcessIo::Data { stream, data }) => {
                    let sink = match stream {
                        StreamKind::Stdout => &mut self.stdout,
                        StreamKind::Stderr => &mut self.stderr,
                        other => {
                            tracing::trace!(?other, "Ignoring data frame");
                            continue;
                        }
                    };
                    write_frame(sink, &data).await?;
                }
                Some(other) => tracing::trace!(?other, "Ignoring output frame"),
                None => {
                    tracing::debug!("Output stream reached EOF");
                    return Ok(());
                }
            }
        }
    }
}

async fn write_frame(sink: &mut OutputSink, data: &[u8]) -> Result<(), TaskIoError> {
    sink.write_all(data).await.map_err(|e| match e.kind() {
        ErrorKind::WriteZero => TaskIoError::ShortWrite,
        _ => TaskIoError::Io(e),
    })?;
    sink.flush().await?;
    Ok(())
}
