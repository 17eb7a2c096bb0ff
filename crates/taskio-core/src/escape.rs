//! Escape sequence detection on the input read path
//!
//! The detach keys (CTRL-P CTRL-Q by default) are recognized as raw input is
//! read, before any byte is forwarded to the remote process. A partial match
//! is held back; if the next byte breaks the match the held bytes are
//! replayed in order.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ConfigError;

/// Default detach keys: CTRL-P CTRL-Q
pub const DEFAULT_ESCAPE_SEQUENCE: [u8; 2] = [0x10, 0x11];

/// Read size in TTY mode, so the detector sees every keystroke
pub const TTY_CHUNK_SIZE: usize = 1;

/// Read size for piped input
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Parse docker-style key notation (`ctrl-p,ctrl-q`) into bytes
pub fn parse_escape_keys(notation: &str) -> Result<Vec<u8>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEscapeSequence {
        sequence: notation.to_string(),
        reason,
    };

    if notation.trim().is_empty() {
        return Err(invalid("sequence is empty".to_string()));
    }

    notation
        .split(',')
        .map(|key| {
            let key = key.trim();
            if let Some(c) = key.strip_prefix("ctrl-") {
                match c.as_bytes() {
                    [b @ b'a'..=b'z'] => Ok(b - b'a' + 1),
                    [b @ (b'@' | b'[' | b'\\' | b']' | b'^' | b'_')] => Ok(b - b'@'),
                    _ => Err(invalid(format!("unknown key {:?}", key))),
                }
            } else {
                match key.as_bytes() {
                    [b] if b.is_ascii() => Ok(*b),
                    _ => Err(invalid(format!("unknown key {:?}", key))),
                }
            }
        })
        .collect()
}

/// Outcome of feeding input to an [`EscapeDetector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Bytes to forward; may be empty while a partial match is held
    Forward(Vec<u8>),
    /// The full sequence was typed
    Escape,
}

/// Byte-level matcher for the escape sequence
#[derive(Debug, Clone)]
pub struct EscapeDetector {
    sequence: Vec<u8>,
    /// `fallback[i]`: longest proper prefix of `sequence[..=i]` that is also its suffix
    fallback: Vec<usize>,
    matched: usize,
}

impl EscapeDetector {
    /// Create a detector; an empty sequence never matches
    pub fn new(sequence: impl Into<Vec<u8>>) -> Self {
        let sequence = sequence.into();
        let fallback = prefix_table(&sequence);
        Self {
            sequence,
            fallback,
            matched: 0,
        }
    }

    /// Feed freshly read bytes
    pub fn feed(&mut self, input: &[u8]) -> Detection {
        if self.sequence.is_empty() {
            return Detection::Forward(input.to_vec());
        }

        let mut forward = Vec::with_capacity(input.len());
        for &byte in input {
            // Shrink the held match to its longest border that can still continue.
            while self.matched > 0 && byte != self.sequence[self.matched] {
                let keep = self.fallback[self.matched - 1];
                forward.extend_from_slice(&self.sequence[..self.matched - keep]);
                self.matched = keep;
            }

            if byte == self.sequence[self.matched] {
                self.matched += 1;
                if self.matched == self.sequence.len() {
                    self.matched = 0;
                    return Detection::Escape;
                }
            } else {
                forward.push(byte);
            }
        }

        Detection::Forward(forward)
    }

    /// Release bytes held by a partial match
    pub fn take_pending(&mut self) -> Vec<u8> {
        let pending = self.sequence[..self.matched].to_vec();
        self.matched = 0;
        pending
    }
}

fn prefix_table(sequence: &[u8]) -> Vec<usize> {
    let mut table = vec![0; sequence.len()];
    let mut len = 0;
    for i in 1..sequence.len() {
        while len > 0 && sequence[i] != sequence[len] {
            len = table[len - 1];
        }
        if sequence[i] == sequence[len] {
            len += 1;
        }
        table[i] = len;
    }
    table
}

/// One step of local input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputChunk {
    /// Bytes to send to the remote process
    Data(Bytes),
    /// The local input was closed
    Eof,
    /// The detach sequence was typed
    Escape,
}

/// Chunked reader over the local input, with optional escape detection
pub struct InputReader {
    source: Box<dyn AsyncRead + Send + Unpin>,
    buf: Vec<u8>,
    detector: Option<EscapeDetector>,
}

impl InputReader {
    /// Create a reader issuing reads of at most `chunk_size` bytes
    pub fn new(
        source: Box<dyn AsyncRead + Send + Unpin>,
        chunk_size: usize,
        detector: Option<EscapeDetector>,
    ) -> Self {
        Self {
            source,
            buf: vec![0; chunk_size.max(1)],
            detector,
        }
    }

    /// Read the next chunk
    ///
    /// Cancel safe: bytes are only consumed by a read that completes, and
    /// nothing is awaited after that.
    pub async fn next(&mut self) -> std::io::Result<InputChunk> {
        loop {
            let n = self.source.read(&mut self.buf).await?;
            if n == 0 {
                if let Some(detector) = self.detector.as_mut() {
                    let pending = detector.take_pending();
                    if !pending.is_empty() {
                        return Ok(InputChunk::Data(Bytes::from(pending)));
                    }
                }
                return Ok(InputChunk::Eof);
            }

            let chunk = &self.buf[..n];
            match self.detector.as_mut() {
                None => return Ok(InputChunk::Data(Bytes::copy_from_slice(chunk))),
                Some(detector) => match detector.feed(chunk) {
                    Detection::Escape => return Ok(InputChunk::Escape),
                    Detection::Forward(bytes) if bytes.is_empty() => continue,
                    Detection::Forward(bytes) => return Ok(InputChunk::Data(Bytes::from(bytes))),
                },
            }
        }
    }
}
