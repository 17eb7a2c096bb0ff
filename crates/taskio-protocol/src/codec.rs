//! Tokio codec for RecordIO framing
//!
//! Streamed agent bodies are sequences of records, each one a decimal
//! length prefix terminated by a newline, followed by that many bytes of
//! payload:
//!
//! ```text
//! 11\n{"type":..}
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Maximum record payload size (16MB)
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Longest length prefix accepted before the newline (u64::MAX has 20 digits)
const MAX_HEADER_DIGITS: usize = 20;

/// Codec for encoding/decoding RecordIO records
#[derive(Debug, Default)]
pub struct RecordIoCodec {
    /// Length of the record being decoded, once its header was consumed
    pending_length: Option<usize>,
}

impl RecordIoCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_length: None,
        }
    }

    fn decode_header(src: &mut BytesMut) -> Result<Option<usize>, ProtocolError> {
        let newline = match src.iter().position(|b| *b == b'\n') {
            Some(pos) => pos,
            None if src.len() > MAX_HEADER_DIGITS => {
                return Err(ProtocolError::InvalidRecordHeader(
                    String::from_utf8_lossy(&src[..MAX_HEADER_DIGITS]).into_owned(),
                ));
            }
            None => return Ok(None),
        };

        let header = &src[..newline];
        let length = std::str::from_utf8(header)
            .ok()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                ProtocolError::InvalidRecordHeader(String::from_utf8_lossy(header).into_owned())
            })?;

        src.advance(newline + 1);
        Ok(Some(length))
    }
}

impl Decoder for RecordIoCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match self.pending_length.take() {
            Some(length) => length,
            None => match Self::decode_header(src)? {
                Some(length) => length,
                None => return Ok(None),
            },
        };

        if length > MAX_RECORD_SIZE {
            return Err(ProtocolError::RecordTooLarge {
                size: length,
                max: MAX_RECORD_SIZE,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            self.pending_length = Some(length);
            return Ok(None);
        }

        Ok(Some(src.split_to(length).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None => match self.pending_length {
                Some(expected) => Err(ProtocolError::IncompleteRecord {
                    expected,
                    actual: src.len(),
                }),
                None if !src.is_empty() => {
                    Err(ProtocolError::InvalidRecordHeader(
                        String::from_utf8_lossy(src).into_owned(),
                    ))
                }
                None => Ok(None),
            },
        }
    }
}

impl Encoder<Bytes> for RecordIoCodec {
    type Error = ProtocolError;

    fn encode(&mut self, record: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(ProtocolError::RecordTooLarge {
                size: record.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let header = record.len().to_string();
        dst.reserve(header.len() + 1 + record.len());
        dst.put_slice(header.as_bytes());
        dst.put_u8(b'\n');
        dst.put_slice(&record);

        Ok(())
    }
}
