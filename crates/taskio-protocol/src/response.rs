//! Streamed response bodies
//!
//! A [`Response`] is a sequence of records, each holding one JSON message.
//! Streaming calls yield many records; non-streaming calls yield exactly one.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::RecordIoCodec;
use crate::error::ProtocolError;

/// Stream of raw records making up a response body
pub type RecordStream = BoxStream<'static, Result<Bytes, ProtocolError>>;

/// Response body of an agent call
pub struct Response {
    records: RecordStream,
}

impl Response {
    /// Wrap an existing record stream
    pub fn new(records: RecordStream) -> Self {
        Self { records }
    }

    /// A response with no records
    pub fn empty() -> Self {
        Self::new(stream::empty().boxed())
    }

    /// A response holding a single record
    pub fn single(record: Bytes) -> Self {
        Self::new(stream::once(async move { Ok(record) }).boxed())
    }

    /// A RecordIO-framed response read from `reader`
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(FramedRead::new(reader, RecordIoCodec::new()).boxed())
    }

    /// A response whose records are the JSON encodings of `messages`
    pub fn from_messages<T, I>(messages: I) -> Result<Self, ProtocolError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let records = messages
            .into_iter()
            .map(|message| serde_json::to_vec(&message).map(Bytes::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(stream::iter(records.into_iter().map(Ok)).boxed()))
    }

    /// Next raw record, or `None` once the body is exhausted
    pub async fn next_record(&mut self) -> Option<Result<Bytes, ProtocolError>> {
        self.records.next().await
    }

    /// Decode the next record as `T`, or `None` once the body is exhausted
    pub async fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        match self.records.next().await {
            Some(record) => {
                let record = record?;
                Ok(Some(serde_json::from_slice(&record)?))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").finish_non_exhaustive()
    }
}
