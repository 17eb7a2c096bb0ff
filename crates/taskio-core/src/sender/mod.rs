//! Transport abstraction for agent calls

mod http;

pub use http::{agent_api_url, HttpSender};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use taskio_protocol::{Call, Response};

use crate::error::TaskIoError;

/// Stream of calls making up a streamed request body
pub type CallStream = Pin<Box<dyn Stream<Item = Call> + Send + Sync + 'static>>;

/// A request to the agent
pub enum Request {
    /// A single call with a single JSON body
    NonStreaming(Call),
    /// A long-lived call whose body is a stream of records
    Streaming(CallStream),
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::NonStreaming(call) => f.debug_tuple("NonStreaming").field(call).finish(),
            Request::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Capability to issue calls against an agent
#[async_trait]
pub trait Sender: Send + Sync {
    /// Send a request; the response body is decoded by the caller
    async fn send(&self, request: Request) -> Result<Response, TaskIoError>;
}
