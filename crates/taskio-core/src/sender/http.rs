//! HTTP transport for the agent operator API

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use taskio_protocol::{Call, CallType, ProtocolError, RecordIoCodec, Response};
use tokio_util::codec::Encoder;
use tokio_util::io::StreamReader;

use super::{Request, Sender};
use crate::error::TaskIoError;

const APPLICATION_JSON: &str = "application/json";
const APPLICATION_RECORDIO: &str = "application/recordio";
const MESSAGE_CONTENT_TYPE: &str = "Message-Content-Type";
const MESSAGE_ACCEPT: &str = "Message-Accept";

/// Normalize an agent address to its `/api/v1` endpoint
pub fn agent_api_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/api/v1") {
        base.to_string()
    } else {
        format!("{}/api/v1", base)
    }
}

/// [`Sender`] that POSTs calls to an agent over HTTP
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpSender {
    /// Create a sender for the agent at `base` (e.g. `http://10.0.0.1:5051`)
    pub fn new(base: &str) -> Result<Self, TaskIoError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: agent_api_url(base),
            token: None,
        })
    }

    /// Authenticate with an ACS token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Full endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn encode_record(call: &Call) -> Result<Bytes, ProtocolError> {
    let mut codec = RecordIoCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(call.to_json()?, &mut buf)?;
    Ok(buf.freeze())
}

fn streams_response(call_type: CallType) -> bool {
    matches!(
        call_type,
        CallType::AttachContainerOutput | CallType::LaunchNestedContainerSession
    )
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(&self, request: Request) -> Result<Response, TaskIoError> {
        let mut builder = self.client.post(&self.endpoint);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("token={}", token));
        }

        let builder = match request {
            Request::NonStreaming(call) => {
                let call_type = call.call_type();
                tracing::debug!(?call_type, endpoint = %self.endpoint, "Sending call");

                let builder = builder
                    .header(CONTENT_TYPE, APPLICATION_JSON)
                    .body(call.to_json()?);
                if streams_response(call_type) {
                    builder
                        .header(ACCEPT, APPLICATION_RECORDIO)
                        .header(MESSAGE_ACCEPT, APPLICATION_JSON)
                } else {
                    builder.header(ACCEPT, APPLICATION_JSON)
                }
            }
            Request::Streaming(calls) => {
                tracing::debug!(endpoint = %self.endpoint, "Opening streamed call");

                let body = calls.map(|call| encode_record(&call));
                builder
                    .header(CONTENT_TYPE, APPLICATION_RECORDIO)
                    .header(MESSAGE_CONTENT_TYPE, APPLICATION_JSON)
                    .header(ACCEPT, APPLICATION_JSON)
                    .body(reqwest::Body::wrap_stream(body))
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaskIoError::Agent {
                status: status.as_u16(),
                body,
            });
        }

        let is_recordio = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with(APPLICATION_RECORDIO))
            .unwrap_or(false);

        if is_recordio {
            let bytes = response.bytes_stream().map_err(std::io::Error::other);
            return Ok(Response::from_reader(StreamReader::new(bytes)));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            Ok(Response::empty())
        } else {
            Ok(Response::single(body))
        }
    }
}
