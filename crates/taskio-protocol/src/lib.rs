//! taskio-protocol: Wire types for the agent streaming API
//!
//! This crate defines the calls, process I/O messages and responses
//! exchanged with a cluster agent, their JSON encoding, and the RecordIO
//! framing used for streamed request and response bodies.

pub mod codec;
pub mod container;
pub mod error;
pub mod message;
pub mod response;
pub mod serde_utils;

pub use codec::{RecordIoCodec, MAX_RECORD_SIZE};
pub use container::ContainerId;
pub use error::ProtocolError;
pub use message::{
    AgentResponse, AttachContainerInput, Call, CallType, CommandInfo, ContainerInfo,
    ContainerType, Environment, EnvironmentVariable, ProcessIo, ProcessIoControl, StreamKind,
    TtyInfo, WindowSize,
};
pub use response::{RecordStream, Response};
