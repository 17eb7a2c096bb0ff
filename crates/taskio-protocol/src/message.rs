//! Message types for the agent streaming API
//!
//! This module defines the calls sent to an agent and the messages it
//! streams back. The public types are plain Rust enums; their JSON form
//! follows the agent's protobuf-derived encoding, where a `type` tag names
//! which sibling field carries the body:
//!
//! ```text
//! {"type":"DATA","data":{"type":"STDOUT","data":"aGVsbG8="}}
//! {"type":"CONTROL","control":{"type":"HEARTBEAT","heartbeat":{"interval":{"nanoseconds":30000000000}}}}
//! ```
//!
//! # Message Flow
//!
//! Typical sequence for an interactive session:
//!
//! 1. `AttachContainerOutput` (or `LaunchNestedContainerSession`), answered
//!    with a stream of `ProcessIo` frames
//! 2. `AttachContainerInput`, a streamed request whose first record names
//!    the container and whose following records carry `ProcessIo`
//!    (stdin data, TTY resizes, heartbeats)
//! 3. `WaitContainer`, answered with a single `AgentResponse`

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::container::ContainerId;
use crate::error::ProtocolError;
use crate::serde_utils::{base64_bytes, duration_info};

/// Terminal dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    /// Number of rows
    pub rows: u32,
    /// Number of columns
    pub columns: u32,
}

impl WindowSize {
    /// Create a new window size
    pub fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }
}

/// TTY description attached to a container or sent on resize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<WindowSize>,
}

impl TtyInfo {
    /// TTY info carrying a window size
    pub fn with_size(size: WindowSize) -> Self {
        Self {
            window_size: Some(size),
        }
    }
}

/// Which standard stream a data frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    #[serde(other)]
    Unknown,
}

/// Control frames exchanged alongside process data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessIoControl {
    /// Terminal size changed
    TtyInfo(TtyInfo),
    /// Keep-alive, carrying the sender's heartbeat interval
    Heartbeat { interval: Duration },
}

/// A process I/O frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProcessIoWire", into = "ProcessIoWire")]
pub enum ProcessIo {
    /// Bytes for one of the standard streams
    Data { stream: StreamKind, data: Bytes },
    /// Control message
    Control(ProcessIoControl),
    /// Frame type this client does not know about
    Unknown,
}

impl ProcessIo {
    /// Stdin data frame
    pub fn stdin(data: impl Into<Bytes>) -> Self {
        Self::Data {
            stream: StreamKind::Stdin,
            data: data.into(),
        }
    }

    /// Stdout data frame
    pub fn stdout(data: impl Into<Bytes>) -> Self {
        Self::Data {
            stream: StreamKind::Stdout,
            data: data.into(),
        }
    }

    /// Stderr data frame
    pub fn stderr(data: impl Into<Bytes>) -> Self {
        Self::Data {
            stream: StreamKind::Stderr,
            data: data.into(),
        }
    }

    /// TTY resize control frame
    pub fn tty_info(info: TtyInfo) -> Self {
        Self::Control(ProcessIoControl::TtyInfo(info))
    }

    /// Heartbeat control frame
    pub fn heartbeat(interval: Duration) -> Self {
        Self::Control(ProcessIoControl::Heartbeat { interval })
    }
}

/// Environment variable passed to a launched command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// Environment of a launched command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
}

/// Command to launch inside a nested container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Whether `value` is run through a shell
    #[serde(default)]
    pub shell: bool,
    /// Executable to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Full argv, including the executable name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// User to run the command as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
}

impl CommandInfo {
    /// Command executed directly (no shell), with argv `[cmd, args...]`
    pub fn new(cmd: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let cmd = cmd.into();
        let mut arguments = vec![cmd.clone()];
        arguments.extend(args.into_iter().map(Into::into));

        Self {
            shell: false,
            value: Some(cmd),
            arguments,
            user: None,
            environment: None,
        }
    }

    /// Run as the given user
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment
            .get_or_insert_with(Environment::default)
            .variables
            .push(EnvironmentVariable {
                name: name.into(),
                value: value.into(),
            });
        self
    }
}

/// Containerizer used for a nested container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    Mesos,
    Docker,
    #[serde(other)]
    Unknown,
}

/// Container settings for a nested container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "type")]
    pub kind: ContainerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty_info: Option<TtyInfo>,
}

impl ContainerInfo {
    /// A container with a remote TTY allocated
    pub fn with_tty() -> Self {
        Self {
            kind: ContainerType::Mesos,
            tty_info: Some(TtyInfo::default()),
        }
    }
}

/// Body of an `AttachContainerInput` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachContainerInput {
    /// Handshake naming the target container; must be the first record
    ContainerId(ContainerId),
    /// Process I/O for the attached container
    ProcessIo(ProcessIo),
}

/// Call type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    LaunchNestedContainerSession,
    AttachContainerInput,
    AttachContainerOutput,
    WaitContainer,
    #[serde(other)]
    Unknown,
}

/// Calls issued against the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CallWire", into = "CallWire")]
pub enum Call {
    /// Launch a nested container and stream its output back
    LaunchNestedContainerSession {
        container_id: ContainerId,
        command: CommandInfo,
        container: Option<ContainerInfo>,
    },
    /// Stream the output of a running container
    AttachContainerOutput { container_id: ContainerId },
    /// One record of the streamed input of a container
    AttachContainerInput(AttachContainerInput),
    /// Wait for a container to terminate
    WaitContainer { container_id: ContainerId },
}

impl Call {
    /// Get the call type
    pub fn call_type(&self) -> CallType {
        match self {
            Call::LaunchNestedContainerSession { .. } => CallType::LaunchNestedContainerSession,
            Call::AttachContainerOutput { .. } => CallType::AttachContainerOutput,
            Call::AttachContainerInput(_) => CallType::AttachContainerInput,
            Call::WaitContainer { .. } => CallType::WaitContainer,
        }
    }

    /// Launch `command` in a new nested container
    pub fn launch_nested_container_session(
        container_id: ContainerId,
        command: CommandInfo,
        container: Option<ContainerInfo>,
    ) -> Self {
        Call::LaunchNestedContainerSession {
            container_id,
            command,
            container,
        }
    }

    /// Attach to the output of a container
    pub fn attach_container_output(container_id: ContainerId) -> Self {
        Call::AttachContainerOutput { container_id }
    }

    /// Input stream handshake
    pub fn attach_container_input(container_id: ContainerId) -> Self {
        Call::AttachContainerInput(AttachContainerInput::ContainerId(container_id))
    }

    /// Stdin bytes; an empty payload signals end of input
    pub fn input_data(data: impl Into<Bytes>) -> Self {
        Call::AttachContainerInput(AttachContainerInput::ProcessIo(ProcessIo::stdin(data)))
    }

    /// Terminal size update
    pub fn input_tty(size: WindowSize) -> Self {
        Call::AttachContainerInput(AttachContainerInput::ProcessIo(ProcessIo::tty_info(
            TtyInfo::with_size(size),
        )))
    }

    /// Input stream keep-alive
    pub fn input_heartbeat(interval: Duration) -> Self {
        Call::AttachContainerInput(AttachContainerInput::ProcessIo(ProcessIo::heartbeat(
            interval,
        )))
    }

    /// Wait for a container to exit
    pub fn wait_container(container_id: ContainerId) -> Self {
        Call::WaitContainer { container_id }
    }

    /// Serialize to the JSON body of a request or record
    pub fn to_json(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Agent responses to non-streaming calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResponseWire", into = "ResponseWire")]
pub enum AgentResponse {
    /// Container terminated; `exit_status` is the raw `wait(2)` status
    WaitContainer { exit_status: Option<i32> },
    /// Response type this client does not use
    Unknown,
}

// ============================================================================
// Wire representation
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ProcessIoType {
    Data,
    Control,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ControlType {
    TtyInfo,
    Heartbeat,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessIoWire {
    #[serde(rename = "type")]
    kind: ProcessIoType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<DataWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control: Option<ControlWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DataWire {
    #[serde(rename = "type")]
    stream: StreamKind,
    #[serde(default, with = "base64_bytes")]
    data: Bytes,
}

#[derive(Debug, Serialize, Deserialize)]
struct ControlWire {
    #[serde(rename = "type")]
    kind: ControlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tty_info: Option<TtyInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heartbeat: Option<HeartbeatWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatWire {
    #[serde(default, with = "duration_info")]
    interval: Duration,
}

impl TryFrom<ProcessIoWire> for ProcessIo {
    type Error = ProtocolError;

    fn try_from(wire: ProcessIoWire) -> Result<Self, Self::Error> {
        match wire.kind {
            ProcessIoType::Data => {
                let data = wire.data.ok_or(ProtocolError::MissingField {
                    kind: "ProcessIO",
                    field: "data",
                })?;
                Ok(ProcessIo::Data {
                    stream: data.stream,
                    data: data.data,
                })
            }
            ProcessIoType::Control => {
                let control = wire.control.ok_or(ProtocolError::MissingField {
                    kind: "ProcessIO",
                    field: "control",
                })?;
                match control.kind {
                    ControlType::TtyInfo => {
                        let info = control.tty_info.ok_or(ProtocolError::MissingField {
                            kind: "ProcessIO.Control",
                            field: "tty_info",
                        })?;
                        Ok(ProcessIo::tty_info(info))
                    }
                    ControlType::Heartbeat => {
                        let heartbeat = control.heartbeat.ok_or(ProtocolError::MissingField {
                            kind: "ProcessIO.Control",
                            field: "heartbeat",
                        })?;
                        Ok(ProcessIo::heartbeat(heartbeat.interval))
                    }
                    ControlType::Unknown => Ok(ProcessIo::Unknown),
                }
            }
            ProcessIoType::Unknown => Ok(ProcessIo::Unknown),
        }
    }
}

impl From<ProcessIo> for ProcessIoWire {
    fn from(message: ProcessIo) -> Self {
        match message {
            ProcessIo::Data { stream, data } => ProcessIoWire {
                kind: ProcessIoType::Data,
                data: Some(DataWire { stream, data }),
                control: None,
            },
            ProcessIo::Control(ProcessIoControl::TtyInfo(info)) => ProcessIoWire {
                kind: ProcessIoType::Control,
                data: None,
                control: Some(ControlWire {
                    kind: ControlType::TtyInfo,
                    tty_info: Some(info),
                    heartbeat: None,
                }),
            },
            ProcessIo::Control(ProcessIoControl::Heartbeat { interval }) => ProcessIoWire {
                kind: ProcessIoType::Control,
                data: None,
                control: Some(ControlWire {
                    kind: ControlType::Heartbeat,
                    tty_info: None,
                    heartbeat: Some(HeartbeatWire { interval }),
                }),
            },
            ProcessIo::Unknown => ProcessIoWire {
                kind: ProcessIoType::Unknown,
                data: None,
                control: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum AttachInputType {
    ContainerId,
    ProcessIo,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContainerRef {
    container_id: ContainerId,
}

#[derive(Debug, Serialize, Deserialize)]
struct LaunchWire {
    container_id: ContainerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<CommandInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container: Option<ContainerInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttachInputWire {
    #[serde(rename = "type")]
    kind: AttachInputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container_id: Option<ContainerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    process_io: Option<ProcessIo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CallWire {
    #[serde(rename = "type")]
    kind: CallType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    launch_nested_container_session: Option<LaunchWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attach_container_input: Option<AttachInputWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attach_container_output: Option<ContainerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_container: Option<ContainerRef>,
}

impl CallWire {
    fn empty(kind: CallType) -> Self {
        Self {
            kind,
            launch_nested_container_session: None,
            attach_container_input: None,
            attach_container_output: None,
            wait_container: None,
        }
    }
}

fn missing_call_field(field: &'static str) -> ProtocolError {
    ProtocolError::MissingField {
        kind: "Call",
        field,
    }
}

impl TryFrom<CallWire> for Call {
    type Error = ProtocolError;

    fn try_from(wire: CallWire) -> Result<Self, Self::Error> {
        match wire.kind {
            CallType::LaunchNestedContainerSession => {
                let launch = wire
                    .launch_nested_container_session
                    .ok_or_else(|| missing_call_field("launch_nested_container_session"))?;
                Ok(Call::LaunchNestedContainerSession {
                    container_id: launch.container_id,
                    command: launch.command.unwrap_or_default(),
                    container: launch.container,
                })
            }
            CallType::AttachContainerOutput => {
                let attach = wire
                    .attach_container_output
                    .ok_or_else(|| missing_call_field("attach_container_output"))?;
                Ok(Call::attach_container_output(attach.container_id))
            }
            CallType::AttachContainerInput => {
                let input = wire
                    .attach_container_input
                    .ok_or_else(|| missing_call_field("attach_container_input"))?;
                match input.kind {
                    AttachInputType::ContainerId => input
                        .container_id
                        .map(Call::attach_container_input)
                        .ok_or_else(|| missing_call_field("attach_container_input.container_id")),
                    AttachInputType::ProcessIo => input
                        .process_io
                        .map(|pio| Call::AttachContainerInput(AttachContainerInput::ProcessIo(pio)))
                        .ok_or_else(|| missing_call_field("attach_container_input.process_io")),
                    AttachInputType::Unknown => Err(ProtocolError::UnsupportedType {
                        kind: "AttachContainerInput",
                    }),
                }
            }
            CallType::WaitContainer => {
                let wait = wire
                    .wait_container
                    .ok_or_else(|| missing_call_field("wait_container"))?;
                Ok(Call::wait_container(wait.container_id))
            }
            CallType::Unknown => Err(ProtocolError::UnsupportedType { kind: "Call" }),
        }
    }
}

impl From<Call> for CallWire {
    fn from(call: Call) -> Self {
        let mut wire = CallWire::empty(call.call_type());
        match call {
            Call::LaunchNestedContainerSession {
                container_id,
                command,
                container,
            } => {
                wire.launch_nested_container_session = Some(LaunchWire {
                    container_id,
                    command: Some(command),
                    container,
                });
            }
            Call::AttachContainerOutput { container_id } => {
                wire.attach_container_output = Some(ContainerRef { container_id });
            }
            Call::AttachContainerInput(AttachContainerInput::ContainerId(container_id)) => {
                wire.attach_container_input = Some(AttachInputWire {
                    kind: AttachInputType::ContainerId,
                    container_id: Some(container_id),
                    process_io: None,
                });
            }
            Call::AttachContainerInput(AttachContainerInput::ProcessIo(process_io)) => {
                wire.attach_container_input = Some(AttachInputWire {
                    kind: AttachInputType::ProcessIo,
                    container_id: None,
                    process_io: Some(process_io),
                });
            }
            Call::WaitContainer { container_id } => {
                wire.wait_container = Some(ContainerRef { container_id });
            }
        }
        wire
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ResponseType {
    WaitContainer,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize)]
struct WaitContainerWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exit_status: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResponseWire {
    #[serde(rename = "type")]
    kind: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_container: Option<WaitContainerWire>,
}

impl TryFrom<ResponseWire> for AgentResponse {
    type Error = ProtocolError;

    fn try_from(wire: ResponseWire) -> Result<Self, Self::Error> {
        match wire.kind {
            ResponseType::WaitContainer => {
                let wait = wire.wait_container.ok_or(ProtocolError::MissingField {
                    kind: "Response",
                    field: "wait_container",
                })?;
                Ok(AgentResponse::WaitContainer {
                    exit_status: wait.exit_status,
                })
            }
            ResponseType::Unknown => Ok(AgentResponse::Unknown),
        }
    }
}

impl From<AgentResponse> for ResponseWire {
    fn from(response: AgentResponse) -> Self {
        match response {
            AgentResponse::WaitContainer { exit_status } => ResponseWire {
                kind: ResponseType::WaitContainer,
                wait_container: Some(WaitContainerWire { exit_status }),
            },
            AgentResponse::Unknown => ResponseWire {
                kind: ResponseType::Unknown,
                wait_container: None,
            },
        }
    }
}
