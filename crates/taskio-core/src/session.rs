//! Session orchestration
//!
//! A [`TaskIo`] session runs up to three units under one cancellable
//! lifetime:
//!
//! - the output unit, which opens the output call (attach or launch) and
//!   demultiplexes it to the local sinks; its end cancels the lifetime
//! - the input unit (interactive sessions), which waits until the output
//!   call was attempted and then streams local input
//! - the signal unit (interactive TTY sessions), which feeds resize and
//!   termination events to the input unit
//!
//! Once every unit has joined, the session resolves its exit code: a
//! reported error wins, then a detach, then a termination signal, and only
//! otherwise is the agent asked for the container's exit status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskio_protocol::{AgentResponse, Call, CommandInfo, ContainerId, ContainerInfo};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::TaskIoConfig;
use crate::error::{ConfigError, TaskIoError, TerminalError};
use crate::escape::{
    EscapeDetector, InputReader, DEFAULT_CHUNK_SIZE, DEFAULT_ESCAPE_SEQUENCE, TTY_CHUNK_SIZE,
};
use crate::exit_status::exit_code_from_wait_status;
use crate::input::{InputMultiplexer, InputOutcome};
use crate::output::{OutputDemultiplexer, OutputSink};
use crate::sender::{Request, Sender};
use crate::signals::{default_signal_watcher, SignalEvent, SignalWatcher};
use crate::terminal::{RawTerminal, SystemTerminal, Terminal};

/// Local source for remote stdin
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;

/// Default interval between input heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound for the exit status query
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// One slot per unit
const ERROR_CHANNEL_CAPACITY: usize = 3;

const SIGNAL_CHANNEL_CAPACITY: usize = 8;

/// Terminal the input unit puts into raw mode, or why there is none
type LocalTerminal = Result<Arc<dyn Terminal>, TerminalError>;

/// Options for one session
pub struct TaskIoOptions {
    sender: Arc<dyn Sender>,
    stdin: Option<InputSource>,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
    interactive: bool,
    tty: bool,
    user: Option<String>,
    heartbeat_interval: Duration,
    escape_sequence: Vec<u8>,
    terminal: Option<Arc<dyn Terminal>>,
    signal_watcher: Arc<dyn SignalWatcher>,
    wait_timeout: Duration,
    term: String,
}

impl TaskIoOptions {
    /// Non-interactive options using the process stdio and the system terminal
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self {
            sender,
            stdin: None,
            stdout: None,
            stderr: None,
            interactive: false,
            tty: false,
            user: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            escape_sequence: DEFAULT_ESCAPE_SEQUENCE.to_vec(),
            terminal: None,
            signal_watcher: default_signal_watcher(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            term: "xterm".to_string(),
        }
    }

    /// Apply defaults from a configuration file
    pub fn with_config(self, config: &TaskIoConfig) -> Result<Self, ConfigError> {
        let mut options = self
            .with_escape_sequence(config.escape_keys()?)
            .with_heartbeat_interval(config.heartbeat_interval);
        options.wait_timeout = config.wait_timeout;
        options.term = config.term.clone();
        Ok(options)
    }

    pub fn with_stdin(mut self, stdin: InputSource) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn with_stdout(mut self, stdout: OutputSink) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn with_stderr(mut self, stderr: OutputSink) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Stream local input to the remote process
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Use a raw local terminal and allocate a remote TTY (exec)
    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// User to run an exec'd command as
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Interval between input heartbeats; zero selects the default
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = if interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Detach keys; an empty sequence selects CTRL-P CTRL-Q
    pub fn with_escape_sequence(mut self, sequence: impl Into<Vec<u8>>) -> Self {
        let sequence = sequence.into();
        self.escape_sequence = if sequence.is_empty() {
            DEFAULT_ESCAPE_SEQUENCE.to_vec()
        } else {
            sequence
        };
        self
    }

    /// Terminal backing the session input
    ///
    /// Required for TTY sessions reading from a handle set with
    /// [`with_stdin`](Self::with_stdin); the system terminal only
    /// describes the process's own stdin.
    pub fn with_terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn with_signal_watcher(mut self, watcher: Arc<dyn SignalWatcher>) -> Self {
        self.signal_watcher = watcher;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// TERM exported to TTY exec sessions
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }
}

/// State shared by the units of a session
struct SessionState {
    cancel: CancellationToken,
    output_attached: watch::Sender<bool>,
    exit_sequence_detected: AtomicBool,
    termination_signal_detected: AtomicBool,
    errors: mpsc::Sender<TaskIoError>,
}

impl SessionState {
    fn new(errors: mpsc::Sender<TaskIoError>) -> Self {
        let (output_attached, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            output_attached,
            exit_sequence_detected: AtomicBool::new(false),
            termination_signal_detected: AtomicBool::new(false),
            errors,
        }
    }

    /// Record a unit failure; failures after cancellation are dropped
    fn report(&self, error: TaskIoError) {
        if self.cancel.is_cancelled() {
            tracing::debug!("Dropping error after cancellation: {}", error);
            return;
        }
        self.push_error(error);
    }

    fn push_error(&self, error: TaskIoError) {
        if let Err(e) = self.errors.try_send(error) {
            tracing::debug!("Dropping error: {}", e);
        }
    }

    fn mark_output_attached(&self) {
        self.output_attached.send_replace(true);
    }

    /// Wait until the output call was attempted; false if cancelled first
    async fn wait_output_attached(&self) -> bool {
        let mut attached = self.output_attached.subscribe();
        let fired = async move {
            let result = attached.wait_for(|attached| *attached).await;
            result.is_ok()
        };

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            fired = fired => fired,
        }
    }
}

/// An interactive I/O session with a remote container
pub struct TaskIo {
    container_id: ContainerId,
    options: TaskIoOptions,
}

impl TaskIo {
    pub fn new(container_id: ContainerId, options: TaskIoOptions) -> Self {
        Self {
            container_id,
            options,
        }
    }

    /// Attach to the stdio of a running container
    ///
    /// The container must have been launched with a remote TTY for its
    /// input to be attachable; the agent's rejection is returned as is.
    pub async fn attach(self) -> Result<i32, TaskIoError> {
        let container_id = self.container_id.clone();
        tracing::debug!(container = %container_id, "Attaching to container");

        let call = Call::attach_container_output(container_id.clone());
        self.run(call, container_id).await
    }

    /// Launch `cmd` in a new container nested under this one and attach to it
    pub async fn exec(
        self,
        cmd: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<i32, TaskIoError> {
        let child = ContainerId::nested(Uuid::new_v4().to_string(), self.container_id.clone());
        tracing::debug!(container = %child, "Launching nested container session");

        let mut command = CommandInfo::new(cmd, args).with_user(self.options.user.clone());
        let container = if self.options.tty {
            command = command.with_env("TERM", self.options.term.clone());
            Some(ContainerInfo::with_tty())
        } else {
            None
        };

        let call = Call::launch_nested_container_session(child.clone(), command, container);
        self.run(call, child).await
    }

    async fn run(self, output_call: Call, target: ContainerId) -> Result<i32, TaskIoError> {
        let TaskIoOptions {
            sender,
            stdin,
            stdout,
            stderr,
            interactive,
            tty,
            heartbeat_interval,
            escape_sequence,
            terminal,
            signal_watcher,
            wait_timeout,
            ..
        } = self.options;

        let (error_tx, mut error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let state = Arc::new(SessionState::new(error_tx));
        let mut units = JoinSet::new();

        let stdout = stdout.unwrap_or_else(|| Box::new(tokio::io::stdout()));
        let stderr = stderr.unwrap_or_else(|| Box::new(tokio::io::stderr()));
        units.spawn(output_unit(
            sender.clone(),
            output_call,
            OutputDemultiplexer::new(stdout, stderr),
            state.clone(),
        ));

        if interactive {
            // A caller-supplied input can only be checked by a terminal given with it.
            let local_terminal: LocalTerminal = match terminal {
                Some(terminal) => Ok(terminal),
                None if stdin.is_some() => Err(TerminalError::NotATerminal),
                None => Ok(Arc::new(SystemTerminal) as Arc<dyn Terminal>),
            };

            let signals = match &local_terminal {
                Ok(terminal) if tty => {
                    let (events_tx, events_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
                    units.spawn(signal_unit(
                        signal_watcher,
                        terminal.clone(),
                        events_tx,
                        state.clone(),
                    ));
                    Some(events_rx)
                }
                _ => None,
            };

            let stdin = stdin.unwrap_or_else(|| Box::new(tokio::io::stdin()));
            let reader = if tty {
                InputReader::new(stdin, TTY_CHUNK_SIZE, Some(EscapeDetector::new(escape_sequence)))
            } else {
                InputReader::new(stdin, DEFAULT_CHUNK_SIZE, None)
            };

            let mut multiplexer = InputMultiplexer::new(target.clone(), reader, heartbeat_interval);
            if let Some(signals) = signals {
                multiplexer = multiplexer.with_signals(signals);
            }

            let raw_terminal = tty.then_some(local_terminal);
            units.spawn(input_unit(
                sender.clone(),
                multiplexer,
                raw_terminal,
                state.clone(),
            ));
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Session task failed: {}", e);
                state.push_error(TaskIoError::UnitPanicked(e.to_string()));
                state.cancel.cancel();
            }
        }

        if let Ok(error) = error_rx.try_recv() {
            return Err(error);
        }
        if state.exit_sequence_detected.load(Ordering::SeqCst) {
            tracing::debug!("Detached by escape sequence");
            return Ok(0);
        }
        if state.termination_signal_detected.load(Ordering::SeqCst) {
            tracing::debug!("Session interrupted");
            return Ok(1);
        }

        wait_container(sender.as_ref(), &target, wait_timeout).await
    }
}

async fn output_unit(
    sender: Arc<dyn Sender>,
    call: Call,
    mut demux: OutputDemultiplexer,
    state: Arc<SessionState>,
) {
    if let Err(e) = stream_output(sender.as_ref(), call, &mut demux, &state).await {
        state.report(e);
        state.cancel.cancel();
    }

    // A failed output call is recorded and cancelled before the latch fires.
    state.mark_output_attached();
    state.cancel.cancel();
}

async fn stream_output(
    sender: &dyn Sender,
    call: Call,
    demux: &mut OutputDemultiplexer,
    state: &SessionState,
) -> Result<(), TaskIoError> {
    let response = tokio::select! {
        _ = state.cancel.cancelled() => return Ok(()),
        response = sender.send(Request::NonStreaming(call)) => response?,
    };
    state.mark_output_attached();
    tracing::debug!("Output attached");
    demux.run(response, &state.cancel).await
}

async fn signal_unit(
    watcher: Arc<dyn SignalWatcher>,
    terminal: Arc<dyn Terminal>,
    events: mpsc::Sender<SignalEvent>,
    state: Arc<SessionState>,
) {
    if let Err(e) = watcher.watch(terminal, events, state.cancel.clone()).await {
        state.report(e);
        state.cancel.cancel();
    }
}

async fn input_unit(
    sender: Arc<dyn Sender>,
    multiplexer: InputMultiplexer,
    terminal: Option<LocalTerminal>,
    state: Arc<SessionState>,
) {
    match stream_input(sender.as_ref(), multiplexer, terminal, &state).await {
        Ok(InputOutcome::Escaped) => {
            state.exit_sequence_detected.store(true, Ordering::SeqCst);
            state.cancel.cancel();
        }
        Ok(InputOutcome::TerminationRequested) => {
            state.termination_signal_detected.store(true, Ordering::SeqCst);
            state.cancel.cancel();
        }
        Ok(outcome) => tracing::debug!(?outcome, "Input unit finished"),
        Err(e) => {
            state.report(e);
            state.cancel.cancel();
        }
    }
}

async fn stream_input(
    sender: &dyn Sender,
    multiplexer: InputMultiplexer,
    terminal: Option<LocalTerminal>,
    state: &SessionState,
) -> Result<InputOutcome, TaskIoError> {
    if !state.wait_output_attached().await || state.cancel.is_cancelled() {
        return Ok(InputOutcome::Cancelled);
    }

    let _raw = terminal
        .map(|terminal| terminal.and_then(RawTerminal::acquire))
        .transpose()?;

    let (calls_tx, calls_rx) = mpsc::channel(1);
    let call = sender.send(Request::Streaming(Box::pin(ReceiverStream::new(calls_rx))));
    let input = multiplexer.run(calls_tx, &state.cancel);
    tokio::pin!(call);
    tokio::pin!(input);

    let mut outcome = None;
    loop {
        tokio::select! {
            result = &mut input, if outcome.is_none() => match result? {
                InputOutcome::Eof => outcome = Some(InputOutcome::Eof),
                other => return Ok(other),
            },
            response = &mut call => {
                response?;
                tracing::debug!("Input call completed");
                return Ok(outcome.unwrap_or(InputOutcome::Closed));
            }
            _ = state.cancel.cancelled() => {
                return Ok(outcome.unwrap_or(InputOutcome::Cancelled));
            }
        }
    }
}

async fn wait_container(
    sender: &dyn Sender,
    container_id: &ContainerId,
    timeout: Duration,
) -> Result<i32, TaskIoError> {
    // Only nested containers can be waited on through the agent.
    if !container_id.is_nested() {
        tracing::debug!(container = %container_id, "Skipping exit status query");
        return Ok(0);
    }

    let query = async {
        let mut response = sender
            .send(Request::NonStreaming(Call::wait_container(container_id.clone())))
            .await?;

        match response.decode::<AgentResponse>().await? {
            Some(AgentResponse::WaitContainer { exit_status }) => {
                let status = exit_status.unwrap_or(0);
                tracing::debug!(status, "Container exited");
                Ok(exit_code_from_wait_status(status))
            }
            Some(other) => Err(TaskIoError::UnexpectedResponse(format!("{:?}", other))),
            None => Err(TaskIoError::UnexpectedResponse(
                "empty wait container response".to_string(),
            )),
        }
    };

    tokio::time::timeout(timeout, query)
        .await
        .map_err(|_| TaskIoError::WaitTimeout(timeout))?
}
