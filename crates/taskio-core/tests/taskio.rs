//! Session integration tests
//!
//! Drives full attach/exec sessions against an in-process agent stub.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use taskio_core::sender::{Request, Sender};
use taskio_core::signals::{InertSignalWatcher, SignalEvent, SignalWatcher};
use taskio_core::terminal::Terminal;
use taskio_core::{TaskIo, TaskIoError, TaskIoOptions, TerminalError};
use taskio_protocol::{
    AgentResponse, AttachContainerInput, Call, ContainerId, ProcessIo, ProtocolError, Response,
    WindowSize,
};

#[derive(Clone, Copy, PartialEq)]
enum OutputMode {
    /// Send the frames, then EOF
    Close,
    /// Send the frames, then EOF once the input stream has ended
    UntilInputEnds,
    /// Send the frames, then stay open
    Open,
    /// Reject the call
    Fail,
}

struct StubAgent {
    output: OutputMode,
    frames: Vec<ProcessIo>,
    exit_status: Option<i32>,
    hang_wait: bool,
    input_done: Arc<Notify>,
    input_streams: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    input: Mutex<Vec<Call>>,
}

impl StubAgent {
    fn new(output: OutputMode) -> Self {
        Self {
            output,
            frames: Vec::new(),
            exit_status: None,
            hang_wait: false,
            input_done: Arc::new(Notify::new()),
            input_streams: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            input: Mutex::new(Vec::new()),
        }
    }

    fn with_frames(mut self, frames: Vec<ProcessIo>) -> Self {
        self.frames = frames;
        self
    }

    fn with_exit_status(mut self, status: i32) -> Self {
        self.exit_status = Some(status);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn input(&self) -> Vec<Call> {
        self.input.lock().unwrap().clone()
    }

    fn wait_calls(&self) -> Vec<ContainerId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::WaitContainer { container_id } => Some(container_id),
                _ => None,
            })
            .collect()
    }

    fn output_response(&self) -> Response {
        let records: Vec<Result<Bytes, ProtocolError>> = self
            .frames
            .iter()
            .map(|frame| Ok(Bytes::from(serde_json::to_vec(frame).unwrap())))
            .collect();
        let head = stream::iter(records);

        match self.output {
            OutputMode::UntilInputEnds => {
                let gate = self.input_done.clone();
                let tail = stream::once(async move { gate.notified().await })
                    .filter_map(|()| async { None::<Result<Bytes, ProtocolError>> });
                Response::new(head.chain(tail).boxed())
            }
            OutputMode::Open => Response::new(head.chain(stream::pending()).boxed()),
            _ => Response::new(head.boxed()),
        }
    }
}

#[async_trait]
impl Sender for StubAgent {
    async fn send(&self, request: Request) -> Result<Response, TaskIoError> {
        match request {
            Request::NonStreaming(call) => {
                self.calls.lock().unwrap().push(call.clone());
                match call {
                    Call::AttachContainerOutput { .. } | Call::LaunchNestedContainerSession { .. } => {
                        if self.output == OutputMode::Fail {
                            return Err(TaskIoError::Agent {
                                status: 500,
                                body: "boom".to_string(),
                            });
                        }
                        Ok(self.output_response())
                    }
                    Call::WaitContainer { .. } => {
                        if self.hang_wait {
                            return futures::future::pending().await;
                        }
                        Ok(Response::from_messages([AgentResponse::WaitContainer {
                            exit_status: self.exit_status,
                        }])?)
                    }
                    other => panic!("unexpected call {:?}", other),
                }
            }
            Request::Streaming(mut calls) => {
                self.input_streams.fetch_add(1, Ordering::SeqCst);
                while let Some(call) = calls.next().await {
                    self.input.lock().unwrap().push(call);
                }
                self.input_done.notify_one();
                Ok(Response::empty())
            }
        }
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[derive(Default)]
struct FakeTerminal {
    raw_enabled: AtomicUsize,
    raw_disabled: AtomicUsize,
}

impl Terminal for FakeTerminal {
    fn is_terminal(&self) -> bool {
        true
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        self.raw_enabled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable_raw_mode(&self) -> io::Result<()> {
        self.raw_disabled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn size(&self) -> io::Result<WindowSize> {
        Ok(WindowSize::new(24, 80))
    }
}

/// Emits a fixed list of events, then waits for cancellation
struct ScriptedWatcher(Vec<SignalEvent>);

#[async_trait]
impl SignalWatcher for ScriptedWatcher {
    async fn watch(
        &self,
        _terminal: Arc<dyn Terminal>,
        events: mpsc::Sender<SignalEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TaskIoError> {
        for event in &self.0 {
            if events.send(*event).await.is_err() {
                return Ok(());
            }
        }
        cancel.cancelled().await;
        Ok(())
    }
}

struct Sinks {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

fn options(agent: &Arc<StubAgent>) -> (TaskIoOptions, Sinks) {
    let sinks = Sinks {
        stdout: SharedBuffer::default(),
        stderr: SharedBuffer::default(),
    };
    let opts = TaskIoOptions::new(agent.clone())
        .with_stdout(Box::new(sinks.stdout.clone()))
        .with_stderr(Box::new(sinks.stderr.clone()))
        .with_signal_watcher(Arc::new(InertSignalWatcher));
    (opts, sinks)
}

const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_attach_round_trip() {
    let agent = Arc::new(StubAgent::new(OutputMode::Close).with_frames(vec![
        ProcessIo::stdout(Bytes::from_static(b"Hello")),
        ProcessIo::stderr(Bytes::from_static(b"[INFO] ok\n")),
        ProcessIo::stdout(Bytes::from_static(b" world!")),
    ]));
    let (opts, sinks) = options(&agent);

    let code = timeout(SESSION_TIMEOUT, TaskIo::new(ContainerId::new("task-1"), opts).attach())
        .await
        .expect("session hung")
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(sinks.stdout.contents(), b"Hello world!");
    assert_eq!(sinks.stderr.contents(), b"[INFO] ok\n");
    assert_eq!(
        agent.calls(),
        vec![Call::attach_container_output(ContainerId::new("task-1"))]
    );
}

#[tokio::test]
async fn test_attach_nested_queries_exit_status() {
    let agent = Arc::new(StubAgent::new(OutputMode::Close));
    let (opts, _sinks) = options(&agent);
    let id: ContainerId = "parent.child".parse().unwrap();

    let code = TaskIo::new(id.clone(), opts).attach().await.unwrap();

    // No exit_status in the response counts as success
    assert_eq!(code, 0);
    assert_eq!(agent.wait_calls(), vec![id]);
}

#[tokio::test]
async fn test_exec_exit_status() {
    let agent = Arc::new(
        StubAgent::new(OutputMode::Close)
            .with_frames(vec![ProcessIo::stdout(Bytes::from_static(b"bye\n"))])
            .with_exit_status(10 << 8),
    );
    let (opts, sinks) = options(&agent);
    let parent = ContainerId::new("task-1");

    let code = TaskIo::new(parent.clone(), opts.with_user(Some("nobody".to_string())))
        .exec("exit", ["10"])
        .await
        .unwrap();

    assert_eq!(code, 10);
    assert_eq!(sinks.stdout.contents(), b"bye\n");

    let calls = agent.calls();
    let (child, command, container) = match &calls[0] {
        Call::LaunchNestedContainerSession {
            container_id,
            command,
            container,
        } => (container_id.clone(), command.clone(), container.clone()),
        other => panic!("expected launch, got {:?}", other),
    };

    assert_eq!(child.parent(), Some(&parent));
    assert_ne!(child.value(), parent.value());
    assert_eq!(command.value.as_deref(), Some("exit"));
    assert_eq!(command.arguments, vec!["exit", "10"]);
    assert!(!command.shell);
    assert_eq!(command.user.as_deref(), Some("nobody"));
    assert!(container.is_none());

    assert_eq!(agent.wait_calls(), vec![child]);
}

#[tokio::test]
async fn test_exec_tty_sets_term() {
    let agent = Arc::new(StubAgent::new(OutputMode::Close).with_exit_status(9));
    let (opts, _sinks) = options(&agent);

    let code = TaskIo::new(ContainerId::new("task-1"), opts.tty(true).with_term("xterm-256color"))
        .exec("sh", Vec::<String>::new())
        .await
        .unwrap();

    // Killed by SIGKILL
    assert_eq!(code, 137);

    match &agent.calls()[0] {
        Call::LaunchNestedContainerSession {
            command, container, ..
        } => {
            let container = container.as_ref().expect("tty container info");
            assert!(container.tty_info.is_some());

            let env = command.environment.as_ref().expect("environment");
            assert_eq!(env.variables.len(), 1);
            assert_eq!(env.variables[0].name, "TERM");
            assert_eq!(env.variables[0].value, "xterm-256color");
        }
        other => panic!("expected launch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exec_child_ids_are_unique() {
    let agent = Arc::new(StubAgent::new(OutputMode::Close));

    for _ in 0..2 {
        let (opts, _sinks) = options(&agent);
        TaskIo::new(ContainerId::new("task-1"), opts)
            .exec("true", Vec::<String>::new())
            .await
            .unwrap();
    }

    let waits = agent.wait_calls();
    assert_eq!(waits.len(), 2);
    assert_ne!(waits[0], waits[1]);
}

#[tokio::test]
async fn test_interactive_input_handshake_first() {
    let agent = Arc::new(
        StubAgent::new(OutputMode::UntilInputEnds)
            .with_frames(vec![ProcessIo::stdout(Bytes::from_static(b"hi\n"))]),
    );
    let (opts, sinks) = options(&agent);
    let id = ContainerId::new("task-1");

    let code = timeout(
        SESSION_TIMEOUT,
        TaskIo::new(id.clone(), opts.interactive(true).with_stdin(Box::new(&b"echo hi\n"[..])))
            .attach(),
    )
    .await
    .expect("session hung")
    .unwrap();

    assert_eq!(code, 0);
    assert_eq!(sinks.stdout.contents(), b"hi\n");
    assert_eq!(
        agent.input(),
        vec![
            Call::attach_container_input(id),
            Call::input_data(Bytes::from_static(b"echo hi\n")),
            Call::input_data(Bytes::new()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_tty_input_handshake_precedes_resize() {
    let agent = Arc::new(StubAgent::new(OutputMode::UntilInputEnds));
    let terminal = Arc::new(FakeTerminal::default());
    let (opts, _sinks) = options(&agent);
    let id = ContainerId::new("task-1");

    // Input arrives only after both resize events are queued
    let (stdin, mut keys) = tokio::io::duplex(16);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        keys.write_all(b"ls").await.unwrap();
    });

    let watcher = ScriptedWatcher(vec![
        SignalEvent::Resize(WindowSize::new(0, 0)),
        SignalEvent::Resize(WindowSize::new(24, 80)),
    ]);
    let opts = opts
        .interactive(true)
        .tty(true)
        .with_terminal(terminal.clone())
        .with_signal_watcher(Arc::new(watcher))
        .with_stdin(Box::new(stdin));

    let code = timeout(SESSION_TIMEOUT, TaskIo::new(id.clone(), opts).attach())
        .await
        .expect("session hung")
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(
        agent.input(),
        vec![
            Call::attach_container_input(id),
            Call::input_tty(WindowSize::new(0, 0)),
            Call::input_tty(WindowSize::new(24, 80)),
            Call::input_data(Bytes::from_static(b"l")),
            Call::input_data(Bytes::from_static(b"s")),
            Call::input_data(Bytes::new()),
        ]
    );
    assert_eq!(terminal.raw_enabled.load(Ordering::SeqCst), 1);
    assert_eq!(terminal.raw_disabled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_heartbeat_interval_uses_default() {
    let agent = Arc::new(StubAgent::new(OutputMode::UntilInputEnds));
    let (opts, _sinks) = options(&agent);
    let id = ContainerId::new("task-1");

    let opts = opts
        .interactive(true)
        .with_heartbeat_interval(Duration::ZERO)
        .with_stdin(Box::new(&b"x"[..]));

    let code = timeout(SESSION_TIMEOUT, TaskIo::new(id.clone(), opts).attach())
        .await
        .expect("session hung")
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(agent.input()[0], Call::attach_container_input(id));
}

#[tokio::test]
async fn test_empty_escape_sequence_uses_default() {
    let agent = Arc::new(StubAgent::new(OutputMode::Open));
    let terminal = Arc::new(FakeTerminal::default());
    let (opts, _sinks) = options(&agent);

    let opts = opts
        .interactive(true)
        .tty(true)
        .with_terminal(terminal)
        .with_escape_sequence(Vec::new())
        .with_stdin(Box::new(&b"\x10\x11"[..]));

    let code = timeout(
        SESSION_TIMEOUT,
        TaskIo::new("parent.child".parse().unwrap(), opts).attach(),
    )
    .await
    .expect("session hung")
    .unwrap();

    // Detached: no exit status query
    assert_eq!(code, 0);
    assert!(agent.wait_calls().is_empty());
}

#[tokio::test]
async fn test_tty_with_custom_input_requires_terminal() {
    let agent = Arc::new(StubAgent::new(OutputMode::Open));
    let (opts, _sinks) = options(&agent);
    let (stdin, _keep_open) = tokio::io::duplex(16);

    let opts = opts.interactive(true).tty(true).with_stdin(Box::new(stdin));

    let result = timeout(
        SESSION_TIMEOUT,
        TaskIo::new(ContainerId::new("task-1"), opts).attach(),
    )
    .await
    .expect("session hung");

    assert!(matches!(
        result,
        Err(TaskIoError::Terminal(TerminalError::NotATerminal))
    ));
    assert_eq!(agent.input_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_output_never_opens_input() {
    for _ in 0..50 {
        let agent = Arc::new(StubAgent::new(OutputMode::Fail));
        let terminal = Arc::new(FakeTerminal::default());
        let (opts, _sinks) = options(&agent);
        let (stdin, _keep_open) = tokio::io::duplex(16);

        let opts = opts
            .interactive(true)
            .tty(true)
            .with_terminal(terminal.clone())
            .with_stdin(Box::new(stdin));

        let result = timeout(
            SESSION_TIMEOUT,
            TaskIo::new(ContainerId::new("task-1"), opts).attach(),
        )
        .await
        .expect("session hung");

        assert!(matches!(result, Err(TaskIoError::Agent { status: 500, .. })));
        assert_eq!(agent.input_streams.load(Ordering::SeqCst), 0);
        assert_eq!(terminal.raw_enabled.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_output_failure_before_latch_does_not_hang() {
    let agent = Arc::new(StubAgent::new(OutputMode::Fail));
    let (opts, _sinks) = options(&agent);
    let (stdin, _keep_open) = tokio::io::duplex(16);

    let result = timeout(
        SESSION_TIMEOUT,
        TaskIo::new(ContainerId::new("task-1"), opts.interactive(true).with_stdin(Box::new(stdin)))
            .attach(),
    )
    .await
    .expect("session hung");

    assert!(matches!(
        result,
        Err(TaskIoError::Agent { status: 500, ref body }) if body == "boom"
    ));
    assert!(agent.wait_calls().is_empty());
}

#[tokio::test]
async fn test_escape_sequence_detaches() {
    let agent = Arc::new(StubAgent::new(OutputMode::Open));
    let terminal = Arc::new(FakeTerminal::default());
    let (opts, _sinks) = options(&agent);
    let id: ContainerId = "parent.child".parse().unwrap();

    let opts = opts
        .interactive(true)
        .tty(true)
        .with_terminal(terminal.clone())
        .with_stdin(Box::new(&b"ls\x10\x11more"[..]));

    let code = timeout(SESSION_TIMEOUT, TaskIo::new(id.clone(), opts).attach())
        .await
        .expect("session hung")
        .unwrap();

    assert_eq!(code, 0);
    assert!(agent.wait_calls().is_empty());

    let input = agent.input();
    assert_eq!(input.first(), Some(&Call::attach_container_input(id)));
    for call in &input {
        if let Call::AttachContainerInput(AttachContainerInput::ProcessIo(ProcessIo::Data {
            data, ..
        })) = call
        {
            assert!(!data.contains(&0x10) && !data.contains(&0x11));
            assert_ne!(&data[..], b"more");
        }
    }

    assert_eq!(terminal.raw_enabled.load(Ordering::SeqCst), 1);
    assert_eq!(terminal.raw_disabled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_termination_signal_exits_one() {
    let agent = Arc::new(StubAgent::new(OutputMode::Open));
    let terminal = Arc::new(FakeTerminal::default());
    let (opts, _sinks) = options(&agent);
    let (stdin, _keep_open) = tokio::io::duplex(16);

    let watcher = ScriptedWatcher(vec![
        SignalEvent::Resize(WindowSize::new(24, 80)),
        SignalEvent::TerminationRequested,
    ]);
    let opts = opts
        .interactive(true)
        .tty(true)
        .with_terminal(terminal.clone())
        .with_signal_watcher(Arc::new(watcher))
        .with_stdin(Box::new(stdin));

    let code = timeout(
        SESSION_TIMEOUT,
        TaskIo::new("parent.child".parse().unwrap(), opts).attach(),
    )
    .await
    .expect("session hung")
    .unwrap();

    assert_eq!(code, 1);
    assert!(agent.wait_calls().is_empty());
    assert_eq!(terminal.raw_disabled.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exit_status_query_times_out() {
    let mut stub = StubAgent::new(OutputMode::Close);
    stub.hang_wait = true;
    let agent = Arc::new(stub);
    let (opts, _sinks) = options(&agent);

    let result = TaskIo::new(
        "parent.child".parse().unwrap(),
        opts.with_wait_timeout(Duration::from_secs(30)),
    )
    .attach()
    .await;

    assert!(matches!(result, Err(TaskIoError::WaitTimeout(d)) if d == Duration::from_secs(30)));
}
