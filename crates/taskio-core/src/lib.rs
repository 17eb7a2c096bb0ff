//! taskio-core: Interactive task I/O streaming engine
//!
//! This crate attaches local stdio, or a raw local terminal, to a process
//! running in a remote container, over an agent's streaming API. Output and
//! input travel on two independent long-lived calls that share one
//! cancellable lifetime; the container's exit status is queried once both
//! have closed.

pub mod config;
pub mod error;
pub mod escape;
pub mod exit_status;
pub mod input;
pub mod output;
pub mod sender;
pub mod session;
pub mod signals;
pub mod terminal;

pub use config::TaskIoConfig;
pub use error::{ConfigError, TaskIoError, TerminalError};
pub use exit_status::exit_code_from_wait_status;
pub use sender::{CallStream, HttpSender, Request, Sender};
pub use session::{TaskIo, TaskIoOptions};
pub use signals::{default_signal_watcher, SignalEvent, SignalWatcher};
pub use terminal::{RawTerminal, SystemTerminal, Terminal};
