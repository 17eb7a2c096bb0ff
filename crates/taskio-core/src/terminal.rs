//! Local terminal control
//!
//! [`RawTerminal`] puts the controlling terminal into raw mode for the
//! duration of a TTY session and restores the previous mode exactly once,
//! either through [`RawTerminal::release`] or when dropped.

use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskio_protocol::WindowSize;

use crate::error::TerminalError;

/// Backend for the local terminal
pub trait Terminal: Send + Sync {
    /// Whether the session input is attached to a terminal
    fn is_terminal(&self) -> bool;

    /// Switch the terminal to raw mode, saving the current mode
    fn enable_raw_mode(&self) -> io::Result<()>;

    /// Restore the mode saved by `enable_raw_mode`
    fn disable_raw_mode(&self) -> io::Result<()>;

    /// Current window size
    fn size(&self) -> io::Result<WindowSize>;
}

/// The process's controlling terminal, driven through crossterm
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTerminal;

impl Terminal for SystemTerminal {
    fn is_terminal(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn disable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn size(&self) -> io::Result<WindowSize> {
        let (columns, rows) = crossterm::terminal::size()?;
        Ok(WindowSize::new(rows.into(), columns.into()))
    }
}

#[cfg(unix)]
fn is_no_controlling_terminal(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENXIO)
}

#[cfg(not(unix))]
fn is_no_controlling_terminal(_e: &io::Error) -> bool {
    false
}

/// Raw-mode guard over a [`Terminal`]
pub struct RawTerminal {
    terminal: Arc<dyn Terminal>,
    active: AtomicBool,
}

impl RawTerminal {
    /// Verify the input is a terminal and enter raw mode
    pub fn acquire(terminal: Arc<dyn Terminal>) -> Result<Self, TerminalError> {
        if !terminal.is_terminal() {
            return Err(TerminalError::NotATerminal);
        }

        terminal.enable_raw_mode().map_err(|e| {
            if is_no_controlling_terminal(&e) {
                TerminalError::NoControllingTerminal
            } else {
                TerminalError::RawMode(e)
            }
        })?;

        tracing::debug!("Terminal switched to raw mode");
        Ok(Self {
            terminal,
            active: AtomicBool::new(true),
        })
    }

    /// Current window size
    pub fn size(&self) -> Result<WindowSize, TerminalError> {
        self.terminal.size().map_err(TerminalError::Size)
    }

    /// Restore the previous terminal mode; later calls are no-ops
    pub fn release(&self) -> Result<(), TerminalError> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.terminal
            .disable_raw_mode()
            .map_err(TerminalError::Restore)?;
        tracing::debug!("Terminal mode restored");
        Ok(())
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to restore terminal: {}", e);
        }
    }
}
