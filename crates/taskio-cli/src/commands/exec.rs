//! Exec command

use anyhow::{Context, Result};
use taskio_core::{TaskIo, TaskIoConfig};
use taskio_protocol::ContainerId;

use super::{session_options, SessionArgs};
use crate::output::print_warning;

/// Flags of `taskio exec`
#[derive(Debug, Clone, Default)]
pub struct ExecFlags {
    pub interactive: bool,
    pub tty: bool,
    pub user: Option<String>,
}

/// Run a command in a new container nested under `container`
pub async fn exec_command(
    args: &SessionArgs,
    config: &TaskIoConfig,
    container: &str,
    flags: ExecFlags,
    cmd: &str,
    cmd_args: &[String],
) -> Result<i32> {
    let container_id: ContainerId = container
        .parse()
        .with_context(|| format!("Invalid container ID {:?}", container))?;

    if flags.tty && !flags.interactive {
        print_warning("--tty without --interactive: local input will not be forwarded");
    }

    let options = session_options(args, config)?
        .interactive(flags.interactive)
        .tty(flags.tty)
        .with_user(flags.user);

    let code = TaskIo::new(container_id, options)
        .exec(cmd, cmd_args.iter().cloned())
        .await
        .with_context(|| format!("Failed to exec {:?} in container {}", cmd, container))?;
    Ok(code)
}
