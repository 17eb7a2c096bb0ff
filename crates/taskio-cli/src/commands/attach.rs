//! Attach command

use anyhow::{Context, Result};
use taskio_core::{TaskIo, TaskIoConfig};
use taskio_protocol::ContainerId;

use super::{session_options, SessionArgs};

/// Attach the local terminal to a running container
///
/// Input is forwarded through a raw local terminal unless `no_stdin` is set,
/// in which case only the container output is streamed.
pub async fn attach_command(
    args: &SessionArgs,
    config: &TaskIoConfig,
    container: &str,
    no_stdin: bool,
) -> Result<i32> {
    let container_id: ContainerId = container
        .parse()
        .with_context(|| format!("Invalid container ID {:?}", container))?;

    let interactive = !no_stdin;
    let options = session_options(args, config)?
        .interactive(interactive)
        .tty(interactive);

    let code = TaskIo::new(container_id, options)
        .attach()
        .await
        .with_context(|| format!("Failed to attach to container {}", container))?;
    Ok(code)
}
