//! taskio CLI
//!
//! Attach the local terminal to a container, or exec a command in a new
//! nested container, through an agent's streaming API:
//! - `taskio attach` streams a running container's stdio
//! - `taskio exec` launches a command and streams its stdio
//!
//! The process exits with the remote command's exit code.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskio::commands::{self, ExecFlags, SessionArgs};
use taskio::output::print_error;

#[derive(Parser)]
#[command(name = "taskio")]
#[command(author, version, about = "Interactive I/O for containers behind an agent")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AgentArgs {
    /// Agent base URL, e.g. http://10.0.0.1:5051
    #[arg(long, env = "TASKIO_AGENT_URL")]
    agent: String,

    /// ACS token sent to the agent
    #[arg(long, env = "TASKIO_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Key sequence for detaching, e.g. "ctrl-p,ctrl-q"
    #[arg(long)]
    detach_keys: Option<String>,
}

impl From<AgentArgs> for SessionArgs {
    fn from(args: AgentArgs) -> Self {
        SessionArgs {
            agent: args.agent,
            token: args.token,
            detach_keys: args.detach_keys,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to the stdio of a running container
    Attach {
        #[command(flatten)]
        agent: AgentArgs,
        /// Only stream output; do not forward local input
        #[arg(long)]
        no_stdin: bool,
        /// Container ID, dotted for nested containers (parent.child)
        container: String,
    },

    /// Run a command in a new container nested under CONTAINER
    Exec {
        #[command(flatten)]
        agent: AgentArgs,
        /// Forward local input to the command
        #[arg(short, long)]
        interactive: bool,
        /// Allocate a remote TTY and put the local terminal in raw mode
        #[arg(short, long)]
        tty: bool,
        /// User to run the command as
        #[arg(short, long)]
        user: Option<String>,
        /// Container ID, dotted for nested containers (parent.child)
        container: String,
        /// Command to run, followed by its arguments
        #[arg(
            value_name = "COMMAND",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Exit directly: a pending stdin read would otherwise hold up runtime shutdown.
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = commands::load_session_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Attach {
            agent,
            no_stdin,
            container,
        } => commands::attach_command(&agent.into(), &config, &container, no_stdin).await,

        Commands::Exec {
            agent,
            interactive,
            tty,
            user,
            container,
            command,
        } => {
            let Some((cmd, args)) = command.split_first() else {
                anyhow::bail!("No command given");
            };
            let flags = ExecFlags {
                interactive,
                tty,
                user,
            };
            commands::exec_command(&agent.into(), &config, &container, flags, cmd, args).await
        }
    }
}
