use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use flowd::client;
use flowd::config::DaemonConfig;
use flowd::error::FlowdError;
use flowd::manager::Manager;
use flowd::protocol::TaskRequest;
use flowd::tasks::TaskRegistry;

#[derive(Parser, Debug)]
#[command(name = "flowd")]
#[command(version)]
#[command(about = "A single-host task-execution daemon with a socket-facing worker pool")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the daemon
    Start(StartArgs),

    /// Stop a running daemon
    Stop {
        /// Pid marker file of the instance to stop
        #[arg(long, default_value = "/tmp/flowd.pid")]
        pid_file: PathBuf,
    },

    /// Check whether a daemon is running
    Status {
        /// Pid marker file of the instance to check
        #[arg(long, default_value = "/tmp/flowd.pid")]
        pid_file: PathBuf,
    },

    /// Submit a task to a running daemon
    Submit(SubmitArgs),
}

// =============================================================================
// Start Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct StartArgs {
    /// Address the worker pool listens on
    #[arg(long, default_value = "127.0.0.1:3600")]
    addr: SocketAddr,

    /// Number of sibling job servers sharing the address
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Pid marker file guarding single-instance execution
    #[arg(long, default_value = "/tmp/flowd.pid")]
    pid_file: PathBuf,

    /// Detach from the terminal and run in the background
    #[arg(long)]
    daemon: bool,

    /// Host allowed to connect (repeatable). When any are given, everyone
    /// else is dropped.
    #[arg(long = "allow")]
    allow: Vec<IpAddr>,

    /// Host whose connections are dropped on accept (repeatable)
    #[arg(long = "deny")]
    deny: Vec<IpAddr>,
}

// =============================================================================
// Submit Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SubmitArgs {
    /// Registered task name (e.g. "echo", "shell")
    task: String,

    /// Positional argument, parsed as JSON with bare-string fallback
    /// (repeatable, in order)
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Keyword argument as key=value, the value parsed as JSON with
    /// bare-string fallback (repeatable)
    #[arg(long = "kwarg")]
    kwargs: Vec<String>,

    /// Daemon address
    #[arg(long, short = 'a', default_value = "127.0.0.1:3600")]
    addr: SocketAddr,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Daemon Commands
// =============================================================================

async fn handle_start(args: StartArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.daemon {
        return detach();
    }

    let mut config = DaemonConfig::new(args.addr)
        .with_workers(args.workers)
        .with_pid_file(args.pid_file);
    for host in args.allow {
        config = config.with_allowed_host(host);
    }
    for host in args.deny {
        config = config.with_denied_host(host);
    }

    let registry = Arc::new(TaskRegistry::with_builtins());
    let manager = Manager::new(config, registry);
    match manager.run().await {
        Ok(()) => Ok(()),
        Err(FlowdError::AlreadyRunning(pid)) => {
            println!("Daemon already running (pid {pid})");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Re-exec the same start command detached from the terminal, in a new
/// session with null stdio.
fn detach() -> Result<(), Box<dyn std::error::Error>> {
    let exe = std::env::current_exe()?;
    let mut cmd = std::process::Command::new(exe);
    cmd.args(std::env::args().skip(1).filter(|arg| arg != "--daemon"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    let child = cmd.spawn()?;
    println!("Daemon started (pid {})", child.id());
    Ok(())
}

fn handle_stop(pid_file: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match Manager::get_pid(pid_file) {
        Ok(pid) => {
            #[cfg(unix)]
            {
                std::process::Command::new("kill")
                    .args(["-TERM", &pid.to_string()])
                    .output()?;
            }
            println!("Sent stop signal to pid {pid}");
            Ok(())
        }
        Err(FlowdError::NotRunning) => {
            println!("No running instance");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn handle_status(pid_file: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match Manager::get_pid(pid_file) {
        Ok(pid) => {
            if process_alive(pid)? {
                println!("running (pid {pid})");
            } else {
                println!("stopped (stale pid marker)");
            }
            Ok(())
        }
        Err(FlowdError::NotRunning) => {
            println!("stopped");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> Result<bool, Box<dyn std::error::Error>> {
    let output = std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()?;
    Ok(output.status.success())
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> Result<bool, Box<dyn std::error::Error>> {
    Ok(false)
}

// =============================================================================
// Submit Command
// =============================================================================

async fn handle_submit(args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = TaskRequest::new(&args.task);
    for arg in &args.args {
        request = request.with_arg(parse_value(arg));
    }
    for kwarg in &args.kwargs {
        let (key, value) = kwarg
            .split_once('=')
            .ok_or_else(|| format!("invalid kwarg (expected key=value): {kwarg}"))?;
        request = request.with_kwarg(key, parse_value(value));
    }

    let response = client::submit(args.addr, &request).await?;
    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => {
            if response.ok {
                match response.result {
                    Some(serde_json::Value::String(text)) => print!("{text}"),
                    Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    None => {}
                }
            } else {
                eprintln!(
                    "Error: {}",
                    response.error.as_deref().unwrap_or("task failed")
                );
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Parse a CLI value as JSON, falling back to a bare string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Start(start_args) => {
            handle_start(start_args).await?;
        }
        Commands::Stop { pid_file } => {
            handle_stop(&pid_file)?;
        }
        Commands::Status { pid_file } => {
            handle_status(&pid_file)?;
        }
        Commands::Submit(submit_args) => {
            handle_submit(submit_args).await?;
        }
    }

    Ok(())
}
