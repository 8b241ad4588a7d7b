mod cmd_config;
mod cmd_serve;
mod cmd_stream;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd_config::ConfigCmd;
use cmd_serve::ServeArgs;
use cmd_stream::StreamCmd;

#[derive(Parser)]
#[command(
    name = "gitrama-mcp",
    version,
    about = "MCP server exposing Gitrama git intelligence to AI assistants",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Working directory the tools run in (default: current directory)
    #[arg(long, env = "GTR_CWD", global = true)]
    cwd: Option<PathBuf>,

    /// Serve options used when no subcommand is given
    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server (default)
    Serve(ServeArgs),
    /// Manage the user config shared with the gtr CLI
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// Inspect or switch the workflow stream of the working tree
    Stream {
        #[command(subcommand)]
        cmd: StreamCmd,
    },
}

fn init_tracing() {
    // stdout carries MCP framing in stdio mode; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let store = gitrama_store::Store::discover();

    match cli.cmd {
        None => cmd_serve::execute(&cwd, &store, cli.serve),
        Some(Command::Serve(args)) => cmd_serve::execute(&cwd, &store, args),
        Some(Command::Config { cmd }) => cmd_config::run(cmd, &store),
        Some(Command::Stream { cmd }) => cmd_stream::run(cmd, &cwd, &store),
    }
}
