use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use clap::{Args, ValueEnum};

use gitrama_invoke::{CliInvoker, HttpInvoker, Invoker};
use gitrama_mcp::GitramaServer;
use gitrama_serve::ServeConfig;
use gitrama_store::{ConfigStore, Store};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout, for MCP clients that spawn the server
    Stdio,
    /// Streamable HTTP at /mcp, plus webhook intake
    #[value(alias = "http")]
    StreamableHttp,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Transport to serve on
    #[arg(long, env = "GTR_MCP_TRANSPORT", value_enum, default_value = "stdio")]
    pub transport: Transport,
    /// Bind address for streamable-http
    #[arg(long, env = "GTR_MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port for streamable-http
    #[arg(long, env = "GTR_MCP_PORT", default_value_t = 8765)]
    pub port: u16,
    /// Path of the gtr binary (default: config `cli_bin`, else `gtr` on PATH)
    #[arg(long = "cli", env = "GTR_CLI")]
    pub cli_bin: Option<String>,
    /// Hosted API base URL for the CI-recovery tools (default: config `api_url`)
    #[arg(long, env = "GTR_API_URL")]
    pub api_url: Option<String>,
    /// Bearer token for the hosted API
    #[arg(long, env = "GITRAMA_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

const TTY_HELP: &str = r#"
Gitrama MCP Server

This server speaks MCP over stdio and is meant to be launched by an
MCP-compatible AI client, not run directly in a terminal.

Quick setup:

  Cursor         -> add to .cursor/mcp.json
  Claude Desktop -> add to claude_desktop_config.json
  Claude Code    -> claude mcp add gitrama -- gitrama-mcp
  Windsurf       -> add to mcp_config.json
  VS Code        -> add to .vscode/mcp.json

Example config:
  {
    "mcpServers": {
      "gitrama": {
        "command": "gitrama-mcp",
        "env": { "GITRAMA_TOKEN": "your-token" }
      }
    }
  }

HTTP mode:  gitrama-mcp serve --transport streamable-http --port 8765
Docs:       https://gitrama.ai/mcp
"#;

pub fn execute(cwd: &Path, store: &Store, args: ServeArgs) -> anyhow::Result<()> {
    if args.transport == Transport::Stdio && std::io::stdin().is_terminal() {
        println!("{TTY_HELP}");
        return Ok(());
    }

    let server = build_server(cwd, store, &args)?;
    let rt = tokio::runtime::Runtime::new()?;
    match args.transport {
        Transport::Stdio => rt.block_on(gitrama_mcp::serve_stdio(server)),
        Transport::StreamableHttp => {
            let config = ServeConfig {
                host: args.host,
                port: args.port,
            };
            rt.block_on(gitrama_serve::serve(server, config))
        }
    }
}

fn build_server(cwd: &Path, store: &Store, args: &ServeArgs) -> anyhow::Result<GitramaServer> {
    let config = ConfigStore::new(store).load()?;

    let cli_bin = args
        .cli_bin
        .clone()
        .unwrap_or_else(|| config.cli_bin().to_string());
    let cli = CliInvoker::with_bin(&cli_bin);
    if let Err(e) = cli.verify_available() {
        // Stream tools still work without the CLI.
        tracing::warn!("{e}");
    }

    let api_url = args
        .api_url
        .clone()
        .or(config.api_url)
        .filter(|u| !u.trim().is_empty());
    let ci: Arc<dyn Invoker> = match api_url {
        Some(url) => {
            tracing::info!(%url, "CI tools use the hosted API");
            Arc::new(HttpInvoker::new(&url, args.token.clone()))
        }
        None => Arc::new(cli.clone()),
    };

    let server = GitramaServer::new(cwd.to_path_buf(), store.clone(), Arc::new(cli)).with_ci(ci);
    tracing::debug!(
        cwd = %cwd.display(),
        repo = %server.repo_root().display(),
        store = %store.root().display(),
        %cli_bin,
        "server configured"
    );
    Ok(server)
}
