use std::path::Path;

use clap::Subcommand;

use gitrama_mcp::discover_repo_root;
use gitrama_store::{Store, StreamStore};

#[derive(Subcommand)]
pub enum StreamCmd {
    /// Show the active stream
    Status,
    /// Switch the active stream, registering it if new
    Switch {
        /// Stream name (wip, hotfix, review, experiment, or custom)
        name: String,
        /// Description stored on the stream
        #[arg(long)]
        description: Option<String>,
    },
    /// List known streams
    List,
}

pub fn run(cmd: StreamCmd, cwd: &Path, store: &Store) -> anyhow::Result<()> {
    let repo = discover_repo_root(cwd);
    let streams = StreamStore::new(store.clone());
    match cmd {
        StreamCmd::Status => {
            let state = streams.get_active_stream(&repo)?;
            let active = state.active();
            println!("Active stream: {}", active.name);
            if let Some(prefix) = &active.branch_prefix {
                println!("Branch prefix: {prefix}");
            }
            if let Some(tone) = &active.tone {
                println!("Tone: {tone}");
            }
            if let Some(desc) = &active.description {
                println!("Description: {desc}");
            }
        }
        StreamCmd::Switch { name, description } => {
            let state = streams.switch_stream(&repo, &name, description.as_deref())?;
            println!("Switched to stream '{}'", state.active_stream_name);
        }
        StreamCmd::List => {
            for l in streams.list_streams(&repo)? {
                let marker = if l.is_active { "*" } else { " " };
                println!(
                    "{marker} {:<12} {}",
                    l.name,
                    l.branch_prefix.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}
