use clap::Subcommand;

use gitrama_store::config::mask_secret;
use gitrama_store::{ConfigStore, Store};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// provider, model, api_key.<provider>, api_url, or cli_bin
        key: String,
        /// Value to store
        value: String,
    },
    /// Get a config value (API keys are masked)
    Get {
        /// Config key
        key: String,
    },
    /// Remove a config value
    Unset {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, store: &Store) -> anyhow::Result<()> {
    let config = ConfigStore::new(store);
    match cmd {
        ConfigCmd::Set { key, value } => set(&config, &key, &value),
        ConfigCmd::Get { key } => get(&config, &key),
        ConfigCmd::Unset { key } => unset(&config, &key),
        ConfigCmd::List => list(&config),
    }
}

// ── Command Implementations ──

/// `gitrama-mcp config set <key> <value>`
pub fn set(config: &ConfigStore, key: &str, value: &str) -> anyhow::Result<()> {
    let updated = config.update(|c| c.set(key, value))?;
    let shown = updated.get(key)?.unwrap_or_default();
    println!("{key} = {}", display_value(key, &shown));
    Ok(())
}

/// `gitrama-mcp config get <key>`
pub fn get(config: &ConfigStore, key: &str) -> anyhow::Result<()> {
    match config.load()?.get(key)? {
        Some(val) => println!("{}", display_value(key, &val)),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `gitrama-mcp config unset <key>`
pub fn unset(config: &ConfigStore, key: &str) -> anyhow::Result<()> {
    let mut removed = false;
    config.update(|c| {
        removed = c.unset(key)?;
        Ok(())
    })?;
    if removed {
        println!("{key} unset");
    } else {
        println!("{key} was not set");
    }
    Ok(())
}

/// `gitrama-mcp config list`
pub fn list(config: &ConfigStore) -> anyhow::Result<()> {
    let entries = config.load()?.entries();
    if entries.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in &entries {
            println!("{k} = {v}");
        }
    }
    Ok(())
}

fn display_value(key: &str, value: &str) -> String {
    if key.starts_with("api_key.") {
        mask_secret(value)
    } else {
        value.to_string()
    }
}
