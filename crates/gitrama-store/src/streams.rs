//! Durable stream state, one file per working tree.
//!
//! Reads never write. Switches take an exclusive lock on a sibling lock
//! file and replace the state file atomically; two processes switching at
//! once still resolve last-write-wins.

use std::path::{Path, PathBuf};

use gitrama_core::stream::{now_rfc3339, validate_stream_name};
use gitrama_core::{StreamListing, StreamState, ToolError};

use crate::config::config_err;
use crate::{lock_file, normalize_path, read_json, write_atomic, Store};

#[derive(Debug, Clone)]
pub struct StreamStore {
    store: Store,
}

impl StreamStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn state_path(&self, repo_path: &Path) -> PathBuf {
        self.store.streams_json(repo_path)
    }

    /// Persisted state for `repo_path`, or the default when none exists.
    pub fn get_active_stream(&self, repo_path: &Path) -> Result<StreamState, ToolError> {
        self.load(repo_path).map_err(config_err)
    }

    /// Make `name` active, registering it when unknown, and persist.
    pub fn switch_stream(
        &self,
        repo_path: &Path,
        name: &str,
        description: Option<&str>,
    ) -> Result<StreamState, ToolError> {
        let name = validate_stream_name(name).map_err(ToolError::Validation)?;
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let path = self.state_path(repo_path);

        let _lock = lock_file(&path.with_extension("json.lock")).map_err(config_err)?;
        let mut state = self.load(repo_path).map_err(config_err)?;
        let previous = state.active_stream_name.clone();
        let registered = !state.is_known(name);
        state.switch_to(name, description, now_rfc3339());

        let json = serde_json::to_string_pretty(&state).map_err(|e| config_err(e.into()))?;
        write_atomic(&path, json.as_bytes()).map_err(config_err)?;

        tracing::info!(
            repo = %state.repo_path,
            from = %previous,
            to = %name,
            registered,
            "stream switched"
        );
        Ok(state)
    }

    /// Built-ins first in fixed order, then custom streams in insertion order.
    pub fn list_streams(&self, repo_path: &Path) -> Result<Vec<StreamListing>, ToolError> {
        Ok(self.get_active_stream(repo_path)?.listing())
    }

    fn load(&self, repo_path: &Path) -> anyhow::Result<StreamState> {
        let path = self.state_path(repo_path);
        let state = match read_json::<StreamState>(&path)? {
            Some(s) => s.normalize(),
            None => StreamState::default_for(&normalize_path(repo_path)),
        };
        Ok(state)
    }
}
