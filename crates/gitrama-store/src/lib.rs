pub mod config;
pub mod streams;

pub use config::{ConfigStore, UserConfig};
pub use streams::StreamStore;

use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable overriding the store root.
pub const HOME_ENV: &str = "GITRAMA_HOME";

/// Compute a deterministic project ID from a repo root or cwd path.
/// project_id = blake3(normalize_path(input)) → hex string (first 32 chars).
pub fn project_id(repo_root_or_cwd: &Path) -> String {
    let normalized = normalize_path(repo_root_or_cwd);
    let hash = blake3::hash(normalized.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Normalize a path: canonicalize, lowercase on Windows, forward slashes.
pub fn normalize_path(p: &Path) -> String {
    let abs = p
        .canonicalize()
        .unwrap_or_else(|_| p.to_path_buf())
        .to_string_lossy()
        .to_string();
    #[cfg(windows)]
    let abs = abs.to_lowercase();
    abs.replace('\\', "/")
}

/// Per-user store root. `$GITRAMA_HOME` wins, then the platform data dir
/// (`~/.local/share/gitrama`, `%APPDATA%\gitrama`), then `~/.gitrama`.
pub fn store_root() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        PathBuf::from(home)
    } else if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("gitrama")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".gitrama")
    } else {
        PathBuf::from(".gitrama-store")
    }
}

/// Handle on a store root. Passed explicitly to everything that persists
/// state; tests point it at a temp dir.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn discover() -> Self {
        Self::at(store_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/config.json`, shared with the `gtr` CLI.
    pub fn config_json(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// `<root>/projects/<project_id>/`
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join("projects").join(project_id)
    }

    /// `<root>/projects/<project_id>/state/streams.json`
    pub fn streams_json(&self, repo_path: &Path) -> PathBuf {
        self.project_dir(&project_id(repo_path))
            .join("state")
            .join("streams.json")
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// File-based exclusive lock guard.
pub struct LockGuard {
    _file: fs::File,
}

/// Acquire an exclusive file lock. Creates the lock file if needed.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { _file: file })
}

/// Read a JSON file; `None` when it does not exist.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let val = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("malformed {}: {e}", path.display()))?;
            Ok(Some(val))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::anyhow!("cannot read {}: {e}", path.display())),
    }
}
