//! Per-user configuration file (`<store_root>/config.json`).
//!
//! The file is shared with the `gtr` CLI, so keys this crate does not model
//! are carried through untouched on every write.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use gitrama_core::provider::{ProviderDefaults, ProviderName};
use gitrama_core::ToolError;

use crate::{read_json, write_atomic, Store};

pub const DEFAULT_CLI_BIN: &str = "gtr";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub api_keys: BTreeMap<String, String>,
    /// Base URL of the hosted API used by the CI-recovery tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_bin: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserConfig {
    pub fn provider_defaults(&self) -> ProviderDefaults {
        ProviderDefaults {
            provider: self.provider.clone(),
            model: self.model.clone(),
            api_keys: self.api_keys.clone(),
        }
    }

    pub fn cli_bin(&self) -> &str {
        self.cli_bin.as_deref().unwrap_or(DEFAULT_CLI_BIN)
    }

    /// Apply `config set <key> <value>`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ToolError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ToolError::validation(format!(
                "value for {key} must not be empty (use `config unset {key}`)"
            )));
        }
        match key {
            "provider" => {
                let p: ProviderName = value.parse()?;
                self.provider = Some(p.as_str().to_string());
            }
            "model" => self.model = Some(value.to_string()),
            "api_url" => self.api_url = Some(value.trim_end_matches('/').to_string()),
            "cli" | "cli_bin" => self.cli_bin = Some(value.to_string()),
            _ => {
                let p = api_key_provider(key)?;
                self.api_keys.insert(p.as_str().to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Remove a key. Returns whether anything was removed.
    pub fn unset(&mut self, key: &str) -> Result<bool, ToolError> {
        Ok(match key {
            "provider" => self.provider.take().is_some(),
            "model" => self.model.take().is_some(),
            "api_url" => self.api_url.take().is_some(),
            "cli" | "cli_bin" => self.cli_bin.take().is_some(),
            _ => {
                let p = api_key_provider(key)?;
                self.api_keys.remove(p.as_str()).is_some()
            }
        })
    }

    /// Raw value for `config get`.
    pub fn get(&self, key: &str) -> Result<Option<String>, ToolError> {
        Ok(match key {
            "provider" => self.provider.clone(),
            "model" => self.model.clone(),
            "api_url" => self.api_url.clone(),
            "cli" | "cli_bin" => self.cli_bin.clone(),
            _ => {
                let p = api_key_provider(key)?;
                self.api_keys.get(p.as_str()).cloned()
            }
        })
    }

    /// All modeled entries for `config list`, with keys masked.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(p) = &self.provider {
            out.push(("provider".to_string(), p.clone()));
        }
        if let Some(m) = &self.model {
            out.push(("model".to_string(), m.clone()));
        }
        for (p, k) in &self.api_keys {
            out.push((format!("api_key.{p}"), mask_secret(k)));
        }
        if let Some(u) = &self.api_url {
            out.push(("api_url".to_string(), u.clone()));
        }
        if let Some(c) = &self.cli_bin {
            out.push(("cli_bin".to_string(), c.clone()));
        }
        out
    }
}

fn api_key_provider(key: &str) -> Result<ProviderName, ToolError> {
    match key.strip_prefix("api_key.") {
        Some(p) => p.parse(),
        None => Err(ToolError::validation(format!(
            "unknown config key \"{key}\" (expected provider, model, api_key.<provider>, api_url, cli_bin)"
        ))),
    }
}

/// Show only the last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{tail}")
    }
}

/// Load/save handle for the user config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(store: &Store) -> Self {
        Self {
            path: store.config_json(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Missing file means empty config.
    pub fn load(&self) -> anyhow::Result<UserConfig> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    pub fn save(&self, config: &UserConfig) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        let _lock = crate::lock_file(&self.path.with_extension("json.lock"))?;
        write_atomic(&self.path, json.as_bytes())?;
        tracing::debug!(path = %self.path.display(), "user config written");
        Ok(())
    }

    /// Load, mutate, save.
    pub fn update<F>(&self, f: F) -> Result<UserConfig, ToolError>
    where
        F: FnOnce(&mut UserConfig) -> Result<(), ToolError>,
    {
        let mut config = self.load().map_err(config_err)?;
        f(&mut config)?;
        self.save(&config).map_err(config_err)?;
        Ok(config)
    }
}

pub(crate) fn config_err(e: anyhow::Error) -> ToolError {
    ToolError::configuration(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let tmp = tempfile::tempdir().unwrap();
        let cs = ConfigStore::new(&Store::at(tmp.path()));
        (tmp, cs)
    }

    #[test]
    fn missing_file_is_empty_config() {
        let (_tmp, cs) = store();
        let cfg = cs.load().unwrap();
        assert_eq!(cfg, UserConfig::default());
        assert_eq!(cfg.cli_bin(), "gtr");
        assert!(!cs.path().exists());
    }

    #[test]
    fn set_then_load_round_trips_provider_fields() {
        let (_tmp, cs) = store();
        cs.update(|c| {
            c.set("provider", "Anthropic")?;
            c.set("api_key.claude", "sk-ant-123456")?;
            c.set("api_url", "https://api.gitrama.ai/")
        })
        .unwrap();

        let cfg = cs.load().unwrap();
        assert_eq!(cfg.provider.as_deref(), Some("claude"));
        assert_eq!(cfg.api_url.as_deref(), Some("https://api.gitrama.ai"));
        let defaults = cfg.provider_defaults();
        assert_eq!(defaults.api_keys.get("claude").unwrap(), "sk-ant-123456");
    }

    #[test]
    fn unknown_keys_written_by_cli_are_preserved() {
        let (_tmp, cs) = store();
        std::fs::create_dir_all(cs.path().parent().unwrap()).unwrap();
        std::fs::write(
            cs.path(),
            r#"{"provider":"mistral","telemetry":false,"ui":{"color":true}}"#,
        )
        .unwrap();

        cs.update(|c| c.set("model", "codestral-latest")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(cs.path()).unwrap()).unwrap();
        assert_eq!(raw["telemetry"], false);
        assert_eq!(raw["ui"]["color"], true);
        assert_eq!(raw["model"], "codestral-latest");
    }

    #[test]
    fn invalid_provider_is_rejected_and_not_written() {
        let (_tmp, cs) = store();
        let err = cs.update(|c| c.set("provider", "skynet")).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
        assert!(!cs.path().exists());
    }

    #[test]
    fn unknown_key_is_validation_error() {
        let mut cfg = UserConfig::default();
        assert!(matches!(
            cfg.set("colour", "blue"),
            Err(ToolError::Validation(_))
        ));
        assert!(cfg.get("api_key.nope").is_err());
    }

    #[test]
    fn unset_removes_entries() {
        let mut cfg = UserConfig::default();
        cfg.set("api_key.openai", "sk-abc").unwrap();
        assert!(cfg.unset("api_key.openai").unwrap());
        assert!(!cfg.unset("api_key.openai").unwrap());
        assert!(cfg.api_keys.is_empty());
    }

    #[test]
    fn entries_mask_keys() {
        let mut cfg = UserConfig::default();
        cfg.set("api_key.openai", "sk-abcdef1234").unwrap();
        let entries = cfg.entries();
        assert_eq!(
            entries,
            vec![("api_key.openai".to_string(), "****1234".to_string())]
        );
        assert_eq!(mask_secret("abc"), "****");
    }

    #[test]
    fn malformed_file_is_configuration_error() {
        let (_tmp, cs) = store();
        std::fs::create_dir_all(cs.path().parent().unwrap()).unwrap();
        std::fs::write(cs.path(), "[1, 2").unwrap();
        let err = cs.update(|c| c.set("model", "x")).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }
}
