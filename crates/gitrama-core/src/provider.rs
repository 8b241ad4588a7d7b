//! AI provider resolution.
//!
//! Each tool call resolves its backend fresh from four layers, highest
//! precedence first: call-site override, process environment, persisted
//! config file, built-in default. Resolution is pure: it never touches the
//! network and never writes the config file.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ToolError, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ProviderName {
    #[default]
    Mistral,
    OpenAi,
    Claude,
    Ollama,
}

impl ProviderName {
    pub const ALL: [ProviderName; 4] = [
        ProviderName::Mistral,
        ProviderName::OpenAi,
        ProviderName::Claude,
        ProviderName::Ollama,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderName::Mistral => "mistral",
            ProviderName::OpenAi => "openai",
            ProviderName::Claude => "claude",
            ProviderName::Ollama => "ollama",
        }
    }

    /// Hosted providers other than the default need the caller's own key.
    pub fn requires_key(self) -> bool {
        matches!(self, ProviderName::OpenAi | ProviderName::Claude)
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderName::Mistral => "mistral-large-latest",
            ProviderName::OpenAi => "gpt-4o",
            ProviderName::Claude => "claude-sonnet-4-20250514",
            ProviderName::Ollama => "llama3",
        }
    }

    /// Vendor environment variable holding this provider's key.
    pub fn key_env_var(self) -> Option<&'static str> {
        match self {
            ProviderName::Mistral => Some("MISTRAL_API_KEY"),
            ProviderName::OpenAi => Some("OPENAI_API_KEY"),
            ProviderName::Claude => Some("ANTHROPIC_API_KEY"),
            ProviderName::Ollama => None,
        }
    }

    /// Guess the provider a model name belongs to.
    pub fn infer_from_model(model: &str) -> Option<Self> {
        let m = model.trim().to_ascii_lowercase();
        if let Some((prefix, _)) = m.split_once('/') {
            if let Ok(p) = prefix.parse() {
                return Some(p);
            }
        }
        if m.starts_with("gpt-") || m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4")
        {
            Some(ProviderName::OpenAi)
        } else if m.starts_with("claude") {
            Some(ProviderName::Claude)
        } else if m.starts_with("mistral") || m.starts_with("codestral") || m.starts_with("magistral")
        {
            Some(ProviderName::Mistral)
        } else {
            None
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mistral" => Ok(ProviderName::Mistral),
            "openai" => Ok(ProviderName::OpenAi),
            "claude" | "anthropic" => Ok(ProviderName::Claude),
            "ollama" | "local" => Ok(ProviderName::Ollama),
            other => Err(ToolError::configuration(format!(
                "unknown provider \"{other}\" (expected one of: mistral, openai, claude, ollama)"
            ))),
        }
    }
}

/// Resolved backend for a single call.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider_name: ProviderName,
    pub model_name: String,
    pub api_key: Option<String>,
}

// Keys never reach logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderConfig {
    /// Environment handed to the external CLI so it targets the same backend.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("GTR_PROVIDER".to_string(), self.provider_name.as_str().to_string()),
            ("GTR_MODEL".to_string(), self.model_name.clone()),
        ];
        if let Some(key) = &self.api_key {
            env.push(("GTR_API_KEY".to_string(), key.clone()));
        }
        env
    }
}

/// Per-call override: the `model` tool parameter, plus provider/key when a
/// caller supplies them programmatically.
#[derive(Debug, Clone, Default)]
pub struct ProviderOverride {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl ProviderOverride {
    pub fn model(model: Option<&str>) -> Self {
        Self {
            model: clean(model.map(str::to_string)),
            ..Default::default()
        }
    }
}

/// Snapshot of the provider-related process environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderEnv {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub vendor_keys: BTreeMap<ProviderName, String>,
}

impl ProviderEnv {
    /// Build from any variable lookup (tests pass a map, the binary passes
    /// `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vendor_keys = ProviderName::ALL
            .iter()
            .filter_map(|p| {
                let var = p.key_env_var()?;
                clean(lookup(var)).map(|k| (*p, k))
            })
            .collect();
        Self {
            provider: clean(lookup("GTR_PROVIDER")),
            model: clean(lookup("GTR_MODEL")),
            api_key: clean(lookup("GTR_API_KEY")),
            vendor_keys,
        }
    }

    pub fn from_process() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

/// Provider defaults persisted in the user config file.
#[derive(Debug, Clone, Default)]
pub struct ProviderDefaults {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_keys: BTreeMap<String, String>,
}

/// Apply the precedence order and validate the result.
pub fn resolve(
    call: &ProviderOverride,
    env: &ProviderEnv,
    file: &ProviderDefaults,
) -> ToolResult<ProviderConfig> {
    let layers: [(Option<&str>, Option<&str>); 3] = [
        (call.provider.as_deref(), call.model.as_deref()),
        (env.provider.as_deref(), env.model.as_deref()),
        (file.provider.as_deref(), file.model.as_deref()),
    ];

    let mut provider = None;
    for (name, model) in layers {
        if let Some(name) = name {
            provider = Some(name.parse::<ProviderName>()?);
            break;
        }
        if let Some(p) = model.and_then(ProviderName::infer_from_model) {
            provider = Some(p);
            break;
        }
    }
    let provider = provider.unwrap_or_default();

    // A model set for a different provider is skipped rather than sent to
    // the wrong backend.
    let model_name = layers
        .iter()
        .filter_map(|(_, m)| *m)
        .find(|m| ProviderName::infer_from_model(m).map_or(true, |p| p == provider))
        .map(str::to_string)
        .unwrap_or_else(|| provider.default_model().to_string());

    let api_key = call
        .api_key
        .clone()
        .or_else(|| env.api_key.clone())
        .or_else(|| env.vendor_keys.get(&provider).cloned())
        .or_else(|| file.api_keys.get(provider.as_str()).cloned())
        .and_then(|k| clean(Some(k)));

    let config = ProviderConfig {
        provider_name: provider,
        model_name,
        api_key,
    };
    validate(&config)?;
    Ok(config)
}

/// Check that key-requiring providers have a non-empty key.
pub fn validate(config: &ProviderConfig) -> ToolResult<()> {
    let provider = config.provider_name;
    let has_key = config
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());
    if provider.requires_key() && !has_key {
        let var = provider.key_env_var().unwrap_or("GTR_API_KEY");
        return Err(ToolError::configuration(format!(
            "provider \"{provider}\" requires an API key: set {var} or run `gitrama-mcp config set api_key.{provider} <key>`"
        )));
    }
    Ok(())
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> ProviderEnv {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProviderEnv::from_lookup(|k| map.get(k).cloned())
    }

    fn call(provider: Option<&str>, model: Option<&str>) -> ProviderOverride {
        ProviderOverride {
            provider: provider.map(str::to_string),
            model: model.map(str::to_string),
            api_key: None,
        }
    }

    #[test]
    fn builtin_default_is_mistral_without_key() {
        let cfg = resolve(
            &ProviderOverride::default(),
            &ProviderEnv::default(),
            &ProviderDefaults::default(),
        )
        .unwrap();
        assert_eq!(cfg.provider_name, ProviderName::Mistral);
        assert_eq!(cfg.model_name, "mistral-large-latest");
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn call_override_beats_environment() {
        let e = env(&[("GTR_PROVIDER", "mistral"), ("OPENAI_API_KEY", "sk-test")]);
        let cfg = resolve(&call(Some("openai"), None), &e, &ProviderDefaults::default()).unwrap();
        assert_eq!(cfg.provider_name, ProviderName::OpenAi);
        assert_eq!(cfg.model_name, "gpt-4o");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn key_requiring_provider_without_key_fails() {
        let err = resolve(
            &call(Some("openai"), None),
            &ProviderEnv::default(),
            &ProviderDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
        assert!(err.message().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn environment_beats_config_file() {
        let e = env(&[("GTR_PROVIDER", "ollama")]);
        let file = ProviderDefaults {
            provider: Some("claude".into()),
            model: Some("claude-opus-4".into()),
            ..Default::default()
        };
        let cfg = resolve(&ProviderOverride::default(), &e, &file).unwrap();
        assert_eq!(cfg.provider_name, ProviderName::Ollama);
        // File model belongs to another provider, so the default is used.
        assert_eq!(cfg.model_name, "llama3");
    }

    #[test]
    fn config_file_supplies_provider_and_key() {
        let mut api_keys = BTreeMap::new();
        api_keys.insert("claude".to_string(), "sk-ant-file".to_string());
        let file = ProviderDefaults {
            provider: Some("anthropic".into()),
            model: None,
            api_keys,
        };
        let cfg = resolve(&ProviderOverride::default(), &ProviderEnv::default(), &file).unwrap();
        assert_eq!(cfg.provider_name, ProviderName::Claude);
        assert_eq!(cfg.api_key.as_deref(), Some("sk-ant-file"));
    }

    #[test]
    fn model_override_selects_provider() {
        let e = env(&[("GTR_PROVIDER", "mistral"), ("ANTHROPIC_API_KEY", "k")]);
        let cfg = resolve(
            &ProviderOverride::model(Some("claude-sonnet-4-20250514")),
            &e,
            &ProviderDefaults::default(),
        )
        .unwrap();
        assert_eq!(cfg.provider_name, ProviderName::Claude);
        assert_eq!(cfg.model_name, "claude-sonnet-4-20250514");

        let cfg = resolve(
            &ProviderOverride::model(Some("ollama/llama3")),
            &ProviderEnv::default(),
            &ProviderDefaults::default(),
        )
        .unwrap();
        assert_eq!(cfg.provider_name, ProviderName::Ollama);
        assert_eq!(cfg.model_name, "ollama/llama3");
    }

    #[test]
    fn unknown_provider_is_configuration_error() {
        let e = env(&[("GTR_PROVIDER", "skynet")]);
        let err = resolve(&ProviderOverride::default(), &e, &ProviderDefaults::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn blank_keys_do_not_count() {
        let e = env(&[("OPENAI_API_KEY", "   ")]);
        assert!(resolve(&call(Some("openai"), None), &e, &ProviderDefaults::default()).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = ProviderConfig {
            provider_name: ProviderName::OpenAi,
            model_name: "gpt-4o".into(),
            api_key: Some("sk-secret".into()),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn cli_env_includes_key_only_when_present() {
        let cfg = ProviderConfig {
            provider_name: ProviderName::Mistral,
            model_name: "mistral-large-latest".into(),
            api_key: None,
        };
        let env = cfg.to_env();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0], ("GTR_PROVIDER".to_string(), "mistral".to_string()));
    }
}
