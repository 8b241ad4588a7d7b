//! Workflow streams: the declared mode of work for a repository.
//!
//! A stream biases generated branch-name prefixes and the tone of generated
//! text. Four streams are built in; anything else a user switches to is
//! registered on the fly with no prefix or tone of its own.

use serde::{Deserialize, Serialize};

pub const DEFAULT_STREAM: &str = "wip";
pub const MAX_STREAM_NAME_LEN: usize = 64;

/// Built-in streams in their fixed listing order: (name, branch prefix, tone).
pub const BUILTIN_STREAMS: [(&str, &str, &str); 4] = [
    ("wip", "wip/", "concise"),
    ("hotfix", "hotfix/", "urgent"),
    ("review", "review/", "formal"),
    ("experiment", "experiment/", "exploratory"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl StreamDef {
    fn builtin(name: &str, prefix: &str, tone: &str) -> Self {
        Self {
            name: name.to_string(),
            branch_prefix: Some(prefix.to_string()),
            tone: Some(tone.to_string()),
            description: None,
            created_at: None,
        }
    }

    /// A user-defined stream: no prefix or tone convention.
    pub fn custom(name: &str, description: Option<&str>, created_at: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            branch_prefix: None,
            tone: None,
            description: description.map(str::to_string),
            created_at,
        }
    }

    pub fn is_builtin(&self) -> bool {
        is_builtin(&self.name)
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_STREAMS.iter().any(|(n, _, _)| *n == name)
}

/// Persisted stream state for one working tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamState {
    pub repo_path: String,
    #[serde(rename = "active")]
    pub active_stream_name: String,
    #[serde(rename = "streams", default)]
    pub known_streams: Vec<StreamDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// One row of `list_streams`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamListing {
    pub name: String,
    pub branch_prefix: Option<String>,
    pub is_active: bool,
}

impl StreamState {
    /// Default state: `wip` active, the four built-ins known.
    pub fn default_for(repo_path: &str) -> Self {
        Self {
            repo_path: repo_path.to_string(),
            active_stream_name: DEFAULT_STREAM.to_string(),
            known_streams: BUILTIN_STREAMS
                .iter()
                .map(|(n, p, t)| StreamDef::builtin(n, p, t))
                .collect(),
            updated_at: None,
        }
    }

    /// Restore the invariants after loading from disk: built-ins present and
    /// first in fixed order, custom streams after them in insertion order
    /// (duplicates dropped), and the active stream always known.
    pub fn normalize(mut self) -> Self {
        let mut streams: Vec<StreamDef> = Vec::with_capacity(self.known_streams.len() + 4);
        for (name, prefix, tone) in BUILTIN_STREAMS {
            let mut def = StreamDef::builtin(name, prefix, tone);
            if let Some(saved) = self.known_streams.iter().find(|s| s.name == name) {
                def.description = saved.description.clone();
            }
            streams.push(def);
        }
        for def in self.known_streams.drain(..) {
            if !streams.iter().any(|s| s.name == def.name) {
                streams.push(def);
            }
        }
        self.known_streams = streams;

        if self.active_stream_name.trim().is_empty() {
            self.active_stream_name = DEFAULT_STREAM.to_string();
        }
        if self.find(&self.active_stream_name).is_none() {
            let name = self.active_stream_name.clone();
            self.known_streams.push(StreamDef::custom(&name, None, None));
        }
        self
    }

    pub fn find(&self, name: &str) -> Option<&StreamDef> {
        self.known_streams.iter().find(|s| s.name == name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Definition of the active stream. The invariant guarantees presence;
    /// the fallback only matters for hand-built states.
    pub fn active(&self) -> StreamDef {
        self.find(&self.active_stream_name)
            .cloned()
            .unwrap_or_else(|| StreamDef::custom(&self.active_stream_name, None, None))
    }

    /// Make `name` active, registering it if unknown. A non-empty
    /// `description` replaces the stored one.
    pub fn switch_to(&mut self, name: &str, description: Option<&str>, now: Option<String>) {
        match self.known_streams.iter_mut().find(|s| s.name == name) {
            Some(def) => {
                if let Some(d) = description {
                    def.description = Some(d.to_string());
                }
            }
            None => self
                .known_streams
                .push(StreamDef::custom(name, description, now.clone())),
        }
        self.active_stream_name = name.to_string();
        self.updated_at = now;
    }

    /// Built-ins first (fixed order), then custom streams in insertion order.
    pub fn listing(&self) -> Vec<StreamListing> {
        let builtins = BUILTIN_STREAMS
            .iter()
            .filter_map(|(n, _, _)| self.find(n));
        let custom = self.known_streams.iter().filter(|s| !s.is_builtin());
        builtins
            .chain(custom)
            .map(|s| StreamListing {
                name: s.name.clone(),
                branch_prefix: s.branch_prefix.clone(),
                is_active: s.name == self.active_stream_name,
            })
            .collect()
    }
}

/// Check a stream name: 1–64 chars of `[A-Za-z0-9._-]`, alphanumeric first.
pub fn validate_stream_name(name: &str) -> Result<&str, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("stream name is required".to_string());
    }
    if name.len() > MAX_STREAM_NAME_LEN {
        return Err(format!(
            "stream name must be at most {MAX_STREAM_NAME_LEN} characters"
        ));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !first_ok || !rest_ok {
        return Err(format!(
            "invalid stream name \"{name}\": use letters, digits, '.', '_' or '-', starting with a letter or digit"
        ));
    }
    Ok(name)
}

/// Current time as RFC 3339, used to stamp switches.
pub fn now_rfc3339() -> Option<String> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .ok()
}
