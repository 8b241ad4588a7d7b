//! Tool parameter structs.
//!
//! Every field is optional at the wire level so that a missing or blank
//! value reaches our own validation and comes back as a structured
//! `validation_error` rather than a protocol-level decode failure. Integer
//! and boolean fields stay raw JSON for the same reason; the operations
//! type-check them.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct AskParams {
    /// Natural-language question about the repository (required), e.g. "Who owns the auth module?"
    pub question: Option<String>,
    /// Context scope: auto (default), branch, full, or staged
    pub scope: Option<String>,
    /// Optional model override (e.g. "gpt-4o", "claude-sonnet-4-20250514", "ollama/llama3")
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct CommitParams {
    /// Commit message style: conventional (default), detailed, or simple
    pub message_type: Option<String>,
    /// Optional hint for the generator (e.g. "fixing auth bug")
    pub context: Option<String>,
    /// Optional model override
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct StageAndCommitParams {
    /// Space-separated paths to stage, or "." for all changes (default)
    pub files: Option<String>,
    /// Commit message style: conventional (default), detailed, or simple
    pub message_type: Option<String>,
    /// Optional hint for the generator
    pub context: Option<String>,
    /// Optional model override
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct CommitQualityParams {
    /// Number of recent commits to score (default 10, range 1-50)
    #[schemars(with = "Option<u32>")]
    pub count: Option<Value>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct BranchParams {
    /// Branch name (required). A name without '/' gets the active stream's prefix.
    pub name: Option<String>,
    /// Base branch or commit to branch from (default: current HEAD)
    pub base: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct BranchSuggestParams {
    /// What the work is about (required), e.g. "add OAuth2 login"
    pub description: Option<String>,
    /// Optional model override
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct PrParams {
    /// Target branch of the pull request (default: repository default branch)
    pub base: Option<String>,
    /// Optional model override
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct ChangelogParams {
    /// Start ref or date (tag, commit, or YYYY-MM-DD)
    pub since: Option<String>,
    /// End ref or date (default: HEAD)
    pub until: Option<String>,
    /// Output format: markdown (default) or json
    pub format: Option<String>,
    /// Optional model override
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct StreamSwitchParams {
    /// Stream to activate (required). Unknown names are registered.
    pub name: Option<String>,
    /// Optional description stored on the stream
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct DiagnoseParams {
    /// Raw CI build log (required)
    pub build_log: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct FixParams {
    /// Diagnosis text produced by gitrama_diagnose (required)
    pub diagnosis: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct DeployFixParams {
    /// Fix produced by gitrama_fix (required)
    pub fix: Option<String>,
    /// Apply for real; false (default) performs a dry run
    #[schemars(with = "Option<bool>")]
    pub confirm: Option<Value>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub(crate) struct ReportParams {
    /// Incident data to summarize (required)
    pub incident_data: Option<String>,
}
