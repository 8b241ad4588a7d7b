//! The narrow seam between the tool facade and whatever actually runs a tool.
//!
//! An [`Invocation`] carries both renderings of a call: the argv for the
//! `gtr` CLI and a JSON parameter object for the hosted API. Each
//! [`Invoker`] picks the one it understands.

pub mod cli;
pub mod http;
pub mod mock;

pub use cli::CliInvoker;
pub use http::HttpInvoker;
pub use mock::MockInvoker;

use std::path::PathBuf;
use std::time::Duration;

use gitrama_core::ToolError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const ASK_TIMEOUT: Duration = Duration::from_secs(180);

/// Which external program a CLI invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// The `gtr` CLI.
    Gtr,
    /// Plain git, used only for staging.
    Git,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    /// `inv_<ulid>`, for log correlation.
    pub id: String,
    /// Bare tool name (`commit`, `diagnose`, ...).
    pub tool: &'static str,
    pub program: Program,
    pub args: Vec<String>,
    pub params: serde_json::Value,
    pub stdin: Option<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(tool: &'static str, cwd: impl Into<PathBuf>) -> Self {
        Self {
            id: new_invocation_id(),
            tool,
            program: Program::Gtr,
            args: Vec::new(),
            params: serde_json::Value::Object(serde_json::Map::new()),
            stdin: None,
            cwd: cwd.into(),
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn program(mut self, program: Program) -> Self {
        self.program = program;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `--flag value`, skipped when `value` is `None`.
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }

    /// Record a named parameter for the HTTP rendering.
    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.params {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn envs(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether an argument sequence appears in order.
    pub fn has_args(&self, seq: &[&str]) -> bool {
        !seq.is_empty()
            && self
                .args
                .windows(seq.len())
                .any(|w| w.iter().zip(seq).all(|(a, b)| a == b))
    }

    /// Human-readable command line, secrets masked.
    pub fn display(&self, bin: &str) -> String {
        let mut parts = vec![bin.to_string()];
        parts.extend(self.args.iter().map(|a| {
            if a.contains(char::is_whitespace) {
                format!("{a:?}")
            } else {
                a.clone()
            }
        }));
        mask_secrets(&parts.join(" "))
    }
}

/// Raw result of a successful external call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn text(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// Runs invocations. Implemented by [`CliInvoker`], [`HttpInvoker`], and
/// [`MockInvoker`] (tests).
#[async_trait::async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;

    /// Short label for logs (`cli`, `http`, `mock`).
    fn kind(&self) -> &'static str;
}

pub fn new_invocation_id() -> String {
    format!("inv_{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Mask API keys and bearer tokens before text reaches a log line.
pub fn mask_secrets(text: &str) -> String {
    let patterns = [
        (r"sk-[a-zA-Z0-9_\-]{16,}", "[MASKED]"),
        (r"Bearer\s+[a-zA-Z0-9._\-]+", "Bearer [MASKED]"),
        (
            r"(?i)(password|secret|token|api_key|apikey)=[^\s&]+",
            "$1=[MASKED]",
        ),
    ];

    let mut result = text.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, replacement).into_owned();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_id_has_prefix() {
        let id = new_invocation_id();
        assert!(id.starts_with("inv_"));
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn opt_skips_missing_values() {
        let inv = Invocation::new("pr", ".")
            .arg("pr")
            .opt("--base", None)
            .opt("--model", Some("gpt-4o"));
        assert_eq!(inv.args, vec!["pr", "--model", "gpt-4o"]);
        assert!(inv.has_args(&["--model", "gpt-4o"]));
        assert!(!inv.has_args(&["--base"]));
    }

    #[test]
    fn params_collect_into_object() {
        let inv = Invocation::new("deploy_fix", ".")
            .param("fix", "patch")
            .param("confirm", true);
        assert_eq!(inv.params["fix"], "patch");
        assert_eq!(inv.params["confirm"], true);
    }

    #[test]
    fn display_quotes_and_masks() {
        let inv = Invocation::new("ask", ".")
            .arg("ask")
            .arg("who owns auth?")
            .arg("token=abc123");
        let shown = inv.display("gtr");
        assert!(shown.starts_with("gtr ask \"who owns auth?\""));
        assert!(shown.contains("token=[MASKED]"));
    }

    #[test]
    fn mask_secrets_hides_keys() {
        let masked = mask_secrets("auth failed for sk-proj1234567890abcdefgh");
        assert!(!masked.contains("sk-proj"));
        let masked = mask_secrets("Authorization: Bearer eyJhbGciOi.x.y");
        assert_eq!(masked, "Authorization: Bearer [MASKED]");
    }
}
