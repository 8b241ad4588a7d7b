//! MCP server exposing the Gitrama tool surface.
//!
//! Each tool validates its parameters, resolves the AI provider and the
//! active workflow stream where relevant, and hands an [`Invocation`] to an
//! [`Invoker`]. Output comes back unchanged; failures come back as
//! `is_error` results carrying `{"kind", "message"}` JSON.

mod params;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};

use gitrama_core::params::{
    json_bool, json_int, non_blank, parse_files, parse_or_default, require_non_empty,
    validate_count, ChangelogFormat, MessageType, Scope,
};
use gitrama_core::provider::{self, ProviderEnv, ProviderOverride};
use gitrama_core::stream::StreamDef;
use gitrama_core::{ProviderConfig, StreamState, ToolError};
use gitrama_invoke::{Invocation, Invoker, Program, ASK_TIMEOUT};
use gitrama_store::{ConfigStore, Store, StreamStore, UserConfig};

use params::*;

type ToolResult<T> = Result<T, ToolError>;

// --- MCP Server ---

/// MCP server for one working tree.
#[derive(Clone)]
pub struct GitramaServer {
    cwd: PathBuf,
    repo_root: PathBuf,
    streams: StreamStore,
    config: ConfigStore,
    env: ProviderEnv,
    /// Runs `gtr` and `git` for the local tools.
    cli: Arc<dyn Invoker>,
    /// Runs the CI-recovery tools (CLI or hosted API).
    ci: Arc<dyn Invoker>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GitramaServer {
    /// Server rooted at `cwd`, with the provider environment read from the
    /// process. CI tools share `cli` until [`with_ci`](Self::with_ci).
    pub fn new(cwd: PathBuf, store: Store, cli: Arc<dyn Invoker>) -> Self {
        let repo_root = discover_repo_root(&cwd);
        Self {
            cwd,
            repo_root,
            streams: StreamStore::new(store.clone()),
            config: ConfigStore::new(&store),
            env: ProviderEnv::from_process(),
            ci: cli.clone(),
            cli,
            tool_router: Self::tool_router(),
        }
    }

    pub fn with_ci(mut self, ci: Arc<dyn Invoker>) -> Self {
        self.ci = ci;
        self
    }

    pub fn with_env(mut self, env: ProviderEnv) -> Self {
        self.env = env;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Ask a natural-language question about the repository
    #[tool(
        description = "Ask a question about the git repository (ownership, history, risk, what changed) and get an AI answer grounded in commits, blame, and diffs"
    )]
    async fn gitrama_ask(
        &self,
        Parameters(p): Parameters<AskParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("ask", self.ask(p).await)
    }

    /// Generate and apply a commit message for staged changes
    #[tool(
        description = "Generate an AI commit message for the currently staged changes and create the commit. Stage files first or use gitrama_stage_and_commit."
    )]
    async fn gitrama_commit(
        &self,
        Parameters(p): Parameters<CommitParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("commit", self.commit(p).await)
    }

    #[tool(
        description = "Stage files (git add) and create an AI-generated commit in one step"
    )]
    async fn gitrama_stage_and_commit(
        &self,
        Parameters(p): Parameters<StageAndCommitParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("stage_and_commit", self.stage_and_commit(p).await)
    }

    #[tool(
        description = "Score the quality of recent commit messages (clarity, specificity, conventional format)"
    )]
    async fn gitrama_commit_quality(
        &self,
        Parameters(p): Parameters<CommitQualityParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("commit_quality", self.commit_quality(p).await)
    }

    #[tool(
        description = "Create a git branch. A bare name is prefixed with the active stream's branch prefix (e.g. hotfix/)."
    )]
    async fn gitrama_branch(
        &self,
        Parameters(p): Parameters<BranchParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("branch", self.branch(p).await)
    }

    #[tool(description = "Suggest branch names for a description of the work")]
    async fn gitrama_branch_suggest(
        &self,
        Parameters(p): Parameters<BranchSuggestParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("branch_suggest", self.branch_suggest(p).await)
    }

    #[tool(
        description = "Generate a pull request title and description from the commits on the current branch"
    )]
    async fn gitrama_pr(
        &self,
        Parameters(p): Parameters<PrParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("pr", self.pr(p).await)
    }

    #[tool(description = "Generate a changelog for a range of commits")]
    async fn gitrama_changelog(
        &self,
        Parameters(p): Parameters<ChangelogParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("changelog", self.changelog(p).await)
    }

    /// Show the active workflow stream
    #[tool(description = "Show the active workflow stream with its branch prefix and tone")]
    async fn gitrama_stream_status(&self) -> Result<CallToolResult, McpError> {
        respond("stream_status", self.stream_status())
    }

    #[tool(
        description = "Switch the active workflow stream (wip, hotfix, review, experiment, or a custom name)"
    )]
    async fn gitrama_stream_switch(
        &self,
        Parameters(p): Parameters<StreamSwitchParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("stream_switch", self.stream_switch(p).await)
    }

    #[tool(description = "List known workflow streams, marking the active one")]
    async fn gitrama_stream_list(&self) -> Result<CallToolResult, McpError> {
        respond("stream_list", self.stream_list())
    }

    #[tool(description = "Diagnose a failed CI build from its log")]
    async fn gitrama_diagnose(
        &self,
        Parameters(p): Parameters<DiagnoseParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("diagnose", self.diagnose(p.build_log.as_deref()).await)
    }

    #[tool(description = "Generate a fix for a CI failure diagnosis")]
    async fn gitrama_fix(
        &self,
        Parameters(p): Parameters<FixParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("fix", self.fix(p).await)
    }

    #[tool(
        description = "Deploy a generated fix. Performs a dry run unless confirm is true."
    )]
    async fn gitrama_deploy_fix(
        &self,
        Parameters(p): Parameters<DeployFixParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("deploy_fix", self.deploy_fix(p).await)
    }

    #[tool(description = "Write an incident report from CI failure data")]
    async fn gitrama_report(
        &self,
        Parameters(p): Parameters<ReportParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("report", self.report(p).await)
    }
}

// --- Operations ---

impl GitramaServer {
    async fn ask(&self, p: AskParams) -> ToolResult<String> {
        let question = require_non_empty("question", p.question.as_deref())?;
        reject_flag("question", question)?;
        let scope: Scope = parse_or_default(p.scope.as_deref())?;
        let model = non_blank(p.model.as_deref());
        let provider = self.provider(model)?;

        let scope_arg = (scope != Scope::Auto).then(|| scope.as_str());
        let inv = self
            .invocation("ask")
            .arg("ask")
            .arg(question)
            .opt("--scope", scope_arg)
            .opt("--model", model)
            .envs(provider.to_env())
            .timeout(ASK_TIMEOUT);
        self.run(&*self.cli, inv, "Question answered").await
    }

    async fn commit(&self, p: CommitParams) -> ToolResult<String> {
        let message_type: MessageType = parse_or_default(p.message_type.as_deref())?;
        let model = non_blank(p.model.as_deref());
        let provider = self.provider(model)?;
        let stream = self.active_stream()?;
        let inv = self.commit_invocation(
            message_type,
            non_blank(p.context.as_deref()),
            model,
            &provider,
            &stream,
        );
        self.run(&*self.cli, inv, "Commit created").await
    }

    async fn stage_and_commit(&self, p: StageAndCommitParams) -> ToolResult<String> {
        let files = parse_files(p.files.as_deref())?;
        let message_type: MessageType = parse_or_default(p.message_type.as_deref())?;
        let model = non_blank(p.model.as_deref());
        // Resolve everything that can fail before touching the index.
        let provider = self.provider(model)?;
        let stream = self.active_stream()?;

        let stage = self
            .invocation("stage_and_commit")
            .program(Program::Git)
            .arg("add")
            .args(files.iter().cloned())
            .param("files", files.clone());
        self.cli.invoke(&stage).await.map_err(|e| match e {
            ToolError::ExternalTool { message, exit_code } => ToolError::external(
                format!("Failed to stage files: {message}"),
                exit_code,
            ),
            other => other,
        })?;
        tracing::debug!(id = %stage.id, files = files.len(), "staged");

        let inv = self.commit_invocation(
            message_type,
            non_blank(p.context.as_deref()),
            model,
            &provider,
            &stream,
        );
        self.run(&*self.cli, inv, "Commit created").await
    }

    async fn commit_quality(&self, p: CommitQualityParams) -> ToolResult<String> {
        let count = validate_count(json_int("count", p.count.as_ref())?)?;
        let inv = self
            .invocation("commit_quality")
            .args(["commit", "--quality", "--count"])
            .arg(count.to_string())
            .param("count", count);
        self.run(&*self.cli, inv, "Commit quality analysis complete")
            .await
    }

    async fn branch(&self, p: BranchParams) -> ToolResult<String> {
        let name = require_non_empty("name", p.name.as_deref())?;
        reject_flag("name", name)?;
        let base = non_blank(p.base.as_deref());
        if let Some(base) = base {
            reject_flag("base", base)?;
        }
        let stream = self.active_stream()?;
        let full_name = match &stream.branch_prefix {
            Some(prefix) if !name.contains('/') => format!("{prefix}{name}"),
            _ => name.to_string(),
        };

        let inv = self
            .invocation("branch")
            .arg("branch")
            .arg(full_name.as_str())
            .opt("--base", base)
            .param("name", full_name.as_str());
        let done = format!("Branch '{full_name}' created");
        self.run(&*self.cli, inv, &done).await
    }

    async fn branch_suggest(&self, p: BranchSuggestParams) -> ToolResult<String> {
        let description = require_non_empty("description", p.description.as_deref())?;
        reject_flag("description", description)?;
        let model = non_blank(p.model.as_deref());
        let provider = self.provider(model)?;
        let stream = self.active_stream()?;

        let inv = self
            .invocation("branch_suggest")
            .args(["branch", "--suggest"])
            .arg(description)
            .opt("--model", model)
            .opt("--prefix", stream.branch_prefix.as_deref())
            .envs(provider.to_env());
        self.run(&*self.cli, inv, "Branch suggestions generated")
            .await
    }

    async fn pr(&self, p: PrParams) -> ToolResult<String> {
        let base = non_blank(p.base.as_deref());
        if let Some(base) = base {
            reject_flag("base", base)?;
        }
        let model = non_blank(p.model.as_deref());
        let provider = self.provider(model)?;
        let stream = self.active_stream()?;

        let inv = self
            .invocation("pr")
            .arg("pr")
            .opt("--base", base)
            .opt("--model", model)
            .opt("--tone", stream.tone.as_deref())
            .envs(provider.to_env());
        self.run(&*self.cli, inv, "PR description generated").await
    }

    async fn changelog(&self, p: ChangelogParams) -> ToolResult<String> {
        let format: ChangelogFormat = parse_or_default(p.format.as_deref())?;
        let model = non_blank(p.model.as_deref());
        let provider = self.provider(model)?;

        let inv = self
            .invocation("changelog")
            .arg("changelog")
            .opt("--since", non_blank(p.since.as_deref()))
            .opt("--until", non_blank(p.until.as_deref()))
            .args(["--format", format.as_str()])
            .opt("--model", model)
            .envs(provider.to_env());
        self.run(&*self.cli, inv, "Changelog generated").await
    }

    fn stream_status(&self) -> ToolResult<String> {
        let state = self.streams.get_active_stream(&self.repo_root)?;
        Ok(render_status(&state))
    }

    async fn stream_switch(&self, p: StreamSwitchParams) -> ToolResult<String> {
        let name = require_non_empty("name", p.name.as_deref())?.to_string();
        let description = non_blank(p.description.as_deref()).map(str::to_string);
        let streams = self.streams.clone();
        let repo = self.repo_root.clone();

        // The state lock may be held by another process; wait off the runtime.
        let (registered, state) = tokio::task::spawn_blocking(move || {
            let registered = !streams.get_active_stream(&repo)?.is_known(&name);
            let state = streams.switch_stream(&repo, &name, description.as_deref())?;
            Ok::<_, ToolError>((registered, state))
        })
        .await
        .map_err(|e| ToolError::configuration(format!("stream switch did not complete: {e}")))??;

        let mut out = format!("Switched to stream '{}'", state.active_stream_name);
        if registered {
            out.push_str(" (new stream registered)");
        }
        out.push('\n');
        out.push_str(&render_status(&state));
        Ok(out)
    }

    fn stream_list(&self) -> ToolResult<String> {
        let listing = self.streams.list_streams(&self.repo_root)?;
        let width = listing.iter().map(|l| l.name.len()).max().unwrap_or(0);
        let lines: Vec<String> = listing
            .iter()
            .map(|l| {
                let marker = if l.is_active { '*' } else { ' ' };
                let prefix = l.branch_prefix.as_deref().unwrap_or("-");
                format!("{marker} {:<width$}  {prefix}", l.name)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Diagnose a build log. Shared with the webhook intake routes.
    pub async fn diagnose(&self, build_log: Option<&str>) -> ToolResult<String> {
        let build_log = require_non_empty("build_log", build_log)?;
        let inv = self
            .invocation("diagnose")
            .args(["ci", "diagnose"])
            .stdin(build_log)
            .param("build_log", build_log);
        self.run(&*self.ci, inv, "Diagnosis complete").await
    }

    async fn fix(&self, p: FixParams) -> ToolResult<String> {
        let diagnosis = require_non_empty("diagnosis", p.diagnosis.as_deref())?;
        let inv = self
            .invocation("fix")
            .args(["ci", "fix"])
            .stdin(diagnosis)
            .param("diagnosis", diagnosis);
        self.run(&*self.ci, inv, "Fix generated").await
    }

    async fn deploy_fix(&self, p: DeployFixParams) -> ToolResult<String> {
        let fix = require_non_empty("fix", p.fix.as_deref())?;
        let confirm = json_bool("confirm", p.confirm.as_ref())?.unwrap_or(false);
        let (mode, done) = if confirm {
            ("--yes", "Fix deployed")
        } else {
            ("--dry-run", "Dry run complete, nothing deployed")
        };
        let inv = self
            .invocation("deploy_fix")
            .args(["ci", "deploy-fix", mode])
            .stdin(fix)
            .param("fix", fix)
            .param("confirm", confirm);
        self.run(&*self.ci, inv, done).await
    }

    async fn report(&self, p: ReportParams) -> ToolResult<String> {
        let incident_data = require_non_empty("incident_data", p.incident_data.as_deref())?;
        let inv = self
            .invocation("report")
            .args(["ci", "report"])
            .stdin(incident_data)
            .param("incident_data", incident_data);
        self.run(&*self.ci, inv, "Incident report generated").await
    }

    // --- Helpers ---

    fn invocation(&self, tool: &'static str) -> Invocation {
        Invocation::new(tool, self.cwd.clone())
    }

    fn commit_invocation(
        &self,
        message_type: MessageType,
        context: Option<&str>,
        model: Option<&str>,
        provider: &ProviderConfig,
        stream: &StreamDef,
    ) -> Invocation {
        self.invocation("commit")
            .args(["commit", "--type", message_type.as_str()])
            .opt("--context", context)
            .opt("--model", model)
            .opt("--tone", stream.tone.as_deref())
            .arg("--yes")
            .envs(provider.to_env())
    }

    fn load_config(&self) -> ToolResult<UserConfig> {
        self.config
            .load()
            .map_err(|e| ToolError::configuration(format!("{e:#}")))
    }

    /// Resolve the backend for this call: `model` override, then process
    /// environment, then the user config file.
    fn provider(&self, model: Option<&str>) -> ToolResult<ProviderConfig> {
        let file = self.load_config()?.provider_defaults();
        let resolved = provider::resolve(&ProviderOverride::model(model), &self.env, &file)?;
        tracing::debug!(provider = %resolved.provider_name, model = %resolved.model_name, "provider resolved");
        Ok(resolved)
    }

    fn active_stream(&self) -> ToolResult<StreamDef> {
        Ok(self.streams.get_active_stream(&self.repo_root)?.active())
    }

    async fn run(&self, invoker: &dyn Invoker, inv: Invocation, done: &str) -> ToolResult<String> {
        tracing::info!(id = %inv.id, tool = inv.tool, invoker = invoker.kind(), "invoking");
        let out = invoker.invoke(&inv).await?;
        if out.stdout.is_empty() {
            Ok(done.to_string())
        } else {
            Ok(out.stdout)
        }
    }
}

#[tool_handler]
impl ServerHandler for GitramaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Gitrama git intelligence: AI commit messages, branch names, PR descriptions, changelogs, workflow streams, and CI failure recovery"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn respond(tool: &str, result: ToolResult<String>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => {
            tracing::warn!(tool, kind = e.kind().as_str(), error = %e, "tool failed");
            Ok(CallToolResult::error(vec![Content::text(
                e.to_json().to_string(),
            )]))
        }
    }
}

/// Positional values must never be read as options by the CLI.
fn reject_flag(param: &str, value: &str) -> ToolResult<()> {
    if value.starts_with('-') {
        return Err(ToolError::validation(format!(
            "{param} must not start with '-' (got \"{value}\")"
        )));
    }
    Ok(())
}

fn render_status(state: &StreamState) -> String {
    let active = state.active();
    let mut lines = vec![format!("Active stream: {}", active.name)];
    lines.push(format!(
        "Branch prefix: {}",
        active.branch_prefix.as_deref().unwrap_or("(none)")
    ));
    lines.push(format!("Tone: {}", active.tone.as_deref().unwrap_or("(default)")));
    if let Some(d) = &active.description {
        lines.push(format!("Description: {d}"));
    }
    lines.push(format!("Repository: {}", state.repo_path));
    lines.join("\n")
}

/// Nearest ancestor holding `.git`, else `cwd` itself.
pub fn discover_repo_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|p| p.join(".git").exists())
        .unwrap_or(cwd)
        .to_path_buf()
}

/// Start the MCP server on stdio transport.
pub async fn serve_stdio(server: GitramaServer) -> anyhow::Result<()> {
    tracing::info!(repo = %server.repo_root.display(), "serving MCP over stdio");
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitrama_core::provider::ProviderName;
    use gitrama_invoke::{MockInvoker, ToolOutput};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        repo: TempDir,
        mock: Arc<MockInvoker>,
        server: GitramaServer,
    }

    fn setup() -> Fixture {
        setup_with_env(ProviderEnv::default())
    }

    fn setup_with_env(env: ProviderEnv) -> Fixture {
        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::create_dir(repo.path().join(".git")).unwrap();
        let mock = Arc::new(MockInvoker::new());
        let server = GitramaServer::new(
            repo.path().to_path_buf(),
            Store::at(home.path()),
            mock.clone(),
        )
        .with_env(env);
        Fixture {
            _home: home,
            repo,
            mock,
            server,
        }
    }

    fn text(result: &CallToolResult) -> &str {
        result.content[0].raw.as_text().unwrap().text.as_str()
    }

    fn error_kind(result: &CallToolResult) -> String {
        assert_eq!(result.is_error, Some(true));
        let parsed: serde_json::Value = serde_json::from_str(text(result)).unwrap();
        parsed["kind"].as_str().unwrap().to_string()
    }

    #[test]
    fn server_info_has_tools() {
        let f = setup();
        let info = f.server.get_info();
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn every_tool_is_registered_with_prefix() {
        let f = setup();
        let mut names: Vec<String> = f
            .server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "gitrama_ask",
                "gitrama_branch",
                "gitrama_branch_suggest",
                "gitrama_changelog",
                "gitrama_commit",
                "gitrama_commit_quality",
                "gitrama_deploy_fix",
                "gitrama_diagnose",
                "gitrama_fix",
                "gitrama_pr",
                "gitrama_report",
                "gitrama_stage_and_commit",
                "gitrama_stream_list",
                "gitrama_stream_status",
                "gitrama_stream_switch",
            ]
        );
    }

    #[test]
    fn repo_root_is_discovered_from_subdirectory() {
        let f = setup();
        let sub = f.repo.path().join("src/deep");
        std::fs::create_dir_all(&sub).unwrap();
        assert_eq!(discover_repo_root(&sub), f.repo.path());
    }

    // --- commit_quality ---

    #[tokio::test]
    async fn commit_quality_rejects_out_of_range_without_invoking() {
        let f = setup();
        for count in [0, 51, -3] {
            let result = f
                .server
                .gitrama_commit_quality(Parameters(CommitQualityParams { count: Some(count.into()) }))
                .await
                .unwrap();
            assert_eq!(error_kind(&result), "validation_error");
        }
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn commit_quality_accepts_bounds() {
        let f = setup();
        for count in [1, 50] {
            let result = f
                .server
                .gitrama_commit_quality(Parameters(CommitQualityParams { count: Some(count.into()) }))
                .await
                .unwrap();
            assert_ne!(result.is_error, Some(true));
            let call = f.mock.last_call().unwrap();
            let expected = count.to_string();
            assert_eq!(
                call.args,
                vec!["commit", "--quality", "--count", expected.as_str()]
            );
        }
        f.server
            .gitrama_commit_quality(Parameters(CommitQualityParams::default()))
            .await
            .unwrap();
        assert!(f.mock.last_call().unwrap().has_args(&["--count", "10"]));
    }

    /// Decode arguments the way the MCP layer does before a tool runs.
    fn wire<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Parameters<T> {
        Parameters(serde_json::from_value(args).unwrap())
    }

    #[tokio::test]
    async fn commit_quality_count_type_errors_are_structured() {
        let f = setup();
        for count in [serde_json::json!(5.5), serde_json::json!(1e20), serde_json::json!("many")] {
            let result = f
                .server
                .gitrama_commit_quality(wire(serde_json::json!({ "count": count })))
                .await
                .unwrap();
            assert_eq!(error_kind(&result), "validation_error");
        }
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn commit_quality_accepts_numeric_string() {
        let f = setup();
        let result = f
            .server
            .gitrama_commit_quality(wire(serde_json::json!({ "count": "10" })))
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        assert!(f.mock.last_call().unwrap().has_args(&["--count", "10"]));
    }

    // --- commit ---

    #[tokio::test]
    async fn commit_passes_type_tone_and_provider_env() {
        let f = setup();
        f.server
            .gitrama_commit(Parameters(CommitParams {
                message_type: Some("Detailed".into()),
                context: Some("fixing auth bug".into()),
                model: None,
            }))
            .await
            .unwrap();

        let call = f.mock.last_call().unwrap();
        assert_eq!(
            call.args,
            vec![
                "commit",
                "--type",
                "detailed",
                "--context",
                "fixing auth bug",
                "--tone",
                "concise",
                "--yes"
            ]
        );
        assert!(call
            .env
            .contains(&("GTR_PROVIDER".to_string(), "mistral".to_string())));
        assert!(call
            .env
            .contains(&("GTR_MODEL".to_string(), "mistral-large-latest".to_string())));
        assert_eq!(call.cwd, f.repo.path());
    }

    #[tokio::test]
    async fn commit_rejects_unknown_message_type() {
        let f = setup();
        let result = f
            .server
            .gitrama_commit(Parameters(CommitParams {
                message_type: Some("haiku".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn model_for_keyless_provider_is_configuration_error() {
        let f = setup();
        let result = f
            .server
            .gitrama_commit(Parameters(CommitParams {
                model: Some("gpt-4o".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "configuration_error");
        assert!(text(&result).contains("OPENAI_API_KEY"));
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn model_override_with_key_beats_env_provider() {
        let mut env = ProviderEnv {
            provider: Some("mistral".into()),
            ..Default::default()
        };
        env.vendor_keys
            .insert(ProviderName::OpenAi, "sk-test-key".into());
        let f = setup_with_env(env);
        f.server
            .gitrama_pr(Parameters(PrParams {
                base: None,
                model: Some("gpt-4o".into()),
            }))
            .await
            .unwrap();
        let call = f.mock.last_call().unwrap();
        assert!(call
            .env
            .contains(&("GTR_PROVIDER".to_string(), "openai".to_string())));
        assert!(call
            .env
            .contains(&("GTR_API_KEY".to_string(), "sk-test-key".to_string())));
    }

    #[tokio::test]
    async fn provider_defaults_come_from_config_file() {
        let f = setup();
        let config = ConfigStore::new(&Store::at(f._home.path()));
        config
            .update(|c| {
                c.set("provider", "claude")?;
                c.set("api_key.claude", "sk-ant-file")
            })
            .unwrap();
        f.server
            .gitrama_changelog(Parameters(ChangelogParams::default()))
            .await
            .unwrap();
        let call = f.mock.last_call().unwrap();
        assert!(call.env.contains(&(
            "GTR_MODEL".to_string(),
            "claude-sonnet-4-20250514".to_string()
        )));
    }

    #[tokio::test]
    async fn stage_and_commit_stages_then_commits() {
        let f = setup();
        f.server
            .gitrama_stage_and_commit(Parameters(StageAndCommitParams {
                files: Some("src/auth.rs  tests/auth.rs".into()),
                ..Default::default()
            }))
            .await
            .unwrap();

        let calls = f.mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, Program::Git);
        assert_eq!(calls[0].args, vec!["add", "src/auth.rs", "tests/auth.rs"]);
        assert_eq!(calls[1].program, Program::Gtr);
        assert_eq!(calls[1].args[0], "commit");
    }

    #[tokio::test]
    async fn stage_failure_stops_before_commit() {
        let f = setup();
        f.mock.set_results(
            "stage_and_commit",
            vec![Err(ToolError::external(
                "fatal: pathspec 'nope' did not match any files",
                Some(128),
            ))],
        );
        let result = f
            .server
            .gitrama_stage_and_commit(Parameters(StageAndCommitParams {
                files: Some("nope".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "external_tool_error");
        assert!(text(&result).contains("Failed to stage files"));
        assert_eq!(f.mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn stage_rejects_option_like_paths() {
        let f = setup();
        let result = f
            .server
            .gitrama_stage_and_commit(Parameters(StageAndCommitParams {
                files: Some("src --force".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");
        assert!(f.mock.calls().is_empty());
    }

    // --- ask / changelog ---

    #[tokio::test]
    async fn ask_requires_question_and_uses_long_timeout() {
        let f = setup();
        let result = f
            .server
            .gitrama_ask(Parameters(AskParams {
                question: Some("   ".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");

        f.server
            .gitrama_ask(Parameters(AskParams {
                question: Some("Who owns the auth module?".into()),
                scope: Some("auto".into()),
                model: None,
            }))
            .await
            .unwrap();
        let call = f.mock.last_call().unwrap();
        assert_eq!(call.args, vec!["ask", "Who owns the auth module?"]);
        assert_eq!(call.timeout, Duration::from_secs(180));

        f.server
            .gitrama_ask(Parameters(AskParams {
                question: Some("what changed?".into()),
                scope: Some("staged".into()),
                model: None,
            }))
            .await
            .unwrap();
        assert!(f.mock.last_call().unwrap().has_args(&["--scope", "staged"]));
    }

    #[tokio::test]
    async fn changelog_rejects_unknown_format() {
        let f = setup();
        let result = f
            .server
            .gitrama_changelog(Parameters(ChangelogParams {
                format: Some("xml".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn changelog_maps_range_and_format() {
        let f = setup();
        f.server
            .gitrama_changelog(Parameters(ChangelogParams {
                since: Some("v1.0.0".into()),
                until: None,
                format: Some("json".into()),
                model: None,
            }))
            .await
            .unwrap();
        assert_eq!(
            f.mock.last_call().unwrap().args,
            vec!["changelog", "--since", "v1.0.0", "--format", "json"]
        );
    }

    // --- stream-aware tools ---

    #[tokio::test]
    async fn branch_suggest_under_hotfix_requests_hotfix_prefix() {
        let f = setup();
        f.server
            .gitrama_stream_switch(Parameters(StreamSwitchParams {
                name: Some("hotfix".into()),
                description: None,
            }))
            .await
            .unwrap();
        f.server
            .gitrama_branch_suggest(Parameters(BranchSuggestParams {
                description: Some("payment timeout".into()),
                model: None,
            }))
            .await
            .unwrap();
        let call = f.mock.last_call().unwrap();
        assert!(call.has_args(&["--prefix", "hotfix/"]));
        assert!(call.has_args(&["branch", "--suggest", "payment timeout"]));
    }

    #[tokio::test]
    async fn branch_name_gets_stream_prefix_unless_qualified() {
        let f = setup();
        let result = f
            .server
            .gitrama_branch(Parameters(BranchParams {
                name: Some("login-form".into()),
                base: Some("main".into()),
            }))
            .await
            .unwrap();
        assert_eq!(text(&result), "(mock) branch ok");
        assert_eq!(
            f.mock.last_call().unwrap().args,
            vec!["branch", "wip/login-form", "--base", "main"]
        );

        f.server
            .gitrama_branch(Parameters(BranchParams {
                name: Some("feat/oauth".into()),
                base: None,
            }))
            .await
            .unwrap();
        assert_eq!(f.mock.last_call().unwrap().args, vec!["branch", "feat/oauth"]);
    }

    #[tokio::test]
    async fn branch_rejects_option_like_name() {
        let f = setup();
        let result = f
            .server
            .gitrama_branch(Parameters(BranchParams {
                name: Some("--delete".into()),
                base: None,
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");
    }

    #[tokio::test]
    async fn option_like_question_and_description_are_rejected() {
        let f = setup();
        let ask = f
            .server
            .gitrama_ask(Parameters(AskParams {
                question: Some("--scope full".into()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&ask), "validation_error");

        let suggest = f
            .server
            .gitrama_branch_suggest(Parameters(BranchSuggestParams {
                description: Some("-h".into()),
                model: None,
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&suggest), "validation_error");
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn stream_switch_waits_for_lock_without_stalling_runtime() {
        let f = setup();
        let state_path = StreamStore::new(Store::at(f._home.path())).state_path(f.repo.path());
        let guard = gitrama_store::lock_file(&state_path.with_extension("json.lock")).unwrap();

        let server = f.server.clone();
        let switch = tokio::spawn(async move {
            server
                .gitrama_stream_switch(Parameters(StreamSwitchParams {
                    name: Some("review".into()),
                    description: None,
                }))
                .await
        });
        // Single-threaded runtime: this sleep only finishes if the switch yields.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!switch.is_finished());

        drop(guard);
        let result = switch.await.unwrap().unwrap();
        assert!(text(&result).starts_with("Switched to stream 'review'"));
    }

    #[tokio::test]
    async fn custom_stream_has_no_prefix_or_tone() {
        let f = setup();
        f.server
            .gitrama_stream_switch(Parameters(StreamSwitchParams {
                name: Some("perf".into()),
                description: None,
            }))
            .await
            .unwrap();
        f.server
            .gitrama_pr(Parameters(PrParams::default()))
            .await
            .unwrap();
        assert_eq!(f.mock.last_call().unwrap().args, vec!["pr"]);
    }

    #[tokio::test]
    async fn stream_tools_round_trip_in_process() {
        let f = setup();
        let status = f.server.gitrama_stream_status().await.unwrap();
        assert!(text(&status).starts_with("Active stream: wip"));

        let switched = f
            .server
            .gitrama_stream_switch(Parameters(StreamSwitchParams {
                name: Some("payment-v2".into()),
                description: Some("Stripe migration".into()),
            }))
            .await
            .unwrap();
        assert!(text(&switched).contains("new stream registered"));
        assert!(text(&switched).contains("Description: Stripe migration"));

        let listing = f.server.gitrama_stream_list().await.unwrap();
        let lines: Vec<&str> = text(&listing).lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].trim_start().starts_with("wip"));
        assert!(lines[4].starts_with("* payment-v2"));
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn stream_switch_rejects_bad_name() {
        let f = setup();
        let result = f
            .server
            .gitrama_stream_switch(Parameters(StreamSwitchParams {
                name: Some("has space".into()),
                description: None,
            }))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");
    }

    // --- CI recovery ---

    #[tokio::test]
    async fn ci_tools_use_ci_invoker_with_stdin() {
        let f = setup();
        let ci = Arc::new(MockInvoker::new());
        let server = f.server.clone().with_ci(ci.clone());
        server
            .gitrama_diagnose(Parameters(DiagnoseParams {
                build_log: Some("error[E0308]: mismatched types".into()),
            }))
            .await
            .unwrap();

        let call = ci.last_call().unwrap();
        assert_eq!(call.args, vec!["ci", "diagnose"]);
        assert_eq!(call.stdin.as_deref(), Some("error[E0308]: mismatched types"));
        assert_eq!(call.params["build_log"], "error[E0308]: mismatched types");
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn deploy_fix_is_dry_run_unless_confirmed() {
        let f = setup();
        f.mock
            .set_results("deploy_fix", vec![Ok(ToolOutput::text("")), Ok(ToolOutput::text(""))]);

        let dry = f
            .server
            .gitrama_deploy_fix(Parameters(DeployFixParams {
                fix: Some("patch".into()),
                confirm: None,
            }))
            .await
            .unwrap();
        assert!(f.mock.last_call().unwrap().has_args(&["deploy-fix", "--dry-run"]));
        assert!(text(&dry).starts_with("Dry run complete"));

        let real = f
            .server
            .gitrama_deploy_fix(Parameters(DeployFixParams {
                fix: Some("patch".into()),
                confirm: Some(true.into()),
            }))
            .await
            .unwrap();
        let call = f.mock.last_call().unwrap();
        assert!(call.has_args(&["deploy-fix", "--yes"]));
        assert_eq!(call.params["confirm"], true);
        assert_eq!(text(&real), "Fix deployed");
    }

    #[tokio::test]
    async fn deploy_fix_confirm_is_type_checked() {
        let f = setup();
        f.server
            .gitrama_deploy_fix(wire(serde_json::json!({ "fix": "patch", "confirm": "yes" })))
            .await
            .unwrap();
        assert!(f.mock.last_call().unwrap().has_args(&["deploy-fix", "--yes"]));

        let result = f
            .server
            .gitrama_deploy_fix(wire(serde_json::json!({ "fix": "patch", "confirm": "perhaps" })))
            .await
            .unwrap();
        assert_eq!(error_kind(&result), "validation_error");
        assert_eq!(f.mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_ci_inputs_are_rejected() {
        let f = setup();
        let results = [
            f.server
                .gitrama_diagnose(Parameters(DiagnoseParams::default()))
                .await
                .unwrap(),
            f.server
                .gitrama_fix(Parameters(FixParams {
                    diagnosis: Some("".into()),
                }))
                .await
                .unwrap(),
            f.server
                .gitrama_report(Parameters(ReportParams::default()))
                .await
                .unwrap(),
        ];
        for r in &results {
            assert_eq!(error_kind(r), "validation_error");
        }
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn external_error_passes_through_verbatim() {
        let f = setup();
        f.mock.set_results(
            "pr",
            vec![Err(ToolError::external("no commits ahead of main", Some(1)))],
        );
        let result = f
            .server
            .gitrama_pr(Parameters(PrParams::default()))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let parsed: serde_json::Value = serde_json::from_str(text(&result)).unwrap();
        assert_eq!(parsed["kind"], "external_tool_error");
        assert_eq!(parsed["message"], "no commits ahead of main");
        assert_eq!(parsed["exit_code"], 1);
    }

    #[tokio::test]
    async fn successful_output_is_returned_unchanged() {
        let f = setup();
        f.mock.set_results(
            "report",
            vec![Ok(ToolOutput::text("## Incident\n\nroot cause: flaky test"))],
        );
        let result = f
            .server
            .gitrama_report(Parameters(ReportParams {
                incident_data: Some("{}".into()),
            }))
            .await
            .unwrap();
        assert_eq!(text(&result), "## Incident\n\nroot cause: flaky test");
    }
}
