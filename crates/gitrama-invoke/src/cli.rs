use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use gitrama_core::ToolError;

use crate::{Invocation, Invoker, Program, ToolOutput};

/// Runs invocations as subprocesses of the `gtr` CLI (or git for staging).
#[derive(Debug, Clone)]
pub struct CliInvoker {
    pub gtr_bin: PathBuf,
    pub git_bin: PathBuf,
}

impl Default for CliInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl CliInvoker {
    pub fn new() -> Self {
        Self {
            gtr_bin: PathBuf::from("gtr"),
            git_bin: PathBuf::from("git"),
        }
    }

    pub fn with_bin(gtr_bin: impl Into<PathBuf>) -> Self {
        Self {
            gtr_bin: gtr_bin.into(),
            git_bin: PathBuf::from("git"),
        }
    }

    /// Check that the `gtr` binary is reachable.
    pub fn verify_available(&self) -> Result<(), ToolError> {
        let status = std::process::Command::new(&self.gtr_bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => Err(not_found(&self.gtr_bin)),
        }
    }

    fn bin(&self, program: Program) -> &PathBuf {
        match program {
            Program::Gtr => &self.gtr_bin,
            Program::Git => &self.git_bin,
        }
    }
}

fn not_found(bin: &std::path::Path) -> ToolError {
    ToolError::external(
        format!(
            "gitrama CLI not found (looked for {}). Install with: pip install gitrama\nDocs: https://gitrama.ai",
            bin.display()
        ),
        None,
    )
}

#[async_trait::async_trait]
impl Invoker for CliInvoker {
    async fn invoke(&self, inv: &Invocation) -> Result<ToolOutput, ToolError> {
        let bin = self.bin(inv.program);
        let shown = inv.display(&bin.to_string_lossy());
        let start = Instant::now();
        tracing::debug!(id = %inv.id, tool = inv.tool, cmd = %shown, "spawning");

        let mut cmd = Command::new(bin);
        cmd.args(&inv.args)
            .current_dir(&inv.cwd)
            .envs(inv.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if inv.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound if inv.program == Program::Gtr => not_found(bin),
            _ => ToolError::external(format!("failed to run {shown}: {e}"), None),
        })?;

        if let (Some(input), Some(mut pipe)) = (inv.stdin.clone(), child.stdin.take()) {
            // Fed from a task so a child that writes before reading cannot
            // deadlock against us.
            tokio::spawn(async move {
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            });
        }

        let output = match tokio::time::timeout(inv.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::external(
                    format!("failed to run {shown}: {e}"),
                    None,
                ))
            }
            Err(_) => {
                tracing::warn!(id = %inv.id, tool = inv.tool, secs = inv.timeout.as_secs(), "timed out");
                return Err(ToolError::external(
                    format!(
                        "Command timed out after {}s: {shown}",
                        inv.timeout.as_secs()
                    ),
                    None,
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code();
        tracing::info!(
            id = %inv.id,
            tool = inv.tool,
            exit_code = exit_code.unwrap_or(-1),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "external command finished"
        );

        if output.status.success() {
            Ok(ToolOutput {
                stdout,
                stderr,
                exit_code,
            })
        } else {
            let msg = [stderr.as_str(), stdout.as_str()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("Unknown error")
                .to_string();
            Err(ToolError::external(msg, exit_code))
        }
    }

    fn kind(&self) -> &'static str {
        "cli"
    }
}
