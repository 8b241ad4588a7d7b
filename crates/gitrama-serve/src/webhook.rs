//! Build-log extraction from CI notification payloads.
//!
//! Nothing here diagnoses anything. Each function turns a platform payload
//! into the text handed to `diagnose`, or says why the event is ignored.

use serde_json::Value;

/// Outcome of reading a webhook payload.
#[derive(Debug, PartialEq)]
pub enum Intake {
    /// Text to diagnose. May be empty, which the diagnose tool rejects.
    Log(String),
    /// Event carries no failure (ping, success, still running).
    Skip(String),
}

const FAILED: &[&str] = &["failure", "timed_out", "startup_failure", "cancelled"];

/// `POST /webhook/failure`: `{"build_log": "..."}`, `log` accepted too.
pub fn generic(payload: &Value) -> Intake {
    let log = str_at(payload, &["build_log"])
        .or_else(|| str_at(payload, &["log"]))
        .unwrap_or_default();
    Intake::Log(log.to_string())
}

/// `POST /webhook/github`: `workflow_run` or `check_run` events.
pub fn github(event: Option<&str>, payload: &Value) -> Intake {
    if event == Some("ping") {
        return Intake::Skip("ping".into());
    }
    if let Some(log) = str_at(payload, &["build_log"]) {
        return Intake::Log(log.to_string());
    }

    let (kind, run) = if let Some(run) = payload.get("workflow_run") {
        ("workflow_run", run)
    } else if let Some(run) = payload.get("check_run") {
        ("check_run", run)
    } else {
        return Intake::Skip(format!(
            "unsupported event {}",
            event.unwrap_or("(unknown)")
        ));
    };

    let conclusion = str_at(run, &["conclusion"]).unwrap_or("");
    if !FAILED.contains(&conclusion) {
        let state = if conclusion.is_empty() {
            str_at(run, &["status"]).unwrap_or("in_progress")
        } else {
            conclusion
        };
        return Intake::Skip(format!("{kind} {state}"));
    }

    let mut lines = Vec::new();
    if let Some(repo) = str_at(payload, &["repository", "full_name"]) {
        lines.push(format!("Repository: {repo}"));
    }
    if let Some(name) = str_at(run, &["name"]) {
        lines.push(format!("{}: {name}", title(kind)));
    }
    lines.push(format!("Conclusion: {conclusion}"));
    let branch = str_at(run, &["head_branch"]).or_else(|| str_at(run, &["check_suite", "head_branch"]));
    if let Some(branch) = branch {
        lines.push(format!("Branch: {branch}"));
    }
    if let Some(sha) = str_at(run, &["head_sha"]) {
        lines.push(format!("Commit: {sha}"));
    }
    if let Some(url) = str_at(run, &["html_url"]) {
        lines.push(format!("URL: {url}"));
    }
    for field in ["title", "summary", "text"] {
        if let Some(v) = str_at(run, &["output", field]).filter(|v| !v.trim().is_empty()) {
            lines.push(String::new());
            lines.push(v.to_string());
        }
    }
    Intake::Log(lines.join("\n"))
}

/// `POST /webhook/jenkins`: Notification plugin payload
/// (`{"name", "build": {"phase", "status", "log", "full_url"}}`).
pub fn jenkins(payload: &Value) -> Intake {
    let Some(build) = payload.get("build") else {
        return generic(payload);
    };
    let phase = str_at(build, &["phase"]).unwrap_or("COMPLETED");
    let status = str_at(build, &["status"]).unwrap_or("");
    // The notification plugin reports COMPLETED and then FINALIZED for the
    // same build; only the first is acted on.
    if phase != "COMPLETED" || status.eq_ignore_ascii_case("success") {
        return Intake::Skip(format!("jenkins {phase} {status}").trim_end().to_string());
    }
    if let Some(log) = str_at(build, &["log"]).filter(|l| !l.trim().is_empty()) {
        return Intake::Log(log.to_string());
    }

    let mut lines = Vec::new();
    if let Some(name) = str_at(payload, &["name"]) {
        lines.push(format!("Job: {name}"));
    }
    if let Some(n) = build.get("number").and_then(Value::as_u64) {
        lines.push(format!("Build: #{n}"));
    }
    if !status.is_empty() {
        lines.push(format!("Status: {status}"));
    }
    if let Some(url) = str_at(build, &["full_url"]) {
        lines.push(format!("URL: {url}"));
    }
    Intake::Log(lines.join("\n"))
}

fn str_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(v, |cur, key| cur.get(*key))
        .and_then(Value::as_str)
}

fn title(kind: &str) -> &'static str {
    match kind {
        "workflow_run" => "Workflow",
        _ => "Check",
    }
}
