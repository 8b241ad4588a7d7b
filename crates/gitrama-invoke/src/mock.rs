use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use gitrama_core::ToolError;

use crate::{Invocation, Invoker, ToolOutput};

type Scripted = Result<ToolOutput, ToolError>;

/// Mock invoker for testing. Records every invocation and pops scripted
/// results per tool name. With nothing scripted (or exhausted) it answers
/// `(mock) <tool> ok`.
#[derive(Default)]
pub struct MockInvoker {
    results: Mutex<HashMap<String, Vec<Scripted>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_results(&self, tool: &str, results: Vec<Scripted>) {
        relock(&self.results).insert(tool.to_string(), results);
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        relock(&self.calls).clone()
    }

    pub fn last_call(&self) -> Option<Invocation> {
        relock(&self.calls).last().cloned()
    }
}

// A panicking test thread must not hide the recorded calls from the others.
fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl Invoker for MockInvoker {
    async fn invoke(&self, inv: &Invocation) -> Result<ToolOutput, ToolError> {
        relock(&self.calls).push(inv.clone());

        let mut map = relock(&self.results);
        if let Some(queue) = map.get_mut(inv.tool) {
            if !queue.is_empty() {
                return queue.remove(0);
            }
        }
        Ok(ToolOutput::text(format!("(mock) {} ok", inv.tool)))
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_scripted_results_then_defaults() {
        let mock = MockInvoker::new();
        mock.set_results(
            "commit",
            vec![
                Ok(ToolOutput::text("feat: add login")),
                Err(ToolError::external("nothing staged", Some(1))),
            ],
        );
        let inv = Invocation::new("commit", ".").arg("commit");

        assert_eq!(mock.invoke(&inv).await.unwrap().stdout, "feat: add login");
        assert_eq!(
            mock.invoke(&inv).await.unwrap_err(),
            ToolError::external("nothing staged", Some(1))
        );
        assert_eq!(mock.invoke(&inv).await.unwrap().stdout, "(mock) commit ok");
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let mock = MockInvoker::new();
        assert!(mock.last_call().is_none());
        mock.invoke(&Invocation::new("commit", ".")).await.unwrap();
        mock.invoke(&Invocation::new("diagnose", ".")).await.unwrap();

        let tools: Vec<_> = mock.calls().iter().map(|c| c.tool).collect();
        assert_eq!(tools, vec!["commit", "diagnose"]);
        assert_eq!(mock.last_call().unwrap().tool, "diagnose");
        assert_eq!(mock.kind(), "mock");
    }
}
