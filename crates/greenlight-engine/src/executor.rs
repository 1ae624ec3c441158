//! Executor trait and registry.
//!
//! Executors are the opaque collaborators that actually send, file, or
//! write. The engine invokes them at most once per successful claim and
//! only cares about the reported outcome; downstream idempotency is the
//! executor's own contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use greenlight_core::types::ExecOutcome;

/// Errors from executor invocation.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Executor failed: {0}")]
    Failed(String),
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

/// A side-effecting action implementation, keyed by action name.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The opaque identifier the planner uses for this action.
    fn action_name(&self) -> &str;

    /// Coarse category, used for TTL policy selection and disambiguation
    /// grouping.
    fn category(&self) -> &str {
        "general"
    }

    /// Whether this action's payload is a revisable draft. Draft-backed
    /// actions are executed through the convergence point, which re-reads
    /// the draft at confirmation time.
    fn draft_backed(&self) -> bool {
        false
    }

    /// One human-readable line for the confirmation preview.
    fn describe(&self, args: &serde_json::Value) -> String;

    /// Perform the side effect. Called exactly once per successful claim.
    async fn execute(&self, args: &serde_json::Value) -> Result<ExecOutcome, ExecutorError>;
}

/// Registry mapping action names to executor implementations.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor under its own action name.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors
            .insert(executor.action_name().to_string(), executor);
    }

    /// Look up an executor by action name.
    pub fn get(&self, action_name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(action_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        fn action_name(&self) -> &str {
            "echo"
        }

        fn describe(&self, args: &serde_json::Value) -> String {
            format!("Echo {}", args)
        }

        async fn execute(&self, args: &serde_json::Value) -> Result<ExecOutcome, ExecutorError> {
            Ok(ExecOutcome {
                success: true,
                detail: args.to_string(),
            })
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ExecutorRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(EchoExecutor));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_defaults() {
        let executor = EchoExecutor;
        assert_eq!(executor.category(), "general");
        assert!(!executor.draft_backed());
    }

    #[tokio::test]
    async fn test_execute_through_registry() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(EchoExecutor));

        let executor = registry.get("echo").unwrap();
        let outcome = executor
            .execute(&serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.detail, r#"{"x":1}"#);
    }
}
