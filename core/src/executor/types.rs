//! Request and result types

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::capability::{Capability, Input};
use crate::context::ExecutionContext;
use crate::error::ExecError;

/// A single capability invocation
#[derive(Clone)]
pub struct ExecutionRequest {
    pub capability: Arc<dyn Capability>,
    pub input: Input,
    pub context: Arc<ExecutionContext>,
    /// Overrides the capability's own timeout when set to a non-zero value
    pub timeout_override: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(capability: Arc<dyn Capability>, input: Input) -> Self {
        Self {
            capability,
            input,
            context: Arc::new(ExecutionContext::new()),
            timeout_override: None,
        }
    }

    pub fn with_context(mut self, context: Arc<ExecutionContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Batch scheduling priority, 0 unless the capability declares one
    pub fn priority(&self) -> i32 {
        self.capability
            .as_extended()
            .map(|ext| ext.priority())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("capability", &self.capability.name())
            .field("input", &self.input)
            .field("context", &self.context)
            .field("timeout_override", &self.timeout_override)
            .finish()
    }
}

/// Outcome of one invocation
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<ExecError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `finished_at - started_at`
    pub duration: Duration,
    /// 0 when the call was rejected before any attempt
    pub attempts: u32,
    pub long_running: bool,
}

impl ExecutionResult {
    /// Result for a call that never reached the capability
    pub(crate) fn rejected(started_at: DateTime<Utc>, error: ExecError) -> Self {
        Self::finish(started_at, Err(error), 0, false)
    }

    pub(crate) fn finish(
        started_at: DateTime<Utc>,
        outcome: Result<Value, ExecError>,
        attempts: u32,
        long_running: bool,
    ) -> Self {
        let finished_at = Utc::now();
        let duration = (finished_at - started_at).to_std().unwrap_or_default();
        let (output, error) = match outcome {
            Ok(output) => (output, None),
            Err(e) => (Value::Null, Some(e)),
        };
        Self {
            success: error.is_none(),
            output,
            error,
            started_at,
            finished_at,
            duration,
            attempts,
            long_running,
        }
    }

    /// True when the capability was never invoked
    pub fn never_ran(&self) -> bool {
        self.attempts == 0
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}
