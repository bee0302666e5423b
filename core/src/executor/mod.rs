//! Capability executor
//!
//! Runs capabilities under a shared admission pool with per-attempt
//! timeouts, retry/backoff, an approval gate and priority-ordered batches.
//!
//! Per call the stages are: wait for a slot, validate required input,
//! resolve policy, check approval, then run one or more attempts. The slot
//! is held until the call returns. Every outcome, including caller
//! cancellation, comes back as an `ExecutionResult`.

mod policy;
mod types;

pub use policy::ExecutionPolicy;
pub use types::{ExecutionRequest, ExecutionResult};

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::{validate_input, Capability, Input};
use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::error::ExecError;

/// Capability executor. Clones share one admission pool.
#[derive(Clone)]
pub struct Executor {
    config: ExecutorConfig,
    slots: Arc<Semaphore>,
}

impl Executor {
    /// Build an executor; zero config values fall back to the defaults
    pub fn new(config: ExecutorConfig) -> Self {
        let config = config.normalized();
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    /// Executor with a custom pool size and default timeout
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self::new(ExecutorConfig::default().with_max_concurrency(max_concurrency))
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Slots currently free in the admission pool
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run one request to completion
    pub async fn execute(&self, cancel: &CancellationToken, request: ExecutionRequest) -> ExecutionResult {
        let started_at = Utc::now();
        let capability = request.capability.as_ref();
        let name = capability.name();

        // Queued -> SlotAcquired
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("[Executor] {} cancelled while waiting for a slot", name);
                return ExecutionResult::rejected(started_at, ExecError::SlotAcquisitionCancelled);
            }
            permit = self.slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return ExecutionResult::rejected(started_at, ExecError::SlotAcquisitionCancelled),
            },
        };
        debug!(
            "[Executor] {} admitted (execution {})",
            name, request.context.execution_id
        );

        // Validated
        if let Err(e) = validate_input(capability, &request.input) {
            warn!("[Executor] {} rejected: {}", name, e);
            return ExecutionResult::rejected(started_at, e);
        }

        let policy = ExecutionPolicy::resolve(
            capability,
            request.timeout_override,
            self.config.default_timeout(),
        );

        // ApprovalChecked
        if policy.requires_approval && !request.context.is_approved() {
            warn!("[Executor] {} requires approval, rejecting", name);
            return ExecutionResult::rejected(
                started_at,
                ExecError::ApprovalRequired {
                    name: name.to_string(),
                },
            );
        }

        // Executing
        let max_attempts = policy.max_attempts();
        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;
            debug!("[Executor] {} attempt {}/{}", name, attempts, max_attempts);

            let err = match run_attempt(
                capability,
                cancel,
                &request.input,
                &request.context,
                policy.timeout,
            )
            .await
            {
                Ok(output) => break Ok(output),
                Err(e) => e,
            };

            if attempts >= max_attempts || err.is_cancellation() {
                break Err(err);
            }
            let Some(retry) = policy.retry.as_ref() else {
                break Err(err);
            };
            if !retry.is_retryable(&err.to_string()) {
                debug!("[Executor] {} error is not retryable: {}", name, err);
                break Err(err);
            }

            let delay = retry.delay_for_attempt(attempts - 1);
            warn!(
                "[Executor] {} attempt {} failed: {}. Retrying in {:?}",
                name, attempts, err, delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(ExecError::CancelledDuringBackoff),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        let result = ExecutionResult::finish(started_at, outcome, attempts, policy.long_running);
        match &result.error {
            None => info!(
                "[Executor] {} succeeded after {} attempt(s) in {:?}",
                name, result.attempts, result.duration
            ),
            Some(e) => info!(
                "[Executor] {} failed after {} attempt(s): {}",
                name, result.attempts, e
            ),
        }
        result
    }

    /// Run a batch concurrently. Higher-priority requests are dispatched
    /// first; results line up with the input order regardless.
    pub async fn execute_batch(
        &self,
        cancel: &CancellationToken,
        requests: Vec<ExecutionRequest>,
    ) -> Vec<ExecutionResult> {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }

        let mut ordered: Vec<(usize, i32, ExecutionRequest)> = requests
            .into_iter()
            .enumerate()
            .map(|(idx, req)| {
                let priority = req.priority();
                (idx, priority, req)
            })
            .collect();
        // Stable: equal priorities keep their relative order
        ordered.sort_by(|a, b| b.1.cmp(&a.1));

        // Dropping the set aborts whatever is still in flight
        let mut tasks = JoinSet::new();
        for (idx, _, request) in ordered {
            let executor = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { (idx, executor.execute(&cancel, request).await) });
        }

        // Join barrier
        let mut results: Vec<Option<ExecutionResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!("[Executor] batch task failed: {:?}", e),
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ExecutionResult::rejected(
                        Utc::now(),
                        ExecError::Panicked {
                            message: "batch task did not complete".to_string(),
                        },
                    )
                })
            })
            .collect()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

/// One attempt: the capability races its deadline and the caller's
/// cancellation. The token handed to the capability is cancelled as soon as
/// the attempt ends, whichever way.
async fn run_attempt(
    capability: &dyn Capability,
    cancel: &CancellationToken,
    input: &Input,
    ctx: &ExecutionContext,
    timeout: Option<Duration>,
) -> Result<Value, ExecError> {
    let attempt_token = cancel.child_token();
    let _guard = attempt_token.clone().drop_guard();

    let call = AssertUnwindSafe(capability.execute(&attempt_token, input, ctx)).catch_unwind();
    let deadline = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = call => match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecError::Execution(e)),
            Err(panic) => Err(ExecError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
        },
        _ = deadline => Err(ExecError::Timeout {
            name: capability.name().to_string(),
            duration: timeout.unwrap_or_default(),
        }),
        _ = cancel.cancelled() => Err(ExecError::Cancelled),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
