//! Closure-backed capabilities
//!
//! `FnCapability` adapts an async closure over the raw input mapping;
//! `TypedCapability` decodes the mapping into a serde type first.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Capability, CapabilityBase, ExtendedCapability, Input, RetryPolicy};
use crate::context::ExecutionContext;
use crate::error::CapabilityError;

/// Capability function type
type CapabilityFn = Arc<
    dyn Fn(CancellationToken, Input, ExecutionContext) -> BoxFuture<'static, Result<Value, CapabilityError>>
        + Send
        + Sync,
>;

/// Typed capability function type
type TypedFn<T> = Arc<
    dyn Fn(CancellationToken, T, ExecutionContext) -> BoxFuture<'static, Result<Value, CapabilityError>>
        + Send
        + Sync,
>;

/// Capability wrapping an async closure
pub struct FnCapability {
    base: CapabilityBase,
    func: CapabilityFn,
}

impl FnCapability {
    /// Build a capability taking a single freeform `input` string
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(CancellationToken, Input, ExecutionContext) -> BoxFuture<'static, Result<Value, CapabilityError>>
            + Send
            + Sync
            + 'static,
    {
        let mut base = CapabilityBase::new(name, description);
        base.schema = json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "freeform input"
                }
            },
            "required": ["input"]
        });
        Self {
            base,
            func: Arc::new(func),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.base.schema = schema;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base.prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.base.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.base.priority = priority;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.base.retry_policy = Some(policy);
        self
    }

    /// Single attempt only
    pub fn without_retry(mut self) -> Self {
        self.base.retry_policy = None;
        self
    }

    pub fn with_approval(mut self, required: bool) -> Self {
        self.base.requires_approval = required;
        self
    }

    pub fn with_long_running(mut self, long_running: bool) -> Self {
        self.base.long_running = long_running;
        self
    }
}

impl std::fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn description(&self) -> &str {
        &self.base.description
    }

    fn input_schema(&self) -> Value {
        self.base.schema.clone()
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        input: &Input,
        ctx: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        (self.func)(cancel.clone(), input.clone(), ctx.clone()).await
    }

    fn prompt_hint(&self) -> &str {
        &self.base.prompt
    }

    fn as_extended(&self) -> Option<&dyn ExtendedCapability> {
        Some(self)
    }
}

impl ExtendedCapability for FnCapability {
    fn is_long_running(&self) -> bool {
        self.base.long_running
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn requires_approval(&self) -> bool {
        self.base.requires_approval
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.base.retry_policy.clone()
    }
}

/// Capability whose input is decoded into `T` before the closure runs.
///
/// The schema is supplied by the caller and should describe `T`.
pub struct TypedCapability<T> {
    base: CapabilityBase,
    func: TypedFn<T>,
}

impl<T> TypedCapability<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        func: F,
    ) -> Self
    where
        F: Fn(CancellationToken, T, ExecutionContext) -> BoxFuture<'static, Result<Value, CapabilityError>>
            + Send
            + Sync
            + 'static,
    {
        let mut base = CapabilityBase::new(name, description);
        base.schema = schema;
        Self {
            base,
            func: Arc::new(func),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base.prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.base.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.base.priority = priority;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.base.retry_policy = None;
        self
    }
}

#[async_trait::async_trait]
impl<T> Capability for TypedCapability<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &str {
        &self.base.name
    }

    fn description(&self) -> &str {
        &self.base.description
    }

    fn input_schema(&self) -> Value {
        self.base.schema.clone()
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        input: &Input,
        ctx: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        let raw = Value::Object(input.clone().into_iter().collect());
        let args: T = serde_json::from_value(raw).map_err(|e| {
            CapabilityError::new(format!(
                "failed to parse arguments for capability {}: {}",
                self.base.name, e
            ))
        })?;
        (self.func)(cancel.clone(), args, ctx.clone()).await
    }

    fn prompt_hint(&self) -> &str {
        &self.base.prompt
    }

    fn as_extended(&self) -> Option<&dyn ExtendedCapability> {
        Some(self)
    }
}

impl<T> ExtendedCapability for TypedCapability<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn is_long_running(&self) -> bool {
        self.base.long_running
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    fn priority(&self) -> i32 {
        self.base.priority
    }

    fn requires_approval(&self) -> bool {
        self.base.requires_approval
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.base.retry_policy.clone()
    }
}
