//! Capability traits
//!
//! Base trait + optional extended trait. A capability is a named,
//! schema-described unit of work; the extended trait adds the scheduling
//! metadata (timeout, priority, approval, retries) that most simple
//! capabilities never need to declare.

pub mod func;
pub mod retry;
pub mod schema;

pub use func::{FnCapability, TypedCapability};
pub use retry::RetryPolicy;
pub use schema::{
    find_in, format_capabilities, required_fields, to_definition, to_definitions,
    validate_input, CapabilityDefinition, FunctionDefinition,
};

use crate::context::ExecutionContext;
use crate::error::CapabilityError;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Input mapping handed to `execute`
pub type Input = HashMap<String, Value>;

/// Base capability trait
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    /// Unique name of the capability
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Schema of the expected input (`type`, `properties`, `required`)
    fn input_schema(&self) -> Value;

    /// Run the capability. `cancel` fires when the attempt deadline passes or
    /// the caller gives up.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        input: &Input,
        ctx: &ExecutionContext,
    ) -> Result<Value, CapabilityError>;

    /// Usage text shown to a model
    fn prompt_hint(&self) -> &str {
        ""
    }

    /// Returns the extended view when the capability declares one.
    ///
    /// Implementors of [`ExtendedCapability`] override this:
    ///
    /// ```ignore
    /// fn as_extended(&self) -> Option<&dyn ExtendedCapability> {
    ///     Some(self)
    /// }
    /// ```
    fn as_extended(&self) -> Option<&dyn ExtendedCapability> {
        None
    }
}

/// Scheduling metadata for capabilities that need more than the defaults
pub trait ExtendedCapability: Capability {
    /// True when the capability manages its own lifecycle (e.g. returns a
    /// continuation token instead of a final result)
    fn is_long_running(&self) -> bool;

    /// Per-attempt timeout. `Duration::ZERO` means "use the engine default".
    fn timeout(&self) -> Duration;

    /// Batch scheduling priority, higher runs first
    fn priority(&self) -> i32;

    /// Whether the context must carry an approval before execution
    fn requires_approval(&self) -> bool;

    /// `None` means a single attempt
    fn retry_policy(&self) -> Option<RetryPolicy>;
}

/// Metadata shared by the built-in capability wrappers.
///
/// The defaults mirror what a freshly declared capability gets: a 30s
/// timeout and the default retry policy.
#[derive(Debug, Clone)]
pub struct CapabilityBase {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub prompt: String,
    pub long_running: bool,
    pub timeout: Duration,
    pub priority: i32,
    pub requires_approval: bool,
    pub retry_policy: Option<RetryPolicy>,
}

impl CapabilityBase {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: Value::Null,
            prompt: String::new(),
            long_running: false,
            timeout: Duration::from_secs(30),
            priority: 0,
            requires_approval: false,
            retry_policy: Some(RetryPolicy::default()),
        }
    }
}
