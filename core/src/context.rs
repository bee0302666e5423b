//! Execution context
//!
//! Built once per call chain and handed to every capability call. Carries
//! caller identity, a cancellation handle, free-form metadata and the
//! services a capability may need (logging, persistence).

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CapabilityError;

/// Metadata key checked by the approval gate
pub const APPROVED_KEY: &str = "approved";

/// Logging sink injected into capabilities
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str);
    fn error(&self, msg: &str);
    fn debug(&self, msg: &str);
}

/// Key/value persistence port (e.g. continuation tokens of long-running work)
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CapabilityError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), CapabilityError>;
}

/// Logger that forwards to `tracing`, tagged with the call identity
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    agent_id: String,
    session_id: String,
}

impl TracingLogger {
    pub fn new(agent_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!("[{}/{}] {}", self.agent_id, self.session_id, msg);
    }

    fn error(&self, msg: &str) {
        tracing::error!("[{}/{}] {}", self.agent_id, self.session_id, msg);
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("[{}/{}] {}", self.agent_id, self.session_id, msg);
    }
}

/// Process-local storage backed by a map
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, CapabilityError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CapabilityError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Per-call-chain context for capability calls
#[derive(Clone)]
pub struct ExecutionContext {
    /// Calling agent identity
    pub agent_id: String,

    /// Conversation/session identity
    pub session_id: String,

    /// Unique ID for this execution chain
    pub execution_id: String,

    /// Cancellation handle of the call chain
    pub cancellation: CancellationToken,

    /// Arbitrary values, read during a single execution
    pub metadata: HashMap<String, Value>,

    logger: Option<Arc<dyn Logger>>,
    storage: Option<Arc<dyn Storage>>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("agent_id", &self.agent_id)
            .field("session_id", &self.session_id)
            .field("execution_id", &self.execution_id)
            .field("metadata", &self.metadata)
            .field("has_logger", &self.logger.is_some())
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            agent_id: String::new(),
            session_id: String::new(),
            execution_id: Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
            metadata: HashMap::new(),
            logger: None,
            storage: None,
        }
    }

    /// Set the caller identity
    pub fn with_agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = id.into();
        self
    }

    /// Set the session identity
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    /// Inject a logging sink
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Inject a persistence port
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Inherit the caller's cancellation handle
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Mark the chain as approved for gated capabilities
    pub fn approved(self) -> Self {
        self.with_metadata(APPROVED_KEY, Value::Bool(true))
    }

    /// True only when `metadata["approved"]` is the boolean `true`
    pub fn is_approved(&self) -> bool {
        self.metadata.get(APPROVED_KEY).and_then(Value::as_bool) == Some(true)
    }

    pub fn logger(&self) -> Option<&dyn Logger> {
        self.logger.as_deref()
    }

    pub fn storage(&self) -> Option<&dyn Storage> {
        self.storage.as_deref()
    }

    /// Create a context for a nested call: same identity and services, fresh
    /// execution ID, child cancellation.
    pub fn child(&self) -> Self {
        Self {
            agent_id: self.agent_id.clone(),
            session_id: self.session_id.clone(),
            execution_id: Uuid::new_v4().to_string(),
            cancellation: self.cancellation.child_token(),
            metadata: self.metadata.clone(),
            logger: self.logger.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
