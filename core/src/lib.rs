pub mod builtin;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use capability::{Capability, ExtendedCapability, FnCapability, Input, RetryPolicy, TypedCapability};
pub use config::{BuiltinConfig, Config, ExecutorConfig};
pub use context::{ExecutionContext, Logger, MemoryStorage, Storage, TracingLogger};
pub use error::{CapabilityError, ConfigError, ExecError};
pub use executor::{ExecutionPolicy, ExecutionRequest, ExecutionResult, Executor};
pub use registry::{FactoryConfig, Registry};

/// Re-exported so callers can build tokens without depending on tokio-util
pub use tokio_util::sync::CancellationToken;
