//! Built-in capabilities
//!
//! File reading, shell commands, glob and grep. All are plain
//! [`FnCapability`] instances registered as singletons.

pub mod bash;
pub mod glob;
pub mod grep;
pub mod read_file;

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::capability::{FnCapability, Input, RetryPolicy};
use crate::config::BuiltinConfig;
use crate::error::CapabilityError;
use crate::registry::Registry;

/// Output larger than this is cut with a trailer
pub const MAX_OUTPUT_CHARS: usize = 50_000;

/// Register the built-ins enabled by `config`
pub fn register_all(registry: &Registry, config: &BuiltinConfig) {
    if !config.enabled {
        info!("Built-in capabilities disabled");
        return;
    }

    let mut capabilities: Vec<FnCapability> = vec![read_file::read_file(), glob::glob(), grep::grep()];
    if config.bash {
        capabilities.push(bash::bash());
    }

    let count = capabilities.len();
    for capability in capabilities {
        registry.register_instance(Arc::new(capability));
    }
    info!("Registered {} built-in capabilities", count);
}

/// Required string argument
pub(crate) fn str_arg<'a>(input: &'a Input, key: &str) -> Result<&'a str, CapabilityError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::new(format!("{} must be a string", key)))
}

/// Optional non-empty string argument
pub(crate) fn opt_str<'a>(input: &'a Input, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Cut `content` to `max_chars` characters
pub(crate) fn truncate(content: String, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content;
    }
    let cut = content
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    format!(
        "{}\n... (truncated, {} chars omitted)",
        &content[..cut],
        total - max_chars
    )
}

/// Retry only failures that look transient; bad arguments fail fast
pub(crate) fn transient_retry() -> RetryPolicy {
    RetryPolicy::default().with_patterns(["timed out", "temporarily unavailable", "interrupted"])
}

pub(crate) fn join_error(what: &str, e: tokio::task::JoinError) -> CapabilityError {
    CapabilityError::new(format!("{} task failed: {}", what, e))
}

pub(crate) const FS_TIMEOUT: Duration = Duration::from_secs(30);
