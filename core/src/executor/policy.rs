//! Effective per-request policy

use std::time::Duration;

use crate::capability::{Capability, RetryPolicy};

/// Timeout/retry/approval settings resolved for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPolicy {
    /// `None` means the attempt runs without a deadline
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub long_running: bool,
    pub requires_approval: bool,
}

impl ExecutionPolicy {
    /// Resolve the policy. Timeout precedence: non-zero override, then the
    /// capability's non-zero timeout, then `default_timeout`. A long-running
    /// capability with neither gets no deadline at all.
    pub fn resolve(
        capability: &dyn Capability,
        timeout_override: Option<Duration>,
        default_timeout: Duration,
    ) -> Self {
        let timeout_override = timeout_override.filter(|d| !d.is_zero());

        let Some(ext) = capability.as_extended() else {
            return Self {
                timeout: Some(timeout_override.unwrap_or(default_timeout)),
                retry: None,
                long_running: false,
                requires_approval: false,
            };
        };

        let declared = Some(ext.timeout()).filter(|d| !d.is_zero());
        let long_running = ext.is_long_running();
        let timeout = match (timeout_override, declared) {
            (Some(d), _) => Some(d),
            (None, Some(d)) => Some(d),
            (None, None) if long_running => None,
            (None, None) => Some(default_timeout),
        };

        Self {
            timeout,
            retry: ext.retry_policy(),
            long_running,
            requires_approval: ext.requires_approval(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.as_ref().map_or(1, RetryPolicy::max_attempts)
    }
}
