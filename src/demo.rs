//! Demo capabilities registered next to the built-ins

use capexec_core::{CapabilityError, FnCapability, Registry};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn clock() -> FnCapability {
    FnCapability::new("clock", "Returns the current UTC time", |_, _, _| {
        Box::pin(async { Ok(json!(chrono::Utc::now().to_rfc3339())) })
    })
    .with_schema(json!({
        "type": "object",
        "properties": {}
    }))
}

pub fn echo() -> FnCapability {
    FnCapability::new("echo", "Echo back the provided input", |_, input, _| {
        Box::pin(async move {
            match input.get("input") {
                Some(Value::String(s)) => Ok(json!(s)),
                _ => Err(CapabilityError::new("input must be a string")),
            }
        })
    })
}

pub fn register(registry: &Registry) {
    registry.register_instance(Arc::new(clock()));
    registry.register_instance(Arc::new(echo()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use capexec_core::{Capability, CancellationToken, ExecutionContext, Input};

    #[tokio::test]
    async fn test_echo() {
        let mut input = Input::new();
        input.insert("input".to_string(), json!("hello"));
        let out = echo()
            .execute(&CancellationToken::new(), &input, &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(out, json!("hello"));

        input.insert("input".to_string(), json!(42));
        let err = echo()
            .execute(&CancellationToken::new(), &input, &ExecutionContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "input must be a string");
    }

    #[tokio::test]
    async fn test_clock_is_rfc3339() {
        let out = clock()
            .execute(&CancellationToken::new(), &Input::new(), &ExecutionContext::new())
            .await
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(out.as_str().unwrap()).is_ok());
    }
}
