//! `read_file` - read a file by absolute path

use serde_json::{json, Value};
use std::path::Path;
use tokio::fs;

use super::{str_arg, transient_retry, truncate, FS_TIMEOUT, MAX_OUTPUT_CHARS};
use crate::capability::{FnCapability, Input};
use crate::error::CapabilityError;

pub const NAME: &str = "read_file";

pub fn read_file() -> FnCapability {
    FnCapability::new(
        NAME,
        "Read the contents of a file from the file system.",
        |_cancel, input, _ctx| Box::pin(async move { run(input).await }),
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": "The absolute path to the file to read."
            }
        },
        "required": ["path"]
    }))
    .with_prompt("Pass an absolute path. Large files are truncated.")
    .with_timeout(FS_TIMEOUT)
    .with_retry(transient_retry())
}

async fn run(input: Input) -> Result<Value, CapabilityError> {
    let path = str_arg(&input, "path")?;
    if !Path::new(path).is_absolute() {
        return Err(CapabilityError::new(format!("path must be absolute: {}", path)));
    }

    let data = fs::read(path)
        .await
        .map_err(|e| CapabilityError::new(format!("failed to read file: {}", e)))?;
    let content = String::from_utf8_lossy(&data).into_owned();

    Ok(Value::String(truncate(content, MAX_OUTPUT_CHARS)))
}
