//! `bash` - run a shell command
//!
//! A non-zero exit status is reported in the output, not as an error.
//! The child process is killed when the attempt is cancelled or times out.

use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{opt_str, str_arg};
use crate::capability::{FnCapability, Input};
use crate::error::CapabilityError;

pub const NAME: &str = "bash";

const BASH_TIMEOUT: Duration = Duration::from_secs(120);

pub fn bash() -> FnCapability {
    FnCapability::new(
        NAME,
        "Execute a bash command on the system. Use with caution.",
        |cancel, input, _ctx| Box::pin(async move { run(cancel, input).await }),
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "description": "The bash command to execute."
            },
            "work_dir": {
                "type": "string",
                "description": "The working directory for the command (optional)."
            }
        },
        "required": ["command"]
    }))
    .with_timeout(BASH_TIMEOUT)
    .without_retry()
}

async fn run(cancel: CancellationToken, input: Input) -> Result<Value, CapabilityError> {
    let command = str_arg(&input, "command")?;

    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = opt_str(&input, "work_dir") {
        cmd.current_dir(dir);
    }

    debug!("[bash] {}", command);
    let output = tokio::select! {
        output = cmd.output() => output,
        _ = cancel.cancelled() => {
            return Err(CapabilityError::new("command cancelled"));
        }
    };

    match output {
        Ok(output) => Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            // None when killed by a signal
            "code": output.status.code().unwrap_or(-1),
        })),
        Err(e) => Ok(json!({
            "stdout": "",
            "stderr": "",
            "code": -1,
            "error": e.to_string(),
        })),
    }
}
