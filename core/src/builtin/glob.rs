//! `glob` - find files by pattern

use ::glob::{MatchOptions, Pattern};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::{join_error, opt_str, str_arg, transient_retry, FS_TIMEOUT};
use crate::capability::{FnCapability, Input};
use crate::error::CapabilityError;

pub const NAME: &str = "glob";

/// Most matches returned in one call
pub const MAX_MATCHES: usize = 1000;

/// Output shape stays the same when truncated
#[derive(Debug, Serialize)]
struct GlobResult {
    matches: Vec<String>,
    total_matches: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

pub fn glob() -> FnCapability {
    FnCapability::new(
        NAME,
        "Find files matching glob patterns. Supports wildcards like **/*.rs.",
        |cancel, input, _ctx| Box::pin(async move { run(cancel, input).await }),
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "pattern": {
                "type": "string",
                "description": "The glob pattern to match (e.g., 'src/**/*.ts')."
            },
            "root_dir": {
                "type": "string",
                "description": "The root directory to start searching from (defaults to current dir)."
            },
            "exclude": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of patterns to exclude."
            }
        },
        "required": ["pattern"]
    }))
    .with_timeout(FS_TIMEOUT)
    .with_retry(transient_retry())
}

async fn run(cancel: CancellationToken, input: Input) -> Result<Value, CapabilityError> {
    let pattern = str_arg(&input, "pattern")?.to_string();
    let root_dir = opt_str(&input, "root_dir").unwrap_or(".").to_string();
    let excludes: Vec<Pattern> = input
        .get("exclude")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| Pattern::new(s).ok())
                .collect()
        })
        .unwrap_or_default();

    let result = tokio::task::spawn_blocking(move || find(&cancel, &root_dir, &pattern, &excludes))
        .await
        .map_err(|e| join_error("glob", e))??;

    Ok(serde_json::to_value(result)?)
}

fn find(
    cancel: &CancellationToken,
    root_dir: &str,
    pattern: &str,
    excludes: &[Pattern],
) -> Result<GlobResult, CapabilityError> {
    let root = std::fs::canonicalize(root_dir)
        .map_err(|e| CapabilityError::new(format!("glob failed: {}: {}", root_dir, e)))?;
    let full = format!(
        "{}/{}",
        Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let paths = ::glob::glob_with(&full, options)
        .map_err(|e| CapabilityError::new(format!("glob failed: {}", e)))?;

    let mut matches = Vec::new();
    for path in paths.filter_map(Result::ok) {
        if cancel.is_cancelled() {
            return Err(CapabilityError::new("glob cancelled"));
        }
        if is_excluded(&root, &path, excludes) {
            continue;
        }
        matches.push(path.to_string_lossy().into_owned());
    }

    let total_matches = matches.len();
    let truncated = total_matches > MAX_MATCHES;
    if truncated {
        matches.truncate(MAX_MATCHES);
    }

    Ok(GlobResult {
        matches,
        total_matches,
        truncated,
        warning: truncated.then(|| format!("Too many matches, truncated to {}", MAX_MATCHES)),
    })
}

/// Excludes match against the path relative to the root
fn is_excluded(root: &Path, path: &Path, excludes: &[Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    excludes.iter().any(|p| p.matches_path(relative))
}
