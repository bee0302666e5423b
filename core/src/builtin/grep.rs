//! `grep` - regex search over a directory tree
//!
//! Walks with `ignore`, so `.gitignore` rules and hidden files are skipped
//! the way ripgrep skips them. Output lines are `path:line:text`; context
//! lines use `path-line-text` and non-adjacent groups are split by `--`.

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{join_error, opt_str, str_arg, transient_retry, truncate, MAX_OUTPUT_CHARS};
use crate::capability::{FnCapability, Input};
use crate::error::CapabilityError;

pub const NAME: &str = "grep";

pub const NO_MATCHES: &str = "No matches found";

const GREP_TIMEOUT: Duration = Duration::from_secs(60);

/// Bytes sniffed for a NUL to detect binary files
const BINARY_SNIFF_LEN: usize = 8 * 1024;

struct Search {
    regex: Regex,
    path: String,
    glob: Option<String>,
    context: usize,
}

pub fn grep() -> FnCapability {
    FnCapability::new(
        NAME,
        "Search for regex patterns in files, respecting .gitignore.",
        |cancel, input, _ctx| Box::pin(async move { run(cancel, input).await }),
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "pattern": {
                "type": "string",
                "description": "The regex pattern to search for."
            },
            "path": {
                "type": "string",
                "description": "Directory or file to search in (defaults to current dir)."
            },
            "glob": {
                "type": "string",
                "description": "Glob pattern to filter files (e.g., '*.rs')."
            },
            "case_insensitive": {
                "type": "boolean",
                "description": "Perform case-insensitive search."
            },
            "context_lines": {
                "type": "integer",
                "description": "Number of context lines to show (default 0)."
            }
        },
        "required": ["pattern"]
    }))
    .with_timeout(GREP_TIMEOUT)
    .with_retry(transient_retry())
}

async fn run(cancel: CancellationToken, input: Input) -> Result<Value, CapabilityError> {
    let pattern = str_arg(&input, "pattern")?;
    let case_insensitive = input
        .get("case_insensitive")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| CapabilityError::new(format!("invalid pattern: {}", e)))?;

    let context = input
        .get("context_lines")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0) as usize;

    let search = Search {
        regex,
        path: opt_str(&input, "path").unwrap_or(".").to_string(),
        glob: opt_str(&input, "glob").map(str::to_string),
        context,
    };

    let output = tokio::task::spawn_blocking(move || search.run(&cancel))
        .await
        .map_err(|e| join_error("grep", e))??;

    if output.is_empty() {
        return Ok(Value::String(NO_MATCHES.to_string()));
    }
    Ok(Value::String(truncate(output, MAX_OUTPUT_CHARS)))
}

impl Search {
    fn run(&self, cancel: &CancellationToken) -> Result<String, CapabilityError> {
        let root = Path::new(&self.path);
        if !root.exists() {
            return Err(CapabilityError::new(format!(
                "grep failed: {}: no such file or directory",
                self.path
            )));
        }

        let mut builder = WalkBuilder::new(root);
        if let Some(glob) = &self.glob {
            let overrides = OverrideBuilder::new(root)
                .add(glob)
                .and_then(|b| b.build())
                .map_err(|e| CapabilityError::new(format!("invalid glob: {}", e)))?;
            builder.overrides(overrides);
        }

        let mut files: Vec<_> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        let mut output = String::new();
        for file in files {
            if cancel.is_cancelled() {
                return Err(CapabilityError::new("grep cancelled"));
            }
            let Ok(data) = std::fs::read(&file) else {
                continue;
            };
            if data[..data.len().min(BINARY_SNIFF_LEN)].contains(&0) {
                continue;
            }
            let text = String::from_utf8_lossy(&data);
            self.search_file(&file.to_string_lossy(), &text, &mut output);
        }
        Ok(output)
    }

    fn search_file(&self, path: &str, text: &str, output: &mut String) {
        let lines: Vec<&str> = text.lines().collect();
        let hits: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| self.regex.is_match(line))
            .map(|(i, _)| i)
            .collect();
        if hits.is_empty() {
            return;
        }

        if self.context == 0 {
            for i in hits {
                let _ = writeln!(output, "{}:{}:{}", path, i + 1, lines[i]);
            }
            return;
        }

        // Merge overlapping context windows into groups
        let mut groups: Vec<(usize, usize)> = Vec::new();
        for &i in &hits {
            let start = i.saturating_sub(self.context);
            let end = i.saturating_add(self.context).min(lines.len() - 1);
            match groups.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => groups.push((start, end)),
            }
        }

        for (g, (start, end)) in groups.into_iter().enumerate() {
            if g > 0 || !output.is_empty() {
                output.push_str("--\n");
            }
            for i in start..=end {
                let sep = if hits.binary_search(&i).is_ok() { ':' } else { '-' };
                let _ = writeln!(output, "{}{}{}{}{}", path, sep, i + 1, sep, lines[i]);
            }
        }
    }
}
