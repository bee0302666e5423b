//! Output formatting
//!
//! Colored terminal rendering of capability listings and execution results.

use capexec_core::capability::{to_definitions, Capability};
use capexec_core::{Config, ExecutionResult};
use console::Style;
use serde_json::Value;
use std::sync::Arc;

/// Output formatter for CLI results
pub struct OutputFormatter {
    blue: Style,
    green: Style,
    red: Style,
    yellow: Style,
    bold: Style,
    dim: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            red: Style::new().red(),
            yellow: Style::new().yellow(),
            bold: Style::new().bold(),
            dim: Style::new().dim(),
        }
    }
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print the capability listing
    pub fn print_capabilities(&self, capabilities: &[Arc<dyn Capability>]) {
        if capabilities.is_empty() {
            println!("{}", self.yellow.apply_to("No capabilities registered"));
            return;
        }

        println!("{}", self.bold.apply_to("Capabilities:"));
        for capability in capabilities {
            let mut tags = Vec::new();
            if let Some(ext) = capability.as_extended() {
                if ext.requires_approval() {
                    tags.push("approval".to_string());
                }
                if ext.is_long_running() {
                    tags.push("long-running".to_string());
                }
                if ext.priority() != 0 {
                    tags.push(format!("priority {}", ext.priority()));
                }
            }
            let tags = if tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", tags.join(", "))
            };

            println!(
                "  {}{} - {}",
                self.green.apply_to(capability.name()),
                self.yellow.apply_to(tags),
                capability.description()
            );
        }
    }

    /// Print capability definitions as pretty JSON
    pub fn print_definitions(&self, capabilities: &[Arc<dyn Capability>]) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(&to_definitions(capabilities))?);
        Ok(())
    }

    /// Print one execution result
    pub fn print_result(&self, name: &str, result: &ExecutionResult) {
        let status = if result.success {
            self.green.apply_to("ok")
        } else {
            self.red.apply_to("failed")
        };
        println!(
            "{} {} {}",
            self.bold.apply_to(name),
            status,
            self.dim.apply_to(format!(
                "({} attempt(s), {:?})",
                result.attempts, result.duration
            ))
        );

        if let Some(message) = result.error_message() {
            println!("  {}", self.red.apply_to(message));
        } else {
            println!("{}", render(&result.output));
        }
    }

    /// Print the effective configuration
    pub fn print_config(&self, path: &std::path::Path, config: &Config) -> Result<(), toml::ser::Error> {
        println!("{}", self.blue.apply_to(format!("# {}", path.display())));
        println!("{}", toml::to_string_pretty(config)?);
        Ok(())
    }
}

/// Strings print raw; everything else as pretty JSON
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("plain text")), "plain text");
        assert_eq!(render(&json!({"code": 0})), "{\n  \"code\": 0\n}");
        assert_eq!(render(&Value::Null), "null");
    }
}
