//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::emit::{PullReport, UpSummary};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Node pull row for table display.
#[derive(Tabled)]
struct NodePullRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of `up`.
    #[must_use]
    pub fn format_up(&self, summary: &UpSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => {
                if summary.created.is_empty() && summary.scaled.is_empty() {
                    return format!("{} Nothing to do.\n", "✓".green());
                }

                let mut output = String::new();
                for name in &summary.created {
                    let _ = writeln!(output, "   {} {name}", "+created".green());
                }
                for name in &summary.scaled {
                    let _ = writeln!(output, "   {} {name}", "~scaled".yellow());
                }
                let _ = write!(
                    output,
                    "\n{} {} created, {} scaled\n",
                    "✓".green(),
                    summary.created.len(),
                    summary.scaled.len()
                );
                output
            }
        }
    }

    /// Formats a per-node pull report.
    #[must_use]
    pub fn format_pull(&self, report: &PullReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.nodes.is_empty() {
                    return String::from("   No ready nodes.\n");
                }

                let rows: Vec<NodePullRow> = report
                    .nodes
                    .iter()
                    .map(|n| NodePullRow {
                        node: n.node.clone(),
                        result: if n.success {
                            "done".green().to_string()
                        } else {
                            "failed".red().to_string()
                        },
                        error: n
                            .error
                            .as_deref()
                            .map(|e| Self::truncate(e, 60))
                            .unwrap_or_default(),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');

                let failed = report.failed();
                let status = if failed == 0 {
                    format!("{} Pulled on {} node(s)", "✓".green(), report.nodes.len())
                } else {
                    format!(
                        "{} Pull failed on {failed} of {} node(s)",
                        "✗".red(),
                        report.nodes.len()
                    )
                };
                let _ = writeln!(output, "\n{status}");
                output
            }
        }
    }

    /// Formats a completion message for a command.
    #[must_use]
    pub fn format_done(&self, command: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "success", "command": command });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {command} complete\n", "✓".green()),
        }
    }

    /// Truncates a string to at most `max_len` characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::NodePullResult;

    fn report() -> PullReport {
        PullReport {
            nodes: vec![
                NodePullResult {
                    node: String::from("n1"),
                    success: true,
                    error: None,
                },
                NodePullResult {
                    node: String::from("n2"),
                    success: false,
                    error: Some(String::from("pull access denied")),
                },
            ],
        }
    }

    #[test]
    fn test_format_pull_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_pull(&report())).expect("invalid json");
        assert_eq!(json["nodes"][1]["node"], "n2");
        assert_eq!(json["nodes"][1]["success"], false);
    }

    #[test]
    fn test_format_pull_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_pull(&report());
        assert!(text.contains("n1"));
        assert!(text.contains("pull access denied"));
        assert!(text.contains("1 of 2"));
    }

    #[test]
    fn test_format_up_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let summary = UpSummary {
            created: vec![String::from("web")],
            scaled: vec![String::from("db")],
        };
        let text = formatter.format_up(&summary);
        assert!(text.contains("web"));
        assert!(text.contains("1 created, 1 scaled"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("abcdefghijkl", 8), "abcde...");
    }
}
