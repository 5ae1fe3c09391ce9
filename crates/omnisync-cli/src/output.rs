//! CLI output formatting
//!
//! Commands render through an [`OutputFormatter`] so human and `--json`
//! output stay in one place. JSON output goes to stdout as single
//! pretty-printed documents; status lines in JSON mode are suppressed so
//! the stream stays machine-parseable.

use omnisync_core::domain::{KeyOutcome, SyncReport};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Message and document sink for command output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);

    /// Renders a completed pass report.
    fn report(&self, task_id: &str, report: &SyncReport) {
        self.success(&format!(
            "{}: {} copied, {} deleted, {} skipped, {} conflicts, {} failed ({} ms)",
            task_id,
            report.copied,
            report.deleted,
            report.skipped,
            report.conflicts,
            report.failed,
            report.duration_ms
        ));
        for (key, outcome) in &report.outcomes {
            match outcome {
                KeyOutcome::Failed { reason } => self.warn(&format!("{key}: {reason}")),
                KeyOutcome::Conflicted => self.info(&format!("{key}: conflict recorded")),
                _ => {}
            }
        }
    }
}

/// Plain-text formatter with checkmark prefixes
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON-lines formatter for scripting
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }

    fn report(&self, task_id: &str, report: &SyncReport) {
        let value = serde_json::to_value(report).unwrap_or_default();
        self.print_json(&serde_json::json!({"task": task_id, "report": value}));
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}
