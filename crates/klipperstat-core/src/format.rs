//! Output formatting for printer status.
//!
//! - **TTY**: one human-readable line per snapshot
//! - **JSON**: one JSON document per snapshot, for piping into other tools

use serde::{Deserialize, Serialize};

use crate::status::StatusSnapshot;

/// The output format for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable terminal output.
    #[default]
    Tty,
    /// Machine-readable JSON output.
    Json,
}

/// Renders status snapshots and object listings.
#[derive(Debug, Clone)]
pub struct StatusFormatter {
    format: OutputFormat,
    precision: usize,
}

impl Default for StatusFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Tty)
    }
}

impl StatusFormatter {
    /// Creates a formatter for the given output format.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            precision: 2,
        }
    }

    /// Builder: number of decimals for coordinates.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Returns the configured output format.
    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Renders a snapshot in the configured format.
    pub fn format(&self, snapshot: &StatusSnapshot) -> String {
        match self.format {
            OutputFormat::Tty => self.format_tty(snapshot),
            OutputFormat::Json => self.format_json(snapshot),
        }
    }

    /// Renders a snapshot as a single terminal line.
    pub fn format_tty(&self, snapshot: &StatusSnapshot) -> String {
        let mut parts = Vec::new();

        if let Some(position) = snapshot.position {
            let p = self.precision;
            parts.push(format!(
                "Toolhead Position: X={:.p$}, Y={:.p$}, Z={:.p$}",
                position.x, position.y, position.z
            ));
        }
        if let Some(ref state) = snapshot.print_state {
            parts.push(format!("State: {}", state));
        }
        if let Some(ref filename) = snapshot.filename {
            parts.push(format!("File: {}", filename));
        }

        if parts.is_empty() {
            "No status fields reported".to_string()
        } else {
            parts.join(" | ")
        }
    }

    /// Renders a snapshot as compact JSON.
    pub fn format_json(&self, snapshot: &StatusSnapshot) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string(snapshot).unwrap_or_default()
    }

    /// Renders the `objects/list` result.
    pub fn format_objects(&self, objects: &[String]) -> String {
        match self.format {
            OutputFormat::Tty => {
                let mut out = String::from("Available objects:");
                for object in objects {
                    out.push_str("\n  - ");
                    out.push_str(object);
                }
                out
            }
            OutputFormat::Json => serde_json::json!({ "objects": objects }).to_string(),
        }
    }
}
