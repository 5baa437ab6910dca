//! Printer status snapshots extracted from `status` mappings.
//!
//! Klipper reports status as `{object_name: {field: value}}`. Subscription
//! notifications only carry the fields that changed since the previous
//! update, so a snapshot may be partial; [`StatusSnapshot::merge`] folds
//! such deltas into an accumulated view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Toolhead position in printer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Extruder position, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<f64>,
}

impl Position {
    /// Parses a `[x, y, z]` or `[x, y, z, e]` array.
    ///
    /// Integers are accepted as well as floats.
    pub fn from_value(value: &Value) -> Option<Self> {
        let coords = value.as_array()?;
        let axis = |i: usize| coords.get(i).and_then(Value::as_f64);
        Some(Self {
            x: axis(0)?,
            y: axis(1)?,
            z: axis(2)?,
            e: axis(3),
        })
    }
}

/// One observation of printer status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// When the client decoded the update.
    pub received_at: DateTime<Utc>,
    /// `toolhead.position`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// `print_stats.state` (e.g. "standby", "printing").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_state: Option<String>,
    /// `print_stats.filename`, when a file is loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// The raw status mapping as received.
    pub objects: Map<String, Value>,
}

impl StatusSnapshot {
    /// Builds a snapshot stamped with the current time.
    pub fn from_status(status: &Map<String, Value>) -> Self {
        Self::at(status, Utc::now())
    }

    /// Builds a snapshot with an explicit timestamp.
    pub fn at(status: &Map<String, Value>, received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            position: field(status, "toolhead", "position").and_then(Position::from_value),
            print_state: text_field(status, "print_stats", "state"),
            filename: text_field(status, "print_stats", "filename"),
            objects: status.clone(),
        }
    }

    /// Returns true if the snapshot carries no status objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Folds a newer, possibly partial, snapshot into this one.
    ///
    /// Fields present in `newer` replace the ones held here; fields it does
    /// not mention are kept.
    pub fn merge(&mut self, newer: &StatusSnapshot) {
        let mut merged = std::mem::take(&mut self.objects);
        for (name, value) in &newer.objects {
            match (merged.get_mut(name), value) {
                (Some(Value::Object(existing)), Value::Object(delta)) => {
                    for (field, v) in delta {
                        existing.insert(field.clone(), v.clone());
                    }
                }
                _ => {
                    merged.insert(name.clone(), value.clone());
                }
            }
        }
        *self = Self::at(&merged, newer.received_at);
    }
}

fn field<'a>(status: &'a Map<String, Value>, object: &str, name: &str) -> Option<&'a Value> {
    status.get(object).and_then(|o| o.get(name))
}

fn text_field(status: &Map<String, Value>, object: &str, name: &str) -> Option<String> {
    field(status, object, name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
