//! Class label table shared by the detector and the HTTP surface

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label reported for class ids outside the table
pub const UNKNOWN_CLASS: &str = "unknown";

/// Model class id to label mapping. Index 0 is the background class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Label for a class id, or `"unknown"` when out of range
    pub fn label(&self, class_id: i64) -> &str {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLASS)
    }

    /// Labels excluding the background class
    pub fn foreground(&self) -> &[String] {
        self.names.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Foreground class id to human-readable description
    pub fn class_mapping(&self) -> BTreeMap<usize, String> {
        self.foreground()
            .iter()
            .enumerate()
            .map(|(i, name)| (i + 1, describe(name)))
            .collect()
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new(
            ["bg", "Platelets", "RBC", "WBC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

fn describe(name: &str) -> String {
    match name {
        "Platelets" => "Platelets (thrombocytes)".to_string(),
        "RBC" => "RBC (red blood cells)".to_string(),
        "WBC" => "WBC (white blood cells)".to_string(),
        other => other.to_string(),
    }
}
