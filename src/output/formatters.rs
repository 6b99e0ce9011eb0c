use serde_json::Value;

use crate::services::aggregator::{Snapshot, StatusView};

pub trait SnapshotFormatter: Send + Sync {
    fn format_snapshot(&self, snapshot: &Snapshot) -> String;
    fn format_status(&self, status: &StatusView) -> String;
    fn format_header(&self) -> String;

    fn format(&self, snapshot: &Snapshot) -> String {
        let mut output = self.format_header();
        output.push_str(&self.format_snapshot(snapshot));
        output
    }
}

/// Picks a formatter by its command-line name; anything unknown prints to the console.
pub fn formatter_for(name: &str) -> Box<dyn SnapshotFormatter> {
    match name.to_ascii_lowercase().as_str() {
        "json" => Box::new(JsonFormatter),
        "csv" => Box::new(CsvFormatter),
        _ => Box::new(ConsoleFormatter),
    }
}

pub struct ConsoleFormatter;

impl SnapshotFormatter for ConsoleFormatter {
    fn format_snapshot(&self, snapshot: &Snapshot) -> String {
        let mut output = format!("📊 Readings at {}\n", snapshot.taken_at.format("%Y-%m-%d %H:%M:%S"));
        output.push_str(&"═".repeat(60));
        output.push('\n');

        for reading in &snapshot.readings {
            output.push_str(&format!(
                "{:<24} {:>14} {}\n",
                reading.name, reading.value, reading.unit
            ));
        }
        output
    }

    fn format_status(&self, status: &StatusView) -> String {
        let mut output = format!("🔹 Status at {}\n", status.taken_at.format("%Y-%m-%d %H:%M:%S"));
        output.push_str(&"─".repeat(60));
        output.push('\n');

        for entry in &status.entries {
            // Units only make sense next to a number.
            if entry.label.parse::<f64>().is_ok() {
                output.push_str(&format!("{:<24} {} {}\n", entry.name, entry.label, entry.unit));
            } else {
                output.push_str(&format!("{:<24} {}\n", entry.name, entry.label));
            }
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🚀 Pump Reader v{}\n", crate::VERSION)
    }
}

pub struct JsonFormatter;

impl SnapshotFormatter for JsonFormatter {
    fn format_snapshot(&self, snapshot: &Snapshot) -> String {
        let readings: Vec<Value> = snapshot
            .readings
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "name": r.name,
                    "type": r.kind,
                    "value": r.value,
                    "unit": r.unit,
                    "state": r.reading,
                })
            })
            .collect();

        let result = serde_json::json!({
            "timestamp": snapshot.taken_at.to_rfc3339(),
            "readings": readings,
        });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    fn format_status(&self, status: &StatusView) -> String {
        serde_json::to_string_pretty(status).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new()
    }
}

pub struct CsvFormatter;

impl SnapshotFormatter for CsvFormatter {
    fn format_snapshot(&self, snapshot: &Snapshot) -> String {
        let timestamp = snapshot.taken_at.to_rfc3339();
        snapshot
            .readings
            .iter()
            .map(|r| format!("{},{},{},{}\n", r.id, r.value, r.unit, timestamp))
            .collect()
    }

    fn format_status(&self, status: &StatusView) -> String {
        let timestamp = status.taken_at.to_rfc3339();
        let mut csv = "Sensor,Status,Timestamp\n".to_string();
        for entry in &status.entries {
            csv.push_str(&format!("{},{},{}\n", entry.id, entry.label, timestamp));
        }
        csv
    }

    fn format_header(&self) -> String {
        "Sensor,Value,Unit,Timestamp\n".to_string()
    }
}
