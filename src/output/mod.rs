pub mod formatters;

pub use formatters::{formatter_for, ConsoleFormatter, CsvFormatter, JsonFormatter, SnapshotFormatter};
