//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Print a list of items. `rows` is only built for table output.
pub fn print_list<T, R>(items: &[T], format: OutputFormat, rows: impl Fn(&T) -> R)
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                let table = Table::new(items.iter().map(rows)).to_string();
                println!("{table}");
            }
        }
        OutputFormat::Json => print_json(items),
    }
}

/// Print a single item as a one-row table or as JSON.
pub fn print_item<T, R>(item: &T, format: OutputFormat, row: impl Fn(&T) -> R)
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let table = Table::new([row(item)]).to_string();
            println!("{table}");
        }
        OutputFormat::Json => print_json(item),
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => print_error(&format!("Failed to serialize output: {e}")),
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {msg}");
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {msg}");
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{key}:"), value);
}
