//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(60));
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Utilization fraction as a percentage, `-` when unknown
pub fn format_utilization(utilization: Option<f64>) -> String {
    match utilization {
        Some(u) => format!("{:.1}%", u * 100.0),
        None => "-".to_string(),
    }
}

/// Utilization colored against `limit`
pub fn color_utilization(utilization: Option<f64>, limit: f64) -> String {
    let formatted = format_utilization(utilization);
    match utilization {
        Some(u) if u > limit => formatted.red().to_string(),
        Some(u) if u > limit * 0.8 => formatted.yellow().to_string(),
        Some(_) => formatted.green().to_string(),
        None => formatted,
    }
}

/// Color an evaluation status
pub fn color_status(status: &str) -> String {
    match status {
        "scored" | "admitted" => status.green().to_string(),
        "rejected" => status.yellow().to_string(),
        "error" => status.red().to_string(),
        _ => status.to_string(),
    }
}
