//! Table formatting and output utilities
//!
//! This module provides functionality for formatting and displaying
//! tabular data as styled tables or JSON.

use crate::error::{BlobDiskError, Result};
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Color, Modify, Padding, Style},
    Table, Tabled,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Table formatter with optional color
pub struct TableFormatter {
    format: OutputFormat,
    no_color: bool,
}

impl TableFormatter {
    pub fn new(format: OutputFormat, no_color: bool) -> Self {
        Self { format, no_color }
    }

    /// Render rows in the configured format
    pub fn format_table<T: Tabled + Serialize>(&self, data: &[T]) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_as_table(data)),
            OutputFormat::Json => serde_json::to_string_pretty(data)
                .map_err(|e| BlobDiskError::serialization(e.to_string())),
        }
    }

    fn format_as_table<T: Tabled>(&self, data: &[T]) -> String {
        if data.is_empty() {
            return "No data to display".to_string();
        }

        let mut table = Table::new(data);
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .with(Padding::new(1, 1, 0, 0));

        if !self.no_color {
            table.with(Modify::new(Rows::first()).with(Color::FG_BLUE));
        }

        table.to_string()
    }
}
