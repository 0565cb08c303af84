// SPDX-License-Identifier: MIT

//! Export of approved drafts
//!
//! The drafter is asked for a bare JSON array of work items but models often
//! wrap it in a Markdown fence or drift from the schema. `FileExporter` writes
//! the parsed items as JSON and as an Azure DevOps import CSV; anything it
//! cannot parse is written untouched to a raw text file instead, so an
//! approved draft always ends up on disk.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use crate::adk::error::ReqflowError;
use crate::reqflow::config::ExportConfig;

/// CSV column order understood by the Azure DevOps importer
pub const CSV_HEADERS: [&str; 5] = [
    "Work Item Type",
    "Title",
    "Description",
    "Acceptance Criteria",
    "Priority",
];

/// One Azure DevOps work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(
        rename = "Work Item Type",
        default = "default_item_type",
        deserialize_with = "lenient_text"
    )]
    pub item_type: String,
    #[serde(rename = "Title", default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(rename = "Description", default, deserialize_with = "lenient_text")]
    pub description: String,
    /// Bullet list, one criterion per line
    #[serde(
        rename = "Acceptance Criteria",
        default,
        deserialize_with = "text_or_lines"
    )]
    pub acceptance_criteria: String,
    /// "1" (highest) to "4"
    #[serde(
        rename = "Priority",
        default = "default_priority",
        deserialize_with = "lenient_text"
    )]
    pub priority: String,
}

impl WorkItem {
    fn csv_row(&self) -> [&str; 5] {
        [
            self.item_type.as_str(),
            self.title.as_str(),
            self.description.as_str(),
            self.acceptance_criteria.as_str(),
            self.priority.as_str(),
        ]
    }
}

fn default_item_type() -> String {
    "User Story".to_string()
}

fn default_priority() -> String {
    "2".to_string()
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Accept strings, numbers and null for a text field
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let kind = value.to_string();
    scalar_text(value).ok_or_else(|| de::Error::custom(format!("expected text, got {}", kind)))
}

/// Accept a single string or a list of strings joined by newlines
fn text_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => {
            let mut lines = Vec::with_capacity(items.len());
            for item in items {
                let kind = item.to_string();
                let line = scalar_text(item).ok_or_else(|| {
                    de::Error::custom(format!("expected text list entry, got {}", kind))
                })?;
                lines.push(line);
            }
            Ok(lines.join("\n"))
        }
        other => {
            let kind = other.to_string();
            scalar_text(other)
                .ok_or_else(|| de::Error::custom(format!("expected text or list, got {}", kind)))
        }
    }
}

/// What an export produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// The draft parsed; both files were written
    Exported {
        records: usize,
        json_path: PathBuf,
        csv_path: PathBuf,
    },
    /// The draft did not parse; its raw text was written instead
    ParseFailure { raw_path: PathBuf, reason: String },
}

impl ExportOutcome {
    pub fn is_exported(&self) -> bool {
        matches!(self, ExportOutcome::Exported { .. })
    }
}

/// Writes an approved draft to a durable sink
pub trait TicketExporter: Send + Sync {
    /// Export `draft` once; a draft that does not parse is not an error
    fn export(&self, draft: &str) -> Result<ExportOutcome, ReqflowError>;
}

/// Remove a surrounding Markdown code fence and whitespace
pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse a drafted JSON array of work items
pub fn parse_work_items(text: &str) -> Result<Vec<WorkItem>, ReqflowError> {
    let items: Vec<WorkItem> = serde_json::from_str(strip_code_fence(text))?;
    Ok(items)
}

/// Exporter writing JSON, CSV or raw text files
pub struct FileExporter {
    config: ExportConfig,
}

impl FileExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    fn write_json(&self, items: &[WorkItem]) -> Result<PathBuf, ReqflowError> {
        let path = self.config.json_path();
        fs::write(&path, serde_json::to_string_pretty(items)?)?;
        Ok(path)
    }

    fn write_csv(&self, items: &[WorkItem]) -> Result<PathBuf, ReqflowError> {
        let path = self.config.csv_path();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(CSV_HEADERS)?;
        for item in items {
            writer.write_record(item.csv_row())?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn write_raw(&self, draft: &str) -> Result<PathBuf, ReqflowError> {
        let path = self.config.raw_path();
        fs::write(&path, draft)?;
        Ok(path)
    }
}

impl TicketExporter for FileExporter {
    fn export(&self, draft: &str) -> Result<ExportOutcome, ReqflowError> {
        fs::create_dir_all(&self.config.output_dir)?;

        match parse_work_items(draft) {
            Ok(items) => {
                let json_path = self.write_json(&items)?;
                let csv_path = self.write_csv(&items)?;
                log::info!(
                    "Exported {} work items to {}",
                    items.len(),
                    csv_path.display()
                );
                Ok(ExportOutcome::Exported {
                    records: items.len(),
                    json_path,
                    csv_path,
                })
            }
            Err(err) => {
                let raw_path = self.write_raw(draft)?;
                log::warn!(
                    "Draft is not a work item array ({}); raw text saved to {}",
                    err,
                    raw_path.display()
                );
                Ok(ExportOutcome::ParseFailure {
                    raw_path,
                    reason: err.to_string(),
                })
            }
        }
    }
}
