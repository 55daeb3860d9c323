use crate::schema::{ProviderKey, VatBand};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrdersToCashError {
    #[error("Invalid reporting period: end date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid SQL template: {0}")]
    InvalidTemplate(String),

    #[error("Warehouse query failed: {message}")]
    QueryExecution { query: String, message: String },

    #[error("Row {row} does not match the declared columns: {details}")]
    RowDecode { row: usize, details: String },

    #[error("Unknown VAT band label: '{0}'")]
    UnknownVatBand(String),

    #[error("Duplicate item aggregate for order {order_id} in VAT band {band}")]
    DuplicateBand { order_id: String, band: VatBand },

    #[error("Pivoted item table contains order {0} more than once")]
    MergeKeyCollision(String),

    #[error("No provider mapped for {}", format_unmapped(.0))]
    UnmappedProvider(Vec<ProviderKey>),

    #[error("Failed to write {provider} export to {}: {message}", .path.display())]
    ExportWrite {
        provider: String,
        path: PathBuf,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_unmapped(keys: &[ProviderKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, OrdersToCashError>;
