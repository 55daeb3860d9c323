use crate::error::{OrdersToCashError, Result};
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub const START_DATE_PLACEHOLDER: &str = "{{start_date}}";
pub const END_DATE_PLACEHOLDER: &str = "{{end_date}}";
pub const ORDER_ID_LIST_PLACEHOLDER: &str = "{{order_id_list}}";

/// Inclusive calendar-day reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl ReportingPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(OrdersToCashError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Label used in export file names, e.g. `25.10` for `%y.%m`.
    pub fn label(&self, format: &str) -> String {
        self.start.format(format).to_string()
    }
}

/// A SQL script with `{{placeholder}}` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    name: String,
    text: String,
}

impl SqlTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrdersToCashError::InvalidTemplate(format!(
                "cannot read SQL template {}: {}",
                path.display(),
                e
            ))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, text })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn require(&self, placeholder: &str) -> Result<()> {
        if self.text.contains(placeholder) {
            Ok(())
        } else {
            Err(OrdersToCashError::InvalidTemplate(format!(
                "template '{}' has no {} placeholder",
                self.name, placeholder
            )))
        }
    }
}

/// How the order identifiers reach the item-level query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdHandOff {
    #[schemars(description = "Inline every identifier into the item-level query text.")]
    InlineList,

    #[schemars(
        description = "Stage identifiers into a session temporary table and select from it."
    )]
    TempTable {
        #[serde(default = "default_temp_table")]
        table: String,
    },
}

impl Default for IdHandOff {
    fn default() -> Self {
        IdHandOff::TempTable {
            table: default_temp_table(),
        }
    }
}

fn default_temp_table() -> String {
    "temp_order_ids".to_string()
}

/// The item-level query plus any statements that must run before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundItemQuery {
    pub staging: Vec<String>,
    pub query: String,
}

pub fn bind_order_query(template: &SqlTemplate, period: &ReportingPeriod) -> Result<String> {
    template.require(START_DATE_PLACEHOLDER)?;
    template.require(END_DATE_PLACEHOLDER)?;

    let query = template
        .text
        .replace(START_DATE_PLACEHOLDER, &period.start.format("%Y-%m-%d").to_string())
        .replace(END_DATE_PLACEHOLDER, &period.end.format("%Y-%m-%d").to_string());

    debug!(
        "Bound {} for {} to {}",
        template.name, period.start, period.end
    );
    Ok(query)
}

/// Substitutes a row source matching exactly `order_ids` into the item-level
/// template. The template is expected to use it as `IN ({{order_id_list}})`.
pub fn bind_item_query(
    template: &SqlTemplate,
    order_ids: &BTreeSet<String>,
    hand_off: &IdHandOff,
    chunk_size: usize,
) -> Result<BoundItemQuery> {
    template.require(ORDER_ID_LIST_PLACEHOLDER)?;

    let (staging, clause) = match hand_off {
        IdHandOff::InlineList => (Vec::new(), render_id_list_clause(order_ids)),
        IdHandOff::TempTable { table } => (
            staging_statements(table, order_ids, chunk_size)?,
            format!("SELECT order_id FROM {}", table),
        ),
    };

    debug!(
        "Bound {} for {} order ids ({} staging statements)",
        template.name,
        order_ids.len(),
        staging.len()
    );

    Ok(BoundItemQuery {
        staging,
        query: template.text.replace(ORDER_ID_LIST_PLACEHOLDER, &clause),
    })
}

/// A single-column row source of the given identifiers.
///
/// An empty set renders a source that yields no rows, so `IN (...)` matches
/// nothing instead of becoming invalid SQL.
pub fn render_id_list_clause(order_ids: &BTreeSet<String>) -> String {
    if order_ids.is_empty() {
        return "SELECT NULL WHERE 1 = 0".to_string();
    }

    let values = order_ids
        .iter()
        .map(|id| format!("({})", quote_literal(id)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT column1 FROM VALUES {}", values)
}

pub fn staging_statements(
    table: &str,
    order_ids: &BTreeSet<String>,
    chunk_size: usize,
) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(OrdersToCashError::Config(
            "staging chunk size must be at least 1".to_string(),
        ));
    }

    let mut statements = vec![format!(
        "CREATE OR REPLACE TEMP TABLE {} (order_id STRING)",
        table
    )];

    let ids: Vec<&String> = order_ids.iter().collect();
    for chunk in ids.chunks(chunk_size) {
        let values = chunk
            .iter()
            .map(|id| format!("({})", quote_literal(id)))
            .collect::<Vec<_>>()
            .join(", ");
        statements.push(format!("INSERT INTO {} (order_id) VALUES {}", table, values));
    }

    Ok(statements)
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
