use crate::binder::BoundItemQuery;
use crate::error::{OrdersToCashError, Result};
use crate::schema::{deserialize_order_id, ItemBandAggregate, OrderRecord, VatBand};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Instant;
use thiserror::Error;

/// A single result row keyed by column name.
pub type WarehouseRow = Map<String, Value>;

/// Diagnostic reported by the warehouse connector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WarehouseError(pub String);

/// Connection to the data warehouse.
///
/// Session lifecycle, authentication, timeouts and retries all belong to the
/// implementor. Statements that return no rows yield an empty vector.
pub trait Warehouse {
    fn execute(&mut self, query: &str) -> std::result::Result<Vec<WarehouseRow>, WarehouseError>;
}

pub struct RowSetLoader<'a, W: Warehouse> {
    warehouse: &'a mut W,
}

impl<'a, W: Warehouse> RowSetLoader<'a, W> {
    pub fn new(warehouse: &'a mut W) -> Self {
        Self { warehouse }
    }

    pub fn load_orders(&mut self, query: &str) -> Result<Vec<OrderRecord>> {
        let started = Instant::now();
        let orders: Vec<OrderRecord> = self.load_rows(query)?;
        info!(
            "Order-level query complete in {:.1}s: {} rows",
            started.elapsed().as_secs_f64(),
            orders.len()
        );
        Ok(orders)
    }

    /// Runs the staging statements, then the item-level query.
    pub fn load_items(&mut self, bound: &BoundItemQuery) -> Result<Vec<ItemBandAggregate>> {
        let started = Instant::now();
        for statement in &bound.staging {
            self.run(statement)?;
        }
        if !bound.staging.is_empty() {
            debug!(
                "Ran {} staging statements in {:.1}s",
                bound.staging.len(),
                started.elapsed().as_secs_f64()
            );
        }

        let raw: Vec<RawItemRow> = self.load_rows(&bound.query)?;
        let items = raw
            .into_iter()
            .map(RawItemRow::into_aggregate)
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Item-level query complete in {:.1}s: {} rows",
            started.elapsed().as_secs_f64(),
            items.len()
        );
        Ok(items)
    }

    pub fn load_rows<T: DeserializeOwned>(&mut self, query: &str) -> Result<Vec<T>> {
        self.run(query)?
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                serde_json::from_value(Value::Object(normalize_columns(row))).map_err(|e| {
                    OrdersToCashError::RowDecode {
                        row: idx,
                        details: e.to_string(),
                    }
                })
            })
            .collect()
    }

    fn run(&mut self, query: &str) -> Result<Vec<WarehouseRow>> {
        self.warehouse
            .execute(query)
            .map_err(|e| OrdersToCashError::QueryExecution {
                query: query.to_string(),
                message: e.0,
            })
    }
}

/// Item rows are decoded with the band as text so that an unrecognised
/// label surfaces as its own error.
#[derive(Debug, Deserialize)]
struct RawItemRow {
    #[serde(deserialize_with = "deserialize_order_id")]
    order_id: String,
    vat_band: String,
    item_quantity_count: i64,
    total_price_inc_vat: f64,
    total_price_exc_vat: f64,
}

impl RawItemRow {
    fn into_aggregate(self) -> Result<ItemBandAggregate> {
        let vat_band = VatBand::parse(&self.vat_band)
            .ok_or_else(|| OrdersToCashError::UnknownVatBand(self.vat_band.clone()))?;
        Ok(ItemBandAggregate {
            order_id: self.order_id,
            vat_band,
            item_quantity_count: self.item_quantity_count,
            total_price_inc_vat: self.total_price_inc_vat,
            total_price_exc_vat: self.total_price_exc_vat,
        })
    }
}

/// Trims and lower-cases column names; inner spaces become underscores.
pub fn normalize_columns(row: WarehouseRow) -> WarehouseRow {
    row.into_iter()
        .map(|(name, value)| (name.trim().to_lowercase().replace(' ', "_"), value))
        .collect()
}

/// The identifier set handed to the item-level query. Ids are already
/// trimmed at decode time, so the merge looks them up unchanged.
pub fn distinct_order_ids(orders: &[OrderRecord]) -> BTreeSet<String> {
    orders
        .iter()
        .map(|o| o.order_id.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
