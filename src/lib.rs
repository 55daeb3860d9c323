//! # DWH Orders to Cash
//!
//! Builds the monthly orders-to-cash export files from two warehouse
//! extracts: an order-level table (one row per order and payment
//! transaction) and an item-level table (one row per order and VAT band).
//!
//! ## Pipeline
//!
//! 1. **Bind** the reporting period into the order-level SQL template.
//! 2. **Load** the order rows, then hand their distinct order ids to the
//!    item-level template (inline list or staged temp table) and load items.
//! 3. **Pivot** the item rows into one row per order with 12 wide columns
//!    (`item_quantity_count`, `total_price_inc_vat`, `total_price_exc_vat`
//!    for each of the 0%, 5%, 20% and Other bands).
//! 4. **Merge** the wide item columns onto every order row; missing bands
//!    are zero and the row count never changes.
//! 5. **Partition** the merged rows by provider and write one CSV per
//!    provider, header-only when a provider had no orders.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dwh_orders_to_cash::*;
//! use chrono::NaiveDate;
//!
//! let config = PipelineConfig::from_json_file("settings.json")?;
//! let period = ReportingPeriod::new(
//!     NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
//! )?;
//!
//! let summary = run_export(&mut my_warehouse, &config, &period)?;
//! for failure in summary.failures() {
//!     eprintln!("{}: {:?}", failure.provider, failure.status);
//! }
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod loader;
pub mod merge;
pub mod pivot;
pub mod providers;
pub mod schema;
pub mod writer;

pub use binder::{
    bind_item_query, bind_order_query, render_id_list_clause, BoundItemQuery, IdHandOff,
    ReportingPeriod, SqlTemplate,
};
pub use config::{ExportConfig, PipelineConfig, PipelineSettings};
pub use error::{OrdersToCashError, Result};
pub use loader::{distinct_order_ids, RowSetLoader, Warehouse, WarehouseError, WarehouseRow};
pub use merge::merge_orders_with_items;
pub use pivot::{fill_missing_bands, pivot_item_bands, PivotedItemRow, PivotedItems};
pub use providers::{partition_by_provider, ProviderEntry, ProviderGroup, ProviderTable};
pub use schema::*;
pub use writer::{
    write_provider_exports, CsvFileSink, ExportOutcome, ExportSink, ExportSummary,
};

use log::{debug, info};

pub struct OrdersToCashProcessor;

impl OrdersToCashProcessor {
    /// Runs the whole export. Query, pivot, merge and provider-mapping
    /// errors abort before any file is written; write failures are reported
    /// per provider in the summary.
    pub fn process<W: Warehouse, S: ExportSink + ?Sized>(
        warehouse: &mut W,
        sink: &S,
        config: &PipelineConfig,
        period: &ReportingPeriod,
    ) -> Result<ExportSummary> {
        info!(
            "Running DWH export for {} to {}",
            period.start(),
            period.end()
        );

        let merged = Self::extract(warehouse, config, period)?;
        let groups = partition_by_provider(&merged, &config.providers)?;
        let summary = write_provider_exports(&groups, &config.export, period, sink);

        info!(
            "Export finished: {} of {} provider files written, {} rows",
            summary.written().count(),
            summary.outcomes.len(),
            summary.total_rows_written()
        );
        Ok(summary)
    }

    /// Loads both extracts and returns the merged table.
    pub fn extract<W: Warehouse>(
        warehouse: &mut W,
        config: &PipelineConfig,
        period: &ReportingPeriod,
    ) -> Result<Vec<MergedOrderRow>> {
        let mut loader = RowSetLoader::new(warehouse);

        let order_query = bind_order_query(&config.order_template, period)?;
        let orders = loader.load_orders(&order_query)?;

        let order_ids = distinct_order_ids(&orders);
        debug!("{} distinct order ids for the item-level query", order_ids.len());
        let item_query = bind_item_query(
            &config.item_template,
            &order_ids,
            &config.export.id_hand_off,
            config.export.staging_chunk_size,
        )?;
        let items = loader.load_items(&item_query)?;

        build_merged_table(orders, &items)
    }
}

/// Pivot then merge: the in-memory part of the pipeline.
pub fn build_merged_table(
    orders: Vec<OrderRecord>,
    items: &[ItemBandAggregate],
) -> Result<Vec<MergedOrderRow>> {
    let pivoted = pivot_item_bands(items)?;
    merge_orders_with_items(orders, &pivoted)
}

/// Runs the export, writing CSV files to the configured destination.
pub fn run_export<W: Warehouse>(
    warehouse: &mut W,
    config: &PipelineConfig,
    period: &ReportingPeriod,
) -> Result<ExportSummary> {
    OrdersToCashProcessor::process(warehouse, &CsvFileSink, config, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(value: serde_json::Value) -> OrderRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_braintree_order_with_one_band() {
        let orders = vec![order(json!({
            "order_id": "1001",
            "vendor_group": "DTC",
            "payment_system": "Braintree",
            "transaction_index": 1,
            "sales_inc_vat": 10.0,
        }))];
        let items = vec![ItemBandAggregate {
            order_id: "1001".to_string(),
            vat_band: VatBand::Twenty,
            item_quantity_count: 2,
            total_price_inc_vat: 10.0,
            total_price_exc_vat: 8.33,
        }];

        let merged = build_merged_table(orders, &items).unwrap();
        assert_eq!(merged.len(), 1);

        let row = &merged[0];
        let twenty = row.items.band(VatBand::Twenty);
        assert_eq!(twenty.item_quantity_count, 2);
        assert_eq!(twenty.total_price_inc_vat, 10.0);
        assert_eq!(twenty.total_price_exc_vat, 8.33);
        for band in [VatBand::Zero, VatBand::Five, VatBand::Other] {
            assert_eq!(row.items.band(band), BandMetrics::ZERO);
        }

        let table = ProviderTable::default();
        let groups = partition_by_provider(&merged, &table).unwrap();
        let braintree = groups
            .iter()
            .find(|g| g.provider.key == "braintree")
            .unwrap();
        assert_eq!(braintree.rows.len(), 1);
    }

    #[test]
    fn test_padded_order_id_still_receives_its_items() {
        let orders = vec![order(json!({
            "order_id": "1001 ",
            "vendor_group": "DTC",
            "payment_system": "Braintree",
        }))];
        let ids = distinct_order_ids(&orders);
        assert!(ids.contains("1001"));

        let items = vec![ItemBandAggregate {
            order_id: "1001".to_string(),
            vat_band: VatBand::Twenty,
            item_quantity_count: 2,
            total_price_inc_vat: 10.0,
            total_price_exc_vat: 8.33,
        }];
        let merged = build_merged_table(orders, &items).unwrap();
        assert!(!merged[0].items.is_zero());
        assert_eq!(merged[0].items.total_products(), 2);
    }

    #[test]
    fn test_duplicate_band_aborts_before_merge() {
        let orders = vec![order(json!({ "order_id": "1", "vendor_group": "MP" }))];
        let band = ItemBandAggregate {
            order_id: "1".to_string(),
            vat_band: VatBand::Zero,
            item_quantity_count: 1,
            total_price_inc_vat: 1.0,
            total_price_exc_vat: 1.0,
        };

        let result = build_merged_table(orders, &[band.clone(), band]);
        assert!(matches!(
            result,
            Err(OrdersToCashError::DuplicateBand { .. })
        ));
    }
}
