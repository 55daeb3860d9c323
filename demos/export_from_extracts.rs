use chrono::NaiveDate;
use dwh_orders_to_cash::*;
use serde_json::{json, Value};

/// Stands in for the warehouse connection with a handful of October orders.
struct SampleWarehouse {
    orders: Vec<Value>,
    items: Vec<Value>,
}

impl Warehouse for SampleWarehouse {
    fn execute(&mut self, query: &str) -> std::result::Result<Vec<WarehouseRow>, WarehouseError> {
        let rows = if query.contains("order_level") {
            &self.orders
        } else if query.contains("item_level") {
            &self.items
        } else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect())
    }
}

fn main() {
    let mut warehouse = SampleWarehouse {
        orders: vec![
            json!({
                "ORDER_ID": "1001", "VENDOR_GROUP": "DTC", "PAYMENT_SYSTEM": "Braintree",
                "TRANSACTION_INDEX": 1, "CREATED_DATE": "2025-10-02",
                "SALES_INC_VAT": 10.0, "SALES_EXC_VAT": 8.33,
            }),
            json!({
                "ORDER_ID": "2002", "VENDOR_GROUP": "DTC", "PAYMENT_SYSTEM": "Braintree",
                "TRANSACTION_INDEX": 1, "CREATED_DATE": "2025-10-05",
                "SALES_INC_VAT": 31.5, "SALES_EXC_VAT": 28.25,
            }),
            json!({
                "ORDER_ID": "2002", "VENDOR_GROUP": "DTC", "PAYMENT_SYSTEM": "Braintree",
                "TRANSACTION_INDEX": 2, "CREATED_DATE": "2025-10-05",
            }),
            json!({
                "ORDER_ID": "3003", "MARKETPLACE_ORDER_ID": "DRV-88120", "VENDOR_GROUP": "MP",
                "PAYMENT_SYSTEM": "Deliveroo", "CREATED_DATE": "2025-10-09",
                "SALES_INC_VAT": 14.2, "SALES_EXC_VAT": 12.6,
            }),
        ],
        items: vec![
            json!({
                "ORDER_ID": "1001", "VAT_BAND": "20% VAT Band",
                "ITEM_QUANTITY_COUNT": 2, "TOTAL_PRICE_INC_VAT": 10.0, "TOTAL_PRICE_EXC_VAT": 8.33,
            }),
            json!({
                "ORDER_ID": "2002", "VAT_BAND": "0% VAT Band",
                "ITEM_QUANTITY_COUNT": 4, "TOTAL_PRICE_INC_VAT": 12.0, "TOTAL_PRICE_EXC_VAT": 12.0,
            }),
            json!({
                "ORDER_ID": "2002", "VAT_BAND": "20% VAT Band",
                "ITEM_QUANTITY_COUNT": 1, "TOTAL_PRICE_INC_VAT": 19.5, "TOTAL_PRICE_EXC_VAT": 16.25,
            }),
            json!({
                "ORDER_ID": "3003", "VAT_BAND": "Other / Unknown VAT Band",
                "ITEM_QUANTITY_COUNT": -1, "TOTAL_PRICE_INC_VAT": -2.5, "TOTAL_PRICE_EXC_VAT": -2.08,
            }),
        ],
    };

    let export_root = std::env::temp_dir().join("dwh-orders-to-cash-demo");
    let config = PipelineConfig::new(
        SqlTemplate::new(
            "order_level.sql",
            "-- order_level\nSELECT * FROM core.orders WHERE created_date BETWEEN '{{start_date}}' AND '{{end_date}}'",
        ),
        SqlTemplate::new(
            "item_level.sql",
            "-- item_level\nSELECT * FROM core.order_items WHERE order_id IN ({{order_id_list}})",
        ),
        ExportConfig {
            destination_root: export_root.clone(),
            id_hand_off: IdHandOff::InlineList,
            ..ExportConfig::default()
        },
        ProviderTable::default(),
    )
    .expect("demo configuration is valid");

    let period = ReportingPeriod::new(
        NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
    )
    .expect("period is ordered");

    let summary = run_export(&mut warehouse, &config, &period).expect("export should run");

    println!("Exports written under {}", export_root.display());
    for outcome in &summary.outcomes {
        match &outcome.status {
            Ok(()) => println!(" - {:<10} {:>3} rows  {}", outcome.provider, outcome.rows, outcome.path.display()),
            Err(e) => println!(" - {:<10} FAILED: {}", outcome.provider, e),
        }
    }
    println!(
        "Complete: {} ({} rows in total)",
        summary.is_complete(),
        summary.total_rows_written()
    );
}
