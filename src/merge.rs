use crate::error::{OrdersToCashError, Result};
use crate::pivot::{fill_missing_bands, PivotedItemRow, PivotedItems};
use crate::schema::{MergedOrderRow, OrderRecord};
use log::{debug, info};
use std::collections::HashMap;

/// Left-joins the pivoted item table onto the order rows by `order_id`.
///
/// Every order row is kept; rows without items get all-zero item columns and
/// every transaction row of an order picks up the same item totals. The
/// output is sorted by order id, then transaction index.
pub fn merge_orders_with_items(
    orders: Vec<OrderRecord>,
    items: &PivotedItems,
) -> Result<Vec<MergedOrderRow>> {
    let index = index_by_order(items)?;
    let order_rows = orders.len();

    let mut unmatched = 0usize;
    let mut merged: Vec<MergedOrderRow> = orders
        .into_iter()
        .map(|order| {
            let wide = match index.get(order.order_id.as_str()) {
                Some(row) => row.wide(),
                None => {
                    unmatched += 1;
                    fill_missing_bands(None)
                }
            };
            MergedOrderRow { order, items: wide }
        })
        .collect();

    debug_assert_eq!(merged.len(), order_rows);

    merged.sort_by(|a, b| {
        a.order
            .order_id
            .cmp(&b.order.order_id)
            .then(a.order.transaction_index.cmp(&b.order.transaction_index))
    });

    if unmatched > 0 {
        debug!("{} order rows had no item aggregates", unmatched);
    }
    info!(
        "Combined order and item data: {} rows, {} columns",
        merged.len(),
        MergedOrderRow::header().len()
    );

    Ok(merged)
}

fn index_by_order(items: &PivotedItems) -> Result<HashMap<&str, &PivotedItemRow>> {
    let mut index = HashMap::with_capacity(items.len());
    for row in items.rows() {
        if index.insert(row.order_id.as_str(), row).is_some() {
            return Err(OrdersToCashError::MergeKeyCollision(row.order_id.clone()));
        }
    }
    Ok(index)
}
