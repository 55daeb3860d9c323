use crate::error::{OrdersToCashError, Result};
use crate::schema::{BandMetrics, ItemBandAggregate, VatBand, WideItemColumns};
use log::debug;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// One order's item totals, holding only the bands it actually has.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedItemRow {
    pub order_id: String,
    bands: BTreeMap<VatBand, BandMetrics>,
}

impl PivotedItemRow {
    pub fn new(order_id: impl Into<String>, bands: BTreeMap<VatBand, BandMetrics>) -> Self {
        Self {
            order_id: order_id.into(),
            bands,
        }
    }

    /// `None` when the order has no items in this band.
    pub fn band(&self, band: VatBand) -> Option<&BandMetrics> {
        self.bands.get(&band)
    }

    pub fn wide(&self) -> WideItemColumns {
        fill_missing_bands(Some(&self.bands))
    }
}

/// The wide item table, one row per order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotedItems {
    rows: Vec<PivotedItemRow>,
}

impl PivotedItems {
    /// Wraps rows produced elsewhere. Key uniqueness is not checked here; the
    /// merge step re-checks it.
    pub fn from_rows(rows: Vec<PivotedItemRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[PivotedItemRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reshapes long-form band aggregates into one row per order.
///
/// A repeated (order_id, vat_band) pair means the upstream aggregation is
/// broken, so it is an error rather than something to sum.
pub fn pivot_item_bands(items: &[ItemBandAggregate]) -> Result<PivotedItems> {
    let mut by_order: BTreeMap<&str, BTreeMap<VatBand, BandMetrics>> = BTreeMap::new();

    for item in items {
        let bands = by_order.entry(item.order_id.as_str()).or_default();
        match bands.entry(item.vat_band) {
            Entry::Occupied(_) => {
                return Err(OrdersToCashError::DuplicateBand {
                    order_id: item.order_id.clone(),
                    band: item.vat_band,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(item.metrics());
            }
        }
    }

    debug!(
        "Pivoted {} item aggregates into {} order rows",
        items.len(),
        by_order.len()
    );

    Ok(PivotedItems {
        rows: by_order
            .into_iter()
            .map(|(order_id, bands)| PivotedItemRow::new(order_id, bands))
            .collect(),
    })
}

/// The zero-fill rule: every band missing from `bands` (or all of them, for
/// an order with no items) becomes [`BandMetrics::ZERO`].
pub fn fill_missing_bands(bands: Option<&BTreeMap<VatBand, BandMetrics>>) -> WideItemColumns {
    let mut filled = [BandMetrics::ZERO; 4];
    if let Some(bands) = bands {
        for (band, metrics) in bands {
            filled[band.index()] = *metrics;
        }
    }
    WideItemColumns { bands: filled }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(order_id: &str, band: VatBand, qty: i64, inc: f64, exc: f64) -> ItemBandAggregate {
        ItemBandAggregate {
            order_id: order_id.to_string(),
            vat_band: band,
            item_quantity_count: qty,
            total_price_inc_vat: inc,
            total_price_exc_vat: exc,
        }
    }

    #[test]
    fn test_single_band_order() {
        let pivoted = pivot_item_bands(&[item("1001", VatBand::Twenty, 2, 10.0, 8.33)]).unwrap();
        assert_eq!(pivoted.len(), 1);

        let wide = pivoted.rows()[0].wide();
        assert_eq!(
            wide.band(VatBand::Twenty),
            BandMetrics {
                item_quantity_count: 2,
                total_price_inc_vat: 10.0,
                total_price_exc_vat: 8.33,
            }
        );
        for band in [VatBand::Zero, VatBand::Five, VatBand::Other] {
            assert_eq!(wide.band(band), BandMetrics::ZERO);
        }
        assert_eq!(wide.total_products(), 2);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut items = vec![
            item("b", VatBand::Zero, 1, 3.0, 3.0),
            item("a", VatBand::Five, 4, 4.2, 4.0),
            item("b", VatBand::Other, 2, 1.5, 1.25),
            item("a", VatBand::Twenty, 1, 6.0, 5.0),
        ];
        let forward = pivot_item_bands(&items).unwrap();
        items.reverse();
        let backward = pivot_item_bands(&items).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.rows()[0].order_id, "a");
        assert_eq!(forward.rows()[1].wide().total_products(), 3);
    }

    #[test]
    fn test_duplicate_band_is_rejected() {
        let items = vec![
            item("1001", VatBand::Twenty, 1, 5.0, 4.17),
            item("1001", VatBand::Zero, 1, 2.0, 2.0),
            item("1001", VatBand::Twenty, 1, 5.0, 4.17),
        ];
        let err = pivot_item_bands(&items).unwrap_err();
        assert!(matches!(
            err,
            OrdersToCashError::DuplicateBand { ref order_id, band: VatBand::Twenty } if order_id == "1001"
        ));
    }

    #[test]
    fn test_negative_values_are_preserved() {
        let pivoted = pivot_item_bands(&[item("7", VatBand::Other, -1, -3.5, -2.92)]).unwrap();
        let metrics = pivoted.rows()[0].wide().band(VatBand::Other);
        assert_eq!(metrics.item_quantity_count, -1);
        assert_eq!(metrics.total_price_inc_vat, -3.5);
        assert_eq!(metrics.total_price_exc_vat, -2.92);
    }

    #[test]
    fn test_fill_without_bands_is_all_zero() {
        assert!(fill_missing_bands(None).is_zero());
        assert!(pivot_item_bands(&[]).unwrap().is_empty());
    }
}
