use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum VendorGroup {
    /// Direct-to-consumer order placed through our own storefront
    Dtc,
    /// Order originated on a third-party marketplace
    Mp,
}

impl VendorGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorGroup::Dtc => "DTC",
            VendorGroup::Mp => "MP",
        }
    }
}

impl TryFrom<String> for VendorGroup {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DTC" => Ok(VendorGroup::Dtc),
            "MP" => Ok(VendorGroup::Mp),
            other => Err(format!("unknown vendor group '{}'", other)),
        }
    }
}

impl From<VendorGroup> for String {
    fn from(group: VendorGroup) -> Self {
        group.as_str().to_string()
    }
}

impl fmt::Display for VendorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tax-rate category that items are grouped into by the item-level query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum VatBand {
    Zero,
    Five,
    Twenty,
    Other,
}

impl VatBand {
    /// Fixed column order of the wide item table.
    pub const ALL: [VatBand; 4] = [VatBand::Zero, VatBand::Five, VatBand::Twenty, VatBand::Other];

    /// Label emitted by the warehouse for this band.
    pub fn label(&self) -> &'static str {
        match self {
            VatBand::Zero => "0% VAT Band",
            VatBand::Five => "5% VAT Band",
            VatBand::Twenty => "20% VAT Band",
            VatBand::Other => "Other / Unknown VAT Band",
        }
    }

    /// Suffix used in wide column names, e.g. `total_price_inc_vat_20`.
    pub fn suffix(&self) -> &'static str {
        match self {
            VatBand::Zero => "0",
            VatBand::Five => "5",
            VatBand::Twenty => "20",
            VatBand::Other => "other",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            VatBand::Zero => 0,
            VatBand::Five => 1,
            VatBand::Twenty => 2,
            VatBand::Other => 3,
        }
    }

    /// Accepts the warehouse label, the column suffix or a bare percentage.
    pub fn parse(raw: &str) -> Option<VatBand> {
        let normalized = raw.trim().to_ascii_lowercase();
        let normalized = normalized.trim_end_matches(" vat band").trim();
        match normalized {
            "0%" | "0" => Some(VatBand::Zero),
            "5%" | "5" => Some(VatBand::Five),
            "20%" | "20" => Some(VatBand::Twenty),
            "other / unknown" | "other/unknown" | "other" | "unknown" => Some(VatBand::Other),
            _ => None,
        }
    }
}

impl TryFrom<String> for VatBand {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VatBand::parse(&value).ok_or_else(|| format!("unknown VAT band label '{}'", value))
    }
}

impl From<VatBand> for String {
    fn from(band: VatBand) -> Self {
        band.label().to_string()
    }
}

impl fmt::Display for VatBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Order-level money, VAT-inclusive and VAT-exclusive.
///
/// Only populated on the first transaction row of an order (or the single row
/// of an order without transactions); later transaction rows carry `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFinancials {
    #[serde(default)]
    pub sales_inc_vat: Option<f64>,
    #[serde(default)]
    pub sales_exc_vat: Option<f64>,
    #[serde(default)]
    pub delivery_fee_inc_vat: Option<f64>,
    #[serde(default)]
    pub delivery_fee_exc_vat: Option<f64>,
    #[serde(default)]
    pub priority_fee_inc_vat: Option<f64>,
    #[serde(default)]
    pub priority_fee_exc_vat: Option<f64>,
    #[serde(default)]
    pub small_order_fee_inc_vat: Option<f64>,
    #[serde(default)]
    pub small_order_fee_exc_vat: Option<f64>,
    #[serde(default)]
    pub mp_bag_fee_inc_vat: Option<f64>,
    #[serde(default)]
    pub mp_bag_fee_exc_vat: Option<f64>,
    #[serde(default)]
    pub total_payment_inc_vat: Option<f64>,
    #[serde(default)]
    pub total_payment_exc_vat: Option<f64>,
    #[serde(default)]
    pub total_payment_with_tips_inc_vat: Option<f64>,
    #[serde(default)]
    pub total_payment_with_tips_exc_vat: Option<f64>,
    #[serde(default)]
    pub cost_of_goods_inc_vat: Option<f64>,
    #[serde(default)]
    pub cost_of_goods_exc_vat: Option<f64>,
}

impl OrderFinancials {
    pub const COLUMNS: [&'static str; 16] = [
        "sales_inc_vat",
        "sales_exc_vat",
        "delivery_fee_inc_vat",
        "delivery_fee_exc_vat",
        "priority_fee_inc_vat",
        "priority_fee_exc_vat",
        "small_order_fee_inc_vat",
        "small_order_fee_exc_vat",
        "mp_bag_fee_inc_vat",
        "mp_bag_fee_exc_vat",
        "total_payment_inc_vat",
        "total_payment_exc_vat",
        "total_payment_with_tips_inc_vat",
        "total_payment_with_tips_exc_vat",
        "cost_of_goods_inc_vat",
        "cost_of_goods_exc_vat",
    ];

    /// Values in the same order as [`OrderFinancials::COLUMNS`].
    pub fn values(&self) -> [Option<f64>; 16] {
        [
            self.sales_inc_vat,
            self.sales_exc_vat,
            self.delivery_fee_inc_vat,
            self.delivery_fee_exc_vat,
            self.priority_fee_inc_vat,
            self.priority_fee_exc_vat,
            self.small_order_fee_inc_vat,
            self.small_order_fee_exc_vat,
            self.mp_bag_fee_inc_vat,
            self.mp_bag_fee_exc_vat,
            self.total_payment_inc_vat,
            self.total_payment_exc_vat,
            self.total_payment_with_tips_inc_vat,
            self.total_payment_with_tips_exc_vat,
            self.cost_of_goods_inc_vat,
            self.cost_of_goods_exc_vat,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.values().iter().all(Option::is_none)
    }
}

/// One row per (order, payment transaction) pair from the order-level query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Repeats across the transaction rows of one order.
    #[serde(deserialize_with = "deserialize_order_id")]
    pub order_id: String,
    #[serde(default)]
    pub order_id_obfuscated: Option<String>,
    /// Only present for marketplace orders
    #[serde(default)]
    pub marketplace_order_id: Option<String>,
    pub vendor_group: VendorGroup,
    #[serde(default)]
    pub payment_system: Option<String>,
    /// 1-based; `None` when the order has no transactions
    #[serde(default)]
    pub transaction_index: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub created_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_week: Option<NaiveDate>,
    #[serde(default)]
    pub created_month: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub delivered_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub delivered_date: Option<NaiveDate>,
    #[serde(default)]
    pub delivered_week: Option<NaiveDate>,
    #[serde(default)]
    pub delivered_month: Option<NaiveDate>,

    #[serde(flatten)]
    pub financials: OrderFinancials,
}

impl OrderRecord {
    pub const COLUMNS: [&'static str; 14] = [
        "order_id",
        "order_id_obfuscated",
        "marketplace_order_id",
        "vendor_group",
        "payment_system",
        "transaction_index",
        "created_at",
        "created_date",
        "created_week",
        "created_month",
        "delivered_at",
        "delivered_date",
        "delivered_week",
        "delivered_month",
    ];

    /// Whether this row is the one allowed to carry order-level money.
    pub fn carries_financials(&self) -> bool {
        matches!(self.transaction_index, None | Some(1))
    }

    pub fn provider_key(&self) -> ProviderKey {
        ProviderKey::new(self.vendor_group, self.payment_system.as_deref())
    }
}

/// One row per (order_id, vat_band) from the item-level query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBandAggregate {
    pub order_id: String,
    pub vat_band: VatBand,
    pub item_quantity_count: i64,
    pub total_price_inc_vat: f64,
    pub total_price_exc_vat: f64,
}

impl ItemBandAggregate {
    pub fn metrics(&self) -> BandMetrics {
        BandMetrics {
            item_quantity_count: self.item_quantity_count,
            total_price_inc_vat: self.total_price_inc_vat,
            total_price_exc_vat: self.total_price_exc_vat,
        }
    }
}

/// The three per-band metrics. Negative values from promotional adjustments
/// are kept as sourced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandMetrics {
    pub item_quantity_count: i64,
    pub total_price_inc_vat: f64,
    pub total_price_exc_vat: f64,
}

impl BandMetrics {
    pub const ZERO: BandMetrics = BandMetrics {
        item_quantity_count: 0,
        total_price_inc_vat: 0.0,
        total_price_exc_vat: 0.0,
    };

    pub const METRICS: [&'static str; 3] = [
        "item_quantity_count",
        "total_price_inc_vat",
        "total_price_exc_vat",
    ];
}

/// The 12 wide item columns of a merged row, one [`BandMetrics`] per band.
///
/// Built only through [`crate::pivot::fill_missing_bands`], so absent bands
/// are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WideItemColumns {
    pub(crate) bands: [BandMetrics; 4],
}

impl WideItemColumns {
    pub fn band(&self, band: VatBand) -> BandMetrics {
        self.bands[band.index()]
    }

    pub fn total_products(&self) -> i64 {
        self.bands.iter().map(|m| m.item_quantity_count).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.bands.iter().all(|m| *m == BandMetrics::ZERO)
    }

    /// `{metric}_{band}` names, band-major in [`VatBand::ALL`] order.
    pub fn column_names() -> Vec<String> {
        VatBand::ALL
            .iter()
            .flat_map(|band| {
                BandMetrics::METRICS
                    .iter()
                    .map(move |metric| format!("{}_{}", metric, band.suffix()))
            })
            .collect()
    }

    fn render(&self) -> Vec<String> {
        self.bands
            .iter()
            .flat_map(|m| {
                [
                    m.item_quantity_count.to_string(),
                    format_amount(m.total_price_inc_vat),
                    format_amount(m.total_price_exc_vat),
                ]
            })
            .collect()
    }
}

/// An order row extended with its VAT-band item totals.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedOrderRow {
    pub order: OrderRecord,
    pub items: WideItemColumns,
}

impl MergedOrderRow {
    pub const TOTAL_PRODUCTS_COLUMN: &'static str = "total_products";

    /// Output column order of every export file.
    pub fn header() -> Vec<String> {
        OrderRecord::COLUMNS
            .iter()
            .chain(OrderFinancials::COLUMNS.iter())
            .map(|c| c.to_string())
            .chain(WideItemColumns::column_names())
            .chain(std::iter::once(Self::TOTAL_PRODUCTS_COLUMN.to_string()))
            .collect()
    }

    pub fn to_record(&self) -> Vec<String> {
        let order = &self.order;
        let mut record = vec![
            order.order_id.clone(),
            order.order_id_obfuscated.clone().unwrap_or_default(),
            order.marketplace_order_id.clone().unwrap_or_default(),
            order.vendor_group.to_string(),
            order.payment_system.clone().unwrap_or_default(),
            order
                .transaction_index
                .map(|i| i.to_string())
                .unwrap_or_default(),
            format_timestamp(order.created_at),
            format_date(order.created_date),
            format_date(order.created_week),
            format_date(order.created_month),
            format_timestamp(order.delivered_at),
            format_date(order.delivered_date),
            format_date(order.delivered_week),
            format_date(order.delivered_month),
        ];

        record.extend(
            order
                .financials
                .values()
                .iter()
                .map(|v| v.map(format_amount).unwrap_or_default()),
        );
        record.extend(self.items.render());
        record.push(self.items.total_products().to_string());
        record
    }
}

/// Grouping key of the provider partitioner.
///
/// Payment systems are compared trimmed and case-insensitively; a blank
/// payment system is the same as none.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderKey {
    pub vendor_group: VendorGroup,
    pub payment_system: Option<String>,
}

impl ProviderKey {
    pub fn new(vendor_group: VendorGroup, payment_system: Option<&str>) -> Self {
        let payment_system = payment_system
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty());
        Self {
            vendor_group,
            payment_system,
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payment_system {
            Some(p) => write!(f, "{} / {}", self.vendor_group, p),
            None => write!(f, "{} / <no payment system>", self.vendor_group),
        }
    }
}

/// Order ids arrive as text or as a number column; both become trimmed text.
pub(crate) fn deserialize_order_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawOrderId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    let id = match RawOrderId::deserialize(deserializer)? {
        RawOrderId::Text(text) => text.trim().to_string(),
        RawOrderId::Unsigned(n) => n.to_string(),
        RawOrderId::Signed(n) => n.to_string(),
        RawOrderId::Float(n) if n.fract() == 0.0 && n.is_finite() => format!("{:.0}", n),
        RawOrderId::Float(n) => {
            return Err(de::Error::custom(format!(
                "order id {} is not a whole number",
                n
            )))
        }
    };
    Ok(id)
}

/// Accepts `2025-10-03 12:00:00`, `2025-10-03T12:00:00`, either with
/// fractional seconds, and RFC 3339 with an offset (kept as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<String>::deserialize(deserializer)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("unrecognised timestamp '{}'", raw)))
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

fn format_date(value: Option<NaiveDate>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn format_timestamp(value: Option<NaiveDateTime>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
