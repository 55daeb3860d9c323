use crate::error::{OrdersToCashError, Result};
use crate::schema::{MergedOrderRow, ProviderKey, VendorGroup};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One export destination and the revenue channels that feed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderEntry {
    #[schemars(description = "Short stable identifier, e.g. 'braintree'.")]
    pub key: String,

    #[schemars(description = "Display name used in the export file name, e.g. 'Braintree'.")]
    pub name: String,

    #[schemars(description = "Provider folder under the shared root, e.g. '01 Braintree'.")]
    pub folder: String,

    #[schemars(with = "String", description = "Vendor group: 'DTC' or 'MP'.")]
    pub vendor_group: VendorGroup,

    #[schemars(
        description = "Payment systems routed to this provider. Matching is case-insensitive; null matches rows without a payment system."
    )]
    pub payment_systems: Vec<Option<String>>,
}

impl ProviderEntry {
    pub fn keys(&self) -> impl Iterator<Item = ProviderKey> + '_ {
        self.payment_systems
            .iter()
            .map(move |p| ProviderKey::new(self.vendor_group, p.as_deref()))
    }
}

/// Lookup from (vendor_group, payment_system) to provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderTable {
    pub providers: Vec<ProviderEntry>,
}

impl Default for ProviderTable {
    fn default() -> Self {
        Self {
            providers: vec![
                provider(
                    "braintree",
                    "Braintree",
                    "01 Braintree",
                    VendorGroup::Dtc,
                    &[Some("Braintree"), None],
                ),
                provider("paypal", "Paypal", "02 Paypal", VendorGroup::Dtc, &[Some("PayPal")]),
                provider(
                    "uber",
                    "Uber",
                    "03 Uber Eats",
                    VendorGroup::Mp,
                    &[Some("Uber Eats"), Some("Uber")],
                ),
                provider(
                    "deliveroo",
                    "Deliveroo",
                    "04 Deliveroo",
                    VendorGroup::Mp,
                    &[Some("Deliveroo")],
                ),
                provider(
                    "justeat",
                    "Justeat",
                    "05 Just Eat",
                    VendorGroup::Mp,
                    &[Some("Just Eat"), Some("JustEat")],
                ),
                provider(
                    "amazon",
                    "Amazon",
                    "06 Amazon",
                    VendorGroup::Mp,
                    &[Some("Amazon UK"), Some("Amazon")],
                ),
            ],
        }
    }
}

fn provider(
    key: &str,
    name: &str,
    folder: &str,
    vendor_group: VendorGroup,
    payment_systems: &[Option<&str>],
) -> ProviderEntry {
    ProviderEntry {
        key: key.to_string(),
        name: name.to_string(),
        folder: folder.to_string(),
        vendor_group,
        payment_systems: payment_systems
            .iter()
            .map(|p| p.map(str::to_string))
            .collect(),
    }
}

impl ProviderTable {
    pub fn new(providers: Vec<ProviderEntry>) -> Result<Self> {
        let table = Self { providers };
        table.validate()?;
        Ok(table)
    }

    /// Rejects repeated provider keys and channels mapped to two providers.
    pub fn validate(&self) -> Result<()> {
        let mut seen_keys: HashSet<&str> = HashSet::new();
        let mut seen_channels: HashMap<ProviderKey, &str> = HashMap::new();

        for entry in &self.providers {
            if entry.key.trim().is_empty() {
                return Err(OrdersToCashError::Config(
                    "provider key must not be empty".to_string(),
                ));
            }
            if !seen_keys.insert(entry.key.as_str()) {
                return Err(OrdersToCashError::Config(format!(
                    "provider '{}' is listed more than once",
                    entry.key
                )));
            }
            for channel in entry.keys() {
                if let Some(previous) = seen_channels.insert(channel.clone(), entry.key.as_str()) {
                    return Err(OrdersToCashError::Config(format!(
                        "{} is mapped to both '{}' and '{}'",
                        channel, previous, entry.key
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, key: &ProviderKey) -> Option<&ProviderEntry> {
        self.providers
            .iter()
            .find(|entry| entry.keys().any(|k| &k == key))
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(ProviderTable);
        serde_json::to_string_pretty(&schema)
    }
}

/// The merged rows routed to one provider, possibly none.
#[derive(Debug, Clone)]
pub struct ProviderGroup<'a> {
    pub provider: &'a ProviderEntry,
    pub rows: Vec<&'a MergedOrderRow>,
}

/// Splits merged rows by provider, one group per table entry in table order.
///
/// Every row must map to a provider; all unmapped channels are reported
/// together before anything is grouped.
pub fn partition_by_provider<'a>(
    rows: &'a [MergedOrderRow],
    table: &'a ProviderTable,
) -> Result<Vec<ProviderGroup<'a>>> {
    let mut groups: Vec<ProviderGroup<'a>> = table
        .providers
        .iter()
        .map(|provider| ProviderGroup {
            provider,
            rows: Vec::new(),
        })
        .collect();
    let position: HashMap<&str, usize> = table
        .providers
        .iter()
        .enumerate()
        .map(|(idx, p)| (p.key.as_str(), idx))
        .collect();

    let mut unmapped: BTreeMap<ProviderKey, usize> = BTreeMap::new();
    for row in rows {
        let key = row.order.provider_key();
        match table.lookup(&key) {
            Some(provider) => groups[position[provider.key.as_str()]].rows.push(row),
            None => *unmapped.entry(key).or_default() += 1,
        }
    }

    if !unmapped.is_empty() {
        for (key, count) in &unmapped {
            warn!("{} rows for unmapped channel {}", count, key);
        }
        return Err(OrdersToCashError::UnmappedProvider(
            unmapped.into_keys().collect(),
        ));
    }

    for group in &groups {
        debug!("{} rows routed to {}", group.rows.len(), group.provider.name);
    }
    Ok(groups)
}
