use crate::binder::{IdHandOff, ReportingPeriod, SqlTemplate};
use crate::error::{OrdersToCashError, Result};
use crate::providers::{ProviderEntry, ProviderTable};
use chrono::format::{Item, StrftimeItems};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PERIOD_TOKEN: &str = "{period}";
pub const PROVIDER_TOKEN: &str = "{provider}";

/// Where and how export files are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExportConfig {
    #[schemars(description = "Drive or directory selected by the user, e.g. 'H:/'.")]
    pub destination_root: PathBuf,

    #[schemars(description = "Fixed folder chain between the root and the provider folders.")]
    pub shared_root_dir: PathBuf,

    #[schemars(description = "Subfolder of each provider folder that receives DWH exports.")]
    pub dwh_subfolder: String,

    #[schemars(description = "File name with {period} and {provider} tokens.")]
    pub file_name_template: String,

    #[schemars(description = "chrono format applied to the period start date for {period}.")]
    pub period_label_format: String,

    pub id_hand_off: IdHandOff,

    #[schemars(description = "Identifiers per INSERT when staging into a temp table.")]
    pub staging_chunk_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            destination_root: PathBuf::from("."),
            shared_root_dir: ["Shared drives", "Automation Projects", "Accounting", "Orders to Cash"]
                .iter()
                .collect(),
            dwh_subfolder: "03 DWH".to_string(),
            file_name_template: "{period} - {provider} DWH data.csv".to_string(),
            period_label_format: "%y.%m".to_string(),
            id_hand_off: IdHandOff::default(),
            staging_chunk_size: 25_000,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.file_name_template.contains(PROVIDER_TOKEN) {
            return Err(OrdersToCashError::Config(format!(
                "file name template '{}' has no {} token",
                self.file_name_template, PROVIDER_TOKEN
            )));
        }
        if self.period_label_format.is_empty()
            || StrftimeItems::new(&self.period_label_format).any(|item| matches!(item, Item::Error))
        {
            return Err(OrdersToCashError::Config(format!(
                "invalid period label format '{}'",
                self.period_label_format
            )));
        }
        if self.staging_chunk_size == 0 {
            return Err(OrdersToCashError::Config(
                "staging chunk size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn provider_dir(&self, provider: &ProviderEntry) -> PathBuf {
        self.destination_root
            .join(&self.shared_root_dir)
            .join(&provider.folder)
            .join(&self.dwh_subfolder)
    }

    pub fn file_name(&self, provider: &ProviderEntry, period: &ReportingPeriod) -> String {
        self.file_name_template
            .replace(PERIOD_TOKEN, &period.label(&self.period_label_format))
            .replace(PROVIDER_TOKEN, &provider.name)
    }

    pub fn export_path(&self, provider: &ProviderEntry, period: &ReportingPeriod) -> PathBuf {
        self.provider_dir(provider)
            .join(self.file_name(provider, period))
    }
}

/// On-disk form of [`PipelineConfig`]: template paths instead of template text.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineSettings {
    #[schemars(description = "Order-level SQL template with {{start_date}} and {{end_date}}.")]
    pub order_template: PathBuf,

    #[schemars(description = "Item-level SQL template with {{order_id_list}}.")]
    pub item_template: PathBuf,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub providers: ProviderTable,
}

impl PipelineSettings {
    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(PipelineSettings);
        serde_json::to_string_pretty(&schema)
    }
}

/// Everything a run needs besides the warehouse and the reporting period.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub order_template: SqlTemplate,
    pub item_template: SqlTemplate,
    pub export: ExportConfig,
    pub providers: ProviderTable,
}

impl PipelineConfig {
    pub fn new(
        order_template: SqlTemplate,
        item_template: SqlTemplate,
        export: ExportConfig,
        providers: ProviderTable,
    ) -> Result<Self> {
        export.validate()?;
        providers.validate()?;
        Ok(Self {
            order_template,
            item_template,
            export,
            providers,
        })
    }

    /// Loads settings from JSON; relative template paths are resolved
    /// against the settings file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings: PipelineSettings = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_settings(settings, base)
    }

    pub fn from_settings(settings: PipelineSettings, base: &Path) -> Result<Self> {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        Self::new(
            SqlTemplate::from_file(resolve(settings.order_template.as_path()))?,
            SqlTemplate::from_file(resolve(settings.item_template.as_path()))?,
            settings.export,
            settings.providers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    fn october() -> ReportingPeriod {
        ReportingPeriod::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_export_path() {
        let config = ExportConfig {
            destination_root: PathBuf::from("/mnt/h"),
            ..ExportConfig::default()
        };
        let table = ProviderTable::default();
        let path = config.export_path(&table.providers[0], &october());

        let expected: PathBuf = [
            "/mnt/h",
            "Shared drives",
            "Automation Projects",
            "Accounting",
            "Orders to Cash",
            "01 Braintree",
            "03 DWH",
            "25.10 - Braintree DWH data.csv",
        ]
        .iter()
        .collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn test_validation() {
        assert!(ExportConfig::default().validate().is_ok());

        let config = ExportConfig {
            file_name_template: "{period}.csv".to_string(),
            ..ExportConfig::default()
        };
        assert!(matches!(config.validate(), Err(OrdersToCashError::Config(_))));

        let config = ExportConfig {
            period_label_format: "%J".to_string(),
            ..ExportConfig::default()
        };
        assert!(matches!(config.validate(), Err(OrdersToCashError::Config(_))));
    }

    #[test]
    fn test_settings_defaults_and_relative_templates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sql")).unwrap();
        fs::write(
            dir.path().join("sql/orders.sql"),
            "SELECT * FROM o WHERE d BETWEEN '{{start_date}}' AND '{{end_date}}'",
        )
        .unwrap();
        fs::write(
            dir.path().join("sql/items.sql"),
            "SELECT * FROM i WHERE order_id IN ({{order_id_list}})",
        )
        .unwrap();
        let settings_path = dir.path().join("settings.json");
        fs::write(
            &settings_path,
            r#"{
                "order_template": "sql/orders.sql",
                "item_template": "sql/items.sql",
                "export": { "destination_root": "/exports", "id_hand_off": { "mode": "inline_list" } }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&settings_path).unwrap();
        assert_eq!(config.order_template.name(), "orders.sql");
        assert_eq!(config.export.destination_root, PathBuf::from("/exports"));
        assert_eq!(config.export.id_hand_off, IdHandOff::InlineList);
        assert_eq!(config.export.dwh_subfolder, "03 DWH");
        assert_eq!(config.providers, ProviderTable::default());
    }

    #[test]
    fn test_missing_template_file() {
        let settings = PipelineSettings {
            order_template: PathBuf::from("missing/orders.sql"),
            item_template: PathBuf::from("missing/items.sql"),
            export: ExportConfig::default(),
            providers: ProviderTable::default(),
        };
        let err = PipelineConfig::from_settings(settings, Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, OrdersToCashError::InvalidTemplate(_)));
    }

    #[test]
    fn test_settings_schema() {
        let schema_json = PipelineSettings::schema_as_json().unwrap();
        assert!(schema_json.contains("order_template"));
        assert!(schema_json.contains("staging_chunk_size"));
    }
}
