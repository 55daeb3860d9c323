use crate::binder::ReportingPeriod;
use crate::config::ExportConfig;
use crate::error::{OrdersToCashError, Result};
use crate::providers::ProviderGroup;
use crate::schema::MergedOrderRow;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Destination for rendered export tables.
pub trait ExportSink {
    fn write_table(&self, path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()>;
}

/// Writes each table as a CSV file, creating parent folders on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFileSink;

impl ExportSink for CsvFileSink {
    fn write_table(&self, path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub provider: String,
    pub path: PathBuf,
    pub rows: usize,
    pub status: Result<()>,
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

/// Per-provider result of one export run.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub outcomes: Vec<ExportOutcome>,
}

impl ExportSummary {
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(ExportOutcome::is_success)
    }

    pub fn written(&self) -> impl Iterator<Item = &ExportOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExportOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn total_rows_written(&self) -> usize {
        self.written().map(|o| o.rows).sum()
    }
}

/// Writes one file per provider group. A failed write is recorded in the
/// summary and does not stop the remaining providers.
pub fn write_provider_exports<S: ExportSink + ?Sized>(
    groups: &[ProviderGroup<'_>],
    config: &ExportConfig,
    period: &ReportingPeriod,
    sink: &S,
) -> ExportSummary {
    let header = MergedOrderRow::header();
    let mut summary = ExportSummary::default();

    for group in groups {
        let provider = group.provider;
        let path = config.export_path(provider, period);
        let rows: Vec<Vec<String>> = group.rows.iter().map(|row| row.to_record()).collect();

        if rows.is_empty() {
            warn!("No rows found for {}, writing header only", provider.name);
        }

        let status = sink
            .write_table(&path, &header, &rows)
            .map_err(|e| OrdersToCashError::ExportWrite {
                provider: provider.name.clone(),
                path: path.clone(),
                message: e.to_string(),
            });

        match &status {
            Ok(()) => info!(
                "Saved {} rows for {} to {}",
                rows.len(),
                provider.name,
                path.display()
            ),
            Err(e) => warn!("{}", e),
        }

        summary.outcomes.push(ExportOutcome {
            provider: provider.name.clone(),
            path,
            rows: rows.len(),
            status,
        });
    }

    summary
}
