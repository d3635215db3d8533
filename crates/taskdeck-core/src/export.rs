use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::catalog::TaskCatalog;
use crate::models::{CoreError, CoreErrorKind, DomainDescriptor, Task};

pub type ExportResult<T> = Result<T, CoreError>;

/// Domain-level fields written at the top of a report.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub categories: Vec<String>,
}

impl From<&DomainDescriptor> for DomainMetadata {
    fn from(descriptor: &DomainDescriptor) -> Self {
        Self {
            domain: descriptor.name.clone(),
            description: descriptor.description.clone(),
            categories: descriptor.categories.clone(),
        }
    }
}

/// Point-in-time snapshot of a catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogReport {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub total_tasks: usize,
    pub categories: Vec<String>,
    pub status_counts: BTreeMap<String, usize>,
    pub tasks: Vec<Task>,
}

impl CatalogReport {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id.as_str() == id)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReportExporter {
    pretty: bool,
}

impl Default for ReportExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportExporter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn export(&self, catalog: &TaskCatalog, metadata: &DomainMetadata) -> CatalogReport {
        CatalogReport {
            domain: metadata.domain.clone(),
            description: metadata.description.clone(),
            generated_at: OffsetDateTime::now_utc(),
            total_tasks: catalog.len(),
            categories: metadata.categories.clone(),
            status_counts: catalog.status_counts(),
            tasks: catalog.tasks().to_vec(),
        }
    }

    pub fn to_json_string(&self, report: &CatalogReport) -> ExportResult<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        };
        encoded.map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to encode catalog report: {error}"),
            )
            .with_domain(report.domain.clone())
        })
    }

    pub fn write_json(&self, report: &CatalogReport, mut writer: impl Write) -> ExportResult<()> {
        let encoded = self.to_json_string(report)?;
        writer
            .write_all(encoded.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Storage,
                    format!("failed to write catalog report: {error}"),
                )
                .with_domain(report.domain.clone())
            })
    }

    /// Writes the report next to `path` and renames it into place, so readers
    /// never observe a partially written file.
    pub fn export_to_path(
        &self,
        catalog: &TaskCatalog,
        metadata: &DomainMetadata,
        path: impl AsRef<Path>,
    ) -> ExportResult<CatalogReport> {
        let path = path.as_ref();
        let report = self.export(catalog, metadata);
        let storage_error = |error: std::io::Error| {
            CoreError::new(
                CoreErrorKind::Storage,
                format!("failed to export report to '{}': {error}", path.display()),
            )
            .with_domain(report.domain.clone())
        };

        let temp_path = temp_path_for(path).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::Storage,
                format!("report target '{}' has no file name", path.display()),
            )
            .with_domain(report.domain.clone())
        })?;
        let file = File::create(&temp_path).map_err(storage_error)?;
        let mut writer = BufWriter::new(file);
        if let Err(error) = self.write_json(&report, &mut writer) {
            let _ = fs::remove_file(&temp_path);
            return Err(error);
        }

        let synced = writer
            .into_inner()
            .map_err(|error| error.into_error())
            .and_then(|file| file.sync_all());
        if let Err(error) = synced.and_then(|()| fs::rename(&temp_path, path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(storage_error(error));
        }

        tracing::debug!(
            domain = %report.domain,
            path = %path.display(),
            tasks = report.total_tasks,
            "exported catalog report"
        );
        Ok(report)
    }
}

/// Hidden sibling of `path`, unique per target file name.
fn temp_path_for(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_string_lossy();
    Some(path.with_file_name(format!(".{file_name}.tmp")))
}
