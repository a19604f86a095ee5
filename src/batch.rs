use crate::assets::{ImageFetcher, inline_remote_images};
use crate::binder::{BindOptions, DataRow, Mapping, bind_row};
use crate::document::{Document, DocumentError};
use crate::measure::Measure;
use crate::package::{ArtifactSink, PackageError};
use crate::render::{RasterBackend, RenderError};
use crate::sizer::{PreparedTemplate, SizerOptions, prepare_template};
use crate::table::Table;
use crate::upload::AssetUploader;
use std::collections::HashSet;
use thiserror::Error;

const MAX_NAME_LEN: usize = 80;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("template is unreadable: {0}")]
    Template(#[from] DocumentError),
    #[error("data has no rows")]
    NoRows,
    #[error("failed to finish output: {0}")]
    Package(#[from] PackageError),
}

#[derive(Debug, Error)]
enum RowError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Package(#[from] PackageError),
}

pub struct BatchJob<'a> {
    pub template: &'a str,
    pub mapping: &'a Mapping,
    pub table: &'a Table,
    /// Column naming the artifacts; the first header when unset.
    pub name_column: Option<&'a str>,
    /// Also store each bound SVG next to its PNG.
    pub keep_svg: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub sizer: SizerOptions,
    pub bind: BindOptions,
}

pub struct Collaborators<'a> {
    pub backend: &'a dyn RasterBackend,
    pub measurer: &'a dyn Measure,
    pub fetcher: Option<&'a dyn ImageFetcher>,
    pub sink: &'a mut dyn ArtifactSink,
    pub uploader: Option<&'a dyn AssetUploader>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// 1-based data row.
    pub row: usize,
    pub name: String,
    pub location: String,
    pub url: Option<String>,
    pub upload_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row: usize,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<RowFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowStatus {
    Ok,
    UploadFailed(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub row: usize,
    pub name: String,
    pub file: Option<String>,
    pub url: Option<String>,
    pub status: RowStatus,
}

impl BatchReport {
    /// Artifacts and failures merged back into row order.
    pub fn entries(&self) -> Vec<ReportEntry> {
        let mut entries: Vec<ReportEntry> = self
            .artifacts
            .iter()
            .map(|artifact| ReportEntry {
                row: artifact.row,
                name: artifact.name.clone(),
                file: Some(artifact.location.clone()),
                url: artifact.url.clone(),
                status: match &artifact.upload_error {
                    Some(err) => RowStatus::UploadFailed(err.clone()),
                    None => RowStatus::Ok,
                },
            })
            .chain(self.failures.iter().map(|failure| ReportEntry {
                row: failure.row,
                name: failure.name.clone(),
                file: None,
                url: None,
                status: RowStatus::Failed(failure.error.clone()),
            }))
            .collect();
        entries.sort_by_key(|entry| entry.row);
        entries
    }
}

/// One banner per table row, strictly in order. Every row starts from a fresh
/// parse of the prepared template, so nothing a row does to its document can
/// reach the next one.
pub fn generate_batch(
    job: &BatchJob<'_>,
    options: &BatchOptions,
    services: &mut Collaborators<'_>,
) -> Result<BatchReport, BatchError> {
    if job.table.is_empty() {
        return Err(BatchError::NoRows);
    }
    let prepared = prepare_template(job.template, &options.sizer)?;
    for column in job.mapping.values() {
        if !job.table.headers.contains(column) {
            log::warn!("mapped column {column:?} is not in the data header");
        }
    }
    let name_column = job
        .name_column
        .map(str::to_string)
        .or_else(|| job.table.headers.first().cloned())
        .unwrap_or_default();
    log::info!(
        "generating {} banners at {}x{}",
        job.table.len(),
        prepared.pixel_size.width,
        prepared.pixel_size.height
    );

    let mut report = BatchReport::default();
    let mut used_names = HashSet::new();
    for (index, row) in job.table.records().enumerate() {
        let row_number = index + 1;
        let raw_name = row.get(&name_column).map(String::as_str).unwrap_or_default();
        let name = unique_name(&sanitize_name(raw_name, row_number), &mut used_names);

        match render_row(job, options, services, &prepared, &row, &name) {
            Ok((location, png)) => {
                log::info!("row {row_number}: wrote {location}");
                let (url, upload_error) = match services.uploader {
                    Some(uploader) => match uploader.upload(&format!("{name}.png"), &png) {
                        Ok(url) => (Some(url), None),
                        Err(err) => {
                            log::warn!("row {row_number}: upload failed: {err}");
                            (None, Some(err.to_string()))
                        }
                    },
                    None => (None, None),
                };
                report.artifacts.push(Artifact {
                    row: row_number,
                    name,
                    location,
                    url,
                    upload_error,
                });
            }
            Err(err) => {
                log::warn!("row {row_number} failed: {err}");
                report.failures.push(RowFailure {
                    row: row_number,
                    name,
                    error: err.to_string(),
                });
            }
        }
    }

    services.sink.finish()?;
    log::info!(
        "{} banners produced, {} rows failed",
        report.artifacts.len(),
        report.failures.len()
    );
    Ok(report)
}

fn render_row(
    job: &BatchJob<'_>,
    options: &BatchOptions,
    services: &mut Collaborators<'_>,
    prepared: &PreparedTemplate,
    row: &DataRow,
    name: &str,
) -> Result<(String, Vec<u8>), RowError> {
    let mut doc = Document::parse(&prepared.source)?;
    let binding = bind_row(&mut doc, job.mapping, row, &options.bind, services.measurer);
    log::debug!(
        "{name}: {} fields bound, {} skipped",
        binding.applied.len(),
        binding.skipped.len()
    );
    if let Some(fetcher) = services.fetcher {
        inline_remote_images(&mut doc, fetcher);
    }
    let svg = doc.to_svg_string();
    let png = services.backend.render(&svg, prepared.pixel_size)?;
    if job.keep_svg {
        services.sink.put(&format!("{name}.svg"), svg.as_bytes())?;
    }
    let location = services.sink.put(&format!("{name}.png"), &png)?;
    Ok((location, png))
}

/// File-safe artifact name from a cell value; `row_<n>` when nothing usable
/// is left.
pub fn sanitize_name(raw: &str, row_number: usize) -> String {
    let mut name = String::new();
    for ch in raw.trim().chars() {
        let safe = if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            ch
        } else {
            '_'
        };
        if safe == '_' && name.ends_with('_') {
            continue;
        }
        name.push(safe);
    }
    let name: String = name
        .trim_matches(['_', '.'])
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if name.is_empty() {
        format!("row_{row_number}")
    } else {
        name
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("  Summer Sale / 50% off ", 1), "Summer_Sale_50_off");
        assert_eq!(sanitize_name("../../etc/passwd", 2), "etc_passwd");
        assert_eq!(sanitize_name("Café", 3), "Café");
        assert_eq!(sanitize_name("", 4), "row_4");
        assert_eq!(sanitize_name("***", 5), "row_5");
    }

    #[test]
    fn duplicates_get_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(unique_name("promo", &mut used), "promo");
        assert_eq!(unique_name("promo", &mut used), "promo-2");
        assert_eq!(unique_name("Promo", &mut used), "Promo-3");
    }

    #[test]
    fn entries_merge_in_row_order() {
        let report = BatchReport {
            artifacts: vec![Artifact {
                row: 2,
                name: "b".to_string(),
                location: "b.png".to_string(),
                url: None,
                upload_error: None,
            }],
            failures: vec![RowFailure {
                row: 1,
                name: "a".to_string(),
                error: "boom".to_string(),
            }],
        };
        let rows: Vec<usize> = report.entries().iter().map(|entry| entry.row).collect();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(report.entries()[0].status, RowStatus::Failed("boom".to_string()));
    }
}
