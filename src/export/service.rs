//! Export orchestration: validate, fetch every table, format, package.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::request::{ExportFormat, ExportPlan, ExportRequest, ExportTable, ZIP_CONTENT_TYPE};
use crate::archive::{build_archive, Artifact};
use crate::backend::ExportBackend;
use crate::error::ExportError;
use crate::tabular::{format_delimited, format_spreadsheet, RowSet};

pub const DEFAULT_ARCHIVE_PREFIX: &str = "export";

/// Bytes ready for transport plus the metadata a "save as" response needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    pub row_count: usize,
    pub artifact_count: usize,
    /// Tables exported, in request order.
    pub tables: Vec<ExportTable>,
    pub format: ExportFormat,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Filename prefix of multi-table archives.
    pub archive_prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
        }
    }
}

/// Turns export requests into payloads, all-or-nothing.
pub struct ExportService<B: ExportBackend> {
    backend: Arc<B>,
    options: ExportOptions,
}

impl<B: ExportBackend> ExportService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_options(backend, ExportOptions::default())
    }

    pub fn with_options(backend: Arc<B>, options: ExportOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub async fn build_export(&self, request: &ExportRequest) -> Result<ExportPayload, ExportError> {
        self.build_export_at(request, Utc::now()).await
    }

    /// Same as [`build_export`](Self::build_export) with an explicit clock
    /// value for the generated filename.
    pub async fn build_export_at(
        &self,
        request: &ExportRequest,
        now: DateTime<Utc>,
    ) -> Result<ExportPayload, ExportError> {
        let plan = request.validate()?;
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "export",
            %request_id,
            format = plan.format.as_str(),
            tables = plan.tables.len()
        );

        async {
            let result = self.run(&plan, now).await;
            match &result {
                Ok(payload) => info!(
                    filename = %payload.filename,
                    bytes = payload.bytes.len(),
                    rows = payload.row_count,
                    "export complete"
                ),
                Err(e) if e.is_internal() => error!(error = %e, "export failed"),
                Err(e) => warn!(error = %e, "export failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, plan: &ExportPlan, now: DateTime<Utc>) -> Result<ExportPayload, ExportError> {
        let row_sets = self.fetch_all(plan).await?;

        let mut artifacts = Vec::with_capacity(row_sets.len());
        for (table, rows) in plan.tables.iter().zip(row_sets) {
            artifacts.push(format_artifact(*table, &rows, plan.format)?);
        }
        let row_count = artifacts.iter().map(|a| a.row_count).sum();

        if artifacts.len() == 1 {
            let single = artifacts.remove(0);
            let filename = format!(
                "{}-{}.{}",
                plan.tables[0],
                now.format("%Y-%m-%d"),
                plan.format.extension()
            );
            return Ok(ExportPayload {
                bytes: single.bytes,
                filename,
                content_type: plan.format.content_type(),
                row_count,
                artifact_count: 1,
                tables: plan.tables.clone(),
                format: plan.format,
            });
        }

        let bytes = build_archive(&artifacts)?;
        Ok(ExportPayload {
            bytes,
            filename: format!(
                "{}-{}.zip",
                self.options.archive_prefix,
                now.format("%Y%m%d-%H%M%S-%3f")
            ),
            content_type: ZIP_CONTENT_TYPE,
            row_count,
            artifact_count: artifacts.len(),
            tables: plan.tables.clone(),
            format: plan.format,
        })
    }

    /// Fetch every table of `plan` concurrently. The first failure aborts the
    /// remaining fetches; results come back in request order.
    async fn fetch_all(&self, plan: &ExportPlan) -> Result<Vec<RowSet>, ExportError> {
        let mut set = JoinSet::new();
        let mut tables_by_task = HashMap::new();

        for (index, table) in plan.tables.iter().copied().enumerate() {
            let backend = Arc::clone(&self.backend);
            let range = plan.date_range;
            let handle = set.spawn(async move {
                let result = backend.fetch_rows(table, range).await;
                (index, result)
            });
            tables_by_task.insert(handle.id(), table);
        }

        let mut results: Vec<Option<RowSet>> = vec![None; plan.tables.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(rows))) => {
                    debug!(table = %plan.tables[index], rows = rows.len(), "fetched table");
                    results[index] = Some(rows);
                }
                Ok((index, Err(message))) => {
                    set.abort_all();
                    return Err(ExportError::Fetch {
                        table: plan.tables[index].to_string(),
                        message,
                    });
                }
                Err(join_err) => {
                    set.abort_all();
                    let table = tables_by_task
                        .get(&join_err.id())
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(ExportError::Fetch {
                        table,
                        message: format!("fetch task failed: {join_err}"),
                    });
                }
            }
        }

        results
            .into_iter()
            .zip(&plan.tables)
            .map(|(rows, table)| {
                rows.ok_or_else(|| ExportError::Fetch {
                    table: table.to_string(),
                    message: "fetch did not complete".to_string(),
                })
            })
            .collect()
    }
}

fn format_artifact(
    table: ExportTable,
    rows: &RowSet,
    format: ExportFormat,
) -> Result<Artifact, ExportError> {
    let bytes = match format {
        ExportFormat::Csv => format_delimited(rows)?.into_bytes(),
        ExportFormat::Xlsx => format_spreadsheet(rows, table.as_str())?,
    };
    Ok(Artifact {
        name: format!("{table}.{}", format.extension()),
        bytes,
        row_count: rows.len(),
    })
}
