//! The export pipeline's view of the hosted backend.
//!
//! The backend owns the data and its row-level rules; all we need from it is
//! "give me the rows of this table" plus a place to drop an audit record.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::auth::AdminIdentity;
use crate::export::{DateRange, ExportFormat, ExportTable};
use crate::tabular::RowSet;

/// Audit trail entry written after a successful manual export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub user_id: String,
    pub action: &'static str,
    pub tables: Vec<ExportTable>,
    pub format: ExportFormat,
    pub success: bool,
    pub file_size_bytes: usize,
    pub row_count: usize,
}

impl AuditEntry {
    pub const MANUAL_EXPORT: &'static str = "manual_export";
}

/// Remote query surface used by the export orchestrator.
///
/// Implementations must be cheap to share across tasks; the orchestrator
/// holds one behind an `Arc` and issues fetches concurrently.
pub trait ExportBackend: Send + Sync + 'static {
    /// Rows of `table`, optionally restricted to `range` on the table's date
    /// column. Errors are human-readable messages.
    fn fetch_rows(
        &self,
        table: ExportTable,
        range: Option<DateRange>,
    ) -> impl Future<Output = Result<RowSet, String>> + Send;

    /// Backend acting on behalf of `caller`. The default shares `self`.
    fn scoped(self: &Arc<Self>, caller: &AdminIdentity) -> Arc<Self> {
        let _ = caller;
        Arc::clone(self)
    }

    /// Best-effort audit record. The default does nothing.
    fn record_export(&self, entry: AuditEntry) -> impl Future<Output = Result<(), String>> + Send {
        let _ = entry;
        async { Ok(()) }
    }
}
