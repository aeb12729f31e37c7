//! Export orchestrator.
//!
//! Flow for one call:
//! 1. validate the request (no backend traffic on failure);
//! 2. fetch every requested table concurrently, aborting the rest on the
//!    first failure;
//! 3. format each table in request order;
//! 4. return the single artifact as-is, or a deflate zip of all of them.
//!
//! No partial export is ever returned.

mod request;
mod service;

pub use request::{
    DateRange, ExportFormat, ExportPlan, ExportRequest, ExportTable, RawDateRange,
    CSV_CONTENT_TYPE, XLSX_CONTENT_TYPE, ZIP_CONTENT_TYPE,
};
pub use service::{ExportOptions, ExportPayload, ExportService, DEFAULT_ARCHIVE_PREFIX};
