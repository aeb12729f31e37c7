//! Café export service.
//!
//! Pulls selected CRM tables from the hosted Supabase backend and hands them
//! back as CSV or XLSX: one file for a single table, a zip for several.
//!
//! - [`tabular`] turns a table's rows into CSV text or an XLSX workbook
//! - [`export`] validates requests and runs the fetch / format / package flow
//! - [`supabase`] is the production [`backend::ExportBackend`] and
//!   [`auth::AdminGate`]
//! - [`server`] exposes the flow over HTTP

pub mod archive;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod server;
pub mod storage;
pub mod supabase;
pub mod tabular;

pub use error::{AuthError, ExportError};
pub use export::{
    ExportFormat, ExportOptions, ExportPayload, ExportRequest, ExportService, ExportTable,
};
pub use tabular::{format_delimited, format_spreadsheet, RowSet};
