//! Export and health handlers.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::AppState;
use crate::auth::{parse_bearer, AdminGate, AdminIdentity};
use crate::backend::{AuditEntry, ExportBackend};
use crate::error::{AuthError, ExportError};
use crate::export::{ExportFormat, ExportPayload, ExportRequest, ExportService};

/// Query parameters of `GET /api/export`.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub table: Option<String>,
    pub format: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl ExportQuery {
    /// The equivalent single-table request. `format` defaults to xlsx; a date
    /// range needs both bounds.
    pub fn into_request(self) -> Result<ExportRequest, ExportError> {
        let table = self
            .table
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ExportError::validation("Missing table parameter"))?;
        let format = self
            .format
            .unwrap_or_else(|| ExportFormat::Xlsx.as_str().to_string());
        let request = ExportRequest::new(&[table.as_str()], &format);
        match (self.start, self.end) {
            (None, None) => Ok(request),
            (Some(start), Some(end)) => Ok(request.with_date_range(&start, &end)),
            _ => Err(ExportError::validation(
                "Invalid date range: both start and end are required",
            )),
        }
    }
}

/// `POST /api/export`
pub async fn export_post<B: ExportBackend, G: AdminGate>(
    State(state): State<AppState<B, G>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = serde_json::from_slice::<ExportRequest>(&body)
        .map_err(|e| ExportError::validation(format!("Invalid request body: {e}")));
    authorize_and_export(&state, &headers, request).await
}

/// `GET /api/export?table=…&format=…&start=…&end=…`
pub async fn export_get<B: ExportBackend, G: AdminGate>(
    State(state): State<AppState<B, G>>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Response {
    authorize_and_export(&state, &headers, query.into_request()).await
}

/// `GET /api/health`
pub async fn health() -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Authenticate first, then look at the request: an anonymous caller learns
/// nothing about request validity.
async fn authorize_and_export<B: ExportBackend, G: AdminGate>(
    state: &AppState<B, G>,
    headers: &HeaderMap,
    request: Result<ExportRequest, ExportError>,
) -> Response {
    let bearer = parse_bearer(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );
    let identity = match state.gate.authorize(bearer).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "export request rejected");
            return auth_error_response(&e);
        }
    };

    let request = match request {
        Ok(request) => request,
        Err(e) => return export_error_response(&e),
    };

    let backend = state.backend.scoped(&identity);
    let service = ExportService::with_options(Arc::clone(&backend), state.options.clone());
    match service.build_export(&request).await {
        Ok(payload) => {
            record_audit(&*backend, &identity, &payload).await;
            payload_response(payload)
        }
        Err(e) => export_error_response(&e),
    }
}

async fn record_audit<B: ExportBackend>(backend: &B, identity: &AdminIdentity, payload: &ExportPayload) {
    let entry = AuditEntry {
        user_id: identity.user_id.clone(),
        action: AuditEntry::MANUAL_EXPORT,
        tables: payload.tables.clone(),
        format: payload.format,
        success: true,
        file_size_bytes: payload.bytes.len(),
        row_count: payload.row_count,
    };
    match backend.record_export(entry).await {
        Ok(()) => info!(user_id = %identity.user_id, "export recorded in audit log"),
        Err(e) => warn!(user_id = %identity.user_id, error = %e, "failed to record export audit entry"),
    }
}

fn payload_response(payload: ExportPayload) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", payload.filename);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, payload.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        payload.bytes,
    )
        .into_response()
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn export_error_response(err: &ExportError) -> Response {
    error_body(err.status_code(), err.to_string())
}

fn auth_error_response(err: &AuthError) -> Response {
    error_body(err.status_code(), err.to_string())
}
