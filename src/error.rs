//! Error taxonomy for the export pipeline and the admin gate.
//!
//! Every variant is terminal for the current call. The HTTP layer maps each
//! one to a status code via [`ExportError::status_code`] /
//! [`AuthError::status_code`].

use axum::http::StatusCode;

/// Failure of a single export call.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Malformed request: empty table list, unknown table or format,
    /// unparsable or inverted date range.
    #[error("{0}")]
    Validation(String),

    /// The backend failed to return rows for `table`. Aborts the whole export.
    #[error("Failed to fetch {table}: {message}")]
    Fetch { table: String, message: String },

    /// A row handed to the formatter was not a JSON object.
    #[error("Invalid row {row}: {detail}")]
    InvalidInput { row: usize, detail: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExportError {
    pub fn validation(message: impl Into<String>) -> Self {
        ExportError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ExportError::Validation(_) => StatusCode::BAD_REQUEST,
            ExportError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            ExportError::InvalidInput { .. } | ExportError::Archive(_) | ExportError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True for failures that indicate a defect on our side rather than a bad
    /// request or an unavailable backend.
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        ExportError::Archive(err.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::Io(std::io::Error::other(format!("CSV writer: {err}")))
    }
}

/// Rejection by the admin gate.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("User is not approved")]
    NotApproved,

    #[error("Only administrators can export data")]
    NotAdmin,

    #[error("Auth service error: {0}")]
    Upstream(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::NotApproved | AuthError::NotAdmin => StatusCode::FORBIDDEN,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
