use std::fmt;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Error envelope returned by every HTTP handler, and the type every
/// internal fallible operation converges on (§7 of the spec).
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub message: String,
    #[serde(skip)]
    pub kind: AppErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Registry at `max_concurrent_streams` capacity.
    Admission,
    /// Missing or malformed request parameters (`url`, `file`).
    BadRequest,
    /// The duration probe failed or returned unparsable output.
    Probe,
    /// The transcoder process failed to start.
    Spawn,
    /// A requested segment never appeared within the poll budget.
    PollTimeout,
    NotFound,
    Internal,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<AppErrorKind> for StatusCode {
    fn from(kind: AppErrorKind) -> Self {
        match kind {
            AppErrorKind::NotFound => StatusCode::NOT_FOUND,
            // Admission, BadRequest, Probe, Spawn, PollTimeout and Internal all
            // surface as 500, matching the documented legacy behavior (§9);
            // a 503/400 split can be introduced behind a flag without touching
            // call sites, since they only ever construct an AppErrorKind.
            AppErrorKind::Admission
            | AppErrorKind::BadRequest
            | AppErrorKind::Probe
            | AppErrorKind::Spawn
            | AppErrorKind::PollTimeout
            | AppErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => AppErrorKind::NotFound,
            _ => AppErrorKind::Internal,
        };
        AppError { message: err.to_string(), kind }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError { message: err.to_string(), kind: AppErrorKind::Internal }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status: StatusCode = self.kind.into();
        (status, Json(self)).into_response()
    }
}

impl AppError {
    pub fn admission(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::Admission }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::BadRequest }
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::Probe }
    }

    pub fn spawn(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::Spawn }
    }

    pub fn poll_timeout(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::PollTimeout }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: AppErrorKind::NotFound }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let status: StatusCode = AppErrorKind::NotFound.into();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn admission_maps_to_500() {
        let status: StatusCode = AppErrorKind::Admission.into();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn io_not_found_becomes_not_found_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let app_err: AppError = io_err.into();
        assert_eq!(app_err.kind, AppErrorKind::NotFound);
    }
}
