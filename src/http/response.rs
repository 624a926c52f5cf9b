use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::FsError;

/// Which request-surface operation failed; the same error maps to different
/// statuses depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Replace,
    Remove,
}

/// An [`FsError`] tagged with the operation that raised it.
#[derive(Debug)]
pub struct ApiError {
    op: Operation,
    err: FsError,
}

impl ApiError {
    pub fn new(op: Operation, err: FsError) -> Self {
        Self { op, err }
    }

    pub fn read(err: FsError) -> Self {
        Self::new(Operation::Read, err)
    }

    pub fn create(err: FsError) -> Self {
        Self::new(Operation::Create, err)
    }

    pub fn replace(err: FsError) -> Self {
        Self::new(Operation::Replace, err)
    }

    pub fn remove(err: FsError) -> Self {
        Self::new(Operation::Remove, err)
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.op, &self.err)
    }
}

pub fn status_for(op: Operation, err: &FsError) -> StatusCode {
    match (op, err) {
        (_, FsError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
        (_, FsError::Io { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        (Operation::Read, FsError::NotFound(_)) => StatusCode::NOT_FOUND,
        (Operation::Create, FsError::AlreadyExists(_)) => StatusCode::METHOD_NOT_ALLOWED,
        (Operation::Replace, FsError::NotFound(_) | FsError::IsDirectory(_)) => {
            StatusCode::METHOD_NOT_ALLOWED
        }
        (Operation::Remove, FsError::NotFound(_)) => StatusCode::BAD_REQUEST,
        // Races between stat and act, e.g. a create whose parent turned into a file.
        (_, FsError::NotFound(_)) => StatusCode::NOT_FOUND,
        (_, FsError::AlreadyExists(_)) => StatusCode::CONFLICT,
        (_, FsError::IsDirectory(_)) => StatusCode::METHOD_NOT_ALLOWED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.err {
            FsError::Io { .. } => {
                tracing::error!(op = ?self.op, error = %self.err, "request failed");
                "Something broke!".to_string()
            }
            other => {
                tracing::warn!(op = ?self.op, status = status.as_u16(), error = %other, "request rejected");
                other.to_string()
            }
        };
        (status, message).into_response()
    }
}
